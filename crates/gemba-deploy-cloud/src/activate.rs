//! Create or update the Container App and make new config take effect.
//!
//! ```text
//!   NotExists ── containerapp create (image, ingress, replicas, registry,
//!                secrets, env vars in one call) ──────────────▶ ExistsActive
//!   ExistsActive ── secret set → update → revision list → revision restart
//! ```
//!
//! Restarting the active revision is best effort: the platform rolls a new
//! revision for image/env changes anyway.

use gemba_deploy_core::{AppConfig, AzureTarget, EnvironmentBinding};
use secrecy::ExposeSecret;

use crate::az::AzError;
use crate::client::{AzClient, ProbeError, args};
use crate::executor::AzExecutor;
use crate::resource::{Resource, ResourceKind};

/// Port the GEMBA-Score API listens on inside the container.
pub const TARGET_PORT: u16 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    NotExists,
    ExistsActive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted { revision: String },
    /// No active revision was found; nothing to restart.
    NoActiveRevision,
    /// Looking up or restarting the revision failed.
    Failed {
        revision: Option<String>,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Created,
    Updated { restart: RestartOutcome },
}

impl<E: AzExecutor> AzClient<E> {
    pub async fn app_state(
        &self,
        target: &AzureTarget,
        app: &AppConfig,
    ) -> Result<AppState, ActivationError> {
        let resource = Resource::ContainerApp {
            group: &target.resource_group,
            name: &app.name,
        };
        Ok(if self.exists(&resource).await? {
            AppState::ExistsActive
        } else {
            AppState::NotExists
        })
    }

    /// Probe the app once, then take the create or update path.
    pub async fn activate(
        &self,
        target: &AzureTarget,
        app: &AppConfig,
        image_ref: &str,
        binding: &EnvironmentBinding,
    ) -> Result<Activation, ActivationError> {
        match self.app_state(target, app).await? {
            AppState::NotExists => {
                self.create_app(target, app, image_ref, binding).await?;
                Ok(Activation::Created)
            }
            AppState::ExistsActive => {
                let restart = self.update_app(target, app, image_ref, binding).await?;
                Ok(Activation::Updated { restart })
            }
        }
    }

    /// Single creation call carrying image, ingress, scaling, registry
    /// credentials, secrets and env vars.
    pub async fn create_app(
        &self,
        target: &AzureTarget,
        app: &AppConfig,
        image_ref: &str,
        binding: &EnvironmentBinding,
    ) -> Result<(), ActivationError> {
        let port = TARGET_PORT.to_string();
        let min = app.min_replicas.to_string();
        let max = app.max_replicas.to_string();

        let mut cmd = args([
            "containerapp",
            "create",
            "--resource-group",
            &target.resource_group,
            "--name",
            &app.name,
            "--environment",
            &app.environment,
            "--image",
            image_ref,
            "--target-port",
            &port,
            "--ingress",
            "external",
            "--min-replicas",
            &min,
            "--max-replicas",
            &max,
            "--registry-server",
            &binding.registry.login_server,
            "--registry-username",
            &binding.registry.username,
            "--registry-password",
            binding.registry.password.expose_secret(),
            "--output",
            "none",
        ]);
        cmd.push("--secrets".to_owned());
        cmd.extend(binding.secret_args());
        cmd.push("--env-vars".to_owned());
        cmd.extend(binding.env_var_args());

        self.exec(&cmd)
            .await
            .map_err(|e| ActivationError::Create { source: e })?;
        Ok(())
    }

    /// Secrets first, then image/env/scale, then a best-effort restart of
    /// the active revision.
    pub async fn update_app(
        &self,
        target: &AzureTarget,
        app: &AppConfig,
        image_ref: &str,
        binding: &EnvironmentBinding,
    ) -> Result<RestartOutcome, ActivationError> {
        let mut secret_set = args([
            "containerapp",
            "secret",
            "set",
            "--resource-group",
            &target.resource_group,
            "--name",
            &app.name,
            "--output",
            "none",
        ]);
        secret_set.push("--secrets".to_owned());
        secret_set.extend(binding.secret_args());
        self.exec(&secret_set)
            .await
            .map_err(|e| ActivationError::SecretUpdate { source: e })?;

        let min = app.min_replicas.to_string();
        let max = app.max_replicas.to_string();
        let mut update = args([
            "containerapp",
            "update",
            "--resource-group",
            &target.resource_group,
            "--name",
            &app.name,
            "--image",
            image_ref,
            "--min-replicas",
            &min,
            "--max-replicas",
            &max,
            "--output",
            "none",
        ]);
        update.push("--set-env-vars".to_owned());
        update.extend(binding.env_var_args());
        self.exec(&update)
            .await
            .map_err(|e| ActivationError::Update { source: e })?;

        Ok(self.restart_active_revision(target, app).await)
    }

    /// Name of the currently active revision, if any.
    pub async fn active_revision(
        &self,
        target: &AzureTarget,
        app: &AppConfig,
    ) -> Result<Option<String>, AzError> {
        let out = self
            .exec(&args([
                "containerapp",
                "revision",
                "list",
                "--resource-group",
                &target.resource_group,
                "--name",
                &app.name,
                "--query",
                "[?properties.active].name",
                "--output",
                "tsv",
            ]))
            .await?;

        Ok(out
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_owned))
    }

    /// Restart the active revision. Never fails the run.
    pub async fn restart_active_revision(
        &self,
        target: &AzureTarget,
        app: &AppConfig,
    ) -> RestartOutcome {
        let revision = match self.active_revision(target, app).await {
            Ok(Some(revision)) => revision,
            Ok(None) => return RestartOutcome::NoActiveRevision,
            Err(e) => {
                return RestartOutcome::Failed {
                    revision: None,
                    reason: e.to_string(),
                };
            }
        };

        let result = self
            .exec(&args([
                "containerapp",
                "revision",
                "restart",
                "--resource-group",
                &target.resource_group,
                "--name",
                &app.name,
                "--revision",
                &revision,
                "--output",
                "none",
            ]))
            .await;

        match result {
            Ok(_) => RestartOutcome::Restarted { revision },
            Err(e) => RestartOutcome::Failed {
                revision: Some(revision),
                reason: e.to_string(),
            },
        }
    }

    /// `https://<ingress fqdn>` of the app.
    pub async fn public_url(
        &self,
        target: &AzureTarget,
        app: &AppConfig,
    ) -> Result<String, ActivationError> {
        let fqdn = self
            .exec(&args([
                "containerapp",
                "show",
                "--resource-group",
                &target.resource_group,
                "--name",
                &app.name,
                "--query",
                "properties.configuration.ingress.fqdn",
                "--output",
                "tsv",
            ]))
            .await
            .map_err(|e| ActivationError::Endpoint { source: e })?;

        let fqdn = fqdn.trim();
        if fqdn.is_empty() {
            return Err(ActivationError::NoIngress(app.name.clone()));
        }
        Ok(format!("https://{fqdn}"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("failed to create {}", ResourceKind::ContainerApp)]
    Create { source: AzError },

    #[error("failed to update Container App secrets")]
    SecretUpdate { source: AzError },

    #[error("failed to update {}", ResourceKind::ContainerApp)]
    Update { source: AzError },

    #[error("failed to read the Container App endpoint")]
    Endpoint { source: AzError },

    #[error("Container App '{0}' has no external ingress")]
    NoIngress(String),
}
