//! Create-if-absent / update-in-place for each managed resource kind.
//!
//! Every `ensure_*` probes once and then issues at most one mutating
//! call. Running them again against converged resources issues none.

use gemba_deploy_core::{
    AppConfig, AzureTarget, DatabaseConfig, RegistryConfig, RegistryCredentials,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::az::AzError;
use crate::client::{AzClient, ProbeError, args};
use crate::executor::AzExecutor;
use crate::resource::{Resource, ResourceKind, ResourceState, SECURITY_TAG_KEY, SECURITY_TAG_VALUE};

/// Firewall rule admitting traffic from Azure-internal services.
pub const AZURE_SERVICES_RULE: &str = "AllowAzureServices";

/// Fixed serverless sizing of the database.
const DB_EDITION: &str = "GeneralPurpose";
const DB_FAMILY: &str = "Gen5";
const DB_CAPACITY: &str = "1";
const DB_MIN_CAPACITY: &str = "0.5";
const DB_AUTO_PAUSE_MINUTES: &str = "60";

/// What an `ensure_*` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    Updated,
    Unchanged,
}

/// Result of the idempotent firewall rule creation. Neither failure
/// variant aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirewallOutcome {
    Created,
    /// Azure rejected the create as a duplicate.
    AlreadyExists,
    /// Any other failure, e.g. missing permissions.
    Failed { reason: String },
}

impl<E: AzExecutor> AzClient<E> {
    /// Resource group: create only, nothing to update.
    pub async fn ensure_resource_group(
        &self,
        target: &AzureTarget,
    ) -> Result<Provisioned, ProvisionError> {
        let group = Resource::Group {
            name: &target.resource_group,
        };
        if self.state(&group).await?.exists() {
            return Ok(Provisioned::Unchanged);
        }

        self.exec(&args([
            "group",
            "create",
            "--name",
            &target.resource_group,
            "--location",
            &target.location,
            "--output",
            "none",
        ]))
        .await
        .map_err(|e| ProvisionError::Create {
            kind: ResourceKind::ResourceGroup,
            source: e,
        })?;

        Ok(Provisioned::Created)
    }

    /// SQL server: create with admin credentials, otherwise only (re)apply
    /// the security tag. Admin credentials of an existing server are never
    /// touched.
    pub async fn ensure_sql_server(
        &self,
        target: &AzureTarget,
        db: &DatabaseConfig,
    ) -> Result<Provisioned, ProvisionError> {
        let server = Resource::SqlServer {
            group: &target.resource_group,
            name: &db.server,
        };

        match self.state(&server).await? {
            ResourceState::UpToDate => Ok(Provisioned::Unchanged),
            ResourceState::NeedsUpdate => {
                let tag = format!("tags.{SECURITY_TAG_KEY}={SECURITY_TAG_VALUE}");
                self.exec(&args([
                    "sql",
                    "server",
                    "update",
                    "--resource-group",
                    &target.resource_group,
                    "--name",
                    &db.server,
                    "--set",
                    &tag,
                    "--output",
                    "none",
                ]))
                .await
                .map_err(|e| ProvisionError::Update {
                    kind: ResourceKind::SqlServer,
                    source: e,
                })?;
                Ok(Provisioned::Updated)
            }
            ResourceState::Absent => {
                self.exec(&args([
                    "sql",
                    "server",
                    "create",
                    "--resource-group",
                    &target.resource_group,
                    "--name",
                    &db.server,
                    "--location",
                    &db.location,
                    "--admin-user",
                    &db.admin_user,
                    "--admin-password",
                    db.admin_password.expose_secret(),
                    "--output",
                    "none",
                ]))
                .await
                .map_err(|e| ProvisionError::Create {
                    kind: ResourceKind::SqlServer,
                    source: e,
                })?;
                Ok(Provisioned::Created)
            }
        }
    }

    /// Allow Azure services through the SQL firewall. A duplicate is
    /// [`FirewallOutcome::AlreadyExists`]; anything else is
    /// [`FirewallOutcome::Failed`].
    pub async fn ensure_firewall_rule(
        &self,
        target: &AzureTarget,
        db: &DatabaseConfig,
    ) -> FirewallOutcome {
        let result = self
            .exec(&args([
                "sql",
                "server",
                "firewall-rule",
                "create",
                "--resource-group",
                &target.resource_group,
                "--server",
                &db.server,
                "--name",
                AZURE_SERVICES_RULE,
                "--start-ip-address",
                "0.0.0.0",
                "--end-ip-address",
                "0.0.0.0",
                "--output",
                "none",
            ]))
            .await;

        match result {
            Ok(_) => FirewallOutcome::Created,
            Err(e) if e.is_already_exists() => FirewallOutcome::AlreadyExists,
            Err(e) => FirewallOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Database: created once with the serverless sizing, never altered.
    pub async fn ensure_database(
        &self,
        target: &AzureTarget,
        db: &DatabaseConfig,
    ) -> Result<Provisioned, ProvisionError> {
        let database = Resource::SqlDatabase {
            group: &target.resource_group,
            server: &db.server,
            name: &db.name,
        };
        if self.state(&database).await?.exists() {
            return Ok(Provisioned::Unchanged);
        }

        self.exec(&args([
            "sql",
            "db",
            "create",
            "--resource-group",
            &target.resource_group,
            "--server",
            &db.server,
            "--name",
            &db.name,
            "--edition",
            DB_EDITION,
            "--family",
            DB_FAMILY,
            "--capacity",
            DB_CAPACITY,
            "--compute-model",
            "Serverless",
            "--min-capacity",
            DB_MIN_CAPACITY,
            "--auto-pause-delay",
            DB_AUTO_PAUSE_MINUTES,
            "--output",
            "none",
        ]))
        .await
        .map_err(|e| ProvisionError::Create {
            kind: ResourceKind::SqlDatabase,
            source: e,
        })?;

        Ok(Provisioned::Created)
    }

    /// Registry: created with the admin user enabled; an existing registry
    /// only gets the admin user switched on.
    pub async fn ensure_registry(
        &self,
        target: &AzureTarget,
        registry: &RegistryConfig,
    ) -> Result<Provisioned, ProvisionError> {
        let acr = Resource::Registry {
            group: &target.resource_group,
            name: &registry.name,
        };

        match self.state(&acr).await? {
            ResourceState::UpToDate => Ok(Provisioned::Unchanged),
            ResourceState::NeedsUpdate => {
                self.exec(&args([
                    "acr",
                    "update",
                    "--resource-group",
                    &target.resource_group,
                    "--name",
                    &registry.name,
                    "--admin-enabled",
                    "true",
                    "--output",
                    "none",
                ]))
                .await
                .map_err(|e| ProvisionError::Update {
                    kind: ResourceKind::Registry,
                    source: e,
                })?;
                Ok(Provisioned::Updated)
            }
            ResourceState::Absent => {
                self.exec(&args([
                    "acr",
                    "create",
                    "--resource-group",
                    &target.resource_group,
                    "--name",
                    &registry.name,
                    "--location",
                    &target.location,
                    "--sku",
                    &registry.sku,
                    "--admin-enabled",
                    "true",
                    "--output",
                    "none",
                ]))
                .await
                .map_err(|e| ProvisionError::Create {
                    kind: ResourceKind::Registry,
                    source: e,
                })?;
                Ok(Provisioned::Created)
            }
        }
    }

    /// Login server and admin credentials of the registry.
    pub async fn registry_credentials(
        &self,
        target: &AzureTarget,
        registry: &RegistryConfig,
    ) -> Result<RegistryCredentials, ProvisionError> {
        let login_server = self
            .exec(&args([
                "acr",
                "show",
                "--resource-group",
                &target.resource_group,
                "--name",
                &registry.name,
                "--query",
                "loginServer",
                "--output",
                "tsv",
            ]))
            .await
            .map_err(|e| ProvisionError::Credentials { source: e })?
            .trim()
            .to_owned();

        let show = args([
            "acr",
            "credential",
            "show",
            "--resource-group",
            &target.resource_group,
            "--name",
            &registry.name,
            "--output",
            "json",
        ]);
        let raw = self
            .exec(&show)
            .await
            .map_err(|e| ProvisionError::Credentials { source: e })?;

        parse_credentials(login_server, &raw)
    }

    /// Container Apps environment: created once with no log destination.
    pub async fn ensure_environment(
        &self,
        target: &AzureTarget,
        app: &AppConfig,
    ) -> Result<Provisioned, ProvisionError> {
        let env = Resource::Environment {
            group: &target.resource_group,
            name: &app.environment,
        };
        if self.state(&env).await?.exists() {
            return Ok(Provisioned::Unchanged);
        }

        self.exec(&args([
            "containerapp",
            "env",
            "create",
            "--resource-group",
            &target.resource_group,
            "--name",
            &app.environment,
            "--location",
            &target.location,
            "--logs-destination",
            "none",
            "--output",
            "none",
        ]))
        .await
        .map_err(|e| ProvisionError::Create {
            kind: ResourceKind::Environment,
            source: e,
        })?;

        Ok(Provisioned::Created)
    }
}

#[derive(Deserialize)]
struct AcrCredentialDoc {
    username: String,
    #[serde(default)]
    passwords: Vec<AcrPassword>,
}

#[derive(Deserialize)]
struct AcrPassword {
    value: String,
}

fn parse_credentials(
    login_server: String,
    raw: &str,
) -> Result<RegistryCredentials, ProvisionError> {
    if login_server.is_empty() {
        return Err(ProvisionError::InvalidCredentials("registry has no login server"));
    }

    let doc: AcrCredentialDoc =
        serde_json::from_str(raw).map_err(|e| ProvisionError::Credentials {
            source: AzError::InvalidOutput {
                command: "acr credential show".to_owned(),
                source: e,
            },
        })?;

    let password = doc
        .passwords
        .into_iter()
        .next()
        .map(|p| p.value)
        .filter(|v| !v.is_empty())
        .ok_or(ProvisionError::InvalidCredentials(
            "registry admin user has no password",
        ))?;

    Ok(RegistryCredentials {
        login_server,
        username: doc.username,
        password: SecretString::from(password),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("failed to create {kind}")]
    Create {
        kind: ResourceKind,
        source: AzError,
    },

    #[error("failed to update {kind}")]
    Update {
        kind: ResourceKind,
        source: AzError,
    },

    #[error("failed to read registry credentials")]
    Credentials { source: AzError },

    #[error("unusable registry credentials: {0}")]
    InvalidCredentials(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_password() {
        let raw = r#"{
            "username": "acrgemba",
            "passwords": [
                { "name": "password", "value": "first" },
                { "name": "password2", "value": "second" }
            ]
        }"#;
        let creds = parse_credentials("acrgemba.azurecr.io".to_owned(), raw).unwrap();
        assert_eq!(creds.username, "acrgemba");
        assert_eq!(creds.password.expose_secret(), "first");
        assert_eq!(creds.login_server, "acrgemba.azurecr.io");
    }

    #[test]
    fn rejects_missing_password() {
        let raw = r#"{ "username": "acrgemba", "passwords": [] }"#;
        let err = parse_credentials("acrgemba.azurecr.io".to_owned(), raw).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidCredentials(_)));
    }

    #[test]
    fn rejects_empty_login_server() {
        let raw = r#"{ "username": "acrgemba", "passwords": [{ "value": "x" }] }"#;
        let err = parse_credentials(String::new(), raw).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidCredentials(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = parse_credentials("acrgemba.azurecr.io".to_owned(), "not json").unwrap_err();
        assert!(matches!(err, ProvisionError::Credentials { .. }));
    }
}
