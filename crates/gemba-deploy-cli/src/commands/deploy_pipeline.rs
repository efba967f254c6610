use anyhow::Context;
use gemba_deploy_build::BuildContext;
use gemba_deploy_cloud::provision::AZURE_SERVICES_RULE;
use gemba_deploy_cloud::{
    Activation, AzClient, AzExecutor, FirewallOutcome, Provisioned, ResourceKind, RestartOutcome,
};
use gemba_deploy_core::{DeploymentConfig, EnvironmentBinding, RegistryCredentials};

/// Result of a successful pipeline run.
#[derive(Debug)]
pub(crate) struct DeployOutcome {
    /// What each `ensure_*` step did, in dependency order. The Container
    /// App is reported through `activation` instead.
    pub provisioned: Vec<(ResourceKind, Provisioned)>,
    pub firewall: FirewallOutcome,
    pub image_reference: String,
    pub activation: Activation,
    pub public_url: String,
}

/// Run the pipeline: preflight → provision → build → compose → activate.
///
/// Every step aborts the run on failure. Nothing is rolled back; running
/// again converges from wherever the previous run stopped.
pub(crate) async fn run<E: AzExecutor>(
    client: &AzClient<E>,
    config: &DeploymentConfig,
    context: &BuildContext,
) -> anyhow::Result<DeployOutcome> {
    preflight(client, config).await?;
    let infra = provision(client, config).await?;
    let image_reference = build(client, config, &infra.registry, context).await?;
    let binding = EnvironmentBinding::compose(config, infra.registry);
    let (activation, public_url) = activate(client, config, &image_reference, &binding).await?;

    Ok(DeployOutcome {
        provisioned: infra.provisioned,
        firewall: infra.firewall,
        image_reference,
        activation,
        public_url,
    })
}

struct Infrastructure {
    provisioned: Vec<(ResourceKind, Provisioned)>,
    firewall: FirewallOutcome,
    registry: RegistryCredentials,
}

async fn preflight<E: AzExecutor>(
    client: &AzClient<E>,
    config: &DeploymentConfig,
) -> anyhow::Result<()> {
    println!("Running pre-flight checks...");
    let report = client
        .check_prerequisites(&config.target.subscription_id)
        .await
        .context("pre-flight")?;
    tracing::info!(
        az = report.az_version.as_deref().unwrap_or("unknown"),
        account = report.account.as_deref().unwrap_or("unknown"),
        "pre-flight passed"
    );
    Ok(())
}

async fn provision<E: AzExecutor>(
    client: &AzClient<E>,
    config: &DeploymentConfig,
) -> anyhow::Result<Infrastructure> {
    let target = &config.target;
    let mut provisioned = Vec::with_capacity(5);

    println!("Ensuring resource group '{}'...", target.resource_group);
    let outcome = client.ensure_resource_group(target).await.context("resource group")?;
    provisioned.push(step(ResourceKind::ResourceGroup, outcome));

    println!("Ensuring SQL server '{}'...", config.database.server);
    let outcome = client
        .ensure_sql_server(target, &config.database)
        .await
        .context("SQL server")?;
    provisioned.push(step(ResourceKind::SqlServer, outcome));

    let firewall = client.ensure_firewall_rule(target, &config.database).await;
    match &firewall {
        FirewallOutcome::Created => println!("  firewall rule {AZURE_SERVICES_RULE} created"),
        FirewallOutcome::AlreadyExists => {
            tracing::info!(rule = AZURE_SERVICES_RULE, "firewall rule already exists");
        }
        FirewallOutcome::Failed { reason } => {
            tracing::error!(
                rule = AZURE_SERVICES_RULE,
                %reason,
                "firewall rule not created, continuing"
            );
        }
    }

    println!("Ensuring SQL database '{}'...", config.database.name);
    let outcome = client
        .ensure_database(target, &config.database)
        .await
        .context("SQL database")?;
    provisioned.push(step(ResourceKind::SqlDatabase, outcome));

    println!("Ensuring container registry '{}'...", config.registry.name);
    let outcome = client
        .ensure_registry(target, &config.registry)
        .await
        .context("container registry")?;
    provisioned.push(step(ResourceKind::Registry, outcome));
    let registry = client
        .registry_credentials(target, &config.registry)
        .await
        .context("container registry")?;

    println!(
        "Ensuring Container Apps environment '{}'...",
        config.app.environment
    );
    let outcome = client
        .ensure_environment(target, &config.app)
        .await
        .context("Container Apps environment")?;
    provisioned.push(step(ResourceKind::Environment, outcome));

    Ok(Infrastructure {
        provisioned,
        firewall,
        registry,
    })
}

fn step(kind: ResourceKind, outcome: Provisioned) -> (ResourceKind, Provisioned) {
    let label = match outcome {
        Provisioned::Created => "created",
        Provisioned::Updated => "updated",
        Provisioned::Unchanged => "already up to date",
    };
    println!("  {label}");
    tracing::info!(%kind, ?outcome, "provisioned");
    (kind, outcome)
}

async fn build<E: AzExecutor>(
    client: &AzClient<E>,
    config: &DeploymentConfig,
    registry: &RegistryCredentials,
    context: &BuildContext,
) -> anyhow::Result<String> {
    println!(
        "Building {}:{} in {}...",
        config.image.name, config.image.tag, config.registry.name
    );
    let reference = client
        .build_image(
            &config.target,
            &config.registry,
            &registry.login_server,
            &config.image,
            &context.dir,
            &context.dockerfile,
        )
        .await
        .context("image build")?;
    println!("  pushed {reference}");
    Ok(reference)
}

async fn activate<E: AzExecutor>(
    client: &AzClient<E>,
    config: &DeploymentConfig,
    image_reference: &str,
    binding: &EnvironmentBinding,
) -> anyhow::Result<(Activation, String)> {
    println!("Deploying Container App '{}'...", config.app.name);
    let activation = client
        .activate(&config.target, &config.app, image_reference, binding)
        .await
        .context("Container App")?;

    match &activation {
        Activation::Created => println!("  created"),
        Activation::Updated { restart } => {
            println!("  updated");
            match restart {
                RestartOutcome::Restarted { revision } => {
                    println!("  restarted revision {revision}");
                }
                RestartOutcome::NoActiveRevision => {
                    tracing::warn!("no active revision found, skipping restart");
                }
                RestartOutcome::Failed { revision, reason } => {
                    tracing::warn!(?revision, %reason, "revision restart failed, continuing");
                }
            }
        }
    }

    let url = client
        .public_url(&config.target, &config.app)
        .await
        .context("Container App")?;
    Ok((activation, url))
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    use gemba_deploy_cloud::AzError;
    use gemba_deploy_core::ConfigSources;

    use super::*;

    /// In-memory Azure: answers `az` invocations from a small state model
    /// and records every call.
    #[derive(Default)]
    struct FakeAz {
        cloud: Mutex<Cloud>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[derive(Default)]
    struct Cloud {
        present: HashSet<ResourceKind>,
        server_tagged: bool,
        admin_enabled: bool,
        firewall_rule: bool,
        deny_firewall: bool,
        active_revision: Option<String>,
        deny_probe: Option<ResourceKind>,
    }

    fn not_found() -> AzError {
        AzError::CommandFailed {
            command: "show".to_owned(),
            code: Some(3),
            stderr: "ERROR: (ResourceNotFound) not found".to_owned(),
        }
    }

    fn failed(stderr: &str) -> AzError {
        AzError::CommandFailed {
            command: "fake".to_owned(),
            code: Some(1),
            stderr: stderr.to_owned(),
        }
    }

    fn show_kind(words: &[&str]) -> Option<ResourceKind> {
        match words {
            ["group", "show", ..] => Some(ResourceKind::ResourceGroup),
            ["sql", "server", "show", ..] => Some(ResourceKind::SqlServer),
            ["sql", "db", "show", ..] => Some(ResourceKind::SqlDatabase),
            ["acr", "show", ..] => Some(ResourceKind::Registry),
            ["containerapp", "env", "show", ..] => Some(ResourceKind::Environment),
            ["containerapp", "show", ..] => Some(ResourceKind::ContainerApp),
            _ => None,
        }
    }

    fn create_kind(words: &[&str]) -> Option<ResourceKind> {
        match words {
            ["group", "create", ..] => Some(ResourceKind::ResourceGroup),
            ["sql", "server", "create", ..] => Some(ResourceKind::SqlServer),
            ["sql", "db", "create", ..] => Some(ResourceKind::SqlDatabase),
            ["acr", "create", ..] => Some(ResourceKind::Registry),
            ["containerapp", "env", "create", ..] => Some(ResourceKind::Environment),
            ["containerapp", "create", ..] => Some(ResourceKind::ContainerApp),
            _ => None,
        }
    }

    impl FakeAz {
        fn with_cloud(cloud: Cloud) -> Self {
            Self {
                cloud: Mutex::new(cloud),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn creates(&self) -> Vec<ResourceKind> {
            self.calls()
                .iter()
                .filter_map(|c| create_kind(&words(c)))
                .collect()
        }

        fn position(&self, prefix: &[&str]) -> Option<usize> {
            self.calls()
                .iter()
                .position(|c| words(c).starts_with(prefix))
        }

        fn count(&self, prefix: &[&str]) -> usize {
            self.calls()
                .iter()
                .filter(|c| words(c).starts_with(prefix))
                .count()
        }
    }

    fn words(args: &[String]) -> Vec<&str> {
        args.iter().map(String::as_str).collect()
    }

    impl AzExecutor for FakeAz {
        async fn exec(&self, args: &[String]) -> Result<String, AzError> {
            self.calls.lock().unwrap().push(args.to_vec());
            let w = words(args);
            let has = |flag: &str| w.contains(&flag);
            let mut cloud = self.cloud.lock().unwrap();

            if let Some(kind) = show_kind(&w) {
                if cloud.deny_probe == Some(kind) {
                    return Err(failed("ERROR: (AuthorizationFailed) denied"));
                }
                if !cloud.present.contains(&kind) {
                    return Err(not_found());
                }
                if has("loginServer") {
                    return Ok("acrgemba.azurecr.io\n".to_owned());
                }
                if has("properties.configuration.ingress.fqdn") {
                    return Ok("ca-gemba.example.japaneast.azurecontainerapps.io\n".to_owned());
                }
                let body = match kind {
                    ResourceKind::SqlServer if cloud.server_tagged => {
                        serde_json::json!({ "tags": { "SecurityControl": "Ignore" } })
                    }
                    ResourceKind::SqlServer => serde_json::json!({ "tags": {} }),
                    ResourceKind::Registry => {
                        serde_json::json!({ "adminUserEnabled": cloud.admin_enabled })
                    }
                    _ => serde_json::json!({ "name": "x" }),
                };
                return Ok(body.to_string());
            }

            if let Some(kind) = create_kind(&w) {
                if cloud.present.contains(&kind) {
                    return Err(failed("already exists"));
                }
                cloud.present.insert(kind);
                if kind == ResourceKind::Registry {
                    cloud.admin_enabled = true;
                }
                if kind == ResourceKind::ContainerApp {
                    cloud.active_revision = Some("ca-gemba--rev1".to_owned());
                }
                return Ok(String::new());
            }

            match w.as_slice() {
                ["version", ..] => Ok("2.67.0\n".to_owned()),
                ["account", "show", ..] => Ok("ops@example.com\n".to_owned()),
                ["account", "set", ..] | ["extension", "add", ..] => Ok(String::new()),
                ["sql", "server", "update", ..] => {
                    cloud.server_tagged = true;
                    Ok(String::new())
                }
                ["sql", "server", "firewall-rule", "create", ..] => {
                    if cloud.deny_firewall {
                        Err(failed("ERROR: (AuthorizationFailed) denied"))
                    } else if cloud.firewall_rule {
                        Err(failed("firewall rule already exists"))
                    } else {
                        cloud.firewall_rule = true;
                        Ok(String::new())
                    }
                }
                ["acr", "update", ..] => {
                    cloud.admin_enabled = true;
                    Ok(String::new())
                }
                ["acr", "credential", "show", ..] => Ok(serde_json::json!({
                    "username": "acrgemba",
                    "passwords": [{ "name": "password", "value": "acr-pass" }]
                })
                .to_string()),
                ["containerapp", "secret", "set", ..] | ["containerapp", "update", ..] => {
                    Ok(String::new())
                }
                ["containerapp", "revision", "list", ..] => Ok(cloud
                    .active_revision
                    .clone()
                    .map(|r| format!("{r}\n"))
                    .unwrap_or_default()),
                ["containerapp", "revision", "restart", ..] => Ok(String::new()),
                _ => Err(failed("unexpected command")),
            }
        }

        async fn exec_streaming(&self, args: &[String]) -> Result<(), AzError> {
            self.calls.lock().unwrap().push(args.to_vec());
            let registry_exists = self
                .cloud
                .lock()
                .unwrap()
                .present
                .contains(&ResourceKind::Registry);
            if words(args).starts_with(&["acr", "build"]) && registry_exists {
                Ok(())
            } else {
                Err(failed("registry not found"))
            }
        }
    }

    fn config() -> DeploymentConfig {
        let env: HashMap<String, String> = [
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("AZURE_RESOURCE_GROUP", "rg-gemba"),
            ("AZURE_LOCATION", "japaneast"),
            ("AZURE_OPENAI_ENDPOINT", "https://gemba.openai.azure.com/"),
            ("AZURE_OPENAI_API_KEY", "sk-test"),
            ("AZURE_OPENAI_API_VERSION", "2024-08-01-preview"),
            ("AZURE_OPENAI_DEPLOYMENT", "gpt-4o-mini"),
            ("DEFAULT_LLM_MODEL", "gpt-4o-mini"),
            ("AZURE_SQL_SERVER", "sql-gemba"),
            ("AZURE_SQL_DATABASE", "gemba"),
            ("AZURE_SQL_ADMIN_USER", "gembaadmin"),
            ("AZURE_SQL_ADMIN_PASSWORD", "P@ss/word!42"),
            ("AZURE_ACR_NAME", "acrgemba"),
            ("AZURE_CONTAINERAPPS_ENV", "cae-gemba"),
            ("AZURE_CONTAINERAPP_NAME", "ca-gemba"),
            ("IMAGE_TAG", "abc123"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        DeploymentConfig::resolve(
            &ConfigSources::from_layers(vec![env]),
            |_| None,
            chrono::Utc::now(),
        )
        .unwrap()
    }

    fn context() -> BuildContext {
        BuildContext {
            dir: PathBuf::from("."),
            dockerfile: PathBuf::from("Dockerfile"),
        }
    }

    #[tokio::test]
    async fn fresh_subscription_creates_everything_in_dependency_order() {
        let fake = FakeAz::default();
        let client = AzClient::with_executor(fake);

        let outcome = run(&client, &config(), &context()).await.unwrap();

        let fake = client_executor(&client);
        assert_eq!(fake.creates(), ResourceKind::ORDER.to_vec());
        assert_eq!(outcome.image_reference, "acrgemba.azurecr.io/gemba-score:abc123");
        assert_eq!(outcome.activation, Activation::Created);
        assert_eq!(outcome.firewall, FirewallOutcome::Created);
        assert_eq!(
            outcome.public_url,
            "https://ca-gemba.example.japaneast.azurecontainerapps.io"
        );
        assert!(
            outcome
                .provisioned
                .iter()
                .all(|(_, p)| *p == Provisioned::Created)
        );
        assert_eq!(fake.count(&["containerapp", "secret", "set"]), 0);
        assert_eq!(fake.count(&["containerapp", "revision"]), 0);

        // The registry must exist before the build, the image before the app.
        let acr_create = fake.position(&["acr", "create"]).unwrap();
        let build = fake.position(&["acr", "build"]).unwrap();
        let app_create = fake.position(&["containerapp", "create"]).unwrap();
        assert!(acr_create < build && build < app_create);
    }

    #[tokio::test]
    async fn second_run_creates_nothing() {
        let client = AzClient::with_executor(FakeAz::default());
        let config = config();

        run(&client, &config, &context()).await.unwrap();
        let first_calls = client_executor(&client).calls().len();

        let outcome = run(&client, &config, &context()).await.unwrap();

        let fake = client_executor(&client);
        let second: Vec<Vec<String>> = fake.calls().split_off(first_calls);
        assert!(second.iter().all(|c| create_kind(&words(c)).is_none()));
        assert_eq!(outcome.firewall, FirewallOutcome::AlreadyExists);
        assert!(matches!(
            outcome.activation,
            Activation::Updated {
                restart: RestartOutcome::Restarted { .. }
            }
        ));
        // Only the security tag lands on the now-existing server.
        assert_eq!(
            outcome.provisioned,
            vec![
                (ResourceKind::ResourceGroup, Provisioned::Unchanged),
                (ResourceKind::SqlServer, Provisioned::Updated),
                (ResourceKind::SqlDatabase, Provisioned::Unchanged),
                (ResourceKind::Registry, Provisioned::Unchanged),
                (ResourceKind::Environment, Provisioned::Unchanged),
            ]
        );
    }

    #[tokio::test]
    async fn converged_run_changes_no_resources() {
        let client = AzClient::with_executor(FakeAz::default());
        let config = config();

        run(&client, &config, &context()).await.unwrap();
        run(&client, &config, &context()).await.unwrap();
        let outcome = run(&client, &config, &context()).await.unwrap();

        assert!(
            outcome
                .provisioned
                .iter()
                .all(|(_, p)| *p == Provisioned::Unchanged)
        );
    }

    #[tokio::test]
    async fn update_path_sets_secrets_before_image() {
        let fake = FakeAz::with_cloud(Cloud {
            present: ResourceKind::ORDER.into_iter().collect(),
            server_tagged: true,
            admin_enabled: true,
            firewall_rule: true,
            deny_firewall: false,
            active_revision: Some("ca-gemba--rev7".to_owned()),
            deny_probe: None,
        });
        let client = AzClient::with_executor(fake);

        run(&client, &config(), &context()).await.unwrap();

        let fake = client_executor(&client);
        let secrets = fake.position(&["containerapp", "secret", "set"]).unwrap();
        let update = fake.position(&["containerapp", "update"]).unwrap();
        let restart = fake
            .position(&["containerapp", "revision", "restart"])
            .unwrap();
        assert!(secrets < update && update < restart);
        assert!(fake.creates().is_empty());
    }

    #[tokio::test]
    async fn missing_active_revision_still_succeeds() {
        let fake = FakeAz::with_cloud(Cloud {
            present: ResourceKind::ORDER.into_iter().collect(),
            server_tagged: true,
            admin_enabled: true,
            firewall_rule: true,
            deny_firewall: false,
            active_revision: None,
            deny_probe: None,
        });
        let client = AzClient::with_executor(fake);

        let outcome = run(&client, &config(), &context()).await.unwrap();

        assert_eq!(
            outcome.activation,
            Activation::Updated {
                restart: RestartOutcome::NoActiveRevision
            }
        );
        assert_eq!(
            client_executor(&client).count(&["containerapp", "revision", "restart"]),
            0
        );
    }

    #[tokio::test]
    async fn firewall_failure_is_reported_but_not_fatal() {
        let fake = FakeAz::with_cloud(Cloud {
            deny_firewall: true,
            ..Cloud::default()
        });
        let client = AzClient::with_executor(fake);

        let outcome = run(&client, &config(), &context()).await.unwrap();

        assert!(matches!(
            outcome.firewall,
            FirewallOutcome::Failed { ref reason } if reason.contains("AuthorizationFailed")
        ));
        assert_eq!(outcome.activation, Activation::Created);
    }

    #[tokio::test]
    async fn probe_failure_aborts_before_later_steps() {
        let fake = FakeAz::with_cloud(Cloud {
            deny_probe: Some(ResourceKind::SqlDatabase),
            ..Cloud::default()
        });
        let client = AzClient::with_executor(fake);

        let err = run(&client, &config(), &context()).await.unwrap_err();

        assert!(format!("{err:#}").starts_with("SQL database: failed to look up SQL database"));
        let fake = client_executor(&client);
        assert_eq!(
            fake.creates(),
            vec![ResourceKind::ResourceGroup, ResourceKind::SqlServer]
        );
        assert_eq!(fake.count(&["acr"]), 0);
    }

    #[tokio::test]
    async fn secrets_never_reach_the_recorded_labels() {
        let client = AzClient::with_executor(FakeAz::default());
        run(&client, &config(), &context()).await.unwrap();

        for call in client_executor(&client).calls() {
            let label = gemba_deploy_cloud::az::command_label(&call);
            assert!(!label.contains("sk-test"));
            assert!(!label.contains("P@ss"));
            assert!(!label.contains("acr-pass"));
        }
    }

    fn client_executor(client: &AzClient<FakeAz>) -> &FakeAz {
        client.executor()
    }
}
