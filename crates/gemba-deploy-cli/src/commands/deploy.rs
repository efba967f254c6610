use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use gemba_deploy_build::{BuildContext, source_revision};
use gemba_deploy_cloud::{AzClient, Provisioned};
use gemba_deploy_core::{ConfigSources, DeploymentConfig, Summary};

use super::deploy_pipeline;

/// Resolve configuration, then run the full provision/build/deploy pipeline.
pub async fn deploy(config_file: Option<&Path>) -> anyhow::Result<()> {
    let working_dir = PathBuf::from(".");

    // Preconditions: nothing below touches Azure until these pass.
    let sources = ConfigSources::load(config_file, &working_dir, process_env())
        .context("configuration")?;
    let config = DeploymentConfig::resolve(
        &sources,
        |context| source_revision(&working_dir.join(context)),
        chrono::Utc::now(),
    )
    .context("configuration")?;
    let context = BuildContext::locate(&working_dir, &config.image).context("build context")?;

    let client = AzClient::new();
    let outcome = deploy_pipeline::run(&client, &config, &context).await?;

    let created = outcome
        .provisioned
        .iter()
        .filter(|(_, p)| *p == Provisioned::Created)
        .count();
    tracing::info!(
        created,
        firewall = ?outcome.firewall,
        activation = ?outcome.activation,
        "deploy complete"
    );

    println!();
    println!(
        "{}",
        Summary::new(&config, &outcome.image_reference, &outcome.public_url)
    );

    Ok(())
}

/// Snapshot of the process environment, skipping non-UTF-8 entries.
fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| {
            // arch-lint: allow(no-silent-result-drop) reason="non-UTF-8 variables can never match a config name"
            Some((k.into_string().ok()?, v.into_string().ok()?))
        })
        .collect()
}
