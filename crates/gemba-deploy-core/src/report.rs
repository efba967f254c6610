use std::fmt;

use crate::config::DeploymentConfig;

/// Final operator report of a deploy run.
pub struct Summary<'a> {
    pub config: &'a DeploymentConfig,
    pub image_reference: &'a str,
    pub public_url: &'a str,
}

impl<'a> Summary<'a> {
    pub fn new(
        config: &'a DeploymentConfig,
        image_reference: &'a str,
        public_url: &'a str,
    ) -> Self {
        Self {
            config,
            image_reference,
            public_url,
        }
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.config;
        writeln!(f, "Deployment complete")?;
        writeln!(
            f,
            "  Resource group : {} ({})",
            c.target.resource_group, c.target.location
        )?;
        writeln!(f, "  Subscription   : {}", c.target.subscription_id)?;
        writeln!(f, "  Public URL     : {}", self.public_url)?;
        writeln!(f, "  Image          : {}", self.image_reference)?;
        writeln!(f, "  Container App  : {} (env {})", c.app.name, c.app.environment)?;
        writeln!(
            f,
            "  Replicas       : {}..{}",
            c.app.min_replicas, c.app.max_replicas
        )?;
        writeln!(f, "  OpenAI endpoint: {}", c.llm.endpoint)?;
        writeln!(
            f,
            "  OpenAI deploy  : {} (api {})",
            c.llm.deployment, c.llm.api_version
        )?;
        write!(
            f,
            "  Database       : {}/{} ({})",
            c.database.host(),
            c.database.name,
            c.database.location
        )
    }
}
