use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::tag::derive_image_tag;

/// Conventional config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "deploy.env";

pub const AZURE_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const AZURE_RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP";
pub const AZURE_LOCATION: &str = "AZURE_LOCATION";
pub const AZURE_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const AZURE_OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const AZURE_OPENAI_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";
pub const DEFAULT_LLM_MODEL: &str = "DEFAULT_LLM_MODEL";
pub const AZURE_SQL_SERVER: &str = "AZURE_SQL_SERVER";
pub const AZURE_SQL_DATABASE: &str = "AZURE_SQL_DATABASE";
pub const AZURE_SQL_ADMIN_USER: &str = "AZURE_SQL_ADMIN_USER";
pub const AZURE_SQL_ADMIN_PASSWORD: &str = "AZURE_SQL_ADMIN_PASSWORD";
pub const AZURE_ACR_NAME: &str = "AZURE_ACR_NAME";
pub const AZURE_CONTAINERAPPS_ENV: &str = "AZURE_CONTAINERAPPS_ENV";
pub const AZURE_CONTAINERAPP_NAME: &str = "AZURE_CONTAINERAPP_NAME";

pub const AZURE_ACR_SKU: &str = "AZURE_ACR_SKU";
pub const IMAGE_NAME: &str = "IMAGE_NAME";
pub const IMAGE_TAG: &str = "IMAGE_TAG";
pub const MIN_REPLICAS: &str = "MIN_REPLICAS";
pub const MAX_REPLICAS: &str = "MAX_REPLICAS";
pub const AZURE_SQL_LOCATION: &str = "AZURE_SQL_LOCATION";
pub const BUILD_CONTEXT: &str = "BUILD_CONTEXT";
pub const DOCKERFILE: &str = "DOCKERFILE";

/// Variables that must resolve to a non-empty value, in validation order.
pub const REQUIRED_VARS: &[&str] = &[
    AZURE_SUBSCRIPTION_ID,
    AZURE_RESOURCE_GROUP,
    AZURE_LOCATION,
    AZURE_OPENAI_ENDPOINT,
    AZURE_OPENAI_API_KEY,
    AZURE_OPENAI_API_VERSION,
    AZURE_OPENAI_DEPLOYMENT,
    DEFAULT_LLM_MODEL,
    AZURE_SQL_SERVER,
    AZURE_SQL_DATABASE,
    AZURE_SQL_ADMIN_USER,
    AZURE_SQL_ADMIN_PASSWORD,
    AZURE_ACR_NAME,
    AZURE_CONTAINERAPPS_ENV,
    AZURE_CONTAINERAPP_NAME,
];

/// Optional variables and a human-readable description of their default.
pub const OPTIONAL_VARS: &[(&str, &str)] = &[
    (AZURE_ACR_SKU, "Basic"),
    (IMAGE_NAME, "gemba-score"),
    (IMAGE_TAG, "short git revision, else UTC timestamp"),
    (MIN_REPLICAS, "1"),
    (MAX_REPLICAS, "3"),
    (AZURE_SQL_LOCATION, "AZURE_LOCATION"),
    (BUILD_CONTEXT, "."),
    (DOCKERFILE, "Dockerfile"),
];

const DEFAULT_ACR_SKU: &str = "Basic";
const DEFAULT_IMAGE_NAME: &str = "gemba-score";
const DEFAULT_MIN_REPLICAS: u32 = 1;
const DEFAULT_MAX_REPLICAS: u32 = 3;
const DEFAULT_BUILD_CONTEXT: &str = ".";
const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Layered configuration sources, highest precedence first.
///
/// Files are parsed with dotenvy without touching the process
/// environment; the environment itself is handed in as a map.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    layers: Vec<HashMap<String, String>>,
}

impl ConfigSources {
    /// Collect the override file (must exist when given), the conventional
    /// `deploy.env` in `working_dir` (if present), then `env`.
    pub fn load(
        override_file: Option<&Path>,
        working_dir: &Path,
        env: HashMap<String, String>,
    ) -> crate::Result<Self> {
        let mut layers = Vec::with_capacity(3);

        if let Some(path) = override_file {
            layers.push(read_env_file(path)?);
        }

        let conventional = working_dir.join(DEFAULT_CONFIG_FILE);
        if conventional.is_file() {
            layers.push(read_env_file(&conventional)?);
        }

        layers.push(env);
        Ok(Self { layers })
    }

    /// Build directly from in-memory layers, highest precedence first.
    pub fn from_layers(layers: Vec<HashMap<String, String>>) -> Self {
        Self { layers }
    }

    /// First non-blank value for `name` across the layers, returned
    /// exactly as written. Surrounding whitespace is significant in
    /// secrets.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.layers
            .iter()
            .filter_map(|layer| layer.get(name))
            .find(|v| !v.trim().is_empty())
            .map(String::as_str)
    }
}

fn read_env_file(path: &Path) -> crate::Result<HashMap<String, String>> {
    let load_err = |e| crate::Error::ConfigLoad {
        path: path.to_path_buf(),
        source: e,
    };
    dotenvy::from_path_iter(path)
        .map_err(load_err)?
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(load_err)
}

/// Subscription, resource group and region everything lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureTarget {
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
}

/// Azure SQL server and database.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub server: String,
    pub name: String,
    pub admin_user: String,
    pub admin_password: SecretString,
    /// Region of the SQL server; defaults to [`AzureTarget::location`].
    pub location: String,
}

impl DatabaseConfig {
    /// `<server>.database.windows.net`
    pub fn host(&self) -> String {
        format!("{}.database.windows.net", self.server)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("server", &self.server)
            .field("name", &self.name)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"[REDACTED]")
            .field("location", &self.location)
            .finish()
    }
}

/// Azure Container Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub name: String,
    pub sku: String,
}

/// Container Apps environment and the app itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: String,
    pub name: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

/// Container image naming and build inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    pub name: String,
    pub tag: String,
    /// Directory sent to the remote build.
    pub context: PathBuf,
    /// Build definition, relative to `context`.
    pub dockerfile: PathBuf,
}

/// Upstream Azure OpenAI settings forwarded to the app.
#[derive(Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub api_version: String,
    pub deployment: String,
    pub default_model: String,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Fully resolved deployment parameters.
///
/// Built once by [`DeploymentConfig::resolve`] and passed by reference to
/// every later step. Every required field is non-empty.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub target: AzureTarget,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub app: AppConfig,
    pub image: ImageConfig,
    pub llm: LlmConfig,
}

impl DeploymentConfig {
    /// Validate and resolve a config from `sources`.
    ///
    /// All missing required names are reported together. `revision_of`
    /// is only consulted when no `IMAGE_TAG` is supplied; it receives the
    /// resolved build context.
    pub fn resolve(
        sources: &ConfigSources,
        revision_of: impl FnOnce(&Path) -> Option<String>,
        now: DateTime<Utc>,
    ) -> crate::Result<Self> {
        let missing: Vec<&'static str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| sources.get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(crate::Error::MissingConfig { names: missing });
        }

        // Names and numbers are trimmed; secrets are taken verbatim.
        let required = |name: &str| sources.get(name).unwrap_or_default().trim().to_owned();
        let secret =
            |name: &str| SecretString::from(sources.get(name).unwrap_or_default().to_owned());
        let optional = |name: &str, default: &str| {
            sources.get(name).map(str::trim).unwrap_or(default).to_owned()
        };

        let min_replicas = parse_count(sources, MIN_REPLICAS, DEFAULT_MIN_REPLICAS)?;
        let max_replicas = parse_count(sources, MAX_REPLICAS, DEFAULT_MAX_REPLICAS)?;
        if min_replicas > max_replicas {
            return Err(crate::Error::InvalidReplicaBounds {
                min: min_replicas,
                max: max_replicas,
            });
        }

        let location = required(AZURE_LOCATION);
        let context = PathBuf::from(optional(BUILD_CONTEXT, DEFAULT_BUILD_CONTEXT));
        let tag = match sources.get(IMAGE_TAG) {
            Some(tag) => tag.trim().to_owned(),
            None => derive_image_tag(None, revision_of(&context).as_deref(), now),
        };

        let config = Self {
            target: AzureTarget {
                subscription_id: required(AZURE_SUBSCRIPTION_ID),
                resource_group: required(AZURE_RESOURCE_GROUP),
                location: location.clone(),
            },
            database: DatabaseConfig {
                server: required(AZURE_SQL_SERVER),
                name: required(AZURE_SQL_DATABASE),
                admin_user: required(AZURE_SQL_ADMIN_USER),
                admin_password: secret(AZURE_SQL_ADMIN_PASSWORD),
                location: optional(AZURE_SQL_LOCATION, &location),
            },
            registry: RegistryConfig {
                name: required(AZURE_ACR_NAME),
                sku: optional(AZURE_ACR_SKU, DEFAULT_ACR_SKU),
            },
            app: AppConfig {
                environment: required(AZURE_CONTAINERAPPS_ENV),
                name: required(AZURE_CONTAINERAPP_NAME),
                min_replicas,
                max_replicas,
            },
            image: ImageConfig {
                name: optional(IMAGE_NAME, DEFAULT_IMAGE_NAME),
                tag,
                context,
                dockerfile: PathBuf::from(optional(DOCKERFILE, DEFAULT_DOCKERFILE)),
            },
            llm: LlmConfig {
                endpoint: required(AZURE_OPENAI_ENDPOINT),
                api_key: secret(AZURE_OPENAI_API_KEY),
                api_version: required(AZURE_OPENAI_API_VERSION),
                deployment: required(AZURE_OPENAI_DEPLOYMENT),
                default_model: required(DEFAULT_LLM_MODEL),
            },
        };

        tracing::debug!(
            resource_group = %config.target.resource_group,
            location = %config.target.location,
            image_tag = %config.image.tag,
            "configuration resolved"
        );
        Ok(config)
    }
}

fn parse_count(sources: &ConfigSources, name: &'static str, default: u32) -> crate::Result<u32> {
    match sources.get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| crate::Error::InvalidNumber {
            name,
            value: raw.to_owned(),
        }),
    }
}
