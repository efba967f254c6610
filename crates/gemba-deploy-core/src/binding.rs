//! Runtime bindings for the deployed app.
//!
//! The Container App receives two kinds of values: plain environment
//! variables, and variables that point at a platform-managed secret slot
//! (`secretref:<slot>`). The API key and the database connection string
//! are always routed through secret slots.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use secrecy::{ExposeSecret, SecretString};

use crate::config::{DatabaseConfig, DeploymentConfig};

/// Secret slot holding the upstream Azure OpenAI key.
pub const SECRET_OPENAI_API_KEY: &str = "azure-openai-api-key";
/// Secret slot holding the composed database URL.
pub const SECRET_DATABASE_URL: &str = "database-url";

/// Runtime mode the deployed app runs in.
pub const APP_ENV_VALUE: &str = "production";
/// Log verbosity handed to the deployed app.
pub const LOG_LEVEL_VALUE: &str = "INFO";

const SQL_PORT: u16 = 1433;
const SQL_DRIVER_QUERY: &str = "driver=ODBC+Driver+18+for+SQL+Server&Encrypt=yes&TrustServerCertificate=no&Connection+Timeout=30";

/// Everything except ASCII alphanumerics and the RFC 3986 unreserved marks.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a single URL component.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, USERINFO).to_string()
}

/// Reverse of [`encode_component`].
pub fn decode_component(encoded: &str) -> Result<String, std::str::Utf8Error> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
}

/// Build the SQLAlchemy URL the app connects with.
///
/// Only the password is encoded; user, host and database names are
/// expected to be URL-safe already.
pub fn connection_string(db: &DatabaseConfig) -> SecretString {
    SecretString::from(format!(
        "mssql+aioodbc://{user}:{password}@{host}:{port}/{name}?{query}",
        user = db.admin_user,
        password = encode_component(db.admin_password.expose_secret()),
        host = db.host(),
        port = SQL_PORT,
        name = db.name,
        query = SQL_DRIVER_QUERY,
    ))
}

/// Admin credentials of the container registry.
#[derive(Clone)]
pub struct RegistryCredentials {
    pub login_server: String,
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("login_server", &self.login_server)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A platform-managed secret defined alongside the app.
#[derive(Clone)]
pub struct SecretSlot {
    pub name: &'static str,
    pub value: SecretString,
}

impl fmt::Debug for SecretSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSlot")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingValue {
    Plain(String),
    SecretRef(&'static str),
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(v) => f.write_str(v),
            Self::SecretRef(slot) => write!(f, "secretref:{slot}"),
        }
    }
}

/// Final variable mapping handed to the Deployment Activator.
#[derive(Debug, Clone)]
pub struct EnvironmentBinding {
    pub registry: RegistryCredentials,
    pub secrets: Vec<SecretSlot>,
    pub vars: Vec<(&'static str, BindingValue)>,
}

impl EnvironmentBinding {
    pub fn compose(config: &DeploymentConfig, registry: RegistryCredentials) -> Self {
        let secrets = vec![
            SecretSlot {
                name: SECRET_OPENAI_API_KEY,
                value: config.llm.api_key.clone(),
            },
            SecretSlot {
                name: SECRET_DATABASE_URL,
                value: connection_string(&config.database),
            },
        ];

        let plain = |v: &str| BindingValue::Plain(v.to_owned());
        let vars = vec![
            ("AZURE_OPENAI_ENDPOINT", plain(&config.llm.endpoint)),
            ("AZURE_OPENAI_DEPLOYMENT", plain(&config.llm.deployment)),
            ("AZURE_OPENAI_API_VERSION", plain(&config.llm.api_version)),
            ("DEFAULT_LLM_MODEL", plain(&config.llm.default_model)),
            ("APP_ENV", plain(APP_ENV_VALUE)),
            ("LOG_LEVEL", plain(LOG_LEVEL_VALUE)),
            (
                "AZURE_OPENAI_API_KEY",
                BindingValue::SecretRef(SECRET_OPENAI_API_KEY),
            ),
            ("DATABASE_URL", BindingValue::SecretRef(SECRET_DATABASE_URL)),
        ];

        Self {
            registry,
            secrets,
            vars,
        }
    }

    /// `KEY=value` pairs for `--env-vars` / `--set-env-vars`.
    /// Secret-backed keys render as `KEY=secretref:<slot>`.
    pub fn env_var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }

    /// `slot=value` pairs for `--secrets`. These carry secret material and
    /// must never be logged.
    pub fn secret_args(&self) -> Vec<String> {
        self.secrets
            .iter()
            .map(|slot| format!("{}={}", slot.name, slot.value.expose_secret()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&BindingValue> {
        self.vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn secret(&self, slot: &str) -> Option<&SecretString> {
        self.secrets
            .iter()
            .find(|s| s.name == slot)
            .map(|s| &s.value)
    }
}
