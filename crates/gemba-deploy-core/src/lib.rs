//! Core types and configuration for gemba-deploy.
//!
//! This crate resolves the deployment parameters ([`DeploymentConfig`]),
//! composes the runtime bindings handed to the Container App
//! ([`EnvironmentBinding`]), and formats the final [`Summary`].
//! Nothing here talks to Azure.

pub mod binding;
pub mod config;
pub mod error;
pub mod report;
pub mod tag;

pub use binding::{
    BindingValue, EnvironmentBinding, RegistryCredentials, SecretSlot, connection_string,
};
pub use config::{
    AppConfig, AzureTarget, ConfigSources, DatabaseConfig, DeploymentConfig, ImageConfig,
    LlmConfig, RegistryConfig,
};
pub use error::{Error, Result};
pub use report::Summary;
