pub mod activate;
pub mod az;
pub mod client;
pub mod executor;
pub mod image;
pub mod provision;
pub mod resource;

pub use activate::{Activation, ActivationError, AppState, RestartOutcome};
pub use az::AzError;
pub use client::{AzClient, PreflightError, PreflightReport, ProbeError};
pub use executor::{AzExecutor, RealExecutor};
pub use image::ImageBuildError;
pub use provision::{FirewallOutcome, ProvisionError, Provisioned};
pub use resource::{Resource, ResourceKind, ResourceState};
