use serde_json::Value;

use crate::az::{AzError, command_label};
use crate::executor::{AzExecutor, RealExecutor};
use crate::resource::{Resource, ResourceKind, ResourceState};

/// Azure operations client, parameterized over the executor for testability.
///
/// Provisioning, image build and activation live in their own modules as
/// further `impl` blocks on this type.
pub struct AzClient<E: AzExecutor = RealExecutor> {
    executor: E,
}

impl AzClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for AzClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: AzExecutor> AzClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub(crate) async fn exec(&self, args: &[String]) -> Result<String, AzError> {
        self.executor.exec(args).await
    }

    pub(crate) async fn exec_streaming(&self, args: &[String]) -> Result<(), AzError> {
        self.executor.exec_streaming(args).await
    }

    // ── Preflight ──

    /// Verify the az CLI is usable and select the target subscription.
    pub async fn check_prerequisites(
        &self,
        subscription_id: &str,
    ) -> Result<PreflightReport, PreflightError> {
        let mut report = PreflightReport::default();

        // 1. az CLI available
        match self
            .exec(&args(["version", "--query", "\"azure-cli\"", "--output", "tsv"]))
            .await
        {
            Ok(version) => report.az_version = Some(version.trim().to_owned()),
            Err(_) => return Err(PreflightError::AzNotInstalled),
        }

        // 2. Authenticated
        match self
            .exec(&args(["account", "show", "--query", "user.name", "--output", "tsv"]))
            .await
        {
            Ok(account) => report.account = Some(account.trim().to_owned()),
            Err(_) => return Err(PreflightError::NotAuthenticated),
        }

        // 3. Subscription selectable
        self.exec(&args(["account", "set", "--subscription", subscription_id]))
            .await
            .map_err(|_| PreflightError::SubscriptionNotAccessible(subscription_id.to_owned()))?;
        report.subscription_id = Some(subscription_id.to_owned());

        // 4. containerapp extension present and current
        self.exec(&args([
            "extension",
            "add",
            "--name",
            "containerapp",
            "--upgrade",
            "--only-show-errors",
        ]))
        .await
        .map_err(|e| PreflightError::Extension { source: e })?;

        Ok(report)
    }

    // ── Probe ──

    /// `show` a resource. `Ok(None)` means Azure reported it as not found;
    /// any other failure is a [`ProbeError`].
    pub async fn probe(&self, resource: &Resource<'_>) -> Result<Option<Value>, ProbeError> {
        let kind = resource.kind();
        let show = resource.show_args();

        match self.exec(&show).await {
            Ok(out) => {
                let body = serde_json::from_str(&out).map_err(|e| ProbeError {
                    kind,
                    source: AzError::InvalidOutput {
                        command: command_label(&show),
                        source: e,
                    },
                })?;
                Ok(Some(body))
            }
            Err(e) if e.is_resource_not_found() => Ok(None),
            Err(e) => Err(ProbeError { kind, source: e }),
        }
    }

    /// Does the resource exist?
    pub async fn exists(&self, resource: &Resource<'_>) -> Result<bool, ProbeError> {
        Ok(self.probe(resource).await?.is_some())
    }

    /// Probe and classify a resource.
    pub async fn state(&self, resource: &Resource<'_>) -> Result<ResourceState, ProbeError> {
        let shown = self.probe(resource).await?;
        let state = ResourceState::classify(resource.kind(), shown.as_ref());
        tracing::debug!(kind = %resource.kind(), name = resource.name(), ?state, "probed");
        Ok(state)
    }
}

// ── Helper ──

pub(crate) fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

// ── Preflight types ──

#[derive(Debug, Default)]
pub struct PreflightReport {
    pub az_version: Option<String>,
    pub account: Option<String>,
    pub subscription_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("az CLI not installed, see https://learn.microsoft.com/cli/azure/install-azure-cli")]
    AzNotInstalled,

    #[error("not authenticated, run `az login`")]
    NotAuthenticated,

    #[error("Azure subscription '{0}' is not accessible: check the id and your permissions")]
    SubscriptionNotAccessible(String),

    #[error("failed to install the containerapp az extension")]
    Extension { source: AzError },
}

/// Any probe failure other than "not found".
#[derive(Debug, thiserror::Error)]
#[error("failed to look up {kind}")]
pub struct ProbeError {
    pub kind: ResourceKind,
    pub source: AzError,
}
