use std::process::Stdio;

use crate::az::{AzError, command_label, one_line};

/// Abstraction over `az` CLI execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait AzExecutor: Send + Sync {
    /// Execute an az command and capture stdout.
    async fn exec(&self, args: &[String]) -> Result<String, AzError>;

    /// Execute an az command, streaming output to the terminal.
    async fn exec_streaming(&self, args: &[String]) -> Result<(), AzError>;
}

/// Real az CLI executor.
pub struct RealExecutor;

impl AzExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, AzError> {
        let command = command_label(args);
        tracing::debug!(%command, "az");

        let output = tokio::process::Command::new("az")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AzError::NotInstalled { source: e })?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| AzError::InvalidUtf8 { source: e })
        } else {
            let stderr = one_line(&String::from_utf8_lossy(&output.stderr));
            Err(AzError::CommandFailed {
                command,
                code: output.status.code(),
                stderr,
            })
        }
    }

    async fn exec_streaming(&self, args: &[String]) -> Result<(), AzError> {
        let command = command_label(args);
        tracing::debug!(%command, "az (streaming)");

        let status = tokio::process::Command::new("az")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| AzError::NotInstalled { source: e })?;

        if status.success() {
            Ok(())
        } else {
            Err(AzError::CommandFailed {
                command,
                code: status.code(),
                stderr: format!("exit status: {status}"),
            })
        }
    }
}
