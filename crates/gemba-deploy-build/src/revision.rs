use std::path::Path;
use std::process::Command;

/// Short git revision of `dir`, if it is inside a work tree with a commit.
///
/// Any failure (git missing, not a repository, no commits) yields `None`;
/// callers fall back to a timestamp tag.
pub fn source_revision(dir: &Path) -> Option<String> {
    match short_head(dir) {
        Ok(rev) => Some(rev),
        // arch-lint: allow(no-error-swallowing) reason="a missing revision selects the timestamp tag"
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "no source revision");
            None
        }
    }
}

/// `git rev-parse --short HEAD` in `dir`.
pub fn short_head(dir: &Path) -> Result<String, RevisionError> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(dir)
        .output()
        .map_err(|e| RevisionError::GitCommand { source: e })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RevisionError::GitFailed {
            detail: format!(
                "git rev-parse exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    let rev = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    if rev.is_empty() {
        return Err(RevisionError::Empty);
    }
    Ok(rev)
}

#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    #[error("failed to execute git rev-parse")]
    GitCommand { source: std::io::Error },
    #[error("git failed: {detail}")]
    GitFailed { detail: String },
    #[error("git rev-parse printed no revision")]
    Empty,
}
