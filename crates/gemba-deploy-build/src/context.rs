use std::path::{Path, PathBuf};

use gemba_deploy_core::ImageConfig;

/// A checked local build context: the directory uploaded to the registry
/// and the build definition inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub dir: PathBuf,
    pub dockerfile: PathBuf,
}

impl BuildContext {
    /// Resolve `image.context` against `working_dir` and make sure both the
    /// directory and its build definition exist.
    pub fn locate(working_dir: &Path, image: &ImageConfig) -> Result<Self, BuildContextError> {
        let dir = working_dir.join(&image.context);
        if !dir.is_dir() {
            return Err(BuildContextError::MissingDir(dir));
        }

        let dockerfile_path = dir.join(&image.dockerfile);
        if !dockerfile_path.is_file() {
            return Err(BuildContextError::MissingDockerfile(dockerfile_path));
        }

        Ok(Self {
            dir,
            dockerfile: image.dockerfile.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildContextError {
    #[error("build context {} is not a directory", .0.display())]
    MissingDir(PathBuf),
    #[error("build definition not found at {}", .0.display())]
    MissingDockerfile(PathBuf),
}
