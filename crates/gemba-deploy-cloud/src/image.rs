use std::path::{Path, PathBuf};

use gemba_deploy_core::tag::image_reference;
use gemba_deploy_core::{AzureTarget, ImageConfig, RegistryConfig};

use crate::az::AzError;
use crate::client::{AzClient, args};
use crate::executor::AzExecutor;

impl<E: AzExecutor> AzClient<E> {
    /// Build and push the image inside the registry (`az acr build`).
    ///
    /// `dockerfile` is relative to `context_dir`. Returns the
    /// fully-qualified reference `<login server>/<name>:<tag>`.
    pub async fn build_image(
        &self,
        target: &AzureTarget,
        registry: &RegistryConfig,
        login_server: &str,
        image: &ImageConfig,
        context_dir: &Path,
        dockerfile: &Path,
    ) -> Result<String, ImageBuildError> {
        let context_str = context_dir
            .to_str()
            .ok_or_else(|| ImageBuildError::InvalidPath(context_dir.to_path_buf()))?;
        let dockerfile_str = dockerfile
            .to_str()
            .ok_or_else(|| ImageBuildError::InvalidPath(dockerfile.to_path_buf()))?;
        let name_tag = format!("{}:{}", image.name, image.tag);

        self.exec_streaming(&args([
            "acr",
            "build",
            "--resource-group",
            &target.resource_group,
            "--registry",
            &registry.name,
            "--image",
            &name_tag,
            "--file",
            dockerfile_str,
            context_str,
        ]))
        .await
        .map_err(|e| ImageBuildError::Submit { source: e })?;

        Ok(image_reference(login_server, &image.name, &image.tag))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageBuildError {
    #[error("build path is not valid UTF-8: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("registry image build failed")]
    Submit { source: AzError },
}
