//! Local inputs of the remote image build.
//!
//! # Image build
//!
//! ```text
//! gemba-deploy
//!   1. Revision ── git rev-parse --short HEAD (tag when IMAGE_TAG is unset)
//!   2. Context  ── BUILD_CONTEXT + DOCKERFILE must exist locally
//!   3. ACR      ── az acr build --registry <acr> --image <name>:<tag>
//! ```
//!
//! Nothing is built locally; the context directory is uploaded as-is and
//! the registry builds and stores the image.

pub mod context;
pub mod revision;

pub use context::BuildContext;
pub use revision::source_revision;
