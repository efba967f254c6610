use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing required configuration: {}", names.join(", "))]
    MissingConfig { names: Vec<&'static str> },

    #[error("failed to load config from {}", path.display())]
    ConfigLoad {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("MIN_REPLICAS ({min}) must not exceed MAX_REPLICAS ({max})")]
    InvalidReplicaBounds { min: u32, max: u32 },
}

impl Error {
    /// First offending variable name for a [`Error::MissingConfig`].
    pub fn first_missing(&self) -> Option<&'static str> {
        match self {
            Self::MissingConfig { names } => names.first().copied(),
            _ => None,
        }
    }
}
