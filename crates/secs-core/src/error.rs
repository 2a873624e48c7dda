use std::path::PathBuf;
use thiserror::Error;

/// Result alias for core operations.
pub type SecsResult<T> = Result<T, SecsError>;

#[derive(Error, Debug)]
pub enum SecsError {
    #[error("[SC1000] io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[SC1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[SC1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[SC1200] size must be at least {minimum}MB (got {requested}MB)")]
    SizeTooSmall { requested: u64, minimum: u64 },

    #[error("[SC1201] expansion must be at least 1MB (got {0}MB)")]
    InvalidExpansion(u64),

    #[error("[SC1202] not a luks container: {0}")]
    NotAContainer(PathBuf),

    #[error("[SC1203] container already open: {0}")]
    AlreadyOpen(PathBuf),

    #[error("[SC1204] container is not open: {0}")]
    NotOpen(PathBuf),

    #[error("[SC1205] container must be closed before it can be expanded: {0}")]
    NotClosed(PathBuf),

    #[error("[SC2000] {step} failed: {detail}")]
    Primitive { step: String, detail: String },

    #[error("[SC2100] another operation is already in progress for mapper `{0}`")]
    Busy(String),
}

impl SecsError {
    pub fn code(&self) -> &'static str {
        match self {
            SecsError::Io(_) => "SC1000",
            SecsError::Toml(_) => "SC1001",
            SecsError::InvalidConfig(_) => "SC1100",
            SecsError::SizeTooSmall { .. } => "SC1200",
            SecsError::InvalidExpansion(_) => "SC1201",
            SecsError::NotAContainer(_) => "SC1202",
            SecsError::AlreadyOpen(_) => "SC1203",
            SecsError::NotOpen(_) => "SC1204",
            SecsError::NotClosed(_) => "SC1205",
            SecsError::Primitive { .. } => "SC2000",
            SecsError::Busy(_) => "SC2100",
        }
    }
}
