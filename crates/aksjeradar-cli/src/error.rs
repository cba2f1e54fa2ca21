use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
///
/// Resolution itself never fails; only setup and output can.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Logging(_) => 2,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
