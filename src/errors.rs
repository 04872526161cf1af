use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database or storage endpoint could not be reached or refused an operation.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// A write into the destination database failed. The destination may be
    /// left partially populated.
    #[error("Restore operation failed: {0}")]
    Restore(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Process exit code reported for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            AppError::Connection(_) => 3,
            AppError::CorruptArchive(_) => 4,
            AppError::Restore(_) => 5,
            AppError::NotFound(_) => 6,
            AppError::Io(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
