use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external tool is missing: {tool}")]
    ExternalToolMissing { tool: String },

    #[error("external tool failed: {tool} (code={code:?}) {stderr}")]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse metadata: {0}")]
    MetadataInvalid(String),

    #[error("authentication required: please import cookies")]
    AuthRequired,

    #[error("failed after {attempts} attempts: {last}")]
    Abandoned { attempts: u32, last: String },

    #[error("binary install failed: {0}")]
    InstallFailed(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
