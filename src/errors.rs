use thiserror::Error;

/// Errors that can occur while crawling metadata into the org graph.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("parse error: {message} (artifact: {artifact})")]
    Parse { message: String, artifact: String },

    #[error("store error: {message} (operation: {operation})")]
    Store { message: String, operation: String },

    #[error("source error: {message} (operation: {operation})")]
    Source { message: String, operation: String },

    #[error("status error: {message}")]
    Status { message: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results using `CrawlError`.
pub type Result<T> = std::result::Result<T, CrawlError>;
