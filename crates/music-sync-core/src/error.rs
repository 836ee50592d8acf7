use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cannot create incoming directory {path}: {source}")]
    IncomingDir {
        path: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}
