#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid configuration for {key}: {message}")]
    Config { key: &'static str, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Wrap an I/O error together with the path it concerns.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
