use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Line exceeded max length")]
    LineLength,
    #[error("Connection reset by peer")]
    ConnectionReset,
    #[error("I/O Error: {0}")]
    Io(std::io::Error),
    #[error("Serialization Error: {0}")]
    Json(serde_json::Error),
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
