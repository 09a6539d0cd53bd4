use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ExportError {
    #[error("sink {sink} transient failure: {message}")]
    Transient { sink: String, message: String },

    #[error("sink {sink} permanent failure: {message}")]
    Permanent { sink: String, message: String },

    #[error("export pipeline shut down")]
    ShutDown,

    #[error("dead letter write failed: {0}")]
    DeadLetter(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;
