#[derive(Debug, thiserror::Error)]
pub enum KvStoreError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("I/O error on file {filename}: {source}")]
    FileError {
        source: std::io::Error,
        filename: String,
    },

    #[error("Cannot remove non-existent key")]
    RemoveOperationWithNoKey,

    #[error("Error connecting to {addr}: {source}")]
    Connection {
        addr: String,
        source: std::io::Error,
    },

    #[error("Connection to {addr} timed out")]
    Timeout { addr: String },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid replica address '{0}', expected host:port")]
    InvalidAddress(String),

    #[error("Base port {base} plus replica index {index} exceeds the highest port")]
    PortOutOfRange { base: u16, index: u16 },

    #[error("Malformed snapshot line {line} in {filename}")]
    MalformedSnapshot { filename: String, line: usize },

    #[error("Sequential consistency requires a sequencer address")]
    NoSequencer,

    #[error("Unable to parse settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("Unable to setup tracing: {0}")]
    TracingError(#[from] tracing::subscriber::SetGlobalDefaultError),
}
