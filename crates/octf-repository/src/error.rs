#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode summary: {0}")]
    DecodeSummary(#[from] prost::DecodeError),
    #[error("trace summary is invalid: {0}")]
    InvalidSummary(&'static str),
    #[error("no such trace: {0}")]
    NotFound(String),
    #[error("trace {path} is not in a terminal state")]
    NotTerminal { path: String },
}
