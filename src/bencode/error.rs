use thiserror::Error;

#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("duplicate dictionary key: {0}")]
    DuplicateKey(String),
}
