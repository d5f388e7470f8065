use thiserror::Error;

pub type HnResult<T> = Result<T, HnError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HnError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Handle out of range: {what} (index={index}, len={len})")]
    HandleOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("{what} must be {expected}, got {value}")]
    OutOfRange {
        what: &'static str,
        expected: &'static str,
        value: f64,
    },
}
