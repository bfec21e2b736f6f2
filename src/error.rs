use thiserror::Error;

#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Value not representable: {0}")]
    MixedValueType(String),

    #[error("Write error: {0}")]
    Write(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CircuitError>;
