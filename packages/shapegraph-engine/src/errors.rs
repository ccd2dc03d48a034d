//! Crate-level error type and result alias.

use thiserror::Error;

use crate::features::join::JoinError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("program representation error: {0}")]
    Program(String),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> EngineError {
        EngineError::Config(msg.into())
    }

    pub fn program(msg: impl Into<String>) -> EngineError {
        EngineError::Program(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = EngineError::config("unknown option 'foo'");
        assert_eq!(
            err.to_string(),
            "configuration error: unknown option 'foo'"
        );

        let err: EngineError = JoinError::ThreeWayDisabled.into();
        assert!(matches!(err, EngineError::Join(_)));
    }
}
