use thiserror::Error;

use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("track {0} not found")]
    TrackNotFound(u32),

    #[error("transport {0} is closed")]
    Closed(String),

    #[error("{context}: {source}")]
    Engine {
        context: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("{reason}; close peer connection: {close_error}")]
    CloseAfterFailure {
        reason: Box<TransportError>,
        close_error: EngineError,
    },

    #[error("signaller: {0}")]
    Signaller(#[source] anyhow::Error),
}

impl TransportError {
    pub fn engine(context: &'static str, source: EngineError) -> Self {
        TransportError::Engine { context, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::TrackNotFound(_))
    }
}

/// Attach the name of the failed step to an engine error
pub trait EngineContext<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> EngineContext<T> for std::result::Result<T, EngineError> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| TransportError::engine(context, source))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_names_the_failed_step() {
        let result: std::result::Result<(), EngineError> =
            Err(EngineError::Other("boom".to_string()));

        let err = result.context("write rtcp").unwrap_err();
        assert_eq!(err.to_string(), "write rtcp: boom");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_close_after_failure_keeps_both_errors() {
        let err = TransportError::CloseAfterFailure {
            reason: Box::new(TransportError::engine(
                "create data channel",
                EngineError::Other("no sctp".to_string()),
            )),
            close_error: EngineError::Other("already closed".to_string()),
        };

        assert_eq!(
            err.to_string(),
            "create data channel: no sctp; close peer connection: already closed"
        );
    }
}
