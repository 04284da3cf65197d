//! The engine's unified error type.

use nocturne_protocol::{ErrorCode, RoomCode};
use nocturne_room::StoreError;

/// Every way an engine operation can reject or fail.
///
/// Rejections (`Validation`, `NotFound`, `IllegalState`) leave the room
/// untouched. `Conflict` means a concurrent writer won twice in a
/// row; transient, so the caller may retry. `Store` carries backend failures the
/// engine cannot interpret.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or malformed fields in the request.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The room no longer exists.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// Wrong phase, wrong role, duplicate action, self-target, dead
    /// actor or target, or a non-host trying host-only operations.
    #[error("{0}")]
    IllegalState(&'static str),

    /// The read-modify-write lost its race twice.
    #[error("room {0} was modified concurrently, try again")]
    Conflict(RoomCode),

    /// Deadline machinery failed; the room stays in its last durable
    /// phase until a host skip or the abandonment sweep intervenes.
    #[error("scheduling failure: {0}")]
    Scheduling(String),

    /// A store failure the engine passes through.
    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    /// The wire code carried by `error` events.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::IllegalState(_) => ErrorCode::IllegalState,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::Scheduling(_) | Self::Store(_) => ErrorCode::Scheduling,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(code) => Self::NotFound(code),
            StoreError::Conflict(code) => Self::Conflict(code),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_engine_variants() {
        let code = RoomCode("AAAAAA".into());
        assert!(matches!(
            EngineError::from(StoreError::NotFound(code.clone())),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::Conflict(code.clone())),
            EngineError::Conflict(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::Backend("io".into())),
            EngineError::Store(_)
        ));
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(
            EngineError::Validation("x".into()).code(),
            ErrorCode::Validation
        );
        assert_eq!(
            EngineError::IllegalState("x").code(),
            ErrorCode::IllegalState
        );
        assert_eq!(
            EngineError::Store(StoreError::Backend("io".into())).code(),
            ErrorCode::Scheduling
        );
    }
}
