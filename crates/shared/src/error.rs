use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("message type must be a non-empty string")]
    InvalidType,
    #[error("message must be an object with a string `type` field")]
    InvalidMessage,
    #[error("invalid target origin '{0}'")]
    InvalidTargetOrigin(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("frame {frame} is detached from the frame tree")]
    Detached { frame: u64 },
    #[error("access to frame {frame} is denied")]
    AccessDenied { frame: u64 },
}
