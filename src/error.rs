//! Error types
//!
//! Every fallible toolkit call returns [`ToolkitError`]. Geometry and state
//! errors are raised before any request reaches the display server.

use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

use crate::widget::WidgetId;

/// Toolkit errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolkitError {
    /// The transport handle is gone (closed display or severed socket)
    #[error("connection to the display server has been lost")]
    ConnectionLost,

    #[error("cannot open display: {0}")]
    CannotConnect(String),

    #[error("invalid position ({x}, {y})")]
    InvalidPosition { x: i32, y: i32 },

    #[error("invalid size {width}x{height}")]
    InvalidSize { width: i32, height: i32 },

    #[error("widget {0} has been destroyed")]
    WidgetDestroyed(WidgetId),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ToolkitError {
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

impl From<ConnectError> for ToolkitError {
    fn from(err: ConnectError) -> Self {
        Self::CannotConnect(err.to_string())
    }
}

impl From<ConnectionError> for ToolkitError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::IoError(_) => Self::ConnectionLost,
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<ReplyError> for ToolkitError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::ConnectionError(inner) => inner.into(),
            ReplyError::X11Error(e) => Self::Transport(format!("{:?}", e.error_kind)),
        }
    }
}

impl From<ReplyOrIdError> for ToolkitError {
    fn from(err: ReplyOrIdError) -> Self {
        match err {
            ReplyOrIdError::ConnectionError(inner) => inner.into(),
            ReplyOrIdError::X11Error(e) => Self::Transport(format!("{:?}", e.error_kind)),
            ReplyOrIdError::IdsExhausted => Self::Transport("X11 resource ids exhausted".into()),
        }
    }
}

/// Result type for toolkit operations
pub type Result<T> = std::result::Result<T, ToolkitError>;
