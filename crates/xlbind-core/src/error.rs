use thiserror::Error;
use xlbind_common::{ObjectHandle, Shape, TaggedValue, XlError, XlErrorKind};

/// Everything that can go wrong on the managed side of the bridge.
///
/// Conversion and invocation failures are routine while probing overloads;
/// only the variants that escape [`crate::Bridge`] reach the host, and they do
/// so as [`TaggedValue::Error`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("cannot find object with handle {0}")]
    NotFound(ObjectHandle),

    #[error("no converter from {shape} to {managed}")]
    NoCompatibleConverter { shape: Shape, managed: String },

    #[error("no converter for managed type {0}")]
    NoReturnConverter(String),

    #[error("could not invoke {ty}.{method} with {args} argument(s): {attempts} candidate(s) failed")]
    NoSuccessfulOverload {
        ty: String,
        method: String,
        args: usize,
        attempts: usize,
    },

    #[error("invocation failed: {0}")]
    InvocationFailure(String),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("unknown type {0}")]
    UnknownType(String),

    #[error("{ty} has no member called {name}")]
    UnknownMember { ty: String, name: String },
}

impl BridgeError {
    pub fn conversion(msg: impl Into<String>) -> Self {
        BridgeError::Conversion(msg.into())
    }

    pub fn invocation(msg: impl Into<String>) -> Self {
        BridgeError::InvocationFailure(msg.into())
    }

    /// The host error code this failure is reported as.
    pub fn kind(&self) -> XlErrorKind {
        match self {
            BridgeError::NotFound(_) => XlErrorKind::Ref,
            BridgeError::NoCompatibleConverter { .. } | BridgeError::NoReturnConverter(_) => {
                XlErrorKind::Value
            }
            BridgeError::NoSuccessfulOverload { .. } => XlErrorKind::Null,
            BridgeError::InvocationFailure(_) | BridgeError::Conversion(_) => XlErrorKind::Value,
            BridgeError::UnknownType(_) | BridgeError::UnknownMember { .. } => XlErrorKind::Name,
        }
    }
}

impl From<BridgeError> for XlError {
    fn from(err: BridgeError) -> Self {
        XlError::new(err.kind()).with_message(err.to_string())
    }
}

impl From<BridgeError> for TaggedValue {
    fn from(err: BridgeError) -> Self {
        TaggedValue::Error(err.into())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
