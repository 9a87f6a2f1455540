//! Error taxonomy for the bridge
//!
//! Two families:
//! - Programming errors ([`FutureError`], [`BridgeError`]): a violated
//!   single-assignment or bookkeeping invariant. They halt the VM through the
//!   hook's `Err` path and are never shown to scripts.
//! - Dispatch failures ([`DispatchError`], [`RoutineError`],
//!   [`ConversionError`]): always turned into a [`Fault`] on the calling frame.

use crate::interpreter::faults::{ARGUMENT_CONVERSION, ROUTINE_FAILURE, UNKNOWN_ROUTINE};
use crate::interpreter::{Fault, FrameId, RoutineId, ValueKind};

/* ===================== Programming Errors ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FutureError {
    #[error("future already resolved")]
    AlreadyResolved,

    #[error("future already has a continuation")]
    AlreadyRegistered,

    #[error("future not resolved yet")]
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Future(#[from] FutureError),

    #[error("frame {0} already has a pending call")]
    DuplicateFrame(FrameId),

    #[error("future for frame {0} is already pending under another frame")]
    SharedFuture(FrameId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("routine id #{0} is already registered")]
    DuplicateId(RoutineId),

    #[error("routine name `{0}` is already registered")]
    DuplicateName(String),
}

/* ===================== Dispatch Failures ===================== */

/// A value did not have the shape a host type needs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: ValueKind },

    #[error("expected {expected}, found void")]
    Void { expected: String },

    #[error("bytes are not valid UTF-8")]
    InvalidUtf8,

    #[error("expected {expected} arguments, found {found}")]
    Arity { expected: usize, found: usize },
}

/// Failure of a host routine
#[derive(Debug, thiserror::Error)]
pub enum RoutineError {
    /// A nested invocation's frame faulted and the routine did not handle it
    #[error(transparent)]
    Interpreter(#[from] Fault),

    /// A nested invocation returned a value of the wrong shape
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The routine itself failed
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

impl RoutineError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        RoutineError::Host(anyhow::anyhow!("{}", message))
    }
}

/// Why a dispatch ended in a fault instead of a result
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no native routine registered for #{0}")]
    UnknownRoutine(RoutineId),

    #[error("argument {index} of `{routine}`: {source}")]
    ArgumentConversion {
        routine: String,
        index: usize,
        #[source]
        source: ConversionError,
    },

    #[error("`{routine}` takes {expected} arguments, found {found} on the stack")]
    Arity {
        routine: String,
        expected: usize,
        found: usize,
    },

    #[error("`{routine}` failed: {source:#}")]
    Routine {
        routine: String,
        #[source]
        source: RoutineError,
    },
}

impl DispatchError {
    /// The fault raised on the calling frame
    ///
    /// A nested fault the routine let through keeps its original code.
    pub fn into_fault(self) -> Fault {
        let message = self.to_string();
        match self {
            DispatchError::UnknownRoutine(_) => Fault::new(UNKNOWN_ROUTINE, message),
            DispatchError::ArgumentConversion { .. } | DispatchError::Arity { .. } => {
                Fault::new(ARGUMENT_CONVERSION, message)
            }
            DispatchError::Routine {
                source: RoutineError::Interpreter(fault),
                ..
            } => fault,
            DispatchError::Routine { .. } => Fault::new(ROUTINE_FAILURE, message),
        }
    }
}
