//! The fault discipline shared by every component of the substrate.
//!
//! Invariant violations are not part of normal control flow: they raise a
//! classified [`Fault`] by unwinding rather than returning an error value,
//! so generated hot-path code carries no per-call error checks. A host that
//! wants to survive a fault installs exactly one boundary with [`catch`].
//! Under a `panic = "abort"` profile a fault terminates the process.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// The closed set of fatal faults this substrate can raise.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations. The string representation matches
/// the variant name exactly (e.g., `DivideByZero` -> "DivideByZero").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum Fault {
    /// A checked division or remainder was handed a zero divisor.
    DivideByZero,
    /// The allocator (or the resource tracker standing in front of it)
    /// refused an allocation. Never recoverable below the host boundary.
    AllocationFailed,
    /// A null handle was dereferenced, or a handle outlived its cell.
    InvalidMemory,
    /// A trait downcast named a concrete type other than the one stored.
    IncompatibleType,
}

impl Fault {
    /// Human-readable description, for hosts that render faults to users.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::DivideByZero => "divide by zero",
            Self::AllocationFailed => "memory allocation failed",
            Self::InvalidMemory => "invalid memory address or null handle dereference",
            Self::IncompatibleType => "incompatible type",
        }
    }
}

/// Raises `fault`, unwinding to the nearest [`catch`] boundary.
pub fn raise(fault: Fault) -> ! {
    panic::panic_any(fault)
}

/// Runs `f`, converting a raised [`Fault`] into `Err(fault)`.
///
/// This is the process-defined top-level handler: generated code raises
/// faults freely, and the host wraps its entry points exactly once. Panics
/// that are not faults (ordinary bugs) are propagated unchanged.
///
/// The closure is not required to be unwind safe: a fault aborts the current
/// logical operation outright, and the caller is expected to discard any
/// state the operation was mutating rather than resume with it.
pub fn catch<T>(f: impl FnOnce() -> T) -> Result<T, Fault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<Fault>() {
            Ok(fault) => Err(*fault),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}
