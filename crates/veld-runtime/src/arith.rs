//! Checked division and remainder for lowered arithmetic.
//!
//! The compiler emits [`div`]/[`rem`] for the `/` and `%` operators; a zero
//! divisor raises the divide-by-zero fault. The `unsafe_` variants skip the
//! classified guard by the caller's explicit choice, deferring to the
//! platform's native behavior on a zero divisor.

use std::ops::{Div, Rem};

use num_traits::Zero;

use crate::fault::{self, Fault};

/// Division with a zero-divisor guard.
pub fn div<T>(x: T, denominator: T) -> T
where
    T: Zero + Div<Output = T>,
{
    if !cfg!(feature = "unchecked") && denominator.is_zero() {
        fault::raise(Fault::DivideByZero);
    }
    x / denominator
}

/// Remainder with a zero-divisor guard.
pub fn rem<T>(x: T, denominator: T) -> T
where
    T: Zero + Rem<Output = T>,
{
    if !cfg!(feature = "unchecked") && denominator.is_zero() {
        fault::raise(Fault::DivideByZero);
    }
    x % denominator
}

/// Unguarded division.
pub fn unsafe_div<T: Div<Output = T>>(x: T, denominator: T) -> T {
    x / denominator
}

/// Unguarded remainder.
pub fn unsafe_rem<T: Rem<Output = T>>(x: T, denominator: T) -> T {
    x % denominator
}
