//! Approximate comparison of floating point batches.
//!
//! Results of the same operator may legitimately differ in the last bits
//! between execution paths (per-sample work on a pool vs. one stream job).
//! These helpers grade how close two values or batches are.

use crate::batch::{DType, DenseBatch};
use crate::error::Result;

/// Differences below this are [`Closeness::Exact`].
pub const F32_EXACT: f32 = 1e-6;

/// Differences below this are [`Closeness::Close`].
pub const F32_CLOSE: f32 = 1e-3;

/// How far apart two values are.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Closeness {
    Exact = 0,
    Close = 1,
    Apart = 2,
}

/// Grades the distance between `self` and another value.
pub trait ApproxEq<Rhs: ?Sized = Self> {
    fn closeness(&self, rhs: &Rhs) -> Closeness;
}

impl ApproxEq for f32 {
    fn closeness(&self, rhs: &Self) -> Closeness {
        let dif = (self - rhs).abs();
        if dif < F32_EXACT {
            Closeness::Exact
        } else if dif < F32_CLOSE {
            Closeness::Close
        } else {
            Closeness::Apart
        }
    }
}

impl<T: ApproxEq> ApproxEq for [T] {
    /// The worst grade of any element pair; slices of different length are
    /// always apart.
    fn closeness(&self, rhs: &Self) -> Closeness {
        if self.len() != rhs.len() {
            return Closeness::Apart;
        }
        self.iter()
            .zip(rhs)
            .map(|(a, b)| a.closeness(b))
            .max()
            .unwrap_or(Closeness::Exact)
    }
}

/// Whether `a` and `b` agree to within [`F32_CLOSE`].
pub fn approx_eq<T: ApproxEq + ?Sized>(a: &T, b: &T) -> bool {
    a.closeness(b) <= Closeness::Close
}

/// Whether two batches have equal shapes and element types and their
/// values agree: approximately for `f32`, exactly otherwise.
///
/// # Errors
///
/// Never for batches of matching type; the element read itself is fallible.
pub fn batches_approx_eq(a: &DenseBatch, b: &DenseBatch) -> Result<bool> {
    if a.shape() != b.shape() || a.dtype() != b.dtype() {
        return Ok(false);
    }
    Ok(match a.dtype() {
        DType::F32 => approx_eq(a.to_vec::<f32>()?.as_slice(), b.to_vec::<f32>()?.as_slice()),
        DType::I32 => a.to_vec::<i32>()? == b.to_vec::<i32>()?,
        DType::U8 => a.to_vec::<u8>()? == b.to_vec::<u8>()?,
    })
}
