//! Batch containers.
//!
//! A batch is an ordered sequence of samples processed together. Two
//! representations exist:
//!
//! - [`DenseBatch`] keeps every sample in one contiguous, shared buffer.
//! - [`SampleBatch`] keeps one independently owned buffer per sample and may
//!   hold non-uniform sample shapes.
//!
//! Buffers are [`Storage`] handles (`Arc<RwLock<Data>>`). Cloning a batch
//! creates an alias of the same storage: writes through one alias are
//! visible through every other alias. There is no copy-on-write.
//!
//! Conversions between the two representations live in [`crate::bridge`].

use crate::error::{EagerError, Result};
use core::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

mod dense;
mod sample;

pub use self::dense::DenseBatch;
pub use self::sample::{Sample, SampleBatch};

/// Shared handle to the memory of a batch or sample.
pub type Storage = Arc<RwLock<Data>>;

/// Element type of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 32-bit float (default).
    #[default]
    F32,
    /// 32-bit signed integer.
    I32,
    /// Unsigned byte.
    U8,
}

impl DType {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::U8 => 1,
        }
    }
}

/// Typed element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

impl Default for Data {
    fn default() -> Self {
        Self::F32(Vec::new())
    }
}

impl Data {
    /// A zero-filled buffer of `len` elements.
    #[must_use]
    pub fn zeroed(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => Self::F32(vec![0.0; len]),
            DType::I32 => Self::I32(vec![0; len]),
            DType::U8 => Self::U8(vec![0; len]),
        }
    }

    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::I32(_) => DType::I32,
            Self::U8(_) => DType::U8,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U8(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Typed view of the buffer.
    ///
    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] if `T` is not the buffer's element type.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        T::view(self).ok_or(EagerError::TypeMismatch {
            expected: T::DTYPE,
            got: self.dtype(),
        })
    }

    /// Typed mutable view of the buffer.
    ///
    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] if `T` is not the buffer's element type.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        let got = self.dtype();
        T::view_mut(self).ok_or(EagerError::TypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }

    /// Copies `len` elements of `src` starting at `src_offset` to `dst_offset`.
    ///
    /// # Errors
    ///
    /// Fails on element type mismatch or out-of-bounds ranges.
    pub fn copy_from(
        &mut self,
        dst_offset: usize,
        src: &Self,
        src_offset: usize,
        len: usize,
    ) -> Result<()> {
        if dst_offset + len > self.len() || src_offset + len > src.len() {
            return Err(EagerError::ShapeMismatch(format!(
                "copy of {len} elements out of bounds (dst {dst_offset}/{}, src {src_offset}/{})",
                self.len(),
                src.len()
            )));
        }
        let dst = dst_offset..dst_offset + len;
        let from = src_offset..src_offset + len;
        match (self, src) {
            (Self::F32(d), Self::F32(s)) => d[dst].copy_from_slice(&s[from]),
            (Self::I32(d), Self::I32(s)) => d[dst].copy_from_slice(&s[from]),
            (Self::U8(d), Self::U8(s)) => d[dst].copy_from_slice(&s[from]),
            (d, s) => {
                return Err(EagerError::TypeMismatch {
                    expected: d.dtype(),
                    got: s.dtype(),
                });
            }
        }
        Ok(())
    }
}

/// Rust scalar types that can be stored in a batch.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Matching [`DType`].
    const DTYPE: DType;

    /// Borrow `data` as `[Self]` if the types agree.
    fn view(data: &Data) -> Option<&[Self]>;

    /// Mutably borrow `data` as `[Self]` if the types agree.
    fn view_mut(data: &mut Data) -> Option<&mut [Self]>;

    /// Wrap an owned vector.
    fn into_data(values: Vec<Self>) -> Data;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$variant;

            fn view(data: &Data) -> Option<&[Self]> {
                match data {
                    Data::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn view_mut(data: &mut Data) -> Option<&mut [Self]> {
                match data {
                    Data::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_data(values: Vec<Self>) -> Data {
                Data::$variant(values)
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(i32, I32);
impl_element!(u8, U8);

/// Creates a fresh storage handle.
#[must_use]
pub fn new_storage(data: Data) -> Storage {
    Arc::new(RwLock::new(data))
}

/// Read-locks a storage; a poisoned lock still yields its data.
pub fn read_storage(storage: &Storage) -> RwLockReadGuard<'_, Data> {
    storage.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-locks a storage; a poisoned lock still yields its data.
pub fn write_storage(storage: &Storage) -> RwLockWriteGuard<'_, Data> {
    storage.write().unwrap_or_else(PoisonError::into_inner)
}

/// Dimension names of a sample, e.g. `"HWC"`. Empty means untagged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Layout(String);

impl Layout {
    #[must_use]
    pub fn new(dims: &str) -> Self {
        Self(dims.to_owned())
    }

    /// The untagged layout.
    #[must_use]
    pub const fn empty() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of dimensions named by the layout.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.0.chars().count()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Layout {
    fn from(dims: &str) -> Self {
        Self::new(dims)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// Per-sample shapes of a batch. All samples share one rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TensorListShape {
    samples: Vec<Vec<usize>>,
}

impl TensorListShape {
    /// Builds a shape list from explicit sample shapes.
    ///
    /// # Errors
    ///
    /// [`EagerError::ShapeMismatch`] if the samples differ in rank.
    pub fn new(samples: Vec<Vec<usize>>) -> Result<Self> {
        if let Some(first) = samples.first() {
            let rank = first.len();
            if let Some(bad) = samples.iter().position(|s| s.len() != rank) {
                return Err(EagerError::ShapeMismatch(format!(
                    "sample {bad} has rank {}, expected {rank}",
                    samples[bad].len()
                )));
            }
        }
        Ok(Self { samples })
    }

    /// `num_samples` copies of one sample shape.
    #[must_use]
    pub fn uniform(num_samples: usize, sample_shape: &[usize]) -> Self {
        Self {
            samples: vec![sample_shape.to_vec(); num_samples],
        }
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Rank of every sample; 0 for an empty list.
    #[must_use]
    pub fn sample_dim(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn sample(&self, index: usize) -> &[usize] {
        &self.samples[index]
    }

    /// Number of elements in sample `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn volume(&self, index: usize) -> usize {
        self.samples[index].iter().product()
    }

    /// Number of elements over all samples.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.samples.iter().map(|s| s.iter().product::<usize>()).sum()
    }

    #[must_use]
    pub fn is_uniform(&self) -> bool {
        self.samples.windows(2).all(|w| w[0] == w[1])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.samples.iter().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_typed_views() {
        let mut data = Data::zeroed(DType::I32, 3);
        data.as_mut_slice::<i32>().unwrap()[1] = 7;
        assert_eq!(data.as_slice::<i32>().unwrap(), &[0, 7, 0]);
        assert!(matches!(
            data.as_slice::<f32>(),
            Err(EagerError::TypeMismatch { expected: DType::F32, got: DType::I32 })
        ));
    }

    #[test]
    fn data_copy_checks_bounds_and_type() {
        let mut dst = Data::zeroed(DType::F32, 4);
        let src = Data::F32(vec![1.0, 2.0, 3.0]);
        dst.copy_from(1, &src, 1, 2).unwrap();
        assert_eq!(dst, Data::F32(vec![0.0, 2.0, 3.0, 0.0]));
        assert!(dst.copy_from(3, &src, 0, 2).is_err());
        assert!(dst.copy_from(0, &Data::U8(vec![1]), 0, 1).is_err());
    }

    #[test]
    fn list_shape_rejects_mixed_rank() {
        assert!(TensorListShape::new(vec![vec![2, 2], vec![3]]).is_err());
        let shape = TensorListShape::new(vec![vec![2, 2], vec![1, 3]]).unwrap();
        assert_eq!(shape.num_elements(), 7);
        assert_eq!(shape.sample_dim(), 2);
        assert!(!shape.is_uniform());
        assert!(TensorListShape::uniform(3, &[4]).is_uniform());
    }

    #[test]
    fn layout_ndim() {
        assert_eq!(Layout::new("HWC").ndim(), 3);
        assert!(Layout::empty().is_empty());
    }
}
