use super::{
    DType, Data, Element, Layout, Storage, TensorListShape, new_storage, read_storage,
    write_storage,
};
use crate::backend::StorageDevice;
use crate::error::{EagerError, Result};
use std::ops::Range;
use std::sync::Arc;

/// A batch stored in one contiguous buffer.
///
/// Samples are laid out back to back in declaration order; `offsets[i]` is
/// the element offset of sample `i`. Clones are aliases of the same buffer.
#[derive(Debug, Clone)]
pub struct DenseBatch {
    device: StorageDevice,
    storage: Storage,
    dtype: DType,
    shape: TensorListShape,
    offsets: Vec<usize>,
    layout: Layout,
    capacity: usize,
}

fn offsets_of(shape: &TensorListShape) -> Vec<usize> {
    let mut acc = 0;
    (0..shape.num_samples())
        .map(|i| {
            let at = acc;
            acc += shape.volume(i);
            at
        })
        .collect()
}

impl DenseBatch {
    /// An empty batch reserving room for `batch_size` samples.
    #[must_use]
    pub fn new(device: StorageDevice, batch_size: usize) -> Self {
        Self {
            device,
            storage: new_storage(Data::default()),
            dtype: DType::default(),
            shape: TensorListShape::default(),
            offsets: Vec::new(),
            layout: Layout::empty(),
            capacity: batch_size,
        }
    }

    /// Wraps `values` laid out according to `shape`.
    ///
    /// # Errors
    ///
    /// [`EagerError::ShapeMismatch`] if `values` does not hold exactly
    /// `shape.num_elements()` elements.
    pub fn from_vec<T: Element>(
        device: StorageDevice,
        shape: TensorListShape,
        values: Vec<T>,
    ) -> Result<Self> {
        if values.len() != shape.num_elements() {
            return Err(EagerError::ShapeMismatch(format!(
                "{} elements supplied for a batch of {}",
                values.len(),
                shape.num_elements()
            )));
        }
        let capacity = shape.num_samples();
        Ok(Self {
            device,
            storage: new_storage(T::into_data(values)),
            dtype: T::DTYPE,
            offsets: offsets_of(&shape),
            shape,
            layout: Layout::empty(),
            capacity,
        })
    }

    /// `num_samples` samples of `sample_shape`, taken from `values` in order.
    ///
    /// # Errors
    ///
    /// See [`DenseBatch::from_vec`].
    pub fn from_uniform<T: Element>(
        device: StorageDevice,
        num_samples: usize,
        sample_shape: &[usize],
        values: Vec<T>,
    ) -> Result<Self> {
        Self::from_vec(
            device,
            TensorListShape::uniform(num_samples, sample_shape),
            values,
        )
    }

    /// Builds a batch over existing storage. Offsets follow `shape`.
    pub(crate) fn from_parts(
        device: StorageDevice,
        storage: Storage,
        dtype: DType,
        shape: TensorListShape,
        layout: Layout,
    ) -> Self {
        let capacity = shape.num_samples();
        Self {
            device,
            storage,
            dtype,
            offsets: offsets_of(&shape),
            shape,
            layout,
            capacity,
        }
    }

    /// Reallocates the batch as zeroed storage for `shape` and `dtype`.
    ///
    /// The resized batch no longer aliases its previous buffer.
    pub fn resize(&mut self, shape: &TensorListShape, dtype: DType) {
        self.storage = new_storage(Data::zeroed(dtype, shape.num_elements()));
        self.dtype = dtype;
        self.offsets = offsets_of(shape);
        self.shape = shape.clone();
        self.capacity = self.capacity.max(shape.num_samples());
    }

    #[must_use]
    pub const fn device(&self) -> StorageDevice {
        self.device
    }

    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub const fn shape(&self) -> &TensorListShape {
        &self.shape
    }

    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.shape.num_samples()
    }

    #[must_use]
    pub fn sample_dim(&self) -> usize {
        self.shape.sample_dim()
    }

    /// Number of samples reserved by the batch.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Element range of sample `index` inside the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn sample_range(&self, index: usize) -> Range<usize> {
        let start = self.offsets[index];
        start..start + self.shape.volume(index)
    }

    /// Handle to the underlying buffer.
    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Whether both batches alias one buffer.
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Runs `f` over the whole buffer.
    ///
    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] if `T` is not the batch element type.
    pub fn with_data<T: Element, R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let data = read_storage(&self.storage);
        Ok(f(data.as_slice::<T>()?))
    }

    /// Runs `f` over the whole buffer mutably; visible through all aliases.
    ///
    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] if `T` is not the batch element type.
    pub fn with_data_mut<T: Element, R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        let mut data = write_storage(&self.storage);
        Ok(f(data.as_mut_slice::<T>()?))
    }

    /// Copies the whole buffer out.
    ///
    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] if `T` is not the batch element type.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.with_data(|d: &[T]| d.to_vec())
    }

    /// Copies sample `index` out.
    ///
    /// # Errors
    ///
    /// Fails on type mismatch or an out-of-range index.
    pub fn sample_to_vec<T: Element>(&self, index: usize) -> Result<Vec<T>> {
        if index >= self.num_samples() {
            return Err(EagerError::IndexOutOfRange {
                kind: "sample",
                index,
                len: self.num_samples(),
            });
        }
        let range = self.sample_range(index);
        self.with_data(|d: &[T]| d[range].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_alias_storage() {
        let a = DenseBatch::from_uniform(StorageDevice::Cpu, 2, &[2], vec![1.0f32, 2.0, 3.0, 4.0])
            .unwrap();
        let b = a.clone();
        assert!(a.shares_storage(&b));
        b.with_data_mut(|d: &mut [f32]| d[0] = 10.0).unwrap();
        assert_eq!(a.sample_to_vec::<f32>(0).unwrap(), vec![10.0, 2.0]);
    }

    #[test]
    fn resize_detaches_and_zeroes() {
        let a = DenseBatch::from_uniform(StorageDevice::Cpu, 1, &[2], vec![1i32, 2]).unwrap();
        let mut b = a.clone();
        b.resize(&TensorListShape::new(vec![vec![1], vec![3]]).unwrap(), DType::U8);
        assert!(!a.shares_storage(&b));
        assert_eq!(b.dtype(), DType::U8);
        assert_eq!(b.sample_range(1), 1..4);
        assert_eq!(b.to_vec::<u8>().unwrap(), vec![0; 4]);
        assert_eq!(a.to_vec::<i32>().unwrap(), vec![1, 2]);
    }

    #[test]
    fn from_vec_checks_element_count() {
        assert!(DenseBatch::from_uniform(StorageDevice::Gpu, 2, &[3], vec![0.0f32; 5]).is_err());
        let empty = DenseBatch::new(StorageDevice::Gpu, 8);
        assert_eq!(empty.capacity(), 8);
        assert_eq!(empty.num_samples(), 0);
    }
}
