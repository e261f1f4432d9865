use super::{
    DType, Data, Element, Layout, Storage, TensorListShape, new_storage, read_storage,
    write_storage,
};
use crate::backend::StorageDevice;
use crate::error::{EagerError, Result};
use std::sync::Arc;

/// One sample: a shaped window into a storage handle.
///
/// Owned samples start at offset 0 of their own buffer; samples shared out of
/// a [`DenseBatch`](super::DenseBatch) point into the dense buffer.
#[derive(Debug, Clone)]
pub struct Sample {
    pub(crate) storage: Storage,
    pub(crate) offset: usize,
    pub(crate) shape: Vec<usize>,
    pub(crate) dtype: DType,
}

impl Sample {
    /// An independently owned sample.
    ///
    /// # Errors
    ///
    /// [`EagerError::ShapeMismatch`] if `values` does not fill `shape`.
    pub fn new<T: Element>(shape: &[usize], values: Vec<T>) -> Result<Self> {
        let volume: usize = shape.iter().product();
        if values.len() != volume {
            return Err(EagerError::ShapeMismatch(format!(
                "{} elements supplied for a sample of shape {shape:?}",
                values.len()
            )));
        }
        Ok(Self {
            storage: new_storage(T::into_data(values)),
            offset: 0,
            shape: shape.to_vec(),
            dtype: T::DTYPE,
        })
    }

    /// A zero-filled owned sample.
    #[must_use]
    pub fn zeroed(shape: &[usize], dtype: DType) -> Self {
        let volume = shape.iter().product();
        Self {
            storage: new_storage(Data::zeroed(dtype, volume)),
            offset: 0,
            shape: shape.to_vec(),
            dtype,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn volume(&self) -> usize {
        self.shape.iter().product()
    }

    /// Element offset of the sample inside its storage.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Runs `f` over this sample's elements.
    ///
    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] if `T` is not the sample element type.
    pub fn with_data<T: Element, R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let data = read_storage(&self.storage);
        let all = data.as_slice::<T>()?;
        Ok(f(&all[self.offset..self.offset + self.volume()]))
    }

    /// Runs `f` over this sample's elements mutably.
    ///
    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] if `T` is not the sample element type.
    pub fn with_data_mut<T: Element, R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        let volume = self.volume();
        let mut data = write_storage(&self.storage);
        let all = data.as_mut_slice::<T>()?;
        Ok(f(&mut all[self.offset..self.offset + volume]))
    }

    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] if `T` is not the sample element type.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.with_data(|d: &[T]| d.to_vec())
    }
}

/// A batch of independently stored samples.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub(crate) device: StorageDevice,
    pub(crate) samples: Vec<Sample>,
    pub(crate) dtype: DType,
    pub(crate) layout: Layout,
    pub(crate) capacity: usize,
}

impl SampleBatch {
    /// An empty batch reserving room for `batch_size` samples.
    #[must_use]
    pub fn new(device: StorageDevice, batch_size: usize) -> Self {
        Self {
            device,
            samples: Vec::with_capacity(batch_size),
            dtype: DType::default(),
            layout: Layout::empty(),
            capacity: batch_size,
        }
    }

    /// Collects samples into a batch.
    ///
    /// # Errors
    ///
    /// Fails if the samples disagree on element type or rank.
    pub fn from_samples(device: StorageDevice, samples: Vec<Sample>) -> Result<Self> {
        let mut batch = Self::new(device, samples.len());
        for sample in samples {
            batch.push(sample)?;
        }
        Ok(batch)
    }

    /// Appends a sample; element type and rank must match the batch.
    ///
    /// # Errors
    ///
    /// [`EagerError::TypeMismatch`] or [`EagerError::ShapeMismatch`].
    pub fn push(&mut self, sample: Sample) -> Result<()> {
        if let Some(first) = self.samples.first() {
            self.check_compatible(first, &sample)?;
        } else {
            self.dtype = sample.dtype;
        }
        self.samples.push(sample);
        self.capacity = self.capacity.max(self.samples.len());
        Ok(())
    }

    /// Replaces sample `index`, allowing a different shape of the same rank.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range index or an incompatible sample.
    pub fn set_sample(&mut self, index: usize, sample: Sample) -> Result<()> {
        let len = self.samples.len();
        let current = self.samples.get(index).ok_or(EagerError::IndexOutOfRange {
            kind: "sample",
            index,
            len,
        })?;
        self.check_compatible(current, &sample)?;
        self.samples[index] = sample;
        Ok(())
    }

    fn check_compatible(&self, existing: &Sample, sample: &Sample) -> Result<()> {
        if sample.dtype != self.dtype {
            return Err(EagerError::TypeMismatch {
                expected: self.dtype,
                got: sample.dtype,
            });
        }
        if sample.shape.len() != existing.shape.len() {
            return Err(EagerError::ShapeMismatch(format!(
                "sample of rank {} in a batch of rank {}",
                sample.shape.len(),
                existing.shape.len()
            )));
        }
        Ok(())
    }

    /// Reallocates every sample as its own zeroed buffer.
    pub fn resize(&mut self, shape: &TensorListShape, dtype: DType) {
        self.samples = shape.iter().map(|s| Sample::zeroed(s, dtype)).collect();
        self.dtype = dtype;
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
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn sample_dim(&self) -> usize {
        self.samples.first().map_or(0, |s| s.shape.len())
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn sample(&self, index: usize) -> &Sample {
        &self.samples[index]
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Shapes of all samples.
    #[must_use]
    pub fn shape(&self) -> TensorListShape {
        TensorListShape {
            samples: self.samples.iter().map(|s| s.shape.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_may_differ_in_shape() {
        let mut batch = SampleBatch::from_samples(
            StorageDevice::Cpu,
            vec![
                Sample::new(&[2], vec![1.0f32, 2.0]).unwrap(),
                Sample::new(&[3], vec![3.0f32, 4.0, 5.0]).unwrap(),
            ],
        )
        .unwrap();
        assert!(!batch.shape().is_uniform());
        batch
            .set_sample(0, Sample::new(&[1], vec![9.0f32]).unwrap())
            .unwrap();
        assert_eq!(batch.sample(0).to_vec::<f32>().unwrap(), vec![9.0]);
        assert!(batch.push(Sample::new(&[1, 1], vec![0.0f32]).unwrap()).is_err());
        assert!(batch.push(Sample::new(&[1], vec![0i32]).unwrap()).is_err());
    }

    #[test]
    fn resize_gives_every_sample_its_own_buffer() {
        let mut batch = SampleBatch::new(StorageDevice::Cpu, 4);
        batch.resize(&TensorListShape::uniform(3, &[2, 2]), DType::I32);
        assert_eq!(batch.num_samples(), 3);
        assert!(!batch.sample(0).shares_storage(batch.sample(1)));
        assert_eq!(batch.sample(2).to_vec::<i32>().unwrap(), vec![0; 4]);
        assert_eq!(batch.capacity(), 4);
    }
}
