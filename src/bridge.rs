//! Conversions between the dense and per-sample batch representations.
//!
//! | from            | to              | cost                          |
//! |-----------------|-----------------|-------------------------------|
//! | `DenseBatch`    | `DenseBatch`    | alias, storage shared         |
//! | `DenseBatch`    | `SampleBatch`   | per-sample views, no copy     |
//! | `SampleBatch`   | `DenseBatch`    | one consolidating copy        |
//!
//! The last row is a known cost: per-sample buffers are gathered into one new
//! contiguous buffer every time, even when they already sit back to back.

use crate::batch::{Data, DenseBatch, Sample, SampleBatch, new_storage, read_storage};
use crate::error::Result;

/// Conversion of a workspace output into the dense representation returned
/// to callers.
pub trait AsDense {
    /// Produces the dense form of `self`.
    ///
    /// # Errors
    ///
    /// Fails if samples cannot be gathered (mismatched element types).
    fn as_dense(&self) -> Result<DenseBatch>;
}

impl AsDense for DenseBatch {
    fn as_dense(&self) -> Result<DenseBatch> {
        Ok(self.clone())
    }
}

impl AsDense for SampleBatch {
    fn as_dense(&self) -> Result<DenseBatch> {
        let shape = self.shape();
        tracing::trace!(
            samples = shape.num_samples(),
            elements = shape.num_elements(),
            "gathering per-sample batch into a dense buffer"
        );
        let mut data = Data::zeroed(self.dtype(), shape.num_elements());
        let mut at = 0;
        for sample in self.samples() {
            let volume = sample.volume();
            let src = read_storage(sample.storage());
            data.copy_from(at, &src, sample.offset(), volume)?;
            at += volume;
        }
        Ok(DenseBatch::from_parts(
            self.device(),
            new_storage(data),
            self.dtype(),
            shape,
            self.layout().clone(),
        ))
    }
}

/// Views a dense batch as per-sample windows over the same buffer.
#[must_use]
pub fn share_as_samples(dense: &DenseBatch) -> SampleBatch {
    let samples = (0..dense.num_samples())
        .map(|i| Sample {
            storage: dense.storage().clone(),
            offset: dense.sample_range(i).start,
            shape: dense.shape().sample(i).to_vec(),
            dtype: dense.dtype(),
        })
        .collect();
    SampleBatch {
        device: dense.device(),
        samples,
        dtype: dense.dtype(),
        layout: dense.layout().clone(),
        capacity: dense.capacity(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageDevice;
    use crate::batch::{Layout, TensorListShape};

    #[test]
    fn dense_to_dense_is_identity() {
        let dense =
            DenseBatch::from_uniform(StorageDevice::Gpu, 2, &[2], vec![1.0f32, 2.0, 3.0, 4.0])
                .unwrap();
        let out = dense.as_dense().unwrap();
        assert!(out.shares_storage(&dense));
        assert_eq!(out.shape(), dense.shape());
    }

    #[test]
    fn samples_to_dense_copies() {
        let mut batch = SampleBatch::from_samples(
            StorageDevice::Cpu,
            vec![
                Sample::new(&[1, 2], vec![1i32, 2]).unwrap(),
                Sample::new(&[2, 2], vec![3i32, 4, 5, 6]).unwrap(),
            ],
        )
        .unwrap();
        batch.set_layout(Layout::new("HW"));

        let dense = batch.as_dense().unwrap();
        assert_eq!(dense.num_samples(), 2);
        assert_eq!(
            dense.shape(),
            &TensorListShape::new(vec![vec![1, 2], vec![2, 2]]).unwrap()
        );
        assert_eq!(dense.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(dense.layout(), &Layout::new("HW"));

        // the dense copy is independent of the samples
        batch.sample(0).with_data_mut(|d: &mut [i32]| d[0] = 100).unwrap();
        assert_eq!(dense.sample_to_vec::<i32>(0).unwrap(), vec![1, 2]);
    }

    #[test]
    fn shared_samples_view_dense_buffer() {
        let dense =
            DenseBatch::from_uniform(StorageDevice::Cpu, 3, &[1], vec![5.0f32, 6.0, 7.0]).unwrap();
        let samples = share_as_samples(&dense);
        assert_eq!(samples.num_samples(), 3);
        assert_eq!(samples.sample(2).to_vec::<f32>().unwrap(), vec![7.0]);
        samples.sample(1).with_data_mut(|d: &mut [f32]| d[0] = 0.5).unwrap();
        assert_eq!(dense.to_vec::<f32>().unwrap(), vec![5.0, 0.5, 7.0]);

        // gathering shared views still copies
        let back = samples.as_dense().unwrap();
        assert!(!back.shares_storage(&dense));
        assert_eq!(back.to_vec::<f32>().unwrap(), vec![5.0, 0.5, 7.0]);
    }
}
