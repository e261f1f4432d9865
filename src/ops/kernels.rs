//! Element loops shared by the built-in operators.
//!
//! Kernels address samples as [`Window`]s, a storage handle plus an element
//! range, so the same loop serves dense and per-sample batches and can be
//! moved onto a stream.

use crate::batch::{Data, DenseBatch, Storage, read_storage, write_storage};
use crate::error::{EagerError, Result};
use crate::workspace::BatchSlot;
use std::ops::Range;
use std::sync::Arc;

/// Elements `offset..offset + len` of a storage.
#[derive(Debug, Clone)]
pub struct Window {
    pub storage: Storage,
    pub offset: usize,
    pub len: usize,
}

impl Window {
    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// One window per sample of `slot`, in sample order.
#[must_use]
pub fn sample_windows(slot: &BatchSlot) -> Vec<Window> {
    match slot {
        BatchSlot::Dense(b) => (0..b.num_samples())
            .map(|i| {
                let range = b.sample_range(i);
                Window {
                    storage: b.storage().clone(),
                    offset: range.start,
                    len: range.len(),
                }
            })
            .collect(),
        BatchSlot::Samples(b) => b
            .samples()
            .iter()
            .map(|s| Window {
                storage: s.storage().clone(),
                offset: s.offset(),
                len: s.volume(),
            })
            .collect(),
    }
}

fn check_bounds(data: &Data, range: &Range<usize>) -> Result<()> {
    if range.end > data.len() {
        return Err(EagerError::ShapeMismatch(format!(
            "window {range:?} exceeds a buffer of {} elements",
            data.len()
        )));
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn add_into(
    dst: &mut Data,
    to: Range<usize>,
    src: &Data,
    from: Range<usize>,
    delta: f64,
) -> Result<()> {
    check_bounds(dst, &to)?;
    check_bounds(src, &from)?;
    match (dst, src) {
        (Data::F32(d), Data::F32(s)) => {
            let delta = delta as f32;
            for (o, i) in d[to].iter_mut().zip(&s[from]) {
                *o = *i + delta;
            }
        }
        (Data::I32(d), Data::I32(s)) => {
            for (o, i) in d[to].iter_mut().zip(&s[from]) {
                *o = (f64::from(*i) + delta).round() as i32;
            }
        }
        (Data::U8(d), Data::U8(s)) => {
            for (o, i) in d[to].iter_mut().zip(&s[from]) {
                *o = (f64::from(*i) + delta).round().clamp(0.0, 255.0) as u8;
            }
        }
        (d, s) => {
            return Err(EagerError::TypeMismatch {
                expected: d.dtype(),
                got: s.dtype(),
            });
        }
    }
    Ok(())
}

/// Writes `src + delta` into `dst`, element by element.
///
/// # Errors
///
/// Length, bounds or element type mismatch.
pub fn add_scalar(dst: &Window, src: &Window, delta: f64) -> Result<()> {
    if dst.len != src.len {
        return Err(EagerError::ShapeMismatch(format!(
            "cannot write {} elements into a window of {}",
            src.len, dst.len
        )));
    }
    if Arc::ptr_eq(&dst.storage, &src.storage) {
        let mut data = write_storage(&dst.storage);
        let snapshot = data.clone();
        return add_into(&mut data, dst.range(), &snapshot, src.range(), delta);
    }
    let src_data = read_storage(&src.storage);
    let mut dst_data = write_storage(&dst.storage);
    add_into(&mut dst_data, dst.range(), &src_data, src.range(), delta)
}

/// Writes `times` back-to-back copies of `src` into `dst`.
///
/// # Errors
///
/// Length, bounds or element type mismatch.
pub fn tile(dst: &Window, src: &Window, times: usize) -> Result<()> {
    if dst.len != src.len * times {
        return Err(EagerError::ShapeMismatch(format!(
            "{times} copies of {} elements do not fill a window of {}",
            src.len, dst.len
        )));
    }
    let snapshot;
    let src_guard;
    let src_data = if Arc::ptr_eq(&dst.storage, &src.storage) {
        snapshot = read_storage(&src.storage).clone();
        &snapshot
    } else {
        src_guard = read_storage(&src.storage);
        &*src_guard
    };
    let mut dst_data = write_storage(&dst.storage);
    for k in 0..times {
        dst_data.copy_from(dst.offset + k * src.len, src_data, src.offset, src.len)?;
    }
    Ok(())
}

/// Reads element 0 of sample `index` of a single-element-per-sample batch as
/// `f64`.
///
/// # Errors
///
/// [`EagerError::ShapeMismatch`] unless the sample holds exactly one element.
///
/// # Panics
///
/// Panics if `index` is out of range.
pub fn scalar_at(batch: &DenseBatch, index: usize) -> Result<f64> {
    let range = batch.sample_range(index);
    if range.len() != 1 {
        return Err(EagerError::ShapeMismatch(format!(
            "sample {index} holds {} elements, expected a scalar",
            range.len()
        )));
    }
    let data = read_storage(batch.storage());
    Ok(match &*data {
        Data::F32(v) => f64::from(v[range.start]),
        Data::I32(v) => f64::from(v[range.start]),
        Data::U8(v) => f64::from(v[range.start]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageDevice;
    use crate::batch::new_storage;

    fn window(storage: &Storage, offset: usize, len: usize) -> Window {
        Window {
            storage: storage.clone(),
            offset,
            len,
        }
    }

    #[test]
    fn add_per_dtype() {
        let src = new_storage(Data::U8(vec![10, 250]));
        let dst = new_storage(Data::zeroed(crate::batch::DType::U8, 2));
        add_scalar(&window(&dst, 0, 2), &window(&src, 0, 2), 10.0).unwrap();
        assert_eq!(*read_storage(&dst), Data::U8(vec![20, 255]));

        let ints = new_storage(Data::I32(vec![-3, 4]));
        add_scalar(&window(&ints, 0, 2), &window(&ints, 0, 2), 1.0).unwrap();
        assert_eq!(*read_storage(&ints), Data::I32(vec![-2, 5]));
    }

    #[test]
    fn add_rejects_mismatches() {
        let a = new_storage(Data::F32(vec![0.0; 3]));
        let b = new_storage(Data::I32(vec![0; 3]));
        assert!(matches!(
            add_scalar(&window(&a, 0, 3), &window(&b, 0, 3), 1.0),
            Err(EagerError::TypeMismatch { .. })
        ));
        assert!(add_scalar(&window(&a, 1, 3), &window(&a, 0, 3), 1.0).is_err());
        assert!(add_scalar(&window(&a, 0, 2), &window(&a, 0, 3), 1.0).is_err());
    }

    #[test]
    fn tile_repeats_the_window() {
        let src = new_storage(Data::I32(vec![9, 1, 2]));
        let dst = new_storage(Data::zeroed(crate::batch::DType::I32, 6));
        tile(&window(&dst, 0, 6), &window(&src, 1, 2), 3).unwrap();
        assert_eq!(*read_storage(&dst), Data::I32(vec![1, 2, 1, 2, 1, 2]));
    }

    #[test]
    fn scalars_of_any_dtype() {
        let batch = DenseBatch::from_uniform(StorageDevice::Cpu, 2, &[1], vec![3i32, 7]).unwrap();
        assert_eq!(scalar_at(&batch, 1).unwrap(), 7.0);
        let wide =
            DenseBatch::from_uniform(StorageDevice::Cpu, 1, &[2], vec![1.0f32, 2.0]).unwrap();
        assert!(scalar_at(&wide, 0).is_err());
    }
}
