//! A per-analysis arena of reusable [`Sample`] buffers.
//!
//! Every smoothing pass and baseline estimate needs a scratch series the same
//! length as its input. Rather than allocating a fresh `Vec` for each, a
//! detection run checks buffers out of a [`SamplePool`] and they return to it
//! when the [`PooledBuffer`] is dropped. The pool hands out buffers through a
//! shared borrow, so a buffer can never outlive the pool it came from.
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::sample::{AxisType, AxisUnit, PooledSeries, Sample, SampleSeries};

/// A slab of sample buffers owned by one analysis session.
///
/// The pool is neither `Sync` nor meant to be shared across threads; each
/// concurrent analysis owns its own.
#[derive(Default)]
pub struct SamplePool {
    free: RefCell<Vec<Vec<Sample>>>,
    checked_out: Cell<usize>,
}

impl SamplePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a buffer of `len` default-valued samples
    pub fn checkout(&self, len: usize) -> PooledBuffer<'_> {
        let mut data = self.free.borrow_mut().pop().unwrap_or_default();
        data.clear();
        data.resize(len, Sample::default());
        self.checked_out.set(self.checked_out.get() + 1);
        PooledBuffer { pool: self, data }
    }

    /// Check out a buffer holding a copy of `samples`
    pub fn checkout_copy(&self, samples: &[Sample]) -> PooledBuffer<'_> {
        let mut buffer = self.checkout(0);
        buffer.data.extend_from_slice(samples);
        buffer
    }

    /// Check out a buffer shaped like `template`, carrying its axis tags
    pub fn checkout_series<S: Deref<Target = [Sample]>>(
        &self,
        template: &SampleSeries<S>,
    ) -> PooledSeries<'_> {
        SampleSeries::from_storage(
            self.checkout_copy(template.as_slice()),
            template.axis_type,
            template.axis_unit,
        )
    }

    pub(crate) fn checkout_series_with(
        &self,
        len: usize,
        axis_type: AxisType,
        axis_unit: AxisUnit,
    ) -> PooledSeries<'_> {
        SampleSeries::from_storage(self.checkout(len), axis_type, axis_unit)
    }

    /// The number of buffers currently checked out
    pub fn outstanding(&self) -> usize {
        self.checked_out.get()
    }

    /// The number of released buffers ready for reuse
    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }

    fn release(&self, data: Vec<Sample>) {
        let count = self.checked_out.get();
        assert!(count > 0, "Released more buffers than were checked out");
        self.checked_out.set(count - 1);
        self.free.borrow_mut().push(data);
    }
}

impl fmt::Debug for SamplePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplePool")
            .field("outstanding", &self.outstanding())
            .field("available", &self.available())
            .finish()
    }
}

/// A sample buffer on loan from a [`SamplePool`]
pub struct PooledBuffer<'p> {
    pool: &'p SamplePool,
    data: Vec<Sample>,
}

impl PooledBuffer<'_> {
    /// Copy the contents out into a `Vec` that does not borrow the pool
    pub fn to_vec(&self) -> Vec<Sample> {
        self.data.clone()
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = [Sample];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.release(data);
    }
}

impl fmt::Debug for PooledBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}

impl PartialEq for PooledBuffer<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_checkout_release() {
        let pool = SamplePool::new();
        {
            let a = pool.checkout(10);
            let b = pool.checkout(5);
            assert_eq!(a.len(), 10);
            assert_eq!(b.len(), 5);
            assert_eq!(pool.outstanding(), 2);
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.available(), 2);

        let c = pool.checkout(3);
        assert_eq!(pool.available(), 1);
        assert!(c.iter().all(|s| *s == Sample::default()));
        drop(c);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_checkout_copy() {
        let pool = SamplePool::new();
        let samples = vec![Sample::new(0, 0.0, 0.0, 1.0), Sample::new(1, 1.0, 0.0, 2.0)];
        let mut buf = pool.checkout_copy(&samples);
        assert_eq!(&*buf, samples.as_slice());
        buf[1].intensity = 5.0;
        assert_eq!(buf.to_vec()[1].intensity, 5.0);
        assert_eq!(samples[1].intensity, 2.0);
    }

    #[test]
    #[should_panic]
    fn test_over_release() {
        let pool = SamplePool::new();
        pool.release(Vec::new());
    }
}
