//! Fixed-size batch schedules.

pub use super::*;

use std::ops::Range;

/// The batch layout of the inference and training buffers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BatchPlan {
    pub batch_size: u64,
    pub infer_record_count: u64,
    pub train_record_count: u64,
}

/// A contiguous run of records processed as one batch.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BatchRange {
    pub index: u64,
    pub record_offset: u64,
    pub record_count: u64,
}

impl BatchPlan {
    /// Plans the batches of a validated configuration.
    pub fn new(config: &NrcConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            batch_size: config.batch_size as u64,
            infer_record_count: config.infer_record_count(),
            train_record_count: config.train_record_count(),
        })
    }

    #[inline]
    pub const fn infer_batch_count(&self) -> u64 {
        self.infer_record_count / self.batch_size
    }

    #[inline]
    pub const fn train_batch_count(&self) -> u64 {
        self.train_record_count / self.batch_size
    }

    pub fn infer_batches(&self) -> impl Iterator<Item = BatchRange> {
        Self::batches(self.batch_size, self.infer_batch_count())
    }

    pub fn train_batches(&self) -> impl Iterator<Item = BatchRange> {
        Self::batches(self.batch_size, self.train_batch_count())
    }

    fn batches(
        batch_size: u64,
        batch_count: u64,
    ) -> impl Iterator<Item = BatchRange> {
        (0..batch_count).map(move |index| BatchRange {
            index,
            record_offset: index * batch_size,
            record_count: batch_size,
        })
    }
}

impl BatchRange {
    /// The float range of the batch in a buffer of `record_len`-float records.
    #[inline]
    pub fn elements(
        &self,
        record_len: usize,
    ) -> Range<usize> {
        let start = self.record_offset as usize * record_len;
        start..start + self.record_count as usize * record_len
    }

    /// The byte offset of the batch in a buffer of `record_len`-float records.
    #[inline]
    pub fn byte_offset(
        &self,
        record_len: usize,
    ) -> u64 {
        self.record_offset * record_len as u64 * 4
    }
}
