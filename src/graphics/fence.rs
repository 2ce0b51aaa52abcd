//! Host-visible completion fences.

pub use super::*;

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Signaled by the queue once a submission completes.
#[derive(Debug, Default)]
pub struct Fence {
    status: Mutex<FenceStatus>,
    condvar: Condvar,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum FenceStatus {
    #[default]
    Pending,
    Signaled,
    Failed(Error),
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn status(&self) -> FenceStatus {
        self.status.lock().to_owned()
    }

    #[inline]
    pub fn is_signaled(&self) -> bool {
        *self.status.lock() == FenceStatus::Signaled
    }

    pub(crate) fn complete(
        &self,
        result: Result<()>,
    ) {
        *self.status.lock() = match result {
            Ok(()) => FenceStatus::Signaled,
            Err(error) => FenceStatus::Failed(error),
        };
        self.condvar.notify_all();
    }

    /// Blocks until the fence completes.
    ///
    /// A failed submission returns its error.
    pub fn wait(
        &self,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        loop {
            match &*status {
                FenceStatus::Signaled => return Ok(()),
                FenceStatus::Failed(error) => return Err(error.to_owned()),
                FenceStatus::Pending => {},
            }
            if self.condvar.wait_until(&mut status, deadline).timed_out()
                && *status == FenceStatus::Pending
            {
                return Err(Error::SynchronizationTimeout {
                    semaphore: "frame fence".into(),
                    timeout,
                });
            }
        }
    }
}
