//! The graphics device.

pub mod command;
pub mod fence;
pub mod queue;

pub use crate::{
    error::{Error, Result},
    interop::*,
};
pub use command::*;
pub use fence::*;
pub use queue::*;

use std::{sync::Arc, time::Duration};

/// Owns the queue and allocates exportable objects.
#[derive(Debug)]
pub struct GraphicsDevice {
    instance: Instance,
    queue: Queue,
}

impl GraphicsDevice {
    pub fn new(
        instance: &Instance,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            instance: instance.to_owned(),
            queue: Queue::new("nrc-graphics-queue", timeout)?,
        })
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Allocates an exported buffer of `element_count` floats.
    pub fn create_shared_buffer(
        &self,
        label: &str,
        element_count: usize,
        domain: &Arc<HandoffDomain>,
    ) -> Result<SharedBuffer> {
        SharedBuffer::new(&self.instance, label, element_count, domain)
    }

    /// Creates a semaphore pair and exports both ends.
    pub fn create_sync_pair(
        &self,
        label: &str,
        domain: &Arc<HandoffDomain>,
    ) -> (SyncPair, SyncHandlePair) {
        let pair = SyncPair::new(label, domain);
        let handles = self.instance.export_sync_pair(&pair);
        (pair, handles)
    }

    #[inline]
    pub fn submit(
        &self,
        submission: Submission,
    ) -> Result<()> {
        self.queue.submit(submission)
    }

    #[inline]
    pub fn lost(&self) -> Option<Error> {
        self.queue.lost()
    }
}
