//! Binary semaphores shared by both runtimes.

pub use super::*;

use parking_lot::{Condvar, Mutex};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// The role of a semaphore within the hand-off cycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SemaphoreRole {
    /// Graphics to tensor.
    Start,
    /// Tensor to graphics.
    Finished,
}

/// A binary semaphore that drives a [`HandoffDomain`].
///
/// Each signal must be consumed by exactly one wait before the next signal.
#[derive(Debug)]
pub struct BinarySemaphore {
    label: String,
    role: SemaphoreRole,
    domain: Arc<HandoffDomain>,
    status: Mutex<SemaphoreStatus>,
    condvar: Condvar,
}

#[derive(Debug, Default)]
struct SemaphoreStatus {
    signaled: bool,
    aborted: Option<String>,
}

/// The start and finished semaphores of one hand-off domain.
#[derive(Clone, Debug)]
pub struct SyncPair {
    pub start: Arc<BinarySemaphore>,
    pub finished: Arc<BinarySemaphore>,
}

/// The exported handles of a [`SyncPair`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyncHandlePair {
    pub start: ExternalSemaphoreDescriptor,
    pub finished: ExternalSemaphoreDescriptor,
}

impl SemaphoreRole {
    #[inline]
    pub const fn signal_event(&self) -> HandoffEvent {
        match self {
            Self::Start => HandoffEvent::SignalStart,
            Self::Finished => HandoffEvent::SignalFinished,
        }
    }

    #[inline]
    pub const fn wait_event(&self) -> HandoffEvent {
        match self {
            Self::Start => HandoffEvent::WaitStart,
            Self::Finished => HandoffEvent::WaitFinished,
        }
    }
}

impl BinarySemaphore {
    pub fn new(
        label: impl Into<String>,
        role: SemaphoreRole,
        domain: Arc<HandoffDomain>,
    ) -> Self {
        Self {
            label: label.into(),
            role,
            domain,
            status: Default::default(),
            condvar: Condvar::new(),
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn role(&self) -> SemaphoreRole {
        self.role
    }

    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.status.lock().signaled
    }

    pub fn signal(&self) -> Result<()> {
        let mut status = self.status.lock();
        if let Some(reason) = &status.aborted {
            return Err(Error::DeviceLost(reason.to_owned()));
        }
        if status.signaled {
            return Err(Error::Synchronization(format!(
                "{} was signaled twice without a wait",
                self.label
            )));
        }

        self.domain.apply(self.role.signal_event())?;
        status.signaled = true;
        self.condvar.notify_all();

        log::trace!(
            target: "nrc_renderer::interop",
            "signal > {}",
            self.label,
        );

        Ok(())
    }

    /// Blocks until signaled, then unsignals.
    pub fn wait(
        &self,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();

        while !status.signaled {
            if let Some(reason) = &status.aborted {
                return Err(Error::DeviceLost(reason.to_owned()));
            }
            if self.condvar.wait_until(&mut status, deadline).timed_out()
                && !status.signaled
            {
                return Err(Error::SynchronizationTimeout {
                    semaphore: self.label.to_owned(),
                    timeout,
                });
            }
        }

        status.signaled = false;
        self.domain.apply(self.role.wait_event())?;

        log::trace!(
            target: "nrc_renderer::interop",
            "wait > {}",
            self.label,
        );

        Ok(())
    }

    /// Wakes every waiter with [`Error::DeviceLost`] and rejects later operations.
    pub fn abort(
        &self,
        reason: impl Into<String>,
    ) {
        let mut status = self.status.lock();
        if status.aborted.is_none() {
            status.aborted = Some(reason.into());
        }
        self.condvar.notify_all();
    }
}

impl SyncPair {
    pub fn new(
        label: &str,
        domain: &Arc<HandoffDomain>,
    ) -> Self {
        Self {
            start: Arc::new(BinarySemaphore::new(
                format!("{label}.start"),
                SemaphoreRole::Start,
                domain.to_owned(),
            )),
            finished: Arc::new(BinarySemaphore::new(
                format!("{label}.finished"),
                SemaphoreRole::Finished,
                domain.to_owned(),
            )),
        }
    }

    pub fn abort(
        &self,
        reason: &str,
    ) {
        self.start.abort(reason);
        self.finished.abort(reason);
    }
}
