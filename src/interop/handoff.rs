//! Ownership hand-off of the shared buffers.

pub use super::*;

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Events kept by [`HandoffDomain::trace`].
pub const TRACE_CAPACITY: usize = 1024;

/// The state of one hand-off cycle.
///
/// ```plaintext
/// GraphicsWriting --SignalStart--> HandoffToTensor --WaitStart--> TensorActive
///       ^                                                              |
///       |                                                       SignalFinished
///       |                                                              v
/// GraphicsActive <--WaitFinished-- HandoffToGraphics <-----------------+
///       |
///       +--SignalStart--> HandoffToTensor ...
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum HandoffState {
    /// The generator writes the shared buffers.
    #[default]
    GraphicsWriting,
    /// The start semaphore is signaled but not yet waited on.
    HandoffToTensor,
    /// The tensor runtime infers and trains.
    TensorActive,
    /// The finished semaphore is signaled but not yet waited on.
    HandoffToGraphics,
    /// The compositor reads the predictions.
    GraphicsActive,
}

/// A semaphore operation of the cycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HandoffEvent {
    SignalStart,
    WaitStart,
    SignalFinished,
    WaitFinished,
}

/// A recorded transition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyncEvent {
    pub event: HandoffEvent,
    pub state: HandoffState,
}

/// The ownership state machine shared by a semaphore pair and the buffers it guards.
#[derive(Debug, Default)]
pub struct HandoffDomain {
    state: Mutex<HandoffState>,
    trace: Mutex<VecDeque<SyncEvent>>,
}

impl HandoffState {
    /// The side allowed to touch the shared buffers.
    #[inline]
    pub const fn owner(&self) -> Option<Side> {
        match self {
            Self::GraphicsWriting | Self::GraphicsActive => Some(Side::Graphics),
            Self::TensorActive => Some(Side::Tensor),
            Self::HandoffToTensor | Self::HandoffToGraphics => None,
        }
    }

    /// Returns the next state, or `None` if the event is out of order.
    pub const fn transition(
        &self,
        event: HandoffEvent,
    ) -> Option<Self> {
        use HandoffEvent::*;
        use HandoffState::*;

        match (self, event) {
            (GraphicsWriting | GraphicsActive, SignalStart) => {
                Some(HandoffToTensor)
            },
            (HandoffToTensor, WaitStart) => Some(TensorActive),
            (TensorActive, SignalFinished) => Some(HandoffToGraphics),
            (HandoffToGraphics, WaitFinished) => Some(GraphicsActive),
            _ => None,
        }
    }
}

impl HandoffEvent {
    /// The side performing the event.
    #[inline]
    pub const fn side(&self) -> Side {
        match self {
            Self::SignalStart | Self::WaitFinished => Side::Graphics,
            Self::WaitStart | Self::SignalFinished => Side::Tensor,
        }
    }
}

impl HandoffDomain {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> HandoffState {
        *self.state.lock()
    }

    /// Applies the event, failing on any out-of-order transition.
    pub fn apply(
        &self,
        event: HandoffEvent,
    ) -> Result<HandoffState> {
        let mut state = self.state.lock();
        let next = state.transition(event).ok_or_else(|| {
            Error::Synchronization(format!(
                "{event:?} by the {} side is invalid in {:?}",
                event.side(),
                *state,
            ))
        })?;
        *state = next;

        let mut trace = self.trace.lock();
        if trace.len() == TRACE_CAPACITY {
            trace.pop_front();
        }
        trace.push_back(SyncEvent { event, state: next });

        Ok(next)
    }

    /// Fails unless `side` currently owns the shared buffers.
    pub fn ensure_owner(
        &self,
        side: Side,
    ) -> Result<()> {
        let state = self.state();
        match state.owner() {
            Some(owner) if owner == side => Ok(()),
            _ => Err(Error::Synchronization(format!(
                "The {side} side accessed shared memory in {state:?}"
            ))),
        }
    }

    /// The most recent transitions, oldest first.
    pub fn trace(&self) -> Vec<SyncEvent> {
        self.trace.lock().iter().copied().collect()
    }
}
