//! Cross-runtime interop.
//!
//! The graphics device allocates memory and semaphores, exports them as opaque
//! handles through an [`Instance`], and the tensor runtime imports the same
//! objects from those handles. Exclusive access to the shared memory is
//! governed by a [`HandoffDomain`].

pub mod handoff;
pub mod instance;
pub mod memory;
pub mod semaphore;

pub use crate::error::{Error, Result};
pub use handoff::*;
pub use instance::*;
pub use memory::*;
pub use semaphore::*;

use std::fmt;

/// An opaque OS-level handle to an exported object.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExternalHandle(pub(crate) u64);

/// The element data type of a shared buffer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ElementType {
    Float32,
}

/// The execution context touching a shared object.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Side {
    Graphics,
    Tensor,
}

/// Describes a shared buffer to the importing runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExternalMemoryDescriptor {
    pub handle: ExternalHandle,
    pub size_bytes: u64,
    pub element_type: ElementType,
}

/// Describes a shared semaphore to the importing runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExternalSemaphoreDescriptor {
    pub handle: ExternalHandle,
}

impl ElementType {
    #[inline]
    pub const fn size_bytes(&self) -> u64 {
        match self {
            Self::Float32 => 4,
        }
    }
}

impl fmt::Display for ExternalHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl fmt::Display for Side {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Graphics => f.write_str("graphics"),
            Self::Tensor => f.write_str("tensor"),
        }
    }
}
