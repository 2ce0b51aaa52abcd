//! Device memory shared by both runtimes.

pub use super::*;

use humansize::{format_size, BINARY};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::{fmt, sync::Arc};

/// A read mapping of shared memory.
pub type MappedRead<'a> = RwLockReadGuard<'a, Vec<f32>>;

/// A write mapping of shared memory.
pub type MappedWrite<'a> = RwLockWriteGuard<'a, Vec<f32>>;

/// The backing memory of a shared buffer.
pub struct Allocation {
    label: String,
    data: RwLock<Vec<f32>>,
    domain: Arc<HandoffDomain>,
    element_count: usize,
}

/// The graphics-side view of an exported buffer.
#[derive(Clone, Debug)]
pub struct SharedBuffer {
    allocation: Arc<Allocation>,
    descriptor: ExternalMemoryDescriptor,
}

/// The tensor-side view of an imported buffer.
///
/// It aliases the memory of the [`SharedBuffer`] it was imported from.
#[derive(Clone, Debug)]
pub struct ImportedBuffer {
    allocation: Arc<Allocation>,
    descriptor: ExternalMemoryDescriptor,
}

impl Allocation {
    pub(crate) fn new(
        label: &str,
        element_count: usize,
        domain: Arc<HandoffDomain>,
    ) -> Result<Self> {
        let size_bytes = (element_count as u64)
            .checked_mul(ElementType::Float32.size_bytes())
            .ok_or_else(|| {
                Error::ResourceExhaustion(format!(
                    "{label} of {element_count} elements overflows the byte size"
                ))
            })?;
        let mut data = Vec::new();
        data.try_reserve_exact(element_count).map_err(|error| {
            Error::ResourceExhaustion(format!(
                "Allocating {} for {label}: {error}",
                format_size(size_bytes, BINARY),
            ))
        })?;
        data.resize(element_count, 0.0);

        log::debug!(
            target: "nrc_renderer::interop",
            "allocate > {label} ({})",
            format_size(size_bytes, BINARY),
        );

        Ok(Self {
            label: label.to_owned(),
            data: RwLock::new(data),
            domain,
            element_count,
        })
    }

    #[inline]
    pub(crate) fn size_bytes(&self) -> u64 {
        self.element_count as u64 * ElementType::Float32.size_bytes()
    }

    fn read(
        &self,
        side: Side,
    ) -> Result<MappedRead<'_>> {
        self.domain.ensure_owner(side).map_err(|error| {
            Error::Synchronization(format!("Mapping {}: {error}", self.label))
        })?;
        Ok(self.data.read())
    }

    fn write(
        &self,
        side: Side,
    ) -> Result<MappedWrite<'_>> {
        self.domain.ensure_owner(side).map_err(|error| {
            Error::Synchronization(format!("Mapping {}: {error}", self.label))
        })?;
        Ok(self.data.write())
    }
}

impl SharedBuffer {
    /// Allocates zeroed memory and exports it through `instance`.
    pub fn new(
        instance: &Instance,
        label: &str,
        element_count: usize,
        domain: &Arc<HandoffDomain>,
    ) -> Result<Self> {
        let allocation =
            Arc::new(Allocation::new(label, element_count, domain.to_owned())?);
        let descriptor =
            instance.export_memory(allocation.to_owned(), ElementType::Float32);

        Ok(Self {
            allocation,
            descriptor,
        })
    }

    #[inline]
    pub fn descriptor(&self) -> ExternalMemoryDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.allocation.label
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.allocation.element_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn read(&self) -> Result<MappedRead<'_>> {
        self.allocation.read(Side::Graphics)
    }

    #[inline]
    pub fn write(&self) -> Result<MappedWrite<'_>> {
        self.allocation.write(Side::Graphics)
    }
}

impl ImportedBuffer {
    /// Imports the buffer behind `descriptor`.
    ///
    /// The size and element type must match the export.
    pub fn import(
        instance: &Instance,
        descriptor: &ExternalMemoryDescriptor,
    ) -> Result<Self> {
        let allocation = instance.import_memory(descriptor)?;

        log::debug!(
            target: "nrc_renderer::interop",
            "import > {} ({})",
            allocation.label,
            descriptor.handle,
        );

        Ok(Self {
            allocation,
            descriptor: *descriptor,
        })
    }

    #[inline]
    pub fn descriptor(&self) -> ExternalMemoryDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.allocation.element_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn read(&self) -> Result<MappedRead<'_>> {
        self.allocation.read(Side::Tensor)
    }

    #[inline]
    pub fn write(&self) -> Result<MappedWrite<'_>> {
        self.allocation.write(Side::Tensor)
    }
}

impl fmt::Debug for Allocation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("label", &self.label)
            .field("element_count", &self.element_count)
            .field("state", &self.domain.state())
            .finish()
    }
}
