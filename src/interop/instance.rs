//! The handle table of exported objects.

pub use super::*;

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// A process-local registry of exported handles.
///
/// Cloning shares the same table.
#[derive(Clone, Debug, Default)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

#[derive(Debug, Default)]
struct InstanceInner {
    exports: Mutex<HashMap<ExternalHandle, Export>>,
    next_handle: AtomicU64,
}

#[derive(Clone, Debug)]
enum Export {
    Memory(Arc<Allocation>, ElementType),
    Semaphore(Arc<BinarySemaphore>),
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &self,
        export: Export,
    ) -> ExternalHandle {
        let handle =
            ExternalHandle(self.inner.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.inner.exports.lock().insert(handle, export);
        handle
    }

    fn get(
        &self,
        handle: ExternalHandle,
    ) -> Result<Export> {
        self.inner
            .exports
            .lock()
            .get(&handle)
            .cloned()
            .ok_or_else(|| {
                Error::HandleImport(format!("{handle} is not an open handle"))
            })
    }

    pub(crate) fn export_memory(
        &self,
        allocation: Arc<Allocation>,
        element_type: ElementType,
    ) -> ExternalMemoryDescriptor {
        let size_bytes = allocation.size_bytes();
        let handle = self.insert(Export::Memory(allocation, element_type));

        ExternalMemoryDescriptor {
            handle,
            size_bytes,
            element_type,
        }
    }

    pub(crate) fn import_memory(
        &self,
        descriptor: &ExternalMemoryDescriptor,
    ) -> Result<Arc<Allocation>> {
        let handle = descriptor.handle;
        let (allocation, element_type) = match self.get(handle)? {
            Export::Memory(allocation, element_type) => (allocation, element_type),
            Export::Semaphore(_) => {
                return Err(Error::HandleImport(format!(
                    "{handle} is a semaphore, not memory"
                )))
            },
        };

        if allocation.size_bytes() != descriptor.size_bytes {
            return Err(Error::HandleImport(format!(
                "{handle} has {} bytes, not {}",
                allocation.size_bytes(),
                descriptor.size_bytes,
            )));
        }
        if element_type != descriptor.element_type {
            return Err(Error::HandleImport(format!(
                "{handle} holds {element_type:?}, not {:?}",
                descriptor.element_type,
            )));
        }

        Ok(allocation)
    }

    pub fn export_semaphore(
        &self,
        semaphore: &Arc<BinarySemaphore>,
    ) -> ExternalSemaphoreDescriptor {
        ExternalSemaphoreDescriptor {
            handle: self.insert(Export::Semaphore(semaphore.to_owned())),
        }
    }

    pub fn import_semaphore(
        &self,
        descriptor: &ExternalSemaphoreDescriptor,
    ) -> Result<Arc<BinarySemaphore>> {
        let handle = descriptor.handle;
        match self.get(handle)? {
            Export::Semaphore(semaphore) => Ok(semaphore),
            Export::Memory(..) => Err(Error::HandleImport(format!(
                "{handle} is memory, not a semaphore"
            ))),
        }
    }

    pub fn export_sync_pair(
        &self,
        pair: &SyncPair,
    ) -> SyncHandlePair {
        SyncHandlePair {
            start: self.export_semaphore(&pair.start),
            finished: self.export_semaphore(&pair.finished),
        }
    }

    pub fn import_sync_pair(
        &self,
        handles: &SyncHandlePair,
    ) -> Result<SyncPair> {
        let start = self.import_semaphore(&handles.start)?;
        let finished = self.import_semaphore(&handles.finished)?;

        if start.role() != SemaphoreRole::Start
            || finished.role() != SemaphoreRole::Finished
        {
            return Err(Error::HandleImport(format!(
                "{} and {} are not a start and finished pair",
                handles.start.handle, handles.finished.handle,
            )));
        }

        Ok(SyncPair { start, finished })
    }

    /// Closes the handle. Imported views stay valid.
    ///
    /// Returns `false` if the handle was not open.
    pub fn close_handle(
        &self,
        handle: ExternalHandle,
    ) -> bool {
        self.inner.exports.lock().remove(&handle).is_some()
    }

    #[inline]
    pub fn open_handle_count(&self) -> usize {
        self.inner.exports.lock().len()
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn export_import_close() {
        use super::*;

        let instance = Instance::new();
        let domain = Arc::new(HandoffDomain::new());
        let pair = SyncPair::new("test", &domain);

        let handles = instance.export_sync_pair(&pair);
        assert_ne!(handles.start.handle, handles.finished.handle);
        assert_eq!(instance.open_handle_count(), 2);

        let imported = instance.import_sync_pair(&handles).unwrap();
        assert!(Arc::ptr_eq(&imported.start, &pair.start));

        assert!(instance.close_handle(handles.start.handle));
        assert!(!instance.close_handle(handles.start.handle));
        assert_eq!(instance.open_handle_count(), 1);
        assert!(matches!(
            instance.import_semaphore(&handles.start),
            Err(Error::HandleImport(_))
        ));
    }

    #[test]
    fn swapped_pair() {
        use super::*;

        let instance = Instance::new();
        let domain = Arc::new(HandoffDomain::new());
        let pair = SyncPair::new("test", &domain);
        let handles = instance.export_sync_pair(&pair);

        let swapped = SyncHandlePair {
            start: handles.finished,
            finished: handles.start,
        };
        assert!(matches!(
            instance.import_sync_pair(&swapped),
            Err(Error::HandleImport(_))
        ));
    }

    #[test]
    fn kind_mismatch() {
        use super::*;

        let instance = Instance::new();
        let domain = Arc::new(HandoffDomain::new());
        let pair = SyncPair::new("test", &domain);
        let semaphore = instance.export_semaphore(&pair.start);

        let descriptor = ExternalMemoryDescriptor {
            handle: semaphore.handle,
            size_bytes: 0,
            element_type: ElementType::Float32,
        };
        assert!(matches!(
            instance.import_memory(&descriptor),
            Err(Error::HandleImport(_))
        ));
    }
}
