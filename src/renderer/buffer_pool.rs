//! GPU buffers keyed by attribute identity

use std::collections::HashMap;

use crate::backend::{BackendError, BackendResult, BufferHandle, GraphicsBackend};
use crate::resources::{Attribute, AttributeId};

/// What [`BufferPool::bind`] had to do for an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOp {
    /// First bind: a buffer was created and filled
    Allocated,
    /// New data fit the existing allocation and was written in place
    Updated,
    /// New data outgrew the allocation; a new buffer replaced it
    Reallocated,
    /// Nothing changed; the existing buffer was reused as is
    Rebound,
}

/// Result of a bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    pub handle: BufferHandle,
    pub op: BufferOp,
}

/// Counters for every decision the pool made
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub allocations: u64,
    pub updates: u64,
    pub reallocations: u64,
    pub rebinds: u64,
    pub releases: u64,
    pub bytes_uploaded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BufferKey {
    Attribute(AttributeId),
    Named(String),
}

#[derive(Debug)]
struct PooledBuffer {
    handle: BufferHandle,
    capacity: u64,
    owner: AttributeId,
}

/// Maps each attribute to exactly one live GPU buffer.
///
/// Buffers are keyed by attribute identity, not contents: two attributes
/// with equal data get two buffers. Attributes that publish a named shared
/// buffer are keyed by that name instead, so views can find it.
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: HashMap<BufferKey, PooledBuffer>,
    stats: BufferPoolStats,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(attribute: &Attribute) -> BufferKey {
        match attribute.buffer_name() {
            Some(name) => BufferKey::Named(name.to_string()),
            None => BufferKey::Attribute(attribute.id()),
        }
    }

    /// Make sure `attribute` has an up-to-date buffer without touching
    /// binding points.
    ///
    /// Never bound: allocate and upload. Bound and `updated`: write in place
    /// if the data fits, otherwise reallocate. Bound and not updated: reuse.
    /// The attribute's `updated` flag is cleared afterwards.
    pub fn ensure(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        attribute: &mut Attribute,
    ) -> BackendResult<BufferBinding> {
        if attribute.is_shared_view() {
            return Err(BackendError::Unsupported(format!(
                "attribute view of shared buffer '{}' has no data to upload",
                attribute.buffer_name().unwrap_or_default()
            )));
        }

        let key = Self::key(attribute);
        let bytes = attribute.data().map(|d| d.as_bytes()).unwrap_or(&[]);
        let size = bytes.len() as u64;

        let binding = match self.buffers.get_mut(&key) {
            None => {
                let handle = backend.create_buffer(&attribute.buffer_descriptor(), bytes)?;
                self.buffers.insert(
                    key,
                    PooledBuffer {
                        handle,
                        capacity: size,
                        owner: attribute.id(),
                    },
                );
                self.stats.allocations += 1;
                self.stats.bytes_uploaded += size;
                BufferBinding {
                    handle,
                    op: BufferOp::Allocated,
                }
            }
            Some(entry) if !attribute.is_updated() && entry.owner == attribute.id() => {
                self.stats.rebinds += 1;
                BufferBinding {
                    handle: entry.handle,
                    op: BufferOp::Rebound,
                }
            }
            Some(entry) => {
                if entry.owner != attribute.id() {
                    log::warn!(
                        "Shared buffer {:?} is now fed by a different attribute",
                        key
                    );
                    entry.owner = attribute.id();
                }

                if size <= entry.capacity {
                    backend.write_buffer(entry.handle, 0, bytes)?;
                    self.stats.updates += 1;
                    self.stats.bytes_uploaded += size;
                    BufferBinding {
                        handle: entry.handle,
                        op: BufferOp::Updated,
                    }
                } else {
                    let handle = backend.create_buffer(&attribute.buffer_descriptor(), bytes)?;
                    backend.destroy_buffer(entry.handle);
                    log::debug!(
                        "Reallocated buffer for {:?}: {} -> {} bytes",
                        key,
                        entry.capacity,
                        size
                    );
                    entry.handle = handle;
                    entry.capacity = size;
                    self.stats.reallocations += 1;
                    self.stats.bytes_uploaded += size;
                    BufferBinding {
                        handle,
                        op: BufferOp::Reallocated,
                    }
                }
            }
        };

        attribute.clear_updated();
        Ok(binding)
    }

    /// [`BufferPool::ensure`] and attach the buffer to the attribute's target
    pub fn bind(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        attribute: &mut Attribute,
    ) -> BackendResult<BufferBinding> {
        let binding = self.ensure(backend, attribute)?;
        backend.bind_buffer(attribute.target(), binding.handle);
        Ok(binding)
    }

    /// Buffer published under `name`, if its owner has been bound
    pub fn shared_buffer(&self, name: &str) -> Option<BufferHandle> {
        self.buffers
            .get(&BufferKey::Named(name.to_string()))
            .map(|entry| entry.handle)
    }

    /// Buffer currently backing `attribute`
    pub fn handle(&self, attribute: &Attribute) -> Option<BufferHandle> {
        self.buffers
            .get(&Self::key(attribute))
            .map(|entry| entry.handle)
    }

    /// Capacity in bytes of the buffer backing `attribute`
    pub fn capacity(&self, attribute: &Attribute) -> Option<u64> {
        self.buffers
            .get(&Self::key(attribute))
            .map(|entry| entry.capacity)
    }

    /// Destroy every buffer owned by the attribute `id`
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend, id: AttributeId) -> bool {
        let keys: Vec<BufferKey> = self
            .buffers
            .iter()
            .filter(|(_, entry)| entry.owner == id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            if let Some(entry) = self.buffers.remove(key) {
                backend.destroy_buffer(entry.handle);
                self.stats.releases += 1;
            }
        }
        !keys.is_empty()
    }

    pub fn release_all(&mut self, backend: &mut dyn GraphicsBackend) {
        for (_, entry) in self.buffers.drain() {
            backend.destroy_buffer(entry.handle);
            self.stats.releases += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn stats(&self) -> BufferPoolStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn test_unchanged_attribute_is_rebound() {
        let mut backend = HeadlessBackend::default();
        let mut pool = BufferPool::new();
        let mut attribute = Attribute::new(vec![0.0f32; 9], 3);

        let first = pool.bind(&mut backend, &mut attribute).unwrap();
        let second = pool.bind(&mut backend, &mut attribute).unwrap();

        assert_eq!(first.op, BufferOp::Allocated);
        assert_eq!(second.op, BufferOp::Rebound);
        assert_eq!(first.handle, second.handle);
        assert_eq!(backend.stats().buffers_allocated, 1);
        assert_eq!(backend.stats().bytes_uploaded, 36);
    }

    #[test]
    fn test_equal_contents_get_separate_buffers() {
        let mut backend = HeadlessBackend::default();
        let mut pool = BufferPool::new();
        let mut a = Attribute::new(vec![1.0f32, 2.0, 3.0], 3);
        let mut b = Attribute::new(vec![1.0f32, 2.0, 3.0], 3);

        let a = pool.bind(&mut backend, &mut a).unwrap();
        let b = pool.bind(&mut backend, &mut b).unwrap();
        assert_ne!(a.handle, b.handle);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_shared_view_cannot_be_uploaded() {
        let mut backend = HeadlessBackend::default();
        let mut pool = BufferPool::new();
        let mut view = Attribute::shared("interleaved", crate::backend::DataType::F32, 3);
        assert!(pool.ensure(&mut backend, &mut view).is_err());
        assert_eq!(pool.shared_buffer("interleaved"), None);

        let mut owner = Attribute::new(vec![0.0f32; 12], 3).with_buffer_name("interleaved");
        let binding = pool.ensure(&mut backend, &mut owner).unwrap();
        assert_eq!(pool.shared_buffer("interleaved"), Some(binding.handle));
    }

    #[test]
    fn test_release_destroys_buffer() {
        let mut backend = HeadlessBackend::default();
        let mut pool = BufferPool::new();
        let mut attribute = Attribute::new(vec![0u16; 3], 1);
        pool.bind(&mut backend, &mut attribute).unwrap();

        assert!(pool.release(&mut backend, attribute.id()));
        assert!(!pool.release(&mut backend, attribute.id()));
        assert_eq!(backend.live_buffers(), 0);
        assert!(pool.is_empty());
    }
}
