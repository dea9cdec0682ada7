//! Recycled device buffers.
//!
//! One pool per usage class. Checkout is first-fit over the free list:
//! the first free buffer whose capacity covers the request wins, otherwise
//! a buffer of exactly the requested size is allocated. Returned buffers go
//! back on the free list unchanged.

use tracing::debug;

use super::device::{Device, Shared};

/// A checked-out buffer. `capacity` is at least the requested size.
pub struct PooledBuffer<B> {
    pub buffer: Shared<B>,
    pub capacity: u64,
}

impl<B> Clone for PooledBuffer<B> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            capacity: self.capacity,
        }
    }
}

pub struct BufferPool<D: Device> {
    usage: wgpu::BufferUsages,
    free: Vec<PooledBuffer<D::Buffer>>,
    allocations: usize,
}

impl<D: Device> BufferPool<D> {
    pub fn new(usage: wgpu::BufferUsages) -> Self {
        Self {
            usage,
            free: Vec::new(),
            allocations: 0,
        }
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    /// Device allocations made by this pool so far.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Zero-sized requests are rounded up to one word.
    pub fn get_buffer(&mut self, device: &D, size: u64) -> PooledBuffer<D::Buffer> {
        let size = size.max(4);
        if let Some(pos) = self.free.iter().position(|b| b.capacity >= size) {
            let buffer = self.free.remove(pos);
            debug!(
                "reusing pooled buffer of {} bytes for {} ({:?})",
                buffer.capacity, size, self.usage
            );
            return buffer;
        }
        self.allocations += 1;
        let label = format!("tessera_pool_{}", self.allocations);
        PooledBuffer {
            buffer: Shared::new(device.create_buffer(&label, size, self.usage)),
            capacity: size,
        }
    }

    pub fn return_buffer(&mut self, buffer: PooledBuffer<D::Buffer>) {
        self.free.push(buffer);
    }
}
