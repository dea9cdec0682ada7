//! The device boundary.
//!
//! Everything the runtime asks of a GPU goes through [`Device`]: module and
//! pipeline creation, buffers, textures, samplers, and batched submission.
//! [`super::WgpuDevice`] drives real hardware; [`super::HeadlessDevice`]
//! records calls and completes immediately.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::oneshot;

use super::RuntimeError;
use crate::scope::TextureInfo;

// ─── Shared handles ────────────────────────────────────────────────

/// A reference-counted handle compared by identity.
///
/// Caches hand these out so callers can tell whether two lookups produced
/// the same underlying object.
pub struct Shared<T>(Arc<T>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T> Eq for Shared<T> {}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({:#x})", self.addr())
    }
}

// ─── Descriptors ───────────────────────────────────────────────────

/// A compute pipeline: one module, one entry point, auto layout.
pub struct ComputePipelineDesc<M> {
    pub label: Option<String>,
    pub module: Shared<M>,
    pub entry_point: String,
}

impl<M> ComputePipelineDesc<M> {
    fn key(&self) -> (&Option<String>, &Shared<M>, &str) {
        (&self.label, &self.module, &self.entry_point)
    }
}

impl<M> Clone for ComputePipelineDesc<M> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            module: self.module.clone(),
            entry_point: self.entry_point.clone(),
        }
    }
}

impl<M> PartialEq for ComputePipelineDesc<M> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<M> Eq for ComputePipelineDesc<M> {}

impl<M> Hash for ComputePipelineDesc<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub format: wgpu::VertexFormat,
    pub offset: u64,
    pub location: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

/// A render pipeline. Modules compare by identity, everything else by value.
pub struct RenderPipelineDesc<M> {
    pub label: Option<String>,
    pub vertex: Shared<M>,
    pub vertex_entry: String,
    pub vertex_buffers: Vec<VertexLayout>,
    pub fragment: Option<(Shared<M>, String)>,
    pub color_targets: Vec<wgpu::TextureFormat>,
    pub topology: wgpu::PrimitiveTopology,
    pub depth_format: Option<wgpu::TextureFormat>,
}

type RenderKey<'a, M> = (
    &'a Option<String>,
    &'a Shared<M>,
    &'a str,
    &'a [VertexLayout],
    &'a Option<(Shared<M>, String)>,
    &'a [wgpu::TextureFormat],
    wgpu::PrimitiveTopology,
    Option<wgpu::TextureFormat>,
);

impl<M> RenderPipelineDesc<M> {
    fn key(&self) -> RenderKey<'_, M> {
        (
            &self.label,
            &self.vertex,
            &self.vertex_entry,
            &self.vertex_buffers,
            &self.fragment,
            &self.color_targets,
            self.topology,
            self.depth_format,
        )
    }
}

impl<M> Clone for RenderPipelineDesc<M> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            vertex: self.vertex.clone(),
            vertex_entry: self.vertex_entry.clone(),
            vertex_buffers: self.vertex_buffers.clone(),
            fragment: self.fragment.clone(),
            color_targets: self.color_targets.clone(),
            topology: self.topology,
            depth_format: self.depth_format,
        }
    }
}

impl<M> PartialEq for RenderPipelineDesc<M> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<M> Eq for RenderPipelineDesc<M> {}

impl<M> Hash for RenderPipelineDesc<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

// ─── Commands ──────────────────────────────────────────────────────

/// A resource bound at the binding equal to its position.
pub enum Binding<'a, D: Device + ?Sized> {
    Buffer(&'a D::Buffer),
    Texture(&'a D::Texture),
    Sampler(&'a D::Sampler),
}

/// One step of a submission, executed in order.
pub enum Command<'a, D: Device + ?Sized> {
    Dispatch {
        label: String,
        pipeline: &'a D::ComputePipeline,
        bindings: Vec<Binding<'a, D>>,
        workgroups: [u32; 3],
    },
    CopyBuffer {
        src: &'a D::Buffer,
        dst: &'a D::Buffer,
        size: u64,
    },
}

/// Resolves when the device finishes a submission.
pub type Completion = oneshot::Receiver<Result<(), RuntimeError>>;

// ─── Device ────────────────────────────────────────────────────────

pub trait Device {
    type ShaderModule;
    type ComputePipeline;
    type RenderPipeline;
    type Buffer;
    type Texture;
    type Sampler;

    /// Human-readable adapter name.
    fn name(&self) -> String;

    /// Compile WGSL source. Validation failures are errors, not panics.
    fn create_shader_module(&self, label: &str, code: &str)
        -> Result<Self::ShaderModule, RuntimeError>;

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<Self::ShaderModule>,
    ) -> Result<Self::ComputePipeline, RuntimeError>;

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<Self::ShaderModule>,
    ) -> Result<Self::RenderPipeline, RuntimeError>;

    /// A zero-initialised buffer of exactly `size` bytes.
    fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Self::Buffer;

    fn create_texture(&self, info: &TextureInfo) -> Self::Texture;

    /// A linear, clamp-to-edge sampler.
    fn create_sampler(&self, label: &str) -> Self::Sampler;

    /// Queue a host-to-device write, ordered before the next submission.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    /// Encode `commands` into one submission.
    fn submit(&self, commands: &[Command<'_, Self>]) -> Completion;

    /// Block until the first `size` bytes of a `MAP_READ` buffer are readable
    /// and return them.
    fn read_buffer(&self, buffer: &Self::Buffer, size: u64) -> Result<Vec<u8>, RuntimeError>;

    /// Drive completion callbacks; `wait` blocks until the queue is idle.
    fn poll(&self, wait: bool);
}
