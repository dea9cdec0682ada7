//! Kernel execution.
//!
//! A [`Runtime`] owns one [`Device`] together with the resources kernels
//! touch: field buffers, textures, the pipeline cache and per-usage buffer
//! pools. Compiling a kernel through the runtime also creates its pipelines;
//! launching encodes every task, in order, into one submission and returns a
//! [`Launch`] future that resolves to the kernel's return value.
//!
//! The runtime is single-threaded. Interior state sits behind `RefCell`, so
//! launches borrow the runtime immutably and several may be in flight.

pub mod cache;
pub mod device;
pub mod headless;
pub mod pool;
pub mod wgpu_device;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use thiserror::Error;
use tracing::debug;

use crate::compile::{compile_kernel_with_templates, template_key, CompiledKernel};
use crate::config::Config;
use crate::error::CompileError;
use crate::ir::Literal;
use crate::reflect::ResourceKind;
use crate::scope::{
    FieldId, FieldInfo, ManifestError, ResourceRegistry, Scope, TexelFormat, TextureId,
    TextureInfo, Value,
};
use crate::types::{Prim, Type};

pub use cache::{CacheStats, PipelineCache};
pub use device::{Binding, Command, ComputePipelineDesc, Device, RenderPipelineDesc, Shared};
pub use headless::HeadlessDevice;
pub use pool::{BufferPool, PooledBuffer};
pub use wgpu_device::WgpuDevice;

// ─── Errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no GPU adapter available")]
    NoAdapter,
    #[error("device request failed: {0}")]
    Device(String),
    #[error("shader module `{label}` rejected: {message}")]
    Shader { label: String, message: String },
    #[error("pipeline `{label}` rejected: {message}")]
    Pipeline { label: String, message: String },
    #[error("submission failed: {0}")]
    Submit(String),
    #[error("readback failed: {0}")]
    Readback(String),
    #[error("the device dropped a pending launch")]
    Cancelled,
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("kernel `{kernel}` takes {expected} argument(s), got {found}")]
    ArgumentCount {
        kernel: String,
        expected: usize,
        found: usize,
    },
    #[error("argument `{name}` expects {expected}, got {found}")]
    ArgumentType {
        name: String,
        expected: Type,
        found: String,
    },
    #[error("unknown resource `{0}`")]
    UnknownResource(String),
    #[error("`{name}` holds {expected} bytes, got {found}")]
    SizeMismatch {
        name: String,
        expected: u64,
        found: u64,
    },
    #[error("`{name}`: {message}")]
    InvalidShape { name: String, message: String },
}

// ─── Resources ─────────────────────────────────────────────────────

const FIELD_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);
const ARGS_USAGE: wgpu::BufferUsages =
    wgpu::BufferUsages::STORAGE.union(wgpu::BufferUsages::COPY_DST);
const RETS_USAGE: wgpu::BufferUsages =
    wgpu::BufferUsages::STORAGE.union(wgpu::BufferUsages::COPY_SRC);
const STAGING_USAGE: wgpu::BufferUsages =
    wgpu::BufferUsages::MAP_READ.union(wgpu::BufferUsages::COPY_DST);

struct FieldStorage<D: Device> {
    info: Arc<FieldInfo>,
    buffer: Shared<D::Buffer>,
}

struct TextureStorage<D: Device> {
    info: Arc<TextureInfo>,
    texture: Shared<D::Texture>,
    sampler: Shared<D::Sampler>,
}

/// An owned handle to something a dispatch binds.
enum Resource<D: Device> {
    Buffer(Shared<D::Buffer>),
    Texture(Shared<D::Texture>),
    Sampler(Shared<D::Sampler>),
}

impl<D: Device> Resource<D> {
    fn binding(&self) -> Binding<'_, D> {
        match self {
            Resource::Buffer(b) => Binding::Buffer(&**b),
            Resource::Texture(t) => Binding::Texture(&**t),
            Resource::Sampler(s) => Binding::Sampler(&**s),
        }
    }
}

/// Encode `value` as the raw word of a `prim` component.
fn fill_word(value: f64, prim: Prim) -> u32 {
    let lit = match prim {
        Prim::F32 => Literal::F32(value as f32),
        Prim::I32 => Literal::I32(value as i32),
        Prim::U32 => Literal::U32(value as u32),
    };
    lit.to_bits()
}

// ─── Kernels ───────────────────────────────────────────────────────

/// A compiled kernel with its pipelines, ready to launch.
pub struct Kernel<D: Device> {
    pub compiled: CompiledKernel,
    pipelines: Vec<Shared<D::ComputePipeline>>,
}

impl<D: Device> Kernel<D> {
    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    pub fn pipelines(&self) -> &[Shared<D::ComputePipeline>] {
        &self.pipelines
    }
}

/// A kernel with `template` parameters, instantiated once per distinct
/// binding of those parameters.
pub struct TemplateKernel<D: Device> {
    scope: Scope,
    source: String,
    instances: RefCell<HashMap<String, Rc<Kernel<D>>>>,
}

impl<D: Device> TemplateKernel<D> {
    pub fn instance_count(&self) -> usize {
        self.instances.borrow().len()
    }
}

// ─── Runtime ───────────────────────────────────────────────────────

pub struct Runtime<D: Device> {
    device: D,
    config: Config,
    cache: RefCell<PipelineCache<D>>,
    pools: RefCell<HashMap<wgpu::BufferUsages, BufferPool<D>>>,
    fields: RefCell<Vec<FieldStorage<D>>>,
    textures: RefCell<Vec<TextureStorage<D>>>,
    launches: Cell<u32>,
}

impl Runtime<WgpuDevice> {
    /// A runtime on the preferred hardware adapter.
    pub fn gpu(config: Config) -> Result<Self, RuntimeError> {
        let device = WgpuDevice::new(config.runtime.power_preference)?;
        Ok(Self::new(device, config))
    }
}

impl Runtime<HeadlessDevice> {
    pub fn headless(config: Config) -> Self {
        Self::new(HeadlessDevice::new(), config)
    }
}

impl<D: Device> Runtime<D> {
    pub fn new(device: D, config: Config) -> Self {
        Self {
            device,
            config,
            cache: RefCell::new(PipelineCache::new()),
            pools: RefCell::new(HashMap::new()),
            fields: RefCell::new(Vec::new()),
            textures: RefCell::new(Vec::new()),
            launches: Cell::new(0),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }

    /// Device allocations made by the pool for `usage`.
    pub fn pool_allocations(&self, usage: wgpu::BufferUsages) -> usize {
        self.pools
            .borrow()
            .get(&usage)
            .map_or(0, |pool| pool.allocations())
    }

    pub fn get_buffer(&self, usage: wgpu::BufferUsages, size: u64) -> PooledBuffer<D::Buffer> {
        self.pools
            .borrow_mut()
            .entry(usage)
            .or_insert_with(|| BufferPool::new(usage))
            .get_buffer(&self.device, size)
    }

    pub fn return_buffer(&self, usage: wgpu::BufferUsages, buffer: PooledBuffer<D::Buffer>) {
        self.pools
            .borrow_mut()
            .entry(usage)
            .or_insert_with(|| BufferPool::new(usage))
            .return_buffer(buffer);
    }

    // ─── Fields and textures ───────────────────────────────────────

    /// Allocate a zeroed field.
    pub fn field(
        &self,
        name: &str,
        shape: &[usize],
        elem: Type,
    ) -> Result<Arc<FieldInfo>, RuntimeError> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(RuntimeError::InvalidShape {
                name: name.to_string(),
                message: "shape must be non-empty with positive extents".to_string(),
            });
        }
        let mut fields = self.fields.borrow_mut();
        let info = Arc::new(FieldInfo {
            id: FieldId(fields.len() as u32),
            name: name.to_string(),
            shape: shape.to_vec(),
            elem,
        });
        let buffer = self
            .device
            .create_buffer(&info.name, info.size_bytes(), FIELD_USAGE);
        debug!("field `{}` {:?}: {} bytes", info.name, info.shape, info.size_bytes());
        fields.push(FieldStorage {
            info: info.clone(),
            buffer: Shared::new(buffer),
        });
        Ok(info)
    }

    pub fn texture(
        &self,
        name: &str,
        dims: &[u32],
        format: TexelFormat,
        storage: bool,
    ) -> Result<Arc<TextureInfo>, RuntimeError> {
        if !(2..=3).contains(&dims.len()) || dims.contains(&0) {
            return Err(RuntimeError::InvalidShape {
                name: name.to_string(),
                message: format!("textures have 2 or 3 positive dimensions, got {:?}", dims),
            });
        }
        let mut textures = self.textures.borrow_mut();
        let info = Arc::new(TextureInfo {
            id: TextureId(textures.len() as u32),
            name: name.to_string(),
            dims: dims.to_vec(),
            format,
            storage,
        });
        let texture = self.device.create_texture(&info);
        let sampler = self.device.create_sampler(&info.name);
        textures.push(TextureStorage {
            info: info.clone(),
            texture: Shared::new(texture),
            sampler: Shared::new(sampler),
        });
        Ok(info)
    }

    fn field_buffer(&self, field: &FieldInfo) -> Result<Shared<D::Buffer>, RuntimeError> {
        self.fields
            .borrow()
            .get(field.id.0 as usize)
            .filter(|s| *s.info == *field)
            .map(|s| s.buffer.clone())
            .ok_or_else(|| RuntimeError::UnknownResource(field.name.clone()))
    }

    fn texture_storage(&self, id: TextureId) -> Option<(Shared<D::Texture>, Shared<D::Sampler>)> {
        self.textures
            .borrow()
            .get(id.0 as usize)
            .filter(|s| s.info.id == id)
            .map(|s| (s.texture.clone(), s.sampler.clone()))
    }

    /// Upload host data covering the whole field.
    pub fn write_field<T: bytemuck::Pod>(
        &self,
        field: &FieldInfo,
        data: &[T],
    ) -> Result<(), RuntimeError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 != field.size_bytes() {
            return Err(RuntimeError::SizeMismatch {
                name: field.name.clone(),
                expected: field.size_bytes(),
                found: bytes.len() as u64,
            });
        }
        let buffer = self.field_buffer(field)?;
        self.device.write_buffer(&*buffer, 0, bytes);
        Ok(())
    }

    /// Set every component of a field to `value`, converted per component type.
    pub fn fill_field(&self, field: &FieldInfo, value: f64) -> Result<(), RuntimeError> {
        let words: Vec<u32> = field
            .elem
            .component_prims()
            .into_iter()
            .map(|prim| fill_word(value, prim))
            .collect();
        let data: Vec<u32> = words.iter().copied().cycle().take(field.words()).collect();
        self.write_field(field, &data)
    }

    /// Copy a field back to the host, waiting for queued work to finish.
    pub fn read_field<T: bytemuck::Pod>(&self, field: &FieldInfo) -> Result<Vec<T>, RuntimeError> {
        let buffer = self.field_buffer(field)?;
        let size = field.size_bytes();
        let width = std::mem::size_of::<T>() as u64;
        if width == 0 || size % width != 0 {
            return Err(RuntimeError::SizeMismatch {
                name: field.name.clone(),
                expected: size,
                found: width,
            });
        }
        let staging = self.get_buffer(STAGING_USAGE, size);
        let done = self.device.submit(&[Command::CopyBuffer {
            src: &*buffer,
            dst: &*staging.buffer,
            size,
        }]);
        let result = self
            .wait_completion(done)
            .and_then(|()| self.device.read_buffer(&*staging.buffer, size));
        self.return_buffer(STAGING_USAGE, staging);
        Ok(result?
            .chunks_exact(width as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    fn wait_completion(&self, mut done: device::Completion) -> Result<(), RuntimeError> {
        self.device.poll(true);
        loop {
            match done.try_recv() {
                Ok(result) => return result,
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => self.device.poll(true),
                Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                    return Err(RuntimeError::Cancelled)
                }
            }
        }
    }

    // ─── Kernels ───────────────────────────────────────────────────

    /// Compile a kernel and create its pipelines.
    pub fn kernel(&self, scope: &Scope, source: &str) -> Result<Kernel<D>, RuntimeError> {
        self.build_kernel(scope, source, &HashMap::new())
    }

    /// A kernel with `template` parameters, compiled lazily per binding.
    pub fn template_kernel(&self, scope: &Scope, source: &str) -> TemplateKernel<D> {
        TemplateKernel {
            scope: scope.clone(),
            source: source.to_string(),
            instances: RefCell::new(HashMap::new()),
        }
    }

    /// The instance of `kernel` for `templates`, compiling it on first use.
    pub fn instantiate(
        &self,
        kernel: &TemplateKernel<D>,
        templates: &HashMap<String, Value>,
    ) -> Result<Rc<Kernel<D>>, RuntimeError> {
        let key = template_key(templates);
        if let Some(instance) = kernel.instances.borrow().get(&key) {
            return Ok(instance.clone());
        }
        let instance = Rc::new(self.build_kernel(&kernel.scope, &kernel.source, templates)?);
        debug!("instantiated `{}` for template key {}", instance.name(), key);
        kernel.instances.borrow_mut().insert(key, instance.clone());
        Ok(instance)
    }

    fn build_kernel(
        &self,
        scope: &Scope,
        source: &str,
        templates: &HashMap<String, Value>,
    ) -> Result<Kernel<D>, RuntimeError> {
        let compiled =
            compile_kernel_with_templates(scope, source, templates, &self.config.compiler)?;
        let mut cache = self.cache.borrow_mut();
        let pipelines = compiled
            .tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                let module = cache.get_or_create_shader_module(&self.device, &task.wgsl)?;
                let desc = ComputePipelineDesc {
                    label: Some(format!("{}_{}_{}", compiled.name, i, task.fingerprint)),
                    module,
                    entry_point: task.reflection.entry_point.clone(),
                };
                cache.get_or_create_compute_pipeline(&self.device, &desc)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Kernel {
            compiled,
            pipelines,
        })
    }

    // ─── Launch ────────────────────────────────────────────────────

    fn encode_args(&self, kernel: &CompiledKernel, args: &[Value]) -> Result<Vec<u32>, RuntimeError> {
        let params = kernel.params();
        if params.len() != args.len() {
            return Err(RuntimeError::ArgumentCount {
                kernel: kernel.name.clone(),
                expected: params.len(),
                found: args.len(),
            });
        }
        let mut words = Vec::with_capacity(kernel.arg_words() as usize);
        for (param, arg) in params.iter().zip(args) {
            let components: Vec<Literal> = match arg {
                Value::Number(lit) => vec![*lit],
                Value::NumberArray { values, .. } => values.clone(),
                other => {
                    return Err(RuntimeError::ArgumentType {
                        name: param.name.clone(),
                        expected: param.ty.clone(),
                        found: other.to_string(),
                    })
                }
            };
            let prims = param.ty.component_prims();
            if components.len() != prims.len() {
                return Err(RuntimeError::ArgumentType {
                    name: param.name.clone(),
                    expected: param.ty.clone(),
                    found: arg.to_string(),
                });
            }
            words.extend(
                components
                    .iter()
                    .zip(prims)
                    .map(|(lit, prim)| lit.cast(prim).to_bits()),
            );
        }
        if kernel.ir.uses_random() {
            words.push(self.launch_seed());
        }
        Ok(words)
    }

    fn launch_seed(&self) -> u32 {
        let n = self.launches.get();
        match self.config.runtime.seed {
            Some(seed) => seed.wrapping_add(n),
            None => {
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos());
                let digest = blake3::hash(&(nanos ^ n as u128).to_le_bytes());
                let bytes = digest.as_bytes();
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
        }
    }

    fn resource(
        &self,
        kind: ResourceKind,
        buffers: &LaunchBuffers<D::Buffer>,
        kernel: &CompiledKernel,
    ) -> Result<Resource<D>, RuntimeError> {
        let missing = |what: &str| RuntimeError::UnknownResource(what.to_string());
        Ok(match kind {
            ResourceKind::Field(id) => {
                let info = kernel
                    .fields()
                    .iter()
                    .find(|f| f.id == id)
                    .ok_or_else(|| missing(&format!("field #{}", id.0)))?;
                Resource::Buffer(self.field_buffer(info)?)
            }
            ResourceKind::Args => {
                Resource::Buffer(buffers.args.as_ref().ok_or_else(|| missing("args"))?.buffer.clone())
            }
            ResourceKind::Rets => {
                Resource::Buffer(buffers.rets.as_ref().ok_or_else(|| missing("rets"))?.buffer.clone())
            }
            ResourceKind::GlobalTmps => Resource::Buffer(
                buffers
                    .tmps
                    .as_ref()
                    .ok_or_else(|| missing("global_tmps"))?
                    .buffer
                    .clone(),
            ),
            ResourceKind::Texture(id) | ResourceKind::StorageTexture(id) => {
                let (texture, _) = self
                    .texture_storage(id)
                    .ok_or_else(|| missing(&format!("texture #{}", id.0)))?;
                Resource::Texture(texture)
            }
            ResourceKind::Sampler(id) => {
                let (_, sampler) = self
                    .texture_storage(id)
                    .ok_or_else(|| missing(&format!("sampler #{}", id.0)))?;
                Resource::Sampler(sampler)
            }
        })
    }

    /// Encode every task of `kernel` into one submission.
    pub fn launch<'r>(
        &'r self,
        kernel: &Kernel<D>,
        args: &[Value],
    ) -> Result<Launch<'r, D>, RuntimeError> {
        let compiled = &kernel.compiled;
        let words = self.encode_args(compiled, args)?;
        self.launches.set(self.launches.get().wrapping_add(1));

        let mut buffers = LaunchBuffers::default();
        if !words.is_empty() {
            let args = self.get_buffer(ARGS_USAGE, words.len() as u64 * 4);
            self.device
                .write_buffer(&*args.buffer, 0, bytemuck::cast_slice(&words));
            buffers.args = Some(args);
        }
        let ret_bytes = compiled.ret_words() as u64 * 4;
        if ret_bytes > 0 {
            buffers.rets = Some(self.get_buffer(RETS_USAGE, ret_bytes));
            buffers.staging = Some(self.get_buffer(STAGING_USAGE, ret_bytes));
        }
        let tmps_words = compiled.tmps_words() as usize;
        if tmps_words > 0 {
            let tmps = self.get_buffer(ARGS_USAGE, tmps_words as u64 * 4);
            self.device
                .write_buffer(&*tmps.buffer, 0, bytemuck::cast_slice(&vec![0u32; tmps_words]));
            buffers.tmps = Some(tmps);
        }

        let prepared = self.bind_tasks(kernel, &buffers);
        let done = match prepared {
            Ok(resources) => {
                let mut commands: Vec<Command<'_, D>> = compiled
                    .tasks
                    .iter()
                    .zip(&kernel.pipelines)
                    .zip(&resources)
                    .map(|((task, pipeline), bound)| Command::Dispatch {
                        label: format!("{}_{}", compiled.name, task.fingerprint),
                        pipeline: &**pipeline,
                        bindings: bound.iter().map(Resource::binding).collect(),
                        workgroups: [task.workgroups, 1, 1],
                    })
                    .collect();
                if let (Some(rets), Some(staging)) = (&buffers.rets, &buffers.staging) {
                    commands.push(Command::CopyBuffer {
                        src: &*rets.buffer,
                        dst: &*staging.buffer,
                        size: ret_bytes,
                    });
                }
                self.device.submit(&commands)
            }
            Err(err) => {
                self.release(&mut buffers);
                return Err(err);
            }
        };
        debug!(
            "launched `{}`: {} dispatch(es)",
            compiled.name,
            compiled.tasks.len()
        );

        Ok(Launch {
            runtime: self,
            done,
            ret: compiled.ret().cloned(),
            ret_bytes,
            buffers,
        })
    }

    fn bind_tasks(
        &self,
        kernel: &Kernel<D>,
        buffers: &LaunchBuffers<D::Buffer>,
    ) -> Result<Vec<Vec<Resource<D>>>, RuntimeError> {
        kernel
            .compiled
            .tasks
            .iter()
            .map(|task| {
                task.bindings
                    .iter()
                    .map(|b| self.resource(b.kind, buffers, &kernel.compiled))
                    .collect()
            })
            .collect()
    }

    fn release(&self, buffers: &mut LaunchBuffers<D::Buffer>) {
        for (usage, buffer) in [
            (ARGS_USAGE, buffers.args.take()),
            (RETS_USAGE, buffers.rets.take()),
            (STAGING_USAGE, buffers.staging.take()),
            (ARGS_USAGE, buffers.tmps.take()),
        ] {
            if let Some(buffer) = buffer {
                self.return_buffer(usage, buffer);
            }
        }
    }
}

impl<D: Device> ResourceRegistry for Runtime<D> {
    fn register_field(
        &mut self,
        name: &str,
        shape: &[usize],
        elem: Type,
        init: Option<f64>,
    ) -> Result<Arc<FieldInfo>, ManifestError> {
        let err = |e: RuntimeError| ManifestError::Resource {
            name: name.to_string(),
            message: e.to_string(),
        };
        let info = self.field(name, shape, elem).map_err(err)?;
        if let Some(value) = init {
            self.fill_field(&info, value).map_err(err)?;
        }
        Ok(info)
    }

    fn register_texture(
        &mut self,
        name: &str,
        dims: &[u32],
        format: TexelFormat,
        storage: bool,
    ) -> Result<Arc<TextureInfo>, ManifestError> {
        self.texture(name, dims, format, storage)
            .map_err(|e| ManifestError::Resource {
                name: name.to_string(),
                message: e.to_string(),
            })
    }
}

// ─── Launch ────────────────────────────────────────────────────────

struct LaunchBuffers<B> {
    args: Option<PooledBuffer<B>>,
    rets: Option<PooledBuffer<B>>,
    staging: Option<PooledBuffer<B>>,
    tmps: Option<PooledBuffer<B>>,
}

impl<B> Default for LaunchBuffers<B> {
    fn default() -> Self {
        Self {
            args: None,
            rets: None,
            staging: None,
            tmps: None,
        }
    }
}

/// A submitted kernel. Resolves to the return value's components, empty for
/// kernels without `return`. Dropping it abandons the wait, not the work: its
/// buffers go back to the pool at once and may back the next submission,
/// which the queue orders after this one.
pub struct Launch<'r, D: Device> {
    runtime: &'r Runtime<D>,
    done: device::Completion,
    ret: Option<Type>,
    ret_bytes: u64,
    buffers: LaunchBuffers<D::Buffer>,
}

impl<D: Device> Launch<'_, D> {
    /// Block the calling thread until the launch resolves.
    pub fn wait(self) -> Result<Vec<Literal>, RuntimeError> {
        self.runtime.device.poll(true);
        pollster::block_on(self)
    }

    fn finish(&mut self) -> Result<Vec<Literal>, RuntimeError> {
        let (Some(ty), Some(staging)) = (&self.ret, &self.buffers.staging) else {
            return Ok(Vec::new());
        };
        let bytes = self
            .runtime
            .device
            .read_buffer(&*staging.buffer, self.ret_bytes)?;
        Ok(bytes
            .chunks_exact(4)
            .zip(ty.component_prims())
            .map(|(word, prim)| {
                Literal::from_bits(u32::from_le_bytes([word[0], word[1], word[2], word[3]]), prim)
            })
            .collect())
    }
}

impl<D: Device> Future for Launch<'_, D> {
    type Output = Result<Vec<Literal>, RuntimeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.runtime.device.poll(false);
        match Pin::new(&mut this.done).poll(cx) {
            Poll::Pending => {
                // Completion callbacks only fire while the device is polled.
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Poll::Ready(Ok(Ok(()))) => Poll::Ready(this.finish()),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(err)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RuntimeError::Cancelled)),
        }
    }
}

impl<D: Device> Drop for Launch<'_, D> {
    fn drop(&mut self) {
        self.runtime.release(&mut self.buffers);
    }
}

#[cfg(test)]
mod tests;
