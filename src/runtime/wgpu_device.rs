//! Hardware device backed by wgpu.

use tokio::sync::oneshot;
use tracing::{debug, info};

use super::device::{
    Binding, Command, Completion, ComputePipelineDesc, Device, RenderPipelineDesc,
};
use super::RuntimeError;
use crate::config::PowerPreference;
use crate::scope::{TexelFormat, TextureInfo};

pub struct WgpuDevice {
    adapter: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

pub struct WgpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

fn texture_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TexelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TexelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TexelFormat::R32Float => wgpu::TextureFormat::R32Float,
    }
}

impl WgpuDevice {
    /// Request an adapter and device. Fails when no adapter is available.
    pub fn new(power: PowerPreference) -> Result<Self, RuntimeError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power.to_wgpu(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(RuntimeError::NoAdapter)?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("tessera"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| RuntimeError::Device(e.to_string()))?;
        let adapter = adapter.get_info();
        info!("using adapter {} ({:?})", adapter.name, adapter.backend);
        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    /// Run `f` inside a validation error scope.
    fn validated<T>(&self, f: impl FnOnce() -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }
}

impl Device for WgpuDevice {
    type ShaderModule = wgpu::ShaderModule;
    type ComputePipeline = wgpu::ComputePipeline;
    type RenderPipeline = wgpu::RenderPipeline;
    type Buffer = wgpu::Buffer;
    type Texture = WgpuTexture;
    type Sampler = wgpu::Sampler;

    fn name(&self) -> String {
        self.adapter.name.clone()
    }

    fn create_shader_module(
        &self,
        label: &str,
        code: &str,
    ) -> Result<wgpu::ShaderModule, RuntimeError> {
        self.validated(|| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(code.into()),
                })
        })
        .map_err(|message| RuntimeError::Shader {
            label: label.to_string(),
            message,
        })
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<wgpu::ShaderModule>,
    ) -> Result<wgpu::ComputePipeline, RuntimeError> {
        self.validated(|| {
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: desc.label.as_deref(),
                    layout: None,
                    module: &*desc.module,
                    entry_point: Some(desc.entry_point.as_str()),
                    compilation_options: Default::default(),
                    cache: None,
                })
        })
        .map_err(|message| RuntimeError::Pipeline {
            label: desc.label.clone().unwrap_or_default(),
            message,
        })
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<wgpu::ShaderModule>,
    ) -> Result<wgpu::RenderPipeline, RuntimeError> {
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_buffers
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: a.format,
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_buffers
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();
        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        self.validated(|| {
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: desc.label.as_deref(),
                    layout: None,
                    vertex: wgpu::VertexState {
                        module: &*desc.vertex,
                        entry_point: Some(desc.vertex_entry.as_str()),
                        compilation_options: Default::default(),
                        buffers: &buffers,
                    },
                    fragment: desc.fragment.as_ref().map(|(module, entry)| {
                        wgpu::FragmentState {
                            module: &**module,
                            entry_point: Some(entry.as_str()),
                            compilation_options: Default::default(),
                            targets: &targets,
                        }
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: desc.topology,
                        ..Default::default()
                    },
                    depth_stencil: desc.depth_format.map(|format| wgpu::DepthStencilState {
                        format,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: Default::default(),
                        bias: Default::default(),
                    }),
                    multisample: Default::default(),
                    multiview: None,
                    cache: None,
                })
        })
        .map_err(|message| RuntimeError::Pipeline {
            label: desc.label.clone().unwrap_or_default(),
            message,
        })
    }

    fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    fn create_texture(&self, info: &TextureInfo) -> WgpuTexture {
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if info.storage {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        let dimension = if info.rank() == 3 {
            wgpu::TextureDimension::D3
        } else {
            wgpu::TextureDimension::D2
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(info.name.as_str()),
            size: wgpu::Extent3d {
                width: info.dims.first().copied().unwrap_or(1),
                height: info.dims.get(1).copied().unwrap_or(1),
                depth_or_array_layers: info.dims.get(2).copied().unwrap_or(1),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: texture_format(info.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        WgpuTexture { texture, view }
    }

    fn create_sampler(&self, label: &str) -> wgpu::Sampler {
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        })
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn submit(&self, commands: &[Command<'_, Self>]) -> Completion {
        let (tx, rx) = oneshot::channel();
        let encoded = self.validated(|| {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("tessera_launch"),
                });
            for command in commands {
                match command {
                    Command::Dispatch {
                        label,
                        pipeline,
                        bindings,
                        workgroups,
                    } => {
                        let entries: Vec<wgpu::BindGroupEntry> = bindings
                            .iter()
                            .enumerate()
                            .map(|(i, binding)| wgpu::BindGroupEntry {
                                binding: i as u32,
                                resource: match binding {
                                    Binding::Buffer(buffer) => buffer.as_entire_binding(),
                                    Binding::Texture(texture) => {
                                        wgpu::BindingResource::TextureView(&texture.view)
                                    }
                                    Binding::Sampler(sampler) => {
                                        wgpu::BindingResource::Sampler(*sampler)
                                    }
                                },
                            })
                            .collect();
                        let bind_group = (!entries.is_empty()).then(|| {
                            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                                label: Some(label.as_str()),
                                layout: &pipeline.get_bind_group_layout(0),
                                entries: &entries,
                            })
                        });
                        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                            label: Some(label.as_str()),
                            timestamp_writes: None,
                        });
                        pass.set_pipeline(*pipeline);
                        if let Some(bind_group) = &bind_group {
                            pass.set_bind_group(0, bind_group, &[]);
                        }
                        pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
                    }
                    Command::CopyBuffer { src, dst, size } => {
                        encoder.copy_buffer_to_buffer(*src, 0, *dst, 0, *size);
                    }
                }
            }
            encoder.finish()
        });

        match encoded {
            Ok(command_buffer) => {
                self.queue.submit(std::iter::once(command_buffer));
                self.queue.on_submitted_work_done(move || {
                    let _ = tx.send(Ok(()));
                });
                debug!("submitted {} command(s)", commands.len());
            }
            Err(message) => {
                let _ = tx.send(Err(RuntimeError::Submit(message)));
            }
        }
        rx
    }

    fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<u8>, RuntimeError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let slice = buffer.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| RuntimeError::Readback("map callback dropped".to_string()))?
            .map_err(|e| RuntimeError::Readback(e.to_string()))?;
        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(data)
    }

    fn poll(&self, wait: bool) {
        let maintain = if wait {
            wgpu::Maintain::Wait
        } else {
            wgpu::Maintain::Poll
        };
        self.device.poll(maintain);
    }
}
