//! A device that records calls instead of touching hardware.
//!
//! Buffers are host byte vectors, so writes, copies and reads behave as on a
//! GPU. Dispatches are recorded but not executed; every submission completes
//! immediately.

use std::cell::{Cell, RefCell};

use tokio::sync::oneshot;

use super::device::{
    Binding, Command, Completion, ComputePipelineDesc, Device, RenderPipelineDesc,
};
use super::RuntimeError;
use crate::reflect::{reflect, ShaderReflection, ShaderStage};
use crate::scope::TextureInfo;

pub struct HeadlessModule {
    pub label: String,
    pub reflection: ShaderReflection,
}

pub struct HeadlessPipeline {
    pub label: String,
}

pub struct HeadlessBuffer {
    pub label: String,
    pub usage: wgpu::BufferUsages,
    data: RefCell<Vec<u8>>,
}

impl HeadlessBuffer {
    pub fn size(&self) -> u64 {
        self.data.borrow().len() as u64
    }
}

pub struct HeadlessTexture {
    pub info: TextureInfo,
}

pub struct HeadlessSampler;

/// One recorded dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchRecord {
    pub label: String,
    pub workgroups: [u32; 3],
    pub bindings: usize,
}

/// Creation and submission counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub shader_modules: usize,
    pub compute_pipelines: usize,
    pub render_pipelines: usize,
    pub buffers: usize,
    pub textures: usize,
    pub samplers: usize,
    pub submissions: usize,
    pub bytes_written: u64,
}

#[derive(Default)]
pub struct HeadlessDevice {
    stats: RefCell<HeadlessStats>,
    dispatches: RefCell<Vec<DispatchRecord>>,
    polls: Cell<usize>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> HeadlessStats {
        self.stats.borrow().clone()
    }

    pub fn dispatches(&self) -> Vec<DispatchRecord> {
        self.dispatches.borrow().clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.get()
    }

    fn module_stage(
        module: &HeadlessModule,
        entry: &str,
        stage: ShaderStage,
        label: &str,
    ) -> Result<(), RuntimeError> {
        let reflected = &module.reflection;
        if reflected.entry_point != entry || reflected.stage != stage {
            return Err(RuntimeError::Pipeline {
                label: label.to_string(),
                message: format!(
                    "module `{}` has no {} entry point `{}`",
                    module.label, stage, entry
                ),
            });
        }
        Ok(())
    }
}

impl Device for HeadlessDevice {
    type ShaderModule = HeadlessModule;
    type ComputePipeline = HeadlessPipeline;
    type RenderPipeline = HeadlessPipeline;
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type Sampler = HeadlessSampler;

    fn name(&self) -> String {
        "headless".to_string()
    }

    fn create_shader_module(&self, label: &str, code: &str) -> Result<HeadlessModule, RuntimeError> {
        let reflection = reflect(code).map_err(|e| RuntimeError::Shader {
            label: label.to_string(),
            message: e.to_string(),
        })?;
        self.stats.borrow_mut().shader_modules += 1;
        Ok(HeadlessModule {
            label: label.to_string(),
            reflection,
        })
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<HeadlessModule>,
    ) -> Result<HeadlessPipeline, RuntimeError> {
        let label = desc.label.clone().unwrap_or_default();
        Self::module_stage(&*desc.module, &desc.entry_point, ShaderStage::Compute, &label)?;
        self.stats.borrow_mut().compute_pipelines += 1;
        Ok(HeadlessPipeline { label })
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<HeadlessModule>,
    ) -> Result<HeadlessPipeline, RuntimeError> {
        let label = desc.label.clone().unwrap_or_default();
        Self::module_stage(&*desc.vertex, &desc.vertex_entry, ShaderStage::Vertex, &label)?;
        if let Some((module, entry)) = &desc.fragment {
            Self::module_stage(&**module, entry, ShaderStage::Fragment, &label)?;
        }
        self.stats.borrow_mut().render_pipelines += 1;
        Ok(HeadlessPipeline { label })
    }

    fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> HeadlessBuffer {
        self.stats.borrow_mut().buffers += 1;
        HeadlessBuffer {
            label: label.to_string(),
            usage,
            data: RefCell::new(vec![0; size as usize]),
        }
    }

    fn create_texture(&self, info: &TextureInfo) -> HeadlessTexture {
        self.stats.borrow_mut().textures += 1;
        HeadlessTexture { info: info.clone() }
    }

    fn create_sampler(&self, _label: &str) -> HeadlessSampler {
        self.stats.borrow_mut().samplers += 1;
        HeadlessSampler
    }

    fn write_buffer(&self, buffer: &HeadlessBuffer, offset: u64, data: &[u8]) {
        let mut bytes = buffer.data.borrow_mut();
        let start = (offset as usize).min(bytes.len());
        let end = (start + data.len()).min(bytes.len());
        bytes[start..end].copy_from_slice(&data[..end - start]);
        self.stats.borrow_mut().bytes_written += data.len() as u64;
    }

    fn submit(&self, commands: &[Command<'_, Self>]) -> Completion {
        let (tx, rx) = oneshot::channel();
        for command in commands {
            match command {
                Command::Dispatch {
                    label,
                    bindings,
                    workgroups,
                    ..
                } => {
                    if let Some(invalid) = bindings.iter().find_map(|b| match b {
                        Binding::Buffer(buffer)
                            if !buffer.usage.contains(wgpu::BufferUsages::STORAGE) =>
                        {
                            Some(buffer.label.clone())
                        }
                        _ => None,
                    }) {
                        let _ = tx.send(Err(RuntimeError::Submit(format!(
                            "buffer `{}` bound to `{}` lacks STORAGE usage",
                            invalid, label
                        ))));
                        return rx;
                    }
                    self.dispatches.borrow_mut().push(DispatchRecord {
                        label: label.clone(),
                        workgroups: *workgroups,
                        bindings: bindings.len(),
                    });
                }
                Command::CopyBuffer { src, dst, size } => {
                    let n = *size as usize;
                    let data: Vec<u8> = src.data.borrow().iter().take(n).copied().collect();
                    let mut target = dst.data.borrow_mut();
                    let n = n.min(target.len()).min(data.len());
                    target[..n].copy_from_slice(&data[..n]);
                }
            }
        }
        self.stats.borrow_mut().submissions += 1;
        let _ = tx.send(Ok(()));
        rx
    }

    fn read_buffer(&self, buffer: &HeadlessBuffer, size: u64) -> Result<Vec<u8>, RuntimeError> {
        if !buffer.usage.contains(wgpu::BufferUsages::MAP_READ) {
            return Err(RuntimeError::Readback(format!(
                "buffer `{}` is not mappable",
                buffer.label
            )));
        }
        let data = buffer.data.borrow();
        Ok(data.iter().take(size as usize).copied().collect())
    }

    fn poll(&self, _wait: bool) {
        self.polls.set(self.polls.get() + 1);
    }
}
