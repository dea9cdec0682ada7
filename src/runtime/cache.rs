//! Memoized shader modules and pipelines.
//!
//! Modules are keyed by their exact source text, pipelines by structural
//! equality of the descriptor. Entries live as long as the cache.

use std::collections::HashMap;

use tracing::debug;

use super::device::{ComputePipelineDesc, Device, RenderPipelineDesc, Shared};
use super::RuntimeError;
use crate::compile::fingerprint;

/// Hit and miss counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

pub struct PipelineCache<D: Device> {
    modules: HashMap<String, Shared<D::ShaderModule>>,
    compute: HashMap<ComputePipelineDesc<D::ShaderModule>, Shared<D::ComputePipeline>>,
    render: HashMap<RenderPipelineDesc<D::ShaderModule>, Shared<D::RenderPipeline>>,
    stats: CacheStats,
}

impl<D: Device> Default for PipelineCache<D> {
    fn default() -> Self {
        Self {
            modules: HashMap::new(),
            compute: HashMap::new(),
            render: HashMap::new(),
            stats: CacheStats::default(),
        }
    }
}

impl<D: Device> PipelineCache<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.modules.len() + self.compute.len() + self.render.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_or_create_shader_module(
        &mut self,
        device: &D,
        code: &str,
    ) -> Result<Shared<D::ShaderModule>, RuntimeError> {
        if let Some(module) = self.modules.get(code) {
            self.stats.hits += 1;
            debug!("shader module cache hit");
            return Ok(module.clone());
        }
        let label = format!("tessera_{}", fingerprint(code));
        let module = Shared::new(device.create_shader_module(&label, code)?);
        self.stats.misses += 1;
        debug!("compiled shader module {}", label);
        self.modules.insert(code.to_string(), module.clone());
        Ok(module)
    }

    pub fn get_or_create_compute_pipeline(
        &mut self,
        device: &D,
        desc: &ComputePipelineDesc<D::ShaderModule>,
    ) -> Result<Shared<D::ComputePipeline>, RuntimeError> {
        if let Some(pipeline) = self.compute.get(desc) {
            self.stats.hits += 1;
            return Ok(pipeline.clone());
        }
        let pipeline = Shared::new(device.create_compute_pipeline(desc)?);
        self.stats.misses += 1;
        debug!(
            "created compute pipeline {}",
            desc.label.as_deref().unwrap_or("<unlabeled>")
        );
        self.compute.insert(desc.clone(), pipeline.clone());
        Ok(pipeline)
    }

    pub fn get_or_create_render_pipeline(
        &mut self,
        device: &D,
        desc: &RenderPipelineDesc<D::ShaderModule>,
    ) -> Result<Shared<D::RenderPipeline>, RuntimeError> {
        if let Some(pipeline) = self.render.get(desc) {
            self.stats.hits += 1;
            return Ok(pipeline.clone());
        }
        let pipeline = Shared::new(device.create_render_pipeline(desc)?);
        self.stats.misses += 1;
        debug!(
            "created render pipeline {}",
            desc.label.as_deref().unwrap_or("<unlabeled>")
        );
        self.render.insert(desc.clone(), pipeline.clone());
        Ok(pipeline)
    }
}
