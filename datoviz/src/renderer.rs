// Renderer facade: ties the Object Registry (C1), Request Batch (C2),
// Resource Manager (C3), Pipeline Cache (C4), Command Recorder (C5) and
// Canvas/Frame Loop (C6) together behind `commit` (§2 "Flow").
//
// Austin Shafer - 2024

use crate::backend::{Backend, HeadlessBackend};
use crate::batch::Batch;
use crate::canvas::Canvas;
use crate::config::{CanvasConfig, ColorFormat, Host, RendererConfig};
use crate::device::Device;
use crate::error::{DvzError, Result};
use crate::instance::Instance;
use crate::pipeline::{ComputeDescriptor, GraphicsDescriptor, PipelineCache};
use crate::recorder::CommandRecorder;
use crate::registry::{ObjectType, Registry};
use crate::request::{Action, Content, Request};
use crate::resources::ResourceManager;
use ash::vk;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use utils::log;

/// A built graphics pipeline plus the vertex/index bindings most recently
/// attached to it (§3 "bind" requests precede the draws that use them).
struct GraphicsEntry {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    vertex_bindings: HashMap<u32, (u64, u64)>,
    index_binding: Option<(u64, u64)>,
}

struct ComputeEntry {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

/// Everything `commit` and a canvas's draw callback both need concurrent
/// access to. Guarded by one mutex, the same "externally synchronized
/// state behind a lock" idiom `Device::d_internal` uses, since object
/// creation/deletion is rare relative to per-frame drawing (§4.1).
struct RendererState {
    resources: ResourceManager,
    pipelines: PipelineCache,
    graphics: HashMap<u64, GraphicsEntry>,
    computes: HashMap<u64, ComputeEntry>,
    pipeline_layouts: HashMap<u32, vk::PipelineLayout>,
}

impl RendererState {
    fn layout_for(&mut self, dev: &Device, push_constant_size: u32) -> Result<vk::PipelineLayout> {
        if let Some(layout) = self.pipeline_layouts.get(&push_constant_size) {
            return Ok(*layout);
        }
        let layout = dev.create_pipeline_layout(push_constant_size)?;
        self.pipeline_layouts.insert(push_constant_size, layout);
        Ok(layout)
    }
}

/// The record-phase requests queued for a canvas between one `frame()`
/// and the next; drained by that canvas's draw callback.
struct CanvasContext {
    pending: Arc<Mutex<Vec<Request>>>,
}

/// The central facade client code drives: create a Renderer, build
/// Batches against its registry, `commit` them, drive each Canvas's frame
/// loop (§2 "Flow").
pub struct Renderer {
    dev: Arc<Device>,
    #[allow(dead_code)]
    instance: Arc<Instance>,
    registry: Arc<Registry<()>>,
    state: Arc<Mutex<RendererState>>,
    canvases: HashMap<u64, Canvas>,
    contexts: HashMap<u64, CanvasContext>,
    /// The canvas a `record-begin` most recently queued for, so later
    /// record-phase requests in the same batch (which don't repeat the
    /// canvas id) know where to go.
    last_record_canvas: Option<u64>,
    host: Host,
    color_format: vk::Format,
    dump_log: Vec<Request>,
}

impl Renderer {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let instance = Arc::new(Instance::new(config));
        let dev = Arc::new(Device::new(instance.clone(), config)?);
        let color_format = match config.color_format {
            ColorFormat::Rgba8 => vk::Format::B8G8R8A8_UNORM,
            ColorFormat::Rgba32F => vk::Format::R32G32B32A32_SFLOAT,
        };

        Ok(Self {
            registry: Arc::new(Registry::new()),
            state: Arc::new(Mutex::new(RendererState {
                resources: ResourceManager::new(dev.clone()),
                pipelines: PipelineCache::new(),
                graphics: HashMap::new(),
                computes: HashMap::new(),
                pipeline_layouts: HashMap::new(),
            })),
            canvases: HashMap::new(),
            contexts: HashMap::new(),
            last_record_canvas: None,
            host: Host::new(),
            color_format,
            dump_log: Vec::new(),
            dev,
            instance,
        })
    }

    /// The Object Registry client code should build its Batches against,
    /// so that IDs the client allocates are the same ones `commit` later
    /// recognizes (§4.2).
    pub fn registry(&self) -> Arc<Registry<()>> {
        self.registry.clone()
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn canvas_mut(&mut self, id: u64) -> Option<&mut Canvas> {
        self.canvases.get_mut(&id)
    }

    /// Apply every request in `batch`, in order. The first fatal error
    /// stops processing the remaining requests but leaves the Renderer
    /// itself usable for the next `commit` (§7 "Propagation policy").
    pub fn commit(&mut self, batch: &Batch) -> Result<()> {
        for req in batch.requests() {
            if let Err(e) = self.apply(req) {
                (self.host.error_callback)(&e);
                return Err(e);
            }
            if self.host.config.dump_on_shutdown {
                self.dump_log.push(req.clone());
            }
        }
        Ok(())
    }

    fn apply(&mut self, req: &Request) -> Result<()> {
        match (req.action, req.object_type, &req.content) {
            (Action::Create, ObjectType::Canvas, Content::CreateCanvas { width, height, clear, .. }) => {
                self.create_canvas(req.target_id, *width, *height, *clear)
            }
            (Action::Create, ObjectType::Dat, Content::CreateDat { buffer_type, size, .. }) => {
                let mut state = self.state.lock().unwrap();
                state.resources.create_dat(req.target_id, *buffer_type, *size)?;
                self.registry.register(req.target_id, ObjectType::Dat, ());
                Ok(())
            }
            (Action::Create, ObjectType::Tex, Content::CreateTex { dims, format, .. }) => {
                let mut state = self.state.lock().unwrap();
                state
                    .resources
                    .create_tex(req.target_id, *dims, vk::Format::from_raw(*format as i32))?;
                self.registry.register(req.target_id, ObjectType::Tex, ());
                Ok(())
            }
            (Action::Create, ObjectType::Sampler, Content::CreateSampler { .. }) => {
                let mut state = self.state.lock().unwrap();
                state.resources.create_sampler(req.target_id)?;
                self.registry.register(req.target_id, ObjectType::Sampler, ());
                Ok(())
            }
            (Action::Create, ObjectType::Shader, Content::CreateShader { bytecode, .. }) => {
                let mut state = self.state.lock().unwrap();
                state.resources.create_shader(req.target_id, bytecode)?;
                self.registry.register(req.target_id, ObjectType::Shader, ());
                Ok(())
            }
            (Action::Create, ObjectType::Graphics, Content::CreateGraphics { .. }) => {
                self.create_graphics(req.target_id, &req.content)
            }
            (Action::Create, ObjectType::Compute, Content::CreateCompute { shader_id, push_constant_size, .. }) => {
                self.create_compute(req.target_id, *shader_id, *push_constant_size)
            }
            (Action::Update, ObjectType::Dat, Content::Upload { offset, data, .. }) => {
                let mut state = self.state.lock().unwrap();
                state.resources.upload_dat(req.target_id, *offset, data)
            }
            (Action::Update, ObjectType::Tex, Content::Upload { data, .. }) => {
                let mut state = self.state.lock().unwrap();
                let stride = 0; // tightly packed; §4.3 leaves row stride to the caller when zero
                state.resources.upload_tex(req.target_id, data, stride)
            }
            (Action::Bind, ObjectType::Graphics, Content::BindVertex { graphics_id, binding_idx, dat_id, offset }) => {
                let mut state = self.state.lock().unwrap();
                let entry = state.graphics.get_mut(graphics_id).ok_or_else(|| {
                    DvzError::InvariantViolation(format!("unknown graphics id {:#x}", graphics_id))
                })?;
                entry.vertex_bindings.insert(*binding_idx, (*dat_id, *offset));
                Ok(())
            }
            (Action::Bind, ObjectType::Graphics, Content::BindIndex { graphics_id, dat_id, offset }) => {
                let mut state = self.state.lock().unwrap();
                let entry = state.graphics.get_mut(graphics_id).ok_or_else(|| {
                    DvzError::InvariantViolation(format!("unknown graphics id {:#x}", graphics_id))
                })?;
                entry.index_binding = Some((*dat_id, *offset));
                Ok(())
            }
            (Action::Record, ObjectType::Canvas, Content::RecordBegin { canvas_id }) => {
                self.queue_record(*canvas_id, req.clone())
            }
            (Action::Record, _, _) => {
                // Every other record-phase request (viewport/draw/push/
                // record-end) is addressed to whichever canvas is
                // currently accumulating a record-phase, so it rides
                // along with the most recently queued `record-begin`.
                self.queue_record_to_last_canvas(req.clone())
            }
            (Action::Delete, ObjectType::Canvas, _) => {
                self.delete_canvas(req.target_id)
            }
            (Action::Delete, ObjectType::Dat, _) => {
                let mut state = self.state.lock().unwrap();
                state.resources.delete_dat(req.target_id)?;
                self.registry.release(req.target_id);
                Ok(())
            }
            (Action::Delete, ObjectType::Tex, _) => {
                let mut state = self.state.lock().unwrap();
                state.resources.delete_tex(req.target_id)?;
                self.registry.release(req.target_id);
                Ok(())
            }
            (Action::Delete, ObjectType::Sampler, _) => {
                let mut state = self.state.lock().unwrap();
                state.resources.delete_sampler(req.target_id)?;
                self.registry.release(req.target_id);
                Ok(())
            }
            (Action::Delete, ObjectType::Shader, _) => {
                let mut state = self.state.lock().unwrap();
                state.resources.delete_shader(req.target_id)?;
                self.registry.release(req.target_id);
                Ok(())
            }
            (Action::Delete, ObjectType::Graphics, _) => {
                let mut state = self.state.lock().unwrap();
                if let Some(entry) = state.graphics.remove(&req.target_id) {
                    let point = self.dev.current_timeline_point();
                    self.dev.schedule_drop_at_point(Box::new(PipelineDrop {
                        dev: self.dev.clone(),
                        pipeline: entry.pipeline,
                    }), point);
                }
                self.registry.release(req.target_id);
                Ok(())
            }
            (Action::Delete, ObjectType::Compute, _) => {
                let mut state = self.state.lock().unwrap();
                if let Some(entry) = state.computes.remove(&req.target_id) {
                    let point = self.dev.current_timeline_point();
                    self.dev.schedule_drop_at_point(Box::new(PipelineDrop {
                        dev: self.dev.clone(),
                        pipeline: entry.pipeline,
                    }), point);
                }
                self.registry.release(req.target_id);
                Ok(())
            }
            (action, object_type, content) => Err(DvzError::InvariantViolation(format!(
                "request {:?}/{:?} with content {:?} is not a recognized combination",
                action, object_type, content
            ))),
        }
    }

    fn create_canvas(&mut self, id: u64, width: u32, height: u32, clear: [f32; 4]) -> Result<()> {
        let backend: Box<dyn Backend> = Box::new(HeadlessBackend::new(self.dev.clone()));
        let config = CanvasConfig::builder().size(width, height).build();
        self.create_canvas_with_backend(id, backend, config, clear)
    }

    /// Create a canvas over a caller-supplied backend (e.g. a windowed one
    /// behind the `sdl` feature), bypassing the default headless backend
    /// `commit`'s `create canvas` path uses.
    pub fn create_canvas_with_backend(
        &mut self,
        id: u64,
        mut backend: Box<dyn Backend>,
        config: CanvasConfig,
        clear: [f32; 4],
    ) -> Result<()> {
        let family = backend.probe()?;
        let queue = self.dev.get_queue(family);
        let canvas = Canvas::create(self.dev.clone(), backend, queue, config)?;

        let pending: Arc<Mutex<Vec<Request>>> = Arc::new(Mutex::new(Vec::new()));
        self.contexts.insert(id, CanvasContext { pending: pending.clone() });
        self.canvases.insert(id, canvas);
        self.registry.register(id, ObjectType::Canvas, ());

        let state = self.state.clone();
        let dev = self.dev.clone();
        let canvas_clear = clear;
        let draw_callback = Box::new(move |_dev: &Device, recorder: &mut CommandRecorder, frame: &crate::frame::Frame| {
            let requests = std::mem::take(&mut *pending.lock().unwrap());
            if requests.is_empty() {
                return;
            }
            if let Err(e) = replay_record_phase(&dev, &state, recorder, frame, canvas_clear, &requests) {
                log::error!("record-phase replay failed: {}", e);
            }
        });
        self.canvases.get_mut(&id).unwrap().set_draw_callback(draw_callback);
        Ok(())
    }

    fn delete_canvas(&mut self, id: u64) -> Result<()> {
        let canvas = self
            .canvases
            .remove(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown canvas id {:#x}", id)))?;
        self.contexts.remove(&id);
        canvas.destroy();
        self.registry.release(id);
        Ok(())
    }

    fn queue_record(&mut self, canvas_id: u64, req: Request) -> Result<()> {
        let ctx = self.contexts.get(&canvas_id).ok_or_else(|| {
            DvzError::InvariantViolation(format!("record-begin for unknown canvas {:#x}", canvas_id))
        })?;
        ctx.pending.lock().unwrap().push(req);
        self.last_record_canvas = Some(canvas_id);
        Ok(())
    }

    fn queue_record_to_last_canvas(&mut self, req: Request) -> Result<()> {
        let canvas_id = self.last_record_canvas.ok_or_else(|| {
            DvzError::InvariantViolation("record-phase request with no preceding record-begin".to_string())
        })?;
        let ctx = self.contexts.get(&canvas_id).unwrap();
        ctx.pending.lock().unwrap().push(req);
        Ok(())
    }

    fn create_graphics(&mut self, id: u64, content: &Content) -> Result<()> {
        let desc = graphics_descriptor(content, id)?;
        let mut state = self.state.lock().unwrap();

        let vs = state.resources.shader(desc.vertex_shader_id)?;
        let fs = state.resources.shader(desc.fragment_shader_id)?;
        let layout = state.layout_for(&self.dev, desc.push_constant_size)?;
        let color_format = self.color_format;
        let dev = self.dev.clone();

        let pipeline = state
            .pipelines
            .get_or_build_graphics(&desc, |d| dev.create_graphics_pipeline(d, vs, fs, color_format, layout))?;

        state.graphics.insert(id, GraphicsEntry {
            pipeline,
            layout,
            vertex_bindings: HashMap::new(),
            index_binding: None,
        });
        drop(state);
        self.registry.register(id, ObjectType::Graphics, ());
        Ok(())
    }

    fn create_compute(&mut self, id: u64, shader_id: u64, push_constant_size: u32) -> Result<()> {
        let desc = ComputeDescriptor {
            shader_id,
            push_constant_size,
            description: format!("compute {:#x}", id),
        };
        let mut state = self.state.lock().unwrap();
        let module = state.resources.shader(shader_id)?;
        let layout = state.layout_for(&self.dev, push_constant_size)?;
        let dev = self.dev.clone();

        let pipeline = state
            .pipelines
            .get_or_build_compute(&desc, |d| dev.create_compute_pipeline(d, module, layout))?;

        state.computes.insert(id, ComputeEntry { pipeline, layout });
        drop(state);
        self.registry.register(id, ObjectType::Compute, ());
        Ok(())
    }

    /// Write the committed request stream to `requests.dvz` (`DVZ_DUMP=1`,
    /// §6). Intended to be called once, at shutdown.
    pub fn dump_if_configured(&self) -> Result<()> {
        if !self.host.config.dump_on_shutdown {
            return Ok(());
        }
        let registry: Registry<()> = Registry::new();
        let mut dump = Batch::new();
        for req in &self.dump_log {
            dump.add(&registry, req.clone());
        }
        dump.dump("requests.dvz")
    }
}

fn graphics_descriptor(content: &Content, id: u64) -> Result<GraphicsDescriptor> {
    match content {
        Content::CreateGraphics {
            primitive,
            blend_enabled,
            depth_test_enabled,
            depth_write_enabled,
            polygon_mode,
            cull_mode,
            front_face,
            color_mask,
            vertex_shader_id,
            fragment_shader_id,
            vertex_bindings,
            vertex_attributes,
            push_constant_size,
            ..
        } => Ok(GraphicsDescriptor {
            primitive: *primitive,
            blend_enabled: *blend_enabled,
            depth_test_enabled: *depth_test_enabled,
            depth_write_enabled: *depth_write_enabled,
            polygon_mode: *polygon_mode,
            cull_mode: *cull_mode,
            front_face: *front_face,
            color_mask: *color_mask,
            vertex_shader_id: *vertex_shader_id,
            fragment_shader_id: *fragment_shader_id,
            vertex_bindings: vertex_bindings.clone(),
            vertex_attributes: vertex_attributes.clone(),
            push_constant_size: *push_constant_size,
            description: format!("graphics {:#x}", id),
        }),
        other => Err(DvzError::InvariantViolation(format!(
            "expected CreateGraphics content, got {:?}",
            other
        ))),
    }
}

/// Replay one canvas's queued record-phase requests against the command
/// buffer the Canvas just handed us for this frame (§4.5).
fn replay_record_phase(
    dev: &Arc<Device>,
    state: &Arc<Mutex<RendererState>>,
    recorder: &mut CommandRecorder,
    frame: &crate::frame::Frame,
    clear: [f32; 4],
    requests: &[Request],
) -> Result<()> {
    for req in requests {
        match &req.content {
            Content::RecordBegin { .. } => {
                recorder.record_begin(
                    &dev.dev,
                    req.target_id,
                    frame.command_buffer,
                    frame.image_view,
                    frame.extent,
                    clear,
                )?;
            }
            Content::RecordEnd => {
                recorder.record_end(&dev.dev)?;
            }
            Content::Draw { graphics_id, .. } | Content::DrawIndexed { graphics_id, .. } => {
                bind_graphics_if_new(dev, state, recorder, *graphics_id)?;
                recorder.record(&dev.dev, &req.content)?;
            }
            Content::DrawIndirect { graphics_id, dat_id, offset, draw_count, stride } => {
                bind_graphics_if_new(dev, state, recorder, *graphics_id)?;
                let (buffer, base_offset) = {
                    let state = state.lock().unwrap();
                    state.resources.dat_buffer(*dat_id)?
                };
                recorder.draw_indirect(
                    &dev.dev,
                    *graphics_id,
                    buffer,
                    base_offset + offset,
                    *draw_count,
                    *stride,
                );
            }
            Content::DrawIndexedIndirect { graphics_id, dat_id, offset, draw_count, stride } => {
                bind_graphics_if_new(dev, state, recorder, *graphics_id)?;
                let (buffer, base_offset) = {
                    let state = state.lock().unwrap();
                    state.resources.dat_buffer(*dat_id)?
                };
                recorder.draw_indexed_indirect(
                    &dev.dev,
                    *graphics_id,
                    buffer,
                    base_offset + offset,
                    *draw_count,
                    *stride,
                );
            }
            Content::Push { offset, data } => {
                push_constants(dev, state, recorder, *offset, data)?;
            }
            other => {
                recorder.record(&dev.dev, other)?;
            }
        }
    }
    Ok(())
}

fn bind_graphics_if_new(
    dev: &Arc<Device>,
    state: &Arc<Mutex<RendererState>>,
    recorder: &mut CommandRecorder,
    graphics_id: u64,
) -> Result<()> {
    if recorder.bound_graphics() == Some(graphics_id) {
        return Ok(());
    }
    let cbuf = match recorder.current_command_buffer() {
        Some(cbuf) => cbuf,
        None => return Ok(()),
    };
    let state = state.lock().unwrap();
    let entry = state
        .graphics
        .get(&graphics_id)
        .ok_or_else(|| DvzError::InvariantViolation(format!("unknown graphics id {:#x}", graphics_id)))?;

    let mut bindings: Vec<_> = entry.vertex_bindings.iter().collect();
    bindings.sort_by_key(|(binding, _)| **binding);
    let buffers_and_offsets: Vec<(vk::Buffer, u64)> = bindings
        .iter()
        .map(|(_, (dat_id, extra_offset))| {
            let (buffer, base_offset) = state.resources.dat_buffer(*dat_id)?;
            Ok((buffer, base_offset + extra_offset))
        })
        .collect::<Result<_>>()?;

    unsafe {
        dev.dev.cmd_bind_pipeline(cbuf, vk::PipelineBindPoint::GRAPHICS, entry.pipeline);
        if !buffers_and_offsets.is_empty() {
            let buffers: Vec<vk::Buffer> = buffers_and_offsets.iter().map(|(b, _)| *b).collect();
            let offsets: Vec<vk::DeviceSize> = buffers_and_offsets.iter().map(|(_, o)| *o).collect();
            dev.dev.cmd_bind_vertex_buffers(cbuf, 0, &buffers, &offsets);
        }
        if let Some((dat_id, extra_offset)) = entry.index_binding {
            let (buffer, base_offset) = state.resources.dat_buffer(dat_id)?;
            dev.dev
                .cmd_bind_index_buffer(cbuf, buffer, base_offset + extra_offset, vk::IndexType::UINT32);
        }
    }
    Ok(())
}

/// Push constants against the pipeline layout of whichever graphics
/// pipeline is currently bound, resolving the layout the Command Recorder
/// itself has no way to look up (§4.5 "push").
fn push_constants(
    dev: &Arc<Device>,
    state: &Arc<Mutex<RendererState>>,
    recorder: &CommandRecorder,
    offset: u32,
    data: &[u8],
) -> Result<()> {
    let cbuf = match recorder.current_command_buffer() {
        Some(cbuf) => cbuf,
        None => return Ok(()),
    };
    let graphics_id = match recorder.bound_graphics() {
        Some(id) => id,
        None => {
            log::warn!("push constant update with no bound graphics pipeline");
            return Ok(());
        }
    };
    let state = state.lock().unwrap();
    let entry = state
        .graphics
        .get(&graphics_id)
        .ok_or_else(|| DvzError::InvariantViolation(format!("unknown graphics id {:#x}", graphics_id)))?;
    unsafe {
        dev.dev
            .cmd_push_constants(cbuf, entry.layout, vk::ShaderStageFlags::ALL, offset, data);
    }
    Ok(())
}

/// Deferred pipeline destruction, scheduled via the Device's timeline
/// deletion queue so an in-flight frame never has its bound pipeline
/// destroyed out from under it (§4.4).
struct PipelineDrop {
    dev: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Drop for PipelineDrop {
    fn drop(&mut self) {
        unsafe { self.dev.destroy_pipeline(self.pipeline) };
    }
}
