// Request protocol data model (§3, §6).
//
// A Request is the source-of-truth IR of the system: client code builds a
// Batch of these against the Object Registry, and the Renderer replays them
// against the Resource Manager / Pipeline Cache / Command Recorder.

use crate::registry::ObjectType;
use serde::{Deserialize, Serialize};

/// Protocol version. Bump on any record layout change (§9 open question).
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create,
    Update,
    Bind,
    Record,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferType {
    Staging,
    Vertex,
    Index,
    Storage,
    Uniform,
    Indirect,
}

/// Which stage a `CreateShader` bytecode module is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// The tagged-union request payload, sized to the largest variant
/// (§3: "content ... sized to the largest payload (≤ 256 bytes)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    CreateCanvas {
        width: u32,
        height: u32,
        clear: [f32; 4],
        flags: u32,
    },
    CreateDat {
        buffer_type: BufferType,
        size: u64,
        flags: u32,
    },
    CreateTex {
        dims: [u32; 3],
        format: u32,
        flags: u32,
    },
    /// Create a `vk::Sampler` for use with a `Tex` (§4.3 "owns GPU
    /// resources ... samplers").
    CreateSampler {
        flags: u32,
    },
    /// Create a `vk::ShaderModule` from precompiled bytecode (§1 Non-goals:
    /// shaders are consumed as precompiled bytecode, never authored here).
    CreateShader {
        stage: ShaderStage,
        bytecode: Vec<u8>,
    },
    /// Create a graphics pipeline. Two requests are "equivalent" (and so
    /// resolve to the same cached pipeline) iff every field here is
    /// bitwise equal modulo canonical ordering of bindings/attributes
    /// (§3 "Graphics Pipeline Descriptor").
    CreateGraphics {
        primitive: u32,
        blend_enabled: bool,
        depth_test_enabled: bool,
        depth_write_enabled: bool,
        polygon_mode: u32,
        cull_mode: u32,
        front_face: u32,
        color_mask: u32,
        vertex_shader_id: u64,
        fragment_shader_id: u64,
        vertex_bindings: Vec<crate::pipeline::VertexBinding>,
        vertex_attributes: Vec<crate::pipeline::VertexAttribute>,
        push_constant_size: u32,
        flags: u32,
    },
    CreateCompute {
        shader_id: u64,
        push_constant_size: u32,
        flags: u32,
    },
    /// Upload bytes into a Dat/Tex. When `owning_copy` is set the Batch
    /// makes its own copy of `data` so the producer may free its buffer
    /// immediately (§4.2 invariants); otherwise the producer must keep
    /// `data` alive until commit.
    Upload {
        offset: u64,
        data: Vec<u8>,
        owning_copy: bool,
    },
    BindVertex {
        graphics_id: u64,
        binding_idx: u32,
        dat_id: u64,
        offset: u64,
    },
    BindIndex {
        graphics_id: u64,
        dat_id: u64,
        offset: u64,
    },
    RecordBegin {
        canvas_id: u64,
    },
    RecordEnd,
    Draw {
        graphics_id: u64,
        first_vertex: u32,
        vertex_count: u32,
        first_instance: u32,
        instance_count: u32,
    },
    DrawIndexed {
        graphics_id: u64,
        first_index: u32,
        index_count: u32,
        vertex_offset: i32,
        first_instance: u32,
        instance_count: u32,
    },
    DrawIndirect {
        graphics_id: u64,
        dat_id: u64,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        graphics_id: u64,
        dat_id: u64,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    /// Set the dynamic viewport/scissor for the remainder of the current
    /// record-phase (§4.5's `viewport` record-phase request).
    Viewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    /// Push-constant update for the currently bound graphics pipeline.
    Push {
        offset: u32,
        data: Vec<u8>,
    },
    Delete,
    /// No payload beyond what's in the fixed header; used by requests that
    /// only need `target_id`/`flags` (e.g. `viewport`, `push`).
    None,
}

/// A single declarative protocol record (§3 "Request").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub version: u32,
    pub action: Action,
    pub object_type: ObjectType,
    /// Subject object ID. 0 for create-new; the Batch fills it with a
    /// freshly generated ID before committing (§4.2).
    pub target_id: u64,
    pub flags: u32,
    pub content: Content,
    pub description: Option<String>,
}

impl Request {
    pub fn new(action: Action, object_type: ObjectType, content: Content) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            action,
            object_type,
            target_id: 0,
            flags: 0,
            content,
            description: None,
        }
    }
}
