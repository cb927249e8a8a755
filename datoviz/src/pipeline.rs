// Pipeline Cache (C4): builds and caches `vk::Pipeline`s keyed by a
// canonical fingerprint of their descriptor, guaranteeing at most one
// concurrent build per fingerprint (§4.4).
//
// Austin Shafer - 2024

use crate::error::{DvzError, Result};
use ash::vk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// A vertex input binding, sorted by `binding` before fingerprinting
/// (§4.4 "sorted vertex bindings by index").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: u32,
}

/// A vertex input attribute, sorted by `(binding, location)` before
/// fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: u32,
    pub offset: u32,
}

/// Everything needed to build (or look up) one graphics pipeline
/// (§3 "Graphics Pipeline Descriptor").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphicsDescriptor {
    pub primitive: u32,
    pub blend_enabled: bool,
    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,
    pub polygon_mode: u32,
    pub cull_mode: u32,
    pub front_face: u32,
    pub color_mask: u32,
    pub vertex_shader_id: u64,
    pub fragment_shader_id: u64,
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub push_constant_size: u32,
    pub description: String,
}

impl GraphicsDescriptor {
    /// Canonicalize (sort bindings/attributes) and produce a stable
    /// fingerprint (§4.4 "stable byte-serialization ... canonical shader
    /// IDs, fixed-endian integers").
    fn fingerprint(&self) -> Fingerprint {
        let mut bindings = self.vertex_bindings.clone();
        bindings.sort_by_key(|b| b.binding);
        let mut attributes = self.vertex_attributes.clone();
        attributes.sort_by_key(|a| (a.binding, a.location));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.primitive.to_le_bytes());
        bytes.push(self.blend_enabled as u8);
        bytes.push(self.depth_test_enabled as u8);
        bytes.push(self.depth_write_enabled as u8);
        bytes.extend_from_slice(&self.polygon_mode.to_le_bytes());
        bytes.extend_from_slice(&self.cull_mode.to_le_bytes());
        bytes.extend_from_slice(&self.front_face.to_le_bytes());
        bytes.extend_from_slice(&self.color_mask.to_le_bytes());
        bytes.extend_from_slice(&self.vertex_shader_id.to_le_bytes());
        bytes.extend_from_slice(&self.fragment_shader_id.to_le_bytes());
        for b in &bindings {
            bytes.extend_from_slice(&b.binding.to_le_bytes());
            bytes.extend_from_slice(&b.stride.to_le_bytes());
            bytes.extend_from_slice(&b.input_rate.to_le_bytes());
        }
        for a in &attributes {
            bytes.extend_from_slice(&a.location.to_le_bytes());
            bytes.extend_from_slice(&a.binding.to_le_bytes());
            bytes.extend_from_slice(&a.format.to_le_bytes());
            bytes.extend_from_slice(&a.offset.to_le_bytes());
        }
        bytes.extend_from_slice(&self.push_constant_size.to_le_bytes());

        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Fingerprint {
            hash: hasher.finish(),
            bytes,
        }
    }
}

/// Descriptor for a compute pipeline, mirroring the graphics descriptor
/// but with only a single shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub struct ComputeDescriptor {
    pub shader_id: u64,
    pub push_constant_size: u32,
    pub description: String,
}

impl ComputeDescriptor {
    fn fingerprint(&self) -> Fingerprint {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.shader_id.to_le_bytes());
        bytes.extend_from_slice(&self.push_constant_size.to_le_bytes());

        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Fingerprint {
            hash: hasher.finish(),
            bytes,
        }
    }
}

/// A fingerprint is compared by hash with full-value disambiguation on
/// collision (§4.4), so we keep the canonical bytes alongside the hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    hash: u64,
    bytes: Vec<u8>,
}

enum Slot {
    /// A build is in progress; concurrent requesters must wait rather
    /// than start a second build for the same fingerprint.
    Building,
    Ready(vk::Pipeline),
}

/// Builds and caches graphics/compute pipelines keyed by `Fingerprint`.
pub struct PipelineCache {
    graphics: Mutex<HashMap<u64, Vec<(Fingerprint, Slot)>>>,
    compute: Mutex<HashMap<u64, Vec<(Fingerprint, Slot)>>>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self {
            graphics: Mutex::new(HashMap::new()),
            compute: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached pipeline for `desc`, building it with `build` if
    /// this is the first request for its fingerprint. `build` is only
    /// invoked while holding the cache's lock, which is what gives us
    /// "at-most-one concurrent build per fingerprint" (§4.4) without a
    /// separate per-fingerprint lock table.
    pub fn get_or_build_graphics(
        &self,
        desc: &GraphicsDescriptor,
        build: impl FnOnce(&GraphicsDescriptor) -> Result<vk::Pipeline>,
    ) -> Result<vk::Pipeline> {
        let fp = desc.fingerprint();
        let mut table = self.graphics.lock().unwrap();
        let bucket = table.entry(fp.hash).or_insert_with(Vec::new);

        if let Some((_, slot)) = bucket.iter().find(|(existing, _)| *existing == fp) {
            if let Slot::Ready(pipeline) = slot {
                return Ok(*pipeline);
            }
        }

        bucket.push((fp.clone(), Slot::Building));
        let result = build(desc);
        let bucket = table.get_mut(&fp.hash).unwrap();
        let idx = bucket.iter().position(|(existing, _)| *existing == fp).unwrap();

        match result {
            Ok(pipeline) => {
                bucket[idx].1 = Slot::Ready(pipeline);
                Ok(pipeline)
            }
            Err(e) => {
                bucket.remove(idx);
                Err(DvzError::ResourceCreation(format!(
                    "pipeline build failed for \"{}\": {}",
                    desc.description, e
                )))
            }
        }
    }

    pub fn get_or_build_compute(
        &self,
        desc: &ComputeDescriptor,
        build: impl FnOnce(&ComputeDescriptor) -> Result<vk::Pipeline>,
    ) -> Result<vk::Pipeline> {
        let fp = desc.fingerprint();
        let mut table = self.compute.lock().unwrap();
        let bucket = table.entry(fp.hash).or_insert_with(Vec::new);

        if let Some((_, slot)) = bucket.iter().find(|(existing, _)| *existing == fp) {
            if let Slot::Ready(pipeline) = slot {
                return Ok(*pipeline);
            }
        }

        bucket.push((fp.clone(), Slot::Building));
        let result = build(desc);
        let bucket = table.get_mut(&fp.hash).unwrap();
        let idx = bucket.iter().position(|(existing, _)| *existing == fp).unwrap();

        match result {
            Ok(pipeline) => {
                bucket[idx].1 = Slot::Ready(pipeline);
                Ok(pipeline)
            }
            Err(e) => {
                bucket.remove(idx);
                Err(DvzError::ResourceCreation(format!(
                    "pipeline build failed for \"{}\": {}",
                    desc.description, e
                )))
            }
        }
    }

    pub fn graphics_cache_len(&self) -> usize {
        self.graphics.lock().unwrap().values().map(|v| v.len()).sum()
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(vs: u64) -> GraphicsDescriptor {
        GraphicsDescriptor {
            primitive: 0,
            blend_enabled: false,
            depth_test_enabled: true,
            depth_write_enabled: true,
            polygon_mode: 0,
            cull_mode: 0,
            front_face: 0,
            color_mask: 0xf,
            vertex_shader_id: vs,
            fragment_shader_id: 1,
            vertex_bindings: vec![
                VertexBinding { binding: 1, stride: 12, input_rate: 0 },
                VertexBinding { binding: 0, stride: 8, input_rate: 0 },
            ],
            vertex_attributes: vec![
                VertexAttribute { location: 1, binding: 0, format: 0, offset: 8 },
                VertexAttribute { location: 0, binding: 0, format: 0, offset: 0 },
            ],
            push_constant_size: 64,
            description: "test pipeline".to_string(),
        }
    }

    #[test]
    fn binding_order_does_not_affect_fingerprint() {
        let mut a = descriptor(1);
        let mut b = a.clone();
        b.vertex_bindings.reverse();
        b.vertex_attributes.reverse();
        assert_eq!(a.fingerprint(), b.fingerprint());
        a.vertex_shader_id = 2;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn second_lookup_reuses_the_cached_pipeline_without_rebuilding() {
        let cache = PipelineCache::new();
        let desc = descriptor(1);
        let mut builds = 0;

        let p1 = cache
            .get_or_build_graphics(&desc, |_| {
                builds += 1;
                Ok(vk::Pipeline::from_raw(42))
            })
            .unwrap();
        let p2 = cache
            .get_or_build_graphics(&desc, |_| {
                builds += 1;
                Ok(vk::Pipeline::from_raw(99))
            })
            .unwrap();

        assert_eq!(p1, p2);
        assert_eq!(builds, 1);
    }

    #[test]
    fn failed_build_is_not_cached_and_can_be_retried() {
        let cache = PipelineCache::new();
        let desc = descriptor(1);

        let err = cache.get_or_build_graphics(&desc, |_| {
            Err(DvzError::ResourceCreation("shader link failed".to_string()))
        });
        assert!(err.is_err());

        let ok = cache
            .get_or_build_graphics(&desc, |_| Ok(vk::Pipeline::from_raw(7)))
            .unwrap();
        assert_eq!(ok, vk::Pipeline::from_raw(7));
    }
}
