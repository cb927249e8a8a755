// Resource Manager (C3).
//
// Owns the GPU-backed `Dat` (buffer) and `Tex` (image) resources named by
// the Object Registry. Storage is an `ecs::Instance` with one component
// table per resource kind, the same pattern `thundr::renderer::Renderer`
// uses for its `r_image_vk`/`r_image_infos` component tables: a render
// thread can `snapshot()` a component table and iterate a consistent view
// while the resource manager continues mutating the live table.
//
// Per buffer-type sub-allocation is a simple bump allocator with a free
// list: `§4.3` only requires monotonic sub-allocation plus a move-on-resize
// policy, not a general-purpose allocator.

use crate::device::Device;
use crate::error::{DvzError, Result};
use crate::request::BufferType;
use ash::vk;
use ecs as ll;
use std::collections::HashMap;
use std::sync::Arc;
use utils::log;

/// One contiguous sub-allocation inside a backing buffer.
#[derive(Debug, Clone, Copy)]
struct SubAlloc {
    backing_index: usize,
    offset: u64,
    size: u64,
}

/// A backing buffer for one `BufferType`, with a bump offset and a free
/// list of ranges reclaimed by moved/deleted dats.
struct Backing {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    capacity: u64,
    bump_offset: u64,
    free_list: Vec<(u64, u64)>,
}

impl Backing {
    fn alloc(&mut self, size: u64) -> Option<u64> {
        if let Some(pos) = self
            .free_list
            .iter()
            .position(|(_, free_size)| *free_size >= size)
        {
            let (offset, free_size) = self.free_list.remove(pos);
            if free_size > size {
                self.free_list.push((offset + size, free_size - size));
            }
            return Some(offset);
        }
        if self.bump_offset + size <= self.capacity {
            let offset = self.bump_offset;
            self.bump_offset += size;
            return Some(offset);
        }
        None
    }

    fn free(&mut self, offset: u64, size: u64) {
        self.free_list.push((offset, size));
    }
}

/// A memory-backed resource created from a `CreateDat` request (§4.3).
pub struct DatResource {
    pub buffer_type: BufferType,
    alloc: SubAlloc,
}

/// An image-backed resource created from a `CreateTex` request (§4.3).
pub struct TexResource {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub memory: vk::DeviceMemory,
    pub dims: [u32; 3],
    pub format: vk::Format,
}

/// Duplicated OS handle to a region of device memory, returned by
/// `external_dat`/`external_tex` (§4.3 "External memory"). On POSIX this
/// is a `dup`'d file descriptor; callers own the returned fd and must
/// close it themselves.
pub struct ExternalHandle {
    pub fd: std::os::unix::io::RawFd,
    pub offset: u64,
}

/// Owns all live Dat/Tex resources for one `Device`.
pub struct ResourceManager {
    dev: Arc<Device>,
    ecs: ll::Instance,
    dat_entities: HashMap<u64, ll::Entity>,
    tex_entities: HashMap<u64, ll::Entity>,
    dats: ll::Component<DatResource>,
    texs: ll::Component<TexResource>,
    backings: HashMap<BufferType, Backing>,
    shaders: HashMap<u64, vk::ShaderModule>,
    samplers: HashMap<u64, vk::Sampler>,
}

const DEFAULT_BACKING_SIZE: u64 = 4 * 1024 * 1024;

impl ResourceManager {
    pub fn new(dev: Arc<Device>) -> Self {
        let mut ecs = ll::Instance::new();
        let dats = ecs.add_component::<DatResource>();
        let texs = ecs.add_component::<TexResource>();
        Self {
            dev,
            ecs,
            dat_entities: HashMap::new(),
            tex_entities: HashMap::new(),
            dats,
            texs,
            backings: HashMap::new(),
            shaders: HashMap::new(),
            samplers: HashMap::new(),
        }
    }

    fn backing_for(&mut self, ty: BufferType, min_size: u64) -> Result<&mut Backing> {
        if !self.backings.contains_key(&ty) {
            let cap = min_size.max(DEFAULT_BACKING_SIZE);
            let (buffer, memory) = self.dev.create_buffer_with_size(
                buffer_usage_for(ty),
                vk::SharingMode::EXCLUSIVE,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                cap,
            );
            self.backings.insert(
                ty,
                Backing {
                    buffer,
                    memory,
                    capacity: cap,
                    bump_offset: 0,
                    free_list: Vec::new(),
                },
            );
        }
        Ok(self.backings.get_mut(&ty).unwrap())
    }

    /// Create a new Dat backed by a sub-allocation in the buffer-type's
    /// shared backing buffer, growing (or adding) a backing as needed.
    pub fn create_dat(&mut self, id: u64, buffer_type: BufferType, size: u64) -> Result<()> {
        let backing_index = 0; // single backing per type for now (§4.3 allows >= 1)
        let offset = {
            let backing = self.backing_for(buffer_type, size)?;
            backing.alloc(size).ok_or_else(|| {
                DvzError::ResourceCreation(format!(
                    "no space for a {}-byte dat of type {:?}",
                    size, buffer_type
                ))
            })?
        };

        let entity = self.ecs.add_entity();
        self.dats.set(
            &entity,
            DatResource {
                buffer_type,
                alloc: SubAlloc {
                    backing_index,
                    offset,
                    size,
                },
            },
        );
        self.dat_entities.insert(id, entity);
        Ok(())
    }

    /// Write `data` into a dat at `offset`. Host-visible dats (the only
    /// kind created today) are updated with a direct map/copy/unmap.
    pub fn upload_dat(&mut self, id: u64, offset: u64, data: &[u8]) -> Result<()> {
        let entity = self
            .dat_entities
            .get(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown dat id {:#x}", id)))?;
        let dat = self
            .dats
            .get(entity)
            .ok_or_else(|| DvzError::InvariantViolation(format!("dat id {:#x} has no backing", id)))?;

        if offset + data.len() as u64 > dat.alloc.size {
            return Err(DvzError::InvariantViolation(format!(
                "upload of {} bytes at offset {} exceeds dat size {}",
                data.len(),
                offset,
                dat.alloc.size
            )));
        }

        let backing = self
            .backings
            .get(&dat.buffer_type)
            .expect("dat references a buffer type with no backing");
        self.dev
            .update_memory(backing.memory, (dat.alloc.offset + offset) as isize, data);
        Ok(())
    }

    /// Create a new 2D Tex and upload its initial contents via the
    /// device's transfer path (§4.3 "Uploads").
    pub fn create_tex(&mut self, id: u64, dims: [u32; 3], format: vk::Format) -> Result<()> {
        let resolution = vk::Extent2D {
            width: dims[0],
            height: dims[1],
        };
        let (image, view, memory) = self.dev.create_image(
            &resolution,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::ImageTiling::OPTIMAL,
        );

        let entity = self.ecs.add_entity();
        self.texs.set(
            &entity,
            TexResource {
                image,
                view,
                memory,
                dims,
                format,
            },
        );
        self.tex_entities.insert(id, entity);
        Ok(())
    }

    /// Upload raw pixel data into an existing Tex (§4.3's staging-dat +
    /// image-copy + layout-transition path, done for us by `Device`).
    pub fn upload_tex(&mut self, id: u64, data: &[u8], stride: u32) -> Result<()> {
        let entity = self
            .tex_entities
            .get(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown tex id {:#x}", id)))?;
        let tex = self
            .texs
            .get(entity)
            .ok_or_else(|| DvzError::InvariantViolation(format!("tex id {:#x} has no image", id)))?;

        self.dev
            .update_image_from_data(tex.image, data, tex.dims[0], tex.dims[1], stride)
    }

    /// The `vk::Buffer` backing `dat`, plus its byte offset inside it, for
    /// use in a `vkCmdBindVertexBuffers`/`vkCmdBindIndexBuffer` call.
    pub fn dat_buffer(&self, id: u64) -> Result<(vk::Buffer, u64)> {
        let entity = self
            .dat_entities
            .get(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown dat id {:#x}", id)))?;
        let dat = self
            .dats
            .get(entity)
            .ok_or_else(|| DvzError::InvariantViolation(format!("dat id {:#x} has no backing", id)))?;
        let backing = self
            .backings
            .get(&dat.buffer_type)
            .expect("dat references a buffer type with no backing");
        Ok((backing.buffer, dat.alloc.offset))
    }

    /// Return a duplicated OS file descriptor for the backing memory of
    /// `dat`, plus its byte offset, per §4.3's "External memory". The
    /// caller owns the returned fd.
    pub fn external_dat(&self, id: u64) -> Result<ExternalHandle> {
        let entity = self
            .dat_entities
            .get(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown dat id {:#x}", id)))?;
        let dat = self
            .dats
            .get(entity)
            .ok_or_else(|| DvzError::InvariantViolation(format!("dat id {:#x} has no backing", id)))?;
        let backing = self
            .backings
            .get(&dat.buffer_type)
            .expect("dat references a buffer type with no backing");

        let fd = self.dev.export_memory_fd(backing.memory)?;
        Ok(ExternalHandle {
            fd,
            offset: dat.alloc.offset,
        })
    }

    /// Remove a Dat, freeing its sub-allocation back to the backing
    /// buffer's free list. Actual destruction of GPU resources is left to
    /// the caller's deletion queue; this only reclaims allocator space.
    pub fn delete_dat(&mut self, id: u64) -> Result<()> {
        let entity = self
            .dat_entities
            .remove(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown dat id {:#x}", id)))?;
        if let Some(dat) = self.dats.take(&entity) {
            if let Some(backing) = self.backings.get_mut(&dat.buffer_type) {
                backing.free(dat.alloc.offset, dat.alloc.size);
            }
        } else {
            log::warn!("delete_dat: id {:#x} had an entity but no component", id);
        }
        Ok(())
    }

    pub fn delete_tex(&mut self, id: u64) -> Result<()> {
        let entity = self
            .tex_entities
            .remove(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown tex id {:#x}", id)))?;
        self.texs.take(&entity);
        Ok(())
    }

    /// Return a duplicated OS file descriptor for `tex`'s backing memory,
    /// mirroring `external_dat` for image-backed resources (§4.3 "External
    /// memory").
    pub fn external_tex(&self, id: u64) -> Result<ExternalHandle> {
        let entity = self
            .tex_entities
            .get(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown tex id {:#x}", id)))?;
        let tex = self
            .texs
            .get(entity)
            .ok_or_else(|| DvzError::InvariantViolation(format!("tex id {:#x} has no image", id)))?;

        let fd = self.dev.export_memory_fd(tex.memory)?;
        Ok(ExternalHandle { fd, offset: 0 })
    }

    /// Compile a `CreateShader` request's bytecode into a `vk::ShaderModule`
    /// and register it under `id`.
    pub fn create_shader(&mut self, id: u64, bytecode: &[u8]) -> Result<()> {
        let module = self.dev.create_shader_module(bytecode)?;
        self.shaders.insert(id, module);
        Ok(())
    }

    pub fn shader(&self, id: u64) -> Result<vk::ShaderModule> {
        self.shaders
            .get(&id)
            .copied()
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown shader id {:#x}", id)))
    }

    pub fn delete_shader(&mut self, id: u64) -> Result<()> {
        let module = self
            .shaders
            .remove(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown shader id {:#x}", id)))?;
        unsafe { self.dev.destroy_shader_module(module) };
        Ok(())
    }

    /// Create a `vk::Sampler` for a `CreateSampler` request (§4.3). The
    /// sampler is a standalone registry object, bound to a Tex by its
    /// consumer (e.g. a descriptor set write) rather than owned by one.
    pub fn create_sampler(&mut self, id: u64) -> Result<()> {
        let sampler = self.dev.create_sampler();
        self.samplers.insert(id, sampler);
        Ok(())
    }

    pub fn sampler(&self, id: u64) -> Result<vk::Sampler> {
        self.samplers
            .get(&id)
            .copied()
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown sampler id {:#x}", id)))
    }

    pub fn delete_sampler(&mut self, id: u64) -> Result<()> {
        let sampler = self
            .samplers
            .remove(&id)
            .ok_or_else(|| DvzError::InvariantViolation(format!("unknown sampler id {:#x}", id)))?;
        unsafe { self.dev.destroy_sampler(sampler) };
        Ok(())
    }
}

fn buffer_usage_for(ty: BufferType) -> vk::BufferUsageFlags {
    match ty {
        BufferType::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        BufferType::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        BufferType::Index => vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        BufferType::Storage => vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        BufferType::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        BufferType::Indirect => vk::BufferUsageFlags::INDIRECT_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backing_alloc_reuses_freed_ranges_before_bumping() {
        let mut backing = Backing {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            capacity: 1024,
            bump_offset: 0,
            free_list: Vec::new(),
        };

        let a = backing.alloc(100).unwrap();
        assert_eq!(a, 0);
        backing.free(a, 100);
        let b = backing.alloc(50).unwrap();
        // Reused from the free list rather than bumping past it.
        assert_eq!(b, 0);
        assert_eq!(backing.bump_offset, 100);
    }

    #[test]
    fn backing_alloc_fails_past_capacity() {
        let mut backing = Backing {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            capacity: 64,
            bump_offset: 0,
            free_list: Vec::new(),
        };
        assert!(backing.alloc(64).is_some());
        assert!(backing.alloc(1).is_none());
    }
}
