// Request Batch (C2): an ordered, serializable sequence of Requests.
//
// Binary dump format (§6): magic "DVZ" (3 bytes) + version: u32 le +
// count: u32 le + `count` records, each record laid out as
// `action: u32, object_type: u32, target_id: u64, flags: u32,
//  content_length: u32, content_bytes…, description_length: u16,
//  description_bytes…`. We get the per-record layout from `bincode`
// (already in the dependency stack) rather than hand-rolling a struct
// packer, but the magic/version/count envelope matches §6 exactly so an
// external reader only needs to know the record schema.

use crate::error::{DvzError, Result};
use crate::registry::ObjectType;
use crate::request::{Action, Content, Request, PROTOCOL_VERSION};
use std::io::Write;
use utils::log;

const MAGIC: &[u8; 3] = b"DVZ";

/// Brief or full detail for `Batch::print`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintFlags {
    Brief,
    Full,
}

/// An ordered sequence of Requests (§4.2).
#[derive(Debug, Clone, Default)]
pub struct Batch {
    requests: Vec<Request>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Append `request`. If it is a `create` with `target_id == 0`, a fresh
    /// ID is allocated from `registry` and written into the record; the
    /// assigned ID is returned either way.
    pub fn add<T>(&mut self, registry: &crate::registry::Registry<T>, mut request: Request) -> u64 {
        if request.action == Action::Create && request.target_id == 0 {
            request.target_id = registry.new_id();
        }
        let id = request.target_id;
        self.requests.push(request);
        id
    }

    /// Set the description of the most recently added record.
    pub fn describe(&mut self, description: impl Into<String>) {
        if let Some(last) = self.requests.last_mut() {
            last.description = Some(description.into());
        }
    }

    /// Empty the sequence but keep the allocated capacity.
    pub fn clear(&mut self) {
        self.requests.clear();
    }

    pub fn copy(&self) -> Batch {
        self.clone()
    }

    /// Binary-serialize to `path` per §6's dump format.
    pub fn dump(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .map_err(|e| DvzError::Serialization(format!("failed to write dump: {}", e)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.requests.len() as u32).to_le_bytes());

        for req in &self.requests {
            let action = req.action as u32;
            let object_type = object_type_tag(req.object_type);
            let content_bytes = bincode::serialize(&req.content)
                .map_err(|e| DvzError::Serialization(format!("content encode: {}", e)))?;
            let description_bytes = req.description.as_deref().unwrap_or("").as_bytes();

            out.extend_from_slice(&action.to_le_bytes());
            out.extend_from_slice(&object_type.to_le_bytes());
            out.extend_from_slice(&req.target_id.to_le_bytes());
            out.extend_from_slice(&req.flags.to_le_bytes());
            out.extend_from_slice(&(content_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&content_bytes);
            out.extend_from_slice(&(description_bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(description_bytes);
        }

        Ok(out)
    }

    /// Load a Batch previously written by `dump`/`to_bytes`.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Batch> {
        let bytes = std::fs::read(path)
            .map_err(|e| DvzError::Serialization(format!("failed to read dump: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Batch> {
        let mut cursor = bytes;
        let magic = take(&mut cursor, 3)?;
        if magic != MAGIC {
            return Err(DvzError::Serialization("bad magic".to_string()));
        }
        let version = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());
        if version != PROTOCOL_VERSION {
            return Err(DvzError::Serialization(format!(
                "unsupported protocol version {}",
                version
            )));
        }
        let count = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());

        let mut requests = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let action = decode_action(u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()))?;
            let object_type =
                object_type_from_tag(u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()))?;
            let target_id = u64::from_le_bytes(take(&mut cursor, 8)?.try_into().unwrap());
            let flags = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());
            let content_len = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
            let content_bytes = take(&mut cursor, content_len)?;
            let content: Content = bincode::deserialize(content_bytes)
                .map_err(|e| DvzError::Serialization(format!("content decode: {}", e)))?;
            let desc_len = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap()) as usize;
            let desc_bytes = take(&mut cursor, desc_len)?;
            let description = if desc_bytes.is_empty() {
                None
            } else {
                Some(
                    String::from_utf8(desc_bytes.to_vec())
                        .map_err(|e| DvzError::Serialization(format!("description utf8: {}", e)))?,
                )
            };

            requests.push(Request {
                version,
                action,
                object_type,
                target_id,
                flags,
                content,
                description,
            });
        }

        Ok(Batch { requests })
    }

    /// Human-readable trace, one block per request.
    pub fn emit_yaml(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let mut out = std::fs::File::create(path)
            .map_err(|e| DvzError::Serialization(format!("failed to create yaml: {}", e)))?;
        for req in &self.requests {
            writeln!(out, "- action: {:?}", req.action).ok();
            writeln!(out, "  type: {:?}", req.object_type).ok();
            writeln!(out, "  id: {:#x}", req.target_id).ok();
            writeln!(out, "  flags: {:#x}", req.flags).ok();
            if let Some(desc) = &req.description {
                writeln!(out, "  description: {}", desc).ok();
            }
            writeln!(out, "  content: {:?}", req.content).ok();
        }
        Ok(())
    }

    /// Print a brief or full trace to the log.
    pub fn print(&self, flags: PrintFlags) {
        for (i, req) in self.requests.iter().enumerate() {
            match flags {
                PrintFlags::Brief => {
                    log::info!("[{}] {:?} {:?} id={:#x}", i, req.action, req.object_type, req.target_id);
                }
                PrintFlags::Full => {
                    log::info!(
                        "[{}] {:?} {:?} id={:#x} flags={:#x} desc={:?} content={:?}",
                        i,
                        req.action,
                        req.object_type,
                        req.target_id,
                        req.flags,
                        req.description,
                        req.content
                    );
                }
            }
        }
    }
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if cursor.len() < n {
        return Err(DvzError::Serialization("truncated dump".to_string()));
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}

fn object_type_tag(t: ObjectType) -> u32 {
    match t {
        ObjectType::Canvas => 0,
        ObjectType::Dat => 1,
        ObjectType::Tex => 2,
        ObjectType::Sampler => 3,
        ObjectType::Shader => 4,
        ObjectType::Graphics => 5,
        ObjectType::Compute => 6,
    }
}

fn object_type_from_tag(tag: u32) -> Result<ObjectType> {
    Ok(match tag {
        0 => ObjectType::Canvas,
        1 => ObjectType::Dat,
        2 => ObjectType::Tex,
        3 => ObjectType::Sampler,
        4 => ObjectType::Shader,
        5 => ObjectType::Graphics,
        6 => ObjectType::Compute,
        other => {
            return Err(DvzError::Serialization(format!(
                "unknown object_type tag {}",
                other
            )))
        }
    })
}

fn decode_action(tag: u32) -> Result<Action> {
    Ok(match tag {
        0 => Action::Create,
        1 => Action::Update,
        2 => Action::Bind,
        3 => Action::Record,
        4 => Action::Delete,
        other => return Err(DvzError::Serialization(format!("unknown action tag {}", other))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::request::BufferType;

    #[test]
    fn add_appends_and_returns_id() {
        let registry: Registry<()> = Registry::new();
        let mut batch = Batch::new();
        let id = batch.add(
            &registry,
            Request::new(
                Action::Create,
                ObjectType::Canvas,
                Content::CreateCanvas {
                    width: 640,
                    height: 480,
                    clear: [1.0, 1.0, 1.0, 1.0],
                    flags: 0,
                },
            ),
        );
        assert_ne!(id, 0);
        assert_eq!(batch.requests().last().unwrap().target_id, id);
    }

    #[test]
    fn describe_sets_last_record() {
        let registry: Registry<()> = Registry::new();
        let mut batch = Batch::new();
        batch.add(
            &registry,
            Request::new(Action::Create, ObjectType::Dat, Content::None),
        );
        batch.describe("vertex buffer");
        assert_eq!(
            batch.requests().last().unwrap().description.as_deref(),
            Some("vertex buffer")
        );
    }

    #[test]
    fn round_trip_preserves_requests_byte_equal() {
        let registry: Registry<()> = Registry::new();
        let mut batch = Batch::new();
        batch.add(
            &registry,
            Request::new(
                Action::Create,
                ObjectType::Canvas,
                Content::CreateCanvas {
                    width: 640,
                    height: 480,
                    clear: [0.0, 0.0, 0.0, 1.0],
                    flags: 0,
                },
            ),
        );
        let dat_id = batch.add(
            &registry,
            Request::new(
                Action::Create,
                ObjectType::Dat,
                Content::CreateDat {
                    buffer_type: BufferType::Vertex,
                    size: 1024,
                    flags: 0,
                },
            ),
        );
        let mut upload = Request::new(Action::Update, ObjectType::Dat, Content::Upload {
            offset: 0,
            data: vec![1, 2, 3, 4],
            owning_copy: true,
        });
        upload.target_id = dat_id;
        batch.add(&registry, upload);
        let mut delete = Request::new(Action::Delete, ObjectType::Dat, Content::Delete);
        delete.target_id = dat_id;
        batch.add(&registry, delete);

        let bytes = batch.to_bytes().unwrap();
        let loaded = Batch::from_bytes(&bytes).unwrap();
        assert_eq!(batch.requests(), loaded.requests());
    }

    #[test]
    fn from_bytes_rejects_bad_magic() {
        let err = Batch::from_bytes(b"XYZ\x01\x00\x00\x00\x00\x00\x00\x00").unwrap_err();
        assert!(matches!(err, DvzError::Serialization(_)));
    }

    #[test]
    fn clear_keeps_batch_usable() {
        let registry: Registry<()> = Registry::new();
        let mut batch = Batch::new();
        batch.add(&registry, Request::new(Action::Create, ObjectType::Dat, Content::None));
        batch.clear();
        assert!(batch.is_empty());
    }
}
