//! SPIR-V shader binaries loaded from disk

use std::io::Cursor;
use std::path::{Path, PathBuf};

use super::resource_manager::Resource;

/// Pipeline stage a shader binary is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

/// Raw shader bytes plus where they came from
///
/// Loading never fails: a missing, unreadable or empty file produces an
/// incomplete resource and one Warn record. Consumers check
/// [`is_complete`](Resource::is_complete) before creating a module.
#[derive(Debug, Clone)]
pub struct ShaderResource {
    path: PathBuf,
    stage: ShaderStage,
    bytes: Vec<u8>,
}

impl ShaderResource {
    /// Read the binary at `path`
    pub fn load(path: impl AsRef<Path>, stage: ShaderStage) -> Self {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) if bytes.is_empty() => {
                log::warn!("Shader file {} is empty", path.display());
                bytes
            }
            Ok(bytes) => {
                log::debug!("Read {} bytes of shader code from {}", bytes.len(), path.display());
                bytes
            }
            Err(e) => {
                log::warn!("Failed to read shader file {}: {e}", path.display());
                Vec::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            stage,
            bytes,
        }
    }

    /// Wrap bytes already in memory
    pub fn from_bytes(name: impl Into<PathBuf>, stage: ShaderStage, bytes: Vec<u8>) -> Self {
        Self {
            path: name.into(),
            stage,
            bytes,
        }
    }

    /// Source path (or name for in-memory shaders)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Target stage
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the bytes as SPIR-V words (checks alignment and endianness)
    pub fn spirv_words(&self) -> std::io::Result<Vec<u32>> {
        ash::util::read_spv(&mut Cursor::new(&self.bytes))
    }
}

impl Resource for ShaderResource {
    fn is_complete(&self) -> bool {
        !self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::logging::{capture, Level};

    const SPIRV_MAGIC: [u8; 4] = [0x03, 0x02, 0x23, 0x07];

    #[test]
    fn test_missing_file_is_incomplete_with_one_warning() {
        capture::start();
        let dir = tempfile::tempdir().unwrap();
        let shader = ShaderResource::load(dir.path().join("absent.spv"), ShaderStage::Vertex);

        assert!(!shader.is_complete());
        let records = capture::take();
        assert_eq!(capture::count_at_least(&records, Level::Warn, "absent.spv"), 1);
    }

    #[test]
    fn test_empty_file_is_incomplete() {
        capture::start();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.spv");
        std::fs::write(&path, b"").unwrap();

        let shader = ShaderResource::load(&path, ShaderStage::Fragment);
        assert!(!shader.is_complete());
        assert_eq!(shader.stage(), ShaderStage::Fragment);
        let records = capture::take();
        assert_eq!(capture::count_at_least(&records, Level::Warn, "empty"), 1);
    }

    #[test]
    fn test_loaded_bytes_decode_to_words() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.spv");
        let mut bytes = SPIRV_MAGIC.to_vec();
        bytes.extend_from_slice(&0x0001_0000_u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let shader = ShaderResource::load(&path, ShaderStage::Vertex);
        assert!(shader.is_complete());
        assert_eq!(shader.bytes().len(), 8);
        assert_eq!(shader.spirv_words().unwrap(), vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_misaligned_bytes_fail_to_decode() {
        let shader = ShaderResource::from_bytes("odd", ShaderStage::Vertex, vec![1, 2, 3]);
        assert!(shader.is_complete());
        assert!(shader.spirv_words().is_err());
    }
}
