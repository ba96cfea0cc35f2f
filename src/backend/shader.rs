// Shader module loading and management
//
// Vulkan uses SPIR-V bytecode for shaders. The build script compiles the
// GLSL sources and bakes the output directory into the binary; the bytecode
// is read from there at startup and turned into modules whenever a pipeline
// is (re)built.

use anyhow::{Context, Result};
use ash::vk;
use std::fs::File;
use std::path::{Path, PathBuf};
use super::{VkFailure, VulkanDevice};

/// Directory `build.rs` writes compiled shaders to
pub const SHADER_BINARY_DIR: &str = env!("SHADER_BINARY_DIR");

/// SPIR-V words for the triangle's two stages
pub struct ShaderCode {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderCode {
    /// Load `shader.vert.spv` and `shader.frag.spv` from the build output
    pub fn load() -> Result<Self> {
        Self::load_from_dir(SHADER_BINARY_DIR)
    }

    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            vertex: read_spirv(dir.join("shader.vert.spv"))?,
            fragment: read_spirv(dir.join("shader.frag.spv"))?,
        })
    }
}

/// Read a SPIR-V file into properly aligned words
pub fn read_spirv(path: PathBuf) -> Result<Vec<u32>> {
    let mut file = File::open(&path).map_err(|e| {
        log::error!("Couldn't open file: {}", path.display());
        anyhow::Error::new(e).context(VkFailure::FileNotFound)
    })?;

    ash::util::read_spv(&mut file)
        .with_context(|| format!("Invalid SPIR-V in {}", path.display()))
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .context(VkFailure::CreateShaderModule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hello-triangle-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_file_is_tagged() {
        let err = read_spirv(scratch_dir("missing").join("nope.spv")).unwrap_err();
        assert_eq!(err.downcast_ref::<VkFailure>(), Some(&VkFailure::FileNotFound));
    }

    #[test]
    fn spirv_words_are_read() {
        let dir = scratch_dir("words");
        let path = dir.join("tiny.spv");
        let words: [u32; 2] = [0x0723_0203, 0x0001_0000];

        let mut file = File::create(&path).unwrap();
        for word in words {
            file.write_all(&word.to_le_bytes()).unwrap();
        }
        drop(file);

        assert_eq!(read_spirv(path).unwrap(), words.to_vec());
    }

    #[test]
    fn truncated_spirv_is_rejected() {
        let dir = scratch_dir("truncated");
        let path = dir.join("odd.spv");
        std::fs::write(&path, [0x03, 0x02, 0x23]).unwrap();

        let err = read_spirv(path).unwrap_err();
        assert!(err.downcast_ref::<VkFailure>().is_none());
    }
}
