// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. build.rs compiles the GLSL
// sources with glslc; here we load the .spv files at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V file from disk
pub fn load_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| {
        format!(
            "Failed to read shader {:?}. Compile it with `glslc` (Vulkan SDK) first",
            path
        )
    })?;
    parse_spirv(&bytes).with_context(|| format!("Invalid SPIR-V in {:?}", path))
}

/// Convert raw bytes into aligned SPIR-V words, checking the magic number
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    // read_spv fixes up byte order, so a valid module starts with the magic
    let words = ash::util::read_spv(&mut std::io::Cursor::new(bytes))?;
    if words.first() != Some(&SPIRV_MAGIC) {
        anyhow::bail!("missing SPIR-V magic number");
    }
    Ok(words)
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_little_endian_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(parse_spirv(&[0x03, 0x02, 0x23]).is_err());
    }

    #[test]
    fn rejects_non_spirv_bytes() {
        assert!(parse_spirv(b"#version 450\n\0\0\0").is_err());
    }

    #[test]
    fn missing_file_mentions_glslc() {
        let err = load_spirv("no/such/shader.spv").unwrap_err();
        assert!(format!("{:#}", err).contains("glslc"));
    }
}
