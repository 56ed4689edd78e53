//! Shader module creation from loaded shader resources

use ash::vk;

use super::device::Device;
use super::error::{VulkanError, VulkanResult};
use super::handles::{HandleKind, OwnedShaderModule};
use crate::assets::{Resource, ShaderResource, ShaderStage};

/// Entry point every shader is compiled with
pub const SHADER_ENTRY_POINT: &std::ffi::CStr = c"main";

impl From<ShaderStage> for vk::ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::Fragment => Self::FRAGMENT,
        }
    }
}

/// Create a shader module; incomplete or malformed SPIR-V is an error
pub fn create_shader_module(device: &Device, shader: &ShaderResource) -> VulkanResult<OwnedShaderModule> {
    if !shader.is_complete() {
        log::error!("Shader {} was not loaded", shader.path().display());
        return Err(VulkanError::Incomplete(shader.path().display().to_string()));
    }
    let code = shader.spirv_words().map_err(|e| {
        log::error!("Shader {} is not valid SPIR-V: {e}", shader.path().display());
        VulkanError::Incomplete(shader.path().display().to_string())
    })?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
    let module = unsafe { device.raw().create_shader_module(&create_info, None) }
        .map_err(|result| VulkanError::creation(HandleKind::ShaderModule, result))?;
    Ok(device.own(module))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert_eq!(
            vk::ShaderStageFlags::from(ShaderStage::Vertex),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            vk::ShaderStageFlags::from(ShaderStage::Fragment),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(SHADER_ENTRY_POINT.to_bytes(), b"main");
    }
}
