use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

/// Written by the build script, one `.spv` per `.wgsl` source
const SHADERS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders-built");

pub struct GraphicsShader {
    pub module: vk::ShaderModule,
    pub vertex_entry: &'static CStr,
    pub fragment_entry: &'static CStr,
    device: Arc<ash::Device>,
}

pub struct ComputeShader {
    pub module: vk::ShaderModule,
    pub entry: &'static CStr,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(shader_name: &str, device: Arc<ash::Device>) -> Result<Self> {
        let module = create_shader_module(
            &Path::new(SHADERS_DIR).join(format!("{}.spv", shader_name)),
            &device,
        )?;
        Ok(Self {
            module,
            vertex_entry: c"vs_main",
            fragment_entry: c"fs_main",
            device,
        })
    }
}

impl ComputeShader {
    pub fn new(shader_name: &str, device: Arc<ash::Device>) -> Result<Self> {
        let module = create_shader_module(
            &Path::new(SHADERS_DIR).join(format!("{}.spv", shader_name)),
            &device,
        )?;
        Ok(Self {
            module,
            entry: c"cs_main",
            device,
        })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

impl Drop for ComputeShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(filepath)
        .wrap_err_with(|| format!("Failed to read shader {}", filepath.display()))?;
    // Copies into u32 words, so the byte buffer's alignment does not matter
    let code = ash::util::read_spv(&mut Cursor::new(bytes))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}
