// Build script to compile GLSL shaders to SPIR-V
//
// The .spv files land next to their sources in shaders/, which is where
// the renderer loads them from (graphics.shader_dir).

use std::path::Path;
use std::process::Command;

const SHADERS: [&str; 2] = ["shaders/cube.vert", "shaders/cube.frag"];

fn main() {
    for shader in SHADERS {
        println!("cargo:rerun-if-changed={}", shader);
        compile_shader(shader, &format!("{}.spv", shader));
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            // Not fatal: the binary reports the missing .spv at startup
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}", input, output);
        }
    }
}
