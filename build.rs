// Build script to compile GLSL shaders to SPIR-V
//
// The compiled binaries land in OUT_DIR/shaders and the directory is exported
// as SHADER_BINARY_DIR so the application reads them from a fixed location.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADERS: &[&str] = &["shader.vert", "shader.frag"];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let shader_dir = out_dir.join("shaders");
    std::fs::create_dir_all(&shader_dir).expect("Failed to create shader output directory");

    println!("cargo:rustc-env=SHADER_BINARY_DIR={}", shader_dir.display());

    // Compile shaders using glslc (part of Vulkan SDK)
    for name in SHADERS {
        let input = Path::new("shaders").join(name);
        let output = shader_dir.join(format!("{name}.spv"));
        compile_shader(&input, &output);
    }
}

fn compile_shader(input: &Path, output: &Path) {
    let result = Command::new("glslc")
        .arg(input)
        .arg("-o")
        .arg(output)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input.display(), status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({e}); {} was not compiled", input.display());
            println!(
                "cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}",
                input.display(),
                output.display()
            );
        }
    }
}
