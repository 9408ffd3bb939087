use std::io::prelude::*;
use std::{env, error::Error, fs, fs::File, path::Path};

// Prefix every shader with the GLSL version of the target's GL flavour.
fn main() -> Result<(), Box<dyn Error>> {
    let out_dir = env::var_os("OUT_DIR").ok_or("missing output directory")?;
    let target = env::var("TARGET")?;

    let version = match target.as_str() {
        "wasm32-unknown-unknown" => "300 es",

        // GLSL 3.30 is the first core version whose number matches OpenGL's,
        // and the first that accepts `layout(location)` on vertex inputs.
        _ => "330 core",
    };

    println!("cargo:rerun-if-changed=shaders");

    fs::create_dir_all(Path::new(&out_dir).join("shaders"))?;

    for entry in fs::read_dir("shaders")? {
        let shader_file = entry?;
        let path = shader_file.path();
        let mut shader_source = File::open(&path)?;

        let mut version_shader_source = format!("#version {}\n", version);
        shader_source.read_to_string(&mut version_shader_source)?;

        let out_path = Path::new(&out_dir).join(&path);
        fs::write(&out_path, version_shader_source.as_bytes())?;
    }

    Ok(())
}
