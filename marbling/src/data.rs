// Common geometries

#[rustfmt::skip]
pub static PLANE_VERTICES: [f32; 8] = [
    -1.0, -1.0,
    -1.0,  1.0,
     1.0,  1.0,
     1.0, -1.0,
];

#[rustfmt::skip]
pub static PLANE_INDICES: [u16; 6] = [
    0, 1, 2,
    0, 2, 3,
];

// Every pass shares this vertex stage. It also hands the fragment stage the
// texcoords of the four neighbouring texels.
pub static BASE_VERT_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/base.vert"));
