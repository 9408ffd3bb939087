use crate::data;

use glow::HasContext;
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use thiserror::Error;

pub type Context = Rc<glow::Context>;
type GlDataType = u32;
type Result<T> = std::result::Result<T, Problem>;

#[derive(Error, Debug)]
pub enum Problem {
    #[error("Ran out of memory")]
    OutOfMemory,

    #[error("Cannot create buffer")]
    CannotCreateBuffer,

    #[error("Cannot create texture")]
    CannotCreateTexture,

    #[error("Cannot create framebuffer")]
    CannotCreateFramebuffer,

    #[error("Framebuffer is incomplete (status {0:#x})")]
    IncompleteFramebuffer(u32),

    #[error("{}", match .0 {
        Some(n) => format!("Cannot create shader: {}", n),
        None => "Cannot create shader".to_string(),
    })]
    CannotCreateShader(Option<String>),

    #[error("Cannot create program")]
    CannotCreateProgram,

    #[error("Cannot link program: {0}")]
    CannotLinkProgram(String),

    #[error("No renderable texture format is supported")]
    UnsupportedTextureFormat,

    #[error("Vertex attribute type is not supported")]
    CannotBindUnsupportedVertexType,
}

#[derive(Clone, Debug)]
pub struct Buffer {
    context: Context,
    pub id: glow::Buffer,
    pub size: usize,
    pub type_: u32,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.context.delete_buffer(self.id);
        }
    }
}

impl Buffer {
    pub fn from_bytes(
        context: &Context,
        data: &[u8],
        buffer_type: u32,
        usage: u32,
    ) -> Result<Self> {
        let buffer = unsafe {
            let buffer = context
                .create_buffer()
                .map_err(|_| Problem::CannotCreateBuffer)?;

            context.bind_buffer(buffer_type, Some(buffer));
            context.buffer_data_u8_slice(buffer_type, data, usage);
            context.bind_buffer(buffer_type, None);

            buffer
        };

        Ok(Self {
            context: Rc::clone(context),
            id: buffer,
            size: data.len(),
            type_: buffer_type,
        })
    }

    pub fn from_f32(context: &Context, data: &[f32], buffer_type: u32, usage: u32) -> Result<Self> {
        Self::from_bytes(context, bytemuck::cast_slice(data), buffer_type, usage)
    }

    pub fn from_u16(context: &Context, data: &[u16], buffer_type: u32, usage: u32) -> Result<Self> {
        Self::from_bytes(context, bytemuck::cast_slice(data), buffer_type, usage)
    }
}

/// A sized internal format paired with the client format and type used to
/// allocate it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureFormat {
    pub internal_format: GlDataType,
    pub format: GlDataType,
    pub type_: GlDataType,
}

impl TextureFormat {
    pub const RGBA16F: Self = Self {
        internal_format: glow::RGBA16F,
        format: glow::RGBA,
        type_: glow::HALF_FLOAT,
    };
    pub const RG16F: Self = Self {
        internal_format: glow::RG16F,
        format: glow::RG,
        type_: glow::HALF_FLOAT,
    };
    pub const R16F: Self = Self {
        internal_format: glow::R16F,
        format: glow::RED,
        type_: glow::HALF_FLOAT,
    };

    // Next wider format to try when this one cannot be rendered to.
    pub fn wider(&self) -> Option<Self> {
        match self.internal_format {
            glow::R16F => Some(Self::RG16F),
            glow::RG16F => Some(Self::RGBA16F),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TextureOptions {
    pub mag_filter: GlDataType,
    pub min_filter: GlDataType,
    pub wrap_s: GlDataType,
    pub wrap_t: GlDataType,
    pub format: TextureFormat,
}

impl Default for TextureOptions {
    fn default() -> Self {
        TextureOptions {
            mag_filter: glow::NEAREST,
            min_filter: glow::NEAREST,
            wrap_s: glow::CLAMP_TO_EDGE,
            wrap_t: glow::CLAMP_TO_EDGE,
            format: TextureFormat::RGBA16F,
        }
    }
}

impl TextureOptions {
    pub fn new(format: TextureFormat, filter: GlDataType) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            format,
            ..Default::default()
        }
    }
}

/// A GPU-resident 2D grid: a texture and the framebuffer that renders into it.
pub struct Framebuffer {
    context: Context,
    pub id: glow::Framebuffer,
    pub width: u32,
    pub height: u32,
    pub texture: glow::Texture,
    pub options: TextureOptions,
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.context
                .bind_framebuffer(glow::FRAMEBUFFER, Some(self.id));
            self.context.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                None,
                0,
            );
            self.context.bind_framebuffer(glow::FRAMEBUFFER, None);
            self.context.delete_framebuffer(self.id);
            self.context.delete_texture(self.texture);
        }
    }
}

impl Framebuffer {
    // Allocates storage and attaches it. The contents are undefined until
    // cleared; the target pool takes care of that.
    pub fn new(
        context: &Context,
        width: u32,
        height: u32,
        options: TextureOptions,
    ) -> Result<Self> {
        let TextureFormat {
            internal_format,
            format,
            type_,
        } = options.format;

        let (framebuffer, texture) = unsafe {
            let texture = context
                .create_texture()
                .map_err(|_| Problem::CannotCreateTexture)?;

            context.active_texture(glow::TEXTURE0);
            context.bind_texture(glow::TEXTURE_2D, Some(texture));
            context.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                options.mag_filter as i32,
            );
            context.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                options.min_filter as i32,
            );
            context.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                options.wrap_s as i32,
            );
            context.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                options.wrap_t as i32,
            );
            context.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal_format as i32,
                width as i32,
                height as i32,
                0,
                format,
                type_,
                None,
            );
            context.bind_texture(glow::TEXTURE_2D, None);

            let framebuffer = match context.create_framebuffer() {
                Ok(framebuffer) => framebuffer,
                Err(_) => {
                    context.delete_texture(texture);
                    return Err(Problem::CannotCreateFramebuffer);
                }
            };

            context.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            context.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let status = context.check_framebuffer_status(glow::FRAMEBUFFER);
            context.bind_framebuffer(glow::FRAMEBUFFER, None);

            if status != glow::FRAMEBUFFER_COMPLETE {
                context.delete_framebuffer(framebuffer);
                context.delete_texture(texture);
                return Err(Problem::IncompleteFramebuffer(status));
            }

            (framebuffer, texture)
        };

        Ok(Self {
            context: Rc::clone(context),
            id: framebuffer,
            width,
            height,
            texture,
            options,
        })
    }

    pub fn texel_size(&self) -> [f32; 2] {
        texel_size(self.width, self.height)
    }

    // Binds the texture to the given unit and returns the unit, ready to be
    // passed to a sampler uniform.
    pub fn attach(&self, unit: u32) -> u32 {
        unsafe {
            self.context.active_texture(glow::TEXTURE0 + unit);
            self.context
                .bind_texture(glow::TEXTURE_2D, Some(self.texture));
        }
        unit
    }

    pub fn zero_out(&self) {
        self.clear_color_with(&[0.0, 0.0, 0.0, 0.0])
    }

    pub fn clear_color_with(&self, color: &[f32; 4]) {
        let _guard = FramebufferGuard::bind(&self.context, self);
        unsafe {
            self.context
                .clear_color(color[0], color[1], color[2], color[3]);
            self.context.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    pub fn draw_to<T>(&self, context: &Context, draw_call: T)
    where
        T: FnOnce(),
    {
        let _guard = FramebufferGuard::bind(context, self);
        draw_call();
    }

    pub fn read_pixels_f32(&self) -> Vec<f32> {
        let mut pixels = vec![0.0f32; 4 * (self.width * self.height) as usize];
        let _guard = FramebufferGuard::bind(&self.context, self);
        unsafe {
            self.context.read_pixels(
                0,
                0,
                self.width as i32,
                self.height as i32,
                glow::RGBA,
                glow::FLOAT,
                glow::PixelPackData::Slice(bytemuck::cast_slice_mut(&mut pixels)),
            );
        }
        pixels
    }
}

pub fn texel_size(width: u32, height: u32) -> [f32; 2] {
    [1.0 / width as f32, 1.0 / height as f32]
}

/// Scoped framebuffer binding.
///
/// Binds a render target (or the default framebuffer) together with a
/// matching viewport, and rebinds the default framebuffer on drop. Passes
/// never nest, so outside of a guard the default framebuffer is always bound.
pub struct FramebufferGuard<'a> {
    context: &'a Context,
}

impl<'a> FramebufferGuard<'a> {
    pub fn bind(context: &'a Context, framebuffer: &Framebuffer) -> Self {
        unsafe {
            context.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer.id));
            context.viewport(0, 0, framebuffer.width as i32, framebuffer.height as i32);
        }
        Self { context }
    }

    pub fn bind_default(context: &'a Context, width: u32, height: u32) -> Self {
        unsafe {
            context.bind_framebuffer(glow::FRAMEBUFFER, None);
            context.viewport(0, 0, width as i32, height as i32);
        }
        Self { context }
    }
}

impl Drop for FramebufferGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            self.context.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }
}

/// A read/write pair. Passes sample `current` and render into `next`; `swap`
/// exchanges the two roles without touching either side.
pub struct Double<T> {
    front: RefCell<T>,
    back: RefCell<T>,
}

pub type DoubleFramebuffer = Double<Framebuffer>;

impl<T> Double<T> {
    pub fn new(front: T, back: T) -> Self {
        Self {
            front: RefCell::new(front),
            back: RefCell::new(back),
        }
    }

    pub fn current(&self) -> Ref<T> {
        self.front.borrow()
    }

    pub fn next(&self) -> Ref<T> {
        self.back.borrow()
    }

    pub fn swap(&self) {
        self.front.swap(&self.back);
    }
}

impl Double<Framebuffer> {
    pub fn width(&self) -> u32 {
        self.current().width
    }

    pub fn height(&self) -> u32 {
        self.current().height
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.current().texel_size()
    }

    // Renders into the write side with the read side as input, then swaps.
    pub fn draw_to<T>(&self, context: &Context, draw_call: T)
    where
        T: FnOnce(&Framebuffer),
    {
        {
            let framebuffer = self.next();
            let _guard = FramebufferGuard::bind(context, &framebuffer);
            draw_call(&self.current());
        }

        self.swap();
    }
}

pub struct Program {
    context: Context,
    pub program: glow::Program,
    uniforms: FxHashMap<String, UniformInfo>,
}

impl Drop for Program {
    fn drop(&mut self) {
        unsafe {
            self.context.delete_program(self.program);
        }
    }
}

impl Program {
    pub fn new_with_defines(
        context: &Context,
        shaders: (&str, &str),
        defines: &[&str],
    ) -> Result<Self> {
        let vertex_shader = compile_shader(
            context,
            glow::VERTEX_SHADER,
            &preprocess_shader(shaders.0, defines),
        )?;
        let fragment_shader = match compile_shader(
            context,
            glow::FRAGMENT_SHADER,
            &preprocess_shader(shaders.1, defines),
        ) {
            Ok(shader) => shader,
            Err(problem) => {
                unsafe { context.delete_shader(vertex_shader) };
                return Err(problem);
            }
        };

        let program = unsafe {
            let program = context
                .create_program()
                .map_err(|_| Problem::CannotCreateProgram)?;
            context.attach_shader(program, vertex_shader);
            context.attach_shader(program, fragment_shader);
            context.link_program(program);

            let linked = context.get_program_link_status(program);

            // Delete the shaders to free up memory
            context.detach_shader(program, vertex_shader);
            context.detach_shader(program, fragment_shader);
            context.delete_shader(vertex_shader);
            context.delete_shader(fragment_shader);

            if !linked {
                let log = context.get_program_info_log(program);
                context.delete_program(program);
                return Err(Problem::CannotLinkProgram(log));
            }

            program
        };

        // Get uniform locations
        let mut uniforms = FxHashMap::default();
        unsafe {
            let uniform_count = context.get_active_uniforms(program);
            for num in 0..uniform_count {
                if let Some(info) = context.get_active_uniform(program, num) {
                    if let Some(location) = context.get_uniform_location(program, &info.name) {
                        uniforms.insert(info.name, UniformInfo { location });
                    }
                }
            }
        }

        Ok(Program {
            context: Rc::clone(context),
            program,
            uniforms,
        })
    }

    pub fn use_program(&self) {
        unsafe {
            self.context.use_program(Some(self.program));
        }
    }

    pub fn set_uniforms(&self, uniforms: &[&Uniform]) {
        for uniform in uniforms.iter() {
            self.set_uniform(uniform);
        }
    }

    // Uniforms the driver optimised away have no location; setting them is a
    // silent no-op, which keeps shared call sites simple.
    pub fn set_uniform(&self, uniform: &Uniform) {
        let context = &self.context;
        let location = self.get_uniform_location(uniform.name);
        self.use_program();

        unsafe {
            match uniform.value {
                UniformValue::SignedInt(value) => context.uniform_1_i32(location.as_ref(), value),

                UniformValue::Float(value) => context.uniform_1_f32(location.as_ref(), value),

                UniformValue::Vec2(value) => {
                    context.uniform_2_f32(location.as_ref(), value[0], value[1])
                }

                UniformValue::Vec3(value) => {
                    context.uniform_3_f32(location.as_ref(), value[0], value[1], value[2])
                }

                UniformValue::Vec4(value) => context.uniform_4_f32(
                    location.as_ref(),
                    value[0],
                    value[1],
                    value[2],
                    value[3],
                ),

                UniformValue::Texture2D(unit) => {
                    context.uniform_1_i32(location.as_ref(), unit as i32)
                }
            }
        }
    }

    pub fn get_uniform_location(&self, name: &str) -> Option<glow::UniformLocation> {
        self.uniforms.get(name).map(|info| info.location.clone())
    }
}

// Inserts `#define`s right after the `#version` line, which must stay first.
pub fn preprocess_shader<'a>(source: &'a str, defines: &[&str]) -> Cow<'a, str> {
    if defines.is_empty() {
        return source.into();
    }

    let preamble = defines.iter().fold(String::new(), |vars, name| {
        vars + &format!("#define {}\n", name)
    });

    match source.split_once('\n') {
        Some((version, source_rest)) if version.starts_with("#version") => {
            format!("{}\n{}{}", version, preamble, source_rest).into()
        }
        _ => (preamble + source).into(),
    }
}

#[derive(Clone)]
struct UniformInfo {
    location: glow::UniformLocation,
}

pub struct Uniform {
    pub name: &'static str,
    pub value: UniformValue,
}

#[derive(Clone, Copy, Debug)]
pub enum UniformValue {
    SignedInt(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Texture2D(u32),
}

pub fn compile_shader(context: &Context, shader_type: u32, source: &str) -> Result<glow::Shader> {
    unsafe {
        let shader = context
            .create_shader(shader_type)
            .map_err(|_| Problem::CannotCreateShader(None))?;
        context.shader_source(shader, source);
        context.compile_shader(shader);

        if context.get_shader_compile_status(shader) {
            Ok(shader)
        } else {
            let log = context.get_shader_info_log(shader);
            context.delete_shader(shader);
            Err(Problem::CannotCreateShader(Some(log)))
        }
    }
}

#[derive(Default)]
pub struct VertexBufferLayout {
    pub location: u32,
    pub size: u32,
    pub type_: u32,
    pub stride: u32,
    pub offset: u32,
}

pub struct VertexArrayObject {
    context: Context,
    pub id: glow::VertexArray,
}

impl Drop for VertexArrayObject {
    fn drop(&mut self) {
        unsafe {
            self.context.delete_vertex_array(self.id);
        }
    }
}

impl VertexArrayObject {
    pub fn empty(context: &Context) -> Result<Self> {
        let id = unsafe {
            context
                .create_vertex_array()
                .map_err(|_| Problem::OutOfMemory)?
        };

        Ok(Self {
            id,
            context: Rc::clone(context),
        })
    }

    // Attribute locations are pinned in the shaders with `layout(location)`,
    // so one vertex array serves every program.
    pub fn new(
        context: &Context,
        vertices: &[(&Buffer, VertexBufferLayout)],
        indices: Option<&Buffer>,
    ) -> Result<Self> {
        let vao = Self::empty(context)?;

        unsafe {
            vao.context.bind_vertex_array(Some(vao.id));

            for (vertex, attribute) in vertices.iter() {
                bind_attributes(&vao.context, vertex, attribute)?;
            }

            if let Some(buffer) = indices {
                vao.context
                    .bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buffer.id));
            }

            vao.context.bind_vertex_array(None);
        }

        Ok(vao)
    }
}

pub fn bind_attributes(
    context: &Context,
    buffer: &Buffer,
    buffer_layout: &VertexBufferLayout,
) -> Result<()> {
    unsafe {
        context.bind_buffer(glow::ARRAY_BUFFER, Some(buffer.id));
        context.enable_vertex_attrib_array(buffer_layout.location);

        match buffer_layout.type_ {
            glow::FLOAT => context.vertex_attrib_pointer_f32(
                buffer_layout.location,
                buffer_layout.size as i32,
                buffer_layout.type_,
                false,
                buffer_layout.stride as i32,
                buffer_layout.offset as i32,
            ),
            _ => return Err(Problem::CannotBindUnsupportedVertexType),
        };

        context.bind_buffer(glow::ARRAY_BUFFER, None);
    }

    Ok(())
}

/// The full-screen quad every pass draws.
pub struct Quad {
    context: Context,
    vertex_array: VertexArrayObject,
    #[allow(unused)]
    vertices: Buffer,
    #[allow(unused)]
    indices: Buffer,
}

impl Quad {
    pub fn new(context: &Context) -> Result<Self> {
        let vertices = Buffer::from_f32(
            context,
            &data::PLANE_VERTICES,
            glow::ARRAY_BUFFER,
            glow::STATIC_DRAW,
        )?;
        let indices = Buffer::from_u16(
            context,
            &data::PLANE_INDICES,
            glow::ELEMENT_ARRAY_BUFFER,
            glow::STATIC_DRAW,
        )?;

        let vertex_array = VertexArrayObject::new(
            context,
            &[(
                &vertices,
                VertexBufferLayout {
                    location: 0,
                    size: 2,
                    type_: glow::FLOAT,
                    ..Default::default()
                },
            )],
            Some(&indices),
        )?;

        Ok(Self {
            context: Rc::clone(context),
            vertex_array,
            vertices,
            indices,
        })
    }

    pub fn draw(&self) {
        unsafe {
            self.context
                .bind_vertex_array(Some(self.vertex_array.id));
            self.context
                .draw_elements(glow::TRIANGLES, 6, glow::UNSIGNED_SHORT, 0);
            self.context.bind_vertex_array(None);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn swap_exchanges_roles_without_touching_contents() {
        let pair = Double::new(vec![1.0, 2.0], vec![3.0, 4.0]);

        pair.swap();
        assert_eq!(*pair.current(), vec![3.0, 4.0]);
        assert_eq!(*pair.next(), vec![1.0, 2.0]);

        pair.swap();
        assert_eq!(*pair.current(), vec![1.0, 2.0]);
        assert_eq!(*pair.next(), vec![3.0, 4.0]);
    }

    #[test]
    fn the_read_side_is_lent_as_a_plain_reference() {
        fn total(values: &Vec<f32>) -> f32 {
            values.iter().sum()
        }

        let pair = Double::new(vec![1.0, 2.0], vec![3.0, 4.0]);
        assert_eq!(total(&pair.current()), 3.0);

        pair.swap();
        assert_eq!(total(&pair.current()), 7.0);
    }

    #[test]
    fn defines_follow_the_version_line() {
        let source = "#version 300 es\nprecision highp float;\n";
        assert_eq!(
            preprocess_shader(source, &["MANUAL_FILTERING"]),
            "#version 300 es\n#define MANUAL_FILTERING\nprecision highp float;\n"
        );
    }

    #[test]
    fn defines_are_prepended_without_a_version_line() {
        assert_eq!(
            preprocess_shader("void main() {}", &["A", "B"]),
            "#define A\n#define B\nvoid main() {}"
        );
    }

    #[test]
    fn sources_without_defines_are_borrowed() {
        assert!(matches!(
            preprocess_shader("void main() {}", &[]),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn half_float_formats_widen_towards_rgba() {
        assert_eq!(TextureFormat::R16F.wider(), Some(TextureFormat::RG16F));
        assert_eq!(TextureFormat::RG16F.wider(), Some(TextureFormat::RGBA16F));
        assert_eq!(TextureFormat::RGBA16F.wider(), None);
    }

    #[test]
    fn texel_size_is_reciprocal_of_dimensions() {
        assert_eq!(texel_size(256, 128), [1.0 / 256.0, 1.0 / 128.0]);
    }
}
