use crate::{capabilities, capture, data, material, pool, render, settings};
use capabilities::Capabilities;
use capture::Capture;
use material::Material;
use pool::TargetPool;
use render::{Context, Framebuffer, FramebufferGuard, Quad, TextureOptions, Uniform, UniformValue};
use settings::Settings;

use glow::HasContext;
use std::rc::Rc;

static COLOR_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/color.frag"));
static DISPLAY_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/display.frag"));
static SKETCH_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/sketch.frag"));

// Flowing is a live preview; only a paused canvas looks like a sketch.
pub fn sketch_applies(settings: &Settings) -> bool {
    settings.sketch.enabled && settings.mode.is_paused()
}

pub enum Target<'a> {
    Screen,
    Field(&'a Framebuffer),
}

pub struct Drawer {
    context: Context,
    settings: Rc<Settings>,
    quad: Rc<Quad>,
    pool: Rc<TargetPool>,
    capabilities: Capabilities,

    pub drawing_width: u32,
    pub drawing_height: u32,

    // Scratch copy of the dye at drawing-buffer size for the sketch filter.
    post: Framebuffer,

    color_pass: Material,
    display_pass: Material,
    sketch_pass: Material,
}

impl Drawer {
    pub fn new(
        context: &Context,
        quad: &Rc<Quad>,
        pool: &Rc<TargetPool>,
        capabilities: &Capabilities,
        drawing_size: (u32, u32),
        settings: &Rc<Settings>,
    ) -> Result<Self, render::Problem> {
        let (drawing_width, drawing_height) = drawing_size;
        let post = pool.create_field(
            drawing_width,
            drawing_height,
            TextureOptions::new(capabilities.rgba, glow::NEAREST),
        )?;

        let material = |label, fragment| {
            Material::new(context, label, (data::BASE_VERT_SHADER, fragment))
        };

        Ok(Self {
            context: Rc::clone(context),
            settings: Rc::clone(settings),
            quad: Rc::clone(quad),
            pool: Rc::clone(pool),
            capabilities: *capabilities,

            drawing_width,
            drawing_height,
            post,

            color_pass: material("color", COLOR_FRAG_SHADER),
            display_pass: material("display", DISPLAY_FRAG_SHADER),
            sketch_pass: material("sketch", SKETCH_FRAG_SHADER),
        })
    }

    pub fn update(&mut self, settings: &Rc<Settings>) {
        self.settings = Rc::clone(settings);
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), render::Problem> {
        self.drawing_width = width;
        self.drawing_height = height;

        if (self.post.width, self.post.height) != (width, height) {
            self.post = self.pool.create_field(
                width,
                height,
                TextureOptions::new(self.capabilities.rgba, glow::NEAREST),
            )?;
        }

        Ok(())
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.drawing_width.max(1) as f32 / self.drawing_height.max(1) as f32
    }

    // Background first, then premultiplied ink over it.
    pub fn render(&self, dye: &Framebuffer, target: Target) {
        let sketch = sketch_applies(&self.settings);
        if sketch {
            self.prepare_post(dye);
        }

        unsafe {
            self.context.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
            self.context.enable(glow::BLEND);
        }

        let _guard = match target {
            Target::Screen => {
                FramebufferGuard::bind_default(&self.context, self.drawing_width, self.drawing_height)
            }
            Target::Field(framebuffer) => FramebufferGuard::bind(&self.context, framebuffer),
        };

        self.draw_background();

        if sketch {
            self.draw_sketch();
        } else {
            self.draw_display(dye);
        }
    }

    pub fn capture(&self, dye: &Framebuffer, timestamp: f64) -> Result<Capture, crate::Problem> {
        let (width, height) = capture::capture_size(
            self.settings.capture_resolution,
            self.drawing_width,
            self.drawing_height,
        );
        log::info!("Capturing {}x{}", width, height);

        let target = self.pool.create_field(
            width,
            height,
            TextureOptions::new(render::TextureFormat::RGBA16F, glow::NEAREST),
        )?;

        self.render(dye, Target::Field(&target));
        let pixels = target.read_pixels_f32();

        Ok(capture::encode(&pixels, width, height, timestamp)?)
    }

    fn draw_background(&self) {
        if let Some(program) = self.color_pass.bind() {
            program.set_uniform(&Uniform {
                name: "color",
                value: UniformValue::Vec4(self.settings.back_color.to_rgba(1.0)),
            });
            self.quad.draw();
        }
    }

    fn draw_display(&self, dye: &Framebuffer) {
        if let Some(program) = self.display_pass.bind() {
            program.set_uniforms(&[
                &Uniform {
                    name: "texelSize",
                    value: UniformValue::Vec2(dye.texel_size()),
                },
                &Uniform {
                    name: "uTexture",
                    value: UniformValue::Texture2D(dye.attach(0)),
                },
            ]);
            self.quad.draw();
        }
    }

    fn prepare_post(&self, dye: &Framebuffer) {
        unsafe { self.context.disable(glow::BLEND) };
        self.pool.copy(dye, &self.post);
    }

    fn draw_sketch(&self) {
        let sketch = self.settings.sketch.clamped();

        if let Some(program) = self.sketch_pass.bind() {
            program.set_uniforms(&[
                &Uniform {
                    name: "texelSize",
                    value: UniformValue::Vec2(self.post.texel_size()),
                },
                &Uniform {
                    name: "uTexture",
                    value: UniformValue::Texture2D(self.post.attach(0)),
                },
                &Uniform {
                    name: "edgeStrength",
                    value: UniformValue::Float(sketch.edge_strength),
                },
                &Uniform {
                    name: "edgeThreshold",
                    value: UniformValue::Float(sketch.edge_threshold),
                },
                &Uniform {
                    name: "levels",
                    value: UniformValue::SignedInt(sketch.levels as i32),
                },
                &Uniform {
                    name: "saturation",
                    value: UniformValue::Float(sketch.saturation),
                },
            ]);
            self.quad.draw();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::settings::{Mode, SketchFilter};

    fn with(mode: Mode, enabled: bool) -> Settings {
        Settings {
            mode,
            sketch: SketchFilter {
                enabled,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn sketch_only_applies_to_paused_canvases() {
        assert!(sketch_applies(&with(Mode::Painting, true)));
        assert!(!sketch_applies(&with(Mode::Flowing, true)));
        assert!(!sketch_applies(&with(Mode::Painting, false)));
        assert!(!sketch_applies(&with(Mode::Flowing, false)));
    }
}
