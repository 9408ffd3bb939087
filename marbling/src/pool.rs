use crate::{data, material, render};
use material::Material;
use render::{Context, DoubleFramebuffer, Framebuffer, Quad, TextureOptions, Uniform, UniformValue};

use std::rc::Rc;

static COPY_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/copy.frag"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resize {
    Keep,
    Reallocate,
}

pub fn plan_resize(current: (u32, u32), width: u32, height: u32) -> Resize {
    if current == (width, height) {
        Resize::Keep
    } else {
        Resize::Reallocate
    }
}

/// Allocates fields and carries their contents across size changes.
///
/// Allocation clobbers texture and framebuffer bindings. Nothing relies on
/// those persisting between calls.
pub struct TargetPool {
    context: Context,
    quad: Rc<Quad>,
    copy: Material,
}

impl TargetPool {
    pub fn new(context: &Context, quad: &Rc<Quad>) -> Self {
        Self {
            context: Rc::clone(context),
            quad: Rc::clone(quad),
            copy: Material::new(context, "copy", (data::BASE_VERT_SHADER, COPY_FRAG_SHADER)),
        }
    }

    pub fn create_field(
        &self,
        width: u32,
        height: u32,
        options: TextureOptions,
    ) -> Result<Framebuffer, render::Problem> {
        let field = Framebuffer::new(&self.context, width, height, options)?;
        field.zero_out();
        Ok(field)
    }

    pub fn create_double_field(
        &self,
        width: u32,
        height: u32,
        options: TextureOptions,
    ) -> Result<DoubleFramebuffer, render::Problem> {
        Ok(DoubleFramebuffer::new(
            self.create_field(width, height, options)?,
            self.create_field(width, height, options)?,
        ))
    }

    // Resamples the old contents into a field of the new size. The old field
    // is released once the copy is done.
    pub fn resize_field(
        &self,
        field: &mut Framebuffer,
        width: u32,
        height: u32,
    ) -> Result<(), render::Problem> {
        if plan_resize((field.width, field.height), width, height) == Resize::Keep {
            return Ok(());
        }

        log::debug!(
            "Resizing field {}x{} -> {}x{}",
            field.width,
            field.height,
            width,
            height
        );

        let resized = self.create_field(width, height, field.options)?;
        self.copy(field, &resized);
        *field = resized;
        Ok(())
    }

    // Only the read side survives. The write side is always overwritten
    // before it is read.
    pub fn resize_double_field(
        &self,
        field: &mut DoubleFramebuffer,
        width: u32,
        height: u32,
    ) -> Result<(), render::Problem> {
        if plan_resize((field.width(), field.height()), width, height) == Resize::Keep {
            return Ok(());
        }

        let options = field.current().options;
        let read = self.create_field(width, height, options)?;
        self.copy(&field.current(), &read);
        let write = self.create_field(width, height, options)?;

        *field = DoubleFramebuffer::new(read, write);
        Ok(())
    }

    pub fn copy(&self, source: &Framebuffer, target: &Framebuffer) {
        target.draw_to(&self.context, || {
            if let Some(program) = self.copy.bind() {
                program.set_uniforms(&[
                    &Uniform {
                        name: "texelSize",
                        value: UniformValue::Vec2(target.texel_size()),
                    },
                    &Uniform {
                        name: "uTexture",
                        value: UniformValue::Texture2D(source.attach(0)),
                    },
                ]);
                self.quad.draw();
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unchanged_dimensions_keep_the_field() {
        assert_eq!(plan_resize((455, 256), 455, 256), Resize::Keep);
    }

    #[test]
    fn any_changed_dimension_reallocates() {
        assert_eq!(plan_resize((455, 256), 256, 455), Resize::Reallocate);
        assert_eq!(plan_resize((455, 256), 455, 255), Resize::Reallocate);
    }
}
