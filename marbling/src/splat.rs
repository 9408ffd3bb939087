use crate::{color, data, material, pointer, render, rng, settings};
use color::Rgb;
use material::{Keyword, KeywordSet, Material};
use pointer::Pointer;
use render::{Context, DoubleFramebuffer, Quad, Uniform, UniformValue};
use settings::Mode;

use glow::HasContext;
use std::rc::Rc;

static SPLAT_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/splat.frag"));
static PAINT_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/paint.frag"));

// Brush radius divisors for the two regimes.
const FLOW_RADIUS_SCALE: f32 = 1.0 / 800.0;
const PAINT_RADIUS_SCALE: f32 = 1.0 / 100.0;
// The paint disk reaches this many radii from its centre.
const PAINT_DISK_REACH: f32 = 20.0;
// Pointer deltas are tiny fractions of the canvas.
const FORCE_SCALE: f32 = 1000.0;
// Random splats use brighter inks than colorful-mode pointers.
const RANDOM_INK_SCALE: f32 = 10.0;

/// A single deposit of momentum or ink. Applied once and forgotten.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Splat {
    pub point: [f32; 2],
    pub delta: [f32; 2],
    pub color: Rgb,
}

impl Splat {
    // Paused canvases take ink, not momentum.
    pub fn from_pointer(pointer: &Pointer, mode: Mode, splat_force: f32) -> Self {
        let scale = if mode.is_paused() {
            0.0
        } else {
            splat_force * FORCE_SCALE
        };

        Self {
            point: pointer.texcoord,
            delta: [pointer.delta[0] * scale, pointer.delta[1] * scale],
            color: pointer.color,
        }
    }
}

/// A burst of splats at random places with random inks and no momentum.
pub fn random_splats(count: u32) -> Vec<Splat> {
    (0..count)
        .map(|_| {
            let color = color::generate_color() * RANDOM_INK_SCALE;
            Splat {
                point: [rng::gen::<f32>(), rng::gen::<f32>()],
                delta: [0.0, 0.0],
                color,
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplatPlan {
    /// A Gaussian impulse added to velocity.
    Flow {
        point: [f32; 2],
        impulse: [f32; 2],
        radius: f32,
    },
    /// A hard disk of ink composited into the dye, with still water beneath.
    Paint {
        point: [f32; 2],
        color: Rgb,
        radius: f32,
    },
}

// Radii are in units of the short side.
pub fn correct_radius(radius: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio > 1.0 {
        radius * aspect_ratio
    } else {
        radius
    }
}

pub fn plan(splat: &Splat, mode: Mode, splat_radius: f32, aspect_ratio: f32) -> SplatPlan {
    match mode {
        Mode::Flowing => SplatPlan::Flow {
            point: splat.point,
            impulse: splat.delta,
            radius: correct_radius(splat_radius * FLOW_RADIUS_SCALE, aspect_ratio),
        },
        Mode::Painting => SplatPlan::Paint {
            point: splat.point,
            color: splat.color,
            radius: correct_radius(splat_radius * PAINT_RADIUS_SCALE, aspect_ratio),
        },
    }
}

fn offset(point: [f32; 2], texcoord: [f32; 2], aspect_ratio: f32) -> [f32; 2] {
    [
        (texcoord[0] - point[0]) * aspect_ratio,
        texcoord[1] - point[1],
    ]
}

impl SplatPlan {
    // Whether the texel at `texcoord` receives ink.
    pub fn covers(&self, texcoord: [f32; 2], aspect_ratio: f32) -> bool {
        match *self {
            SplatPlan::Flow { .. } => false,
            SplatPlan::Paint { point, radius, .. } => {
                let [x, y] = offset(point, texcoord, aspect_ratio);
                (x * x + y * y).sqrt() <= radius * PAINT_DISK_REACH
            }
        }
    }

    // The velocity added to the texel at `texcoord`.
    pub fn impulse_at(&self, texcoord: [f32; 2], aspect_ratio: f32) -> [f32; 2] {
        match *self {
            SplatPlan::Flow {
                point,
                impulse,
                radius,
            } => {
                let [x, y] = offset(point, texcoord, aspect_ratio);
                let falloff = (-(x * x + y * y) / radius).exp();
                [impulse[0] * falloff, impulse[1] * falloff]
            }
            SplatPlan::Paint { .. } => [0.0, 0.0],
        }
    }
}

pub struct Splatter {
    context: Context,
    quad: Rc<Quad>,
    flow_pass: Material,
    paint_pass: Material,
}

impl Splatter {
    pub fn new(context: &Context, quad: &Rc<Quad>) -> Self {
        Self {
            context: Rc::clone(context),
            quad: Rc::clone(quad),
            flow_pass: Material::new(context, "splat", (data::BASE_VERT_SHADER, SPLAT_FRAG_SHADER)),
            paint_pass: Material::new(context, "paint", (data::BASE_VERT_SHADER, PAINT_FRAG_SHADER)),
        }
    }

    pub fn apply(
        &self,
        plan: &SplatPlan,
        aspect_ratio: f32,
        velocity: &DoubleFramebuffer,
        dye: &DoubleFramebuffer,
    ) {
        unsafe { self.context.disable(glow::BLEND) };

        match *plan {
            SplatPlan::Flow {
                point,
                impulse,
                radius,
            } => {
                self.flow_pass.set_keywords(KeywordSet::EMPTY);
                self.draw(
                    &self.flow_pass,
                    velocity,
                    aspect_ratio,
                    point,
                    [impulse[0], impulse[1], 0.0],
                    radius,
                );
            }

            SplatPlan::Paint {
                point,
                color,
                radius,
            } => {
                self.paint_pass
                    .set_keywords(KeywordSet::EMPTY.with(Keyword::PaintVelocity));
                self.draw(
                    &self.paint_pass,
                    velocity,
                    aspect_ratio,
                    point,
                    [0.0; 3],
                    radius,
                );

                self.paint_pass.set_keywords(KeywordSet::EMPTY);
                self.draw(
                    &self.paint_pass,
                    dye,
                    aspect_ratio,
                    point,
                    color.to_array(),
                    radius,
                );
            }
        }
    }

    fn draw(
        &self,
        material: &Material,
        target: &DoubleFramebuffer,
        aspect_ratio: f32,
        point: [f32; 2],
        color: [f32; 3],
        radius: f32,
    ) {
        target.draw_to(&self.context, |current| {
            if let Some(program) = material.bind() {
                program.set_uniforms(&[
                    &Uniform {
                        name: "texelSize",
                        value: UniformValue::Vec2(current.texel_size()),
                    },
                    &Uniform {
                        name: "uTarget",
                        value: UniformValue::Texture2D(current.attach(0)),
                    },
                    &Uniform {
                        name: "aspectRatio",
                        value: UniformValue::Float(aspect_ratio),
                    },
                    &Uniform {
                        name: "point",
                        value: UniformValue::Vec2(point),
                    },
                    &Uniform {
                        name: "color",
                        value: UniformValue::Vec3(color),
                    },
                    &Uniform {
                        name: "radius",
                        value: UniformValue::Float(radius),
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
    use crate::pointer::PointerId;
    use approx::assert_relative_eq;

    const INK: Rgb = Rgb::new(0.0, 0.5, 1.0);

    fn splat_at(point: [f32; 2], delta: [f32; 2]) -> Splat {
        Splat {
            point,
            delta,
            color: INK,
        }
    }

    #[test]
    fn each_mode_yields_exactly_its_own_variant() {
        let splat = splat_at([0.5, 0.5], [1.0, 0.0]);

        match plan(&splat, Mode::Flowing, 0.1, 1.0) {
            flow @ SplatPlan::Flow { .. } => {
                assert!(flow.impulse_at(splat.point, 1.0)[0] > 0.0);
                assert!(!flow.covers(splat.point, 1.0));
            }
            other => panic!("unexpected {:?}", other),
        }

        match plan(&splat, Mode::Painting, 0.1, 1.0) {
            paint @ SplatPlan::Paint { .. } => {
                assert!(paint.covers(splat.point, 1.0));
                assert_eq!(paint.impulse_at(splat.point, 1.0), [0.0, 0.0]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn flow_never_inks_and_paint_never_pushes() {
        let splat = splat_at([0.5, 0.5], [3.0, -2.0]);
        let flow = plan(&splat, Mode::Flowing, 0.1, 1.0);
        let paint = plan(&splat, Mode::Painting, 0.1, 1.0);

        assert!(!flow.covers([0.5, 0.5], 1.0));
        assert_eq!(paint.impulse_at([0.5, 0.5], 1.0), [0.0, 0.0]);
        assert_eq!(flow.impulse_at([0.5, 0.5], 1.0), [3.0, -2.0]);
        assert!(paint.covers([0.5, 0.5], 1.0));
    }

    #[test]
    fn radii_use_their_regime_divisor() {
        let splat = splat_at([0.5, 0.5], [0.0, 0.0]);
        match plan(&splat, Mode::Flowing, 0.8, 1.0) {
            SplatPlan::Flow { radius, .. } => assert_relative_eq!(radius, 0.001, epsilon = 1e-7),
            other => panic!("unexpected {:?}", other),
        }
        match plan(&splat, Mode::Painting, 0.8, 1.0) {
            SplatPlan::Paint { radius, .. } => assert_relative_eq!(radius, 0.008, epsilon = 1e-7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn radius_grows_with_wide_canvases_only() {
        assert_relative_eq!(correct_radius(0.1, 2.0), 0.2);
        assert_relative_eq!(correct_radius(0.1, 0.5), 0.1);
    }

    #[test]
    fn the_paint_disk_has_a_hard_edge() {
        // radius 0.001 reaches 0.02 from the centre
        let paint = plan(&splat_at([0.5, 0.5], [0.0; 2]), Mode::Painting, 0.1, 1.0);
        assert!(paint.covers([0.519, 0.5], 1.0));
        assert!(!paint.covers([0.521, 0.5], 1.0));
    }

    #[test]
    fn repeated_flowing_splats_add_up_but_paint_does_not() {
        let splat = splat_at([0.5, 0.5], [1.5, -0.5]);
        let texcoord = [0.505, 0.5];

        let flow = plan(&splat, Mode::Flowing, 10.0, 1.0);
        let single = flow.impulse_at(texcoord, 1.0);
        let mut velocity = [0.0f32; 2];
        for _ in 0..2 {
            let impulse = flow.impulse_at(texcoord, 1.0);
            velocity[0] += impulse[0];
            velocity[1] += impulse[1];
        }
        assert!(single[0] > 0.0);
        assert_relative_eq!(velocity[0], 2.0 * single[0]);
        assert_relative_eq!(velocity[1], 2.0 * single[1]);

        let paint = plan(&splat, Mode::Painting, 10.0, 1.0);
        let covered = paint.covers(texcoord, 1.0);
        let once = color::cmyk_composite([0.0; 4], &INK, covered);
        let twice = color::cmyk_composite(once, &INK, covered);
        assert!(covered);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn painting_pointers_carry_no_momentum() {
        let mut pointer = Pointer::new(PointerId::Mouse);
        pointer.press(PointerId::Mouse, [0.5, 0.5], INK);
        pointer.move_to([0.6, 0.5], 1.0);

        let painted = Splat::from_pointer(&pointer, Mode::Painting, 10.0);
        assert_eq!(painted.delta, [0.0, 0.0]);
        assert_eq!(painted.color, INK);

        let flowed = Splat::from_pointer(&pointer, Mode::Flowing, 10.0);
        assert_relative_eq!(flowed.delta[0], pointer.delta[0] * 10_000.0);
    }

    #[test]
    fn random_bursts_have_no_momentum() {
        rng::init_from_seed(&Some("burst".to_string()));
        let splats = random_splats(12);
        assert_eq!(splats.len(), 12);
        for splat in splats {
            assert_eq!(splat.delta, [0.0, 0.0]);
            assert!((0.0..1.0).contains(&splat.point[0]));
            assert_relative_eq!(splat.color.max_component(), 1.5, epsilon = 1e-5);
        }
    }
}
