use crate::{capabilities, data, material, pool, render, settings};
use capabilities::{grid_size, Capabilities, Resolutions};
use material::{Keyword, KeywordSet, Material};
use pool::TargetPool;
use render::{
    Context, DoubleFramebuffer, Framebuffer, Quad, TextureOptions, Uniform, UniformValue,
};
use settings::Settings;

use glow::HasContext;
use std::rc::Rc;

static CLEAR_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/clear.frag"));
static CURL_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/curl.frag"));
static VORTICITY_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/vorticity.frag"));
static DIVERGENCE_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/divergence.frag"));
static PRESSURE_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/pressure.frag"));
static GRADIENT_SUBTRACT_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/gradient_subtract.frag"));
static ADVECTION_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/advection.frag"));

/// One full-screen pass of the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    Curl,
    Vorticity,
    Divergence,
    // Decays last frame's pressure, which seeds the Jacobi solve.
    ClearPressure,
    // The n-th Jacobi iteration.
    Pressure(u32),
    GradientSubtract,
    AdvectVelocity,
    AdvectDye,
}

pub fn solver_passes(pressure_iterations: u32) -> impl Iterator<Item = Pass> {
    [Pass::Curl, Pass::Vorticity, Pass::Divergence, Pass::ClearPressure]
        .into_iter()
        .chain((0..pressure_iterations).map(Pass::Pressure))
        .chain([Pass::GradientSubtract, Pass::AdvectVelocity, Pass::AdvectDye])
}

pub struct Fluid {
    context: Context,
    settings: Rc<Settings>,
    quad: Rc<Quad>,
    pool: Rc<TargetPool>,
    capabilities: Capabilities,

    velocity: DoubleFramebuffer,
    dye: DoubleFramebuffer,
    divergence: Framebuffer,
    curl: Framebuffer,
    pressure: DoubleFramebuffer,

    clear_pass: Material,
    curl_pass: Material,
    vorticity_pass: Material,
    divergence_pass: Material,
    pressure_pass: Material,
    gradient_subtract_pass: Material,
    advection_pass: Material,
}

impl Fluid {
    pub fn new(
        context: &Context,
        quad: &Rc<Quad>,
        pool: &Rc<TargetPool>,
        capabilities: &Capabilities,
        resolutions: &Resolutions,
        drawing_size: (u32, u32),
        settings: &Rc<Settings>,
    ) -> Result<Self, render::Problem> {
        let (sim_width, sim_height) = grid_size(resolutions.sim, drawing_size.0, drawing_size.1);
        let (dye_width, dye_height) = grid_size(resolutions.dye, drawing_size.0, drawing_size.1);
        log::debug!(
            "Simulation grid {}x{}, dye {}x{}",
            sim_width,
            sim_height,
            dye_width,
            dye_height
        );

        let filter = capabilities.filter();
        let velocity = pool.create_double_field(
            sim_width,
            sim_height,
            TextureOptions::new(capabilities.rg, filter),
        )?;
        let dye = pool.create_double_field(
            dye_width,
            dye_height,
            TextureOptions::new(capabilities.rgba, filter),
        )?;
        let (divergence, curl, pressure) =
            create_auxiliary_fields(pool, capabilities, sim_width, sim_height)?;

        let material = |label, fragment| {
            Material::new(context, label, (data::BASE_VERT_SHADER, fragment))
        };

        let advection_keywords =
            KeywordSet::EMPTY.with_if(Keyword::ManualFiltering, !capabilities.linear_filtering);

        Ok(Self {
            context: Rc::clone(context),
            settings: Rc::clone(settings),
            quad: Rc::clone(quad),
            pool: Rc::clone(pool),
            capabilities: *capabilities,

            velocity,
            dye,
            divergence,
            curl,
            pressure,

            clear_pass: material("clear", CLEAR_FRAG_SHADER),
            curl_pass: material("curl", CURL_FRAG_SHADER),
            vorticity_pass: material("vorticity", VORTICITY_FRAG_SHADER),
            divergence_pass: material("divergence", DIVERGENCE_FRAG_SHADER),
            pressure_pass: material("pressure", PRESSURE_FRAG_SHADER),
            gradient_subtract_pass: material("gradient subtract", GRADIENT_SUBTRACT_FRAG_SHADER),
            advection_pass: material("advection", ADVECTION_FRAG_SHADER)
                .with_keywords(advection_keywords),
        })
    }

    pub fn update(&mut self, settings: &Rc<Settings>) {
        self.settings = Rc::clone(settings);
    }

    // Velocity and dye keep their contents. The auxiliary fields are
    // recomputed from velocity every step, so they start over.
    pub fn resize(
        &mut self,
        resolutions: &Resolutions,
        drawing_size: (u32, u32),
    ) -> Result<(), render::Problem> {
        let (sim_width, sim_height) = grid_size(resolutions.sim, drawing_size.0, drawing_size.1);
        let (dye_width, dye_height) = grid_size(resolutions.dye, drawing_size.0, drawing_size.1);

        unsafe { self.context.disable(glow::BLEND) };

        self.pool
            .resize_double_field(&mut self.dye, dye_width, dye_height)?;
        self.pool
            .resize_double_field(&mut self.velocity, sim_width, sim_height)?;

        let (divergence, curl, pressure) =
            create_auxiliary_fields(&self.pool, &self.capabilities, sim_width, sim_height)?;
        self.divergence = divergence;
        self.curl = curl;
        self.pressure = pressure;

        Ok(())
    }

    pub fn velocity(&self) -> &DoubleFramebuffer {
        &self.velocity
    }

    pub fn dye(&self) -> &DoubleFramebuffer {
        &self.dye
    }

    pub fn step(&self, timestep: f32) {
        unsafe { self.context.disable(glow::BLEND) };

        for pass in solver_passes(self.settings.pressure_iterations) {
            self.run(pass, timestep);
        }
    }

    fn run(&self, pass: Pass, timestep: f32) {
        match pass {
            Pass::Curl => self.compute_curl(),
            Pass::Vorticity => self.confine_vorticity(timestep),
            Pass::Divergence => self.compute_divergence(),
            Pass::ClearPressure => self.clear_pressure(),
            Pass::Pressure(_) => self.solve_pressure(),
            Pass::GradientSubtract => self.subtract_gradient(),
            Pass::AdvectVelocity => self.advect_velocity(timestep),
            Pass::AdvectDye => self.advect_dye(timestep),
        }
    }

    fn texel_size(&self) -> Uniform {
        Uniform {
            name: "texelSize",
            value: UniformValue::Vec2(self.velocity.texel_size()),
        }
    }

    fn compute_curl(&self) {
        self.curl.draw_to(&self.context, || {
            if let Some(program) = self.curl_pass.bind() {
                program.set_uniforms(&[
                    &self.texel_size(),
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(self.velocity.current().attach(0)),
                    },
                ]);
                self.quad.draw();
            }
        });
    }

    fn confine_vorticity(&self, timestep: f32) {
        self.velocity.draw_to(&self.context, |velocity| {
            if let Some(program) = self.vorticity_pass.bind() {
                program.set_uniforms(&[
                    &self.texel_size(),
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(velocity.attach(0)),
                    },
                    &Uniform {
                        name: "uCurl",
                        value: UniformValue::Texture2D(self.curl.attach(1)),
                    },
                    &Uniform {
                        name: "curl",
                        value: UniformValue::Float(self.settings.curl),
                    },
                    &Uniform {
                        name: "dt",
                        value: UniformValue::Float(timestep),
                    },
                ]);
                self.quad.draw();
            }
        });
    }

    fn compute_divergence(&self) {
        self.divergence.draw_to(&self.context, || {
            if let Some(program) = self.divergence_pass.bind() {
                program.set_uniforms(&[
                    &self.texel_size(),
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(self.velocity.current().attach(0)),
                    },
                ]);
                self.quad.draw();
            }
        });
    }

    fn clear_pressure(&self) {
        self.pressure.draw_to(&self.context, |pressure| {
            if let Some(program) = self.clear_pass.bind() {
                program.set_uniforms(&[
                    &self.texel_size(),
                    &Uniform {
                        name: "uTexture",
                        value: UniformValue::Texture2D(pressure.attach(0)),
                    },
                    &Uniform {
                        name: "value",
                        value: UniformValue::Float(self.settings.pressure),
                    },
                ]);
                self.quad.draw();
            }
        });
    }

    fn solve_pressure(&self) {
        self.pressure.draw_to(&self.context, |pressure| {
            if let Some(program) = self.pressure_pass.bind() {
                program.set_uniforms(&[
                    &self.texel_size(),
                    &Uniform {
                        name: "uDivergence",
                        value: UniformValue::Texture2D(self.divergence.attach(0)),
                    },
                    &Uniform {
                        name: "uPressure",
                        value: UniformValue::Texture2D(pressure.attach(1)),
                    },
                ]);
                self.quad.draw();
            }
        });
    }

    fn subtract_gradient(&self) {
        self.velocity.draw_to(&self.context, |velocity| {
            if let Some(program) = self.gradient_subtract_pass.bind() {
                program.set_uniforms(&[
                    &self.texel_size(),
                    &Uniform {
                        name: "uPressure",
                        value: UniformValue::Texture2D(self.pressure.current().attach(0)),
                    },
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(velocity.attach(1)),
                    },
                ]);
                self.quad.draw();
            }
        });
    }

    fn advect_velocity(&self, timestep: f32) {
        self.velocity.draw_to(&self.context, |velocity| {
            if let Some(program) = self.advection_pass.bind() {
                let unit = velocity.attach(0);
                program.set_uniforms(&[
                    &self.texel_size(),
                    &Uniform {
                        name: "dyeTexelSize",
                        value: UniformValue::Vec2(velocity.texel_size()),
                    },
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(unit),
                    },
                    &Uniform {
                        name: "uSource",
                        value: UniformValue::Texture2D(unit),
                    },
                    &Uniform {
                        name: "dt",
                        value: UniformValue::Float(timestep),
                    },
                    &Uniform {
                        name: "dissipation",
                        value: UniformValue::Float(self.settings.velocity_dissipation),
                    },
                ]);
                self.quad.draw();
            }
        });
    }

    fn advect_dye(&self, timestep: f32) {
        self.dye.draw_to(&self.context, |dye| {
            if let Some(program) = self.advection_pass.bind() {
                program.set_uniforms(&[
                    &self.texel_size(),
                    &Uniform {
                        name: "dyeTexelSize",
                        value: UniformValue::Vec2(dye.texel_size()),
                    },
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(self.velocity.current().attach(0)),
                    },
                    &Uniform {
                        name: "uSource",
                        value: UniformValue::Texture2D(dye.attach(1)),
                    },
                    &Uniform {
                        name: "dt",
                        value: UniformValue::Float(timestep),
                    },
                    &Uniform {
                        name: "dissipation",
                        value: UniformValue::Float(self.settings.density_dissipation),
                    },
                ]);
                self.quad.draw();
            }
        });
    }
}

fn create_auxiliary_fields(
    pool: &TargetPool,
    capabilities: &Capabilities,
    width: u32,
    height: u32,
) -> Result<(Framebuffer, Framebuffer, DoubleFramebuffer), render::Problem> {
    let nearest = TextureOptions::new(capabilities.r, glow::NEAREST);

    Ok((
        pool.create_field(width, height, nearest)?,
        pool.create_field(width, height, nearest)?,
        pool.create_double_field(width, height, nearest)?,
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plan_runs_in_a_fixed_order() {
        let passes: Vec<Pass> = solver_passes(2).collect();
        assert_eq!(
            passes,
            vec![
                Pass::Curl,
                Pass::Vorticity,
                Pass::Divergence,
                Pass::ClearPressure,
                Pass::Pressure(0),
                Pass::Pressure(1),
                Pass::GradientSubtract,
                Pass::AdvectVelocity,
                Pass::AdvectDye,
            ]
        );
    }

    #[test]
    fn exactly_n_jacobi_iterations() {
        for iterations in [0, 1, 20, 50] {
            let jacobi: Vec<u32> = solver_passes(iterations)
                .filter_map(|pass| match pass {
                    Pass::Pressure(n) => Some(n),
                    _ => None,
                })
                .collect();
            assert_eq!(jacobi, (0..iterations).collect::<Vec<_>>());
        }
    }

    #[test]
    fn pressure_is_cleared_before_it_is_solved() {
        let passes: Vec<Pass> = solver_passes(20).collect();
        let clear = passes.iter().position(|p| *p == Pass::ClearPressure);
        let first_solve = passes.iter().position(|p| matches!(p, Pass::Pressure(_)));
        let subtract = passes.iter().position(|p| *p == Pass::GradientSubtract);
        assert!(clear < first_solve && first_solve < subtract);
    }
}
