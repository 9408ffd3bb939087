use crate::render::{self, Context, Framebuffer, TextureFormat, TextureOptions};

use glow::HasContext;

// Some drivers report zero for limits they do not track.
const FALLBACK_MAX_SIZE: u32 = 4096;

/// A pair of dye (visual) and simulation grid resolutions. Both refer to the
/// short side of the drawing buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rung {
    pub dye: u32,
    pub sim: u32,
}

/// Candidate resolutions, best first.
pub static LADDER: [Rung; 3] = [
    Rung {
        dye: 1024,
        sim: 256,
    },
    Rung { dye: 512, sim: 128 },
    Rung { dye: 256, sim: 64 },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardwareLimits {
    pub max_texture_size: u32,
    pub max_renderbuffer_size: u32,
}

impl HardwareLimits {
    fn fits(&self, rung: &Rung) -> bool {
        let max = self.max_texture_size.min(self.max_renderbuffer_size);
        rung.dye <= max && rung.sim <= max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolutions {
    pub rung_index: usize,
    pub dye: u32,
    pub sim: u32,
}

impl Resolutions {
    pub fn from_rung(rung_index: usize) -> Self {
        let rung_index = rung_index.min(LADDER.len() - 1);
        let Rung { dye, sim } = LADDER[rung_index];
        Self {
            rung_index,
            dye,
            sim,
        }
    }

    pub fn is_lowest(&self) -> bool {
        self.rung_index == LADDER.len() - 1
    }

    pub fn step_down(&self) -> Self {
        Self::from_rung(self.rung_index + 1)
    }

    // Configured resolutions act as a ceiling on the rung.
    pub fn capped(&self, sim: u32, dye: u32) -> Self {
        Self {
            rung_index: self.rung_index,
            sim: self.sim.min(sim.max(1)),
            dye: self.dye.min(dye.max(1)),
        }
    }
}

/// Picks the highest rung the hardware can hold, then trades quality for
/// stability on constrained devices unless high resolution is forced.
pub fn choose_resolutions(
    limits: &HardwareLimits,
    linear_filtering: bool,
    mobile: bool,
    force_high_res: bool,
) -> Resolutions {
    let mut picked = LADDER
        .iter()
        .position(|rung| limits.fits(rung))
        .map(Resolutions::from_rung)
        .unwrap_or_else(|| Resolutions::from_rung(LADDER.len() - 1));

    if !force_high_res {
        if mobile {
            picked = picked.step_down();
        }

        if !linear_filtering {
            picked = picked.step_down();
        }
    }

    picked
}

/// The size of a grid whose short side is `resolution`, stretched along the
/// long side to match the drawing buffer's aspect ratio.
pub fn grid_size(resolution: u32, drawing_width: u32, drawing_height: u32) -> (u32, u32) {
    let drawing_width = drawing_width.max(1) as f32;
    let drawing_height = drawing_height.max(1) as f32;

    let mut aspect_ratio = drawing_width / drawing_height;
    if aspect_ratio < 1.0 {
        aspect_ratio = 1.0 / aspect_ratio;
    }

    let min = resolution.max(1);
    let max = ((resolution as f32 * aspect_ratio).round() as u32).max(1);

    if drawing_width > drawing_height {
        (max, min)
    } else {
        (min, max)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Capabilities {
    pub limits: HardwareLimits,
    pub linear_filtering: bool,
    pub rgba: TextureFormat,
    pub rg: TextureFormat,
    pub r: TextureFormat,
}

impl Capabilities {
    pub fn detect(context: &Context) -> Result<Self, render::Problem> {
        let (max_texture_size, max_renderbuffer_size) = unsafe {
            (
                context.get_parameter_i32(glow::MAX_TEXTURE_SIZE),
                context.get_parameter_i32(glow::MAX_RENDERBUFFER_SIZE),
            )
        };

        let extensions = context.supported_extensions();
        let linear_filtering = extensions.contains("OES_texture_float_linear")
            || extensions.contains("GL_OES_texture_float_linear")
            || extensions.contains("GL_ARB_texture_float")
            || !cfg!(target_arch = "wasm32");

        let rgba = supported_format(context, TextureFormat::RGBA16F)?;
        let rg = supported_format(context, TextureFormat::RG16F)?;
        let r = supported_format(context, TextureFormat::R16F)?;

        let capabilities = Self {
            limits: HardwareLimits {
                max_texture_size: positive_or_fallback(max_texture_size),
                max_renderbuffer_size: positive_or_fallback(max_renderbuffer_size),
            },
            linear_filtering,
            rgba,
            rg,
            r,
        };

        log::debug!("{:?}", capabilities);
        if !linear_filtering {
            log::warn!("Linear filtering of float textures is not supported. Filtering manually.");
        }

        Ok(capabilities)
    }

    pub fn filter(&self) -> u32 {
        if self.linear_filtering {
            glow::LINEAR
        } else {
            glow::NEAREST
        }
    }
}

fn positive_or_fallback(value: i32) -> u32 {
    if value > 0 {
        value as u32
    } else {
        FALLBACK_MAX_SIZE
    }
}

// Walks R -> RG -> RGBA until a format can be rendered to.
fn supported_format(
    context: &Context,
    format: TextureFormat,
) -> Result<TextureFormat, render::Problem> {
    let mut candidate = Some(format);

    while let Some(format) = candidate {
        if Framebuffer::new(context, 4, 4, TextureOptions::new(format, glow::NEAREST)).is_ok() {
            return Ok(format);
        }

        log::debug!("Cannot render to {:#x}", format.internal_format);
        candidate = format.wider();
    }

    Err(render::Problem::UnsupportedTextureFormat)
}

// Frames slower than this (30fps) count against the current rung.
pub const SLOW_FRAME: f32 = 1.0 / 30.0;
// Gaps longer than this are suspensions (a hidden tab, a debugger), not load.
const SUSPENSION: f32 = 0.25;
const SMOOTHING: f32 = 0.1;

/// A step down the ladder and the smoothed frame time that triggered it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Downgrade {
    pub resolutions: Resolutions,
    // Seconds.
    pub average: f32,
}

/// Watches smoothed frame durations and steps the resolution down when the
/// device cannot keep up. It never steps back up.
pub struct PerformanceMonitor {
    average: f32,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self {
            average: 1.0 / 60.0,
        }
    }
}

impl PerformanceMonitor {
    pub fn average(&self) -> f32 {
        self.average
    }

    // Feeds one raw frame duration in seconds. Returns the rung to switch to,
    // if any.
    pub fn observe(&mut self, frame_time: f32, current: &Resolutions) -> Option<Downgrade> {
        if !(0.0..=SUSPENSION).contains(&frame_time) {
            return None;
        }

        self.average += SMOOTHING * (frame_time - self.average);

        if self.average > SLOW_FRAME && !current.is_lowest() {
            let average = self.average;
            *self = Self::default();
            Some(Downgrade {
                resolutions: current.step_down(),
                average,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    const AMPLE: HardwareLimits = HardwareLimits {
        max_texture_size: 16384,
        max_renderbuffer_size: 16384,
    };

    fn rung(resolutions: Resolutions) -> (u32, u32) {
        (resolutions.dye, resolutions.sim)
    }

    #[test]
    fn ample_hardware_gets_the_top_rung() {
        assert_eq!(rung(choose_resolutions(&AMPLE, true, false, false)), (1024, 256));
    }

    #[test]
    fn mobile_and_filtering_each_step_down_once() {
        assert_eq!(rung(choose_resolutions(&AMPLE, true, true, false)), (512, 128));
        assert_eq!(rung(choose_resolutions(&AMPLE, false, false, false)), (512, 128));
        assert_eq!(rung(choose_resolutions(&AMPLE, false, true, false)), (256, 64));
    }

    #[test]
    fn forcing_high_resolution_cancels_downgrades() {
        for (linear, mobile) in [(true, false), (false, false), (true, true), (false, true)] {
            assert_eq!(
                rung(choose_resolutions(&AMPLE, linear, mobile, true)),
                (1024, 256)
            );
        }
    }

    #[test]
    fn small_limits_skip_rungs_that_do_not_fit() {
        let limits = HardwareLimits {
            max_texture_size: 4096,
            max_renderbuffer_size: 768,
        };
        assert_eq!(rung(choose_resolutions(&limits, true, false, false)), (512, 128));
    }

    #[test]
    fn never_goes_below_the_last_rung() {
        let tiny = HardwareLimits {
            max_texture_size: 128,
            max_renderbuffer_size: 128,
        };
        let picked = choose_resolutions(&tiny, false, true, false);
        assert_eq!(rung(picked), (256, 64));
        assert!(picked.is_lowest());
    }

    #[test]
    fn configured_resolutions_cap_the_rung() {
        let capped = Resolutions::from_rung(0).capped(128, 2048);
        assert_eq!(rung(capped), (1024, 128));
        assert_eq!(capped.rung_index, 0);
    }

    #[test]
    fn grid_follows_the_drawing_buffer_orientation() {
        assert_eq!(grid_size(256, 1920, 1080), (455, 256));
        assert_eq!(grid_size(256, 1080, 1920), (256, 455));
        assert_eq!(grid_size(128, 800, 800), (128, 128));
    }

    #[test]
    fn sustained_slow_frames_step_down_once() {
        let mut monitor = PerformanceMonitor::default();
        let current = Resolutions::from_rung(0);

        let downgrade = (0..100).find_map(|_| monitor.observe(0.05, &current));
        assert_eq!(
            downgrade.map(|downgrade| downgrade.resolutions),
            Some(Resolutions::from_rung(1))
        );
        assert_relative_eq!(monitor.average(), 1.0 / 60.0);
    }

    #[test]
    fn a_downgrade_reports_the_smoothed_average() {
        let mut monitor = PerformanceMonitor::default();
        let current = Resolutions::from_rung(0);

        let mut averages = Vec::new();
        let downgrade = (0..100).find_map(|_| {
            let downgrade = monitor.observe(0.05, &current);
            averages.push(monitor.average());
            downgrade
        });

        let downgrade = downgrade.expect("slow frames should step down");
        assert!(downgrade.average > SLOW_FRAME);
        assert!(downgrade.average < 0.05);
        // The frame that tripped the threshold is the one that reset the monitor.
        let before = averages[averages.len() - 2];
        assert_relative_eq!(
            downgrade.average,
            before + SMOOTHING * (0.05 - before),
            epsilon = 1e-6
        );
    }

    #[test]
    fn fast_frames_never_downgrade() {
        let mut monitor = PerformanceMonitor::default();
        let current = Resolutions::from_rung(0);
        assert!((0..1000).all(|_| monitor.observe(1.0 / 60.0, &current).is_none()));
    }

    #[test]
    fn suspensions_are_ignored() {
        let mut monitor = PerformanceMonitor::default();
        let current = Resolutions::from_rung(0);
        assert_eq!(monitor.observe(5.0, &current), None);
        assert_relative_eq!(monitor.average(), 1.0 / 60.0);
    }

    #[test]
    fn lowest_rung_is_never_downgraded() {
        let mut monitor = PerformanceMonitor::default();
        let current = Resolutions::from_rung(LADDER.len() - 1);
        assert!((0..100).all(|_| monitor.observe(0.2, &current).is_none()));
    }
}
