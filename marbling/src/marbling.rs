use crate::{
    capabilities, capture, clock, color, drawer, events, fluid, pointer, pool, render, rng,
    settings, splat,
};
use capabilities::{Capabilities, PerformanceMonitor, Resolutions};
use capture::Capture;
use clock::{ColorTimer, FrameClock};
use color::{Palette, Rgb};
use drawer::{Drawer, Target};
use events::{Event, EventBus};
use fluid::Fluid;
use pointer::{CanvasGeometry, Pointers, Touch};
use pool::TargetPool;
use render::Quad;
use settings::{Mode, Settings, SketchFilter};
use splat::{Splat, Splatter};

use glow::HasContext;
use std::rc::Rc;
use thiserror::Error;

// Random bursts queue between this many splats and 20 more.
const MIN_RANDOM_SPLATS: u32 = 5;
const EXTRA_RANDOM_SPLATS: u32 = 20;

/// Facts about the host that the drawing context can't tell us.
#[derive(Clone, Copy, Debug, Default)]
pub struct Environment {
    pub mobile: bool,
    // Skip the quality trade-offs for constrained devices.
    pub force_high_res: bool,
}

// Whether a URL query string such as `?hires&seed=4` names `key`, with or
// without a value.
pub fn query_has_flag(search: &str, key: &str) -> bool {
    search
        .trim_start_matches('?')
        .split('&')
        .map(|pair| pair.split_once('=').map_or(pair, |(name, _)| name))
        .any(|name| name == key)
}

/// A touch sample in page coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchPoint {
    pub id: i64,
    pub client_x: f32,
    pub client_y: f32,
}

pub struct Marbling {
    settings: Rc<Settings>,
    resolutions: Resolutions,

    fluid: Fluid,
    splatter: Splatter,
    drawer: Drawer,

    canvas: CanvasGeometry,
    pointers: Pointers,
    // Each entry is a burst of random splats, applied one burst per frame.
    splat_stack: Vec<u32>,
    events: EventBus,

    clock: FrameClock,
    color_timer: ColorTimer,
    monitor: PerformanceMonitor,
    pending_resize: Option<(u32, u32)>,
}

impl Marbling {
    pub fn new(
        context: &render::Context,
        drawing_width: u32,
        drawing_height: u32,
        settings: &Rc<Settings>,
        environment: Environment,
    ) -> Result<Marbling, Problem> {
        log::info!("🎨 Initialising Marbling");

        let settings = Rc::new((**settings).clone().clamped());
        rng::init_from_seed(&settings.seed);

        let capabilities = Capabilities::detect(context)?;
        let resolutions = capabilities::choose_resolutions(
            &capabilities.limits,
            capabilities.linear_filtering,
            environment.mobile,
            environment.force_high_res,
        )
        .capped(settings.sim_resolution, settings.dye_resolution);
        log::info!(
            "Simulating at {} with dye at {}",
            resolutions.sim,
            resolutions.dye
        );

        unsafe {
            context.disable(glow::DEPTH_TEST);
        }

        let drawing_size = (drawing_width, drawing_height);
        let quad = Rc::new(Quad::new(context)?);
        let pool = Rc::new(TargetPool::new(context, &quad));

        let fluid = Fluid::new(
            context,
            &quad,
            &pool,
            &capabilities,
            &resolutions,
            drawing_size,
            &settings,
        )?;
        let splatter = Splatter::new(context, &quad);
        let drawer = Drawer::new(context, &quad, &pool, &capabilities, drawing_size, &settings)?;

        Ok(Marbling {
            settings,
            resolutions,

            fluid,
            splatter,
            drawer,

            canvas: CanvasGeometry::from_device_size(drawing_width, drawing_height),
            pointers: Pointers::default(),
            splat_stack: Vec::new(),
            events: EventBus::default(),

            clock: FrameClock::default(),
            color_timer: ColorTimer::default(),
            monitor: PerformanceMonitor::default(),
            pending_resize: None,
        })
    }

    pub fn settings(&self) -> &Rc<Settings> {
        &self.settings
    }

    pub fn update(&mut self, settings: &Rc<Settings>) {
        let settings = Rc::new((**settings).clone().clamped());
        let previous = std::mem::replace(&mut self.settings, Rc::clone(&settings));

        self.fluid.update(&settings);
        self.drawer.update(&settings);

        if (previous.sim_resolution, previous.dye_resolution)
            != (settings.sim_resolution, settings.dye_resolution)
        {
            let resolutions = Resolutions::from_rung(self.resolutions.rung_index)
                .capped(settings.sim_resolution, settings.dye_resolution);
            self.change_resolutions(resolutions);
        }

        if previous.mode != settings.mode {
            self.events.emit(Event::ModeChanged {
                mode: settings.mode,
            });
        }

        if previous.fore_color != settings.fore_color {
            self.events.emit(Event::ColorChanged {
                color: settings.fore_color,
            });
        }
    }

    fn modify_settings<F>(&mut self, modify: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = (*self.settings).clone();
        modify(&mut settings);
        self.update(&Rc::new(settings));
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.modify_settings(|settings| settings.mode = mode);
    }

    pub fn toggle_mode(&mut self) {
        let mode = self.settings.mode.toggle();
        self.set_mode(mode);
    }

    pub fn set_fore_color(&mut self, color: Rgb) {
        self.modify_settings(|settings| settings.fore_color = color);
    }

    pub fn set_back_color(&mut self, color: Rgb) {
        self.modify_settings(|settings| settings.back_color = color);
    }

    // Switching palettes keeps the current ink if the new palette has it.
    pub fn set_palette(&mut self, palette: Palette) {
        self.modify_settings(|settings| {
            settings.fore_color = palette.select(&settings.fore_color);
            settings.palette = palette;
        });
    }

    pub fn set_brush_radius(&mut self, radius: f32) {
        self.modify_settings(|settings| settings.splat_radius = radius);
    }

    pub fn set_colorful(&mut self, colorful: bool) {
        self.modify_settings(|settings| settings.colorful = colorful);
    }

    pub fn set_sketch(&mut self, sketch: SketchFilter) {
        self.modify_settings(|settings| settings.sketch = sketch);
    }

    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&Event) + 'static,
    {
        self.events.subscribe(callback);
    }

    // Takes effect at the start of the next frame.
    pub fn resize(&mut self, drawing_width: u32, drawing_height: u32) {
        self.pending_resize = Some((drawing_width, drawing_height));
    }

    // Where the canvas sits on the page. Hosts that scale the canvas with
    // CSS call this after layout changes.
    pub fn set_canvas_geometry(&mut self, canvas: CanvasGeometry) {
        self.canvas = canvas;
    }

    pub fn mouse_down(&mut self, client_x: f32, client_y: f32) {
        let texcoord = self.canvas.texcoord(client_x, client_y);
        self.pointers.mouse_down(texcoord, self.settings.fore_color);
    }

    pub fn mouse_move(&mut self, client_x: f32, client_y: f32) {
        let texcoord = self.canvas.texcoord(client_x, client_y);
        self.pointers
            .mouse_move(texcoord, self.canvas.aspect_ratio());
    }

    pub fn mouse_up(&mut self) {
        if let Some(event) = self.pointers.mouse_up() {
            self.events.emit(event);
        }
    }

    pub fn touch_start(&mut self, touches: &[TouchPoint]) {
        let touches = self.to_touches(touches);
        self.pointers
            .touch_start(&touches, self.settings.fore_color);
    }

    pub fn touch_move(&mut self, touches: &[TouchPoint]) {
        let touches = self.to_touches(touches);
        self.pointers
            .touch_move(&touches, self.canvas.aspect_ratio());
    }

    pub fn touch_end(&mut self, ids: &[i64]) {
        for event in self.pointers.touch_end(ids) {
            self.events.emit(event);
        }
    }

    fn to_touches(&self, touches: &[TouchPoint]) -> Vec<Touch> {
        touches
            .iter()
            .map(|touch| Touch {
                id: touch.id,
                texcoord: self.canvas.texcoord(touch.client_x, touch.client_y),
            })
            .collect()
    }

    pub fn request_splats(&mut self, count: u32) {
        self.splat_stack.push(count);
        self.events.emit(Event::SplatRequested { count });
    }

    pub fn request_random_splats(&mut self) {
        let count = MIN_RANDOM_SPLATS + rng::gen_range(0..EXTRA_RANDOM_SPLATS);
        self.request_splats(count);
    }

    // Renders the current canvas offscreen at the capture resolution.
    pub fn capture(&mut self, timestamp: f64) -> Result<Capture, Problem> {
        self.events.emit(Event::ExportRequested);
        self.drawer.capture(&self.fluid.dye().current(), timestamp)
    }

    pub fn animate(&mut self, timestamp: f64) {
        let tick = self.clock.tick(timestamp);

        if let Some((width, height)) = self.pending_resize.take() {
            if let Err(problem) = self.apply_resize(width, height) {
                log::error!("Cannot resize to {}x{}: {}", width, height, problem);
            }
        }

        if self.settings.adaptive_resolution {
            if let Some(frame_time) = tick.frame_time {
                if let Some(downgrade) = self.monitor.observe(frame_time, &self.resolutions) {
                    log::warn!(
                        "Frames average {:.1}ms, lowering resolution",
                        1000.0 * downgrade.average
                    );
                    let resolutions = downgrade
                        .resolutions
                        .capped(self.settings.sim_resolution, self.settings.dye_resolution);
                    self.change_resolutions(resolutions);
                }
            }
        }

        self.update_colors(tick.timestep);
        self.apply_inputs();

        if !self.settings.mode.is_paused() {
            self.fluid.step(tick.timestep);
        }

        self.render();
    }

    pub fn render(&self) {
        self.drawer
            .render(&self.fluid.dye().current(), Target::Screen);
    }

    fn apply_resize(&mut self, width: u32, height: u32) -> Result<(), Problem> {
        self.canvas = self.canvas.with_device_size(width, height);
        self.drawer.resize(width, height)?;
        self.fluid.resize(&self.resolutions, (width, height))?;
        Ok(())
    }

    fn change_resolutions(&mut self, resolutions: Resolutions) {
        self.resolutions = resolutions;

        let drawing_size = (self.drawer.drawing_width, self.drawer.drawing_height);
        if let Err(problem) = self.fluid.resize(&resolutions, drawing_size) {
            log::error!("Cannot change resolution: {}", problem);
        }
    }

    fn update_colors(&mut self, timestep: f32) {
        if !self.settings.colorful {
            return;
        }

        if self
            .color_timer
            .advance(timestep, self.settings.color_update_speed)
        {
            self.pointers.recolor(color::generate_color);
        }
    }

    fn apply_inputs(&mut self) {
        if let Some(count) = self.splat_stack.pop() {
            for splat in splat::random_splats(count) {
                self.splat(&splat);
            }
        }

        let mode = self.settings.mode;
        for pointer in self.pointers.take_moved() {
            let splat = Splat::from_pointer(&pointer, mode, self.settings.splat_force);
            self.splat(&splat);
        }
    }

    fn splat(&self, splat: &Splat) {
        let aspect_ratio = self.drawer.aspect_ratio();
        let plan = splat::plan(
            splat,
            self.settings.mode,
            self.settings.splat_radius,
            aspect_ratio,
        );
        self.splatter
            .apply(&plan, aspect_ratio, self.fluid.velocity(), self.fluid.dye());
    }
}

#[derive(Error, Debug)]
pub enum Problem {
    #[error(transparent)]
    Render(#[from] render::Problem),

    #[error(transparent)]
    Capture(#[from] capture::Problem),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn query_flags_match_whole_keys() {
        assert!(query_has_flag("?hires", "hires"));
        assert!(query_has_flag("?seed=4&hires", "hires"));
        assert!(query_has_flag("?hires=1", "hires"));
        assert!(!query_has_flag("", "hires"));
        assert!(!query_has_flag("?nohires", "hires"));
        assert!(!query_has_flag("?hiresolution=1", "hires"));
        assert!(!query_has_flag("?mode=hires", "hires"));
    }
}
