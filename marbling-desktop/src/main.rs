use marbling::settings::Settings;
use marbling::{Environment, Marbling, TouchPoint};

use glutin::config::{ConfigTemplateBuilder, GlConfig};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, GlProfile, NotCurrentGlContext, PossiblyCurrentContext,
    Version,
};
use glutin::display::{GetGlDisplay, GlDisplay};
use glutin::surface::{GlSurface, Surface, SwapInterval, WindowSurface};
use glutin_winit::{DisplayBuilder, GlWindow};
use raw_window_handle::HasWindowHandle;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

use std::error::Error;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::Instant;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut force_high_res = false;
    let mut settings = Settings::default();
    for arg in std::env::args().skip(1) {
        if arg == "--hires" {
            force_high_res = true;
        } else {
            log::info!("Reading settings from {}", arg);
            settings = Settings::from_json(&std::fs::read_to_string(&arg)?)?;
        }
    }

    let event_loop = EventLoop::new()?;
    let mut app = App::new(
        Rc::new(settings),
        Environment {
            mobile: false,
            force_high_res,
        },
    );
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

struct GlState {
    window: Window,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    marbling: Marbling,
}

struct App {
    settings: Rc<Settings>,
    environment: Environment,
    start: Instant,
    cursor: (f32, f32),
    state: Option<GlState>,
    error: Option<Box<dyn Error>>,
}

impl App {
    fn new(settings: Rc<Settings>, environment: Environment) -> Self {
        Self {
            settings,
            environment,
            start: Instant::now(),
            cursor: (0.0, 0.0),
            state: None,
            error: None,
        }
    }

    fn save_capture(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as f64)
            .unwrap_or_default();

        match state.marbling.capture(timestamp) {
            Ok(capture) => match std::fs::write(&capture.filename, &capture.png) {
                Ok(()) => log::info!("Saved {}", capture.filename),
                Err(err) => log::error!("Cannot save {}: {}", capture.filename, err),
            },
            Err(err) => log::error!("{}", err),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match get_rendering_context(event_loop, &self.settings, self.environment) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => {
                log::error!("{}", err);
                self.error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let WindowEvent::KeyboardInput { event: key, .. } = &event {
            if key.state == ElementState::Pressed && !key.repeat {
                match key.logical_key.as_ref() {
                    Key::Named(NamedKey::Escape) => event_loop.exit(),
                    Key::Named(NamedKey::Space) => {
                        if let Some(state) = self.state.as_mut() {
                            state.marbling.request_random_splats();
                        }
                    }
                    Key::Character("p") => {
                        if let Some(state) = self.state.as_mut() {
                            state.marbling.toggle_mode();
                        }
                    }
                    Key::Character("s") => self.save_capture(),
                    _ => (),
                }
            }
            return;
        }

        let Some(state) = self.state.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(physical_size) => {
                if let (Some(width), Some(height)) = (
                    NonZeroU32::new(physical_size.width),
                    NonZeroU32::new(physical_size.height),
                ) {
                    state.surface.resize(&state.context, width, height);
                    state.marbling.resize(width.get(), height.get());
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
                state.marbling.mouse_move(self.cursor.0, self.cursor.1);
            }

            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => match button_state {
                ElementState::Pressed => state.marbling.mouse_down(self.cursor.0, self.cursor.1),
                ElementState::Released => state.marbling.mouse_up(),
            },

            WindowEvent::Touch(touch) => {
                let id = touch.id as i64;
                let point = TouchPoint {
                    id,
                    client_x: touch.location.x as f32,
                    client_y: touch.location.y as f32,
                };

                match touch.phase {
                    TouchPhase::Started => state.marbling.touch_start(&[point]),
                    TouchPhase::Moved => state.marbling.touch_move(&[point]),
                    TouchPhase::Ended | TouchPhase::Cancelled => state.marbling.touch_end(&[id]),
                }
            }

            WindowEvent::RedrawRequested => {
                state
                    .marbling
                    .animate(self.start.elapsed().as_secs_f64() * 1000.0);

                if let Err(err) = state.surface.swap_buffers(&state.context) {
                    log::error!("Cannot swap buffers: {}", err);
                }
            }

            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.as_ref() {
            state.window.request_redraw();
        }
    }
}

fn get_rendering_context(
    event_loop: &ActiveEventLoop,
    settings: &Rc<Settings>,
    environment: Environment,
) -> Result<GlState, Box<dyn Error>> {
    let window_attributes = WindowAttributes::default()
        .with_title("Marbling")
        .with_resizable(true)
        .with_inner_size(LogicalSize::new(1280, 800));

    let template = ConfigTemplateBuilder::new().with_alpha_size(8);
    let (window, gl_config) = DisplayBuilder::new()
        .with_window_attributes(Some(window_attributes))
        .build(event_loop, template, |configs| {
            // Fields are rendered offscreen, so multisampling only costs time.
            configs
                .reduce(|best, config| {
                    if config.num_samples() < best.num_samples() {
                        config
                    } else {
                        best
                    }
                })
                .expect("no GL configuration available")
        })?;
    let window = window.ok_or("cannot create a window")?;

    let raw_window_handle = window.window_handle()?.as_raw();
    let gl_display = gl_config.display();
    let context_attributes = ContextAttributesBuilder::new()
        .with_profile(GlProfile::Core)
        .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
        .build(Some(raw_window_handle));

    let not_current = unsafe { gl_display.create_context(&gl_config, &context_attributes)? };
    let surface_attributes = window.build_surface_attributes(Default::default())?;
    let surface = unsafe { gl_display.create_window_surface(&gl_config, &surface_attributes)? };
    let context = not_current.make_current(&surface)?;

    if let Err(err) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
        log::warn!("Cannot enable vsync: {}", err);
    }

    let gl = unsafe {
        glow::Context::from_loader_function_cstr(|symbol| gl_display.get_proc_address(symbol))
    };

    let physical_size = window.inner_size();
    let mut marbling = Marbling::new(
        &Rc::new(gl),
        physical_size.width,
        physical_size.height,
        settings,
        environment,
    )?;
    marbling.subscribe(|event| match serde_json::to_string(event) {
        Ok(json) => log::info!("{}", json),
        Err(err) => log::error!("Cannot serialize event: {}", err),
    });

    Ok(GlState {
        window,
        surface,
        context,
        marbling,
    })
}
