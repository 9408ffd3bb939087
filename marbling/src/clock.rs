// The solver is tuned for 60fps steps. Longer frames are simulated as one
// 60fps step rather than a single large, unstable one.
pub const MAX_TIMESTEP: f32 = 0.016666;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    // Seconds to advance the simulation by.
    pub timestep: f32,
    // The raw time since the previous frame, in seconds. Missing on the
    // first frame.
    pub frame_time: Option<f32>,
}

#[derive(Default)]
pub struct FrameClock {
    // A timestamp in milliseconds. Either host or video time.
    last_timestamp: Option<f64>,
}

impl FrameClock {
    pub fn tick(&mut self, timestamp: f64) -> Tick {
        let frame_time = self
            .last_timestamp
            .map(|last| (0.001 * (timestamp - last)).max(0.0) as f32);
        self.last_timestamp = Some(timestamp);

        Tick {
            timestep: frame_time.unwrap_or(0.0).min(MAX_TIMESTEP),
            frame_time,
        }
    }
}

/// Paces colorful mode: the pointers' inks change every time the timer
/// wraps.
#[derive(Default)]
pub struct ColorTimer {
    elapsed: f32,
}

impl ColorTimer {
    // Returns true when the timer wrapped.
    pub fn advance(&mut self, timestep: f32, speed: f32) -> bool {
        self.elapsed += timestep * speed;

        if self.elapsed >= 1.0 {
            self.elapsed %= 1.0;
            true
        } else {
            false
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_tick_does_not_advance() {
        let mut clock = FrameClock::default();
        let tick = clock.tick(12_345.0);
        assert_eq!(tick.timestep, 0.0);
        assert_eq!(tick.frame_time, None);
    }

    #[test]
    fn timesteps_are_capped_at_sixty_fps() {
        let mut clock = FrameClock::default();
        clock.tick(0.0);

        let fast = clock.tick(10.0);
        assert_relative_eq!(fast.timestep, 0.01);

        let slow = clock.tick(510.0);
        assert_relative_eq!(slow.timestep, MAX_TIMESTEP);
        assert_relative_eq!(slow.frame_time.unwrap(), 0.5);
    }

    #[test]
    fn time_never_runs_backwards() {
        let mut clock = FrameClock::default();
        clock.tick(1000.0);
        assert_eq!(clock.tick(500.0).timestep, 0.0);
    }

    #[test]
    fn color_timer_wraps() {
        let mut timer = ColorTimer::default();
        assert!(!timer.advance(0.05, 10.0));
        assert!(timer.advance(0.06, 10.0));
        assert_relative_eq!(timer.elapsed(), 0.1, epsilon = 1e-5);
    }
}
