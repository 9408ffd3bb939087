use crate::color::{Palette, Rgb};

use serde::{Deserialize, Serialize};

pub const BRUSH_RADIUS_RANGE: (f32, f32) = (0.01, 1.0);
pub const LEVELS_RANGE: (u32, u32) = (2, 32);
pub const EDGE_STRENGTH_RANGE: (f32, f32) = (0.0, 4.0);

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub mode: Mode,

    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub capture_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,

    pub splat_radius: f32,
    pub splat_force: f32,

    pub colorful: bool,
    pub color_update_speed: f32,
    pub palette: Palette,
    pub fore_color: Rgb,
    pub back_color: Rgb,

    pub sketch: SketchFilter,

    // Step the resolution down when frames take too long.
    pub adaptive_resolution: bool,
    pub seed: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Mode {
    /// The solver runs and pointer strokes push the water around.
    Flowing,
    /// The solver is paused and pointer strokes lay down ink.
    #[default]
    Painting,
}

impl Mode {
    pub fn is_paused(&self) -> bool {
        matches!(self, Mode::Painting)
    }

    pub fn toggle(&self) -> Self {
        match self {
            Mode::Flowing => Mode::Painting,
            Mode::Painting => Mode::Flowing,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SketchFilter {
    pub enabled: bool,
    pub edge_strength: f32,
    pub edge_threshold: f32,
    pub levels: u32,
    pub saturation: f32,
}

impl Default for SketchFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            edge_strength: 0.8,
            edge_threshold: 0.2,
            levels: 4,
            saturation: 0.8,
        }
    }
}

impl SketchFilter {
    pub fn clamped(&self) -> Self {
        Self {
            enabled: self.enabled,
            edge_strength: self
                .edge_strength
                .clamp(EDGE_STRENGTH_RANGE.0, EDGE_STRENGTH_RANGE.1),
            edge_threshold: self.edge_threshold.clamp(0.0, 1.0),
            levels: self.levels.clamp(LEVELS_RANGE.0, LEVELS_RANGE.1),
            saturation: self.saturation.clamp(0.0, 1.0),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Painting,
            sim_resolution: 256,
            dye_resolution: 1024,
            capture_resolution: 1024,
            density_dissipation: 0.0,
            velocity_dissipation: 0.2,
            pressure: 0.8,
            pressure_iterations: 20,
            curl: 0.01,
            splat_radius: 0.1,
            splat_force: 10.0,
            colorful: false,
            color_update_speed: 10.0,
            palette: Palette::Basic,
            fore_color: Rgb::from_u8(255, 0, 255),
            back_color: Rgb::WHITE,
            sketch: SketchFilter::default(),
            adaptive_resolution: true,
            seed: None,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Settings>(json).map(|settings| settings.clamped())
    }

    // Brings user-provided values into their working ranges.
    pub fn clamped(mut self) -> Self {
        self.splat_radius = clamp_brush_radius(self.splat_radius);
        self.sketch = self.sketch.clamped();
        self.sim_resolution = self.sim_resolution.max(1);
        self.dye_resolution = self.dye_resolution.max(1);
        self.capture_resolution = self.capture_resolution.max(1);
        self
    }
}

pub fn clamp_brush_radius(radius: f32) -> f32 {
    radius.clamp(BRUSH_RADIUS_RANGE.0, BRUSH_RADIUS_RANGE.1)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_start_painting() {
        let settings = Settings::default();
        assert_eq!(settings.mode, Mode::Painting);
        assert!(settings.mode.is_paused());
        assert_eq!(settings.pressure_iterations, 20);
        assert_eq!(settings.fore_color.to_hex(), "#FF00FF");
        assert_eq!(settings.back_color.to_hex(), "#FFFFFF");
        assert!(!settings.sketch.enabled);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let settings = Settings::from_json(
            r##"{ "mode": "Flowing", "foreColor": "#34C759", "sketch": { "enabled": true } }"##,
        )
        .unwrap();

        assert_eq!(settings.mode, Mode::Flowing);
        assert_eq!(settings.fore_color.to_hex(), "#34C759");
        assert!(settings.sketch.enabled);
        assert_eq!(settings.sketch.levels, 4);
        assert_relative_eq!(settings.velocity_dissipation, 0.2);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = Settings::from_json(
            r#"{ "splatRadius": 7.5, "sketch": { "levels": 1, "saturation": 2.0, "edgeStrength": 9.0 } }"#,
        )
        .unwrap();

        assert_relative_eq!(settings.splat_radius, 1.0);
        assert_eq!(settings.sketch.levels, 2);
        assert_relative_eq!(settings.sketch.saturation, 1.0);
        assert_relative_eq!(settings.sketch.edge_strength, 4.0);
    }

    #[test]
    fn zero_pressure_iterations_are_kept() {
        let settings = Settings::from_json(r#"{ "pressureIterations": 0 }"#).unwrap();
        assert_eq!(settings.pressure_iterations, 0);
        assert_eq!(Settings::default().clamped().pressure_iterations, 20);
    }

    #[test]
    fn invalid_colors_fail_to_parse() {
        assert!(Settings::from_json(r#"{ "backColor": "white" }"#).is_err());
    }

    #[test]
    fn mode_toggles_back_and_forth() {
        assert_eq!(Mode::Painting.toggle(), Mode::Flowing);
        assert_eq!(Mode::Painting.toggle().toggle(), Mode::Painting);
    }
}
