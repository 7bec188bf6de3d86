use serde::Deserialize;

use crate::error::EngineError;
use crate::surface::Viewport;

/// Roles a draw call can paint with. Resolved to CSS colors through [`Palette`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    Background,
    Problem,
    Untyped,
    Typed,
    Highlight,
    Error,
    KeyFace,
    KeyLabel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Palette {
    pub background: String,
    pub problem: String,
    pub untyped: String,
    pub typed: String,
    pub highlight: String,
    pub error: String,
    pub key_face: String,
    pub key_label: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: "#101418".to_string(),
            problem: "#9ecbff".to_string(),
            untyped: "#5c6370".to_string(),
            typed: "#e6e6e6".to_string(),
            highlight: "#ffd166".to_string(),
            error: "#ef476f".to_string(),
            key_face: "#1e242c".to_string(),
            key_label: "#aab2bf".to_string(),
        }
    }
}

impl Palette {
    pub fn color(&self, tone: Tone) -> &str {
        match tone {
            Tone::Background => &self.background,
            Tone::Problem => &self.problem,
            Tone::Untyped => &self.untyped,
            Tone::Typed => &self.typed,
            Tone::Highlight => &self.highlight,
            Tone::Error => &self.error,
            Tone::KeyFace => &self.key_face,
            Tone::KeyLabel => &self.key_label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    pub width: f64,
    pub height: f64,
    pub font_family: String,
    pub font_size: f64,
    pub palette: Palette,
    /// Draw into an offscreen surface and copy finished frames.
    pub buffered: bool,
    pub fit_to_container: bool,
    pub max_device_pixel_ratio: f64,
    pub max_buffer_dimension: u32,
    pub frame_budget_ms: f64,
    pub latency_window: usize,
    pub show_keyboard: bool,
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 540.0,
            font_family: "'Noto Sans JP', sans-serif".to_string(),
            font_size: 32.0,
            palette: Palette::default(),
            buffered: true,
            fit_to_container: false,
            max_device_pixel_ratio: 2.5,
            max_buffer_dimension: 4096,
            frame_budget_ms: 1000.0 / 60.0,
            latency_window: 60,
            show_keyboard: true,
            log_level: "info".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| EngineError::InvalidSettings(err.to_string()))?;
        if !value.is_object() {
            return Err(EngineError::InvalidSettings(format!(
                "settings must be an object, got {value}"
            )));
        }
        let settings: Self = serde_json::from_value(value)
            .map_err(|err| EngineError::InvalidSettings(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(EngineError::InvalidSettings(format!(
                "logical size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.font_size > 0.0) {
            return Err(EngineError::InvalidSettings(format!(
                "fontSize must be positive, got {}",
                self.font_size
            )));
        }
        if self.latency_window == 0 {
            return Err(EngineError::InvalidSettings(
                "latencyWindow must hold at least one sample".to_string(),
            ));
        }
        if !(self.frame_budget_ms > 0.0) {
            return Err(EngineError::InvalidSettings(format!(
                "frameBudgetMs must be positive, got {}",
                self.frame_budget_ms
            )));
        }
        Ok(())
    }

    pub fn font(&self, size: f64) -> String {
        format!("{}px {}", size, self.font_family)
    }

    pub fn viewport(&self, device_pixel_ratio: f64) -> Viewport {
        Viewport {
            logical_width: self.width,
            logical_height: self.height,
            device_pixel_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let settings = EngineSettings::from_json("{}").unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn camel_case_fields_and_partial_palette() {
        let settings = EngineSettings::from_json(
            r##"{"width": 640, "fontSize": 24, "buffered": false,
                "fitToContainer": true, "palette": {"error": "#f00"}}"##,
        )
        .unwrap();

        assert_eq!(settings.width, 640.0);
        assert_eq!(settings.height, 540.0);
        assert_eq!(settings.font_size, 24.0);
        assert!(!settings.buffered);
        assert!(settings.fit_to_container);
        assert_eq!(settings.palette.color(Tone::Error), "#f00");
        assert_eq!(settings.palette.color(Tone::Typed), "#e6e6e6");
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert!(matches!(
            EngineSettings::from_json(r#"{"width": 0}"#),
            Err(EngineError::InvalidSettings(_))
        ));
        assert!(matches!(
            EngineSettings::from_json(r#"{"latencyWindow": 0}"#),
            Err(EngineError::InvalidSettings(_))
        ));
        assert!(matches!(
            EngineSettings::from_json("[1, 2]"),
            Err(EngineError::InvalidSettings(_))
        ));
        assert!(matches!(
            EngineSettings::from_json("null"),
            Err(EngineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn font_string_uses_family() {
        let settings = EngineSettings::default();
        assert_eq!(settings.font(20.0), "20px 'Noto Sans JP', sans-serif");
    }
}
