//! Drawing surfaces and density-aware sizing.

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub logical_width: f64,
    pub logical_height: f64,
    pub device_pixel_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    pub logical_width: f64,
    pub logical_height: f64,
    /// Density after clamping to the configured maximum.
    pub device_pixel_ratio: f64,
    /// Uniform logical-to-physical factor applied to the context.
    pub scale: f64,
    pub physical_width: u32,
    pub physical_height: u32,
}

impl SurfaceGeometry {
    pub fn compute(viewport: Viewport, max_dpr: f64, max_dimension: u32) -> Self {
        let logical_width = viewport.logical_width.max(1.0);
        let logical_height = viewport.logical_height.max(1.0);
        let dpr = if viewport.device_pixel_ratio.is_finite() && viewport.device_pixel_ratio > 0.0 {
            viewport.device_pixel_ratio.min(max_dpr.max(1.0))
        } else {
            1.0
        };

        let mut scale = dpr;
        // Avoid allocating huge buffers on large high-DPI displays.
        let max_side = logical_width.max(logical_height) * scale;
        let max_dim = f64::from(max_dimension.max(1));
        if max_side > max_dim {
            scale = scale * max_dim / max_side;
        }

        Self {
            logical_width,
            logical_height,
            device_pixel_ratio: dpr,
            scale,
            physical_width: (logical_width * scale).floor().max(1.0) as u32,
            physical_height: (logical_height * scale).floor().max(1.0) as u32,
        }
    }
}

/// A pixel-addressable target. All drawing calls take logical units; the
/// implementation applies the scale set by [`Surface::set_scale`].
pub trait Surface {
    fn create_offscreen(&self) -> Result<Self, EngineError>
    where
        Self: Sized;

    fn set_layout_size(&mut self, logical_width: f64, logical_height: f64);
    fn resize(&mut self, physical_width: u32, physical_height: u32);
    fn physical_size(&self) -> (u32, u32);
    fn set_scale(&mut self, scale: f64) -> Result<(), EngineError>;

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: &str);
    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: &str, line_width: f64);
    fn set_font(&mut self, font: &str);
    fn measure_text(&mut self, text: &str) -> Result<f64, EngineError>;
    /// Draws `text` with its left edge at `x` and its vertical middle at `y`.
    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: &str) -> Result<(), EngineError>;

    /// Copies `source` pixel-for-pixel onto this surface.
    fn blit_from(&mut self, source: &Self) -> Result<(), EngineError>
    where
        Self: Sized;
}

/// Applies `geometry` to `surface`. Safe to repeat; the previous buffer is
/// replaced, not kept alongside.
pub fn configure<S: Surface>(surface: &mut S, geometry: &SurfaceGeometry) -> Result<(), EngineError> {
    surface.set_layout_size(geometry.logical_width, geometry.logical_height);
    let (width, height) = surface.physical_size();
    if width != geometry.physical_width || height != geometry.physical_height {
        surface.resize(geometry.physical_width, geometry.physical_height);
    }
    // Resizing a canvas resets its transform, so always reapply.
    surface.set_scale(geometry.scale)
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    LayoutSize { width: f64, height: f64 },
    Resize { width: u32, height: u32 },
    Scale(f64),
    FillRect { x: f64, y: f64, width: f64, height: f64, color: String },
    StrokeRect { x: f64, y: f64, width: f64, height: f64, color: String },
    Font(String),
    FillText { text: String, x: f64, y: f64, color: String },
    Blit,
}

/// In-memory surface that records draw calls. Drives headless rendering and
/// the engine's tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    commands: Vec<DrawCommand>,
    width: u32,
    height: u32,
    font_px: f64,
    fail_text: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            font_px: 10.0,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Makes every subsequent `fill_text` fail until switched back.
    pub fn fail_text(&mut self, fail: bool) {
        self.fail_text = fail;
    }

    pub fn text_runs(&self) -> Vec<(String, String)> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::FillText { text, color, .. } => Some((text.clone(), color.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn blit_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, DrawCommand::Blit))
            .count()
    }
}

impl Surface for RecordingSurface {
    fn create_offscreen(&self) -> Result<Self, EngineError> {
        Ok(Self::new())
    }

    fn set_layout_size(&mut self, logical_width: f64, logical_height: f64) {
        self.commands.push(DrawCommand::LayoutSize {
            width: logical_width,
            height: logical_height,
        });
    }

    fn resize(&mut self, physical_width: u32, physical_height: u32) {
        self.width = physical_width;
        self.height = physical_height;
        self.commands.push(DrawCommand::Resize {
            width: physical_width,
            height: physical_height,
        });
    }

    fn physical_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_scale(&mut self, scale: f64) -> Result<(), EngineError> {
        self.commands.push(DrawCommand::Scale(scale));
        Ok(())
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: &str) {
        self.commands.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color: color.to_string(),
        });
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: &str, _line_width: f64) {
        self.commands.push(DrawCommand::StrokeRect {
            x,
            y,
            width,
            height,
            color: color.to_string(),
        });
    }

    fn set_font(&mut self, font: &str) {
        self.font_px = font
            .split("px")
            .next()
            .and_then(|size| size.trim().parse::<f64>().ok())
            .unwrap_or(10.0);
        self.commands.push(DrawCommand::Font(font.to_string()));
    }

    fn measure_text(&mut self, text: &str) -> Result<f64, EngineError> {
        Ok(text.chars().count() as f64 * self.font_px * 0.6)
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: &str) -> Result<(), EngineError> {
        if self.fail_text {
            return Err(EngineError::Draw(format!("fill_text({text:?}) rejected")));
        }
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            color: color.to_string(),
        });
        Ok(())
    }

    fn blit_from(&mut self, _source: &Self) -> Result<(), EngineError> {
        self.commands.push(DrawCommand::Blit);
        Ok(())
    }
}
