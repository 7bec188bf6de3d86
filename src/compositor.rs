use crate::error::EngineError;
use crate::surface::{self, Surface, SurfaceGeometry};

/// Visible surface plus an optional offscreen write buffer of the same size.
pub struct Compositor<S: Surface> {
    visible: S,
    offscreen: Option<S>,
}

impl<S: Surface> Compositor<S> {
    pub fn new(visible: S, buffered: bool) -> Result<Self, EngineError> {
        let offscreen = if buffered {
            Some(visible.create_offscreen()?)
        } else {
            None
        };
        Ok(Self { visible, offscreen })
    }

    pub fn is_buffered(&self) -> bool {
        self.offscreen.is_some()
    }

    pub fn configure(&mut self, geometry: &SurfaceGeometry) -> Result<(), EngineError> {
        surface::configure(&mut self.visible, geometry)?;
        if let Some(offscreen) = self.offscreen.as_mut() {
            surface::configure(offscreen, geometry)?;
        }
        Ok(())
    }

    pub fn target(&mut self) -> &mut S {
        match self.offscreen.as_mut() {
            Some(offscreen) => offscreen,
            None => &mut self.visible,
        }
    }

    /// Publishes a fully drawn frame. Exactly one copy when buffered.
    pub fn present(&mut self) -> Result<(), EngineError> {
        match self.offscreen.as_ref() {
            Some(offscreen) => self.visible.blit_from(offscreen),
            None => Ok(()),
        }
    }

    pub fn visible(&self) -> &S {
        &self.visible
    }

    pub fn visible_mut(&mut self) -> &mut S {
        &mut self.visible
    }

    pub fn offscreen(&self) -> Option<&S> {
        self.offscreen.as_ref()
    }

    pub fn offscreen_mut(&mut self) -> Option<&mut S> {
        self.offscreen.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{RecordingSurface, Viewport};

    fn geometry() -> SurfaceGeometry {
        SurfaceGeometry::compute(
            Viewport {
                logical_width: 100.0,
                logical_height: 50.0,
                device_pixel_ratio: 2.0,
            },
            2.5,
            4096,
        )
    }

    #[test]
    fn buffered_frames_draw_offscreen_and_blit_once() {
        let mut compositor = Compositor::new(RecordingSurface::new(), true).unwrap();
        compositor.configure(&geometry()).unwrap();
        compositor
            .target()
            .fill_text("a", 0.0, 0.0, "#fff")
            .unwrap();
        compositor.present().unwrap();

        assert!(compositor.visible().text_runs().is_empty());
        assert_eq!(compositor.visible().blit_count(), 1);
        let offscreen = compositor.offscreen().unwrap();
        assert_eq!(offscreen.text_runs().len(), 1);
        assert_eq!(offscreen.physical_size(), compositor.visible().physical_size());
    }

    #[test]
    fn unbuffered_frames_draw_directly() {
        let mut compositor = Compositor::new(RecordingSurface::new(), false).unwrap();
        compositor.configure(&geometry()).unwrap();
        compositor
            .target()
            .fill_text("a", 0.0, 0.0, "#fff")
            .unwrap();
        compositor.present().unwrap();

        assert!(!compositor.is_buffered());
        assert_eq!(compositor.visible().text_runs().len(), 1);
        assert_eq!(compositor.visible().blit_count(), 0);
    }
}
