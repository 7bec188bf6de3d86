//! Platform-independent engine: state in, frames out.
//!
//! The engine owns the store, scheduler, recorder, and compositor, and talks
//! to the platform through three seams: [`Surface`], [`Clock`], and
//! [`FrameHost`]. The browser binding in `web` supplies canvas-backed
//! implementations; [`ManualClock`] and [`ManualHost`] drive it headlessly.

use std::cell::Cell;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::compositor::Compositor;
use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::metrics::{PerformanceMetrics, PerformanceRecorder};
use crate::pipeline::DrawPipeline;
use crate::scheduler::{FrameScheduler, LoopState};
use crate::state::{GameState, GameStatePatch, KeyboardSignal, StateStore};
use crate::surface::{Surface, SurfaceGeometry, Viewport};

/// Monotonic milliseconds.
pub trait Clock {
    fn now(&self) -> f64;
}

pub trait FrameHost {
    fn request_frame(&mut self) -> Result<(), EngineError>;
    fn cancel_frame(&mut self);
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// Frame host that only counts requests; the owner calls `tick` itself.
#[derive(Debug, Clone, Default)]
pub struct ManualHost {
    requested: Rc<Cell<u64>>,
    cancelled: Rc<Cell<u64>>,
    pending: Rc<Cell<bool>>,
    refusing: Rc<Cell<bool>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> u64 {
        self.requested.get()
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.get()
    }

    pub fn pending(&self) -> bool {
        self.pending.get()
    }

    /// Marks the pending frame as delivered. Call before `Engine::tick`.
    pub fn fire(&self) -> bool {
        self.pending.replace(false)
    }

    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.set(refusing);
    }
}

impl FrameHost for ManualHost {
    fn request_frame(&mut self) -> Result<(), EngineError> {
        if self.refusing.get() {
            return Err(EngineError::Schedule("host refused frame".to_string()));
        }
        self.requested.set(self.requested.get() + 1);
        self.pending.set(true);
        Ok(())
    }

    fn cancel_frame(&mut self) {
        self.cancelled.set(self.cancelled.get() + 1);
        self.pending.set(false);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stale callback, or the engine is gone.
    Inactive,
    Clean,
    Drawn,
    /// A stage failed; nothing was presented and the frame will be retried.
    Failed,
}

type ResizeListener = Box<dyn FnMut(f64, f64)>;
type KeyboardListener = Box<dyn FnMut(&KeyboardSignal)>;

pub struct Engine<S: Surface, C: Clock, H: FrameHost> {
    settings: EngineSettings,
    geometry: SurfaceGeometry,
    compositor: Option<Compositor<S>>,
    store: StateStore,
    scheduler: FrameScheduler,
    recorder: PerformanceRecorder,
    resizes: u64,
    clock: C,
    host: H,
    resize_listeners: Vec<ResizeListener>,
    keyboard_listeners: Vec<KeyboardListener>,
    destroyed: bool,
}

impl<S: Surface, C: Clock, H: FrameHost> Engine<S, C, H> {
    /// Binds the engine to `surface`, sizes it for `viewport`, and queues the
    /// first frame's worth of state. Nothing is drawn until a tick.
    pub fn initialize(
        settings: EngineSettings,
        surface: S,
        viewport: Viewport,
        clock: C,
        host: H,
        initial_state: GameStatePatch,
    ) -> Result<Self, EngineError> {
        settings.validate()?;

        let geometry = SurfaceGeometry::compute(
            viewport,
            settings.max_device_pixel_ratio,
            settings.max_buffer_dimension,
        );
        let mut compositor = Compositor::new(surface, settings.buffered)?;
        compositor.configure(&geometry)?;

        let mut store = StateStore::new();
        store.merge(initial_state);
        store.force_redraw();

        info!(
            "initialized {}x{} @ dpr {:.2} ({}x{} px, buffered: {})",
            geometry.logical_width,
            geometry.logical_height,
            geometry.device_pixel_ratio,
            geometry.physical_width,
            geometry.physical_height,
            compositor.is_buffered()
        );

        let recorder = PerformanceRecorder::new(settings.frame_budget_ms, settings.latency_window);
        Ok(Self {
            settings,
            geometry,
            compositor: Some(compositor),
            store,
            scheduler: FrameScheduler::new(),
            recorder,
            resizes: 0,
            clock,
            host,
            resize_listeners: Vec::new(),
            keyboard_listeners: Vec::new(),
            destroyed: false,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    pub fn game_state(&self) -> &GameState {
        self.store.state()
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }

    pub fn loop_state(&self) -> LoopState {
        self.scheduler.state()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn compositor(&self) -> Option<&Compositor<S>> {
        self.compositor.as_ref()
    }

    pub fn compositor_mut(&mut self) -> Option<&mut Compositor<S>> {
        self.compositor.as_mut()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn request_frame(&mut self) {
        if let Err(err) = self.host.request_frame() {
            warn!("frame request refused: {err}");
            self.scheduler.abandon_pending();
        }
    }

    pub fn start_animation(&mut self) {
        if self.destroyed {
            debug!("start_animation after destroy ignored");
            return;
        }
        let now = self.clock.now();
        if self.scheduler.start(now) {
            self.request_frame();
        }
        debug!("animation loop running");
    }

    pub fn stop_animation(&mut self) {
        if self.scheduler.stop() {
            self.host.cancel_frame();
        }
    }

    /// Merges a partial state. Never draws; a changed watched field makes the
    /// next tick draw.
    pub fn update_game_state(&mut self, patch: GameStatePatch) {
        if self.destroyed {
            return;
        }
        let outcome = self.store.merge(patch);
        if outcome.keyboard_changed && !self.keyboard_listeners.is_empty() {
            let signal = self.store.state().keyboard_signal();
            for listener in self.keyboard_listeners.iter_mut() {
                listener(&signal);
            }
        }
    }

    /// Timestamps a key event as early as possible; the next drawn frame
    /// closes the latency window.
    pub fn record_keypress(&mut self) -> f64 {
        let now = self.clock.now();
        self.recorder.record_keypress(now)
    }

    pub fn handle_key_input(&mut self, key: &str, is_correct: bool) {
        self.update_game_state(GameStatePatch {
            last_pressed_key: Some(Some(key.to_string())),
            is_error: Some(!is_correct),
            ..Default::default()
        });
    }

    pub fn reset_input_state(&mut self) {
        self.update_game_state(GameStatePatch {
            current_partial_input: Some(String::new()),
            is_error: Some(false),
            ..Default::default()
        });
        self.render(true);
    }

    pub fn reset_error_state(&mut self) {
        self.update_game_state(GameStatePatch {
            is_error: Some(false),
            ..Default::default()
        });
        self.render(true);
    }

    /// Marks the frame dirty. With `force_immediate` and an idle loop, one
    /// tick is scheduled without starting the loop.
    pub fn render(&mut self, force_immediate: bool) {
        if self.destroyed {
            return;
        }
        self.store.force_redraw();
        if force_immediate && self.scheduler.request_single() {
            self.request_frame();
        }
    }

    pub fn set_canvas_size(&mut self, width: f64, height: f64) -> Result<(), EngineError> {
        let viewport = Viewport {
            logical_width: width,
            logical_height: height,
            device_pixel_ratio: self.geometry.device_pixel_ratio,
        };
        self.handle_resize(viewport)
    }

    /// Shared resize path for explicit sizing, container observers, and the
    /// window listener. Always forces one redraw.
    pub fn handle_resize(&mut self, viewport: Viewport) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        let geometry = SurfaceGeometry::compute(
            viewport,
            self.settings.max_device_pixel_ratio,
            self.settings.max_buffer_dimension,
        );
        if let Some(compositor) = self.compositor.as_mut() {
            compositor.configure(&geometry)?;
        }
        self.geometry = geometry;
        self.resizes += 1;
        debug!(
            "resized to {}x{} ({}x{} px)",
            geometry.logical_width,
            geometry.logical_height,
            geometry.physical_width,
            geometry.physical_height
        );

        self.render(true);
        for listener in self.resize_listeners.iter_mut() {
            listener(geometry.logical_width, geometry.logical_height);
        }
        Ok(())
    }

    pub fn on_resize(&mut self, listener: impl FnMut(f64, f64) + 'static) {
        if !self.destroyed {
            self.resize_listeners.push(Box::new(listener));
        }
    }

    pub fn on_keyboard_signal(&mut self, listener: impl FnMut(&KeyboardSignal) + 'static) {
        if !self.destroyed {
            self.keyboard_listeners.push(Box::new(listener));
        }
    }

    pub fn keyboard_signal(&self) -> KeyboardSignal {
        self.store.state().keyboard_signal()
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            loop_started_at: self.scheduler.loop_started_at(),
            resizes: self.resizes,
            buffer_width: self.geometry.physical_width,
            buffer_height: self.geometry.physical_height,
            device_pixel_ratio: self.geometry.device_pixel_ratio,
            ..self.recorder.snapshot()
        }
    }

    pub fn reset_performance_metrics(&mut self) {
        self.recorder.reset();
        self.resizes = 0;
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.destroyed || !self.scheduler.begin_tick() {
            return TickOutcome::Inactive;
        }

        let outcome = if self.store.is_dirty() {
            self.draw_frame()
        } else {
            self.recorder.record_idle_tick();
            TickOutcome::Clean
        };

        if self.scheduler.end_tick() {
            self.request_frame();
        }
        outcome
    }

    fn draw_frame(&mut self) -> TickOutcome {
        let Some(compositor) = self.compositor.as_mut() else {
            return TickOutcome::Inactive;
        };

        let render_start = self.clock.now();
        let pipeline = DrawPipeline {
            settings: &self.settings,
            logical_width: self.geometry.logical_width,
            logical_height: self.geometry.logical_height,
        };
        let drawn = pipeline
            .run(compositor.target(), self.store.state())
            .and_then(|()| compositor.present());

        match drawn {
            Ok(()) => {
                let duration = self.clock.now() - render_start;
                self.recorder.record_frame(render_start, duration);
                self.store.clear_dirty();
                TickOutcome::Drawn
            }
            Err(err) => {
                warn!("frame skipped: {err}");
                self.recorder.record_failed_frame();
                TickOutcome::Failed
            }
        }
    }

    /// Stops the loop and releases surfaces, state, and listeners. Safe to
    /// call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop_animation();
        if self.scheduler.tick_pending() {
            self.scheduler.abandon_pending();
            self.host.cancel_frame();
        }
        self.compositor = None;
        self.store.clear();
        self.resize_listeners.clear();
        self.keyboard_listeners.clear();
        self.destroyed = true;
        info!("engine destroyed");
    }
}
