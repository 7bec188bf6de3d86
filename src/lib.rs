//! Canvas renderer for a typing game: draws the problem line, the typed
//! line, and a virtual keyboard from a mergeable game state, redrawing only
//! when that state changes.

pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod keyboard;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod state;
pub mod surface;
pub mod web;

pub use config::{EngineSettings, Palette, Tone};
pub use engine::{Clock, Engine, FrameHost, TickOutcome};
pub use error::EngineError;
pub use metrics::PerformanceMetrics;
pub use scheduler::LoopState;
pub use state::{DisplayPart, GameState, GameStatePatch, KeyboardSignal, SegmentKind};
pub use surface::{Surface, SurfaceGeometry, Viewport};
pub use web::TypingRenderer;

use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    logging::init(log::LevelFilter::Info);
}
