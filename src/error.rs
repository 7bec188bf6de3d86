use std::fmt;

use wasm_bindgen::JsValue;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The handle passed to `initialize` is not a drawing surface.
    InvalidSurface(String),
    ContextUnavailable(String),
    InvalidSettings(String),
    InvalidState(String),
    /// A draw stage failed; the frame is skipped.
    Draw(String),
    Schedule(String),
    Destroyed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSurface(msg) => write!(f, "invalid drawing surface: {msg}"),
            Self::ContextUnavailable(msg) => write!(f, "2D context unavailable: {msg}"),
            Self::InvalidSettings(msg) => write!(f, "invalid settings: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid game state: {msg}"),
            Self::Draw(msg) => write!(f, "draw failed: {msg}"),
            Self::Schedule(msg) => write!(f, "frame scheduling failed: {msg}"),
            Self::Destroyed => write!(f, "engine has been destroyed"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<EngineError> for JsValue {
    fn from(err: EngineError) -> Self {
        js_sys::Error::new(&err.to_string()).into()
    }
}

pub(crate) fn js_value_to_string(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}
