//! Virtual keyboard overlay.

use crate::config::{EngineSettings, Tone};
use crate::error::EngineError;
use crate::state::GameState;
use crate::surface::Surface;

const ROWS: [&str; 4] = ["1234567890-", "qwertyuiop", "asdfghjkl;", "zxcvbnm,./"];
const ROW_STAGGER: [f64; 4] = [0.0, 0.5, 0.75, 1.25];
const COLUMNS: f64 = 11.0;
const KEY_GAP_RATIO: f64 = 0.12;
const SPACE_KEYS: f64 = 5.0;
pub const SPACE_LABEL: &str = "space";

#[derive(Debug, Clone, PartialEq)]
pub struct KeyRect {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Lays out the keyboard inside the given logical region, centered
/// horizontally. Rows first, space bar last.
pub fn layout(left: f64, top: f64, width: f64, height: f64) -> Vec<KeyRect> {
    let pitch = (width / (COLUMNS + 1.0)).min(height / (ROWS.len() as f64 + 1.0));
    if pitch <= 0.0 {
        return Vec::new();
    }
    let gap = pitch * KEY_GAP_RATIO;
    let key = pitch - gap;
    let block_width = (COLUMNS + 1.0) * pitch;
    let origin_x = left + (width - block_width) * 0.5;

    let mut keys = Vec::with_capacity(48);
    for (row, labels) in ROWS.iter().enumerate() {
        let y = top + row as f64 * pitch;
        for (col, label) in labels.chars().enumerate() {
            keys.push(KeyRect {
                label: label.to_string(),
                x: origin_x + (ROW_STAGGER[row] + col as f64) * pitch,
                y,
                width: key,
                height: key,
            });
        }
    }

    let space_width = SPACE_KEYS * pitch - gap;
    keys.push(KeyRect {
        label: SPACE_LABEL.to_string(),
        x: origin_x + (block_width - space_width) * 0.5,
        y: top + ROWS.len() as f64 * pitch,
        width: space_width,
        height: key,
    });
    keys
}

/// Case-insensitive key match; `" "` and `"space"` name the space bar.
pub fn key_matches(label: &str, key: &str) -> bool {
    if key == " " {
        return label == SPACE_LABEL;
    }
    label.eq_ignore_ascii_case(key.trim())
}

pub fn key_tone(label: &str, state: &GameState) -> Tone {
    let is_next = state
        .next_key
        .as_deref()
        .is_some_and(|key| key_matches(label, key));
    if !is_next {
        return Tone::KeyFace;
    }
    if state.is_error && state.current_partial_input.is_empty() {
        Tone::Error
    } else {
        Tone::Highlight
    }
}

pub fn draw<S: Surface>(
    surface: &mut S,
    settings: &EngineSettings,
    state: &GameState,
    region: (f64, f64, f64, f64),
) -> Result<(), EngineError> {
    let (left, top, width, height) = region;
    let keys = layout(left, top, width, height);
    let Some(first) = keys.first() else {
        return Ok(());
    };

    let palette = &settings.palette;
    let label_size = (first.height * 0.45).max(1.0);
    surface.set_font(&settings.font(label_size));

    for key in &keys {
        surface.fill_rect(
            key.x,
            key.y,
            key.width,
            key.height,
            palette.color(key_tone(&key.label, state)),
        );

        let pressed = state
            .last_pressed_key
            .as_deref()
            .is_some_and(|pressed| key_matches(&key.label, pressed));
        if pressed {
            surface.stroke_rect(
                key.x,
                key.y,
                key.width,
                key.height,
                palette.color(Tone::Typed),
                2.0,
            );
        }

        let label_width = surface.measure_text(&key.label)?;
        surface.fill_text(
            &key.label,
            key.x + (key.width - label_width) * 0.5,
            key.y + key.height * 0.5,
            palette.color(Tone::KeyLabel),
        )?;
    }
    Ok(())
}
