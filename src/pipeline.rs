//! Per-frame draw stages: problem text, typed line, keyboard.

use crate::config::{EngineSettings, Tone};
use crate::error::EngineError;
use crate::keyboard;
use crate::state::{DisplayPart, GameState, SegmentKind};
use crate::surface::Surface;

pub const COMPLETION_GLYPH: &str = "\u{2713}";

const MARGIN_RATIO: f64 = 0.05;
const PROBLEM_LINE_Y: f64 = 0.14;
const TYPED_LINE_Y: f64 = 0.32;
const PROBLEM_FONT_RATIO: f64 = 0.75;
const KEYBOARD_TOP: f64 = 0.46;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ProblemText,
    TypedText,
    Keyboard,
}

impl Stage {
    pub const ORDER: [Stage; 3] = [Stage::ProblemText, Stage::TypedText, Stage::Keyboard];

    pub fn name(self) -> &'static str {
        match self {
            Stage::ProblemText => "problem_text",
            Stage::TypedText => "typed_text",
            Stage::Keyboard => "keyboard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub tone: Tone,
}

/// Tone of every character of the target line, derived from progress alone.
pub fn char_tones(state: &GameState) -> Vec<Tone> {
    let len = state.target_len();
    let typed = state.typed_length.min(len);
    let partial = !state.current_partial_input.is_empty();
    let next = if partial { typed + 1 } else { typed };

    (0..len)
        .map(|i| {
            if i < typed || (i == typed && partial) {
                Tone::Typed
            } else if i == next {
                // A wrong key inside a still-valid partial sequence stays highlighted.
                if state.is_error && !partial {
                    Tone::Error
                } else {
                    Tone::Highlight
                }
            } else {
                Tone::Untyped
            }
        })
        .collect()
}

pub fn segment_tone(kind: SegmentKind) -> Tone {
    match kind {
        SegmentKind::Typed | SegmentKind::CurrentInput => Tone::Typed,
        SegmentKind::NextChar | SegmentKind::CurrentRemaining => Tone::Highlight,
        SegmentKind::Error => Tone::Error,
        SegmentKind::NotTyped => Tone::Untyped,
    }
}

fn push_run(runs: &mut Vec<TextRun>, text: &str, tone: Tone) {
    if text.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(last) if last.tone == tone => last.text.push_str(text),
        _ => runs.push(TextRun {
            text: text.to_string(),
            tone,
        }),
    }
}

fn runs_from_parts(parts: &[DisplayPart]) -> Vec<TextRun> {
    let mut runs = Vec::with_capacity(parts.len());
    for part in parts {
        push_run(&mut runs, &part.text, segment_tone(part.kind));
    }
    runs
}

fn runs_from_progress(state: &GameState) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut buf = [0u8; 4];
    for (ch, tone) in state.target_text.chars().zip(char_tones(state)) {
        push_run(&mut runs, ch.encode_utf8(&mut buf), tone);
    }
    runs
}

/// Runs for the typed line. Pre-segmented display parts win over the
/// per-character derivation; a finished line gets the completion glyph.
pub fn typed_line_runs(state: &GameState) -> Vec<TextRun> {
    let mut runs = match state.display_parts.as_deref() {
        Some(parts) => runs_from_parts(parts),
        None => runs_from_progress(state),
    };
    if state.is_complete() {
        runs.push(TextRun {
            text: COMPLETION_GLYPH.to_string(),
            tone: Tone::Typed,
        });
    }
    runs
}

/// Measures `runs` at `size`, shrinking the font so the line fits `available`.
/// Returns the widths of each run and their total.
fn fit_line<S: Surface>(
    surface: &mut S,
    settings: &EngineSettings,
    runs: &[TextRun],
    size: f64,
    available: f64,
) -> Result<(Vec<f64>, f64), EngineError> {
    surface.set_font(&settings.font(size));
    let mut widths = runs
        .iter()
        .map(|run| surface.measure_text(&run.text))
        .collect::<Result<Vec<f64>, EngineError>>()?;
    let mut total: f64 = widths.iter().sum();

    if total > available && total > 0.0 {
        let shrunk = (size * available / total).max(1.0);
        surface.set_font(&settings.font(shrunk));
        widths = runs
            .iter()
            .map(|run| surface.measure_text(&run.text))
            .collect::<Result<Vec<f64>, EngineError>>()?;
        total = widths.iter().sum();
    }
    Ok((widths, total))
}

fn draw_centered_line<S: Surface>(
    surface: &mut S,
    settings: &EngineSettings,
    runs: &[TextRun],
    size: f64,
    width: f64,
    y: f64,
) -> Result<(), EngineError> {
    if runs.is_empty() {
        return Ok(());
    }
    let margin = width * MARGIN_RATIO;
    let available = (width - margin * 2.0).max(1.0);
    let (widths, total) = fit_line(surface, settings, runs, size, available)?;

    let mut x = (width - total) * 0.5;
    for (run, run_width) in runs.iter().zip(widths) {
        surface.fill_text(&run.text, x, y, settings.palette.color(run.tone))?;
        x += run_width;
    }
    Ok(())
}

pub struct DrawPipeline<'a> {
    pub settings: &'a EngineSettings,
    pub logical_width: f64,
    pub logical_height: f64,
}

impl DrawPipeline<'_> {
    pub fn run<S: Surface>(&self, surface: &mut S, state: &GameState) -> Result<(), EngineError> {
        surface.fill_rect(
            0.0,
            0.0,
            self.logical_width,
            self.logical_height,
            self.settings.palette.color(Tone::Background),
        );
        for stage in Stage::ORDER {
            self.draw_stage(stage, surface, state)
                .map_err(|err| EngineError::Draw(format!("{}: {}", stage.name(), err)))?;
        }
        Ok(())
    }

    fn draw_stage<S: Surface>(
        &self,
        stage: Stage,
        surface: &mut S,
        state: &GameState,
    ) -> Result<(), EngineError> {
        let settings = self.settings;
        let (width, height) = (self.logical_width, self.logical_height);
        match stage {
            Stage::ProblemText => {
                if state.current_problem.is_empty() {
                    return Ok(());
                }
                let runs = [TextRun {
                    text: state.current_problem.clone(),
                    tone: Tone::Problem,
                }];
                draw_centered_line(
                    surface,
                    settings,
                    &runs,
                    settings.font_size * PROBLEM_FONT_RATIO,
                    width,
                    height * PROBLEM_LINE_Y,
                )
            }
            Stage::TypedText => draw_centered_line(
                surface,
                settings,
                &typed_line_runs(state),
                settings.font_size,
                width,
                height * TYPED_LINE_Y,
            ),
            Stage::Keyboard => {
                if !settings.show_keyboard {
                    return Ok(());
                }
                let margin = width * MARGIN_RATIO;
                let top = height * KEYBOARD_TOP;
                keyboard::draw(
                    surface,
                    settings,
                    state,
                    (margin, top, width - margin * 2.0, height - top - margin),
                )
            }
        }
    }
}


#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn exactly_one_next_character(
            text in "[a-z]{1,24}",
            typed_frac in 0.0f64..1.0,
            partial in proptest::option::of("[a-z]{1,2}"),
            is_error in any::<bool>(),
        ) {
            let len = text.chars().count();
            let typed = ((len as f64) * typed_frac).floor() as usize;
            let partial = partial.unwrap_or_default();
            let next = if partial.is_empty() { typed } else { typed + 1 };
            prop_assume!(next < len);

            let state = GameState {
                target_text: text,
                typed_length: typed,
                current_partial_input: partial.clone(),
                is_error,
                ..Default::default()
            };
            let tones = char_tones(&state);
            let marked: Vec<usize> = tones
                .iter()
                .enumerate()
                .filter(|(_, tone)| matches!(tone, Tone::Highlight | Tone::Error))
                .map(|(i, _)| i)
                .collect();

            prop_assert_eq!(marked, vec![next]);
            prop_assert_eq!(tones[next] == Tone::Error, is_error && partial.is_empty());
            prop_assert!(tones[..typed].iter().all(|tone| *tone == Tone::Typed));
        }
    }
}
