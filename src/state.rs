//! Game state snapshot, partial updates, and dirty tracking.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentKind {
    Typed,
    CurrentInput,
    NextChar,
    Error,
    CurrentRemaining,
    #[serde(alias = "remaining")]
    NotTyped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPart {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameState {
    pub target_text: String,
    pub typed_length: usize,
    pub current_partial_input: String,
    pub is_error: bool,
    pub next_key: Option<String>,
    pub last_pressed_key: Option<String>,
    pub current_problem: String,
    pub display_parts: Option<Vec<DisplayPart>>,
}

impl GameState {
    pub fn target_len(&self) -> usize {
        self.target_text.chars().count()
    }

    pub fn is_complete(&self) -> bool {
        let len = self.target_len();
        len > 0 && self.typed_length >= len
    }

    pub fn keyboard_signal(&self) -> KeyboardSignal {
        KeyboardSignal {
            next_key: self.next_key.clone(),
            last_pressed_key: self.last_pressed_key.clone(),
            is_error: self.is_error,
        }
    }
}

/// A partial update. Absent fields leave the snapshot unchanged; `null`
/// clears the nullable ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameStatePatch {
    pub target_text: Option<String>,
    pub typed_length: Option<usize>,
    pub current_partial_input: Option<String>,
    pub is_error: Option<bool>,
    #[serde(deserialize_with = "nullable")]
    pub next_key: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub last_pressed_key: Option<Option<String>>,
    pub current_problem: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub display_parts: Option<Option<Vec<DisplayPart>>>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl GameStatePatch {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|err| EngineError::InvalidState(err.to_string()))?;
        if !value.is_object() {
            return Err(EngineError::InvalidState(format!(
                "state update must be an object, got {value}"
            )));
        }
        serde_json::from_value(value).map_err(|err| EngineError::InvalidState(err.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyboardSignal {
    pub next_key: Option<String>,
    pub last_pressed_key: Option<String>,
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub redraw: bool,
    pub keyboard_changed: bool,
}

#[derive(Debug, Default)]
pub struct StateStore {
    state: GameState,
    dirty: bool,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Shallow-merges `patch` and flags a redraw when a watched field changed.
    ///
    /// Watched: target text, typed length, partial input, error flag. A new
    /// target text without accompanying display parts drops the stale parts.
    pub fn merge(&mut self, patch: GameStatePatch) -> MergeOutcome {
        let before_keys = self.state.keyboard_signal();
        let watched = (
            self.state.target_text.clone(),
            self.state.typed_length,
            self.state.current_partial_input.clone(),
            self.state.is_error,
        );

        let target_changed = patch
            .target_text
            .as_ref()
            .is_some_and(|text| *text != self.state.target_text);

        if let Some(text) = patch.target_text {
            self.state.target_text = text;
        }
        if let Some(len) = patch.typed_length {
            self.state.typed_length = len;
        }
        if let Some(partial) = patch.current_partial_input {
            self.state.current_partial_input = partial;
        }
        if let Some(is_error) = patch.is_error {
            self.state.is_error = is_error;
        }
        if let Some(key) = patch.next_key {
            self.state.next_key = key.filter(|k| !k.is_empty());
        }
        if let Some(key) = patch.last_pressed_key {
            self.state.last_pressed_key = key.filter(|k| !k.is_empty());
        }
        if let Some(problem) = patch.current_problem {
            self.state.current_problem = problem;
        }
        match patch.display_parts {
            Some(parts) => self.state.display_parts = parts.filter(|p| !p.is_empty()),
            None if target_changed => self.state.display_parts = None,
            None => {}
        }

        let redraw = watched.0 != self.state.target_text
            || watched.1 != self.state.typed_length
            || watched.2 != self.state.current_partial_input
            || watched.3 != self.state.is_error;
        if redraw {
            self.dirty = true;
        }

        MergeOutcome {
            redraw,
            keyboard_changed: before_keys != self.state.keyboard_signal(),
        }
    }

    pub fn force_redraw(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn clear(&mut self) {
        self.state = GameState::default();
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> GameStatePatch {
        GameStatePatch {
            target_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn watched_change_marks_dirty() {
        let mut store = StateStore::new();
        let outcome = store.merge(line("neko"));
        assert!(outcome.redraw);
        assert!(store.is_dirty());

        store.clear_dirty();
        let outcome = store.merge(GameStatePatch {
            typed_length: Some(1),
            ..Default::default()
        });
        assert!(outcome.redraw);
        assert!(store.is_dirty());
    }

    #[test]
    fn unwatched_fields_do_not_mark_dirty() {
        let mut store = StateStore::new();
        store.merge(line("neko"));
        store.clear_dirty();

        let outcome = store.merge(GameStatePatch {
            next_key: Some(Some("k".to_string())),
            last_pressed_key: Some(Some("e".to_string())),
            current_problem: Some("ねこ".to_string()),
            ..Default::default()
        });

        assert!(!outcome.redraw);
        assert!(outcome.keyboard_changed);
        assert!(!store.is_dirty());
        assert_eq!(store.state().current_problem, "ねこ");
        assert_eq!(store.state().next_key.as_deref(), Some("k"));
    }

    #[test]
    fn identical_values_are_not_a_change() {
        let mut store = StateStore::new();
        store.merge(GameStatePatch {
            target_text: Some("neko".to_string()),
            typed_length: Some(2),
            is_error: Some(false),
            ..Default::default()
        });
        store.clear_dirty();

        let outcome = store.merge(GameStatePatch {
            target_text: Some("neko".to_string()),
            typed_length: Some(2),
            current_partial_input: Some(String::new()),
            is_error: Some(false),
            ..Default::default()
        });
        assert_eq!(outcome, MergeOutcome::default());
        assert!(!store.is_dirty());
    }

    #[test]
    fn force_redraw_is_unconditional() {
        let mut store = StateStore::new();
        assert!(!store.is_dirty());
        store.force_redraw();
        assert!(store.is_dirty());
    }

    #[test]
    fn new_target_drops_stale_display_parts() {
        let mut store = StateStore::new();
        store.merge(GameStatePatch {
            target_text: Some("neko".to_string()),
            display_parts: Some(Some(vec![DisplayPart {
                kind: SegmentKind::NotTyped,
                text: "neko".to_string(),
            }])),
            ..Default::default()
        });
        assert!(store.state().display_parts.is_some());

        store.merge(GameStatePatch {
            typed_length: Some(1),
            ..Default::default()
        });
        assert!(store.state().display_parts.is_some());

        store.merge(line("inu"));
        assert!(store.state().display_parts.is_none());
    }

    #[test]
    fn empty_strings_clear_optional_keys() {
        let mut store = StateStore::new();
        store.merge(GameStatePatch {
            next_key: Some(Some("a".to_string())),
            ..Default::default()
        });
        store.merge(GameStatePatch {
            next_key: Some(Some(String::new())),
            ..Default::default()
        });
        assert_eq!(store.state().next_key, None);
    }

    #[test]
    fn patch_parses_camel_case_and_segment_tags() {
        let patch = GameStatePatch::from_json(
            r#"{"targetText": "neko", "typedLength": 2, "currentPartialInput": "k",
                "isError": true, "displayParts": [
                    {"type": "typed", "text": "ne"},
                    {"type": "currentInput", "text": "k"},
                    {"type": "currentRemaining", "text": "o"},
                    {"type": "remaining", "text": ""}
                ]}"#,
        )
        .unwrap();

        assert_eq!(patch.target_text.as_deref(), Some("neko"));
        assert_eq!(patch.typed_length, Some(2));
        assert_eq!(patch.is_error, Some(true));
        let kinds: Vec<SegmentKind> = patch
            .display_parts
            .flatten()
            .unwrap()
            .iter()
            .map(|part| part.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Typed,
                SegmentKind::CurrentInput,
                SegmentKind::CurrentRemaining,
                SegmentKind::NotTyped,
            ]
        );
    }

    #[test]
    fn malformed_patch_is_an_error() {
        assert!(matches!(
            GameStatePatch::from_json(r#"{"typedLength": "two"}"#),
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            GameStatePatch::from_json(r#"["x"]"#),
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            GameStatePatch::from_json("3"),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn null_clears_and_absent_keeps() {
        let mut store = StateStore::new();
        store.merge(
            GameStatePatch::from_json(
                r#"{"targetText": "neko", "nextKey": "k", "lastPressedKey": "n",
                    "displayParts": [{"type": "notTyped", "text": "neko"}]}"#,
            )
            .unwrap(),
        );

        store.merge(GameStatePatch::from_json(r#"{"typedLength": 1}"#).unwrap());
        assert_eq!(store.state().next_key.as_deref(), Some("k"));
        assert_eq!(store.state().last_pressed_key.as_deref(), Some("n"));
        assert!(store.state().display_parts.is_some());

        let outcome = store.merge(
            GameStatePatch::from_json(
                r#"{"nextKey": null, "lastPressedKey": null, "displayParts": null}"#,
            )
            .unwrap(),
        );
        assert_eq!(store.state().next_key, None);
        assert_eq!(store.state().last_pressed_key, None);
        assert_eq!(store.state().display_parts, None);
        assert!(outcome.keyboard_changed);
    }

    #[test]
    fn completion_needs_a_non_empty_line() {
        let mut state = GameState::default();
        assert!(!state.is_complete());
        state.target_text = "ねこ".to_string();
        state.typed_length = 2;
        assert_eq!(state.target_len(), 2);
        assert!(state.is_complete());
    }
}
