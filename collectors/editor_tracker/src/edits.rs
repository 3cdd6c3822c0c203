//! Lengths are UTF-16 code units. The deletion figures are heuristics, not
//! diff metrics.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A word run that is terminated by whitespace inside the same insertion.
static COMPLETED_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+\s").expect("valid regex"));
static WHITESPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    #[serde(default)]
    pub range_length: i64,
    #[serde(default)]
    pub text: String,
}

#[cfg(test)]
impl TextEdit {
    pub fn insert(text: impl Into<String>) -> Self {
        Self {
            range_length: 0,
            text: text.into(),
        }
    }

    pub fn replace(range_length: i64, text: impl Into<String>) -> Self {
        Self {
            range_length,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditTotals {
    pub lines_added: i64,
    pub lines_deleted: i64,
    pub words_added: i64,
    pub words_deleted: i64,
}

impl EditTotals {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl std::ops::AddAssign for EditTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.lines_added += rhs.lines_added;
        self.lines_deleted += rhs.lines_deleted;
        self.words_added += rhs.words_added;
        self.words_deleted += rhs.words_deleted;
    }
}

fn utf16_len(s: &str) -> i64 {
    s.encode_utf16().count() as i64
}

pub fn measure(edit: &TextEdit) -> EditTotals {
    let text = edit.text.as_str();
    let replaced = edit.range_length > 0;

    let lines_added = text.matches('\n').count() as i64;
    let words_added = COMPLETED_WORD_RE.find_iter(text).count() as i64;

    let lines_deleted = if replaced {
        (edit.range_length - utf16_len(text)) / 2
    } else {
        0
    };

    let words_deleted = if replaced {
        let tokens = WHITESPACE_RUN_RE.find_iter(text).count() as i64 + 1;
        let non_whitespace: i64 = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.len_utf16() as i64)
            .sum();
        tokens - non_whitespace
    } else {
        0
    };

    EditTotals {
        lines_added,
        lines_deleted,
        words_added,
        words_deleted,
    }
}

#[derive(Debug, Default)]
pub struct EditCounter {
    totals: EditTotals,
}

impl EditCounter {
    pub fn record(&mut self, edits: &[TextEdit]) -> EditTotals {
        let mut delta = EditTotals::default();
        for edit in edits {
            delta += measure(edit);
        }
        self.totals += delta;
        delta
    }

    pub fn totals(&self) -> EditTotals {
        self.totals
    }

    pub fn take(&mut self) -> EditTotals {
        std::mem::take(&mut self.totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_insert_counts_lines_and_completed_words() {
        let d = measure(&TextEdit::insert("a b\nc"));
        assert_eq!(d.lines_added, 1);
        assert_eq!(d.words_added, 2);
        assert_eq!(d.lines_deleted, 0);
        assert_eq!(d.words_deleted, 0);
    }

    #[test]
    fn replacement_halves_length_delta_for_deleted_lines() {
        let d = measure(&TextEdit::replace(10, "abcd"));
        assert_eq!(d.lines_deleted, 3);

        // Truncates toward zero, and may go negative when the insert is longer.
        assert_eq!(measure(&TextEdit::replace(9, "abcd")).lines_deleted, 2);
        assert_eq!(measure(&TextEdit::replace(1, "abcd")).lines_deleted, -1);
    }

    #[test]
    fn replacement_word_delta_follows_token_minus_chars() {
        // Pure deletion: one empty token, no characters.
        assert_eq!(measure(&TextEdit::replace(5, "")).words_deleted, 1);
        // "ab cd": 2 tokens, 4 non-whitespace chars.
        assert_eq!(measure(&TextEdit::replace(5, "ab cd")).words_deleted, -2);
        // Leading/trailing whitespace adds empty tokens.
        assert_eq!(measure(&TextEdit::replace(3, " x ")).words_deleted, 2);
        // Insertions never report deleted words.
        assert_eq!(measure(&TextEdit::insert("ab cd")).words_deleted, 0);
    }

    #[test]
    fn lengths_are_utf16_units() {
        // U+1F600 is two UTF-16 units.
        let d = measure(&TextEdit::replace(6, "\u{1F600}"));
        assert_eq!(d.lines_deleted, 2);
        assert_eq!(d.words_deleted, 1 - 2);
    }

    #[test]
    fn counter_accumulates_across_change_sets() {
        let mut c = EditCounter::default();
        c.record(&[TextEdit::insert("one two\n"), TextEdit::insert("\n")]);
        c.record(&[TextEdit::replace(10, "abcd")]);

        let t = c.totals();
        assert_eq!(t.lines_added, 2);
        assert_eq!(t.words_added, 2);
        assert_eq!(t.lines_deleted, 3);

        assert_eq!(c.take(), t);
        assert!(c.totals().is_zero());
    }

    #[test]
    fn text_edit_deserializes_host_shape() {
        let e: TextEdit = serde_json::from_str(r#"{"rangeLength":3,"text":"x"}"#).unwrap();
        assert_eq!(e, TextEdit::replace(3, "x"));
        let e: TextEdit = serde_json::from_str(r#"{"text":"y"}"#).unwrap();
        assert_eq!(e, TextEdit::insert("y"));
    }
}
