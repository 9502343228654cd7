//! Plain-text edits against a source string.

use std::ops::Range;

use crate::error::{PapercutError, Result};

/// Replace `range` of the source with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub text: String,
}

impl TextEdit {
    pub fn new(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    pub fn overlaps(&self, other: &TextEdit) -> bool {
        self.range.start < other.range.end && other.range.start < self.range.end
    }
}

/// Apply non-overlapping edits, splicing from the highest offset down so
/// earlier offsets stay valid.
pub fn apply_edits(source: &str, mut edits: Vec<TextEdit>) -> Result<String> {
    edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    for pair in edits.windows(2) {
        if pair[1].range.end > pair[0].range.start {
            return Err(PapercutError::OverlappingEdits {
                offset: pair[0].range.start,
            });
        }
    }
    let mut out = source.to_string();
    for edit in edits {
        out.replace_range(edit.range, &edit.text);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_edits_in_any_order() {
        let source = "assign y = a ? b : c;";
        let edits = vec![
            TextEdit::new(0..6, "ASSIGN"),
            TextEdit::new(11..20, "b"),
        ];
        assert_eq!(apply_edits(source, edits).unwrap(), "ASSIGN y = b;");
    }

    #[test]
    fn test_overlapping_edits_are_rejected() {
        let edits = vec![TextEdit::new(0..5, "x"), TextEdit::new(3..8, "y")];
        assert!(matches!(
            apply_edits("0123456789", edits),
            Err(PapercutError::OverlappingEdits { .. })
        ));
    }

    #[test]
    fn test_adjacent_edits_are_fine() {
        let edits = vec![TextEdit::new(0..2, "ab"), TextEdit::new(2..4, "cd")];
        assert_eq!(apply_edits("0123", edits).unwrap(), "abcd");
    }
}
