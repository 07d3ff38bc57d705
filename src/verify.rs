//! Mapping verification.
//!
//! A line-deletion edit is only safe to publish once every stored
//! coordinate into the edited document still addresses the same literal
//! text. [`verify`] extracts the text at each pre-edit coordinate from the
//! original document and at the remapped coordinate from the edited one,
//! and fails on the first difference.

use crate::file::Document;
use crate::position::Position;
use crate::remap::{LineRemovedError, RemapTable, remap_position};
use crate::span::{Single, Span};
use crate::store::{Group, Side};

/// Error types for verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// A coordinate plus its length falls outside the document
    ExtractionOutOfBounds {
        label: String,
        path: String,
        coordinate: String,
    },
    /// The text at the remapped coordinate differs from the original
    Mismatch {
        label: String,
        old_coordinate: String,
        old_text: String,
        new_coordinate: String,
        new_text: String,
    },
    /// A referenced line was removed by the edit
    LineRemoved(LineRemovedError),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::ExtractionOutOfBounds { label, path, coordinate } => write!(
                f,
                "Could not extract {} from {} for '{}': out of bounds",
                coordinate, path, label
            ),
            VerifyError::Mismatch {
                label,
                old_coordinate,
                old_text,
                new_coordinate,
                new_text,
            } => write!(
                f,
                "Mismatch for '{}': old[{}]={:?} vs new[{}]={:?}",
                label, old_coordinate, old_text, new_coordinate, new_text
            ),
            VerifyError::LineRemoved(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for VerifyError {}

impl From<LineRemovedError> for VerifyError {
    fn from(err: LineRemovedError) -> Self {
        VerifyError::LineRemoved(err)
    }
}

/// Text covered by a range, lines joined with `\n`
///
/// `None` when a covered line is missing or an endpoint column lies past
/// the end of its line.
fn range_text(doc: &Document, start: Position, end: Position) -> Option<String> {
    if end.line < start.line || (end.line == start.line && end.column < start.column) {
        return None;
    }

    let mut pieces = Vec::with_capacity(end.line - start.line + 1);
    for line in start.line..=end.line {
        let text = doc.visible_line(line)?;
        let line_len = text.chars().count();
        let from = if line == start.line { start.column } else { 0 };
        let to = if line == end.line { end.column } else { line_len };
        if from > line_len || to > line_len {
            return None;
        }
        pieces.push(text.chars().skip(from).take(to - from).collect::<String>());
    }
    Some(pieces.join("\n"))
}

fn single_coordinate(pos: Position, length: usize) -> String {
    format!("{} (len {})", pos, length)
}

/// Compares one span between an original and an edited document
struct Checker<'a> {
    label: &'a str,
    original: &'a Document,
    edited: &'a Document,
    /// `None` when the document was not edited
    table: Option<&'a RemapTable>,
    checked: usize,
}

impl Checker<'_> {
    fn remap(&self, pos: Position) -> Result<Position, VerifyError> {
        match self.table {
            Some(table) => remap_position(pos, table).map_err(|mut err| {
                err.label = Some(self.label.to_string());
                VerifyError::LineRemoved(err)
            }),
            None => Ok(pos),
        }
    }

    fn out_of_bounds(&self, doc: &Document, coordinate: String) -> VerifyError {
        VerifyError::ExtractionOutOfBounds {
            label: self.label.to_string(),
            path: doc.path.display().to_string(),
            coordinate,
        }
    }

    fn compare(&mut self, old: (String, String), new: (String, String)) -> Result<(), VerifyError> {
        self.checked += 1;
        if old.1 == new.1 {
            return Ok(());
        }
        Err(VerifyError::Mismatch {
            label: self.label.to_string(),
            old_coordinate: old.0,
            old_text: old.1,
            new_coordinate: new.0,
            new_text: new.1,
        })
    }

    fn check_single(&mut self, single: &Single) -> Result<(), VerifyError> {
        if single.pos.is_sentinel() {
            return Ok(());
        }
        let old_coordinate = single_coordinate(single.pos, single.length);
        let old_text = self
            .original
            .extract(single.pos.line, single.pos.column, single.length)
            .ok_or_else(|| self.out_of_bounds(self.original, old_coordinate.clone()))?;

        let new_pos = self.remap(single.pos)?;
        let new_coordinate = single_coordinate(new_pos, single.length);
        let new_text = self
            .edited
            .extract(new_pos.line, new_pos.column, single.length)
            .ok_or_else(|| self.out_of_bounds(self.edited, new_coordinate.clone()))?;

        self.compare((old_coordinate, old_text), (new_coordinate, new_text))
    }

    fn check_range(&mut self, start: Position, end: Position) -> Result<(), VerifyError> {
        if start.is_sentinel() || end.is_sentinel() {
            return Ok(());
        }
        let old_coordinate = format!("{}-{}", start, end);
        let old_text = range_text(self.original, start, end)
            .ok_or_else(|| self.out_of_bounds(self.original, old_coordinate.clone()))?;

        let (new_start, new_end) = (self.remap(start)?, self.remap(end)?);
        let new_coordinate = format!("{}-{}", new_start, new_end);
        let new_text = range_text(self.edited, new_start, new_end)
            .ok_or_else(|| self.out_of_bounds(self.edited, new_coordinate.clone()))?;

        self.compare((old_coordinate, old_text), (new_coordinate, new_text))
    }

    fn check(&mut self, span: &Span) -> Result<(), VerifyError> {
        match span {
            Span::Single(single) => self.check_single(single),
            Span::Multi { items } => items.iter().try_for_each(|item| self.check_single(item)),
            Span::Range { start, end } => self.check_range(*start, *end),
        }
    }
}

/// Prove that remapped coordinates still address identical text
///
/// # Arguments
/// * `original_a` / `original_b` - both documents before the edit
/// * `edited` - the post-edit form of the document named by `side`
/// * `table` - the remap table the edit was built from
/// * `groups` - the groups as they were before remapping
///
/// # Returns
/// * `Ok(n)` - number of spans compared
/// * `Err(VerifyError)` - the first failure; nothing may be written
///
/// Spans in the document that was not edited are only bounds-checked.
pub fn verify(
    original_a: &Document,
    original_b: &Document,
    edited: &Document,
    side: Side,
    table: &RemapTable,
    groups: &[Group],
) -> Result<usize, VerifyError> {
    let (changed, unchanged) = match side {
        Side::Source => (original_a, original_b),
        Side::Target => (original_b, original_a),
    };
    let other_side = match side {
        Side::Source => Side::Target,
        Side::Target => Side::Source,
    };

    let mut checked = 0;
    for group in groups {
        let mut edited_checker = Checker {
            label: &group.label,
            original: changed,
            edited,
            table: Some(table),
            checked: 0,
        };
        for span in group.spans_on(side) {
            edited_checker.check(&span)?;
        }

        let mut other_checker = Checker {
            label: &group.label,
            original: unchanged,
            edited: unchanged,
            table: None,
            checked: 0,
        };
        for span in group.spans_on(other_side) {
            other_checker.check(&span)?;
        }

        checked += edited_checker.checked;
    }
    Ok(checked)
}
