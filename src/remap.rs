//! Line remapping after whole-line deletion.
//!
//! [`RemapTable::build`] scans a document once and records, for every old
//! line, its new line number or that it was removed. The remap functions
//! then rewrite positions through the table. Columns never change: deleting
//! whole lines cannot move text within a line.

use serde::Serialize;

use crate::file::Document;
use crate::position::Position;
use crate::span::{Single, Span};
use crate::store::{Group, Side};

/// Old 1-indexed line number to new line number, or `None` if removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemapTable {
    entries: Vec<Option<usize>>,
}

impl RemapTable {
    /// Build the table for removing every line `is_removable` accepts
    ///
    /// Linear in the number of lines. The predicate sees the raw line.
    pub fn build<F>(doc: &Document, is_removable: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let mut kept = 0;
        let entries = doc
            .lines
            .iter()
            .map(|line| {
                if is_removable(line) {
                    None
                } else {
                    kept += 1;
                    Some(kept)
                }
            })
            .collect();
        Self { entries }
    }

    /// Table that keeps every one of `line_count` lines in place
    pub fn identity(line_count: usize) -> Self {
        Self {
            entries: (1..=line_count).map(Some).collect(),
        }
    }

    /// New line for an old line
    ///
    /// `None` when the line was removed or is not in the table.
    pub fn lookup(&self, old_line: usize) -> Option<usize> {
        old_line
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx))
            .copied()
            .flatten()
    }

    /// Number of old lines the table covers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when no line is removed
    pub fn is_identity(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(idx, entry)| *entry == Some(idx + 1))
    }

    pub fn removed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_none()).count()
    }

    /// Old line numbers that were removed
    pub fn removed_lines(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_none())
            .map(|(idx, _)| idx + 1)
            .collect()
    }

    /// Produce the edited document, keeping only mapped lines
    pub fn apply(&self, doc: &Document) -> Document {
        let lines = doc
            .lines
            .iter()
            .zip(&self.entries)
            .filter(|(_, entry)| entry.is_some())
            .map(|(line, _)| line.clone())
            .collect();
        // Dropping an unterminated last line leaves the kept last line
        // with the terminator it already had.
        let last_removed = matches!(self.entries.last(), Some(None));
        let trailing_newline = doc.trailing_newline || last_removed;
        Document::with_lines(doc, lines).with_trailing_newline(trailing_newline)
    }
}

/// A span referenced a line that the edit removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRemovedError {
    /// The stale position
    pub position: Position,
    /// Label of the group being remapped, when known
    pub label: Option<String>,
}

impl std::fmt::Display for LineRemovedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.label {
            Some(label) => write!(
                f,
                "Line {} was removed, cannot remap {} in group '{}'",
                self.position.line, self.position, label
            ),
            None => write!(
                f,
                "Line {} was removed, cannot remap {}",
                self.position.line, self.position
            ),
        }
    }
}

impl std::error::Error for LineRemovedError {}

/// Remap a single position
///
/// The sentinel passes through. A removed line, or a line the table does
/// not know, is an error.
pub fn remap_position(pos: Position, table: &RemapTable) -> Result<Position, LineRemovedError> {
    if pos.is_sentinel() {
        return Ok(pos);
    }
    table
        .lookup(pos.line)
        .map(|line| pos.with_line(line))
        .ok_or(LineRemovedError {
            position: pos,
            label: None,
        })
}

/// Remap every position of a span; one failure fails the span
pub fn remap_span(span: &Span, table: &RemapTable) -> Result<Span, LineRemovedError> {
    Ok(match span {
        Span::Single(single) => Span::Single(Single {
            pos: remap_position(single.pos, table)?,
            length: single.length,
        }),
        Span::Range { start, end } => Span::Range {
            start: remap_position(*start, table)?,
            end: remap_position(*end, table)?,
        },
        Span::Multi { items } => Span::Multi {
            items: items
                .iter()
                .map(|item| {
                    Ok(Single {
                        pos: remap_position(item.pos, table)?,
                        length: item.length,
                    })
                })
                .collect::<Result<_, LineRemovedError>>()?,
        },
    })
}

/// Remap the spans a group places in the edited document, as one unit
pub fn remap_group(group: &Group, side: Side, table: &RemapTable) -> Result<Group, LineRemovedError> {
    let with_label = |mut err: LineRemovedError| {
        err.label = Some(group.label.clone());
        err
    };

    let mut remapped = group.clone();
    match side {
        Side::Source => {
            remapped.source = remap_span(&group.source, table).map_err(with_label)?;
        }
        Side::Target => {
            remapped.target = group
                .target
                .as_ref()
                .map(|span| remap_span(span, table))
                .transpose()
                .map_err(with_label)?;
        }
    }
    Ok(remapped)
}

/// Remap all groups; any failure fails the whole set
pub fn remap_groups(groups: &[Group], side: Side, table: &RemapTable) -> Result<Vec<Group>, LineRemovedError> {
    groups
        .iter()
        .map(|group| remap_group(group, side, table))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::is_blank_line;

    fn doc(text: &str) -> Document {
        Document::from_text("t.txt", text)
    }

    fn group(source: &str, target: &str, target_len: &str) -> Group {
        Group::parse(0, source, "3", target, target_len, "label", "").unwrap()
    }

    #[test]
    fn test_build_table() {
        let table = RemapTable::build(&doc("a\n\nb\n  \nc\n"), is_blank_line);

        assert_eq!(table.len(), 5);
        assert_eq!(table.lookup(1), Some(1));
        assert_eq!(table.lookup(2), None);
        assert_eq!(table.lookup(3), Some(2));
        assert_eq!(table.lookup(4), None);
        assert_eq!(table.lookup(5), Some(3));
        assert_eq!(table.lookup(6), None);
        assert_eq!(table.removed_lines(), vec![2, 4]);
        assert!(!table.is_identity());
    }

    #[test]
    fn test_identity_when_nothing_removable() {
        let d = doc("a\nb\nc\n");
        let table = RemapTable::build(&d, is_blank_line);

        assert!(table.is_identity());
        assert_eq!(table, RemapTable::identity(3));
        assert_eq!(table.apply(&d), d);
    }

    #[test]
    fn test_apply_compacts_document() {
        let d = doc("a\n\x1b[0m\nb\n");
        let table = RemapTable::build(&d, is_blank_line);
        let edited = table.apply(&d);

        assert_eq!(edited.to_text(), "a\nb\n");
        assert_ne!(edited.checksum, d.checksum);
    }

    #[test]
    fn test_apply_keeps_terminator_of_last_kept_line() {
        let original = doc("a\n   ");
        let table = RemapTable::build(&original, is_blank_line);
        let edited = table.apply(&original);

        assert_eq!(edited.to_text(), "a\n");
        assert_eq!(edited.checksum, crate::file::checksum("a\n"));

        let unterminated = doc("a\n\nb");
        let table = RemapTable::build(&unterminated, is_blank_line);
        assert_eq!(table.apply(&unterminated).to_text(), "a\nb");
    }

    #[test]
    fn test_sentinel_passes_through_any_table() {
        for table in [RemapTable::identity(0), RemapTable::identity(4), RemapTable::build(&doc("\n\n"), is_blank_line)] {
            let out = remap_position(Position::SENTINEL, &table).unwrap();
            assert_eq!(out.to_string(), "0:0");
        }
    }

    #[test]
    fn test_remap_position_keeps_column() {
        let table = RemapTable::build(&doc("a\n\nb\n"), is_blank_line);

        assert_eq!(remap_position(Position::new(3, 7), &table), Ok(Position::new(2, 7)));
        let err = remap_position(Position::new(2, 0), &table).unwrap_err();
        assert_eq!(err.position, Position::new(2, 0));
    }

    #[test]
    fn test_remap_span_variants() {
        let table = RemapTable::build(&doc("a\n\nb\nc\n"), is_blank_line);

        let range = Span::parse("1:0-4:1", "", 0).unwrap();
        assert_eq!(remap_span(&range, &table).unwrap().position_text(), "1:0-3:1");

        let multi = Span::parse("1:0, 3:1, 4:0", "1,1,1", 0).unwrap();
        assert_eq!(remap_span(&multi, &table).unwrap().position_text(), "1:0, 2:1, 3:0");

        let broken = Span::parse("1:0, 2:0", "1,1", 0).unwrap();
        assert!(remap_span(&broken, &table).is_err());
    }

    #[test]
    fn test_remap_group_fails_as_unit() {
        let table = RemapTable::build(&doc("a\n\nb\nc\n"), is_blank_line);
        let g = group("1:0", "3:0, 2:0", "1,1");

        let err = remap_group(&g, Side::Target, &table).unwrap_err();
        assert_eq!(err.label.as_deref(), Some("label"));
        assert!(err.to_string().contains("Line 2 was removed"));
    }

    #[test]
    fn test_remap_group_only_touches_edited_side() {
        let table = RemapTable::build(&doc("a\n\nb\nc\n"), is_blank_line);
        let g = group("4:0", "3:0", "1");

        let remapped = remap_group(&g, Side::Target, &table).unwrap();
        assert_eq!(remapped.source.position_text(), "4:0");
        assert_eq!(remapped.target.unwrap().position_text(), "2:0");
    }
}
