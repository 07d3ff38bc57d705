//! Group store backed by a Markdown mapping table.
//!
//! The mapping file holds one pipe table whose columns are, in order:
//! source position, source length, target position(s), target length(s),
//! label, description. Header wording is free; columns are positional.
//! Each data row is one [`Group`]. Everything else in the file, and every
//! cell that does not change, is written back byte for byte.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::file::Document;
use crate::position::{ParseError, Position};
use crate::span::Span;

/// Stable identifier of a group: the index of its data row in the table
pub type GroupId = usize;

const SOURCE_POSITION: usize = 0;
const SOURCE_LENGTH: usize = 1;
const TARGET_POSITION: usize = 2;
const TARGET_LENGTH: usize = 3;
const LABEL: usize = 4;
const DESCRIPTION: usize = 5;

/// Which of the two linked documents something refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Document A, addressed by the source column
    Source,
    /// Document B, addressed by the target column
    #[default]
    Target,
}

impl Side {
    pub fn name(&self) -> &str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" | "a" => Ok(Side::Source),
            "target" | "b" => Ok(Side::Target),
            other => Err(format!("unknown side '{}' (expected 'source' or 'target')", other)),
        }
    }
}

/// A correspondence between one source span and zero or more target spans
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub id: GroupId,
    /// Span in document A
    pub source: Span,
    /// Span in document B, `None` for a label-only note
    pub target: Option<Span>,
    pub label: String,
    pub description: String,
}

impl Group {
    /// Build a group from the six cell texts of a row
    ///
    /// Missing target lengths default to the source span's length.
    pub fn parse(
        id: GroupId,
        source_position: &str,
        source_length: &str,
        target_position: &str,
        target_length: &str,
        label: &str,
        description: &str,
    ) -> Result<Self, ParseError> {
        let source = Span::parse(source_position, source_length, 0)?;
        let target = if target_position.trim().is_empty() {
            None
        } else {
            Some(Span::parse(target_position, target_length, source.declared_length())?)
        };

        Ok(Self {
            id,
            source,
            target,
            label: label.trim().to_string(),
            description: description.trim().to_string(),
        })
    }

    /// The ordered target spans (a Multi counts once per item)
    pub fn target_spans(&self) -> Vec<Span> {
        self.target.as_ref().map(Span::split).unwrap_or_default()
    }

    /// Spans this group places in the given document
    pub fn spans_on(&self, side: Side) -> Vec<Span> {
        match side {
            Side::Source => vec![self.source.clone()],
            Side::Target => self.target_spans(),
        }
    }
}

/// Error types for mapping table operations
#[derive(Debug)]
pub enum StoreError {
    /// No `| ... |` header followed by a `---` separator
    NoTable,
    /// Header has too few columns to hold positions and lengths
    BadHeader { columns: usize },
    /// A cell could not be parsed (line is 1-indexed within the file)
    Parse { line: usize, error: ParseError },
    /// A group id that is not in the table
    UnknownGroup(GroupId),
    /// A comma-separated mapping line, which cannot be remapped safely
    CommaRow { line: usize },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NoTable => write!(f, "No mapping table found"),
            StoreError::BadHeader { columns } => {
                write!(f, "Mapping table has {} column(s), expected at least 4", columns)
            }
            StoreError::Parse { line, error } => write!(f, "Mapping table line {}: {}", line, error),
            StoreError::UnknownGroup(id) => write!(f, "Group {} is not in the mapping table", id),
            StoreError::CommaRow { line } => write!(
                f,
                "Mapping file line {}: comma-separated mappings are not supported, convert it to a table row",
                line
            ),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone)]
struct Row {
    /// 0-based index into the file's lines
    line_index: usize,
    group: Group,
}

/// A parsed mapping file
#[derive(Debug, Clone)]
pub struct MappingTable {
    doc: Document,
    rows: Vec<Row>,
}

/// Split a table line into cells, dropping the text outside the outer pipes
fn cells(line: &str) -> Vec<&str> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 2 {
        return Vec::new();
    }
    parts[1..parts.len() - 1].to_vec()
}

/// A `l:c, len, l:c, ...` line outside any table
fn is_comma_row(line: &str) -> bool {
    if line.contains('|') {
        return false;
    }
    let parts: Vec<&str> = line.split(',').collect();
    parts.len() >= 4 && parts[0].trim().parse::<Position>().is_ok()
}

impl MappingTable {
    /// Parse a mapping file held in a document
    ///
    /// Comma-separated mapping lines anywhere in the file are rejected
    /// rather than left holding stale coordinates.
    pub fn parse(doc: Document) -> Result<Self, StoreError> {
        let lines = &doc.lines;
        if let Some(idx) = lines.iter().position(|line| is_comma_row(line)) {
            return Err(StoreError::CommaRow { line: idx + 1 });
        }
        let header = (0..lines.len())
            .find(|&i| lines[i].contains('|') && lines.get(i + 1).is_some_and(|next| next.contains("---")))
            .ok_or(StoreError::NoTable)?;

        let columns = cells(&lines[header]).len();
        if columns <= TARGET_LENGTH {
            return Err(StoreError::BadHeader { columns });
        }

        let mut rows = Vec::new();
        for (id, line_index) in (header + 2..lines.len()).enumerate() {
            let line = &lines[line_index];
            if line.trim().is_empty() || !line.contains('|') {
                break;
            }

            let row = cells(line);
            if row.len() != columns {
                warn!(
                    line = line_index + 1,
                    cells = row.len(),
                    expected = columns,
                    "skipping mapping row with wrong cell count"
                );
                continue;
            }

            let cell = |idx: usize| row.get(idx).copied().unwrap_or("");
            let group = Group::parse(
                id,
                cell(SOURCE_POSITION),
                cell(SOURCE_LENGTH),
                cell(TARGET_POSITION),
                cell(TARGET_LENGTH),
                cell(LABEL),
                cell(DESCRIPTION),
            )
            .map_err(|error| StoreError::Parse {
                line: line_index + 1,
                error,
            })?;
            rows.push(Row { line_index, group });
        }

        debug!(path = %doc.path.display(), groups = rows.len(), "parsed mapping table");
        Ok(Self { doc, rows })
    }

    /// Parse mapping text not backed by a file
    pub fn parse_text(text: &str) -> Result<Self, StoreError> {
        Self::parse(Document::from_text("<memory>", text))
    }

    /// Groups in row order
    pub fn groups(&self) -> Vec<Group> {
        self.rows.iter().map(|row| row.group.clone()).collect()
    }

    /// The document this table was read from
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Store new spans for the given groups
    ///
    /// Only position cells whose serialized text changes are rewritten;
    /// lengths, labels and descriptions are left exactly as they were.
    pub fn apply(&mut self, groups: &[Group]) -> Result<(), StoreError> {
        let mut lines = self.doc.lines.clone();

        for group in groups {
            let row = self
                .rows
                .iter_mut()
                .find(|row| row.group.id == group.id)
                .ok_or(StoreError::UnknownGroup(group.id))?;

            let mut parts: Vec<String> = lines[row.line_index].split('|').map(str::to_string).collect();
            rewrite_cell(&mut parts, SOURCE_POSITION, &group.source.position_text());
            if let Some(target) = &group.target {
                rewrite_cell(&mut parts, TARGET_POSITION, &target.position_text());
            }
            lines[row.line_index] = parts.join("|");
            row.group = group.clone();
        }

        self.doc = Document::with_lines(&self.doc, lines);
        Ok(())
    }

    /// Serialize back to mapping file text
    pub fn to_text(&self) -> String {
        self.doc.to_text()
    }
}

/// Replace a cell's text if it differs, padding with one space like the table does
fn rewrite_cell(parts: &mut [String], cell: usize, text: &str) {
    // parts[0] is whatever precedes the leading pipe
    if let Some(part) = parts.get_mut(cell + 1) {
        if part.trim() != text {
            *part = format!(" {} ", text);
        }
    }
}
