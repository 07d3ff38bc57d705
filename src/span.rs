//! Span grammar: the three textual coordinate forms used by mapping tables.
//!
//! | Shape  | Position text          | Length text |
//! |--------|------------------------|-------------|
//! | Single | `12:4`                 | `3`         |
//! | Range  | `12:4-13:2`            | ignored     |
//! | Multi  | `1:1, 2:2, 3:3`        | `1,2,3`     |
//!
//! Parsing happens once; everything downstream matches on [`Span`].

use serde::{Deserialize, Serialize};

use crate::file::Document;
use crate::position::{ParseError, Position, parse_number};

/// One contiguous run on a single line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Single {
    pub pos: Position,
    pub length: usize,
}

/// A coordinate range into a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Span {
    /// `line:col` plus an explicit length
    Single(Single),
    /// `line:col-line:col`, end column exclusive, possibly multi-line
    Range { start: Position, end: Position },
    /// Several independent single-line runs
    Multi { items: Vec<Single> },
}

/// The part of a span that falls on one line, in visible-text columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRun {
    /// 1-indexed line
    pub line: usize,
    /// First column covered (0-indexed)
    pub start: usize,
    /// Number of characters covered
    pub len: usize,
}

impl LineRun {
    /// Column after the last covered one, saturating for oversized lengths
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }
}

/// Parse a `line:col-line:col` token, if the text has that shape
fn parse_range(text: &str) -> Option<Result<Span, ParseError>> {
    let (left, right) = text.split_once('-')?;
    if !is_position_shape(left) || !is_position_shape(right) {
        return None;
    }
    Some(range_from(left, right))
}

fn range_from(left: &str, right: &str) -> Result<Span, ParseError> {
    Ok(Span::Range {
        start: left.parse()?,
        end: right.parse()?,
    })
}

/// `digits:digits`, nothing else
fn is_position_shape(text: &str) -> bool {
    match text.split_once(':') {
        Some((l, c)) => {
            !l.is_empty()
                && !c.is_empty()
                && l.bytes().all(|b| b.is_ascii_digit())
                && c.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn parse_length(text: &str, fallback: usize) -> Result<usize, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        Ok(fallback)
    } else {
        parse_number(text, text)
    }
}

impl Span {
    /// Parse a position cell and its length cell
    ///
    /// # Arguments
    /// * `position` - `l:c`, `l:c-l:c`, or a comma-separated list of `l:c`
    /// * `length` - a length, or a comma-separated list of lengths for Multi
    /// * `fallback_length` - used wherever a length is missing
    pub fn parse(position: &str, length: &str, fallback_length: usize) -> Result<Span, ParseError> {
        let position = position.trim();

        if let Some(range) = parse_range(position) {
            return range;
        }

        if position.contains(',') {
            let lengths: Vec<&str> = if length.trim().is_empty() {
                Vec::new()
            } else {
                length.split(',').collect()
            };
            let items = position
                .split(',')
                .enumerate()
                .map(|(i, token)| {
                    let length = match lengths.get(i) {
                        Some(len) => parse_length(len, fallback_length)?,
                        None => fallback_length,
                    };
                    Ok(Single {
                        pos: token.parse()?,
                        length,
                    })
                })
                .collect::<Result<Vec<_>, ParseError>>()?;
            return Ok(Span::Multi { items });
        }

        Ok(Span::Single(Single {
            pos: position.parse()?,
            length: parse_length(length, fallback_length)?,
        }))
    }

    /// Position cell text, preserving the span's shape
    pub fn position_text(&self) -> String {
        match self {
            Span::Single(single) => single.pos.to_string(),
            Span::Range { start, end } => format!("{}-{}", start, end),
            Span::Multi { items } => items
                .iter()
                .map(|item| item.pos.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Length cell text (empty for a Range, whose length is its extent)
    pub fn length_text(&self) -> String {
        match self {
            Span::Single(single) => single.length.to_string(),
            Span::Range { .. } => String::new(),
            Span::Multi { items } => items
                .iter()
                .map(|item| item.length.to_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Declared length, used as the default for target lengths
    pub fn declared_length(&self) -> usize {
        match self {
            Span::Single(single) => single.length,
            Span::Range { .. } => 0,
            Span::Multi { items } => items.first().map_or(0, |item| item.length),
        }
    }

    /// Every position this span contains
    pub fn positions(&self) -> Vec<Position> {
        match self {
            Span::Single(single) => vec![single.pos],
            Span::Range { start, end } => vec![*start, *end],
            Span::Multi { items } => items.iter().map(|item| item.pos).collect(),
        }
    }

    /// First position, where anchors and tooltips attach
    pub fn first_position(&self) -> Option<Position> {
        self.positions().into_iter().next()
    }

    /// Split into the independently addressed spans it stands for
    ///
    /// A Multi contributes one Single per item; the other shapes contribute
    /// themselves.
    pub fn split(&self) -> Vec<Span> {
        match self {
            Span::Multi { items } => items.iter().copied().map(Span::Single).collect(),
            other => vec![other.clone()],
        }
    }

    /// Expand into per-line runs against a document
    ///
    /// Single and Multi runs are reported as declared (callers clamp or
    /// bounds-check). Range runs are computed from line lengths: the first
    /// line from `start.column`, interior lines whole, the last line up to
    /// `end.column`. Zero-length range pieces are dropped, as are sentinels
    /// and the part of a range past the last line of `doc`.
    pub fn runs(&self, doc: &Document) -> Vec<LineRun> {
        match self {
            Span::Single(single) => single_run(single).into_iter().collect(),
            Span::Multi { items } => items.iter().filter_map(single_run).collect(),
            Span::Range { start, end } => {
                if start.is_sentinel() || end.is_sentinel() || end.line < start.line {
                    return Vec::new();
                }
                (start.line..=end.line.min(doc.line_count()))
                    .filter_map(|line| {
                        let line_len = doc.line_len(line).unwrap_or(0);
                        let from = if line == start.line { start.column } else { 0 };
                        let to = if line == end.line { end.column } else { line_len };
                        (to > from).then(|| LineRun {
                            line,
                            start: from,
                            len: to - from,
                        })
                    })
                    .collect()
            }
        }
    }
}

fn single_run(single: &Single) -> Option<LineRun> {
    (!single.pos.is_sentinel()).then(|| LineRun {
        line: single.pos.line,
        start: single.pos.column,
        len: single.length,
    })
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Span::Range { .. } => write!(f, "{}", self.position_text()),
            _ => write!(f, "{} (len {})", self.position_text(), self.length_text()),
        }
    }
}
