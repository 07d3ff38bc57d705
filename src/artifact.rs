//! Self-contained HTML viewer for a document pair.
//!
//! The generator renders both panes (segments, styles, anchors) and embeds
//! them as JSON next to a small script that draws them, shows connectors
//! on hover or pin, and deletes groups. Deleting a group in the browser
//! drops it from every segment and merges neighbours whose group sets
//! become equal, which is the same partition the generator would produce
//! without that group.

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::file::{Document, FileError, read_document, write_atomic};
use crate::render::{Connector, GroupDetail, PALETTE_SIZE, Pane};
use crate::session::Session;
use crate::store::{Group, MappingTable, Side, StoreError};

const TEMPLATE: &str = include_str!("assets/viewer.html");
const STYLE: &str = include_str!("assets/viewer.css");
const SCRIPT: &str = include_str!("assets/viewer.js");

/// Error types for artifact generation
#[derive(Debug)]
pub enum ArtifactError {
    File(FileError),
    Store(StoreError),
    /// The mapping table has no usable rows
    NoGroups(String),
    /// A span names a line the document does not have
    OutOfRange {
        label: String,
        coordinate: String,
        path: String,
    },
    Json(String),
}

impl std::fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactError::File(e) => write!(f, "{}", e),
            ArtifactError::Store(e) => write!(f, "{}", e),
            ArtifactError::NoGroups(path) => write!(f, "No mapping rows found in {}", path),
            ArtifactError::OutOfRange { label, coordinate, path } => write!(
                f,
                "Span {} of '{}' lies past the end of {}",
                coordinate, label, path
            ),
            ArtifactError::Json(e) => write!(f, "Failed to serialize viewer data: {}", e),
        }
    }
}

impl std::error::Error for ArtifactError {}

impl From<FileError> for ArtifactError {
    fn from(err: FileError) -> Self {
        ArtifactError::File(err)
    }
}

impl From<StoreError> for ArtifactError {
    fn from(err: StoreError) -> Self {
        ArtifactError::Store(err)
    }
}

/// Everything the viewer script reads
#[derive(Serialize)]
struct ViewerData<'a> {
    palette: usize,
    source: &'a Pane,
    target: &'a Pane,
    connectors: &'a [Connector],
    details: Vec<GroupDetail>,
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Substitute `{{KEY}}` placeholders in one pass
///
/// Inserted values are never rescanned, so document text that happens to
/// contain a placeholder is left alone.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

/// Every span must start and end on a line its document has
fn check_lines(groups: &[Group], source: &Document, target: &Document) -> Result<(), ArtifactError> {
    for group in groups {
        for (side, doc) in [(Side::Source, source), (Side::Target, target)] {
            for span in group.spans_on(side) {
                let past_end = span
                    .positions()
                    .iter()
                    .any(|pos| !pos.is_sentinel() && pos.line > doc.line_count());
                if past_end {
                    return Err(ArtifactError::OutOfRange {
                        label: group.label.clone(),
                        coordinate: span.position_text(),
                        path: doc.display_name(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Build the viewer HTML for a document pair and its groups
pub fn build_artifact(session: &Session, source: &Document, target: &Document, title: Option<&str>) -> Result<String, ArtifactError> {
    check_lines(session.groups(), source, target)?;

    let frame = session.frame();
    let data = ViewerData {
        palette: PALETTE_SIZE,
        source: &frame.source,
        target: &frame.target,
        connectors: &frame.connectors,
        details: session
            .groups()
            .iter()
            .filter_map(|g| session.detail(g.id))
            .collect(),
    };

    // `<` only occurs inside JSON strings, where `\u003c` means the same
    // thing and cannot close the surrounding script element.
    let json = serde_json::to_string(&data)
        .map_err(|e| ArtifactError::Json(e.to_string()))?
        .replace('<', "\\u003c");

    let title = match title {
        Some(t) => t.to_string(),
        None => format!("Match: {} vs {}", source.display_name(), target.display_name()),
    };

    let title = html_escape(&title);
    let source_name = html_escape(&source.display_name());
    let target_name = html_escape(&target.display_name());

    Ok(fill_template(
        TEMPLATE,
        &[
            ("TITLE", title.as_str()),
            ("SOURCE_NAME", source_name.as_str()),
            ("TARGET_NAME", target_name.as_str()),
            ("STYLE", STYLE),
            ("SCRIPT", SCRIPT),
            ("DATA", json.as_str()),
        ],
    ))
}

/// Read both documents and the mapping table, and write the viewer to `output`
pub fn generate_artifact(
    source_path: &Path,
    target_path: &Path,
    mapping_path: &Path,
    output: &Path,
    title: Option<&str>,
) -> Result<usize, ArtifactError> {
    let table = MappingTable::parse(read_document(mapping_path)?)?;
    let groups = table.groups();
    if groups.is_empty() {
        return Err(ArtifactError::NoGroups(mapping_path.display().to_string()));
    }

    let source = read_document(source_path)?;
    let target = read_document(target_path)?;
    let session = Session::new(source.clone(), target.clone(), groups);
    let html = build_artifact(&session, &source, &target, title)?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(FileError::from)?;
        }
    }
    write_atomic(output, &html)?;

    let count = session.groups().len();
    info!(output = %output.display(), groups = count, connectors = session.frame().connectors.len(), "wrote viewer");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    const HEADER: &str = "| Doc A Position | Doc A Length | Doc B Position | Doc B Length | Label | Description |\n|---|---|---|---|---|---|\n";

    /// Write a pair and a table with the given rows, returning the paths
    fn write_pair(dir: &Path, rows: &str) -> (PathBuf, PathBuf, PathBuf) {
        let source = dir.join("a.py");
        let target = dir.join("b.txt");
        let mapping = dir.join("m.md");
        fs::write(&source, "abc\n").unwrap();
        fs::write(&target, "xyz\n").unwrap();
        fs::write(&mapping, format!("{}{}", HEADER, rows)).unwrap();
        (source, target, mapping)
    }

    fn generate(dir: &Path, rows: &str) -> Result<usize, ArtifactError> {
        let (source, target, mapping) = write_pair(dir, rows);
        generate_artifact(&source, &target, &mapping, &dir.join("out.html"), None)
    }

    #[test]
    fn test_fill_template_single_pass() {
        let out = fill_template("<{{A}}|{{B}}|{{C}}>", &[("A", "{{B}}"), ("B", "b")]);
        assert_eq!(out, "<{{B}}|b|{{C}}>");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_build_artifact_embeds_data_safely() {
        let source = Document::from_text("script.py", "print('</script>')\n");
        let target = Document::from_text("out <1>.txt", "</script>\n");
        let groups = vec![Group::parse(0, "1:7", "9", "1:0", "9", "tag", "closes <b>").unwrap()];
        let session = Session::new(source.clone(), target.clone(), groups);

        let html = build_artifact(&session, &source, &target, None).unwrap();

        assert_eq!(html.matches("</script>").count(), 2);
        assert!(html.contains("out &lt;1&gt;.txt"));
        assert!(html.contains("\\u003c/script>"));
        assert!(html.contains("\"palette\":6"));
        assert!(!html.contains("{{DATA}}"));
    }

    #[test]
    fn test_generate_artifact_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let count = generate(dir.path(), "| 1:0 | 3 | 1:0 | 3 | l | d |\n").unwrap();

        assert_eq!(count, 1);
        let html = fs::read_to_string(dir.path().join("out.html")).unwrap();
        assert!(html.contains("Match: a.py vs b.txt"));
    }

    #[test]
    fn test_missing_document_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (source, target, mapping) = write_pair(dir.path(), "| 1:0 | 3 | 1:0 | 3 | l | d |\n");
        fs::remove_file(&target).unwrap();
        let output = dir.path().join("out.html");

        let err = generate_artifact(&source, &target, &mapping, &output, None).unwrap_err();

        assert!(matches!(err, ArtifactError::File(FileError::NotFound(_))), "{:?}", err);
        assert!(!output.exists());
    }

    #[test]
    fn test_bad_cell_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = generate(dir.path(), "| 1:0 | 3 | q:0 | 3 | l | d |\n").unwrap_err();

        assert!(matches!(err, ArtifactError::Store(StoreError::Parse { line: 3, .. })), "{:?}", err);
        assert!(!dir.path().join("out.html").exists());
    }

    #[test]
    fn test_empty_table_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = generate(dir.path(), "").unwrap_err();

        assert!(matches!(err, ArtifactError::NoGroups(_)), "{:?}", err);
    }

    #[test]
    fn test_oversized_length_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let count = generate(dir.path(), "| 1:1 | 18446744073709551615 | 1:0 | 2 | l | d |\n").unwrap();

        assert_eq!(count, 1);
    }

    #[test]
    fn test_range_past_end_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = generate(dir.path(), "| 1:0 | 3 | 1:0-50000000000:0 |  | far | d |\n").unwrap_err();

        match err {
            ArtifactError::OutOfRange { label, coordinate, path } => {
                assert_eq!(label, "far");
                assert_eq!(coordinate, "1:0-50000000000:0");
                assert_eq!(path, "b.txt");
            }
            other => panic!("Expected ArtifactError::OutOfRange, got {:?}", other),
        }
        assert!(!dir.path().join("out.html").exists());
    }
}
