use std::borrow::Cow;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A line-oriented text document read into memory
///
/// Lines are stored without their `\n` terminator. A `\r` preceding the
/// terminator stays part of the raw line so that [`Document::to_text`]
/// reproduces the original bytes exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path the document was read from
    pub path: PathBuf,
    /// Raw lines, without terminators
    pub lines: Vec<String>,
    /// Whether the last line was terminated by `\n`
    pub trailing_newline: bool,
    /// BLAKE3 hash of the content (hex-encoded)
    pub checksum: String,
}

/// Error types for file operations
#[derive(Debug)]
pub enum FileError {
    NotFound(String),
    IoError(String),
    InvalidUtf8(String),
    /// The file on disk no longer matches what was loaded
    ChecksumChanged {
        path: String,
        expected: String,
        actual: String,
    },
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileError::NotFound(p) => write!(f, "File not found: {}", p),
            FileError::IoError(e) => write!(f, "I/O error: {}", e),
            FileError::InvalidUtf8(p) => write!(f, "Invalid UTF-8 in file: {}", p),
            FileError::ChecksumChanged { path, expected, actual } => write!(
                f,
                "File {} changed since it was loaded: expected checksum {}, got {}",
                path, expected, actual
            ),
        }
    }
}

impl std::error::Error for FileError {}

impl From<io::Error> for FileError {
    fn from(err: io::Error) -> Self {
        FileError::IoError(err.to_string())
    }
}

/// Hex-encoded BLAKE3 hash of some text
pub fn checksum(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Strip terminal SGR formatting codes (`ESC [ ... m`) and a trailing `\r`
///
/// This is the text that columns count against. Sequences that never reach
/// their `m` terminator are left untouched.
pub fn visible_text(line: &str) -> Cow<'_, str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if !line.contains('\x1b') {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(idx) = rest.find('\x1b') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];
        match sgr_len(after) {
            Some(len) => rest = &after[len..],
            None => {
                out.push('\x1b');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Length of `[<digits and ;>]m` at the start of `s`, if present
fn sgr_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix('[')?;
    let params = body
        .bytes()
        .take_while(|b| b.is_ascii_digit() || *b == b';')
        .count();
    (body.as_bytes().get(params) == Some(&b'm')).then_some(params + 2)
}

/// A line is blank when only whitespace remains after discounting formatting codes
pub fn is_blank_line(line: &str) -> bool {
    visible_text(line).trim().is_empty()
}

impl Document {
    /// Build a document from in-memory text
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        let trailing_newline = text.ends_with('\n');
        let body = if trailing_newline { &text[..text.len() - 1] } else { text };
        let lines = if text.is_empty() {
            Vec::new()
        } else {
            body.split('\n').map(str::to_string).collect()
        };

        Self {
            path: path.into(),
            lines,
            trailing_newline,
            checksum: checksum(text),
        }
    }

    /// Build a document from a line list, sharing the terminator style of `like`
    pub fn with_lines(like: &Document, lines: Vec<String>) -> Self {
        let mut doc = Self {
            path: like.path.clone(),
            lines,
            trailing_newline: like.trailing_newline,
            checksum: String::new(),
        };
        doc.checksum = checksum(&doc.to_text());
        doc
    }

    /// Same lines with the given final-terminator setting
    pub fn with_trailing_newline(mut self, trailing_newline: bool) -> Self {
        if self.trailing_newline != trailing_newline {
            self.trailing_newline = trailing_newline;
            self.checksum = checksum(&self.to_text());
        }
        self
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Raw text of a 1-indexed line
    pub fn line(&self, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
    }

    /// Visible text of a 1-indexed line
    pub fn visible_line(&self, line: usize) -> Option<Cow<'_, str>> {
        self.line(line).map(visible_text)
    }

    /// Visible length of a 1-indexed line, in characters
    pub fn line_len(&self, line: usize) -> Option<usize> {
        self.visible_line(line).map(|l| l.chars().count())
    }

    /// Extract `length` characters starting at `line:column`
    ///
    /// Returns `None` when the line does not exist or the run extends past
    /// the end of the line.
    pub fn extract(&self, line: usize, column: usize, length: usize) -> Option<String> {
        let text = self.visible_line(line)?;
        let end = column.checked_add(length)?;
        if end > text.chars().count() {
            return None;
        }
        Some(text.chars().skip(column).take(length).collect())
    }

    /// Serialize back to text
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            text.push('\n');
        }
        text
    }

    /// File name for display
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Read a file from disk with UTF-8 validation
///
/// # Returns
/// * `Ok(String)` - File content
/// * `Err(FileError)` - File not found, I/O error, or invalid UTF-8
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String, FileError> {
    let path_ref = path.as_ref();

    if !path_ref.exists() {
        return Err(FileError::NotFound(path_ref.display().to_string()));
    }

    let bytes = fs::read(path_ref)?;
    String::from_utf8(bytes).map_err(|_| FileError::InvalidUtf8(path_ref.display().to_string()))
}

/// Read a document from disk
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<Document, FileError> {
    let path_ref = path.as_ref();
    let text = read_text(path_ref)?;
    Ok(Document::from_text(path_ref, &text))
}

/// Fail if the file on disk no longer hashes to `expected`
pub fn ensure_unchanged<P: AsRef<Path>>(path: P, expected: &str) -> Result<(), FileError> {
    let path_ref = path.as_ref();
    let actual = checksum(&read_text(path_ref)?);
    if actual == expected {
        Ok(())
    } else {
        Err(FileError::ChecksumChanged {
            path: path_ref.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Replace a file's content atomically
///
/// The content goes to a temporary file in the same directory, is synced,
/// then renamed over the target.
pub fn write_atomic<P: AsRef<Path>>(path: P, content: &str) -> Result<(), FileError> {
    let path_ref = path.as_ref();
    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(path_ref))?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path_ref).map_err(|e| FileError::IoError(e.error.to_string()))?;
    Ok(())
}

/// Replace several files together
///
/// Every new content is staged in a synced temporary file first; the
/// renames happen only once all of them are staged, so a failure while
/// staging leaves every target untouched.
pub fn write_all_atomic<P: AsRef<Path>>(files: &[(P, String)]) -> Result<(), FileError> {
    let mut staged = Vec::with_capacity(files.len());
    for (path, content) in files {
        let path_ref = path.as_ref();
        let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(path_ref))?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        staged.push((tmp, path_ref));
    }
    for (tmp, path) in staged {
        tmp.persist(path).map_err(|e| FileError::IoError(e.error.to_string()))?;
    }
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_round_trips() {
        for text in ["", "one", "one\n", "one\ntwo\n", "a\r\nb\r\n", "\n\n", "x\n\ny"] {
            let doc = Document::from_text("t.txt", text);
            assert_eq!(doc.to_text(), text, "round trip of {text:?}");
            assert_eq!(doc.checksum, checksum(text));
        }
    }

    #[test]
    fn test_line_access_is_one_indexed() {
        let doc = Document::from_text("t.txt", "first\nsecond\n");

        assert_eq!(doc.line_count(), 2);
        assert_eq!(doc.line(0), None);
        assert_eq!(doc.line(1), Some("first"));
        assert_eq!(doc.line(2), Some("second"));
        assert_eq!(doc.line(3), None);
    }

    #[test]
    fn test_visible_text_strips_sgr_codes() {
        assert_eq!(visible_text("\x1b[31mred\x1b[0m"), "red");
        assert_eq!(visible_text("\x1b[1;32mbold green\x1b[m!"), "bold green!");
        assert_eq!(visible_text("plain\r"), "plain");
        // Unterminated sequences are kept
        assert_eq!(visible_text("a\x1b[12b"), "a\x1b[12b");
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(""));
        assert!(is_blank_line("   \t"));
        assert!(is_blank_line("\x1b[0m"));
        assert!(is_blank_line("\x1b[32m  \x1b[0m\r"));
        assert!(!is_blank_line("x"));
        assert!(!is_blank_line("\x1b[31m.\x1b[0m"));
    }

    #[test]
    fn test_extract_counts_characters_on_visible_text() {
        let doc = Document::from_text("t.txt", "\x1b[33mhéllo\x1b[0m world\n");

        assert_eq!(doc.extract(1, 0, 5).as_deref(), Some("héllo"));
        assert_eq!(doc.extract(1, 6, 5).as_deref(), Some("world"));
        assert_eq!(doc.extract(1, 11, 0).as_deref(), Some(""));
        assert_eq!(doc.extract(1, 7, 5), None);
        assert_eq!(doc.extract(2, 0, 0), None);
    }

    #[test]
    fn test_read_document_not_found() {
        let result = read_document("/nonexistent/path/that/does/not/exist.txt");

        match result {
            Err(FileError::NotFound(p)) => assert!(p.contains("nonexistent")),
            other => panic!("Expected FileError::NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_read_document_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("invalid.txt");
        fs::write(&file_path, [0xFFu8, 0xFE, 0xFD]).unwrap();

        match read_document(&file_path) {
            Err(FileError::InvalidUtf8(p)) => assert_eq!(p, file_path.display().to_string()),
            other => panic!("Expected FileError::InvalidUtf8, got {:?}", other),
        }
    }

    #[test]
    fn test_write_atomic_and_ensure_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("doc.txt");
        write_atomic(&file_path, "alpha\nbeta\n").unwrap();

        let doc = read_document(&file_path).unwrap();
        assert_eq!(doc.lines, vec!["alpha", "beta"]);
        assert!(ensure_unchanged(&file_path, &doc.checksum).is_ok());

        fs::write(&file_path, "alpha\n").unwrap();
        assert!(matches!(
            ensure_unchanged(&file_path, &doc.checksum),
            Err(FileError::ChecksumChanged { .. })
        ));
    }

    #[test]
    fn test_write_all_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.txt");
        let second = dir.path().join("two.md");
        fs::write(&first, "old").unwrap();

        write_all_atomic(&[(&first, "new one".to_string()), (&second, "new two".to_string())]).unwrap();

        assert_eq!(fs::read_to_string(&first).unwrap(), "new one");
        assert_eq!(fs::read_to_string(&second).unwrap(), "new two");
    }
}
