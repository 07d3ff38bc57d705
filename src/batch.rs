//! Batch driver: compact documents and keep their mapping tables in step.
//!
//! Each unit is one document pair plus its mapping table. A unit is
//! atomic with respect to its own files: either the edited document and
//! the rewritten table are both written, or neither is. Units are
//! independent; a failed unit is reported and the run moves on.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::file::{self, Document, FileError, ensure_unchanged, is_blank_line, read_document, write_all_atomic};
use crate::remap::{LineRemovedError, RemapTable, remap_groups};
use crate::store::{MappingTable, Side, StoreError};
use crate::verify::{VerifyError, verify};

/// One document pair and its mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Document A
    pub source: PathBuf,
    /// Document B
    pub transcript: PathBuf,
    /// Markdown mapping table linking them
    pub mapping: PathBuf,
    /// Which document loses its blank lines
    #[serde(default)]
    pub side: Side,
}

/// Settings that apply to every unit of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Verify everything but write nothing
    pub dry_run: bool,
}

/// Error types for a batch unit; any of them aborts the unit
#[derive(Debug)]
pub enum BatchError {
    File(FileError),
    Store(StoreError),
    Remap(LineRemovedError),
    Verify(VerifyError),
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::File(e) => write!(f, "{}", e),
            BatchError::Store(e) => write!(f, "{}", e),
            BatchError::Remap(e) => write!(f, "{}", e),
            BatchError::Verify(e) => write!(f, "Verification failed: {}", e),
        }
    }
}

impl std::error::Error for BatchError {}

impl From<FileError> for BatchError {
    fn from(err: FileError) -> Self {
        BatchError::File(err)
    }
}

impl From<StoreError> for BatchError {
    fn from(err: StoreError) -> Self {
        BatchError::Store(err)
    }
}

impl From<LineRemovedError> for BatchError {
    fn from(err: LineRemovedError) -> Self {
        BatchError::Remap(err)
    }
}

impl From<VerifyError> for BatchError {
    fn from(err: VerifyError) -> Self {
        BatchError::Verify(err)
    }
}

/// What happened to a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Both files rewritten
    Committed,
    /// Nothing to remove; files untouched
    Unchanged,
    /// Dry run passed verification; files untouched
    Verified,
    /// Failed; files untouched
    Aborted,
}

/// Outcome of one unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub document: String,
    pub mapping: String,
    pub side: Side,
    pub status: UnitStatus,
    /// Old line numbers removed from the document
    pub removed_lines: Vec<usize>,
    pub groups: usize,
    pub spans_checked: usize,
    pub checksum_before: Option<String>,
    pub checksum_after: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub units: Vec<UnitReport>,
    pub committed: usize,
    pub aborted: usize,
}

impl RunReport {
    /// True when no unit aborted
    pub fn is_complete_success(&self) -> bool {
        self.aborted == 0
    }
}

/// Generate a fresh run identifier
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

impl Unit {
    fn edited_path(&self) -> &PathBuf {
        match self.side {
            Side::Source => &self.source,
            Side::Target => &self.transcript,
        }
    }

    fn report(&self, status: UnitStatus) -> UnitReport {
        UnitReport {
            document: self.edited_path().display().to_string(),
            mapping: self.mapping.display().to_string(),
            side: self.side,
            status,
            removed_lines: Vec::new(),
            groups: 0,
            spans_checked: 0,
            checksum_before: None,
            checksum_after: None,
            error: None,
        }
    }
}

/// Remap, verify and (unless dry-running) commit one unit
///
/// Every failure returns before anything is written.
pub fn process_unit(unit: &Unit, options: BatchOptions) -> Result<UnitReport, BatchError> {
    let source = read_document(&unit.source)?;
    let transcript = read_document(&unit.transcript)?;
    let mut table = MappingTable::parse(read_document(&unit.mapping)?)?;
    let groups = table.groups();

    let original: &Document = match unit.side {
        Side::Source => &source,
        Side::Target => &transcript,
    };
    let remap = RemapTable::build(original, is_blank_line);
    let edited = remap.apply(original);

    let mut report = unit.report(UnitStatus::Unchanged);
    report.groups = groups.len();
    report.removed_lines = remap.removed_lines();
    report.checksum_before = Some(original.checksum.clone());

    let remapped = remap_groups(&groups, unit.side, &remap)?;
    report.spans_checked = verify(&source, &transcript, &edited, unit.side, &remap, &groups)?;

    if remap.is_identity() {
        return Ok(report);
    }

    let mapping_checksum = table.document().checksum.clone();
    table.apply(&remapped)?;
    report.checksum_after = Some(edited.checksum.clone());

    if options.dry_run {
        report.status = UnitStatus::Verified;
        return Ok(report);
    }

    ensure_unchanged(&original.path, &original.checksum)?;
    ensure_unchanged(&unit.mapping, &mapping_checksum)?;
    write_all_atomic(&[
        (&unit.mapping, table.to_text()),
        (&original.path, edited.to_text()),
    ])?;

    report.status = UnitStatus::Committed;
    Ok(report)
}

/// Process every unit in order, continuing past failures
pub fn run_batch(units: &[Unit], options: BatchOptions) -> RunReport {
    let run_id = generate_run_id();
    info!(run_id = %run_id, units = units.len(), dry_run = options.dry_run, "starting batch");

    let mut reports = Vec::with_capacity(units.len());
    for unit in units {
        let document = unit.edited_path().display().to_string();
        let report = match process_unit(unit, options) {
            Ok(report) => {
                info!(
                    run_id = %run_id,
                    document = %document,
                    status = ?report.status,
                    removed = report.removed_lines.len(),
                    spans = report.spans_checked,
                    "unit finished"
                );
                report
            }
            Err(err) => {
                error!(run_id = %run_id, document = %document, error = %err, "unit aborted, files left untouched");
                let mut report = unit.report(UnitStatus::Aborted);
                report.error = Some(err.to_string());
                report
            }
        };
        reports.push(report);
    }

    let committed = reports.iter().filter(|r| r.status == UnitStatus::Committed).count();
    let aborted = reports.iter().filter(|r| r.status == UnitStatus::Aborted).count();
    if aborted > 0 {
        warn!(run_id = %run_id, aborted, committed, "batch finished with aborted units");
    }

    RunReport {
        run_id,
        units: reports,
        committed,
        aborted,
    }
}

/// Read a JSON list of units
pub fn read_manifest(path: &std::path::Path) -> Result<Vec<Unit>, Box<dyn std::error::Error>> {
    let text = file::read_text(path)?;
    let units: Vec<Unit> = serde_json::from_str(&text)?;
    Ok(units)
}
