// Position grammar module
pub mod position;

// Span shapes module
pub mod span;

// File operations module
pub mod file;

// Line remapping module
pub mod remap;

// Mapping table module
pub mod store;

// Verification module
pub mod verify;

// Overlap rendering module
pub mod render;

// Interactive session module
pub mod session;

// HTML artifact module
pub mod artifact;

// Batch driver module
pub mod batch;

// Re-exports
pub use position::{ParseError, Position};
pub use span::{LineRun, Single, Span};
pub use file::{Document, FileError, checksum, is_blank_line, read_document, visible_text};
pub use remap::{LineRemovedError, RemapTable, remap_group, remap_groups, remap_position, remap_span};
pub use store::{Group, GroupId, MappingTable, Side, StoreError};
pub use verify::{VerifyError, verify};
pub use render::{
    Connector, GroupDetail, Pane, Rendered, RenderedLine, Segment, SegmentStyle,
    TargetDetail, PALETTE_SIZE, partition_line, render_pair, render_pane,
};
pub use session::{Event, GeometryTicket, Interaction, Session};
pub use artifact::{ArtifactError, build_artifact, generate_artifact};
pub use batch::{
    BatchError, BatchOptions, RunReport, Unit, UnitReport, UnitStatus,
    generate_run_id, process_unit, read_manifest, run_batch,
};
