#![forbid(unsafe_code)]
#![warn(
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Audio replacement evaluation, backup-swap-verify execution and reporting.
//!
//! Layout: `probe.rs` (ffprobe-backed property extraction), `compare.rs`
//! (directional quality verdicts), `safety.rs` (replacement veto),
//! `orchestrator.rs` (evaluate, batch, execute), `report.rs` (JSON/Markdown
//! renderings and summaries), `model/` (outcome types), `error.rs`.

pub mod compare;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod safety;

pub use compare::{DURATION_TOLERANCE, EXTRACTION_FAILED, QualityComparator, compare_properties};
pub use error::{ExtractionError, RepairError, RepairResult};
pub use model::{
    AudioProperties, BackupRecord, BatchResult, Decision, ExecutionResult, ExecutionStage,
    QualityComparison, ReplacementDecision, RollbackStatus,
};
pub use orchestrator::{QUALITY_ACCEPTABLE, RepairOrchestrator};
pub use probe::{FfprobeInspector, MediaInspector, parse_probe_output};
pub use report::{
    RepairReport, ReportEnvelope, ReportFormat, ReportKind, SummaryReport, read_report,
    render_json, render_markdown, write_report,
};
pub use safety::{PolicySafetyGate, SafetyGate, SafetyVerdict};
