//! Edits to a schedule after it has been generated.

pub mod absence;
pub mod adhoc;

pub use absence::{handle_absence, handle_absence_record, handle_absences, AbsenceOutcome, Backfill};
pub use adhoc::{apply_adjustment, preview_extra_break, preview_swap, AdjustmentPreview, PreviewSummary};
