//! Reconciliation engine shared by attendance, journals and grade ranking.
//!
//! A recurring weekly template (or a class roster) says what *should* exist on
//! a date; sparse override records say what was actually recorded. The engine
//! merges the two into an editable row set, mirrors edits across rows of the
//! same subject, derives recap/ranking aggregates with holiday and weekend
//! exclusion, and plans the minimal set of writes for the persistence layer.
//!
//! Every stage is a pure function over its inputs. Nothing here performs I/O;
//! fetching and committing are the caller's concern (see `crate::db`).

pub mod aggregate;
pub mod calendar;
pub mod date;
pub mod error;
pub mod merge;
pub mod model;
pub mod payload;
pub mod plan;
pub mod propagate;
pub mod session;
pub mod template;

pub use aggregate::{
    compute_attendance_stats, compute_ranks, subject_final_score, subject_scores_from_grades,
    AttendanceCounts, AttendanceRecap, ClassroomRates, EntityAttendance, Rank, RankEntry,
    SubjectScores,
};
pub use calendar::{classify, CalendarIndex, Classification, ExclusionReason};
pub use date::CalendarDate;
pub use error::{EngineError, Warning, WarningKind};
pub use merge::{merge, MatchPolicy};
pub use model::{
    AggregateResult, HolidayCategory, HolidayEntry, IdentityKey, MaterializedRow, OverrideRecord,
    RecurringSlot, RosterMember, RowOrigin,
};
pub use payload::{
    AttendancePayload, AttendanceStatus, GradeComponentPayload, JournalPayload, Payload,
    RecordKind, RecordPayload,
};
pub use plan::{plan, UpsertPlan};
pub use propagate::{propagate, propagate_by_payload_group};
pub use session::ReconciliationSession;
pub use template::{expand, expand_range, expand_roster, ExpectedOccurrence};
