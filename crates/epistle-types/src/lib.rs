//! Shared domain types for the Epistle mail agent.
//!
//! Defines the canonical data model that flows through the system:
//! raw [`SourceItem`]s fetched from a mailbox, normalized
//! [`StructuredRecord`]s produced by extraction, the [`Intent`] a user
//! turn classifies into, and the report/reminder types the pipeline and
//! scheduler emit. The [`normalize`] module is the schema gate: every
//! model-extracted payload passes through it before anything is stored.

pub mod intent;
pub mod normalize;
pub mod record;
pub mod reminder;
pub mod report;

pub use intent::{Intent, IntentAction, TimeWindow};
pub use normalize::{NormalizationError, Normalizer, parse_amount, parse_calendar_date};
pub use record::{AttachmentRef, DedupEntry, RecordType, SourceItem, StructuredRecord};
pub use reminder::{Channel, Reminder, ReminderStatus};
pub use report::{IngestionReport, MatchOrigin, SearchHit, TurnResponse};
