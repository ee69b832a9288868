//! Data model for observed pull-request activity.

pub mod ack;
pub mod actionable;
pub mod entry;
pub mod pr;
pub mod sync_meta;
pub mod worklist;

pub use ack::AckRecord;
pub use actionable::{ActionableItem, ActionableReport, Perspective};
pub use entry::{CommentSubtype, Entry, EntryType, FileActivity, GraphiteInfo, Reactions};
pub use pr::{PrMeta, PrState};
pub use sync_meta::{SyncMeta, SyncScope};
pub use worklist::{ReviewStateCounts, TypeCounts, WorklistEntry};
