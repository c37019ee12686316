//! Dual-track conversation history.
//!
//! Every session keeps two logs per track. The full log is the player's
//! transcript and is only appended to. The model log is what the completion
//! service is shown; it is replaced wholesale after each exchange and may
//! have its older entries folded into a single summary.

mod entry;
mod store;
mod summarizer;

pub use entry::{estimate_tokens, EntryKind, LogEntry, LogView, Part, PartKind, Track};
pub use store::{FileLogStore, LogStore, MemoryLogStore};
pub use summarizer::{
    is_summary, render_transcript, summary_entry, HistorySummarizer, SUMMARY_PREFIX,
};
