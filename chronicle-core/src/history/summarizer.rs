//! Token-budget compaction of the model log.

use super::entry::{estimate_tokens, EntryKind, LogEntry, Part, PartKind};
use crate::gm::CompletionService;
use tracing::{debug, info, warn};

/// Leading text of every summary entry.
pub const SUMMARY_PREFIX: &str = "SUMMARY OF PAST EVENTS:";

const SUMMARY_INSTRUCTION: &str = "You keep the records for a tabletop role-playing game. \
Produce a concise summary of the following game history as a single paragraph. \
Keep the names of characters and places, injuries, items gained or lost, \
promises made and threads left unresolved. Do not invent anything.";

/// Replaces the older part of an over-budget model log with one summary.
#[derive(Debug, Clone, Copy)]
pub struct HistorySummarizer {
    token_budget: usize,
    keep_recent: usize,
}

impl HistorySummarizer {
    pub fn new(token_budget: usize, keep_recent: usize) -> Self {
        Self {
            token_budget,
            keep_recent,
        }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn keep_recent(&self) -> usize {
        self.keep_recent
    }

    /// Over budget and long enough that there is a prefix to fold away.
    pub fn needs_compaction(&self, log: &[LogEntry]) -> bool {
        log.len() > self.keep_recent && estimate_tokens(log) > self.token_budget
    }

    /// Compact `log` if it is over budget. A failed summarization call
    /// returns the log untouched; the next exchange tries again.
    pub async fn maybe_compact(
        &self,
        log: Vec<LogEntry>,
        service: &dyn CompletionService,
    ) -> Vec<LogEntry> {
        if !self.needs_compaction(&log) {
            return log;
        }

        let split = log.len() - self.keep_recent;
        let transcript = render_transcript(&log[..split]);
        debug!(
            entries = split,
            tokens = estimate_tokens(&log),
            budget = self.token_budget,
            "compacting model log"
        );

        match service.summarize(SUMMARY_INSTRUCTION, &transcript).await {
            Ok(summary) => {
                let mut compacted = Vec::with_capacity(self.keep_recent + 1);
                compacted.push(summary_entry(summary.trim()));
                compacted.extend(log.into_iter().skip(split));
                info!(
                    summarized = split,
                    kept = compacted.len() - 1,
                    "model log compacted"
                );
                compacted
            }
            Err(e) => {
                warn!(error = %e, "summarization failed, keeping full model log");
                log
            }
        }
    }
}

/// The synthetic entry standing in for a compacted prefix.
pub fn summary_entry(summary: &str) -> LogEntry {
    let mut entry = LogEntry::response(vec![Part::new(
        PartKind::ModelText,
        format!("{SUMMARY_PREFIX} {summary}"),
    )]);
    entry.synthetic = true;
    entry
}

pub fn is_summary(entry: &LogEntry) -> bool {
    entry.synthetic
        && entry
            .parts
            .first()
            .is_some_and(|p| p.content.starts_with(SUMMARY_PREFIX))
}

/// Plain-text rendering of entries for a summarization call.
pub fn render_transcript(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        for part in &entry.parts {
            let speaker = match (entry.kind, part.kind) {
                (_, PartKind::UserInput) => "Player",
                (_, PartKind::ToolInvocation) => "Game action",
                (_, PartKind::ToolResult) => "Game result",
                (EntryKind::Request, PartKind::ModelText) => "Note",
                (EntryKind::Response, PartKind::ModelText) => "Game master",
            };
            out.push_str(speaker);
            out.push_str(": ");
            out.push_str(&part.content);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGameMaster;

    fn long_log(exchanges: usize) -> Vec<LogEntry> {
        (0..exchanges)
            .flat_map(|i| {
                [
                    LogEntry::user_input(format!("I search room {i} carefully.")),
                    LogEntry::model_text("x".repeat(400)),
                ]
            })
            .collect()
    }

    #[tokio::test]
    async fn test_under_budget_is_untouched() {
        let gm = MockGameMaster::new();
        let summarizer = HistorySummarizer::new(10_000, 2);
        let log = long_log(3);
        let out = summarizer.maybe_compact(log.clone(), &gm).await;
        assert_eq!(out, log);
        assert_eq!(gm.summary_calls(), 0);
    }

    #[tokio::test]
    async fn test_over_budget_keeps_suffix_verbatim() {
        let gm = MockGameMaster::new().with_summary("The hero searched six rooms.");
        let summarizer = HistorySummarizer::new(200, 3);
        let log = long_log(6);

        let out = summarizer.maybe_compact(log.clone(), &gm).await;
        assert_eq!(out.len(), 4);
        assert!(is_summary(&out[0]));
        assert_eq!(
            out[0].display_text(),
            "SUMMARY OF PAST EVENTS: The hero searched six rooms."
        );
        assert_eq!(&out[1..], &log[log.len() - 3..]);
        assert_eq!(gm.summary_calls(), 1);
    }

    #[tokio::test]
    async fn test_short_log_is_never_compacted() {
        let gm = MockGameMaster::new();
        let summarizer = HistorySummarizer::new(1, 4);
        let log = long_log(2);
        let out = summarizer.maybe_compact(log.clone(), &gm).await;
        assert_eq!(out, log);
    }

    #[tokio::test]
    async fn test_failed_summary_keeps_log() {
        let gm = MockGameMaster::new().failing_summaries();
        let summarizer = HistorySummarizer::new(100, 1);
        let log = long_log(4);
        let out = summarizer.maybe_compact(log.clone(), &gm).await;
        assert_eq!(out, log);
        assert_eq!(gm.summary_calls(), 1);
    }

    #[test]
    fn test_render_transcript() {
        let text = render_transcript(&[
            LogEntry::user_input("I draw my sword"),
            LogEntry::model_text("The bandit flees."),
        ]);
        assert_eq!(text, "Player: I draw my sword\nGame master: The bandit flees.\n");
    }
}
