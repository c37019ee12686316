//! Conversation log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which conversation stream an entry belongs to. The session's current
/// mode selects the track an exchange reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    #[default]
    Narrative,
    Combat,
}

impl Track {
    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Narrative => "narrative",
            Track::Combat => "combat",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Track {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "narrative" => Ok(Track::Narrative),
            "combat" => Ok(Track::Combat),
            other => Err(format!("unknown track: {other}")),
        }
    }
}

/// The two logs kept for every track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogView {
    /// Everything ever produced. Shown to the player.
    Full,
    /// What the completion service sees. May be compacted.
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartKind {
    UserInput,
    ModelText,
    ToolInvocation,
    ToolResult,
}

/// One piece of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub kind: PartKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Part {
    pub fn new(kind: PartKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Cheap token approximation: four characters per token, rounded up.
    pub fn estimated_tokens(&self) -> usize {
        self.content.chars().count().div_ceil(4)
    }
}

/// One turn of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: EntryKind,
    pub parts: Vec<Part>,

    /// Written by the engine rather than the player or the model, e.g. a
    /// history summary.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl LogEntry {
    pub fn request(parts: Vec<Part>) -> Self {
        Self {
            kind: EntryKind::Request,
            parts,
            synthetic: false,
        }
    }

    pub fn response(parts: Vec<Part>) -> Self {
        Self {
            kind: EntryKind::Response,
            parts,
            synthetic: false,
        }
    }

    /// A player's message.
    pub fn user_input(text: impl Into<String>) -> Self {
        Self::request(vec![Part::new(PartKind::UserInput, text)])
    }

    /// Plain narration from the model.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::response(vec![Part::new(PartKind::ModelText, text)])
    }

    /// A notice from the engine to the player.
    pub fn system_notice(text: impl Into<String>) -> Self {
        let mut entry = Self::model_text(format!("[System] {}", text.into()));
        entry.synthetic = true;
        entry
    }

    /// Concatenated content of parts of the given kind.
    pub fn text_of(&self, kind: PartKind) -> String {
        self.parts
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Player-facing text: the player's words or the model's narration.
    pub fn display_text(&self) -> String {
        match self.kind {
            EntryKind::Request => self.text_of(PartKind::UserInput),
            EntryKind::Response => self.text_of(PartKind::ModelText),
        }
    }

    pub fn estimated_tokens(&self) -> usize {
        self.parts.iter().map(Part::estimated_tokens).sum()
    }
}

/// Token estimate for a whole log.
pub fn estimate_tokens(entries: &[LogEntry]) -> usize {
    entries.iter().map(LogEntry::estimated_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate_rounds_up_per_part() {
        let entry = LogEntry::response(vec![
            Part::new(PartKind::ModelText, "abcde"),
            Part::new(PartKind::ToolInvocation, "abcd"),
            Part::new(PartKind::ToolResult, ""),
        ]);
        assert_eq!(entry.estimated_tokens(), 2 + 1);
        assert_eq!(estimate_tokens(&[entry.clone(), entry]), 6);
    }

    #[test]
    fn test_serialized_tags() {
        let entry = LogEntry::user_input("I open the door");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "request");
        assert_eq!(json["parts"][0]["kind"], "user-input");
        assert!(json.get("synthetic").is_none());

        let back: LogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_display_text_skips_tool_parts() {
        let entry = LogEntry::response(vec![
            Part::new(PartKind::ModelText, "The goblin snarls."),
            Part::new(PartKind::ToolInvocation, "{\"name\":\"start_combat\"}"),
        ]);
        assert_eq!(entry.display_text(), "The goblin snarls.");
    }

    #[test]
    fn test_system_notice_is_synthetic() {
        let notice = LogEntry::system_notice("combat was lost");
        assert!(notice.synthetic);
        assert_eq!(notice.kind, EntryKind::Response);
        assert!(notice.display_text().starts_with("[System]"));
    }

    #[test]
    fn test_track_parse() {
        assert_eq!("Combat".parse::<Track>(), Ok(Track::Combat));
        assert!("arena".parse::<Track>().is_err());
        assert_eq!(Track::default().to_string(), "narrative");
    }
}
