//! Game configuration.

use crate::dice::RollGranularity;
use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Configuration shared by the dispatcher, the summarizer and the game master.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Root directory for sessions, logs, combats and characters.
    pub data_dir: PathBuf,

    /// Estimated tokens the model log may reach before it is compacted.
    pub token_budget: usize,

    /// Entries kept verbatim when the model log is compacted.
    pub keep_recent: usize,

    /// Die used for attack and defense draws.
    pub roll_granularity: RollGranularity,

    /// Model to use. `None` keeps the client default.
    pub model: Option<String>,

    /// Maximum tokens for game master responses.
    pub max_tokens: usize,

    /// Temperature for game master generation.
    pub temperature: Option<f32>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("gamedata"),
            token_budget: 4000,
            keep_recent: 4,
            roll_granularity: RollGranularity::D20,
            model: None,
            max_tokens: 4096,
            temperature: Some(0.8),
        }
    }
}

impl GameConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `CHRONICLE_*` environment variables.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("CHRONICLE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(budget) = parsed_var("CHRONICLE_TOKEN_BUDGET") {
            config.token_budget = budget;
        }
        if let Some(keep) = parsed_var("CHRONICLE_KEEP_RECENT") {
            config.keep_recent = keep;
        }
        if let Some(granularity) = parsed_var("CHRONICLE_ROLL_DIE") {
            config.roll_granularity = granularity;
        }
        if let Ok(model) = env::var("CHRONICLE_MODEL") {
            if !model.trim().is_empty() {
                config.model = Some(model);
            }
        }

        config
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the compaction budget.
    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }

    /// Set how many recent entries survive compaction.
    pub fn with_keep_recent(mut self, keep: usize) -> Self {
        self.keep_recent = keep;
        self
    }

    pub fn with_roll_granularity(mut self, granularity: RollGranularity) -> Self {
        self.roll_granularity = granularity;
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set max tokens for responses.
    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    /// Set temperature for generation.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}
