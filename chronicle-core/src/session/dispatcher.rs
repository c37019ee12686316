//! The session state machine.
//!
//! Every player message goes through [`SessionDispatcher::dispatch`]: the
//! session's mode picks the log track and the handler, the model log is
//! compacted if it has outgrown its budget, the completion service runs the
//! exchange, and the result is committed in a fixed order (full log, model
//! log, combat and character writes, session record). Handlers only plan
//! those writes, so a failed exchange or log write commits nothing beyond
//! what the game master's tools already did.

use super::record::SessionRecord;
use super::store::{FileSessionStore, MemorySessionStore, SessionStore};
use super::effects::Effects;
use super::{combat, narrative, ScenarioStatus, SessionError};
use crate::actions::ActionResolver;
use crate::character::{CharacterService, FileCharacterStore, MemoryCharacterStore};
use crate::combat::{CombatState, CombatStore, FileCombatStore, MemoryCombatStore, TurnEngine};
use crate::config::GameConfig;
use crate::gm::prompts::{combat_prompt, narrative_prompt};
use crate::gm::{CompletionRequest, CompletionService, ToolContext, TurnOutcome};
use crate::history::{
    FileLogStore, HistorySummarizer, LogEntry, LogStore, LogView, MemoryLogStore, Track,
};
use crate::ids::{CharacterId, SessionId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// The storage a dispatcher works against.
#[derive(Clone)]
pub struct GameStores {
    pub sessions: Arc<dyn SessionStore>,
    pub logs: Arc<dyn LogStore>,
    pub combats: Arc<dyn CombatStore>,
    pub characters: Arc<dyn CharacterService>,
}

impl GameStores {
    /// JSON files under `data_dir`.
    pub fn file(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            sessions: Arc::new(FileSessionStore::new(dir)),
            logs: Arc::new(FileLogStore::new(dir)),
            combats: Arc::new(FileCombatStore::new(dir)),
            characters: Arc::new(FileCharacterStore::new(dir)),
        }
    }

    pub fn memory() -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            logs: Arc::new(MemoryLogStore::new()),
            combats: Arc::new(MemoryCombatStore::new()),
            characters: Arc::new(MemoryCharacterStore::new()),
        }
    }
}

/// What one exchange produced.
#[derive(Debug, Clone)]
pub struct TranscriptDelta {
    /// Entries added to the full log by this call, in order. Engine notices
    /// come first.
    pub new_entries: Vec<LogEntry>,

    /// The full log of `track` after the exchange.
    pub transcript: Vec<LogEntry>,

    /// The track the exchange ran on.
    pub track: Track,

    /// The session's mode after the exchange.
    pub mode: Track,

    pub scenario_status: ScenarioStatus,
    pub outcome: TurnOutcome,
}

/// Routes player messages to the narrative or combat handler and commits
/// the results.
pub struct SessionDispatcher {
    stores: GameStores,
    completion: Arc<dyn CompletionService>,
    actions: ActionResolver,
    summarizer: HistorySummarizer,
    locks: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
    create_lock: AsyncMutex<()>,
}

impl SessionDispatcher {
    pub fn new(
        stores: GameStores,
        completion: Arc<dyn CompletionService>,
        config: &GameConfig,
    ) -> Self {
        let engine = TurnEngine::new(config.roll_granularity);
        let actions =
            ActionResolver::new(stores.combats.clone(), stores.characters.clone(), engine);
        Self {
            stores,
            completion,
            actions,
            summarizer: HistorySummarizer::new(config.token_budget, config.keep_recent),
            locks: Mutex::new(HashMap::new()),
            create_lock: AsyncMutex::new(()),
        }
    }

    /// Seed the dice used by game actions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.actions = self.actions.with_seed(seed);
        self
    }

    pub fn stores(&self) -> &GameStores {
        &self.stores
    }

    pub fn summarizer(&self) -> &HistorySummarizer {
        &self.summarizer
    }

    /// Play one player message against a session.
    pub async fn dispatch(
        &self,
        session_id: SessionId,
        message: &str,
    ) -> Result<TranscriptDelta, SessionError> {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.play_exchange(session_id, message).await
        };
        self.release_lock(session_id, lock);
        result
    }

    async fn play_exchange(
        &self,
        session_id: SessionId,
        message: &str,
    ) -> Result<TranscriptDelta, SessionError> {
        let mut record = self.load_record(session_id)?;
        if record.scenario_status.is_terminal() {
            info!(
                session = %session_id,
                status = %record.scenario_status,
                "message for a concluded scenario"
            );
        }

        let mut notices = Vec::new();
        let mut effects = Effects::default();
        let active_combat = if record.in_combat() {
            self.recover_combat(&mut record, &mut notices, &mut effects)?
        } else {
            None
        };

        let track = record.mode;
        let history = self
            .stores
            .logs
            .load(session_id, track, LogView::Model)?;
        let history = self
            .summarizer
            .maybe_compact(history, self.completion.as_ref())
            .await;

        let system_prompt = match &active_combat {
            Some(state) => combat_prompt(state),
            None => {
                let sheet = self.stores.characters.sheet(record.character_id)?;
                narrative_prompt(&record.scenario_id, &sheet)
            }
        };
        let request = CompletionRequest {
            system_prompt,
            user_message: message.to_string(),
            history,
            context: ToolContext {
                session_id,
                character_id: record.character_id,
                track,
            },
        };

        let completion = match self.completion.complete(request, &self.actions).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!(session = %session_id, error = %e, "exchange failed");
                return Err(e.into());
            }
        };
        debug!(
            session = %session_id,
            %track,
            outcome = completion.outcome.label(),
            entries = completion.new_entries.len(),
            "exchange complete"
        );

        match track {
            Track::Narrative => narrative::apply_outcome(
                &self.stores,
                &mut record,
                &completion.outcome,
                &mut effects,
            )?,
            Track::Combat => combat::apply_outcome(
                &self.stores,
                self.actions.engine(),
                &mut record,
                &completion.outcome,
                &mut effects,
            )?,
        }

        // Logs first: nothing below runs unless both were written.
        notices.extend(completion.new_entries);
        self.stores
            .logs
            .append(session_id, track, LogView::Full, &notices)?;
        self.stores
            .logs
            .replace(session_id, track, LogView::Model, &completion.all_entries)?;
        effects.apply(&self.stores, &record)?;
        narrative::check_death(&self.stores, &mut record);
        record.touch();
        self.stores.sessions.save(&record)?;

        let transcript = self.stores.logs.load(session_id, track, LogView::Full)?;
        Ok(TranscriptDelta {
            new_entries: notices,
            transcript,
            track,
            mode: record.mode,
            scenario_status: record.scenario_status,
            outcome: completion.outcome,
        })
    }

    /// Remove one entry from a full log by index. The model log keeps it.
    pub async fn delete_entry(
        &self,
        session_id: SessionId,
        track: Track,
        index: usize,
    ) -> Result<LogEntry, SessionError> {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.remove_entry(session_id, track, index)
        };
        self.release_lock(session_id, lock);
        result
    }

    fn remove_entry(
        &self,
        session_id: SessionId,
        track: Track,
        index: usize,
    ) -> Result<LogEntry, SessionError> {
        self.load_record(session_id)?;
        match self
            .stores
            .logs
            .remove(session_id, track, LogView::Full, index)?
        {
            Some(entry) => {
                info!(session = %session_id, %track, index, "log entry deleted");
                Ok(entry)
            }
            None => {
                let len = self
                    .stores
                    .logs
                    .load(session_id, track, LogView::Full)?
                    .len();
                Err(SessionError::NotFound(if len == 0 {
                    format!("entry {index}: the {track} log is empty")
                } else {
                    format!("entry {index}: valid range is 0..={}", len - 1)
                }))
            }
        }
    }

    /// The full log of a track.
    pub fn transcript(
        &self,
        session_id: SessionId,
        track: Track,
    ) -> Result<Vec<LogEntry>, SessionError> {
        self.load_record(session_id)?;
        Ok(self.stores.logs.load(session_id, track, LogView::Full)?)
    }

    pub fn session(&self, session_id: SessionId) -> Result<SessionRecord, SessionError> {
        self.load_record(session_id)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>, SessionError> {
        Ok(self.stores.sessions.list()?)
    }

    /// Create a session for an existing character. A character gets one
    /// session per scenario.
    pub async fn start_session(
        &self,
        character_id: CharacterId,
        scenario_id: &str,
    ) -> Result<SessionRecord, SessionError> {
        let _guard = self.create_lock.lock().await;

        if !self.stores.characters.exists(character_id)? {
            return Err(SessionError::NotFound(format!("character {character_id}")));
        }
        if self
            .stores
            .sessions
            .list()?
            .iter()
            .any(|r| r.character_id == character_id && r.scenario_id == scenario_id)
        {
            return Err(SessionError::InvalidTransition(format!(
                "character {character_id} already has a session for scenario '{scenario_id}'"
            )));
        }

        let record = SessionRecord::new(character_id, scenario_id);
        self.stores.sessions.save(&record)?;
        info!(
            session = %record.id,
            character = %character_id,
            scenario = scenario_id,
            "session started"
        );
        Ok(record)
    }

    fn load_record(&self, session_id: SessionId) -> Result<SessionRecord, SessionError> {
        self.stores
            .sessions
            .load(session_id)?
            .ok_or_else(|| SessionError::NotFound(format!("session {session_id}")))
    }

    fn session_lock(&self, session_id: SessionId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(session_id).or_default().clone()
    }

    /// Drop a session's lock from the map once no other call holds or waits
    /// on it. The caller's guard must already be released.
    fn release_lock(&self, session_id: SessionId, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(&session_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(&session_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The active combat of a session in combat mode. If there is none the
    /// session falls back to narrative and a notice for the player is
    /// queued. Nothing is written until the exchange commits.
    fn recover_combat(
        &self,
        record: &mut SessionRecord,
        notices: &mut Vec<LogEntry>,
        effects: &mut Effects,
    ) -> Result<Option<CombatState>, SessionError> {
        let notice = match self.stores.combats.load(record.id)? {
            Some(state) if state.is_ongoing() => return Ok(Some(state)),
            Some(state) => {
                warn!(
                    session = %record.id,
                    combat = %state.id,
                    "stored combat already ended, closing it"
                );
                combat::finish_combat(self.actions.engine(), record, Some(state), None, effects)?;
                LogEntry::system_notice("The fight is already over. The story continues.")
            }
            None => {
                warn!(
                    session = %record.id,
                    combat = ?record.active_combat_id,
                    "session in combat mode without a combat, reverting to narrative"
                );
                record.abandon_combat();
                LogEntry::system_notice(
                    "The combat could not be found, so the story continues without it.",
                )
            }
        };
        notices.push(notice);
        Ok(None)
    }
}
