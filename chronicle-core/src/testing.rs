//! Testing utilities for the session engine.
//!
//! This module provides tools for integration testing:
//! - `MockGameMaster` for deterministic exchanges without API calls
//! - `TestHarness` for scripted sessions on in-memory stores
//! - Assertion helpers for verifying session state

use crate::actions::{Action, ActionResolver};
use crate::character::{CharacterError, CharacterSheet};
use crate::combat::CombatState;
use crate::config::GameConfig;
use crate::gm::{Completion, CompletionError, CompletionRequest, CompletionService, TurnOutcome};
use crate::history::{LogEntry, LogView, Part, PartKind, Track};
use crate::ids::SessionId;
use crate::persist::PersistError;
use crate::session::{
    GameStores, ScenarioStatus, SessionDispatcher, SessionError, SessionRecord, TranscriptDelta,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A scripted exchange from the mock game master.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    /// Narration to return.
    pub narration: String,
    /// Actions to resolve, in order, as if the model had called the tools.
    pub actions: Vec<Action>,
    /// Outcome to report when no output action decides it.
    pub outcome: Option<TurnOutcome>,
}

impl ScriptedTurn {
    /// A plain narrative response with no mechanical effects.
    pub fn narration(text: impl Into<String>) -> Self {
        Self {
            narration: text.into(),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_outcome(mut self, outcome: TurnOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// A mock game master that plays scripted exchanges.
///
/// Actions go through the real [`ActionResolver`], so combat and character
/// state change exactly as they would with the real model.
pub struct MockGameMaster {
    turns: Mutex<VecDeque<Result<ScriptedTurn, String>>>,
    summary: String,
    fail_summaries: bool,
    summary_calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockGameMaster {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            summary: "Earlier events, in brief.".to_string(),
            fail_summaries: false,
            summary_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Take this long over every exchange, before the turn is played.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Text returned by every summarization call.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Make every summarization call fail.
    pub fn failing_summaries(mut self) -> Self {
        self.fail_summaries = true;
        self
    }

    /// Queue the next exchange.
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(turn));
    }

    /// Queue an exchange that fails with a service error.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(message.into()));
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    /// The most exchanges that were ever running at once.
    pub fn max_concurrent_exchanges(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every request `complete` received, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_turn(&self) -> Result<ScriptedTurn, String> {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ScriptedTurn::narration(
                    "The game master has nothing more to say.",
                ))
            })
    }

    /// One scripted exchange, resolving its actions for real.
    fn play(
        &self,
        request: CompletionRequest,
        actions: &ActionResolver,
    ) -> Result<Completion, CompletionError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let turn = self.next_turn().map_err(CompletionError::Service)?;

        let mut new_entries = vec![LogEntry::user_input(&request.user_message)];
        let mut parts = Vec::new();
        if !turn.narration.is_empty() {
            parts.push(Part::new(PartKind::ModelText, &turn.narration));
        }

        let mut results = Vec::new();
        let mut outcome = None;
        for action in turn.actions {
            parts.push(Part::new(PartKind::ToolInvocation, format!("{action:?}")));
            let is_output = action.is_output();
            let content = match actions.resolve(&request.context, action) {
                Ok(resolution) => {
                    if is_output && outcome.is_none() {
                        outcome = resolution.outcome;
                    }
                    resolution.message
                }
                Err(e) => format!("error: {e}"),
            };
            results.push(Part::new(PartKind::ToolResult, content));
        }

        if !parts.is_empty() {
            new_entries.push(LogEntry::response(parts));
        }
        if !results.is_empty() {
            new_entries.push(LogEntry::request(results));
        }

        let outcome = outcome
            .or(turn.outcome)
            .unwrap_or_else(|| TurnOutcome::text(turn.narration));
        Ok(Completion::new(outcome, request.history, new_entries))
    }
}

impl Default for MockGameMaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for MockGameMaster {
    async fn complete(
        &self,
        request: CompletionRequest,
        actions: &ActionResolver,
    ) -> Result<Completion, CompletionError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let completion = self.play(request, actions);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        completion
    }

    async fn summarize(
        &self,
        _instruction: &str,
        _transcript: &str,
    ) -> Result<String, CompletionError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_summaries {
            Err(CompletionError::Service("scripted summary failure".to_string()))
        } else {
            Ok(self.summary.clone())
        }
    }
}

/// Test harness for running scripted sessions on in-memory stores.
pub struct TestHarness {
    pub dispatcher: SessionDispatcher,
    pub gm: Arc<MockGameMaster>,
    pub stores: GameStores,
    pub character: CharacterSheet,
    pub session: SessionId,
}

impl TestHarness {
    /// A session for a 20 HP sample character with default settings.
    pub async fn new() -> Result<Self, SessionError> {
        Self::build(
            GameConfig::default(),
            CharacterSheet::new("Test Hero", 20),
            MockGameMaster::new(),
        )
        .await
    }

    pub async fn build(
        config: GameConfig,
        character: CharacterSheet,
        gm: MockGameMaster,
    ) -> Result<Self, SessionError> {
        Self::with_stores(GameStores::memory(), config, character, gm).await
    }

    /// Use the given stores, e.g. file stores in a temporary directory.
    pub async fn with_stores(
        stores: GameStores,
        config: GameConfig,
        character: CharacterSheet,
        gm: MockGameMaster,
    ) -> Result<Self, SessionError> {
        stores.characters.create(&character)?;
        let gm = Arc::new(gm);
        let dispatcher = SessionDispatcher::new(stores.clone(), gm.clone(), &config).with_seed(7);
        let session = dispatcher
            .start_session(character.id, "test-scenario")
            .await?
            .id;
        Ok(Self {
            dispatcher,
            gm,
            stores,
            character,
            session,
        })
    }

    /// Queue a scripted exchange.
    pub fn expect_turn(&self, turn: ScriptedTurn) -> &Self {
        self.gm.push_turn(turn);
        self
    }

    /// Queue a narrative response.
    pub fn expect_narrative(&self, text: impl Into<String>) -> &Self {
        self.expect_turn(ScriptedTurn::narration(text))
    }

    /// Send player input through the dispatcher.
    pub async fn input(&self, text: &str) -> Result<TranscriptDelta, SessionError> {
        self.dispatcher.dispatch(self.session, text).await
    }

    pub fn record(&self) -> Result<SessionRecord, SessionError> {
        self.dispatcher.session(self.session)
    }

    pub fn combat(&self) -> Result<Option<CombatState>, PersistError> {
        self.stores.combats.load(self.session)
    }

    pub fn sheet(&self) -> Result<CharacterSheet, CharacterError> {
        self.stores.characters.sheet(self.character.id)
    }

    pub fn log(&self, track: Track, view: LogView) -> Result<Vec<LogEntry>, PersistError> {
        self.stores.logs.load(self.session, track, view)
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

#[track_caller]
fn current_record(harness: &TestHarness) -> SessionRecord {
    match harness.record() {
        Ok(record) => record,
        Err(e) => panic!("Failed to load session record: {e}"),
    }
}

/// Assert the session is in the given mode.
#[track_caller]
pub fn assert_mode(harness: &TestHarness, mode: Track) {
    let record = current_record(harness);
    assert_eq!(record.mode, mode, "Expected session mode {mode}");
}

/// Assert the session's scenario status.
#[track_caller]
pub fn assert_status(harness: &TestHarness, status: ScenarioStatus) {
    let record = current_record(harness);
    assert_eq!(
        record.scenario_status, status,
        "Expected scenario status {status}"
    );
}

/// Assert the session is in combat with an ongoing stored combat.
#[track_caller]
pub fn assert_in_combat(harness: &TestHarness) {
    let record = current_record(harness);
    assert!(record.in_combat(), "Expected to be in combat");
    assert!(
        record.active_combat_id.is_some(),
        "Expected an active combat id"
    );
    let ongoing = matches!(harness.combat(), Ok(Some(state)) if state.is_ongoing());
    assert!(ongoing, "Expected an ongoing stored combat");
}

/// Assert the session is in narrative mode with no stored combat.
#[track_caller]
pub fn assert_not_in_combat(harness: &TestHarness) {
    let record = current_record(harness);
    assert!(!record.in_combat(), "Expected to NOT be in combat");
    assert!(
        record.active_combat_id.is_none(),
        "Expected no active combat id"
    );
    assert!(
        matches!(harness.combat(), Ok(None)),
        "Expected no stored combat"
    );
}

/// Assert the character sheet's hit points.
#[track_caller]
pub fn assert_hp(harness: &TestHarness, current: u32, max: u32) {
    let sheet = match harness.sheet() {
        Ok(sheet) => sheet,
        Err(e) => panic!("Failed to load character sheet: {e}"),
    };
    assert_eq!(
        (sheet.current_hp, sheet.max_hp),
        (current, max),
        "Expected HP {current}/{max}, got {}/{}",
        sheet.current_hp,
        sheet.max_hp
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_gm_basic() {
        let harness = TestHarness::new().await.unwrap();
        harness.expect_narrative("You stand in a dusty tavern.");

        let delta = harness.input("I look around").await.unwrap();

        assert_eq!(delta.outcome, TurnOutcome::text("You stand in a dusty tavern."));
        assert_eq!(delta.new_entries.len(), 2);
        assert_eq!(delta.new_entries[0].display_text(), "I look around");
        assert_mode(&harness, Track::Narrative);
    }

    #[tokio::test]
    async fn test_mock_gm_with_damage() {
        let harness = TestHarness::new().await.unwrap();
        harness.expect_turn(
            ScriptedTurn::narration("A dart flies from the wall!").with_action(
                Action::DamageCharacter {
                    amount: 5,
                    source: "dart trap".into(),
                },
            ),
        );

        let delta = harness.input("I open the chest").await.unwrap();

        assert_eq!(delta.new_entries.len(), 3);
        assert_hp(&harness, 15, 20);
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let harness = TestHarness::new().await.unwrap();
        harness.gm.push_failure("overloaded");

        let err = harness.input("Hello").await.unwrap_err();
        assert!(matches!(err, SessionError::ExternalService(_)));
        assert!(harness
            .log(Track::Narrative, LogView::Full)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_requests_are_recorded() {
        let harness = TestHarness::new().await.unwrap();
        harness.expect_narrative("One.").expect_narrative("Two.");
        harness.input("first").await.unwrap();
        harness.input("second").await.unwrap();

        let requests = harness.gm.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].history.is_empty());
        assert_eq!(requests[1].history.len(), 2);
        assert!(requests[1].system_prompt.contains("Test Hero"));
    }
}
