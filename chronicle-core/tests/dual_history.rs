//! Full log and model log behaviour across exchanges.

use chronicle_core::actions::Action;
use chronicle_core::character::CharacterSheet;
use chronicle_core::config::GameConfig;
use chronicle_core::gm::{CombatSeed, SeedParticipant};
use chronicle_core::history::{
    is_summary, FileLogStore, LogEntry, LogStore, LogView, Track, SUMMARY_PREFIX,
};
use chronicle_core::ids::SessionId;
use chronicle_core::session::SessionError;
use chronicle_core::testing::{MockGameMaster, ScriptedTurn, TestHarness};
use tempfile::TempDir;

/// Narration long enough to blow a small budget: 400 chars, 100 tokens.
fn verbose() -> String {
    "The wind howls. ".repeat(25)
}

async fn compacting_harness(gm: MockGameMaster) -> TestHarness {
    TestHarness::build(
        GameConfig::default()
            .with_token_budget(50)
            .with_keep_recent(2),
        CharacterSheet::new("Test Hero", 20),
        gm,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_compaction_keeps_recent_entries_and_full_log() {
    let harness =
        compacting_harness(MockGameMaster::new().with_summary("The hero crossed the moor.")).await;

    for i in 0..3 {
        harness.expect_narrative(verbose());
        harness.input(&format!("I walk on ({i})")).await.unwrap();
    }

    let requests = harness.gm.requests();
    // Two entries are never more than the two kept, so nothing was folded yet.
    assert_eq!(requests[1].history.len(), 2);
    assert!(!requests[1].history.iter().any(is_summary));

    let full = harness.log(Track::Narrative, LogView::Full).unwrap();
    let seen = &requests[2].history;
    assert_eq!(seen.len(), 3);
    assert!(is_summary(&seen[0]));
    assert_eq!(
        seen[0].display_text(),
        format!("{SUMMARY_PREFIX} The hero crossed the moor.")
    );
    assert_eq!(&seen[1..], &full[2..4]);
    assert_eq!(harness.gm.summary_calls(), 1);

    assert_eq!(full.len(), 6);
    assert!(!full.iter().any(is_summary));

    let model = harness.log(Track::Narrative, LogView::Model).unwrap();
    assert_eq!(model.len(), 5);
    assert_eq!(&model[..3], &seen[..]);
    assert_eq!(&model[3..], &full[4..]);
}

#[tokio::test]
async fn test_failed_summary_retries_next_exchange() {
    let harness = compacting_harness(MockGameMaster::new().failing_summaries()).await;

    for i in 0..4 {
        harness.expect_narrative(verbose());
        harness.input(&format!("I walk on ({i})")).await.unwrap();
    }

    let requests = harness.gm.requests();
    assert_eq!(requests[2].history.len(), 4);
    assert_eq!(requests[3].history.len(), 6);
    assert_eq!(harness.gm.summary_calls(), 2);
    assert_eq!(
        harness.log(Track::Narrative, LogView::Full).unwrap(),
        harness.log(Track::Narrative, LogView::Model).unwrap()
    );
}

#[tokio::test]
async fn test_tracks_are_independent() {
    let harness = TestHarness::new().await.unwrap();
    harness.expect_turn(
        ScriptedTurn::narration("Bandits!").with_action(Action::StartCombat(CombatSeed {
            location: "forest road".into(),
            description: "Bandits leap from the trees".into(),
            participants: vec![SeedParticipant::new("Bandit", 6).with_initiative(1)],
        })),
    );
    harness.input("I ride on").await.unwrap();
    let narrative = harness.log(Track::Narrative, LogView::Full).unwrap();

    harness.expect_narrative("You parry.");
    let delta = harness.input("I parry").await.unwrap();

    assert_eq!(delta.track, Track::Combat);
    assert_eq!(delta.transcript.len(), 2);
    assert_eq!(
        harness.log(Track::Narrative, LogView::Full).unwrap(),
        narrative
    );
    assert_eq!(harness.log(Track::Combat, LogView::Model).unwrap().len(), 2);
    // The combat exchange starts from an empty combat history.
    assert!(harness.gm.requests()[1].history.is_empty());
}

#[tokio::test]
async fn test_delete_entry_touches_only_the_full_log() {
    let harness = TestHarness::new().await.unwrap();
    harness.expect_narrative("A crow watches you.");
    harness.input("I wave at the crow").await.unwrap();

    let removed = harness
        .dispatcher
        .delete_entry(harness.session, Track::Narrative, 0)
        .await
        .unwrap();
    assert_eq!(removed.display_text(), "I wave at the crow");

    let full = harness.log(Track::Narrative, LogView::Full).unwrap();
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].display_text(), "A crow watches you.");
    assert_eq!(harness.log(Track::Narrative, LogView::Model).unwrap().len(), 2);

    let err = harness
        .dispatcher
        .delete_entry(harness.session, Track::Narrative, 5)
        .await
        .unwrap_err();
    match err {
        SessionError::NotFound(message) => assert!(message.contains("0..=0")),
        other => panic!("Expected NotFound, got {other:?}"),
    }

    let err = harness
        .dispatcher
        .delete_entry(harness.session, Track::Combat, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test]
async fn test_transcript_reads() {
    let harness = TestHarness::new().await.unwrap();
    harness.expect_narrative("Rain begins to fall.");
    harness.input("I look up").await.unwrap();

    let transcript = harness
        .dispatcher
        .transcript(harness.session, Track::Narrative)
        .unwrap();
    assert_eq!(transcript.len(), 2);
    assert!(harness
        .dispatcher
        .transcript(harness.session, Track::Combat)
        .unwrap()
        .is_empty());
    assert!(matches!(
        harness
            .dispatcher
            .transcript(SessionId::new(), Track::Narrative),
        Err(SessionError::NotFound(_))
    ));
}

#[test]
fn test_file_logs_are_separate_per_view() {
    let dir = TempDir::new().unwrap();
    let store = FileLogStore::new(dir.path());
    let session = SessionId::new();

    store
        .append(
            session,
            Track::Narrative,
            LogView::Full,
            &[LogEntry::user_input("hello")],
        )
        .unwrap();
    store
        .replace(
            session,
            Track::Narrative,
            LogView::Model,
            &[LogEntry::model_text("summary")],
        )
        .unwrap();
    store
        .append(
            session,
            Track::Narrative,
            LogView::Full,
            &[LogEntry::model_text("world")],
        )
        .unwrap();

    let full = store
        .load(session, Track::Narrative, LogView::Full)
        .unwrap();
    let model = store
        .load(session, Track::Narrative, LogView::Model)
        .unwrap();
    assert_eq!(full.len(), 2);
    assert_eq!(model.len(), 1);
    assert!(store
        .load(session, Track::Combat, LogView::Full)
        .unwrap()
        .is_empty());
}
