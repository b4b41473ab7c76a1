//! Integration Tests: Full Turns Against a Scripted Narrator
//!
//! Each test runs real sessions over a temporary data directory; only the
//! generation service is replaced by a script of canned replies.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use logpose_core::store::JsonStore;
use logpose_core::transcript::Transcript;
use logpose_core::{LogposeConfig, LogposeError, WorldState};
use logpose_llm::{Generate, LlmError, LlmRequest, LlmResponse};
use logpose_session::{Command, MergeStatus, Reply, Session, SessionError, TurnOutcome, TurnStage};
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Scripted generator
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Scripted {
    replies: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
    seen: Arc<Mutex<Vec<LlmRequest>>>,
}

impl Scripted {
    fn with(replies: Vec<Result<&str, LlmError>>) -> Self {
        let script = Self::default();
        script
            .replies
            .lock()
            .expect("lock")
            .extend(replies.into_iter().map(|r| r.map(str::to_string)));
        script
    }

    fn requests(&self) -> Vec<LlmRequest> {
        self.seen.lock().expect("lock").clone()
    }
}

impl Generate for Scripted {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.seen.lock().expect("lock").push(request.clone());
        let next = self
            .replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".into())));
        next.map(|text| LlmResponse {
            text,
            tokens_generated: 0,
            latency_ms: 1,
            model: "scripted".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn seed() -> serde_json::Value {
    json!({
        "player": {
            "name": "Luffy",
            "current_location": "Foosha Village",
            "inventory": ["Straw Hat", "Meat"],
            "stats": {"hp": 100, "max_hp": 100, "stamina": 80}
        },
        "world": {"current_time": "1520-01-01 08:00:00"},
        "characters": {"Makino": {"status": "friendly", "friendship": 200}},
        "locations": {
            "Foosha Village": {"connections": ["Harbor"]},
            "Harbor": {"connections": ["Foosha Village"]}
        },
        "log": [],
        "settings": {"action_costs": {"eat": 15}}
    })
}

fn setup() -> (TempDir, LogposeConfig, JsonStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = LogposeConfig::default();
    config.store.data_dir = dir.path().to_path_buf();
    let store = JsonStore::new(dir.path());
    store.save(&config.store.world_file, &seed()).expect("seed world");
    (dir, config, store)
}

fn world(store: &JsonStore) -> WorldState {
    store.load_strict("db.json").expect("readable").expect("present")
}

fn transcript(store: &JsonStore) -> Transcript {
    store.load("chat_history.json", Transcript::new())
}

async fn turn(session: &mut Session<Scripted>, input: &str) -> TurnOutcome {
    match session.handle(input).await.expect("turn succeeds") {
        Reply::Turn(outcome) => *outcome,
        other => panic!("expected a turn, got {other:?}"),
    }
}

const EAT: &str = "You eat the meat. Delicious!\n```json\n{\"time_passed\": {\"minutes\": 15}, \"log_entry\": \"Luffy ate meat\", \"player\": {\"inventory\": [\"Straw Hat\"], \"stats\": {\"stamina\": 100}}}\n```";

// ---------------------------------------------------------------------------
// Turns
// ---------------------------------------------------------------------------

#[tokio::test]
async fn turn_merges_and_persists() {
    let (_dir, config, store) = setup();
    let narrator = Scripted::with(vec![Ok(EAT)]);
    let mut session = Session::new(config, narrator, None);

    let outcome = turn(&mut session, "eat meat").await;
    assert_eq!(outcome.narrative, "You eat the meat. Delicious!");
    assert_eq!(
        outcome.stages,
        vec![
            TurnStage::AwaitingInput,
            TurnStage::DraftGenerated,
            TurnStage::Parsed,
            TurnStage::Merged,
            TurnStage::Persisted,
        ]
    );
    assert!(outcome.merged());
    assert_eq!(outcome.world_time, "1520-01-01 08:15:00");

    let world = world(&store);
    assert_eq!(world.player.inventory, vec!["Straw Hat"]);
    assert_eq!(world.player.stats["stamina"], 100);
    assert_eq!(world.player.stats["hp"], 100);
    assert_eq!(world.last_log(), Some("Luffy ate meat"));

    let history = transcript(&store);
    assert_eq!(history.len(), 2);
    assert_eq!(history.turns()[0].content, "eat meat");
    let reply = &history.turns()[1];
    assert_eq!(reply.content, "You eat the meat. Delicious!");
    assert_eq!(reply.debug_json.as_ref().expect("applied directive")["log_entry"], "Luffy ate meat");
    assert_eq!(reply.final_raw.as_deref(), Some(EAT));
    assert!(reply.draft_raw.is_none());
    assert_eq!(session.story().len(), 1);
}

#[tokio::test]
async fn narrative_only_turn_skips_merge() {
    let (_dir, config, store) = setup();
    let narrator = Scripted::with(vec![Ok("The gulls cry over the harbor.")]);
    let mut session = Session::new(config, narrator, None);

    let outcome = turn(&mut session, "listen").await;
    assert!(outcome.stages.contains(&TurnStage::MergeSkipped));
    assert_eq!(outcome.merge, MergeStatus::NoDirective);
    assert!(outcome.notice().is_none());
    assert_eq!(serde_json::to_value(world(&store)).expect("serializes")["player"]["inventory"], json!(["Straw Hat", "Meat"]));
    assert_eq!(transcript(&store).len(), 2);
    assert!(transcript(&store).turns()[1].debug_json.is_none());
}

#[tokio::test]
async fn malformed_directive_still_delivers_narrative() {
    let (_dir, config, store) = setup();
    let before = world(&store);
    let narrator = Scripted::with(vec![Ok("A wave crashes.\n```json\n{\"player\": {\"stats\": {\"hp\": 90}\n```")]);
    let mut session = Session::new(config, narrator, None);

    let outcome = turn(&mut session, "swim").await;
    assert_eq!(outcome.narrative, "A wave crashes.");
    assert!(matches!(outcome.merge, MergeStatus::Malformed(_)));
    assert!(outcome.notice().is_some());
    assert_eq!(world(&store), before);
    assert_eq!(transcript(&store).turns()[1].content, "A wave crashes.");
}

#[tokio::test]
async fn rejected_merge_keeps_world_and_records_turn() {
    let (_dir, config, store) = setup();
    let mut broken = seed();
    broken["world"]["current_time"] = json!("dawn");
    store.save("db.json", &broken).expect("save");
    let narrator = Scripted::with(vec![Ok(EAT)]);
    let mut session = Session::new(config, narrator, None);

    let outcome = turn(&mut session, "eat meat").await;
    match &outcome.merge {
        MergeStatus::Rejected(reason) => assert!(reason.contains("dawn")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(outcome.stages.contains(&TurnStage::MergeSkipped));
    assert_eq!(world(&store).player.inventory, vec!["Straw Hat", "Meat"]);
    assert_eq!(transcript(&store).len(), 2);
}

#[tokio::test]
async fn generation_failure_persists_nothing() {
    let (_dir, config, store) = setup();
    let before = world(&store);
    let narrator = Scripted::with(vec![Err(LlmError::Timeout(60_000))]);
    let mut session = Session::new(config, narrator, None);

    let err = session.handle("sail away").await.expect_err("narrator is down");
    assert!(matches!(err, SessionError::Generation(LlmError::Timeout(_))));
    assert_eq!(world(&store), before);
    assert!(!store.exists("chat_history.json"));
    assert!(session.story().is_empty());
}

#[tokio::test]
async fn unreadable_world_aborts_turn_and_keeps_file() {
    let (_dir, config, store) = setup();
    let mut doc = seed();
    doc["player"]["inventory"] = json!("Straw Hat");
    let text = serde_json::to_string_pretty(&doc).expect("serializes");
    std::fs::write(store.path("db.json"), &text).expect("write world");
    let narrator = Scripted::with(vec![Ok(EAT)]);
    let mut session = Session::new(config, narrator.clone(), None);

    let err = session.handle("eat meat").await.expect_err("world does not fit");
    assert!(matches!(err, SessionError::Core(LogposeError::Serialization(_))));
    assert!(narrator.requests().is_empty());
    assert_eq!(std::fs::read_to_string(store.path("db.json")).expect("read"), text);
    assert!(!store.exists("chat_history.json"));

    assert!(session.handle("status").await.is_err());
}

#[tokio::test]
async fn unreadable_transcript_aborts_turn_and_keeps_file() {
    let (_dir, config, store) = setup();
    let before = world(&store);
    std::fs::write(store.path("chat_history.json"), "[{\"role\": \"user\"").expect("write transcript");
    let narrator = Scripted::with(vec![Ok(EAT)]);
    let mut session = Session::new(config, narrator.clone(), None);

    let err = session.handle("eat meat").await.expect_err("transcript is truncated");
    assert!(matches!(err, SessionError::Core(_)));
    assert!(narrator.requests().is_empty());
    assert_eq!(
        std::fs::read_to_string(store.path("chat_history.json")).expect("read"),
        "[{\"role\": \"user\""
    );
    assert_eq!(world(&store), before);
}

#[tokio::test]
async fn loosely_written_world_survives_a_turn() {
    let (_dir, config, store) = setup();
    let mut doc = seed();
    doc["player"]["reputation"] = json!({"Marines": 0.5});
    doc["player"]["location"] = json!("Harbor");
    doc["characters"]["Makino"]["friendship"] = json!(200.0);
    store.save("db.json", &doc).expect("seed world");
    let mut session = Session::new(config, Scripted::with(vec![Ok(EAT)]), None);

    let outcome = turn(&mut session, "eat meat").await;
    assert!(outcome.merged());

    let after = world(&store);
    assert_eq!(after.player.name, "Luffy");
    assert_eq!(after.player.current_location, "Foosha Village");
    assert_eq!(after.player.inventory, vec!["Straw Hat"]);
    assert_eq!(after.locations.len(), 2);
    assert_eq!(after.characters["Makino"].friendship, Some(200));
    assert_eq!(after.last_log(), Some("Luffy ate meat"));
}

#[tokio::test]
async fn context_window_is_bounded_and_rendered() {
    let (_dir, config, store) = setup();
    let replies: Vec<Result<&str, LlmError>> = (0..5).map(|_| Ok("Time passes.")).collect();
    let narrator = Scripted::with(replies);
    let mut session = Session::new(config, narrator.clone(), None);

    for i in 0..5 {
        turn(&mut session, &format!("wait {i}")).await;
    }
    let requests = narrator.requests();
    assert_eq!(requests.len(), 5);
    let last = requests.last().expect("request");
    assert_eq!(last.messages.len(), 7, "six prior turns plus the new input");
    assert_eq!(last.messages.last().expect("input").content, "wait 4");
    assert!(last.system.contains("Current location (Foosha Village)"));
    assert!(last.system.contains("Time passes."), "recent story is embedded");
    assert_eq!(session.story().len(), 3);
    assert_eq!(transcript(&store).len(), 10);
}

#[tokio::test]
async fn documents_are_reread_every_turn() {
    let (_dir, config, store) = setup();
    let narrator = Scripted::with(vec![Ok("One."), Ok("Two.")]);
    let mut session = Session::new(config, narrator.clone(), None);

    turn(&mut session, "first").await;

    let mut edited = seed();
    edited["player"]["inventory"] = json!(["Golden Den Den Mushi"]);
    store.save("db.json", &edited).expect("hand edit");
    store
        .save("prompts.json", &json!({"narrator_system": "CUSTOM RULES\nPlayer: {player}"}))
        .expect("prompt swap");

    turn(&mut session, "second").await;
    let second = &narrator.requests()[1];
    assert!(second.system.starts_with("CUSTOM RULES"));
    assert!(second.system.contains("Golden Den Den Mushi"));
}

// ---------------------------------------------------------------------------
// Cross-check
// ---------------------------------------------------------------------------

const DUEL_DRAFT: &str = "You defeat Zoro easily.\n```json\n{\"player\": {\"stats\": {\"hp\": 95}}, \"characters\": {\"Zoro\": {\"status\": \"defeated\", \"friendship\": 50}}}\n```";
const DUEL_EDIT: &str = "Zoro's blades are too fast; you are thrown back.\n```json\n{\"player\": {\"stats\": {\"hp\": 40}}, \"characters\": {\"Zoro\": {\"status\": \"rival\", \"friendship\": 20}}}\n```";

fn cross_checked(config: &mut LogposeConfig) {
    config.cross_check.enabled = true;
}

#[tokio::test]
async fn editor_revision_replaces_draft() {
    let (_dir, mut config, store) = setup();
    cross_checked(&mut config);
    let narrator = Scripted::with(vec![Ok(DUEL_DRAFT)]);
    let editor = Scripted::with(vec![Ok(DUEL_EDIT)]);
    let mut session = Session::new(config, narrator, Some(editor.clone()));

    let outcome = turn(&mut session, "fight Zoro").await;
    assert!(outcome.stages.contains(&TurnStage::CrossChecked));
    assert!(outcome.narrative.starts_with("Zoro's blades are too fast"));

    let world = world(&store);
    assert_eq!(world.player_hp(), Some(40));
    assert_eq!(world.characters["Zoro"].status.as_deref(), Some("rival"));

    let reply = transcript(&store).turns()[1].clone();
    assert_eq!(reply.draft_raw.as_deref(), Some(DUEL_DRAFT));
    assert_eq!(reply.final_raw.as_deref(), Some(DUEL_EDIT));

    let review = &editor.requests()[0];
    assert!(review.messages[0].content.contains("You defeat Zoro easily."));
    assert!(review.messages[0].content.contains("fight Zoro"));
}

#[tokio::test]
async fn editor_failure_falls_back_to_draft() {
    let (_dir, mut config, store) = setup();
    cross_checked(&mut config);
    let narrator = Scripted::with(vec![Ok(DUEL_DRAFT)]);
    let editor = Scripted::with(vec![Err(LlmError::Unavailable("editor offline".into()))]);
    let mut session = Session::new(config, narrator, Some(editor));

    let outcome = turn(&mut session, "fight Zoro").await;
    assert!(!outcome.stages.contains(&TurnStage::CrossChecked));
    assert!(outcome.merged());
    assert!(outcome.cross_check.expect("pass ran").fallback.is_some());
    assert_eq!(world(&store).player_hp(), Some(95));
    assert!(transcript(&store).turns()[1].draft_raw.is_none());
}

#[tokio::test]
async fn editor_ignored_when_disabled() {
    let (_dir, config, _store) = setup();
    let narrator = Scripted::with(vec![Ok(DUEL_DRAFT)]);
    let editor = Scripted::with(vec![Ok(DUEL_EDIT)]);
    let mut session = Session::new(config, narrator, Some(editor.clone()));

    let outcome = turn(&mut session, "fight Zoro").await;
    assert!(outcome.cross_check.is_none());
    assert!(editor.requests().is_empty());
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clear_wipes_story_but_not_world() {
    let (_dir, config, store) = setup();
    let narrator = Scripted::with(vec![Ok(EAT)]);
    let mut session = Session::new(config, narrator.clone(), None);
    turn(&mut session, "eat meat").await;
    let world_after_turn = world(&store);

    let reply = session.handle("  Reset Story ").await.expect("command");
    assert!(matches!(reply, Reply::Command { command: Command::ClearStory, .. }));
    assert!(transcript(&store).is_empty());
    assert!(session.story().is_empty());
    assert_eq!(world(&store), world_after_turn);
    assert_eq!(narrator.requests().len(), 1, "commands never call the model");
}

#[tokio::test]
async fn reset_world_without_backup_is_aborted() {
    let (_dir, config, store) = setup();
    let narrator = Scripted::with(vec![Ok(EAT)]);
    let mut session = Session::new(config, narrator, None);
    turn(&mut session, "eat meat").await;

    let err = session.handle("reset world").await.expect_err("no backup");
    assert!(matches!(err, SessionError::Core(LogposeError::BackupMissing(_))));
    assert_eq!(transcript(&store).len(), 2, "nothing wiped");
    assert_eq!(world(&store).player.inventory, vec!["Straw Hat"]);
}

#[tokio::test]
async fn reset_world_restores_backup() {
    let (_dir, config, store) = setup();
    store.save("db_backup.json", &seed()).expect("backup");
    let narrator = Scripted::with(vec![Ok(EAT)]);
    let mut session = Session::new(config, narrator, None);
    turn(&mut session, "eat meat").await;

    session.handle("RESET ALL").await.expect("reset");
    assert_eq!(world(&store).player.inventory, vec!["Straw Hat", "Meat"]);
    assert!(transcript(&store).is_empty());
    assert!(session.story().is_empty());
}

#[tokio::test]
async fn status_shows_hud_without_model() {
    let (_dir, config, _store) = setup();
    let narrator = Scripted::default();
    let mut session = Session::new(config, narrator.clone(), None);

    match session.handle("status").await.expect("status") {
        Reply::Command { message, .. } => {
            assert_eq!(message, "Luffy | Foosha Village | 1520-01-01 08:00:00 | HP 100/100");
        }
        other => panic!("expected command reply, got {other:?}"),
    }
    assert!(narrator.requests().is_empty());
    assert!(matches!(session.handle("   ").await.expect("blank"), Reply::Nothing));
}
