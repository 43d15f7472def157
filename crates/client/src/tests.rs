//! Client integration tests
//!
//! Runs the client against an in-process authority that serves:
//! - the game API (`/Games`, `/Time`, `/Events`)
//! - block archives under `/Blocks/<hash>/zip`
//! - a server-push stream fed by the test

use crate::{
    BotConfig, Client, ClientConfig, ClientEvent, Command, CommandEnv, CommandProducer, Error,
    JsonFileSnapshot, Notifier, Phase, Result,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tc_api::{ApiClient, ApiConfig, ProtocolSource, ROUND_CONFLICT};
use tc_block_store::{archive::write_archive, BlockHash, BlockStore, StoreConfig};
use tc_message::KeyPair;
use tempfile::{tempdir, TempDir};
use tokio::sync::{broadcast, mpsc};

#[derive(Default)]
struct Chain {
    archives: HashMap<String, Vec<u8>>,
    first: String,
    last: String,
    round: u64,
}

struct Submission {
    player: u64,
    block: String,
    commands: String,
}

struct Authority {
    chain: Mutex<Chain>,
    /// Advance the chain just before the next command submission is checked
    race_next_submission: AtomicBool,
    /// Refuse the next command submission with an error other than a round conflict
    reject_next_submission: AtomicBool,
    /// Answer every submission with a round conflict without moving the chain
    stale_submissions: AtomicBool,
    /// Register bots without giving them player ranks
    withhold_ranks: AtomicBool,
    registrations: AtomicUsize,
    game_requests: AtomicUsize,
    submissions: Mutex<Vec<Submission>>,
    pongs: Mutex<Vec<Value>>,
    subscribed: Mutex<Vec<String>>,
    block_requests: Mutex<Vec<(String, Value)>>,
    archive_requests: AtomicUsize,
    closed_rounds: AtomicUsize,
    feed: broadcast::Sender<String>,
}

impl Authority {
    fn new() -> Arc<Self> {
        let (feed, _) = broadcast::channel(16);
        Arc::new(Self {
            chain: Mutex::new(Chain::default()),
            race_next_submission: AtomicBool::new(false),
            reject_next_submission: AtomicBool::new(false),
            stale_submissions: AtomicBool::new(false),
            withhold_ranks: AtomicBool::new(false),
            registrations: AtomicUsize::new(0),
            game_requests: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            pongs: Mutex::new(Vec::new()),
            subscribed: Mutex::new(Vec::new()),
            block_requests: Mutex::new(Vec::new()),
            archive_requests: AtomicUsize::new(0),
            closed_rounds: AtomicUsize::new(0),
            feed,
        })
    }

    /// Store a block archive; returns the block hash
    fn publish(&self, kind: &str, parent: &str, round: u64, with_state: bool) -> String {
        let block = format!(
            "{{\"type\": \"{}\", \"parent\": \"{}\", \"round\": {}, \"commands\": []}}",
            kind, parent, round
        );
        self.publish_block(block, round, with_state)
    }

    fn publish_block(&self, block: String, round: u64, with_state: bool) -> String {
        let hash = BlockHash::compute(block.as_bytes()).to_string();
        let state = format!("{{\"round\": {}}}", round);
        let mut files: Vec<(&str, &[u8])> = vec![("block.json", block.as_bytes())];
        if with_state {
            files.push(("state.json", state.as_bytes()));
        }
        let archive = write_archive(&files).unwrap();
        self.chain.lock().archives.insert(hash.clone(), archive);
        hash
    }

    /// A chain whose current round is `rounds`
    fn start_chain(&self, rounds: u64) {
        let root = self.publish("setup", "", 0, true);
        {
            let mut chain = self.chain.lock();
            chain.first = root.clone();
            chain.last = root;
            chain.round = 0;
        }
        for _ in 0..rounds {
            self.advance();
        }
    }

    fn advance(&self) -> String {
        self.extend(true)
    }

    fn extend(&self, with_state: bool) -> String {
        let (parent, round) = {
            let chain = self.chain.lock();
            (chain.last.clone(), chain.round + 1)
        };
        let hash = self.publish("command", &parent, round, with_state);
        let mut chain = self.chain.lock();
        chain.last = hash.clone();
        chain.round = round;
        hash
    }

    fn last_block(&self) -> String {
        self.chain.lock().last.clone()
    }

    fn game(&self, key: &str) -> Value {
        let chain = self.chain.lock();
        json!({
            "key": key,
            "firstBlock": chain.first,
            "lastBlock": chain.last,
            "currentRound": chain.round,
            "nbCyclesPerRound": 2,
        })
    }

    fn push(&self, payload: String) {
        let _ = self.feed.send(payload);
    }
}

fn ok(result: Value) -> Response {
    Json(json!({"result": result, "error": "", "details": ""})).into_response()
}

async fn show_game(State(auth): State<Arc<Authority>>, Path(key): Path<String>) -> Response {
    auth.game_requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "game": auth.game(&key) })).into_response()
}

async fn game_action(State(auth): State<Arc<Authority>>, body: String) -> Response {
    let req: Value = serde_json::from_str(&body).unwrap();
    match req["action"].as_str().unwrap_or_default() {
        "register bots" => {
            auth.registrations.fetch_add(1, Ordering::SeqCst);
            let n = if auth.withhold_ranks.load(Ordering::SeqCst) {
                0
            } else {
                req["botIds"].as_array().map(Vec::len).unwrap_or(0) as u32
            };
            ok(json!({ "ranks": (1..=n).collect::<Vec<_>>() }))
        }
        "enter commands" => {
            if auth.reject_next_submission.swap(false, Ordering::SeqCst) {
                return Json(json!({"result": null, "error": "bot not registered", "details": ""}))
                    .into_response();
            }
            if auth.stale_submissions.load(Ordering::SeqCst) {
                return Json(json!({"result": null, "error": ROUND_CONFLICT, "details": ""}))
                    .into_response();
            }
            if auth.race_next_submission.swap(false, Ordering::SeqCst) {
                auth.advance();
            }
            let block = req["current_block"].as_str().unwrap_or_default().to_string();
            if block != auth.last_block() {
                return Json(json!({"result": null, "error": ROUND_CONFLICT, "details": ""}))
                    .into_response();
            }
            auth.submissions.lock().push(Submission {
                player: req["player"].as_u64().unwrap_or_default(),
                block,
                commands: req["commands"].as_str().unwrap_or_default().to_string(),
            });
            ok(Value::Null)
        }
        "close round" => {
            auth.closed_rounds.fetch_add(1, Ordering::SeqCst);
            auth.advance();
            ok(json!({ "commands": [] }))
        }
        "pong" => {
            auth.pongs.lock().push(req);
            ok(Value::Null)
        }
        "ping" => "pinging\nOK\n".into_response(),
        other => Json(json!({"result": null, "error": format!("unknown action {}", other)}))
            .into_response(),
    }
}

async fn create_game(State(auth): State<Arc<Authority>>, body: String) -> Response {
    let req: Value = serde_json::from_str(&body).unwrap();
    let first_block = req["first_block"].as_str().unwrap_or_default().to_string();
    {
        let mut chain = auth.chain.lock();
        chain.last = first_block;
        chain.round = 0;
    }
    ok(auth.game("g-new"))
}

async fn add_protocol(
    State(auth): State<Arc<Authority>>,
    Path(parent): Path<String>,
    body: String,
) -> Response {
    let req: Value = serde_json::from_str(&body).unwrap();
    let block = json!({
        "type": "protocol",
        "parent": "",
        "interface": req["interface"],
        "implementation": req["implementation"],
    });
    auth.block_requests.lock().push((parent, req));
    let hash = auth.publish_block(block.to_string(), 0, false);
    auth.chain.lock().first = hash.clone();
    Json(json!({"hash": hash, "error": "", "details": ""})).into_response()
}

async fn add_setup(
    State(auth): State<Arc<Authority>>,
    Path(parent): Path<String>,
    body: String,
) -> Response {
    let req: Value = serde_json::from_str(&body).unwrap();
    auth.block_requests.lock().push((parent.clone(), req));
    let hash = auth.publish("setup", &parent, 0, true);
    Json(json!({"hash": hash, "error": "", "details": ""})).into_response()
}

async fn block_archive(State(auth): State<Arc<Authority>>, Path(hash): Path<String>) -> Response {
    auth.archive_requests.fetch_add(1, Ordering::SeqCst);
    match auth.chain.lock().archives.get(&hash) {
        Some(bytes) => bytes.clone().into_response(),
        None => (axum::http::StatusCode::NOT_FOUND, "no such block").into_response(),
    }
}

async fn event_stream(State(auth): State<Arc<Authority>>) -> Response {
    let rx = auth.feed.subscribe();
    let events = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(payload) => {
                    return Some((Ok::<_, Infallible>(format!("data: {}\n\n", payload)), rx))
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Body::from_stream(events).into_response()
}

async fn subscribe(State(auth): State<Arc<Authority>>, body: String) -> Response {
    let req: Value = serde_json::from_str(&body).unwrap();
    if let Some(channels) = req["subscribe"].as_array() {
        let mut subscribed = auth.subscribed.lock();
        subscribed.extend(channels.iter().filter_map(|c| c.as_str()).map(str::to_string));
    }
    ok(json!(true))
}

async fn serve(auth: Arc<Authority>) -> String {
    let router = Router::new()
        .route("/Games", post(create_game))
        .route("/Games/:key", get(show_game).post(game_action))
        .route("/Blocks/:hash/Protocol", post(add_protocol))
        .route("/Blocks/:hash/Setup", post(add_setup))
        .route("/Blocks/:hash/zip", get(block_archive))
        .route("/Time", get(|| async { Json(json!("2026-10-19T10:00:00Z")) }))
        .route("/Events", post(|| async { ok(json!("s1")) }))
        .route("/Events/:key", get(event_stream).post(subscribe))
        .with_state(auth);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[derive(Default)]
struct RecordingProducer {
    seen: Mutex<Vec<CommandEnv>>,
}

#[async_trait]
impl CommandProducer for RecordingProducer {
    async fn produce(&self, bot: &BotConfig, env: &CommandEnv) -> Result<String> {
        self.seen.lock().push(*env);
        Ok(format!("bot{} round{}", bot.id, env.round))
    }
}

struct PanickingProducer;

#[async_trait]
impl CommandProducer for PanickingProducer {
    async fn produce(&self, _bot: &BotConfig, _env: &CommandEnv) -> Result<String> {
        panic!("bot crashed");
    }
}

#[derive(Default)]
struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn partial(&self, _message: &str) {}

    fn finish(&self, _message: &str) {}

    fn warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn error(&self, error: &Error) {
        self.errors.lock().push(error.to_string());
    }
}

struct Harness {
    auth: Arc<Authority>,
    client: Arc<Client>,
    producer: Arc<RecordingProducer>,
    notes: Arc<RecordingNotifier>,
    dir: TempDir,
}

async fn harness(auth: Arc<Authority>) -> Harness {
    harness_with(auth, None).await
}

fn bot_config() -> ClientConfig {
    ClientConfig::new("task-1").with_bots(vec![BotConfig {
        id: 7,
        command: "unused".to_string(),
    }])
}

async fn harness_with(auth: Arc<Authority>, producer: Option<Arc<dyn CommandProducer>>) -> Harness {
    harness_configured(auth, producer, bot_config()).await
}

async fn harness_configured(
    auth: Arc<Authority>,
    producer: Option<Arc<dyn CommandProducer>>,
    config: ClientConfig,
) -> Harness {
    let base = serve(auth.clone()).await;
    let dir = tempdir().unwrap();

    let keys = KeyPair::generate();
    let api = ApiClient::new(ApiConfig::new(&base, &STANDARD.encode(b"api key")), Some(&keys)).unwrap();
    let store = BlockStore::open(StoreConfig::new(
        &format!("{}/Blocks", base),
        dir.path().join("store"),
    ))
    .unwrap();

    let recorder = Arc::new(RecordingProducer::default());
    let notes = Arc::new(RecordingNotifier::default());
    let client = Client::builder(config, api, store)
        .snapshot(Arc::new(JsonFileSnapshot::new(dir.path().join("game.json"))))
        .producer(producer.unwrap_or_else(|| recorder.clone() as Arc<dyn CommandProducer>))
        .notifier(notes.clone())
        .build();

    Harness {
        auth,
        client,
        producer: recorder,
        notes,
        dir,
    }
}

async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<ClientEvent>, mut wanted: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    let deadline = Duration::from_secs(5);
    loop {
        let event = tokio::time::timeout(deadline, rx.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("client event channel closed");
        if wanted(&event) {
            return event;
        }
    }
}

async fn wait_until<F: FnMut() -> bool>(mut done: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "condition never met");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_join_game_loads_chain_once() {
    let auth = Authority::new();
    auth.start_chain(3);
    let h = harness(auth).await;

    let game = h.client.join_game("g1").await.unwrap();
    assert_eq!(game.current_round, 3);
    assert_eq!(h.client.phase(), Phase::Synced);
    assert!(h.dir.path().join("game.json").exists());
    assert_eq!(h.auth.archive_requests.load(Ordering::SeqCst), 4);

    assert_eq!(h.client.sync_game().await.unwrap(), 3);
    assert_eq!(h.auth.archive_requests.load(Ordering::SeqCst), 4);

    h.auth.advance();
    assert_eq!(h.client.sync_game().await.unwrap(), 4);
    assert_eq!(h.auth.archive_requests.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_round_conflict_retries_on_new_round() {
    let auth = Authority::new();
    auth.start_chain(5);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    assert_eq!(h.client.sync_game().await.unwrap(), 5);

    h.auth.race_next_submission.store(true, Ordering::SeqCst);
    assert_eq!(h.client.send_commands().await.unwrap(), 6);

    let rounds: Vec<u64> = h.producer.seen.lock().iter().map(|env| env.round).collect();
    assert_eq!(rounds, vec![5, 6]);

    let submissions = h.auth.submissions.lock();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].player, 7);
    assert_eq!(submissions[0].commands, "bot7 round6");
    assert_eq!(submissions[0].block, h.auth.last_block());
    assert_eq!(h.notes.warnings.lock().len(), 1);
    assert_eq!(h.client.phase(), Phase::AwaitingAdvance);
}

#[tokio::test]
async fn test_bot_env_carries_rank_and_cycles() {
    let auth = Authority::new();
    auth.start_chain(1);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    h.client.sync_game().await.unwrap();
    h.client.send_commands().await.unwrap();

    let seen = h.producer.seen.lock().clone();
    assert_eq!(
        seen,
        vec![CommandEnv {
            round: 1,
            player: 1,
            nb_cycles: 2,
            bot_id: 7,
        }]
    );
}

#[tokio::test]
async fn test_block_without_round_is_not_synced() {
    let auth = Authority::new();
    auth.start_chain(1);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    let unrounded = h.auth.extend(false);

    match h.client.sync_game().await {
        Err(Error::NotSynced { hash }) => assert_eq!(hash, unrounded),
        other => panic!("expected NotSynced, got {:?}", other),
    }
}

#[tokio::test]
async fn test_new_game_builds_chain_and_registers() {
    let auth = Authority::new();
    let h = harness(auth).await;

    let protocol = ProtocolSource {
        interface: "val step : unit -> unit".to_string(),
        implementation: "let step () = ()".to_string(),
    };
    let game = h
        .client
        .new_game(&protocol, &json!({"nb_players": 2}))
        .await
        .unwrap();
    assert_eq!(game.key, "g-new");
    assert_eq!(h.client.phase(), Phase::Synced);

    {
        let requests = h.auth.block_requests.lock();
        assert_eq!(requests[0].0, "task-1");
        assert_eq!(requests[0].1["interface"], "val step : unit -> unit");
        assert_eq!(requests[1].0, game.first_block);
        assert_eq!(requests[1].1["params"]["nb_players"], 2);
    }
    assert_eq!(h.auth.archive_requests.load(Ordering::SeqCst), 2);

    assert_eq!(h.client.sync_game().await.unwrap(), 0);
    assert_eq!(h.auth.archive_requests.load(Ordering::SeqCst), 2);
    assert_eq!(h.client.send_commands().await.unwrap(), 0);
    assert_eq!(h.auth.submissions.lock().len(), 1);
}

#[tokio::test]
async fn test_events_drive_sync_and_pong() {
    let auth = Authority::new();
    auth.start_chain(2);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    let mut events = h.client.take_events().unwrap();
    h.client.start().await.unwrap();
    assert_eq!(h.auth.subscribed.lock().clone(), vec!["game:g1".to_string()]);
    wait_for(&mut events, |e| matches!(e, ClientEvent::RoundSynced { round: 2, .. })).await;

    let head = h.auth.advance();
    h.auth.push(format!("game:other block {}", head));
    h.auth.push(format!("game:g1 block {}", head));
    let event = wait_for(&mut events, |e| matches!(e, ClientEvent::NewBlock { .. })).await;
    assert_eq!(event, ClientEvent::NewBlock { hash: head.clone() });
    wait_for(&mut events, |e| matches!(e, ClientEvent::RoundSynced { round: 3, .. })).await;

    h.auth.push("game:g1 ping hello".to_string());
    let event = wait_for(&mut events, |e| matches!(e, ClientEvent::Pinged { .. })).await;
    assert_eq!(
        event,
        ClientEvent::Pinged {
            payload: "hello".to_string()
        }
    );
    {
        let pongs = h.auth.pongs.lock();
        assert_eq!(pongs[0]["payload"], "hello");
        assert_eq!(pongs[0]["botIds"], json!([7]));
    }

    // Eager sending submits round 3 commands after the block event
    wait_until(|| {
        h.auth
            .submissions
            .lock()
            .iter()
            .any(|s| s.commands == "bot7 round3" && s.block == head)
    })
    .await;

    h.auth.push("game:g1 end".to_string());
    wait_for(&mut events, |e| *e == ClientEvent::GameEnded).await;
    assert_eq!(h.client.phase(), Phase::EndedGame);
    h.client.stop();
}

#[tokio::test]
async fn test_silence_stops_client_events() {
    let auth = Authority::new();
    auth.start_chain(1);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    let mut events = h.client.take_events().unwrap();
    h.client.start().await.unwrap();
    while events.try_recv().is_ok() {}

    h.client.silence();
    let head = h.auth.advance();
    h.auth.push(format!("game:g1 block {}", head));

    wait_until(|| h.auth.submissions.lock().iter().any(|s| s.block == head)).await;
    assert!(events.try_recv().is_err());
    h.client.stop();
}

#[tokio::test]
async fn test_worker_survives_panicking_command() {
    let auth = Authority::new();
    auth.start_chain(1);
    let h = harness_with(auth, Some(Arc::new(PanickingProducer) as Arc<dyn CommandProducer>)).await;

    h.client.join_game("g1").await.unwrap();
    h.client.start().await.unwrap();

    match h.client.call(Command::SendCommands).await {
        Err(Error::Panicked { command }) => assert_eq!(command, "send commands"),
        other => panic!("expected panic report, got {:?}", other),
    }
    assert_eq!(h.notes.errors.lock().len(), 1);

    h.client.call(Command::Ping).await.unwrap();
    assert_eq!(h.client.sync_game().await.unwrap(), 1);
    h.client.stop();
}

#[tokio::test]
async fn test_end_of_round_closes_current_round() {
    let auth = Authority::new();
    auth.start_chain(2);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    h.client.end_of_round().await.unwrap();
    assert_eq!(h.auth.closed_rounds.load(Ordering::SeqCst), 1);
    assert_eq!(h.client.phase(), Phase::AwaitingAdvance);

    assert_eq!(h.client.sync_game().await.unwrap(), 3);
}

#[tokio::test]
async fn test_leave_game_forgets_everything() {
    let auth = Authority::new();
    auth.start_chain(1);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    h.client.leave_game().await.unwrap();

    assert!(h.client.game().await.is_none());
    assert_eq!(h.client.phase(), Phase::NoGame);
    assert!(!h.dir.path().join("game.json").exists());
    assert!(matches!(h.client.sync_game().await, Err(Error::NoGame)));
    assert!(matches!(h.client.ping().await, Err(Error::NoGame)));
}

#[tokio::test]
async fn test_time_stats() {
    let auth = Authority::new();
    let h = harness(auth).await;

    let stats = h.client.time_stats().await.unwrap();
    assert_eq!(stats.server.to_rfc3339(), "2026-10-19T10:00:00+00:00");
    assert_eq!(stats.latency, chrono::Duration::zero());
    assert_eq!(stats.delta, stats.server - stats.local);
}

#[tokio::test]
async fn test_send_right_after_join_registers_bots() {
    let auth = Authority::new();
    auth.start_chain(2);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    assert_eq!(h.client.send_commands().await.unwrap(), 2);
    assert_eq!(h.auth.registrations.load(Ordering::SeqCst), 1);

    {
        let submissions = h.auth.submissions.lock();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].commands, "bot7 round2");
    }

    h.client.send_commands().await.unwrap();
    assert_eq!(h.auth.registrations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_send_without_player_ranks_fails() {
    let auth = Authority::new();
    auth.start_chain(1);
    auth.withhold_ranks.store(true, Ordering::SeqCst);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    assert!(matches!(h.client.send_commands().await, Err(Error::NoPlayers)));
    assert!(h.auth.submissions.lock().is_empty());
    assert!(h.producer.seen.lock().is_empty());
    assert_eq!(h.client.phase(), Phase::Synced);
}

#[tokio::test]
async fn test_rejected_submission_is_not_retried() {
    let auth = Authority::new();
    auth.start_chain(3);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    h.client.sync_game().await.unwrap();
    let game_requests = h.auth.game_requests.load(Ordering::SeqCst);
    let archive_requests = h.auth.archive_requests.load(Ordering::SeqCst);

    h.auth.reject_next_submission.store(true, Ordering::SeqCst);
    match h.client.send_commands().await {
        Err(e @ Error::Api(_)) => {
            assert!(!e.is_round_conflict());
            assert!(e.to_string().contains("bot not registered"));
        }
        other => panic!("expected authority error, got {:?}", other),
    }

    assert_eq!(h.producer.seen.lock().len(), 1);
    assert!(h.auth.submissions.lock().is_empty());
    assert_eq!(h.auth.game_requests.load(Ordering::SeqCst), game_requests);
    assert_eq!(h.auth.archive_requests.load(Ordering::SeqCst), archive_requests);
    assert!(h.notes.warnings.lock().is_empty());
    assert_eq!(h.client.phase(), Phase::Synced);
}

#[tokio::test]
async fn test_conflict_without_newer_round() {
    let auth = Authority::new();
    auth.start_chain(4);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    h.client.sync_game().await.unwrap();
    let game_requests = h.auth.game_requests.load(Ordering::SeqCst);

    h.auth.stale_submissions.store(true, Ordering::SeqCst);
    match h.client.send_commands().await {
        Err(Error::Conflict { round }) => assert_eq!(round, 4),
        other => panic!("expected conflict, got {:?}", other),
    }

    assert_eq!(h.producer.seen.lock().len(), 1);
    assert_eq!(h.auth.game_requests.load(Ordering::SeqCst), game_requests + 1);
    assert_eq!(h.notes.warnings.lock().len(), 1);
    assert!(h.auth.submissions.lock().is_empty());
}

#[tokio::test]
async fn test_catch_up_sends_current_round() {
    let auth = Authority::new();
    auth.start_chain(2);
    let h = harness(auth).await;

    h.client.join_game("g1").await.unwrap();
    h.client.start().await.unwrap();
    assert!(h.auth.submissions.lock().is_empty());

    assert!(h.client.catch_up());
    let head = h.auth.last_block();
    wait_until(|| {
        h.auth
            .submissions
            .lock()
            .iter()
            .any(|s| s.commands == "bot7 round2" && s.block == head)
    })
    .await;
    h.client.stop();
}

#[tokio::test]
async fn test_catch_up_respects_lazy_sending() {
    let auth = Authority::new();
    auth.start_chain(2);
    let h = harness_configured(auth, None, bot_config().with_eager_send(false)).await;

    h.client.join_game("g1").await.unwrap();
    h.client.start().await.unwrap();
    assert!(!h.client.catch_up());

    h.client.call(Command::Ping).await.unwrap();
    assert!(h.auth.submissions.lock().is_empty());
    h.client.stop();
}
