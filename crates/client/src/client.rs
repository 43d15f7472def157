//! Game lifecycle, resynchronization and command execution
//!
//! All reads and writes of the game state and the block store go through one
//! async mutex, whether they come from the worker or from a direct call.

use crate::command::Command;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::{ClientEvent, GameEvent, Subscriptions};
use crate::mailbox::Mailbox;
use crate::notifier::{Notifier, TracingNotifier};
use crate::producer::{CommandEnv, CommandProducer, ShellProducer};
use crate::snapshot::{JsonFileSnapshot, SnapshotStore, DEFAULT_SNAPSHOT_FILE};
use crate::worker::{self, Job};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tc_api::{ApiClient, GameState, PingOutcome, ProtocolSource};
use tc_block_store::{BlockHash, BlockStore};
use tc_event_stream::{EventSource, EventSourceConfig};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Where the client stands in a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoGame,
    Loading,
    Synced,
    SendingCommands,
    /// Commands are in; waiting for the authority to move to the next round
    AwaitingAdvance,
    EndedGame,
}

/// Clock comparison with the authority
#[derive(Debug, Clone, Copy)]
pub struct TimeStats {
    pub local: DateTime<Utc>,
    pub server: DateTime<Utc>,
    /// Time between two consecutive server readings
    pub latency: chrono::Duration,
    /// Server clock minus local clock, latency removed
    pub delta: chrono::Duration,
}

/// State guarded by the session lock
struct Session {
    game: Option<GameState>,
    store: BlockStore,
    registered: bool,
    /// Rank of each configured bot, in configuration order
    bot_ranks: Vec<u32>,
    /// Last round for which every bot's commands were accepted
    commands_sent_for: Option<u64>,
}

pub struct ClientBuilder {
    config: ClientConfig,
    api: ApiClient,
    store: BlockStore,
    notifier: Arc<dyn Notifier>,
    snapshot: Arc<dyn SnapshotStore>,
    producer: Arc<dyn CommandProducer>,
    stream: EventSourceConfig,
}

impl ClientBuilder {
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn snapshot(mut self, snapshot: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn producer(mut self, producer: Arc<dyn CommandProducer>) -> Self {
        self.producer = producer;
        self
    }

    pub fn stream_config(mut self, stream: EventSourceConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn build(self) -> Arc<Client> {
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        Arc::new(Client {
            config: self.config,
            api: self.api,
            session: tokio::sync::Mutex::new(Session {
                game: None,
                store: self.store,
                registered: false,
                bot_ranks: Vec::new(),
                commands_sent_for: None,
            }),
            subscriptions: tokio::sync::Mutex::new(Subscriptions::new()),
            game_key: parking_lot::Mutex::new(None),
            phase: parking_lot::Mutex::new(Phase::NoGame),
            notifier: self.notifier,
            snapshot: self.snapshot,
            producer: self.producer,
            stream: self.stream,
            queue,
            queue_rx: parking_lot::Mutex::new(Some(queue_rx)),
            signals: Arc::new(Mailbox::new()),
            events,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
            silenced: AtomicBool::new(false),
            tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

/// A team's node in a game
pub struct Client {
    config: ClientConfig,
    api: ApiClient,
    session: tokio::sync::Mutex<Session>,
    subscriptions: tokio::sync::Mutex<Subscriptions>,
    /// Key of the current game, readable without waiting for the session
    game_key: parking_lot::Mutex<Option<String>>,
    phase: parking_lot::Mutex<Phase>,
    notifier: Arc<dyn Notifier>,
    snapshot: Arc<dyn SnapshotStore>,
    producer: Arc<dyn CommandProducer>,
    stream: EventSourceConfig,
    queue: mpsc::UnboundedSender<Job>,
    queue_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    signals: Arc<Mailbox<Command>>,
    events: mpsc::UnboundedSender<ClientEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
    silenced: AtomicBool,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    /// Builder with tracing notifications, a `game.json` snapshot and shell bots
    pub fn builder(config: ClientConfig, api: ApiClient, store: BlockStore) -> ClientBuilder {
        ClientBuilder {
            config,
            api,
            store,
            notifier: Arc::new(TracingNotifier),
            snapshot: Arc::new(JsonFileSnapshot::new(DEFAULT_SNAPSHOT_FILE)),
            producer: Arc::new(ShellProducer),
            stream: EventSourceConfig::default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub async fn game(&self) -> Option<GameState> {
        self.session.lock().await.game.clone()
    }

    /// Receiver of client events; can be taken once
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events_rx.lock().take()
    }

    /// Stop delivering client events; there is no way back
    pub fn silence(&self) {
        self.silenced.store(true, Ordering::SeqCst);
    }

    /// Connect the event stream, start the worker and restore the saved game
    ///
    /// A restored game is resynced before returning.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.connect_events().await?;
        self.start_worker();
        if self.restore().await? {
            self.sync_game().await?;
        }
        Ok(())
    }

    /// Abort the background tasks
    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Queue a command; it is never dropped
    pub fn submit(&self, command: Command) -> Result<()> {
        self.queue
            .send(Job {
                command,
                reply: None,
            })
            .map_err(|_| Error::WorkerGone)
    }

    /// Queue a command and wait for its outcome
    pub async fn call(&self, command: Command) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.queue
            .send(Job {
                command,
                reply: Some(reply),
            })
            .map_err(|_| Error::WorkerGone)?;
        outcome.await.map_err(|_| Error::WorkerGone)?
    }

    /// Post a signal; it replaces any signal the worker has not picked up yet
    pub fn signal(&self, command: Command) {
        if let Some(dropped) = self.signals.post(command) {
            tracing::debug!("Signal {} superseded by {}", dropped, command);
        }
    }

    /// Queue a send for the round already underway when eager sending is on
    ///
    /// Block events only announce later rounds. Returns whether a send was queued.
    pub fn catch_up(&self) -> bool {
        if !self.config.eager_send {
            return false;
        }
        self.signal(Command::SyncThenSendCommands);
        true
    }

    /// Run a command on the calling task
    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Ping => self.ping().await.map(|_| ()),
            Command::Sync => self.sync_game().await.map(|_| ()),
            Command::SendCommands => self.send_commands().await.map(|_| ()),
            Command::SyncThenSendCommands => self.sync_then_send_commands().await,
            Command::EndOfRound => self.end_of_round().await,
        }
    }

    fn start_worker(self: &Arc<Self>) {
        let Some(queue) = self.queue_rx.lock().take() else {
            tracing::warn!("Worker already started");
            return;
        };
        let client = self.clone();
        let task = tokio::spawn(worker::run(queue, self.signals.clone(), move |command| {
            let client = client.clone();
            async move { client.run_isolated(command).await }
        }));
        self.tasks.lock().push(task);
    }

    /// Run a command in its own task so a panic cannot take the worker down
    async fn run_isolated(self: Arc<Self>, command: Command) -> Result<()> {
        let client = self.clone();
        let result = match tokio::spawn(async move { client.execute(command).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Command {} aborted: {}", command, e);
                Err(Error::Panicked {
                    command: command.to_string(),
                })
            }
        };
        if let Err(e) = &result {
            self.notifier.error(e);
        }
        result
    }

    async fn connect_events(self: &Arc<Self>) -> Result<()> {
        let key = self.api.open_event_stream().await?;
        let source = EventSource::connect_with(
            self.api.http().clone(),
            &self.api.events_url(&key),
            self.stream.clone(),
        )
        .await?;
        self.subscriptions.lock().await.attach(&self.api, &key).await?;

        let client = self.clone();
        let task = tokio::spawn(async move { client.pump_events(source).await });
        self.tasks.lock().push(task);
        Ok(())
    }

    async fn pump_events(self: Arc<Self>, mut source: EventSource) {
        while let Some(payload) = source.recv().await {
            self.handle_payload(&payload).await;
        }
        tracing::warn!("Event stream stopped");
    }

    pub(crate) async fn handle_payload(&self, payload: &str) {
        let Some((channel, event)) = GameEvent::parse(payload) else {
            tracing::debug!("Dropping malformed event {:?}", payload);
            return;
        };
        let Some(key) = self.game_key.lock().clone() else {
            return;
        };
        if channel != self.config.game_channel(&key) {
            tracing::trace!("Ignoring event on {}", channel);
            return;
        }

        match event {
            GameEvent::Block { hash } => {
                tracing::info!("New block {}", hash);
                self.emit(ClientEvent::NewBlock { hash });
                if self.config.eager_send {
                    self.signal(Command::SyncThenSendCommands);
                } else {
                    self.signal(Command::Sync);
                }
            }
            GameEvent::Ping { payload } => {
                match self.api.pong(&key, &payload, &self.config.bot_ids()).await {
                    Ok(()) => self.emit(ClientEvent::Pinged { payload }),
                    Err(e) => self.notifier.warning(&format!("Failed to answer ping: {}", e)),
                }
            }
            GameEvent::End => {
                self.set_phase(Phase::EndedGame);
                self.notifier.finish("The game has ended");
                self.emit(ClientEvent::GameEnded);
            }
        }
    }

    /// Load the saved game, if any; returns whether one was found
    ///
    /// The game is not resynced; call [`Client::sync_game`] next.
    pub async fn restore(&self) -> Result<bool> {
        let Some(game) = self.snapshot.load()? else {
            self.set_phase(Phase::NoGame);
            return Ok(false);
        };
        tracing::info!("Restored game {}", game.key);
        self.subscribe_game(&game.key).await?;
        *self.game_key.lock() = Some(game.key.clone());
        self.session.lock().await.game = Some(game);
        self.set_phase(Phase::Loading);
        Ok(true)
    }

    /// Create a game: protocol and setup blocks, then the game itself
    pub async fn new_game(&self, protocol: &ProtocolSource, params: &Value) -> Result<GameState> {
        let mut session = self.session.lock().await;
        self.leave_locked(&mut session)?;
        self.set_phase(Phase::Loading);

        let result = self.create_game(&mut session, protocol, params).await;
        if result.is_err() && session.game.is_none() {
            self.set_phase(Phase::NoGame);
        }
        result
    }

    async fn create_game(
        &self,
        session: &mut Session,
        protocol: &ProtocolSource,
        params: &Value,
    ) -> Result<GameState> {
        self.notifier.partial("Sending protocol");
        let protocol_hash = self.api.add_protocol_block(&self.config.task, protocol).await?;
        self.notifier.partial("Performing task setup");
        let setup_hash = self.api.add_setup_block(&protocol_hash, params).await?;
        self.notifier.partial("Creating game");
        let game = self.api.new_game(&setup_hash).await?;

        self.install(session, game.clone()).await?;
        self.register_locked(session, &game.key).await?;
        self.set_phase(Phase::Synced);
        self.notifier.finish(&format!("Created game {}", game.key));
        Ok(game)
    }

    /// Start tracking an existing game
    pub async fn join_game(&self, game_key: &str) -> Result<GameState> {
        let mut session = self.session.lock().await;
        if session.game.is_some() {
            self.leave_locked(&mut session)?;
        }
        self.set_phase(Phase::Loading);

        let result = self.load_game(&mut session, game_key).await;
        if result.is_err() && session.game.is_none() {
            self.set_phase(Phase::NoGame);
        }
        result
    }

    async fn load_game(&self, session: &mut Session, game_key: &str) -> Result<GameState> {
        self.notifier.partial("Retrieving game state");
        let game = self.api.show_game(game_key).await?;
        self.install(session, game.clone()).await?;
        self.set_phase(Phase::Synced);
        self.notifier.finish(&format!("Joined game {}", game.key));
        Ok(game)
    }

    /// Persist a freshly obtained game and load its whole chain
    async fn install(&self, session: &mut Session, game: GameState) -> Result<()> {
        self.notifier.partial("Saving game state");
        self.snapshot.save(&game)?;
        *self.game_key.lock() = Some(game.key.clone());
        self.subscribe_game(&game.key).await?;

        self.notifier.partial("Clearing block store");
        session.store.clear()?;
        let first = BlockHash::from(game.first_block.as_str());
        let last = BlockHash::from(game.last_block.as_str());
        session.game = Some(game);

        self.notifier.partial("Retrieving blocks");
        session.store.get_chain(&first, &last).await?;
        Ok(())
    }

    async fn subscribe_game(&self, game_key: &str) -> Result<()> {
        let channel = self.config.game_channel(game_key);
        self.subscriptions
            .lock()
            .await
            .subscribe(&self.api, &channel)
            .await?;
        Ok(())
    }

    async fn register_locked(&self, session: &mut Session, game_key: &str) -> Result<()> {
        if self.config.bots.is_empty() {
            session.registered = true;
            session.bot_ranks.clear();
            return Ok(());
        }
        self.notifier.partial("Registering bots");
        let bot_ids = self.config.bot_ids();
        let ranks = self.api.register(game_key, &bot_ids).await?;
        tracing::info!("Bots {:?} registered with ranks {:?}", bot_ids, ranks);
        session.bot_ranks = ranks;
        session.registered = true;
        Ok(())
    }

    /// Refetch the game and extend the store; returns the confirmed round
    pub async fn sync_game(&self) -> Result<u64> {
        let mut session = self.session.lock().await;
        self.sync_locked(&mut session).await
    }

    async fn sync_locked(&self, session: &mut Session) -> Result<u64> {
        let key = session.game.as_ref().ok_or(Error::NoGame)?.key.clone();
        self.notifier.partial("Retrieving game state");
        let game = self.api.show_game(&key).await?;
        if !session.registered {
            self.register_locked(session, &key).await?;
        }
        self.notifier.partial("Saving game state");
        self.snapshot.save(&game)?;

        // Stop at the previous head if it is cached, otherwise load everything
        let stop = session
            .game
            .as_ref()
            .map(|g| BlockHash::from(g.last_block.as_str()))
            .filter(|h| session.store.contains(h))
            .unwrap_or_else(|| BlockHash::from(game.first_block.as_str()));
        let last = BlockHash::from(game.last_block.as_str());
        self.notifier.partial("Retrieving blocks");
        session.store.get_chain(&stop, &last).await?;
        session.game = Some(game);

        let round = session.store.round_of(&last).ok_or_else(|| Error::NotSynced {
            hash: last.to_string(),
        })?;
        self.set_phase(Phase::Synced);
        self.emit(ClientEvent::RoundSynced {
            round,
            last_block: last.to_string(),
        });
        self.notifier.finish(&format!("The game is up to date (round {})", round));
        Ok(round)
    }

    /// Round of the locally known current block, without refetching
    fn last_round_locked(&self, session: &Session) -> Result<u64> {
        let game = session.game.as_ref().ok_or(Error::NoGame)?;
        let last = BlockHash::from(game.last_block.as_str());
        session.store.round_of(&last).ok_or(Error::NotSynced {
            hash: game.last_block.clone(),
        })
    }

    /// Send every bot's commands for the locally known round
    ///
    /// Returns the round the commands were accepted for, which is later than
    /// the local one if the authority moved on during submission.
    pub async fn send_commands(&self) -> Result<u64> {
        let mut session = self.session.lock().await;
        let round = self.last_round_locked(&session)?;
        if self.config.bots.is_empty() {
            self.notifier.finish("No bots configured");
            return Ok(round);
        }
        self.send_locked(&mut session, round).await
    }

    async fn sync_then_send_commands(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let round = self.sync_locked(&mut session).await?;
        if self.config.bots.is_empty() || session.commands_sent_for == Some(round) {
            return Ok(());
        }
        self.send_locked(&mut session, round).await?;
        Ok(())
    }

    async fn send_locked(&self, session: &mut Session, mut round: u64) -> Result<u64> {
        if !session.registered {
            let key = session.game.as_ref().ok_or(Error::NoGame)?.key.clone();
            self.register_locked(session, &key).await?;
        }
        loop {
            self.set_phase(Phase::SendingCommands);
            self.notifier.partial(&format!("Sending commands for round {}", round));
            match self.try_send(session, round).await {
                Ok(()) => {
                    session.commands_sent_for = Some(round);
                    self.set_phase(Phase::AwaitingAdvance);
                    self.notifier.finish(&format!("Commands sent for round {}", round));
                    return Ok(round);
                }
                Err(e) if e.is_round_conflict() => {
                    self.notifier
                        .warning(&format!("Round {} ended before all commands were sent", round));
                    let current = self.sync_locked(session).await?;
                    if current <= round {
                        return Err(Error::Conflict { round });
                    }
                    round = current;
                }
                Err(e) => {
                    self.set_phase(Phase::Synced);
                    return Err(e);
                }
            }
        }
    }

    async fn try_send(&self, session: &Session, round: u64) -> Result<()> {
        let game = session.game.as_ref().ok_or(Error::NoGame)?;
        if session.bot_ranks.is_empty() {
            return Err(Error::NoPlayers);
        }
        if self.config.bots.len() > session.bot_ranks.len() {
            self.notifier.warning(&format!(
                "Only {} of {} bots are playing",
                session.bot_ranks.len(),
                self.config.bots.len()
            ));
        }

        let mut failure = None;
        for (bot, &rank) in self.config.bots.iter().zip(&session.bot_ranks) {
            let env = CommandEnv {
                round,
                player: rank,
                nb_cycles: game.nb_cycles_per_round,
                bot_id: bot.id,
            };
            tracing::info!("Bot {} plays as player {} in round {}", bot.id, rank, round);
            let commands = match self.producer.produce(bot, &env).await {
                Ok(commands) => commands,
                Err(e) => {
                    self.notifier.error(&e);
                    failure = Some(e);
                    continue;
                }
            };
            self.api
                .input_commands(&game.key, &game.last_block, bot.id, &commands)
                .await?;
        }
        failure.map_or(Ok(()), Err)
    }

    /// Ask the authority to close the current round
    ///
    /// The resulting block arrives later through the event stream.
    pub async fn end_of_round(&self) -> Result<()> {
        let session = self.session.lock().await;
        let round = self.last_round_locked(&session)?;
        let game = session.game.as_ref().ok_or(Error::NoGame)?;
        self.notifier.partial(&format!("Closing round {}", round));
        self.api.close_round(&game.key, &game.last_block).await?;
        self.set_phase(Phase::AwaitingAdvance);
        self.notifier.finish(&format!("Round {} is closed", round));
        Ok(())
    }

    /// Ping every node playing the current game
    pub async fn ping(&self) -> Result<PingOutcome> {
        let key = self.game_key.lock().clone().ok_or(Error::NoGame)?;
        self.notifier.partial("Pinging all nodes playing on this game");
        let outcome = self.api.ping(&key).await?;
        match outcome {
            PingOutcome::AllResponsive => self.notifier.finish("All nodes are responsive"),
            PingOutcome::SomeUnresponsive => self.notifier.finish("Some nodes are unresponsive"),
        }
        Ok(outcome)
    }

    /// Forget the current game and remove its snapshot
    pub async fn leave_game(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.leave_locked(&mut session)
    }

    fn leave_locked(&self, session: &mut Session) -> Result<()> {
        if let Some(game) = session.game.take() {
            tracing::info!("Leaving game {}", game.key);
        }
        session.registered = false;
        session.bot_ranks.clear();
        session.commands_sent_for = None;
        *self.game_key.lock() = None;
        self.snapshot.clear()?;
        self.set_phase(Phase::NoGame);
        Ok(())
    }

    /// Compare the local clock with the authority's
    pub async fn time_stats(&self) -> Result<TimeStats> {
        let local = Utc::now();
        let server = self.api.server_time().await?;
        let server_again = self.api.server_time().await?;
        let latency = server_again - server;
        Ok(TimeStats {
            local,
            server,
            latency,
            delta: server - local - latency,
        })
    }

    fn emit(&self, event: ClientEvent) {
        if self.silenced.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.events.send(event);
    }

    fn set_phase(&self, phase: Phase) {
        let mut current = self.phase.lock();
        // A finished game only gives way to leaving or loading another one
        if *current == Phase::EndedGame && !matches!(phase, Phase::NoGame | Phase::Loading) {
            return;
        }
        if *current != phase {
            tracing::debug!("Phase {:?} -> {:?}", *current, phase);
            *current = phase;
        }
    }
}
