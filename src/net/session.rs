//! The engine task: owns the game loop, the client registry and the
//! broadcast state.
//!
//! All mutation happens on this single task. Socket tasks communicate
//! through the command channel and the input buffer; outbound messages
//! travel through per-client unbounded queues, so a slow socket never
//! stalls the tick.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::GameSettings;
use crate::game::constants::tick;
use crate::game::game_loop::{GameLoop, GameLoopConfig, StepEvents};
use crate::game::input_buffer::InputBuffer;
use crate::game::schedule::{UpdatePriority, UpdateScheduler};
use crate::game::state::{AiLevel, AttributeKind, PlayerId, PlayerProfile};
use crate::game::teams;
use crate::metrics::Metrics;
use crate::net::delta::build_delta;
use crate::net::protocol::{
    encode, ClientEvent, FullSnapshot, GameStateMessage, JoinData, PlayerSnapshot,
    PlayerStateData, ServerEvent,
};
use crate::util::vec2::Vec2;

const MAX_CALLNAME_LEN: usize = 24;

/// Commands from socket tasks to the engine.
#[derive(Debug)]
pub enum Command {
    /// A socket connected and wants its outbound queue registered
    Attach {
        socket_id: PlayerId,
        tx: UnboundedSender<String>,
    },
    /// A socket disconnected
    Detach { socket_id: PlayerId },
    /// A decoded client event (everything except `playerInput`)
    Event {
        socket_id: PlayerId,
        event: ClientEvent,
    },
    /// Stop accepting work, run a final tick and broadcast, then exit
    Shutdown,
}

struct ClientHandle {
    tx: UnboundedSender<String>,
    joined: bool,
}

/// Engine state. Sync methods only; `run` drives it from the tick task.
pub struct Engine {
    game: GameLoop,
    clients: HashMap<PlayerId, ClientHandle>,
    last_snapshot: Option<FullSnapshot>,
    scheduler: UpdateScheduler,
    metrics: Arc<Metrics>,
    pending_damage: Vec<ServerEvent>,
}

impl Engine {
    pub fn new(settings: GameSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            game: GameLoop::new(settings, GameLoopConfig::default()),
            clients: HashMap::new(),
            last_snapshot: None,
            scheduler: UpdateScheduler::new(),
            metrics,
            pending_damage: Vec::new(),
        }
    }

    pub fn game(&self) -> &GameLoop {
        &self.game
    }

    // ------------------------------------------------------------------
    // Outbound plumbing
    // ------------------------------------------------------------------

    fn send_to(&self, socket_id: PlayerId, event: &ServerEvent) {
        let Some(client) = self.clients.get(&socket_id) else {
            return;
        };
        match encode(event) {
            Ok(text) => {
                if client.tx.send(text).is_ok() {
                    self.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => warn!("failed to encode outbound event: {e}"),
        }
    }

    fn broadcast_event(&self, event: &ServerEvent) {
        let text = match encode(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode broadcast: {e}");
                return;
            }
        };
        let mut sent = 0u64;
        for client in self.clients.values() {
            if client.tx.send(text.clone()).is_ok() {
                sent += 1;
            }
        }
        self.metrics.messages_sent.fetch_add(sent, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // Tick + broadcast
    // ------------------------------------------------------------------

    /// Drain inputs, advance the simulation, queue critical events.
    pub fn tick(&mut self, inputs: &InputBuffer, elapsed_ms: f64) {
        let started = Instant::now();

        for input in inputs.drain() {
            self.game
                .player_input(input.player_id, input.movement, input.shoot);
        }

        let events = self.game.advance(elapsed_ms);
        if events.fatal {
            // A step panicked: reinitialize rather than limp on with a
            // possibly corrupt arena, and tell the clients
            self.game.reset();
            self.last_snapshot = None;
            self.broadcast_event(&ServerEvent::GameReset);
        }
        self.queue_critical(events);

        self.metrics.record_tick_time(started.elapsed());
        self.refresh_gauges();

        // Critical tier: damage feedback flushes at up to 60/s
        if !self.pending_damage.is_empty()
            && self.scheduler.due(UpdatePriority::Critical, Instant::now())
        {
            for event in std::mem::take(&mut self.pending_damage) {
                self.broadcast_event(&event);
            }
        }
    }

    fn queue_critical(&mut self, events: StepEvents) {
        for damage in events.damage {
            self.pending_damage.push(ServerEvent::DamageFeedback {
                target_id: damage.target.to_string(),
                shooter_id: damage.shooter.to_string(),
                fatal: damage.fatal,
            });
        }
    }

    fn refresh_gauges(&self) {
        let state = self.game.state();
        self.metrics
            .players_total
            .store(state.players.len() as u64, Ordering::Relaxed);
        self.metrics
            .players_ai
            .store(state.ai_ids().len() as u64, Ordering::Relaxed);
        self.metrics
            .tanks_alive
            .store(state.alive_tanks().count() as u64, Ordering::Relaxed);
        self.metrics
            .shell_count
            .store(state.shells.len() as u64, Ordering::Relaxed);
        self.metrics
            .upgrade_count
            .store(state.upgrades.len() as u64, Ordering::Relaxed);
        self.metrics
            .tree_count
            .store(state.trees.len() as u64, Ordering::Relaxed);
        self.metrics
            .skipped_frames
            .store(self.game.skipped_frames, Ordering::Relaxed);
        self.metrics.ai_exec_percent.store(
            (self.game.ai.skip_efficiency() * 100.0) as u64,
            Ordering::Relaxed,
        );
        self.metrics
            .game_time_seconds
            .store((state.game_time_ms / 1000.0) as u64, Ordering::Relaxed);
    }

    /// Periodic snapshot emission: full on the first pass, deltas after,
    /// nothing when nothing changed. Per-player state rides the same
    /// cadence; the settings view re-announces on the static tier.
    pub fn broadcast(&mut self) {
        let now = Instant::now();
        if !self.scheduler.due(UpdatePriority::Low, now) {
            return;
        }

        let current = FullSnapshot::capture(self.game.state());

        match &self.last_snapshot {
            None => {
                self.broadcast_event(&ServerEvent::GameState(GameStateMessage::Full(
                    current.clone(),
                )));
            }
            Some(base) => {
                let settings = self.game.settings();
                if let Some(delta) = build_delta(
                    base,
                    &current,
                    &settings.tree_params,
                    &settings.patch_params,
                ) {
                    self.broadcast_event(&ServerEvent::GameState(GameStateMessage::Delta(delta)));
                }
            }
        }
        self.last_snapshot = Some(current);

        // Own-tank state to each joined socket
        let player_states: Vec<(PlayerId, PlayerStateData)> = self
            .clients
            .iter()
            .filter(|(_, c)| c.joined)
            .filter_map(|(&id, _)| {
                self.game
                    .state()
                    .tank(id)
                    .map(|t| (id, PlayerStateData::from_tank(t)))
            })
            .collect();
        for (socket_id, data) in player_states {
            self.send_to(socket_id, &ServerEvent::PlayerState(data));
        }

        if self.scheduler.due(UpdatePriority::Static, now) {
            self.broadcast_event(&ServerEvent::BalanceSettings(self.game.settings().clone()));
        }
    }

    /// Final tick + broadcast on shutdown; dropping the queues closes
    /// the sockets.
    pub fn final_flush(&mut self) {
        self.game.advance(tick::STEP_MS);
        self.last_snapshot = None;
        self.broadcast();
        self.clients.clear();
        info!("engine flushed and stopped");
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Attach { socket_id, tx } => {
                self.clients.insert(socket_id, ClientHandle { tx, joined: false });
                self.metrics
                    .connections_active
                    .store(self.clients.len() as u64, Ordering::Relaxed);
            }
            Command::Detach { socket_id } => self.detach(socket_id),
            Command::Event { socket_id, event } => self.handle_event(socket_id, event),
            Command::Shutdown => unreachable!("shutdown is handled by the run loop"),
        }
    }

    fn detach(&mut self, socket_id: PlayerId) {
        let Some(client) = self.clients.remove(&socket_id) else {
            return;
        };
        self.metrics
            .connections_active
            .store(self.clients.len() as u64, Ordering::Relaxed);
        if client.joined && self.game.remove_player(socket_id).is_some() {
            self.broadcast_event(&ServerEvent::PlayerLeft {
                player_id: socket_id.to_string(),
            });
        }
    }

    fn handle_event(&mut self, socket_id: PlayerId, event: ClientEvent) {
        match event {
            ClientEvent::Join(data) => self.handle_join(socket_id, data),
            ClientEvent::PlayerInput(input) => {
                // Normally routed through the input buffer; accept the
                // slow path too
                self.game.player_input(
                    socket_id,
                    Vec2::new(input.movement.x, input.movement.y),
                    input.shoot,
                );
            }
            ClientEvent::ToggleAi { enabled } => {
                if enabled {
                    let id = self.game.add_ai(AiLevel::Intermediate);
                    self.announce_ai_added(id);
                } else if let Some(id) = self.game.remove_one_ai() {
                    self.broadcast_event(&ServerEvent::AiRemoved {
                        player_id: id.to_string(),
                    });
                }
            }
            ClientEvent::ApplyAiSettings { ai_count, ai_level } => {
                let Some(level) = AiLevel::from_name(&ai_level) else {
                    warn!("unknown AI level '{ai_level}'");
                    self.send_to(
                        socket_id,
                        &ServerEvent::Error {
                            message: format!("unknown AI level '{ai_level}'"),
                        },
                    );
                    return;
                };
                for id in self.game.purge_ai() {
                    self.broadcast_event(&ServerEvent::AiRemoved {
                        player_id: id.to_string(),
                    });
                }
                for _ in 0..ai_count {
                    let id = self.game.add_ai(level);
                    self.announce_ai_added(id);
                }
            }
            ClientEvent::ResetGame => {
                self.game.reset();
                self.last_snapshot = None;
                self.broadcast_event(&ServerEvent::GameReset);
                self.broadcast_event(&ServerEvent::GameState(GameStateMessage::Full(
                    FullSnapshot::capture(self.game.state()),
                )));
            }
            ClientEvent::ChangeTerrainMap { map_name } => {
                match self.game.change_terrain(&map_name) {
                    Ok(()) => {
                        self.last_snapshot = None;
                        self.broadcast_event(&ServerEvent::TerrainMapChanged {
                            map_id: map_name,
                        });
                        self.broadcast_event(&ServerEvent::GameState(GameStateMessage::Full(
                            FullSnapshot::capture(self.game.state()),
                        )));
                    }
                    Err(message) => {
                        warn!("terrain change rejected: {message}");
                        self.send_to(socket_id, &ServerEvent::Error { message });
                    }
                }
            }
            ClientEvent::UpdateSettings(patch) | ClientEvent::ApplySettings(patch) => {
                match self.game.apply_settings(&patch) {
                    Ok(()) => {
                        self.send_to(
                            socket_id,
                            &ServerEvent::SettingsApplied {
                                success: true,
                                error: None,
                            },
                        );
                        self.broadcast_event(&ServerEvent::BalanceSettings(
                            self.game.settings().clone(),
                        ));
                    }
                    Err(error) => {
                        warn!("settings patch rejected: {error}");
                        self.send_to(
                            socket_id,
                            &ServerEvent::SettingsApplied {
                                success: false,
                                error: Some(error),
                            },
                        );
                    }
                }
            }
            ClientEvent::SetPlayerAttributes(attrs) => {
                self.handle_set_attributes(socket_id, attrs)
            }
            ClientEvent::SetPlayerAttributeLimit {
                attribute_name,
                bound,
                value,
            } => self.handle_set_limit(socket_id, attribute_name, bound, value),
            ClientEvent::RequestGameState => {
                self.send_to(
                    socket_id,
                    &ServerEvent::GameState(GameStateMessage::Full(FullSnapshot::capture(
                        self.game.state(),
                    ))),
                );
            }
            ClientEvent::RequestPlayerState => {
                if let Some(tank) = self.game.state().tank(socket_id) {
                    let data = PlayerStateData::from_tank(tank);
                    self.send_to(socket_id, &ServerEvent::PlayerState(data));
                } else {
                    debug!("playerState requested by unjoined socket {socket_id}");
                }
            }
        }
    }

    fn announce_ai_added(&self, id: PlayerId) {
        if let Some(profile) = self.game.state().player(id) {
            self.broadcast_event(&ServerEvent::AiAdded {
                player: PlayerSnapshot::from_profile(profile),
            });
        }
    }

    fn handle_join(&mut self, socket_id: PlayerId, data: JoinData) {
        // A second join from a known socket is a reconnect
        if self.game.state().player(socket_id).is_some() {
            if let Some(client) = self.clients.get_mut(&socket_id) {
                client.joined = true;
            }
            self.send_to(
                socket_id,
                &ServerEvent::Reconnected {
                    player_id: socket_id.to_string(),
                    game_state: FullSnapshot::capture(self.game.state()),
                },
            );
            return;
        }

        let callname = sanitize_callname(&data.callname);
        let team = teams::resolve(&data.team_name);
        let profile = PlayerProfile {
            id: socket_id,
            callname: callname.clone(),
            tank_color: if data.tank_color.is_empty() {
                team.color.clone()
            } else {
                data.tank_color
            },
            tank_camo: data.tank_camo,
            team,
            last_update_ms: self.game.state().game_time_ms,
            ai_level: None,
        };
        self.game.add_human(profile);
        if let Some(client) = self.clients.get_mut(&socket_id) {
            client.joined = true;
        }
        info!("player '{}' joined as {}", callname, socket_id);

        let snapshot = FullSnapshot::capture(self.game.state());
        self.send_to(
            socket_id,
            &ServerEvent::Joined {
                player_id: socket_id.to_string(),
                game_state: snapshot.clone(),
            },
        );

        // Everyone else learns about the new tank right away
        let update = ServerEvent::GameState(GameStateMessage::Full(snapshot));
        if let Ok(text) = encode(&update) {
            for (&id, client) in &self.clients {
                if id != socket_id {
                    let _ = client.tx.send(text.clone());
                }
            }
        }
    }

    fn handle_set_attributes(
        &mut self,
        socket_id: PlayerId,
        attrs: std::collections::BTreeMap<String, f32>,
    ) {
        // Validate every name up front; an unknown one leaves the state
        // untouched
        let mut parsed = Vec::with_capacity(attrs.len());
        for (name, value) in &attrs {
            match AttributeKind::from_name(name) {
                Some(kind) => parsed.push((kind, *value)),
                None => {
                    warn!("unknown attribute '{name}' in setPlayerAttributes");
                    self.send_to(
                        socket_id,
                        &ServerEvent::SettingsApplied {
                            success: false,
                            error: Some(format!("unknown attribute '{name}'")),
                        },
                    );
                    return;
                }
            }
        }

        let limits = self.game.settings().attribute_limits.clone();
        for tank in self
            .game
            .state_mut()
            .tanks
            .values_mut()
            .filter(|t| !t.is_ai)
        {
            for &(kind, value) in &parsed {
                let range = crate::game::state::limit_of(&limits, kind);
                tank.attributes.set(kind, range.clamp(value));
            }
        }
        self.send_to(
            socket_id,
            &ServerEvent::SettingsApplied {
                success: true,
                error: None,
            },
        );
    }

    fn handle_set_limit(
        &mut self,
        socket_id: PlayerId,
        attribute_name: String,
        bound: String,
        value: f32,
    ) {
        let Some(kind) = AttributeKind::from_name(&attribute_name) else {
            warn!("unknown attribute '{attribute_name}' in setPlayerAttributeLimit");
            self.send_to(
                socket_id,
                &ServerEvent::SettingsApplied {
                    success: false,
                    error: Some(format!("unknown attribute '{attribute_name}'")),
                },
            );
            return;
        };

        let patch = match bound.as_str() {
            "min" => serde_json::json!({ "attributeLimits": { kind.name(): { "min": value } } }),
            "max" => serde_json::json!({ "attributeLimits": { kind.name(): { "max": value } } }),
            other => {
                self.send_to(
                    socket_id,
                    &ServerEvent::SettingsApplied {
                        success: false,
                        error: Some(format!("unknown bound '{other}'")),
                    },
                );
                return;
            }
        };

        match self.game.apply_settings(&patch) {
            Ok(()) => {
                self.send_to(
                    socket_id,
                    &ServerEvent::SettingsApplied {
                        success: true,
                        error: None,
                    },
                );
                self.broadcast_event(&ServerEvent::BalanceSettings(
                    self.game.settings().clone(),
                ));
            }
            Err(error) => {
                self.send_to(
                    socket_id,
                    &ServerEvent::SettingsApplied {
                        success: false,
                        error: Some(error),
                    },
                );
            }
        }
    }
}

fn sanitize_callname(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_CALLNAME_LEN)
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "Recruit".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Drive the engine: fixed tick cadence, 100 ms broadcast cadence,
/// commands processed between ticks, graceful shutdown.
pub async fn run(
    mut engine: Engine,
    mut commands: UnboundedReceiver<Command>,
    inputs: InputBuffer,
) {
    let mut tick_interval = tokio::time::interval(Duration::from_micros(
        (tick::STEP_MS * 1000.0) as u64,
    ));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut broadcast_interval =
        tokio::time::interval(Duration::from_millis(tick::BROADCAST_INTERVAL_MS));
    let mut last_wake = Instant::now();

    info!("engine task running at {} Hz", tick::RATE);

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                let now = Instant::now();
                let elapsed_ms = now.duration_since(last_wake).as_secs_f64() * 1000.0;
                last_wake = now;
                engine.tick(&inputs, elapsed_ms);
            }
            _ = broadcast_interval.tick() => {
                engine.broadcast();
            }
            command = commands.recv() => {
                match command {
                    Some(Command::Shutdown) | None => {
                        engine.final_flush();
                        break;
                    }
                    Some(command) => engine.handle_command(command),
                }
            }
        }
    }
}
