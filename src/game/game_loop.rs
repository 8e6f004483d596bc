//! The fixed-timestep simulation loop.
//!
//! A real-time accumulator drives 60 Hz steps with a catch-up cap of
//! five steps per wake; time beyond the cap is dropped and counted.
//! Every step runs the phases in a strict order: time, tanks, AI (every
//! Nth step), shells, trees, collisions, upgrade respawn, shell cull.
//!
//! A panicking phase loses its step, never the process: panics are
//! caught at the step boundary, logged, and the loop keeps ticking.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, info};
use uuid::Uuid;

use crate::config::GameSettings;
use crate::game::constants::tick;
use crate::game::state::{
    random_tank_position, AiLevel, GameState, PlayerId, PlayerProfile, Shell, Tank,
};
use crate::game::systems::ai::AiManager;
use crate::game::systems::collision::{self, DamageEvent, PickupEvent};
use crate::game::systems::{movement, shells, trees, upgrades};
use crate::game::{teams, terrain};
use crate::util::pool::Pool;
use crate::util::vec2::Vec2;

/// Tick loop tuning; defaults come from the constants module.
#[derive(Debug, Clone, Copy)]
pub struct GameLoopConfig {
    pub max_catchup_steps: u32,
    pub ai_frame_skip: u64,
}

impl Default for GameLoopConfig {
    fn default() -> Self {
        Self {
            max_catchup_steps: tick::MAX_CATCHUP_STEPS,
            ai_frame_skip: tick::AI_FRAME_SKIP,
        }
    }
}

/// Events surfaced to the broadcaster after an advance.
#[derive(Debug, Default)]
pub struct StepEvents {
    pub damage: Vec<DamageEvent>,
    pub pickups: Vec<PickupEvent>,
    /// A step panicked; the supervisor should reinitialize and announce
    pub fatal: bool,
}

impl StepEvents {
    fn absorb(&mut self, events: collision::CollisionEvents) {
        self.damage.extend(events.damage);
        self.pickups.extend(events.pickups);
    }

    fn merge(&mut self, other: StepEvents) {
        self.damage.extend(other.damage);
        self.pickups.extend(other.pickups);
        self.fatal |= other.fatal;
    }
}

/// Owns the game state and advances it deterministically.
pub struct GameLoop {
    state: GameState,
    settings: GameSettings,
    terrain_map_id: String,
    config: GameLoopConfig,
    accumulator_ms: f64,
    step_counter: u64,
    /// Steps dropped because the catch-up cap was exceeded
    pub skipped_frames: u64,
    pub ai: AiManager,
    shell_pool: Pool<Shell>,
}

impl GameLoop {
    pub fn new(settings: GameSettings, config: GameLoopConfig) -> Self {
        let mut game_loop = Self {
            state: GameState::new(),
            settings,
            terrain_map_id: "default".to_string(),
            config,
            accumulator_ms: 0.0,
            step_counter: 0,
            skipped_frames: 0,
            ai: AiManager::new(),
            shell_pool: Pool::with_capacity(128),
        };
        game_loop.regenerate_arena();
        game_loop
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn terrain_map_id(&self) -> &str {
        &self.terrain_map_id
    }

    /// Trees, patches and the initial upgrade population.
    fn regenerate_arena(&mut self) {
        let mut rng = rand::thread_rng();
        self.state.shells.clear();
        self.state.upgrades.clear();
        self.state.trees = terrain::generate_trees(&self.settings.tree_params, &mut rng);
        self.state.patches = terrain::generate_patches(&self.settings.patch_params, &mut rng);
        upgrades::respawn_pass(&mut self.state, &self.settings.upgrade_types, &mut rng);
    }

    /// Reinitialize the arena, keeping connected players and AI rosters
    /// but giving everyone a fresh tank.
    pub fn reset(&mut self) {
        let mut rng = rand::thread_rng();
        self.state.game_time_ms = 0.0;
        self.step_counter = 0;
        self.accumulator_ms = 0.0;

        let profiles: Vec<PlayerProfile> = self.state.players.values().cloned().collect();
        self.state.tanks.clear();
        for profile in &profiles {
            let tank = Tank::new(
                profile.id,
                random_tank_position(&mut rng),
                profile.ai_level.is_some(),
                &self.settings.attribute_limits,
            );
            self.state.tanks.insert(profile.id, tank);
        }

        self.regenerate_arena();
        info!("arena reset ({} players kept)", profiles.len());
    }

    /// Swap the active terrain map and rebuild the arena around it.
    pub fn change_terrain(&mut self, map_id: &str) -> Result<(), String> {
        let Some(map) = terrain::find_map(map_id) else {
            return Err(format!("unknown terrain map '{map_id}'"));
        };
        self.settings.tree_params = map.tree_params;
        self.settings.patch_params = map.patch_params;
        self.terrain_map_id = map.id;
        self.regenerate_arena();
        Ok(())
    }

    /// Merge a partial settings block and re-clamp live tanks.
    pub fn apply_settings(&mut self, patch: &serde_json::Value) -> Result<(), String> {
        self.settings.apply_patch(patch)?;
        let limits = self.settings.attribute_limits.clone();
        for tank in self.state.tanks.values_mut() {
            tank.attributes.clamp_all(&limits);
        }
        Ok(())
    }

    /// Create a player + tank pair for a connected client.
    pub fn add_human(&mut self, profile: PlayerProfile) {
        let mut rng = rand::thread_rng();
        let tank = Tank::new(
            profile.id,
            random_tank_position(&mut rng),
            false,
            &self.settings.attribute_limits,
        );
        self.state.add_player(profile, tank);
    }

    /// Spawn one AI player with a generated callsign.
    pub fn add_ai(&mut self, level: AiLevel) -> PlayerId {
        let mut rng = rand::thread_rng();
        let id = Uuid::new_v4();
        let team = teams::ai_team();
        let profile = PlayerProfile {
            id,
            callname: teams::random_callsign(&mut rng),
            tank_color: team.color.clone(),
            tank_camo: "ai".to_string(),
            team,
            last_update_ms: self.state.game_time_ms,
            ai_level: Some(level),
        };
        let tank = Tank::new(
            id,
            random_tank_position(&mut rng),
            true,
            &self.settings.attribute_limits,
        );
        self.state.add_player(profile, tank);
        self.ai.register(id, level);
        id
    }

    /// Remove one AI player, if any.
    pub fn remove_one_ai(&mut self) -> Option<PlayerId> {
        let id = self.state.ai_ids().into_iter().next()?;
        self.remove_player(id);
        Some(id)
    }

    /// Remove every AI player, returning their ids.
    pub fn purge_ai(&mut self) -> Vec<PlayerId> {
        let ids = self.state.ai_ids();
        for &id in &ids {
            self.remove_player(id);
        }
        ids
    }

    /// Remove any player (human disconnect or AI teardown).
    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerProfile> {
        self.ai.unregister(id);
        self.state.remove_player(id)
    }

    /// Apply a client movement/fire input. Rotation is never accepted
    /// from clients; heading always derives from the intent vector.
    pub fn player_input(&mut self, id: PlayerId, movement: Vec2, shoot: bool) {
        let now = self.state.game_time_ms;
        let Some(tank) = self.state.tank_mut(id) else {
            return;
        };
        if !movement.is_finite() {
            return;
        }
        let speed = tank.attributes.speed;
        tank.target_velocity = movement.clamp_length(1.0) * speed;
        if let Some(profile) = self.state.player_mut(id) {
            profile.last_update_ms = now;
        }

        if shoot {
            shells::try_fire(
                &mut self.state,
                &mut self.shell_pool,
                id,
                &self.settings.game_params,
            );
        }
    }

    /// Consume elapsed real time and run as many fixed steps as fit.
    pub fn advance(&mut self, elapsed_ms: f64) -> StepEvents {
        self.accumulator_ms += elapsed_ms;
        let mut events = StepEvents::default();

        let mut steps_run = 0u32;
        while self.accumulator_ms >= tick::STEP_MS {
            if steps_run >= self.config.max_catchup_steps {
                // Spiral-of-death guard: drop the remainder
                let dropped = (self.accumulator_ms / tick::STEP_MS) as u64;
                self.skipped_frames += dropped;
                self.accumulator_ms -= dropped as f64 * tick::STEP_MS;
                break;
            }
            self.accumulator_ms -= tick::STEP_MS;
            steps_run += 1;

            match catch_unwind(AssertUnwindSafe(|| self.step())) {
                Ok(step_events) => events.merge(step_events),
                Err(_) => {
                    error!("simulation step panicked; step dropped");
                    events.fatal = true;
                }
            }
        }
        events
    }

    /// One fixed step in the mandated phase order.
    fn step(&mut self) -> StepEvents {
        let dt = tick::STEP_MS;
        let mut rng = rand::thread_rng();
        let mut events = StepEvents::default();

        // 1. Time
        self.state.game_time_ms += dt;

        // 2. Tanks: kinematics, tree bounce, gasoline, recoil
        movement::update(&mut self.state, &self.settings, dt, &mut rng);

        // 3. AI controllers, frame-skipped
        if self.step_counter % self.config.ai_frame_skip == 0 {
            let intents = self.ai.update(&self.state, &self.settings);
            let params = self.settings.game_params.clone();
            for intent in intents {
                if let Some(tank) = self.state.tank_mut(intent.tank_id) {
                    tank.target_velocity = intent.movement;
                }
                if intent.fire {
                    shells::try_fire(&mut self.state, &mut self.shell_pool, intent.tank_id, &params);
                }
            }
        } else {
            self.ai.note_skipped_frame();
        }

        // 4. Shell flight
        shells::integrate(&mut self.state, dt);

        // 5. Tree dynamics
        trees::update(&mut self.state, dt);

        // 6. Collision pass (rebuilds the spatial index)
        events.absorb(collision::resolve(
            &mut self.state,
            &self.settings,
            &mut self.shell_pool,
        ));

        // 7. Upgrade respawn
        upgrades::respawn_pass(&mut self.state, &self.settings.upgrade_types, &mut rng);

        // 8. Cull shells that left the arena
        shells::cull_outside(&mut self.state, &mut self.shell_pool);

        self.step_counter += 1;
        events
    }

    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }
}
