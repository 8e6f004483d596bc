//! AI tank controllers.
//!
//! One controller per AI tank. Controllers only read the game state and
//! emit movement intents plus fire requests; the tick loop applies both,
//! so AI tanks obey exactly the same physics and firing rules as humans.
//!
//! Decisions are computed in parallel (the state is read-only during the
//! pass) and applied sequentially, synchronized at the step boundary.

use hashbrown::HashMap;
use rand::Rng;
use rayon::prelude::*;

use crate::config::GameSettings;
use crate::game::constants::ai;
use crate::game::state::{
    AiLevel, AttributeKind, GameState, PlayerId, Tank, UpgradeKind,
};
use crate::util::angle;
use crate::util::vec2::Vec2;

/// Tuning derived from the difficulty level. Levels never touch starting
/// stats; AI and human tanks spawn identical.
#[derive(Debug, Clone, Copy)]
pub struct AiParams {
    pub decision_interval_ms: f64,
    pub min_shot_interval_ms: f64,
    pub accuracy: f32,
    pub retreat_health_ratio: f32,
    pub engagement_range: f32,
}

pub fn params_for(level: AiLevel) -> AiParams {
    match level {
        AiLevel::Easy => AiParams {
            decision_interval_ms: 1200.0,
            min_shot_interval_ms: 1500.0,
            accuracy: 0.5,
            retreat_health_ratio: 0.25,
            engagement_range: 280.0,
        },
        AiLevel::Intermediate => AiParams {
            decision_interval_ms: 900.0,
            min_shot_interval_ms: 1000.0,
            accuracy: 0.65,
            retreat_health_ratio: 0.3,
            engagement_range: 320.0,
        },
        AiLevel::Hard => AiParams {
            decision_interval_ms: 600.0,
            min_shot_interval_ms: 700.0,
            accuracy: 0.8,
            retreat_health_ratio: 0.35,
            engagement_range: 360.0,
        },
        AiLevel::Insane => AiParams {
            decision_interval_ms: 350.0,
            min_shot_interval_ms: 450.0,
            accuracy: 0.95,
            retreat_health_ratio: 0.4,
            engagement_range: 400.0,
        },
    }
}

/// Target speed below which the lenient aim gate applies.
const SLOW_TARGET_SPEED: f32 = 10.0;
/// A wander waypoint counts as reached inside this distance.
const WANDER_REACH: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Enemy(PlayerId),
    Upgrade(u32),
}

#[derive(Debug, Clone, Copy)]
struct EnemyView {
    id: PlayerId,
    position: Vec2,
    velocity: Vec2,
    health_ratio: f32,
}

#[derive(Debug, Clone, Copy)]
struct UpgradeView {
    id: u32,
    kind: UpgradeKind,
    position: Vec2,
}

/// Movement intent plus fire request for one AI tank this step.
#[derive(Debug, Clone)]
pub struct AiIntent {
    pub tank_id: PlayerId,
    pub movement: Vec2,
    pub fire: bool,
}

/// One controller per AI tank.
#[derive(Debug, Clone)]
pub struct AiController {
    tank_id: PlayerId,
    level: AiLevel,
    target: Option<Target>,
    last_decision_ms: f64,
    last_shot_ms: f64,
    strafe_sign: f32,
    wander_goal: Option<Vec2>,
    stuck_anchor: Vec2,
    stuck_since_ms: f64,
    enemies: Vec<EnemyView>,
    upgrades: Vec<UpgradeView>,
    cached_at_ms: f64,
}

impl AiController {
    fn new(tank_id: PlayerId, level: AiLevel) -> Self {
        Self {
            tank_id,
            level,
            target: None,
            last_decision_ms: f64::NEG_INFINITY,
            last_shot_ms: f64::NEG_INFINITY,
            strafe_sign: 1.0,
            wander_goal: None,
            stuck_anchor: Vec2::ZERO,
            // Forces the first run to arm the anchor at the tank position
            stuck_since_ms: f64::NEG_INFINITY,
            enemies: Vec::new(),
            upgrades: Vec::new(),
            cached_at_ms: f64::NEG_INFINITY,
        }
    }

    fn invalidate_caches(&mut self) {
        self.cached_at_ms = f64::NEG_INFINITY;
        self.enemies.clear();
        self.upgrades.clear();
    }

    fn refresh_caches(&mut self, state: &GameState, settings: &GameSettings, now: f64) {
        if now - self.cached_at_ms < ai::CACHE_TTL_MS {
            return;
        }
        self.enemies = state
            .tanks
            .values()
            .filter(|t| t.alive && t.id != self.tank_id)
            .map(|t| EnemyView {
                id: t.id,
                position: t.position,
                velocity: t.velocity,
                health_ratio: t
                    .attributes
                    .ratio(AttributeKind::Health, &settings.attribute_limits),
            })
            .collect();
        self.upgrades = state
            .upgrades
            .iter()
            .filter(|u| !u.collected)
            .map(|u| UpgradeView {
                id: u.id,
                kind: u.kind,
                position: u.position,
            })
            .collect();
        self.cached_at_ms = now;
    }

    fn set_target(&mut self, target: Option<Target>, rng: &mut impl Rng) {
        if self.target != target {
            self.target = target;
            self.invalidate_caches();
            self.strafe_sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        }
    }

    fn nearest_upgrade(&self, from: Vec2, kind: UpgradeKind) -> Option<Target> {
        self.upgrades
            .iter()
            .filter(|u| u.kind == kind)
            .min_by(|a, b| {
                from.distance_sq_to(a.position)
                    .total_cmp(&from.distance_sq_to(b.position))
            })
            .map(|u| Target::Upgrade(u.id))
    }

    /// Attribute whose ratio against its maximum is lowest.
    fn most_needed_kind(&self, tank: &Tank, settings: &GameSettings) -> UpgradeKind {
        let mut worst = (UpgradeKind::Health, f32::MAX);
        for kind in UpgradeKind::ALL {
            let ratio = tank
                .attributes
                .ratio(kind.attribute(), &settings.attribute_limits);
            if ratio < worst.1 {
                worst = (kind, ratio);
            }
        }
        worst.0
    }

    /// Re-evaluate the target using the decision cascade.
    fn decide(
        &mut self,
        tank: &Tank,
        settings: &GameSettings,
        params: &AiParams,
        rng: &mut impl Rng,
    ) {
        let ammo = tank.attributes.ammunition;
        let gasoline = tank.attributes.gasoline;
        let health_ratio = tank
            .attributes
            .ratio(AttributeKind::Health, &settings.attribute_limits);
        let retreating = health_ratio < params.retreat_health_ratio;

        // 1. No shells at all: nothing matters but ammunition
        if ammo <= 0.0 {
            let target = self.nearest_upgrade(tank.position, UpgradeKind::Ammunition);
            self.set_target(target, rng);
            return;
        }

        // 2. Critically depleted attribute
        let mut critical: Option<(UpgradeKind, f32)> = None;
        for kind in UpgradeKind::ALL {
            let ratio = tank
                .attributes
                .ratio(kind.attribute(), &settings.attribute_limits);
            if ratio < ai::CRITICAL_RATIO {
                // Urgency multiplier ranks critical needs against each other
                let urgency = (ai::CRITICAL_RATIO - ratio) * ai::CRITICAL_URGENCY;
                if critical.map_or(true, |(_, u)| urgency > u) {
                    critical = Some((kind, urgency));
                }
            }
        }
        if let Some((kind, _)) = critical {
            if let Some(target) = self.nearest_upgrade(tank.position, kind) {
                self.set_target(Some(target), rng);
                return;
            }
        }

        // 3. Fuel run
        if gasoline < ai::LOW_GASOLINE {
            if let Some(target) = self.nearest_upgrade(tank.position, UpgradeKind::Gasoline) {
                self.set_target(Some(target), rng);
                return;
            }
        }

        // 4. Ammunition run
        if ammo < ai::LOW_AMMO {
            if let Some(target) = self.nearest_upgrade(tank.position, UpgradeKind::Ammunition) {
                self.set_target(Some(target), rng);
                return;
            }
        }

        // 5. Hunt: score enemies by proximity and weakness
        if ammo > ai::COMBAT_AMMO && !retreating {
            let best = self
                .enemies
                .iter()
                .map(|e| {
                    let dist = tank.position.distance_to(e.position).max(1.0);
                    let score = 100.0 / dist + (1.0 - e.health_ratio) * 50.0;
                    (e.id, score)
                })
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((enemy_id, _)) = best {
                self.set_target(Some(Target::Enemy(enemy_id)), rng);
                return;
            }
        }

        // 6. Fall back to restocking whatever is lowest
        if retreating || gasoline < ai::LOW_GASOLINE || ammo < ai::LOW_AMMO {
            let kind = self.most_needed_kind(tank, settings);
            if let Some(target) = self.nearest_upgrade(tank.position, kind) {
                self.set_target(Some(target), rng);
                return;
            }
        }

        // 7. Nothing worth doing
        self.set_target(None, rng);
    }

    /// One controller step: refresh caches, re-decide on the interval,
    /// check the stuck detector, then steer and maybe fire.
    fn run(
        &mut self,
        state: &GameState,
        settings: &GameSettings,
        rng: &mut impl Rng,
    ) -> Option<AiIntent> {
        let tank = state.tank(self.tank_id)?;
        if !tank.alive {
            self.target = None;
            self.wander_goal = None;
            return None;
        }
        let now = state.game_time_ms;
        let params = params_for(self.level);

        self.refresh_caches(state, settings, now);

        if now - self.last_decision_ms >= params.decision_interval_ms {
            self.decide(tank, settings, &params, rng);
            self.last_decision_ms = now;
        }

        // Stuck detector: barely moved over the whole window -> emergency
        // escape move and a fresh decision next interval
        if now - self.stuck_since_ms >= ai::STUCK_WINDOW_MS {
            let moved = tank.position.distance_to(self.stuck_anchor);
            self.stuck_anchor = tank.position;
            self.stuck_since_ms = now;
            if moved < ai::STUCK_DISTANCE {
                self.target = None;
                self.wander_goal = None;
                let dir = Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU));
                return Some(AiIntent {
                    tank_id: self.tank_id,
                    movement: dir * tank.attributes.speed * ai::UNSTICK_SPEED,
                    fire: false,
                });
            }
        }

        match self.target {
            Some(Target::Enemy(enemy_id)) => self.engage(tank, state, enemy_id, &params, rng),
            Some(Target::Upgrade(upgrade_id)) => self.fetch(tank, state, upgrade_id),
            None => Some(self.wander(tank, state, rng)),
        }
    }

    /// Combat behavior against a live enemy.
    fn engage(
        &mut self,
        tank: &Tank,
        state: &GameState,
        enemy_id: PlayerId,
        params: &AiParams,
        rng: &mut impl Rng,
    ) -> Option<AiIntent> {
        let Some(enemy) = state.tank(enemy_id).filter(|t| t.alive) else {
            self.target = None;
            return None;
        };
        let now = state.game_time_ms;
        let speed = tank.attributes.speed;
        let to_enemy = enemy.position - tank.position;
        let dist = to_enemy.length();
        let dir = to_enemy.normalize();

        let movement = if dist < ai::STRAFE_DISTANCE {
            // Too close: slide sideways off the line of fire
            dir.perpendicular() * self.strafe_sign * speed
        } else if dist > params.engagement_range {
            self.steer(tank.position, enemy.position, state) * speed
        } else {
            let roll: f32 = rng.gen();
            if roll < 0.4 {
                // Hold position, keep turning toward the enemy
                dir * speed * 0.1
            } else if roll < 0.7 {
                self.steer(tank.position, enemy.position, state) * speed * ai::SLOW_APPROACH_SPEED
            } else {
                dir.perpendicular() * self.strafe_sign * speed
            }
        };

        let fire = self.should_fire(tank, enemy, dist, params, now, rng);
        if fire {
            self.last_shot_ms = now;
        }

        Some(AiIntent {
            tank_id: self.tank_id,
            movement,
            fire,
        })
    }

    /// All the gates between wanting to shoot and pulling the trigger.
    fn should_fire(
        &self,
        tank: &Tank,
        enemy: &Tank,
        dist: f32,
        params: &AiParams,
        now: f64,
        rng: &mut impl Rng,
    ) -> bool {
        if now - self.last_shot_ms < params.min_shot_interval_ms {
            return false;
        }
        if dist < ai::POINT_BLANK
            || dist < ai::MIN_FIRE_DISTANCE
            || dist > ai::MAX_FIRE_DISTANCE
        {
            return false;
        }

        // Shots at targets crossing fast are wasted shells
        let dir = (enemy.position - tank.position).normalize();
        let crossing = enemy.velocity.dot(dir.perpendicular()).abs();
        if crossing >= ai::MAX_CROSSING_SPEED {
            return false;
        }

        // Lead the target with a randomized prediction factor
        let shell_speed = tank.attributes.kinetics.max(1.0);
        let flight_time = dist / shell_speed;
        let prediction: f32 = rng.gen_range(0.8..1.2);
        let aim_point = enemy.position + enemy.velocity * flight_time * prediction;

        let aim_angle = (aim_point - tank.position).angle();
        let error = angle::shortest_diff(tank.angle, aim_angle).abs();
        let gate = if enemy.velocity.length() < SLOW_TARGET_SPEED {
            ai::LENIENT_ANGLE
        } else {
            ai::STRICT_ANGLE
        };
        if error > gate {
            return false;
        }

        rng.gen::<f32>() < params.accuracy
    }

    /// Drive to a targeted upgrade; release it on arrival or if it was
    /// collected from under us.
    fn fetch(&mut self, tank: &Tank, state: &GameState, upgrade_id: u32) -> Option<AiIntent> {
        let Some(upgrade) = state
            .upgrades
            .iter()
            .find(|u| u.id == upgrade_id && !u.collected)
        else {
            self.target = None;
            return None;
        };

        let dist = tank.position.distance_to(upgrade.position);
        if dist < ai::UPGRADE_REACH {
            self.target = None;
            return None;
        }

        let movement =
            self.steer(tank.position, upgrade.position, state) * tank.attributes.speed;
        Some(AiIntent {
            tank_id: self.tank_id,
            movement,
            fire: false,
        })
    }

    /// No target: drift toward a random waypoint at reduced speed.
    fn wander(&mut self, tank: &Tank, state: &GameState, rng: &mut impl Rng) -> AiIntent {
        let reached = self
            .wander_goal
            .map_or(true, |g| tank.position.distance_to(g) < WANDER_REACH);
        if reached {
            self.wander_goal = Some(pick_waypoint(state, rng));
        }
        let goal = self.wander_goal.expect("set above");

        AiIntent {
            tank_id: self.tank_id,
            movement: self.steer(tank.position, goal, state)
                * tank.attributes.speed
                * ai::WANDER_SPEED,
            fire: false,
        }
    }

    /// Goal direction blended with tree repulsion. Avoidance switches
    /// off close to the goal so pickups next to trees stay reachable.
    fn steer(&self, from: Vec2, goal: Vec2, state: &GameState) -> Vec2 {
        let to_goal = goal - from;
        let goal_dist = to_goal.length();
        let goal_dir = to_goal.normalize();
        if goal_dist < ai::AVOID_GOAL_CUTOFF {
            return goal_dir;
        }

        let mut repulsion = Vec2::ZERO;
        for tree in &state.trees {
            let trunk = tree.trunk_center();
            let dist = from.distance_to(trunk);
            if dist > 0.0 && dist < ai::AVOID_RADIUS {
                repulsion += (from - trunk) * (1.0 / dist) * (ai::AVOID_RADIUS / dist);
            }
        }
        if repulsion.is_near_zero(1e-3) {
            return goal_dir;
        }
        (goal_dir + repulsion.normalize() * ai::AVOID_BLEND).normalize()
    }
}

/// Random in-arena waypoint biased away from tree trunks.
fn pick_waypoint(state: &GameState, rng: &mut impl Rng) -> Vec2 {
    for _ in 0..10 {
        let candidate = crate::game::state::random_tank_position(rng);
        let clear = state
            .trees
            .iter()
            .all(|t| t.trunk_center().distance_to(candidate) > ai::AVOID_RADIUS);
        if clear {
            return candidate;
        }
    }
    crate::game::state::random_tank_position(rng)
}

/// Owns every AI controller and tracks frame-skip efficiency.
pub struct AiManager {
    controllers: HashMap<PlayerId, AiController>,
    pub frames_total: u64,
    pub frames_executed: u64,
}

impl AiManager {
    pub fn new() -> Self {
        Self {
            controllers: HashMap::new(),
            frames_total: 0,
            frames_executed: 0,
        }
    }

    pub fn register(&mut self, tank_id: PlayerId, level: AiLevel) {
        self.controllers
            .insert(tank_id, AiController::new(tank_id, level));
    }

    pub fn unregister(&mut self, tank_id: PlayerId) {
        self.controllers.remove(&tank_id);
    }

    pub fn clear(&mut self) {
        self.controllers.clear();
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn controlled_ids(&self) -> Vec<PlayerId> {
        self.controllers.keys().copied().collect()
    }

    /// Called on steps where the AI pass is skipped, for the efficiency
    /// metric.
    pub fn note_skipped_frame(&mut self) {
        self.frames_total += 1;
    }

    /// Fraction of steps in which controllers actually ran.
    pub fn skip_efficiency(&self) -> f64 {
        if self.frames_total == 0 {
            0.0
        } else {
            self.frames_executed as f64 / self.frames_total as f64
        }
    }

    /// Run every controller and collect intents. Decision work happens
    /// in parallel against the read-only state; results are applied
    /// sequentially by the caller.
    pub fn update(&mut self, state: &GameState, settings: &GameSettings) -> Vec<AiIntent> {
        self.frames_total += 1;
        self.frames_executed += 1;

        let snapshot: Vec<AiController> = self.controllers.values().cloned().collect();
        let results: Vec<(AiController, Option<AiIntent>)> = snapshot
            .into_par_iter()
            .map(|mut controller| {
                let mut rng = rand::thread_rng();
                let intent = controller.run(state, settings, &mut rng);
                (controller, intent)
            })
            .collect();

        let mut intents = Vec::with_capacity(results.len());
        for (controller, intent) in results {
            let id = controller.tank_id;
            if let Some(slot) = self.controllers.get_mut(&id) {
                *slot = controller;
            }
            if let Some(intent) = intent {
                intents.push(intent);
            }
        }
        intents
    }
}

impl Default for AiManager {
    fn default() -> Self {
        Self::new()
    }
}
