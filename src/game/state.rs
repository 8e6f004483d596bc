//! Entity model and game state.
//!
//! Everything here is owned by the simulation task. Players and tanks are
//! two id-keyed tables kept in lockstep: `players[id]` exists exactly when
//! `tanks[id]` does.

use hashbrown::HashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AttributeLimits, DamageParams};
use crate::game::constants::{arena, shell as shell_consts, tank as tank_consts, tree as tree_consts, upgrade as upgrade_consts};
use crate::game::teams::Team;
use crate::util::bounds::Aabb;
use crate::util::vec2::Vec2;

/// Stable id shared by a socket, its player and its tank.
pub type PlayerId = Uuid;

/// Id for shells.
pub type EntityId = u64;

/// The six tunable tank attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Health,
    Speed,
    Gasoline,
    Rotation,
    Ammunition,
    Kinetics,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 6] = [
        AttributeKind::Health,
        AttributeKind::Speed,
        AttributeKind::Gasoline,
        AttributeKind::Rotation,
        AttributeKind::Ammunition,
        AttributeKind::Kinetics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::Health => "health",
            AttributeKind::Speed => "speed",
            AttributeKind::Gasoline => "gasoline",
            AttributeKind::Rotation => "rotation",
            AttributeKind::Ammunition => "ammunition",
            AttributeKind::Kinetics => "kinetics",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

/// Upgrade pickup kinds, one per attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradeKind {
    Speed,
    Gasoline,
    Rotation,
    Ammunition,
    Kinetics,
    Health,
}

impl UpgradeKind {
    pub const ALL: [UpgradeKind; 6] = [
        UpgradeKind::Speed,
        UpgradeKind::Gasoline,
        UpgradeKind::Rotation,
        UpgradeKind::Ammunition,
        UpgradeKind::Kinetics,
        UpgradeKind::Health,
    ];

    /// The attribute this pickup restores.
    pub fn attribute(&self) -> AttributeKind {
        match self {
            UpgradeKind::Speed => AttributeKind::Speed,
            UpgradeKind::Gasoline => AttributeKind::Gasoline,
            UpgradeKind::Rotation => AttributeKind::Rotation,
            UpgradeKind::Ammunition => AttributeKind::Ammunition,
            UpgradeKind::Kinetics => AttributeKind::Kinetics,
            UpgradeKind::Health => AttributeKind::Health,
        }
    }
}

/// AI difficulty level, stored on the player descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiLevel {
    Easy,
    Intermediate,
    Hard,
    Insane,
}

impl AiLevel {
    pub fn name(&self) -> &'static str {
        match self {
            AiLevel::Easy => "easy",
            AiLevel::Intermediate => "intermediate",
            AiLevel::Hard => "hard",
            AiLevel::Insane => "insane",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "easy" => Some(AiLevel::Easy),
            "intermediate" => Some(AiLevel::Intermediate),
            "hard" => Some(AiLevel::Hard),
            "insane" => Some(AiLevel::Insane),
            _ => None,
        }
    }
}

/// Current values of the six tank attributes. Ammunition is whole-valued;
/// the wire quantizes every attribute to an integer anyway.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankAttributes {
    pub health: f32,
    pub speed: f32,
    pub gasoline: f32,
    pub rotation: f32,
    pub ammunition: f32,
    pub kinetics: f32,
}

impl TankAttributes {
    /// Fresh tanks start at the configured maxima, AI and human alike.
    pub fn at_maximum(limits: &AttributeLimits) -> Self {
        Self {
            health: limits.health.max,
            speed: limits.speed.max,
            gasoline: limits.gasoline.max,
            rotation: limits.rotation.max,
            ammunition: limits.ammunition.max,
            kinetics: limits.kinetics.max,
        }
    }

    pub fn get(&self, kind: AttributeKind) -> f32 {
        match kind {
            AttributeKind::Health => self.health,
            AttributeKind::Speed => self.speed,
            AttributeKind::Gasoline => self.gasoline,
            AttributeKind::Rotation => self.rotation,
            AttributeKind::Ammunition => self.ammunition,
            AttributeKind::Kinetics => self.kinetics,
        }
    }

    pub fn set(&mut self, kind: AttributeKind, value: f32) {
        match kind {
            AttributeKind::Health => self.health = value,
            AttributeKind::Speed => self.speed = value,
            AttributeKind::Gasoline => self.gasoline = value,
            AttributeKind::Rotation => self.rotation = value,
            AttributeKind::Ammunition => self.ammunition = value,
            AttributeKind::Kinetics => self.kinetics = value,
        }
    }

    /// Re-clamp every attribute into its configured range. Used after
    /// limit changes from admin events.
    pub fn clamp_all(&mut self, limits: &AttributeLimits) {
        self.health = limits.health.clamp(self.health);
        self.speed = limits.speed.clamp(self.speed);
        self.gasoline = limits.gasoline.clamp(self.gasoline);
        self.rotation = limits.rotation.clamp(self.rotation);
        self.ammunition = limits.ammunition.clamp(self.ammunition);
        self.kinetics = limits.kinetics.clamp(self.kinetics);
    }

    /// Current value as a fraction of the configured maximum.
    pub fn ratio(&self, kind: AttributeKind, limits: &AttributeLimits) -> f32 {
        let max = limit_of(limits, kind).max;
        if max <= 0.0 {
            0.0
        } else {
            self.get(kind) / max
        }
    }
}

/// Range accessor keyed by attribute kind.
pub fn limit_of(limits: &AttributeLimits, kind: AttributeKind) -> crate::config::AttrRange {
    match kind {
        AttributeKind::Health => limits.health,
        AttributeKind::Speed => limits.speed,
        AttributeKind::Gasoline => limits.gasoline,
        AttributeKind::Rotation => limits.rotation,
        AttributeKind::Ammunition => limits.ammunition,
        AttributeKind::Kinetics => limits.kinetics,
    }
}

/// Countdown timers and timestamps, all in game-time milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct TankTimers {
    /// Remaining time until a dead tank respawns
    pub respawn_ms: f64,
    /// Remaining reload time; firing allowed at <= 0
    pub reload_ms: f64,
    /// Shooter is immune to its own shells until this timestamp
    pub firing_immunity_until: f64,
    /// Timestamp of the last shot, drives the recoil animation
    pub last_shot_ms: f64,
}

impl Default for TankTimers {
    fn default() -> Self {
        Self {
            respawn_ms: 0.0,
            reload_ms: 0.0,
            firing_immunity_until: f64::NEG_INFINITY,
            last_shot_ms: f64::NEG_INFINITY,
        }
    }
}

/// Advisory recoil animation state. Replicated for the renderer; never
/// consulted by gameplay.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoilState {
    pub body_offset: f32,
    pub turret_offset: f32,
    pub turret_swing: f32,
}

/// A tank. One per player, AI or human.
#[derive(Debug, Clone)]
pub struct Tank {
    pub id: PlayerId,
    pub position: Vec2,
    /// Heading in radians, kept in [0, 2π)
    pub angle: f32,
    pub velocity: Vec2,
    /// Movement intent set by the owning player or AI controller
    pub target_velocity: Vec2,
    pub attributes: TankAttributes,
    pub alive: bool,
    pub is_ai: bool,
    pub timers: TankTimers,
    pub recoil: RecoilState,
    /// Broad-phase box, refreshed after every integration
    pub bounds: Aabb,
    /// Footprint for the narrow pickup test
    pub collision_width: f32,
    pub collision_height: f32,
}

impl Tank {
    pub fn new(id: PlayerId, position: Vec2, is_ai: bool, limits: &AttributeLimits) -> Self {
        let mut tank = Self {
            id,
            position,
            angle: 0.0,
            velocity: Vec2::ZERO,
            target_velocity: Vec2::ZERO,
            attributes: TankAttributes::at_maximum(limits),
            alive: true,
            is_ai,
            timers: TankTimers::default(),
            recoil: RecoilState::default(),
            bounds: Aabb::default(),
            collision_width: tank_consts::WIDTH,
            collision_height: tank_consts::HEIGHT,
        };
        tank.refresh_bounds();
        tank
    }

    pub fn refresh_bounds(&mut self) {
        self.bounds = Aabb::from_center(self.position, tank_consts::WIDTH, tank_consts::HEIGHT);
    }

    /// Unit vector along the current heading.
    pub fn facing(&self) -> Vec2 {
        Vec2::from_angle(self.angle)
    }

    pub fn can_shoot(&self) -> bool {
        self.alive && self.attributes.ammunition >= 1.0 && self.timers.reload_ms <= 0.0
    }

    /// Apply the configured damage vector, each attribute clamped to its
    /// minimum. Returns true if the hit was fatal.
    pub fn apply_damage(&mut self, damage: &DamageParams, limits: &AttributeLimits) -> bool {
        self.attributes.health =
            (self.attributes.health - damage.health).max(limits.health.min);
        self.attributes.speed = (self.attributes.speed - damage.speed).max(limits.speed.min);
        self.attributes.rotation =
            (self.attributes.rotation - damage.rotation).max(limits.rotation.min);
        self.attributes.kinetics =
            (self.attributes.kinetics - damage.kinetics).max(limits.kinetics.min);
        self.attributes.gasoline =
            (self.attributes.gasoline - damage.gasoline).max(limits.gasoline.min);
        self.attributes.health <= 0.0
    }

    /// Transition Alive -> Dead. A dead tank has zero velocity and a
    /// monotonically decreasing respawn timer.
    pub fn die(&mut self, respawn_time_ms: f64) {
        self.alive = false;
        self.velocity = Vec2::ZERO;
        self.target_velocity = Vec2::ZERO;
        self.timers.respawn_ms = respawn_time_ms;
    }

    /// Transition Dead -> Alive at a fresh position with restored stats.
    pub fn respawn(&mut self, position: Vec2, limits: &AttributeLimits) {
        self.alive = true;
        self.position = position;
        self.velocity = Vec2::ZERO;
        self.target_velocity = Vec2::ZERO;
        self.attributes = TankAttributes::at_maximum(limits);
        self.timers = TankTimers::default();
        self.recoil = RecoilState::default();
        self.refresh_bounds();
    }
}

/// A shell in flight. Pooled; `reset` re-initializes a recycled instance.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    pub id: EntityId,
    pub shooter: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub created_at_ms: f64,
    /// Until this timestamp the shell cannot damage its shooter
    pub shooter_immunity_until: f64,
    pub bounds: Aabb,
}

impl Shell {
    pub fn reset(
        &mut self,
        id: EntityId,
        shooter: PlayerId,
        position: Vec2,
        velocity: Vec2,
        now_ms: f64,
        immunity_until: f64,
    ) {
        self.id = id;
        self.shooter = shooter;
        self.position = position;
        self.velocity = velocity;
        self.created_at_ms = now_ms;
        self.shooter_immunity_until = immunity_until;
        self.refresh_bounds();
    }

    pub fn refresh_bounds(&mut self) {
        self.bounds = Aabb::from_center(self.position, shell_consts::SIZE, shell_consts::SIZE);
    }

    pub fn is_outside_arena(&self) -> bool {
        self.position.x < 0.0
            || self.position.x > arena::WIDTH
            || self.position.y < 0.0
            || self.position.y > arena::HEIGHT
    }
}

/// An upgrade pickup on the ground.
#[derive(Debug, Clone)]
pub struct Upgrade {
    pub id: u32,
    pub kind: UpgradeKind,
    pub position: Vec2,
    /// Cosmetic rotation for the renderer
    pub rotation: f32,
    /// Set during the collision pass; collected upgrades are removed the
    /// same step and never collide again
    pub collected: bool,
    pub bounds: Aabb,
}

impl Upgrade {
    pub fn new(id: u32, kind: UpgradeKind, position: Vec2, rotation: f32) -> Self {
        Self {
            id,
            kind,
            position,
            rotation,
            collected: false,
            bounds: Aabb::from_center(position, upgrade_consts::SIZE, upgrade_consts::SIZE),
        }
    }
}

/// Damped pendulum state of a tree canopy.
#[derive(Debug, Clone, Copy)]
pub struct TreeSwing {
    pub angle: f32,
    pub velocity: f32,
    pub last_impact_ms: f64,
    pub boost_until_ms: f64,
    pub boost_factor: f32,
}

impl Default for TreeSwing {
    fn default() -> Self {
        Self {
            angle: 0.0,
            velocity: 0.0,
            last_impact_ms: f64::NEG_INFINITY,
            boost_until_ms: f64::NEG_INFINITY,
            boost_factor: 1.0,
        }
    }
}

/// Spring-damper translation of the foliage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Foliage {
    pub offset: Vec2,
    pub velocity: Vec2,
}

/// A tree. The trunk collides; the canopy motion is cosmetic but
/// replicated.
#[derive(Debug, Clone)]
pub struct Tree {
    pub id: u32,
    pub position: Vec2,
    pub size: f32,
    pub swing: TreeSwing,
    pub foliage: Foliage,
    pub kind: u8,
    pub leaf_rotation: f32,
}

impl Tree {
    pub fn new(id: u32, position: Vec2, size: f32, kind: u8, leaf_rotation: f32) -> Self {
        Self {
            id,
            position,
            size,
            swing: TreeSwing::default(),
            foliage: Foliage::default(),
            kind,
            leaf_rotation,
        }
    }

    /// Trunk circle center, half a size above the anchor point.
    pub fn trunk_center(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.y - self.size / 2.0)
    }

    pub fn trunk_radius(&self) -> f32 {
        self.size / tree_consts::TRUNK_RADIUS_DIVISOR
    }

    /// Small fixed-size box around the trunk, not the canopy.
    pub fn trunk_bounds(&self) -> Aabb {
        Aabb::from_center(
            self.trunk_center(),
            tree_consts::TRUNK_BOUNDS,
            tree_consts::TRUNK_BOUNDS,
        )
    }
}

/// Decorative ground patch. No collision, replicated once.
#[derive(Debug, Clone)]
pub struct Patch {
    pub id: u32,
    pub position: Vec2,
    pub size: f32,
    pub kind: String,
    pub rotation: f32,
}

/// Player descriptor, replicated to clients when it changes.
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub callname: String,
    pub tank_color: String,
    pub tank_camo: String,
    pub team: Team,
    pub last_update_ms: f64,
    pub ai_level: Option<AiLevel>,
}

/// The entire simulation state, owned by the engine task.
#[derive(Debug, Default)]
pub struct GameState {
    pub players: HashMap<PlayerId, PlayerProfile>,
    pub tanks: HashMap<PlayerId, Tank>,
    pub shells: Vec<Shell>,
    pub upgrades: Vec<Upgrade>,
    pub trees: Vec<Tree>,
    pub patches: Vec<Patch>,
    pub game_time_ms: f64,
    next_shell_id: EntityId,
    next_decor_id: u32,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a player and its tank together, keeping the two tables in
    /// lockstep.
    pub fn add_player(&mut self, profile: PlayerProfile, tank: Tank) {
        debug_assert_eq!(profile.id, tank.id);
        self.tanks.insert(tank.id, tank);
        self.players.insert(profile.id, profile);
    }

    /// Remove a player and its tank. Returns the profile if it existed.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerProfile> {
        self.tanks.remove(&id);
        self.players.remove(&id)
    }

    pub fn tank(&self, id: PlayerId) -> Option<&Tank> {
        self.tanks.get(&id)
    }

    pub fn tank_mut(&mut self, id: PlayerId) -> Option<&mut Tank> {
        self.tanks.get_mut(&id)
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerProfile> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerProfile> {
        self.players.get_mut(&id)
    }

    pub fn alive_tanks(&self) -> impl Iterator<Item = &Tank> {
        self.tanks.values().filter(|t| t.alive)
    }

    pub fn ai_ids(&self) -> Vec<PlayerId> {
        self.tanks
            .values()
            .filter(|t| t.is_ai)
            .map(|t| t.id)
            .collect()
    }

    pub fn next_shell_id(&mut self) -> EntityId {
        let id = self.next_shell_id;
        self.next_shell_id += 1;
        id
    }

    pub fn next_decor_id(&mut self) -> u32 {
        let id = self.next_decor_id;
        self.next_decor_id += 1;
        id
    }

    /// Count uncollected upgrades of one kind.
    pub fn live_upgrades(&self, kind: UpgradeKind) -> usize {
        self.upgrades
            .iter()
            .filter(|u| !u.collected && u.kind == kind)
            .count()
    }
}

/// Random tank position inside the arena margin.
pub fn random_tank_position(rng: &mut impl Rng) -> Vec2 {
    Vec2::new(
        rng.gen_range(arena::TANK_MARGIN..arena::WIDTH - arena::TANK_MARGIN),
        rng.gen_range(arena::TANK_MARGIN..arena::HEIGHT - arena::TANK_MARGIN),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::teams;

    fn test_profile(id: PlayerId) -> PlayerProfile {
        PlayerProfile {
            id,
            callname: "Tester".to_string(),
            tank_color: "#00ff00".to_string(),
            tank_camo: "plain".to_string(),
            team: teams::resolve("NATO"),
            last_update_ms: 0.0,
            ai_level: None,
        }
    }

    #[test]
    fn tanks_spawn_at_attribute_maxima() {
        let limits = AttributeLimits::default();
        let tank = Tank::new(Uuid::new_v4(), Vec2::new(100.0, 100.0), false, &limits);
        assert_eq!(tank.attributes.health, limits.health.max);
        assert_eq!(tank.attributes.kinetics, limits.kinetics.max);
        assert!(tank.alive);
        assert!(tank.can_shoot());
    }

    #[test]
    fn player_and_tank_tables_stay_paired() {
        let mut state = GameState::new();
        let limits = AttributeLimits::default();
        let id = Uuid::new_v4();
        state.add_player(
            test_profile(id),
            Tank::new(id, Vec2::new(100.0, 100.0), false, &limits),
        );
        assert!(state.player(id).is_some());
        assert!(state.tank(id).is_some());

        state.remove_player(id);
        assert!(state.player(id).is_none());
        assert!(state.tank(id).is_none());
    }

    #[test]
    fn damage_clamps_to_minimums() {
        let limits = AttributeLimits::default();
        let damage = DamageParams::default();
        let mut tank = Tank::new(Uuid::new_v4(), Vec2::ZERO, false, &limits);
        for _ in 0..100 {
            tank.apply_damage(&damage, &limits);
        }
        assert_eq!(tank.attributes.speed, limits.speed.min);
        assert_eq!(tank.attributes.rotation, limits.rotation.min);
        assert_eq!(tank.attributes.health, limits.health.min);
    }

    #[test]
    fn fatal_hit_reported_once_health_reaches_zero() {
        let limits = AttributeLimits::default();
        let damage = DamageParams {
            health: 100.0,
            ..Default::default()
        };
        let mut tank = Tank::new(Uuid::new_v4(), Vec2::ZERO, false, &limits);
        assert!(tank.apply_damage(&damage, &limits));
    }

    #[test]
    fn dead_tank_has_zero_velocity_until_respawn() {
        let limits = AttributeLimits::default();
        let mut tank = Tank::new(Uuid::new_v4(), Vec2::new(50.0, 50.0), false, &limits);
        tank.velocity = Vec2::new(30.0, 0.0);
        tank.die(5000.0);
        assert!(!tank.alive);
        assert_eq!(tank.velocity, Vec2::ZERO);
        assert_eq!(tank.timers.respawn_ms, 5000.0);

        tank.attributes.speed = 15.0;
        tank.respawn(Vec2::new(200.0, 200.0), &limits);
        assert!(tank.alive);
        assert_eq!(tank.attributes.speed, limits.speed.max);
        assert_eq!(tank.position, Vec2::new(200.0, 200.0));
    }

    #[test]
    fn shell_reset_refreshes_bounds() {
        let mut shell = Shell::default();
        shell.reset(
            7,
            Uuid::new_v4(),
            Vec2::new(520.0, 450.0),
            Vec2::new(400.0, 0.0),
            0.0,
            200.0,
        );
        assert_eq!(shell.id, 7);
        assert!(shell.bounds.contains_point(Vec2::new(520.0, 450.0)));
        assert!(!shell.is_outside_arena());

        shell.position = Vec2::new(1600.0, 450.0);
        assert!(shell.is_outside_arena());
    }

    #[test]
    fn upgrade_kinds_map_to_attributes() {
        assert_eq!(UpgradeKind::Speed.attribute(), AttributeKind::Speed);
        assert_eq!(UpgradeKind::Health.attribute(), AttributeKind::Health);
        for kind in UpgradeKind::ALL {
            let _ = kind.attribute();
        }
    }

    #[test]
    fn trunk_geometry_follows_size() {
        let tree = Tree::new(0, Vec2::new(200.0, 450.0), 32.0, 0, 0.0);
        assert_eq!(tree.trunk_center(), Vec2::new(200.0, 434.0));
        assert_eq!(tree.trunk_radius(), 2.0);
        assert!(tree.trunk_bounds().contains_point(tree.trunk_center()));
    }

    #[test]
    fn attribute_kind_names_round_trip() {
        for kind in AttributeKind::ALL {
            assert_eq!(AttributeKind::from_name(kind.name()), Some(kind));
        }
        assert!(AttributeKind::from_name("mass").is_none());
    }

    #[test]
    fn attribute_ratio_uses_configured_max() {
        let limits = AttributeLimits::default();
        let mut attrs = TankAttributes::at_maximum(&limits);
        attrs.gasoline = 25.0;
        assert!((attrs.ratio(AttributeKind::Gasoline, &limits) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn random_positions_respect_margin() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let p = random_tank_position(&mut rng);
            assert!(p.x >= arena::TANK_MARGIN && p.x <= arena::WIDTH - arena::TANK_MARGIN);
            assert!(p.y >= arena::TANK_MARGIN && p.y <= arena::HEIGHT - arena::TANK_MARGIN);
        }
    }
}
