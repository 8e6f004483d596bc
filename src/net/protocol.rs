//! JSON wire protocol.
//!
//! Messages are `{"event": ..., "data": ...}` objects in both
//! directions. Numeric fields are quantized before transmit: positions
//! and velocities to 0.1, angles to 0.01 rad, attributes to integers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{GameSettings, PatchParams, TreeParams};
use crate::game::state::{
    GameState, Patch, PlayerProfile, Shell, Tank, Tree, Upgrade, UpgradeKind,
};
use crate::game::teams::Team;

pub fn quantize_coord(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

pub fn quantize_angle(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

pub fn quantize_attr(v: f32) -> i64 {
    v.round() as i64
}

/// `join` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    pub callname: String,
    #[serde(default)]
    pub tank_color: String,
    #[serde(default)]
    pub tank_camo: String,
    #[serde(default)]
    pub team_name: String,
}

/// `playerInput` payload.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InputData {
    pub movement: MovementData,
    #[serde(default)]
    pub shoot: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MovementData {
    pub x: f32,
    pub y: f32,
}

/// Everything a client can send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join")]
    Join(JoinData),
    #[serde(rename = "playerInput")]
    PlayerInput(InputData),
    #[serde(rename = "toggleAI")]
    ToggleAi { enabled: bool },
    #[serde(rename = "applyAISettings", rename_all = "camelCase")]
    ApplyAiSettings { ai_count: u32, ai_level: String },
    #[serde(rename = "resetGame")]
    ResetGame,
    #[serde(rename = "changeTerrainMap", rename_all = "camelCase")]
    ChangeTerrainMap { map_name: String },
    #[serde(rename = "updateSettings")]
    UpdateSettings(Value),
    #[serde(rename = "applySettings")]
    ApplySettings(Value),
    #[serde(rename = "setPlayerAttributes")]
    SetPlayerAttributes(std::collections::BTreeMap<String, f32>),
    #[serde(rename = "setPlayerAttributeLimit", rename_all = "camelCase")]
    SetPlayerAttributeLimit {
        attribute_name: String,
        bound: String,
        value: f32,
    },
    #[serde(rename = "requestGameState")]
    RequestGameState,
    #[serde(rename = "requestPlayerState")]
    RequestPlayerState,
}

/// Replicated tank row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub vx: f32,
    pub vy: f32,
    pub health: i64,
    pub speed: i64,
    pub gasoline: i64,
    pub rotation: i64,
    pub ammunition: i64,
    pub kinetics: i64,
    pub alive: bool,
    pub is_ai: bool,
    pub body_offset: f32,
    pub turret_offset: f32,
    pub turret_swing: f32,
}

impl TankSnapshot {
    pub fn from_tank(tank: &Tank) -> Self {
        Self {
            id: tank.id.to_string(),
            x: quantize_coord(tank.position.x),
            y: quantize_coord(tank.position.y),
            angle: quantize_angle(tank.angle),
            vx: quantize_coord(tank.velocity.x),
            vy: quantize_coord(tank.velocity.y),
            health: quantize_attr(tank.attributes.health),
            speed: quantize_attr(tank.attributes.speed),
            gasoline: quantize_attr(tank.attributes.gasoline),
            rotation: quantize_attr(tank.attributes.rotation),
            ammunition: quantize_attr(tank.attributes.ammunition),
            kinetics: quantize_attr(tank.attributes.kinetics),
            alive: tank.alive,
            is_ai: tank.is_ai,
            body_offset: quantize_coord(tank.recoil.body_offset),
            turret_offset: quantize_coord(tank.recoil.turret_offset),
            turret_swing: quantize_angle(tank.recoil.turret_swing),
        }
    }

    /// The fields the delta builder watches.
    pub fn gameplay_fields_differ(&self, other: &TankSnapshot) -> bool {
        self.x != other.x
            || self.y != other.y
            || self.angle != other.angle
            || self.health != other.health
            || self.ammunition != other.ammunition
            || self.gasoline != other.gasoline
            || self.alive != other.alive
    }
}

/// Replicated player descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: String,
    pub callname: String,
    pub tank_color: String,
    pub tank_camo: String,
    pub team: Team,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_level: Option<String>,
}

impl PlayerSnapshot {
    pub fn from_profile(profile: &PlayerProfile) -> Self {
        Self {
            id: profile.id.to_string(),
            callname: profile.callname.clone(),
            tank_color: profile.tank_color.clone(),
            tank_camo: profile.tank_camo.clone(),
            team: profile.team.clone(),
            ai_level: profile.ai_level.map(|l| l.name().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSnapshot {
    pub id: u64,
    pub shooter_id: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl ShellSnapshot {
    pub fn from_shell(shell: &Shell) -> Self {
        Self {
            id: shell.id,
            shooter_id: shell.shooter.to_string(),
            x: quantize_coord(shell.position.x),
            y: quantize_coord(shell.position.y),
            vx: quantize_coord(shell.velocity.x),
            vy: quantize_coord(shell.velocity.y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeSnapshot {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: UpgradeKind,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub collected: bool,
}

impl UpgradeSnapshot {
    pub fn from_upgrade(upgrade: &Upgrade) -> Self {
        Self {
            id: upgrade.id,
            kind: upgrade.kind,
            x: quantize_coord(upgrade.position.x),
            y: quantize_coord(upgrade.position.y),
            rotation: quantize_angle(upgrade.rotation),
            collected: upgrade.collected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    #[serde(rename = "type")]
    pub kind: u8,
    pub leaf_rotation: f32,
    pub swing_angle: f32,
    pub foliage_x: f32,
    pub foliage_y: f32,
}

impl TreeSnapshot {
    pub fn from_tree(tree: &Tree) -> Self {
        Self {
            id: tree.id,
            x: quantize_coord(tree.position.x),
            y: quantize_coord(tree.position.y),
            size: quantize_coord(tree.size),
            kind: tree.kind,
            leaf_rotation: quantize_angle(tree.leaf_rotation),
            swing_angle: quantize_angle(tree.swing.angle),
            foliage_x: quantize_coord(tree.foliage.offset.x),
            foliage_y: quantize_coord(tree.foliage.offset.y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    #[serde(rename = "type")]
    pub kind: String,
    pub rotation: f32,
}

impl PatchSnapshot {
    pub fn from_patch(patch: &Patch) -> Self {
        Self {
            id: patch.id,
            x: quantize_coord(patch.position.x),
            y: quantize_coord(patch.position.y),
            size: quantize_coord(patch.size),
            kind: patch.kind.clone(),
            rotation: quantize_angle(patch.rotation),
        }
    }
}

/// Complete replicated world, quantized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSnapshot {
    pub game_time: f64,
    pub tanks: Vec<TankSnapshot>,
    pub players: Vec<PlayerSnapshot>,
    pub shells: Vec<ShellSnapshot>,
    pub upgrades: Vec<UpgradeSnapshot>,
    pub trees: Vec<TreeSnapshot>,
    pub patches: Vec<PatchSnapshot>,
}

impl FullSnapshot {
    pub fn capture(state: &GameState) -> Self {
        Self {
            game_time: state.game_time_ms,
            tanks: state.tanks.values().map(TankSnapshot::from_tank).collect(),
            players: state
                .players
                .values()
                .map(PlayerSnapshot::from_profile)
                .collect(),
            shells: state.shells.iter().map(ShellSnapshot::from_shell).collect(),
            upgrades: state
                .upgrades
                .iter()
                .map(UpgradeSnapshot::from_upgrade)
                .collect(),
            trees: state.trees.iter().map(TreeSnapshot::from_tree).collect(),
            patches: state
                .patches
                .iter()
                .map(PatchSnapshot::from_patch)
                .collect(),
        }
    }
}

/// Partial world: only entities whose replicated fields changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSnapshot {
    pub game_time: f64,
    pub tanks: Vec<TankSnapshot>,
    pub shells: Vec<ShellSnapshot>,
    pub upgrades: Vec<UpgradeSnapshot>,
    pub players: Vec<PlayerSnapshot>,
    /// Renderer continuity: the active terrain knobs ride every delta
    pub tree_params: TreeParams,
    pub patch_params: PatchParams,
}

/// `gameState` payload, tagged full or delta.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameStateMessage {
    Full(FullSnapshot),
    Delta(DeltaSnapshot),
}

/// Per-player derived state pushed to its own socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateData {
    pub health: i64,
    pub speed: i64,
    pub gasoline: i64,
    pub rotation: i64,
    pub ammunition: i64,
    pub kinetics: i64,
    pub alive: bool,
    pub respawn_ms: f64,
    pub reload_ms: f64,
}

impl PlayerStateData {
    pub fn from_tank(tank: &Tank) -> Self {
        Self {
            health: quantize_attr(tank.attributes.health),
            speed: quantize_attr(tank.attributes.speed),
            gasoline: quantize_attr(tank.attributes.gasoline),
            rotation: quantize_attr(tank.attributes.rotation),
            ammunition: quantize_attr(tank.attributes.ammunition),
            kinetics: quantize_attr(tank.attributes.kinetics),
            alive: tank.alive,
            respawn_ms: tank.timers.respawn_ms.max(0.0),
            reload_ms: tank.timers.reload_ms.max(0.0),
        }
    }
}

/// Everything the server can send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "joined", rename_all = "camelCase")]
    Joined {
        player_id: String,
        game_state: FullSnapshot,
    },
    #[serde(rename = "reconnected", rename_all = "camelCase")]
    Reconnected {
        player_id: String,
        game_state: FullSnapshot,
    },
    #[serde(rename = "gameState")]
    GameState(GameStateMessage),
    #[serde(rename = "playerState")]
    PlayerState(PlayerStateData),
    #[serde(rename = "aiAdded")]
    AiAdded { player: PlayerSnapshot },
    #[serde(rename = "aiRemoved", rename_all = "camelCase")]
    AiRemoved { player_id: String },
    #[serde(rename = "gameReset")]
    GameReset,
    #[serde(rename = "terrainMapChanged", rename_all = "camelCase")]
    TerrainMapChanged { map_id: String },
    #[serde(rename = "balanceSettings")]
    BalanceSettings(GameSettings),
    #[serde(rename = "playerLeft", rename_all = "camelCase")]
    PlayerLeft { player_id: String },
    #[serde(rename = "damageFeedback", rename_all = "camelCase")]
    DamageFeedback {
        target_id: String,
        shooter_id: String,
        fatal: bool,
    },
    #[serde(rename = "settingsApplied", rename_all = "camelCase")]
    SettingsApplied {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Encode an outbound event to its wire form.
pub fn encode(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Decode an inbound client message.
pub fn decode(text: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeLimits;
    use crate::util::vec2::Vec2;
    use uuid::Uuid;

    #[test]
    fn quantization_rounds_to_grid() {
        assert_eq!(quantize_coord(123.456), 123.5);
        assert_eq!(quantize_coord(-0.04), -0.0);
        assert_eq!(quantize_angle(1.2345), 1.23);
        assert_eq!(quantize_attr(49.6), 50);
    }

    #[test]
    fn inbound_join_decodes() {
        let event = decode(
            r##"{"event":"join","data":{"callname":"Hunter","tankColor":"#00ff00","tankCamo":"forest","teamName":"NATO"}}"##,
        )
        .unwrap();
        match event {
            ClientEvent::Join(data) => {
                assert_eq!(data.callname, "Hunter");
                assert_eq!(data.team_name, "NATO");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn inbound_player_input_decodes() {
        let event =
            decode(r#"{"event":"playerInput","data":{"movement":{"x":0.5,"y":-1.0},"shoot":true}}"#)
                .unwrap();
        match event {
            ClientEvent::PlayerInput(data) => {
                assert_eq!(data.movement.x, 0.5);
                assert!(data.shoot);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn inbound_admin_events_decode() {
        assert!(matches!(
            decode(r#"{"event":"resetGame"}"#).unwrap(),
            ClientEvent::ResetGame
        ));
        assert!(matches!(
            decode(r#"{"event":"toggleAI","data":{"enabled":true}}"#).unwrap(),
            ClientEvent::ToggleAi { enabled: true }
        ));
        match decode(r#"{"event":"applyAISettings","data":{"aiCount":4,"aiLevel":"hard"}}"#).unwrap()
        {
            ClientEvent::ApplyAiSettings { ai_count, ai_level } => {
                assert_eq!(ai_count, 4);
                assert_eq!(ai_level, "hard");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match decode(
            r#"{"event":"setPlayerAttributeLimit","data":{"attributeName":"speed","bound":"max","value":60}}"#,
        )
        .unwrap()
        {
            ClientEvent::SetPlayerAttributeLimit {
                attribute_name,
                bound,
                value,
            } => {
                assert_eq!(attribute_name, "speed");
                assert_eq!(bound, "max");
                assert_eq!(value, 60.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn malformed_input_is_an_error_not_a_panic() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"event":"warpDrive"}"#).is_err());
        assert!(decode(r#"{"event":"playerInput","data":{}}"#).is_err());
    }

    #[test]
    fn outbound_events_carry_their_names() {
        let encoded = encode(&ServerEvent::PlayerLeft {
            player_id: "abc".to_string(),
        })
        .unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["event"], "playerLeft");
        assert_eq!(value["data"]["playerId"], "abc");

        let encoded = encode(&ServerEvent::GameReset).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["event"], "gameReset");
    }

    #[test]
    fn game_state_message_is_type_tagged() {
        let state = GameState::new();
        let full = FullSnapshot::capture(&state);
        let encoded = encode(&ServerEvent::GameState(GameStateMessage::Full(full))).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["event"], "gameState");
        assert_eq!(value["data"]["type"], "full");
    }

    #[test]
    fn tank_snapshot_is_quantized() {
        let limits = AttributeLimits::default();
        let mut tank = Tank::new(Uuid::new_v4(), Vec2::new(123.4567, 89.0123), false, &limits);
        tank.angle = 1.23456;
        tank.velocity = Vec2::new(12.3456, -7.891);
        tank.attributes.gasoline = 99.4;

        let snapshot = TankSnapshot::from_tank(&tank);
        assert_eq!(snapshot.x, 123.5);
        assert_eq!(snapshot.y, 89.0);
        assert_eq!(snapshot.angle, 1.23);
        assert_eq!(snapshot.vx, 12.3);
        assert_eq!(snapshot.gasoline, 99);
    }

    #[test]
    fn gameplay_field_comparison_ignores_cosmetics() {
        let limits = AttributeLimits::default();
        let tank = Tank::new(Uuid::new_v4(), Vec2::new(100.0, 100.0), false, &limits);
        let a = TankSnapshot::from_tank(&tank);
        let mut b = a.clone();
        assert!(!a.gameplay_fields_differ(&b));

        b.turret_swing = 0.05;
        assert!(!a.gameplay_fields_differ(&b), "recoil is not a delta trigger");

        b.health = a.health - 1;
        assert!(a.gameplay_fields_differ(&b));
    }

    #[test]
    fn full_snapshot_covers_every_table() {
        let mut state = GameState::new();
        let limits = AttributeLimits::default();
        let id = Uuid::new_v4();
        state.tanks.insert(
            id,
            Tank::new(id, Vec2::new(100.0, 100.0), false, &limits),
        );
        state
            .upgrades
            .push(Upgrade::new(0, UpgradeKind::Health, Vec2::new(50.0, 50.0), 0.0));
        state
            .trees
            .push(Tree::new(0, Vec2::new(300.0, 300.0), 48.0, 0, 0.0));

        let snapshot = FullSnapshot::capture(&state);
        assert_eq!(snapshot.tanks.len(), 1);
        assert_eq!(snapshot.upgrades.len(), 1);
        assert_eq!(snapshot.trees.len(), 1);
        assert!(snapshot.shells.is_empty());
    }
}
