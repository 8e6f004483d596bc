use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Process configuration, loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port for the WebSocket/HTTP endpoint
    pub port: u16,
    /// Port for the Prometheus metrics endpoint
    pub metrics_port: u16,
    /// Directory of static client files
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            metrics_port: 9090,
            static_dir: "public".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.port = parsed,
                _ => tracing::warn!("Invalid PORT '{}', using default", port),
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.metrics_port = parsed,
                _ => tracing::warn!("Invalid METRICS_PORT '{}', using default", port),
            }
        }

        if let Ok(dir) = std::env::var("STATIC_DIR") {
            config.static_dir = dir;
        }

        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.port == self.metrics_port {
            return Err("Metrics port must differ from the game port".to_string());
        }
        Ok(())
    }
}

/// Global timing and fuel parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GameParams {
    /// Milliseconds a destroyed tank waits before respawning
    pub respawn_time: f64,
    /// Milliseconds between shots
    pub reload_time: f64,
    /// Advisory shell lifetime; shells actually expire by leaving the arena
    pub shell_lifetime: f64,
    /// Gasoline burned per pixel of travel
    pub gasoline_per_unit: f32,
    /// Speed multiplier applied when the tank is out of gasoline
    pub gasoline_speed_penalty: f32,
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            respawn_time: 5000.0,
            reload_time: 1000.0,
            shell_lifetime: 10_000.0,
            gasoline_per_unit: 0.02,
            gasoline_speed_penalty: 0.5,
        }
    }
}

/// Per-attribute decrement applied on a shell hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DamageParams {
    pub health: f32,
    pub speed: f32,
    pub rotation: f32,
    pub kinetics: f32,
    pub gasoline: f32,
}

impl Default for DamageParams {
    fn default() -> Self {
        Self {
            health: 1.0,
            speed: 2.0,
            rotation: 4.0,
            kinetics: 15.0,
            gasoline: 5.0,
        }
    }
}

/// Value and live-count target for one upgrade kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpgradeTypeParams {
    pub value: f32,
    pub count: u32,
}

/// Targets for every upgrade kind. The respawner keeps live counts equal
/// to `count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpgradeParams {
    pub speed: UpgradeTypeParams,
    pub gasoline: UpgradeTypeParams,
    pub rotation: UpgradeTypeParams,
    pub ammunition: UpgradeTypeParams,
    pub kinetics: UpgradeTypeParams,
    pub health: UpgradeTypeParams,
}

impl Default for UpgradeParams {
    fn default() -> Self {
        Self {
            speed: UpgradeTypeParams { value: 20.0, count: 2 },
            gasoline: UpgradeTypeParams { value: 40.0, count: 2 },
            rotation: UpgradeTypeParams { value: 5.0, count: 2 },
            ammunition: UpgradeTypeParams { value: 10.0, count: 2 },
            kinetics: UpgradeTypeParams { value: 100.0, count: 2 },
            health: UpgradeTypeParams { value: 25.0, count: 2 },
        }
    }
}

/// Tree generation parameters for the active terrain map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TreeParams {
    pub min_trees: u32,
    pub max_trees: u32,
    pub tree_size: f32,
    pub tree_size_variance: f32,
    pub cluster_groups: u32,
    /// 0 = uniform scatter, 100 = tight clusters
    pub clustering: f32,
    pub tree_type: u8,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            min_trees: 15,
            max_trees: 25,
            tree_size: 48.0,
            tree_size_variance: 16.0,
            cluster_groups: 3,
            clustering: 50.0,
            tree_type: 0,
        }
    }
}

/// One decorative ground patch type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatchTypeParams {
    pub enabled: bool,
    pub quantity: u32,
    pub size: f32,
    pub size_variance: f32,
    pub opacity: f32,
    pub blend: String,
}

/// Decorative patch configuration, keyed by patch type name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatchParams {
    pub patch_types: BTreeMap<String, PatchTypeParams>,
}

impl Default for PatchParams {
    fn default() -> Self {
        let mut patch_types = BTreeMap::new();
        patch_types.insert(
            "sand".to_string(),
            PatchTypeParams {
                enabled: true,
                quantity: 6,
                size: 120.0,
                size_variance: 40.0,
                opacity: 0.6,
                blend: "multiply".to_string(),
            },
        );
        patch_types.insert(
            "moss".to_string(),
            PatchTypeParams {
                enabled: true,
                quantity: 8,
                size: 90.0,
                size_variance: 30.0,
                opacity: 0.5,
                blend: "overlay".to_string(),
            },
        );
        patch_types.insert(
            "dirt".to_string(),
            PatchTypeParams {
                enabled: false,
                quantity: 4,
                size: 150.0,
                size_variance: 50.0,
                opacity: 0.7,
                blend: "multiply".to_string(),
            },
        );
        Self { patch_types }
    }
}

/// Inclusive range for one tank attribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttrRange {
    pub min: f32,
    pub max: f32,
}

impl AttrRange {
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// Bounds for every tank attribute. Tanks spawn at the maxima; damage
/// clamps downward to the minima.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttributeLimits {
    pub health: AttrRange,
    pub speed: AttrRange,
    pub gasoline: AttrRange,
    pub rotation: AttrRange,
    pub ammunition: AttrRange,
    pub kinetics: AttrRange,
}

impl Default for AttributeLimits {
    fn default() -> Self {
        Self {
            health: AttrRange { min: 0.0, max: 100.0 },
            speed: AttrRange { min: 10.0, max: 50.0 },
            gasoline: AttrRange { min: 0.0, max: 100.0 },
            rotation: AttrRange { min: 1.0, max: 20.0 },
            ammunition: AttrRange { min: 0.0, max: 20.0 },
            kinetics: AttrRange { min: 100.0, max: 400.0 },
        }
    }
}

/// The complete runtime-mutable settings block. Admin clients patch it
/// through `applySettings`; the merged view is pushed back out as
/// `balanceSettings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GameSettings {
    #[serde(default)]
    pub game_params: GameParams,
    #[serde(default)]
    pub damage_params: DamageParams,
    #[serde(default)]
    pub upgrade_types: UpgradeParams,
    #[serde(default)]
    pub tree_params: TreeParams,
    #[serde(default)]
    pub patch_params: PatchParams,
    #[serde(default)]
    pub attribute_limits: AttributeLimits,
}

impl GameSettings {
    /// Merge a partial JSON settings block into this one.
    ///
    /// The patch is deep-merged into the serialized form and the result
    /// deserialized back; an unknown key or ill-typed value fails the
    /// whole patch, leaving the settings untouched.
    pub fn apply_patch(&mut self, patch: &serde_json::Value) -> Result<(), String> {
        let mut merged = serde_json::to_value(&*self).map_err(|e| e.to_string())?;
        deep_merge(&mut merged, patch);
        let updated: GameSettings =
            serde_json::from_value(merged).map_err(|e| e.to_string())?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Sanity checks that keep a merged settings block usable.
    pub fn validate(&self) -> Result<(), String> {
        let limits = &self.attribute_limits;
        for (name, range) in [
            ("health", limits.health),
            ("speed", limits.speed),
            ("gasoline", limits.gasoline),
            ("rotation", limits.rotation),
            ("ammunition", limits.ammunition),
            ("kinetics", limits.kinetics),
        ] {
            if range.min > range.max || !range.min.is_finite() || !range.max.is_finite() {
                return Err(format!("invalid {name} limits: {} > {}", range.min, range.max));
            }
        }
        if self.tree_params.min_trees > self.tree_params.max_trees {
            return Err("minTrees exceeds maxTrees".to_string());
        }
        Ok(())
    }
}

/// Recursively overlay `patch` onto `base`. Objects merge key by key,
/// everything else replaces.
fn deep_merge(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, _) => *base_slot = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_server_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn clashing_ports_fail_validation() {
        let config = ServerConfig {
            metrics_port: 8080,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_damage_vector() {
        let damage = DamageParams::default();
        assert_eq!(damage.health, 1.0);
        assert_eq!(damage.kinetics, 15.0);
    }

    #[test]
    fn attr_range_clamps_both_ends() {
        let range = AttrRange { min: 10.0, max: 50.0 };
        assert_eq!(range.clamp(5.0), 10.0);
        assert_eq!(range.clamp(75.0), 50.0);
        assert_eq!(range.clamp(30.0), 30.0);
    }

    #[test]
    fn patch_merges_partial_block() {
        let mut settings = GameSettings::default();
        let patch = json!({
            "gameParams": { "reloadTime": 750.0 },
            "treeParams": { "minTrees": 5, "maxTrees": 8 }
        });
        settings.apply_patch(&patch).unwrap();
        assert_eq!(settings.game_params.reload_time, 750.0);
        assert_eq!(settings.tree_params.min_trees, 5);
        // Untouched fields keep their defaults
        assert_eq!(settings.game_params.respawn_time, 5000.0);
        assert_eq!(settings.tree_params.tree_size, 48.0);
    }

    #[test]
    fn patch_with_unknown_key_is_rejected_atomically() {
        let mut settings = GameSettings::default();
        let patch = json!({
            "gameParams": { "reloadTime": 1.0, "noSuchKnob": true }
        });
        assert!(settings.apply_patch(&patch).is_err());
        // Nothing applied
        assert_eq!(settings.game_params.reload_time, 1000.0);
    }

    #[test]
    fn patch_can_edit_one_patch_type() {
        let mut settings = GameSettings::default();
        let patch = json!({
            "patchParams": { "patchTypes": { "dirt": { "enabled": true, "quantity": 9,
                "size": 100.0, "sizeVariance": 10.0, "opacity": 0.4, "blend": "multiply" } } }
        });
        settings.apply_patch(&patch).unwrap();
        let dirt = &settings.patch_params.patch_types["dirt"];
        assert!(dirt.enabled);
        assert_eq!(dirt.quantity, 9);
        // Other types untouched
        assert!(settings.patch_params.patch_types["sand"].enabled);
    }

    #[test]
    fn inverted_limits_are_rejected() {
        let mut settings = GameSettings::default();
        let patch = json!({
            "attributeLimits": { "speed": { "min": 60.0, "max": 50.0 } }
        });
        assert!(settings.apply_patch(&patch).is_err());
        assert_eq!(settings.attribute_limits.speed.min, 10.0);
    }

    #[test]
    fn settings_round_trip_json() {
        let settings = GameSettings::default();
        let value = serde_json::to_value(&settings).unwrap();
        assert!(value.get("attributeLimits").is_some());
        let back: GameSettings = serde_json::from_value(value).unwrap();
        assert_eq!(back.attribute_limits.speed.max, 50.0);
    }
}
