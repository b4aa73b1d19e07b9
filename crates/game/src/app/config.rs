use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use behaviour_engine::{
    CollectibleConfig, EquippableConfig, InteractableConfig, PlayerConfig, SlotKind,
    UtilityConfig, Vec3, VitalityConfig,
};
use behaviour_engine::{CollectibleKind, EquippableKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) const CONFIG_ENV_VAR: &str = "BEHAVIOUR_SANDBOX_CONFIG";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {path}: {message}")]
    Invalid { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SandboxConfig {
    pub(crate) tick_rate_hz: f32,
    pub(crate) max_ticks: u32,
    /// Pooled cosmetic objects the host can lend out per tick, per kind.
    pub(crate) pool_capacity_per_tick: u32,
    /// Distance at which bodies touch triggers and pickups.
    pub(crate) contact_radius: f32,
    pub(crate) player: PlayerSpec,
    pub(crate) units: Vec<UnitSpec>,
    pub(crate) interactables: Vec<InteractableSpec>,
    pub(crate) collectibles: Vec<CollectibleSpec>,
    pub(crate) items: Vec<ItemSpec>,
    pub(crate) script: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PlayerSpec {
    pub(crate) name: String,
    pub(crate) position: Vec3,
    pub(crate) forward: Vec3,
    pub(crate) config: PlayerConfig,
}

impl Default for PlayerSpec {
    fn default() -> Self {
        Self {
            name: "player".to_string(),
            position: Vec3::ZERO,
            forward: Vec3::FORWARD,
            config: PlayerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UnitSpec {
    pub(crate) name: String,
    pub(crate) position: Vec3,
    #[serde(default)]
    pub(crate) vitality: VitalityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct InteractableSpec {
    pub(crate) position: Vec3,
    #[serde(default)]
    pub(crate) config: InteractableConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CollectibleSpec {
    pub(crate) name: String,
    pub(crate) position: Vec3,
    #[serde(default)]
    pub(crate) config: CollectibleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ItemSpec {
    pub(crate) position: Vec3,
    #[serde(default)]
    pub(crate) config: EquippableConfig,
    /// Slot the player starts with the item in.
    #[serde(default)]
    pub(crate) equip: Option<SlotKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScriptStep {
    pub(crate) at_tick: u32,
    pub(crate) action: ScriptAction,
}

/// Host events the scenario fires. Names refer to units, items,
/// interactables or collectibles by their configured name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub(crate) enum ScriptAction {
    MovePlayer {
        position: Vec3,
        #[serde(default = "forward")]
        forward: Vec3,
    },
    Interact,
    Pickup {
        item: String,
        slot: SlotKind,
    },
    Drop {
        slot: SlotKind,
    },
    Strike {
        item: String,
        target: String,
        damage: f32,
        #[serde(default)]
        critical: bool,
    },
    Hit {
        target: String,
        damage: f32,
    },
    Heal {
        target: String,
        amount: f32,
    },
    Revive {
        target: String,
        health: f32,
    },
    Kill {
        target: String,
    },
    ThrowUtility {
        hold_seconds: f32,
    },
    Despawn {
        target: String,
    },
}

fn forward() -> Vec3 {
    Vec3::FORWARD
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            max_ticks: 600,
            pool_capacity_per_tick: 8,
            contact_radius: 0.75,
            player: PlayerSpec::default(),
            units: Vec::new(),
            interactables: Vec::new(),
            collectibles: Vec::new(),
            items: Vec::new(),
            script: Vec::new(),
        }
    }
}

impl SandboxConfig {
    pub(crate) fn fixed_dt_seconds(&self) -> f32 {
        1.0 / self.tick_rate_hz
    }

    /// Small arena exercising every behaviour: a paid crate, a duelling
    /// dummy, a handful of pickups and a carried blade.
    pub(crate) fn builtin() -> Self {
        Self {
            max_ticks: 240,
            player: PlayerSpec {
                name: "Scout".to_string(),
                config: PlayerConfig {
                    starting_credits: 5,
                    should_collect: true,
                    collect_range: 2.5,
                    utility: Some(UtilityConfig {
                        name: "Flashbang".to_string(),
                        count: 2,
                        ..UtilityConfig::default()
                    }),
                    ..PlayerConfig::default()
                },
                ..PlayerSpec::default()
            },
            units: vec![UnitSpec {
                name: "Training Dummy".to_string(),
                position: Vec3::new(0.0, 0.0, 3.0),
                vitality: VitalityConfig {
                    base_max_health: 120,
                    damage_resistance: 2,
                    ..VitalityConfig::default()
                },
            }],
            interactables: vec![InteractableSpec {
                position: Vec3::new(0.0, 0.0, 0.5),
                config: InteractableConfig {
                    name: "Supply Crate".to_string(),
                    activation_cost: 3,
                    uses: Some(1),
                    ..InteractableConfig::default()
                },
            }],
            collectibles: vec![
                CollectibleSpec {
                    name: "coin".to_string(),
                    position: Vec3::new(2.0, 0.0, 0.0),
                    config: CollectibleConfig {
                        kind: CollectibleKind::Credit,
                        value: 4,
                    },
                },
                CollectibleSpec {
                    name: "tome".to_string(),
                    position: Vec3::new(-2.0, 0.0, 0.0),
                    config: CollectibleConfig {
                        kind: CollectibleKind::Experience,
                        value: 10,
                    },
                },
            ],
            items: vec![
                ItemSpec {
                    position: Vec3::ZERO,
                    config: EquippableConfig {
                        name: "Ember Orb".to_string(),
                        kind: EquippableKind::Ability,
                        ..EquippableConfig::default()
                    },
                    equip: Some(SlotKind::NativeAbility),
                },
                ItemSpec {
                    position: Vec3::new(0.0, 0.0, 1.0),
                    config: EquippableConfig {
                        name: "Blade".to_string(),
                        ..EquippableConfig::default()
                    },
                    equip: None,
                },
            ],
            script: vec![
                step(10, ScriptAction::Interact),
                step(
                    20,
                    ScriptAction::Pickup {
                        item: "Blade".to_string(),
                        slot: SlotKind::Handheld,
                    },
                ),
                step(
                    40,
                    ScriptAction::Strike {
                        item: "Blade".to_string(),
                        target: "Training Dummy".to_string(),
                        damage: 45.0,
                        critical: false,
                    },
                ),
                step(
                    80,
                    ScriptAction::Strike {
                        item: "Blade".to_string(),
                        target: "Training Dummy".to_string(),
                        damage: 90.0,
                        critical: true,
                    },
                ),
                step(100, ScriptAction::ThrowUtility { hold_seconds: 0.5 }),
                step(
                    120,
                    ScriptAction::Drop {
                        slot: SlotKind::Handheld,
                    },
                ),
                step(
                    140,
                    ScriptAction::MovePlayer {
                        position: Vec3::new(1.0, 0.0, 0.0),
                        forward: Vec3::FORWARD,
                    },
                ),
                step(
                    180,
                    ScriptAction::MovePlayer {
                        position: Vec3::new(-1.0, 0.0, 0.0),
                        forward: Vec3::FORWARD,
                    },
                ),
            ],
            ..Self::default()
        }
    }
}

fn step(at_tick: u32, action: ScriptAction) -> ScriptStep {
    ScriptStep { at_tick, action }
}

pub(crate) fn load_config_file(path: &Path) -> Result<SandboxConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config_json(&raw)?;
    validate_config(&config)?;
    Ok(config)
}

pub(crate) fn parse_config_json(raw: &str) -> Result<SandboxConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, SandboxConfig>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        ConfigError::Parse {
            path: if path.is_empty() { ".".to_string() } else { path },
            source: error.into_inner(),
        }
    })
}

fn invalid(path: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        path: path.into(),
        message: message.into(),
    }
}

fn expected_actual(path: impl Into<String>, expected: impl Display, actual: impl Display) -> ConfigError {
    invalid(path, format!("expected {expected}, got {actual}"))
}

fn require_non_negative(path: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(expected_actual(path, "finite non-negative number", value));
    }
    Ok(())
}

fn require_finite(path: &str, value: Vec3) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(expected_actual(path, "finite vector", format!("{value:?}")));
    }
    Ok(())
}

pub(crate) fn validate_config(config: &SandboxConfig) -> Result<(), ConfigError> {
    if !config.tick_rate_hz.is_finite() || config.tick_rate_hz <= 0.0 {
        return Err(expected_actual(
            "tick_rate_hz",
            "finite positive number",
            config.tick_rate_hz,
        ));
    }
    if config.max_ticks == 0 {
        return Err(expected_actual("max_ticks", "at least 1", config.max_ticks));
    }
    require_non_negative("contact_radius", config.contact_radius)?;

    let player = &config.player.config;
    require_non_negative("player.config.interaction_radius", player.interaction_radius)?;
    require_non_negative("player.config.collect_range", player.collect_range)?;
    require_non_negative("player.config.collect_speed", player.collect_speed)?;
    require_finite("player.position", config.player.position)?;
    require_finite("player.forward", config.player.forward)?;

    let mut names = std::collections::BTreeMap::new();
    names.insert(config.player.name.as_str(), "player.name".to_string());
    let named = config
        .units
        .iter()
        .enumerate()
        .map(|(index, unit)| (unit.name.as_str(), format!("units[{index}].name")))
        .chain(config.interactables.iter().enumerate().map(|(index, spec)| {
            (spec.config.name.as_str(), format!("interactables[{index}].config.name"))
        }))
        .chain(config.collectibles.iter().enumerate().map(|(index, spec)| {
            (spec.name.as_str(), format!("collectibles[{index}].name"))
        }))
        .chain(config.items.iter().enumerate().map(|(index, spec)| {
            (spec.config.name.as_str(), format!("items[{index}].config.name"))
        }));
    for (name, path) in named {
        if let Some(first) = names.insert(name, path.clone()) {
            return Err(invalid(
                path,
                format!("duplicate name '{name}' (first seen at {first})"),
            ));
        }
    }

    for (index, step) in config.script.iter().enumerate() {
        for (field, name) in referenced_names(&step.action) {
            if !names.contains_key(name) {
                return Err(invalid(
                    format!("script[{index}].action.{field}"),
                    format!("unknown name '{name}'"),
                ));
            }
        }
    }
    Ok(())
}

fn referenced_names(action: &ScriptAction) -> Vec<(&'static str, &str)> {
    match action {
        ScriptAction::Pickup { item, .. } => vec![("item", item.as_str())],
        ScriptAction::Strike { item, target, .. } => {
            vec![("item", item.as_str()), ("target", target.as_str())]
        }
        ScriptAction::Hit { target, .. }
        | ScriptAction::Heal { target, .. }
        | ScriptAction::Revive { target, .. }
        | ScriptAction::Kill { target }
        | ScriptAction::Despawn { target } => vec![("target", target.as_str())],
        ScriptAction::MovePlayer { .. }
        | ScriptAction::Interact
        | ScriptAction::Drop { .. }
        | ScriptAction::ThrowUtility { .. } => Vec::new(),
    }
}
