/*
 *  config.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  YAML settings. Every section and field carries a default so a partial
 *  or missing file still yields a runnable configuration.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::warn;
use serde::Deserialize;
use smart_leds::RGB8;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convert a fractional-seconds setting to a `Duration`. Negative values
/// collapse to zero rather than panicking.
pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub mpd: MpdConfig,
    pub display: DisplayConfig,
    pub timing: TimingConfig,
    pub effects: EffectsConfig,
    pub gpio: GpioConfig,
    pub updates: UpdatesConfig,
    pub paths: PathsConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Load the file, falling back to defaults when it is missing or
    /// malformed. Reload must never take the service down.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("using default settings: {e}");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MpdConfig {
    pub host: String,
    pub port: u16,
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayTimeMode {
    #[default]
    Elapsed,
    Remaining,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: DisplayTimeMode,
    pub brightness: u8,
    pub pause_mode: PauseModeConfig,
    pub play_mode: PlayModeConfig,
    pub stop_mode: StopModeConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayTimeMode::Elapsed,
            brightness: 4,
            pause_mode: PauseModeConfig::default(),
            play_mode: PlayModeConfig::default(),
            stop_mode: StopModeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PauseModeConfig {
    pub blink_interval: f64,
}

impl Default for PauseModeConfig {
    fn default() -> Self {
        Self { blink_interval: 1.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlayModeConfig {
    pub track_number: TrackNumberConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackNumberConfig {
    pub show_number: bool,
    pub display_time: f64,
}

impl Default for TrackNumberConfig {
    fn default() -> Self {
        Self {
            show_number: true,
            display_time: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StopModeConfig {
    pub stop_symbol_time: f64,
    pub track_total_time: f64,
    pub playlist_time: f64,
}

impl Default for StopModeConfig {
    fn default() -> Self {
        Self {
            stop_symbol_time: 2.0,
            track_total_time: 2.0,
            playlist_time: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub update_interval: f64,
    pub volume_update_interval: f64,
    pub volume_display_duration: f64,
    pub command_cooldown: f64,
    pub long_press_time: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            update_interval: 0.5,
            volume_update_interval: 0.1,
            volume_display_duration: 3.0,
            command_cooldown: 0.5,
            long_press_time: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    FlashActive,
    FlashAll,
}

/// A per-event entry: either a plain on/off switch, or an override block
/// replacing some of the event's built-in effect parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventSetting {
    Toggle(bool),
    Override(EffectOverride),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EffectOverride {
    pub effect: Option<EffectKind>,
    pub repeat_count: Option<u32>,
    pub on_duration: Option<f64>,
    pub off_duration: Option<f64>,
    pub r: Option<u8>,
    pub g: Option<u8>,
    pub b: Option<u8>,
}

/// Fully resolved effect, ready for the LED renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectSpec {
    pub kind: EffectKind,
    pub repeat_count: u32,
    pub on: Duration,
    pub off: Duration,
    pub color: RGB8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    pub enabled: bool,
    pub events: HashMap<String, EventSetting>,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            events: HashMap::new(),
        }
    }
}

impl EffectsConfig {
    /// Resolve the effect for a named event. `None` means the event is
    /// disabled, either globally or individually.
    pub fn resolve(&self, name: &str, defaults: EffectSpec) -> Option<EffectSpec> {
        if !self.enabled {
            return None;
        }
        match self.events.get(name) {
            None | Some(EventSetting::Toggle(true)) => Some(defaults),
            Some(EventSetting::Toggle(false)) => None,
            Some(EventSetting::Override(over)) => Some(EffectSpec {
                kind: over.effect.unwrap_or(defaults.kind),
                repeat_count: over.repeat_count.unwrap_or(defaults.repeat_count),
                on: over.on_duration.map(secs).unwrap_or(defaults.on),
                off: over.off_duration.map(secs).unwrap_or(defaults.off),
                color: RGB8::new(
                    over.r.unwrap_or(defaults.color.r),
                    over.g.unwrap_or(defaults.color.g),
                    over.b.unwrap_or(defaults.color.b),
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GpioConfig {
    pub status_leds: StatusLedConfig,
    pub display: DisplayPortConfig,
    pub button: ButtonConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusLedConfig {
    pub pin: u8,
    pub count: usize,
    pub order: String,
    pub brightness: u8,
}

impl Default for StatusLedConfig {
    fn default() -> Self {
        Self {
            pin: 21,
            count: 4,
            order: "GRB".to_string(),
            brightness: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayPortConfig {
    pub serial_port: String,
    pub baudrate: u32,
}

impl Default for DisplayPortConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyAMA0".to_string(),
            baudrate: 19200,
        }
    }
}

/// The button entry is a bare pin number (`button: 20`); a mapping with a
/// `pin` key is accepted too.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "ButtonConfigRepr")]
pub struct ButtonConfig {
    pub pin: u8,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self { pin: 20 }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ButtonConfigRepr {
    Pin(u8),
    Table {
        #[serde(default = "default_button_pin")]
        pin: u8,
    },
}

fn default_button_pin() -> u8 {
    ButtonConfig::default().pin
}

impl From<ButtonConfigRepr> for ButtonConfig {
    fn from(repr: ButtonConfigRepr) -> Self {
        match repr {
            ButtonConfigRepr::Pin(pin) => Self { pin },
            ButtonConfigRepr::Table { pin } => Self { pin },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpdatesConfig {
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub check_interval: f64,
    pub file: String,
    pub debounce_time: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            check_interval: 2.0,
            file: ".update_trigger".to_string(),
            debounce_time: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub roulette: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            roulette: "scripts/roulette.sh".to_string(),
        }
    }
}
