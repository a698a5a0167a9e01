/*
 *  button.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  The single front-panel button. Short press runs the roulette script,
 *  long press requests shutdown by raising SIGINT at the process, which
 *  funnels it through the same path as Ctrl-C.
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

use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{info, warn};
use rppal::gpio::{Gpio, InputPin, Level, Trigger};
use thiserror::Error;

use crate::config::Config;
use crate::shutdown::Shutdown;

#[derive(Debug, Error)]
pub enum ButtonError {
    #[error("cannot claim button GPIO pin {0}: {1}")]
    Gpio(u8, String),
}

/// Contact-bounce window; edges closer together than this are ignored.
const BOUNCE_TIME: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Short,
    Long,
}

/// Pure press classification, driven by edge events. The pin is pulled up,
/// so Low is "pressed" and High is "released".
pub struct PressTracker {
    press_started: Option<Instant>,
    last_edge: Option<Instant>,
    last_command: Option<Instant>,
    cooldown: Duration,
    long_press: Duration,
}

impl PressTracker {
    pub fn new(cooldown: Duration, long_press: Duration) -> Self {
        Self {
            press_started: None,
            last_edge: None,
            last_command: None,
            cooldown,
            long_press,
        }
    }

    pub fn classify(&mut self, level: Level, now: Instant) -> Option<Press> {
        if let Some(last) = self.last_edge {
            if now.duration_since(last) < BOUNCE_TIME {
                return None;
            }
        }
        self.last_edge = Some(now);
        match level {
            Level::Low => {
                self.press_started = Some(now);
                None
            }
            Level::High => {
                let started = self.press_started.take()?;
                let held = now.duration_since(started);
                // Both press kinds are rate limited, so a bouncing or
                // impatient finger gets one command per cooldown window.
                if let Some(last) = self.last_command {
                    if now.duration_since(last) < self.cooldown {
                        return None;
                    }
                }
                self.last_command = Some(now);
                if held >= self.long_press {
                    Some(Press::Long)
                } else {
                    Some(Press::Short)
                }
            }
        }
    }
}

fn short_press_command(script: &PathBuf) -> Command {
    let mut command = Command::new("sudo");
    command.arg(script);
    command
}

fn dispatch(press: Press, script: &PathBuf) {
    match press {
        Press::Short => {
            if !script.exists() {
                warn!("roulette script {} not found", script.display());
                return;
            }
            info!("short press: running {}", script.display());
            // Blocks the interrupt callback thread until the script exits,
            // which also reaps the child; further edges queue behind it.
            match short_press_command(script).status() {
                Ok(status) if !status.success() => {
                    warn!("roulette script exited with {status}");
                }
                Ok(_) => {}
                Err(e) => warn!("roulette script failed to start: {e}"),
            }
        }
        Press::Long => {
            info!("long press: requesting shutdown");
            unsafe {
                libc::raise(libc::SIGINT);
            }
        }
    }
}

pub struct ButtonController {
    pin: InputPin,
}

impl ButtonController {
    pub fn new(config: &Config) -> Result<Self, ButtonError> {
        let pin_number = config.gpio.button.pin;
        let gpio = Gpio::new().map_err(|e| ButtonError::Gpio(pin_number, e.to_string()))?;
        let mut pin = gpio
            .get(pin_number)
            .map_err(|e| ButtonError::Gpio(pin_number, e.to_string()))?
            .into_input_pullup();

        let tracker = Arc::new(Mutex::new(PressTracker::new(
            crate::config::secs(config.timing.command_cooldown),
            crate::config::secs(config.timing.long_press_time),
        )));
        let script = PathBuf::from(&config.paths.roulette);
        pin.set_async_interrupt(Trigger::Both, move |level| {
            let press = match tracker.lock() {
                Ok(mut tracker) => tracker.classify(level, Instant::now()),
                Err(_) => None,
            };
            if let Some(press) = press {
                dispatch(press, &script);
            }
        })
        .map_err(|e| ButtonError::Gpio(pin_number, e.to_string()))?;

        info!("button armed on GPIO {pin_number}");
        Ok(Self { pin })
    }
}

impl Shutdown for ButtonController {
    fn name(&self) -> &'static str {
        "front-panel button"
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.pin.clear_async_interrupt() {
            warn!("failed to disarm button interrupt: {e}");
        }
    }
}
