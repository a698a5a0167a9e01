/*
 *  led/mod.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  Status LED rendering. Four LEDs mirror the player's repeat, random,
 *  single and consume flags; one-shot flash effects run on a background
 *  thread and restore the steady state when they finish.
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

pub mod strip;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use smart_leds::RGB8;

use crate::shutdown::Shutdown;
use strip::LedStrip;

pub const LED_COUNT: usize = 4;

/// The four player option flags, in LED order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedFlags {
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
    pub consume: bool,
}

impl LedFlags {
    pub fn levels(&self) -> [bool; LED_COUNT] {
        [self.repeat, self.random, self.single, self.consume]
    }
}

struct LedState {
    strip: Box<dyn LedStrip>,
    brightness: u8,
    last: Option<LedFlags>,
}

impl LedState {
    fn on_color(&self) -> RGB8 {
        RGB8::new(0, 0, self.brightness)
    }

    /// Paint the steady flag state onto the strip.
    fn paint(&mut self, flags: LedFlags) -> Result<(), strip::LedError> {
        let on = self.on_color();
        for (index, lit) in flags.levels().iter().enumerate() {
            self.strip
                .set(index, if *lit { on } else { RGB8::default() });
        }
        self.strip.show()
    }

    fn all_off(&mut self) -> Result<(), strip::LedError> {
        for index in 0..self.strip.len() {
            self.strip.set(index, RGB8::default());
        }
        self.strip.show()
    }
}

/// One-shot flash effect parameters.
#[derive(Debug, Clone, Copy)]
pub struct FlashParams {
    pub color: RGB8,
    pub times: u32,
    pub on: Duration,
    pub off: Duration,
}

/// Which LEDs a flash animation drives, and what the "off" half of a
/// pulse looks like for them.
enum FlashTarget {
    /// Every LED; pulses alternate flash color and dark.
    All,
    /// The steady-on LEDs; pulses alternate flash color and the base
    /// on-color, so the flag display never appears to drop out.
    Active(Vec<usize>),
    /// No LED is on; the first LED stands in so the effect is visible.
    First,
}

/// Scale an 8-bit channel by brightness/255.
fn scale(channel: u8, brightness: u8) -> u8 {
    ((channel as u16 * brightness as u16) / 255) as u8
}

pub struct LedRenderer {
    state: Arc<Mutex<LedState>>,
    animating: Arc<AtomicBool>,
}

// A poisoned lock only means a flash thread panicked mid-frame; the pixel
// state underneath is still valid, so recover the guard and carry on.
fn lock_state(state: &Mutex<LedState>) -> MutexGuard<'_, LedState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl LedRenderer {
    pub fn new(strip: Box<dyn LedStrip>, brightness: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedState {
                strip,
                brightness,
                last: None,
            })),
            animating: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Render the flag state, skipping the strip write when nothing changed.
    pub fn render(&self, flags: LedFlags) {
        let mut state = lock_state(&self.state);
        if state.last == Some(flags) {
            return;
        }
        if let Err(e) = state.paint(flags) {
            warn!("status LED update failed: {e}");
            return;
        }
        state.last = Some(flags);
    }

    /// Adjust brightness; repaints the current state when the level changes.
    pub fn set_brightness(&self, brightness: u8) {
        let mut state = lock_state(&self.state);
        if state.brightness == brightness {
            return;
        }
        state.brightness = brightness;
        if let Some(flags) = state.last {
            if let Err(e) = state.paint(flags) {
                warn!("status LED repaint failed: {e}");
            }
        }
    }

    /// Flash every LED. Dropped silently if an animation is already running.
    pub fn flash_all(&self, params: FlashParams) {
        self.spawn_flash(params, FlashTarget::All);
    }

    /// Flash only the LEDs that are currently lit.
    pub fn flash_active(&self, params: FlashParams) {
        let target = {
            let state = lock_state(&self.state);
            let flags = state.last.unwrap_or_default();
            let lit: Vec<usize> = flags
                .levels()
                .iter()
                .enumerate()
                .filter(|(_, lit)| **lit)
                .map(|(index, _)| index)
                .collect();
            if lit.is_empty() {
                FlashTarget::First
            } else {
                FlashTarget::Active(lit)
            }
        };
        self.spawn_flash(params, target);
    }

    fn spawn_flash(&self, params: FlashParams, target: FlashTarget) {
        // Only one animation at a time; a new request while one is running
        // is dropped rather than queued.
        if self
            .animating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("flash skipped: animation already running");
            return;
        }
        let state = Arc::clone(&self.state);
        let animating = Arc::clone(&self.animating);
        thread::spawn(move || {
            run_flash(&state, params, &target);
            animating.store(false, Ordering::Release);
        });
    }

    pub fn all_off(&self) {
        let mut state = lock_state(&self.state);
        if let Err(e) = state.all_off() {
            warn!("status LED clear failed: {e}");
        }
        state.last = None;
    }
}

/// Flash loop body. The lock is taken per frame, never across a sleep, so
/// steady-state renders interleave instead of stalling the tick loop.
fn run_flash(state: &Mutex<LedState>, params: FlashParams, target: &FlashTarget) {
    for _ in 0..params.times.max(1) {
        {
            let mut state = lock_state(state);
            let flash = RGB8::new(
                scale(params.color.r, state.brightness),
                scale(params.color.g, state.brightness),
                scale(params.color.b, state.brightness),
            );
            match target {
                FlashTarget::All => {
                    for index in 0..state.strip.len() {
                        state.strip.set(index, flash);
                    }
                }
                FlashTarget::Active(indices) => {
                    for &index in indices {
                        state.strip.set(index, flash);
                    }
                }
                FlashTarget::First => state.strip.set(0, flash),
            }
            if let Err(e) = state.strip.show() {
                warn!("flash frame failed: {e}");
                break;
            }
        }
        thread::sleep(params.on);
        {
            let mut state = lock_state(state);
            let base = state.on_color();
            match target {
                FlashTarget::All => {
                    for index in 0..state.strip.len() {
                        state.strip.set(index, RGB8::default());
                    }
                }
                FlashTarget::Active(indices) => {
                    for &index in indices {
                        state.strip.set(index, base);
                    }
                }
                FlashTarget::First => state.strip.set(0, RGB8::default()),
            }
            if let Err(e) = state.strip.show() {
                warn!("flash frame failed: {e}");
                break;
            }
        }
        thread::sleep(params.off);
    }
    // Restore whatever steady state was last rendered.
    let mut state = lock_state(state);
    if let Some(flags) = state.last {
        if let Err(e) = state.paint(flags) {
            warn!("steady state restore failed: {e}");
        }
    } else if let Err(e) = state.all_off() {
        warn!("steady state restore failed: {e}");
    }
}

impl Shutdown for LedRenderer {
    fn name(&self) -> &'static str {
        "status LEDs"
    }

    fn shutdown(&mut self) {
        self.all_off();
    }
}

#[cfg(test)]
mod tests {
    use super::strip::testutil::MockStrip;
    use super::*;

    fn flags(repeat: bool, random: bool, single: bool, consume: bool) -> LedFlags {
        LedFlags {
            repeat,
            random,
            single,
            consume,
        }
    }

    fn wait_for_flash(renderer: &LedRenderer) {
        while renderer.animating.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_render_diffs_unchanged_state() {
        let (strip, frames) = MockStrip::new(LED_COUNT);
        let renderer = LedRenderer::new(Box::new(strip), 32);
        let state = flags(true, false, true, false);
        renderer.render(state);
        renderer.render(state);
        renderer.render(state);
        let frames = frames.lock().expect("lock");
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0],
            vec![
                RGB8::new(0, 0, 32),
                RGB8::default(),
                RGB8::new(0, 0, 32),
                RGB8::default(),
            ]
        );
    }

    #[test]
    fn test_render_updates_on_change() {
        let (strip, frames) = MockStrip::new(LED_COUNT);
        let renderer = LedRenderer::new(Box::new(strip), 32);
        renderer.render(flags(true, false, false, false));
        renderer.render(flags(false, true, false, false));
        assert_eq!(frames.lock().expect("lock").len(), 2);
    }

    #[test]
    fn test_brightness_change_repaints() {
        let (strip, frames) = MockStrip::new(LED_COUNT);
        let renderer = LedRenderer::new(Box::new(strip), 32);
        renderer.render(flags(true, false, false, false));
        renderer.set_brightness(32); // unchanged, no repaint
        renderer.set_brightness(64);
        let frames = frames.lock().expect("lock");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1][0], RGB8::new(0, 0, 64));
    }

    #[test]
    fn test_flash_restores_steady_state() {
        let (strip, frames) = MockStrip::new(LED_COUNT);
        let renderer = LedRenderer::new(Box::new(strip), 255);
        renderer.render(flags(true, false, false, false));
        renderer.flash_all(FlashParams {
            color: RGB8::new(0, 255, 0),
            times: 2,
            on: Duration::from_millis(5),
            off: Duration::from_millis(5),
        });
        wait_for_flash(&renderer);
        let frames = frames.lock().expect("lock");
        // steady + (on, off) x2 + restore
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[1], vec![RGB8::new(0, 255, 0); LED_COUNT]);
        assert_eq!(frames.last().expect("frame")[0], RGB8::new(0, 0, 255));
    }

    #[test]
    fn test_flash_active_falls_back_to_first_led() {
        let (strip, frames) = MockStrip::new(LED_COUNT);
        let renderer = LedRenderer::new(Box::new(strip), 255);
        renderer.render(LedFlags::default());
        renderer.flash_active(FlashParams {
            color: RGB8::new(255, 0, 0),
            times: 1,
            on: Duration::from_millis(5),
            off: Duration::from_millis(5),
        });
        wait_for_flash(&renderer);
        let frames = frames.lock().expect("lock");
        assert_eq!(frames[1][0], RGB8::new(255, 0, 0));
        assert_eq!(frames[1][1], RGB8::default());
    }

    #[test]
    fn test_flash_active_holds_base_color_between_pulses() {
        let (strip, frames) = MockStrip::new(LED_COUNT);
        let renderer = LedRenderer::new(Box::new(strip), 200);
        renderer.render(flags(false, true, false, false));
        renderer.flash_active(FlashParams {
            color: RGB8::new(255, 0, 0),
            times: 1,
            on: Duration::from_millis(5),
            off: Duration::from_millis(5),
        });
        wait_for_flash(&renderer);
        let frames = frames.lock().expect("lock");
        // off half of the pulse returns the lit LED to the base on-color
        // instead of going dark
        assert_eq!(frames[2][1], RGB8::new(0, 0, 200));
    }

    #[test]
    fn test_flash_scales_color_by_brightness() {
        let (strip, frames) = MockStrip::new(LED_COUNT);
        let renderer = LedRenderer::new(Box::new(strip), 51); // 20%
        renderer.render(LedFlags::default());
        renderer.flash_all(FlashParams {
            color: RGB8::new(0, 255, 0),
            times: 1,
            on: Duration::from_millis(5),
            off: Duration::from_millis(5),
        });
        wait_for_flash(&renderer);
        let frames = frames.lock().expect("lock");
        assert_eq!(frames[1][0], RGB8::new(0, 51, 0));
    }

    #[test]
    fn test_second_flash_dropped_while_animating() {
        let (strip, frames) = MockStrip::new(LED_COUNT);
        let renderer = LedRenderer::new(Box::new(strip), 255);
        renderer.render(LedFlags::default());
        let params = FlashParams {
            color: RGB8::new(255, 255, 255),
            times: 3,
            on: Duration::from_millis(10),
            off: Duration::from_millis(10),
        };
        renderer.flash_all(params);
        renderer.flash_all(params); // should be dropped
        wait_for_flash(&renderer);
        let frames = frames.lock().expect("lock");
        // steady + (on, off) x3 + restore; a queued second run would double it
        assert_eq!(frames.len(), 8);
    }
}
