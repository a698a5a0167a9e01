/*
 *  service.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  The render state machine. Each tick polls the player, arbitrates
 *  between the competing display modes (volume overlay, track-number
 *  overlay, time, pause blink, stop rotation) and emits display and LED
 *  commands. Planning is pure; hardware I/O happens only in `apply`.
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
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, info, warn};
use smart_leds::RGB8;

use crate::button::ButtonController;
use crate::config::{
    secs, Config, DisplayTimeMode, EffectKind, EffectSpec, EffectsConfig,
};
use crate::display::driver::Tm1652;
use crate::display::transport::{uart_opener, Transport};
use crate::led::strip::{ColorOrder, Ws2812Strip};
use crate::led::{FlashParams, LedFlags, LedRenderer};
use crate::mpd::{MpdClient, PlaybackState, PlayerSource, PlayerStatus, PlaylistSummary};
use crate::pacer::Pacer;
use crate::shutdown::{run_all, Shutdown};

/// Grace period between component shutdown and process exit.
const CLEANUP_GRACE: Duration = Duration::from_millis(300);

fn track_change_defaults() -> EffectSpec {
    EffectSpec {
        kind: EffectKind::FlashActive,
        repeat_count: 2,
        on: Duration::from_millis(200),
        off: Duration::from_millis(100),
        color: RGB8::new(0, 255, 0),
    }
}

/// One display command for this tick. `None` in the plan means the panel
/// keeps whatever it last showed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayOp {
    Volume(i64),
    TrackNumber(i64),
    Time { minutes: i64, seconds: i64, colon: bool },
    TrackTotal(i64),
    Dashes,
    Blank,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickPlan {
    pub display: Option<DisplayOp>,
    pub effect: Option<EffectSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopPhase {
    Symbol,
    TrackTotal,
    PlaylistTime,
}

impl StopPhase {
    fn next(self) -> Self {
        match self {
            Self::Symbol => Self::TrackTotal,
            Self::TrackTotal => Self::PlaylistTime,
            Self::PlaylistTime => Self::Symbol,
        }
    }
}

/// The planner's view of the configuration, rebuilt on every reload.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub mode: DisplayTimeMode,
    pub blink_interval: Duration,
    pub show_track_number: bool,
    pub track_display_time: Duration,
    pub stop_symbol_time: Duration,
    pub track_total_time: Duration,
    pub playlist_time: Duration,
    pub volume_display_duration: Duration,
    pub effects: EffectsConfig,
}

impl RenderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.display.mode,
            // a zero interval would make the blink phase undefined
            blink_interval: secs(config.display.pause_mode.blink_interval.max(0.1)),
            show_track_number: config.display.play_mode.track_number.show_number,
            track_display_time: secs(config.display.play_mode.track_number.display_time),
            stop_symbol_time: secs(config.display.stop_mode.stop_symbol_time),
            track_total_time: secs(config.display.stop_mode.track_total_time),
            playlist_time: secs(config.display.stop_mode.playlist_time),
            volume_display_duration: secs(config.timing.volume_display_duration),
            effects: config.effects.clone(),
        }
    }
}

/// Pure mode arbitration. Holds all cross-tick state; talks to the player
/// only for the secondary queries (current song, playlist contents).
pub struct RenderPlanner {
    settings: RenderSettings,
    epoch: Instant,
    previous_state: Option<PlaybackState>,
    last_song_id: Option<String>,
    last_volume: Option<i64>,
    volume_overlay_until: Option<Instant>,
    track_overlay_until: Option<Instant>,
    stop_phase: StopPhase,
    stop_phase_started: Option<Instant>,
    playlist_version: Option<String>,
    playlist_cache: PlaylistSummary,
}

impl RenderPlanner {
    pub fn new(settings: RenderSettings, epoch: Instant) -> Self {
        Self {
            settings,
            epoch,
            previous_state: None,
            last_song_id: None,
            last_volume: None,
            volume_overlay_until: None,
            track_overlay_until: None,
            stop_phase: StopPhase::Symbol,
            stop_phase_started: None,
            playlist_version: None,
            playlist_cache: PlaylistSummary::default(),
        }
    }

    pub fn mode(&self) -> DisplayTimeMode {
        self.settings.mode
    }

    pub fn apply_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
    }

    pub fn volume_overlay_active(&self, now: Instant) -> bool {
        self.volume_overlay_until.is_some_and(|until| now < until)
    }

    pub fn plan_tick(
        &mut self,
        status: &PlayerStatus,
        now: Instant,
        player: &mut dyn PlayerSource,
    ) -> TickPlan {
        if self.last_volume != Some(status.volume) {
            self.last_volume = Some(status.volume);
            self.volume_overlay_until = Some(now + self.settings.volume_display_duration);
            debug!("volume overlay: {}", status.volume);
        }
        // The volume overlay preempts everything, including transition
        // bookkeeping: previous_state is deliberately not recorded here.
        if self.volume_overlay_active(now) {
            return TickPlan {
                display: Some(DisplayOp::Volume(status.volume)),
                effect: None,
            };
        }

        let mut plan = TickPlan::default();
        match status.state {
            PlaybackState::Play => {
                self.plan_playing(status, now, player, &mut plan);
            }
            PlaybackState::Pause => {
                plan.display = Some(self.pause_display(status, now));
            }
            PlaybackState::Stop => {
                plan.display = Some(self.stop_display(status, now, player));
            }
        }
        self.previous_state = Some(status.state);
        plan
    }

    fn plan_playing(
        &mut self,
        status: &PlayerStatus,
        now: Instant,
        player: &mut dyn PlayerSource,
        plan: &mut TickPlan,
    ) {
        // A track change is recognized on a new song id or on any entry
        // into Play. The second clause re-fires the overlay when resuming
        // the same song from pause; that matches the shipped behavior and
        // is pinned by a test below.
        let changed = self.last_song_id.as_deref() != Some(status.song_id.as_str())
            || self.previous_state != Some(PlaybackState::Play);
        if self.settings.show_track_number && changed {
            if let Some(song) = player.current_song() {
                self.last_song_id = Some(status.song_id.clone());
                if let Some(number) = song
                    .track
                    .as_deref()
                    .and_then(|raw| raw.parse::<i64>().ok())
                    .filter(|n| (1..=99).contains(n))
                {
                    debug!("track changed to {number}");
                    self.track_overlay_until = Some(now + self.settings.track_display_time);
                    plan.display = Some(DisplayOp::TrackNumber(number));
                    plan.effect = self
                        .settings
                        .effects
                        .resolve("on_track_change", track_change_defaults());
                }
            }
        }
        let overlay_active = self.track_overlay_until.is_some_and(|until| now < until);
        if !overlay_active {
            plan.display = Some(self.time_display(status));
        }
    }

    /// Elapsed or remaining time per the configured mode; missing data
    /// renders dashes instead of failing the tick.
    fn time_display(&self, status: &PlayerStatus) -> DisplayOp {
        let Some(elapsed) = status.elapsed else {
            return DisplayOp::Dashes;
        };
        let value = match (self.settings.mode, status.duration) {
            (DisplayTimeMode::Remaining, Some(duration)) => duration - elapsed,
            _ => elapsed,
        };
        let whole = value as i64;
        DisplayOp::Time {
            minutes: whole / 60,
            seconds: whole % 60,
            colon: true,
        }
    }

    fn pause_display(&self, status: &PlayerStatus, now: Instant) -> DisplayOp {
        let blink = self.settings.blink_interval.as_secs_f64();
        let phase = (now.duration_since(self.epoch).as_secs_f64() / blink) as u64 % 2;
        if phase == 0 {
            self.time_display(status)
        } else {
            DisplayOp::Blank
        }
    }

    fn stop_display(
        &mut self,
        status: &PlayerStatus,
        now: Instant,
        player: &mut dyn PlayerSource,
    ) -> DisplayOp {
        if self.previous_state != Some(PlaybackState::Stop) {
            self.stop_phase = StopPhase::Symbol;
            self.stop_phase_started = Some(now);
        }
        let started = *self.stop_phase_started.get_or_insert(now);
        if now.duration_since(started) >= self.phase_duration(self.stop_phase) {
            self.stop_phase = self.stop_phase.next();
            self.stop_phase_started = Some(now);
            debug!("stop rotation advanced to {:?}", self.stop_phase);
        }

        // The playlist is refetched only when its version token moves.
        if self.playlist_version.as_deref() != Some(status.playlist_version.as_str()) {
            if let Some(summary) = player.playlist_info() {
                self.playlist_cache = summary;
                self.playlist_version = Some(status.playlist_version.clone());
                debug!("playlist cache refreshed");
            }
        }

        match self.stop_phase {
            StopPhase::Symbol => DisplayOp::Dashes,
            StopPhase::TrackTotal => DisplayOp::TrackTotal(self.playlist_cache.total_tracks),
            StopPhase::PlaylistTime => {
                let total = self.playlist_cache.total_duration() as i64;
                DisplayOp::Time {
                    minutes: total / 60,
                    seconds: total % 60,
                    colon: true,
                }
            }
        }
    }

    fn phase_duration(&self, phase: StopPhase) -> Duration {
        match phase {
            StopPhase::Symbol => self.settings.stop_symbol_time,
            StopPhase::TrackTotal => self.settings.track_total_time,
            StopPhase::PlaylistTime => self.settings.playlist_time,
        }
    }
}

fn led_flags(status: &PlayerStatus) -> LedFlags {
    LedFlags {
        repeat: status.repeat,
        random: status.random,
        single: status.single,
        consume: status.consume,
    }
}

/// The long-lived service: hardware handles, planner, tick loop.
pub struct PlayerService {
    config: Config,
    config_path: PathBuf,
    planner: RenderPlanner,
    player: MpdClient,
    display: Tm1652,
    leds: LedRenderer,
    button: ButtonController,
    last_config_check: Option<Instant>,
    no_wait_mpd: bool,
}

impl PlayerService {
    pub fn new(config: Config, config_path: PathBuf, no_wait_mpd: bool) -> anyhow::Result<Self> {
        let player = MpdClient::new(config.mpd.host.clone(), config.mpd.port);

        info!("setting up hardware");
        let strip = Ws2812Strip::new(
            config.gpio.status_leds.count,
            ColorOrder::parse(&config.gpio.status_leds.order),
        )
        .context("status LED strip")?;
        let leds = LedRenderer::new(Box::new(strip), config.gpio.status_leds.brightness);

        let link = Transport::new(uart_opener(
            config.gpio.display.serial_port.clone(),
            config.gpio.display.baudrate,
        ));
        let mut display = Tm1652::new(link, config.display.brightness);
        display.show_dashes();

        let button = ButtonController::new(&config).context("front-panel button")?;

        let planner = RenderPlanner::new(RenderSettings::from_config(&config), Instant::now());
        Ok(Self {
            config,
            config_path,
            planner,
            player,
            display,
            leds,
            button,
            last_config_check: None,
            no_wait_mpd,
        })
    }

    pub async fn run(&mut self) {
        if self.no_wait_mpd {
            info!("skipping MPD readiness wait");
        } else if !self.player.wait_for_ready() {
            warn!("MPD never became ready; polling anyway");
        }

        info!("player service running");
        let mut pacer = Pacer::new(Instant::now());
        loop {
            let now = Instant::now();
            self.check_config_update(now);
            self.tick(now);

            let interval = if self.planner.volume_overlay_active(Instant::now()) {
                secs(self.config.timing.volume_update_interval)
            } else {
                secs(self.config.timing.update_interval)
            };
            let deadline = pacer.advance(Instant::now(), interval);
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        }
    }

    fn tick(&mut self, now: Instant) {
        // An unreachable daemon skips rendering; the panel keeps its last
        // contents and the loop keeps ticking.
        let Some(status) = self.player.status() else {
            return;
        };
        self.leds.render(led_flags(&status));
        let plan = self.planner.plan_tick(&status, now, &mut self.player);
        self.apply(&plan);
    }

    fn apply(&mut self, plan: &TickPlan) {
        match plan.display {
            Some(DisplayOp::Volume(volume)) => self.display.show_volume(volume),
            Some(DisplayOp::TrackNumber(number)) => self.display.show_track_number(number),
            Some(DisplayOp::Time {
                minutes,
                seconds,
                colon,
            }) => self.display.show_time(minutes, seconds, colon),
            Some(DisplayOp::TrackTotal(count)) => self.display.show_track_total(count),
            Some(DisplayOp::Dashes) => self.display.show_dashes(),
            Some(DisplayOp::Blank) => self.display.clear(),
            None => {}
        }
        if let Some(effect) = plan.effect {
            let params = FlashParams {
                color: effect.color,
                times: effect.repeat_count,
                on: effect.on,
                off: effect.off,
            };
            match effect.kind {
                EffectKind::FlashActive => self.leds.flash_active(params),
                EffectKind::FlashAll => self.leds.flash_all(params),
            }
        }
    }

    /// Hot reload: a marker file next to the config file signals that the
    /// settings changed. Checked on an interval, debounced, marker removed
    /// after a successful reload.
    fn check_config_update(&mut self, now: Instant) {
        let check_interval = secs(self.config.updates.trigger.check_interval);
        if let Some(last) = self.last_config_check {
            if now.duration_since(last) < check_interval {
                return;
            }
        }
        self.last_config_check = Some(now);

        let marker = self
            .config_path
            .parent()
            .map(|dir| dir.join(&self.config.updates.trigger.file))
            .unwrap_or_else(|| PathBuf::from(&self.config.updates.trigger.file));
        if !marker.exists() {
            return;
        }

        info!("configuration update triggered");
        thread::sleep(secs(self.config.updates.trigger.debounce_time));
        let new_config = Config::load_or_default(&self.config_path);

        self.leds.set_brightness(new_config.gpio.status_leds.brightness);
        self.display.set_brightness(new_config.display.brightness);

        let mode_changed = new_config.display.mode != self.planner.mode();
        self.planner
            .apply_settings(RenderSettings::from_config(&new_config));
        self.config = new_config;

        if mode_changed {
            debug!("display mode changed; re-rendering");
            if let Some(status) = self.player.status() {
                let plan = self.planner.plan_tick(&status, Instant::now(), &mut self.player);
                self.apply(&plan);
            }
        }

        if let Err(e) = std::fs::remove_file(&marker) {
            warn!("cannot remove update marker {}: {e}", marker.display());
        }
    }

    pub fn stop_playback(&mut self) {
        self.player.stop();
    }

    /// Release every hardware resource, newest first. Each step is
    /// best-effort; a failure never blocks the remaining steps.
    pub fn cleanup(&mut self) {
        info!("shutting down player service");
        let mut hooks: [&mut dyn Shutdown; 4] = [
            &mut self.leds,
            &mut self.display,
            &mut self.button,
            &mut self.player,
        ];
        run_all(&mut hooks);
        thread::sleep(CLEANUP_GRACE);
        info!("player service shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpd::SongInfo;

    struct FakeSource {
        song: Option<SongInfo>,
        playlist: Option<PlaylistSummary>,
        song_calls: u32,
        playlist_calls: u32,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                song: Some(SongInfo {
                    track: Some("7".to_string()),
                }),
                playlist: Some(PlaylistSummary {
                    total_tracks: 12,
                    durations: vec![120.0, 65.0],
                }),
                song_calls: 0,
                playlist_calls: 0,
            }
        }
    }

    impl PlayerSource for FakeSource {
        fn status(&mut self) -> Option<PlayerStatus> {
            None
        }

        fn current_song(&mut self) -> Option<SongInfo> {
            self.song_calls += 1;
            self.song.clone()
        }

        fn playlist_info(&mut self) -> Option<PlaylistSummary> {
            self.playlist_calls += 1;
            self.playlist.clone()
        }
    }

    fn settings() -> RenderSettings {
        let mut settings = RenderSettings::from_config(&Config::default());
        // keep the startup volume overlay out of the way unless a test
        // opts back in
        settings.volume_display_duration = Duration::ZERO;
        settings
    }

    fn playing(song_id: &str, elapsed: f64, duration: f64) -> PlayerStatus {
        PlayerStatus {
            state: PlaybackState::Play,
            elapsed: Some(elapsed),
            duration: Some(duration),
            song_id: song_id.to_string(),
            ..PlayerStatus::default()
        }
    }

    fn stopped(playlist_version: &str) -> PlayerStatus {
        PlayerStatus {
            state: PlaybackState::Stop,
            playlist_version: playlist_version.to_string(),
            ..PlayerStatus::default()
        }
    }

    #[test]
    fn test_volume_overlay_preempts_track_change() {
        let mut settings = settings();
        settings.volume_display_duration = Duration::from_secs(3);
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings, epoch);
        let mut source = FakeSource::new();

        let mut status = playing("1", 10.0, 200.0);
        status.volume = 55;
        // volume changed (from unset) and a track change is pending; the
        // overlay wins and track detection does not even run
        let plan = planner.plan_tick(&status, epoch, &mut source);
        assert_eq!(plan.display, Some(DisplayOp::Volume(55)));
        assert_eq!(plan.effect, None);
        assert_eq!(source.song_calls, 0);

        // still inside the 3s window
        let plan = planner.plan_tick(&status, epoch + Duration::from_secs(2), &mut source);
        assert_eq!(plan.display, Some(DisplayOp::Volume(55)));

        // overlay expired; the pending track change now fires
        let plan = planner.plan_tick(&status, epoch + Duration::from_secs(4), &mut source);
        assert_eq!(plan.display, Some(DisplayOp::TrackNumber(7)));
        assert!(plan.effect.is_some());
    }

    #[test]
    fn test_track_overlay_then_time_display() {
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();
        let status = playing("1", 83.0, 200.0);

        let plan = planner.plan_tick(&status, epoch, &mut source);
        assert_eq!(plan.display, Some(DisplayOp::TrackNumber(7)));

        // inside the 2s overlay window: keep showing the track number
        let plan = planner.plan_tick(&status, epoch + Duration::from_secs(1), &mut source);
        assert_eq!(plan.display, None);

        // after expiry: elapsed time
        let plan = planner.plan_tick(&status, epoch + Duration::from_secs(3), &mut source);
        assert_eq!(
            plan.display,
            Some(DisplayOp::Time {
                minutes: 1,
                seconds: 23,
                colon: true
            })
        );
    }

    #[test]
    fn test_track_change_effect_uses_defaults() {
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();
        let plan = planner.plan_tick(&playing("1", 0.0, 100.0), epoch, &mut source);
        let effect = plan.effect.expect("effect");
        assert_eq!(effect.kind, EffectKind::FlashActive);
        assert_eq!(effect.repeat_count, 2);
        assert_eq!(effect.color, RGB8::new(0, 255, 0));
    }

    #[test]
    fn test_track_overlay_refires_on_resume_same_song() {
        // Entering Play always counts as a track change, even with an
        // unchanged song id. Pinned deliberately: resuming from pause on
        // the same track re-shows the track number.
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();

        let play = playing("1", 10.0, 200.0);
        planner.plan_tick(&play, epoch, &mut source);
        assert_eq!(source.song_calls, 1);

        let mut pause = play.clone();
        pause.state = PlaybackState::Pause;
        let t = epoch + Duration::from_secs(5);
        planner.plan_tick(&pause, t, &mut source);

        let t = epoch + Duration::from_secs(10);
        let plan = planner.plan_tick(&play, t, &mut source);
        assert_eq!(plan.display, Some(DisplayOp::TrackNumber(7)));
        assert_eq!(source.song_calls, 2);
    }

    #[test]
    fn test_show_number_disabled_skips_overlay() {
        let mut settings = settings();
        settings.show_track_number = false;
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings, epoch);
        let mut source = FakeSource::new();
        let plan = planner.plan_tick(&playing("1", 61.0, 200.0), epoch, &mut source);
        assert_eq!(source.song_calls, 0);
        assert_eq!(
            plan.display,
            Some(DisplayOp::Time {
                minutes: 1,
                seconds: 1,
                colon: true
            })
        );
    }

    #[test]
    fn test_remaining_mode() {
        let mut settings = settings();
        settings.mode = DisplayTimeMode::Remaining;
        settings.show_track_number = false;
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings, epoch);
        let mut source = FakeSource::new();
        let plan = planner.plan_tick(&playing("1", 30.0, 200.0), epoch, &mut source);
        // 170 seconds remaining
        assert_eq!(
            plan.display,
            Some(DisplayOp::Time {
                minutes: 2,
                seconds: 50,
                colon: true
            })
        );
    }

    #[test]
    fn test_missing_elapsed_renders_dashes() {
        let mut settings = settings();
        settings.show_track_number = false;
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings, epoch);
        let mut source = FakeSource::new();
        let mut status = playing("1", 0.0, 0.0);
        status.elapsed = None;
        status.duration = None;
        let plan = planner.plan_tick(&status, epoch, &mut source);
        assert_eq!(plan.display, Some(DisplayOp::Dashes));
    }

    #[test]
    fn test_remaining_without_duration_falls_back_to_elapsed() {
        let mut settings = settings();
        settings.mode = DisplayTimeMode::Remaining;
        settings.show_track_number = false;
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings, epoch);
        let mut source = FakeSource::new();
        let mut status = playing("1", 45.0, 0.0);
        status.duration = None;
        let plan = planner.plan_tick(&status, epoch, &mut source);
        assert_eq!(
            plan.display,
            Some(DisplayOp::Time {
                minutes: 0,
                seconds: 45,
                colon: true
            })
        );
    }

    #[test]
    fn test_pause_blink_phases() {
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();
        let mut status = playing("1", 83.0, 200.0);
        status.state = PlaybackState::Pause;

        // blink_interval 1s: [0,1) shows time, [1,2) blanks, [2,3) time
        let time_op = DisplayOp::Time {
            minutes: 1,
            seconds: 23,
            colon: true,
        };
        let plan = planner.plan_tick(&status, epoch + Duration::from_millis(300), &mut source);
        assert_eq!(plan.display, Some(time_op));
        let plan = planner.plan_tick(&status, epoch + Duration::from_millis(1300), &mut source);
        assert_eq!(plan.display, Some(DisplayOp::Blank));
        let plan = planner.plan_tick(&status, epoch + Duration::from_millis(2300), &mut source);
        assert_eq!(plan.display, Some(time_op));
    }

    #[test]
    fn test_stop_rotation_cycle() {
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();
        let status = stopped("5");

        // phase durations are {2,2,2}; sample just after each boundary
        let at = |secs_tenths: u64| epoch + Duration::from_millis(secs_tenths * 100);
        assert_eq!(
            planner.plan_tick(&status, at(0), &mut source).display,
            Some(DisplayOp::Dashes)
        );
        assert_eq!(
            planner.plan_tick(&status, at(19), &mut source).display,
            Some(DisplayOp::Dashes)
        );
        assert_eq!(
            planner.plan_tick(&status, at(21), &mut source).display,
            Some(DisplayOp::TrackTotal(12))
        );
        assert_eq!(
            planner.plan_tick(&status, at(42), &mut source).display,
            // 185s of playlist -> 03:05
            Some(DisplayOp::Time {
                minutes: 3,
                seconds: 5,
                colon: true
            })
        );
        // wraps back to the symbol phase
        assert_eq!(
            planner.plan_tick(&status, at(63), &mut source).display,
            Some(DisplayOp::Dashes)
        );
    }

    #[test]
    fn test_stop_rotation_resets_on_entry() {
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();

        let status = stopped("5");
        planner.plan_tick(&status, epoch, &mut source);
        // advance into the TrackTotal phase
        let t = epoch + Duration::from_millis(2100);
        assert_eq!(
            planner.plan_tick(&status, t, &mut source).display,
            Some(DisplayOp::TrackTotal(12))
        );

        // leave Stop, come back: the rotation starts over at Symbol
        let mut settings_off = playing("1", 1.0, 10.0);
        settings_off.volume = 0;
        let t = epoch + Duration::from_millis(2600);
        planner.plan_tick(&settings_off, t, &mut source);
        let t = epoch + Duration::from_millis(3100);
        assert_eq!(
            planner.plan_tick(&status, t, &mut source).display,
            Some(DisplayOp::Dashes)
        );
    }

    #[test]
    fn test_playlist_cache_reuse() {
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();

        let status = stopped("5");
        planner.plan_tick(&status, epoch, &mut source);
        planner.plan_tick(&status, epoch + Duration::from_millis(500), &mut source);
        planner.plan_tick(&status, epoch + Duration::from_millis(1000), &mut source);
        assert_eq!(source.playlist_calls, 1);

        // version token moved: exactly one refetch
        let status = stopped("6");
        planner.plan_tick(&status, epoch + Duration::from_millis(1500), &mut source);
        planner.plan_tick(&status, epoch + Duration::from_millis(2000), &mut source);
        assert_eq!(source.playlist_calls, 2);
    }

    #[test]
    fn test_playlist_fetch_failure_retries_next_tick() {
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();
        source.playlist = None;

        let status = stopped("5");
        planner.plan_tick(&status, epoch, &mut source);
        assert_eq!(source.playlist_calls, 1);
        // fetch failed, version not recorded: tries again
        source.playlist = Some(PlaylistSummary {
            total_tracks: 3,
            durations: vec![10.0],
        });
        planner.plan_tick(&status, epoch + Duration::from_millis(500), &mut source);
        assert_eq!(source.playlist_calls, 2);
        // now cached
        planner.plan_tick(&status, epoch + Duration::from_millis(1000), &mut source);
        assert_eq!(source.playlist_calls, 2);
    }

    #[test]
    fn test_non_numeric_track_shows_time_only() {
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings(), epoch);
        let mut source = FakeSource::new();
        source.song = Some(SongInfo {
            track: Some("A1".to_string()),
        });
        let plan = planner.plan_tick(&playing("1", 61.0, 200.0), epoch, &mut source);
        assert_eq!(plan.effect, None);
        assert_eq!(
            plan.display,
            Some(DisplayOp::Time {
                minutes: 1,
                seconds: 1,
                colon: true
            })
        );
    }

    #[test]
    fn test_startup_tick_shows_volume_overlay() {
        // last_volume starts unset, so the very first tick counts as a
        // volume change and the panel opens on the volume readout.
        let mut settings = settings();
        settings.volume_display_duration = Duration::from_secs(3);
        let epoch = Instant::now();
        let mut planner = RenderPlanner::new(settings, epoch);
        let mut source = FakeSource::new();
        let mut status = stopped("1");
        status.volume = 40;
        let plan = planner.plan_tick(&status, epoch, &mut source);
        assert_eq!(plan.display, Some(DisplayOp::Volume(40)));
    }

    #[test]
    fn test_led_flags_follow_status() {
        let mut status = PlayerStatus::default();
        status.repeat = true;
        status.consume = true;
        assert_eq!(
            led_flags(&status).levels(),
            [true, false, false, true]
        );
    }
}
