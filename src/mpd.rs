/*
 *  mpd.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  Minimal MPD line-protocol client. Only the handful of commands the
 *  renderer needs: status, currentsong, playlistinfo, stop.
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

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Minimum spacing between reconnect attempts while MPD is down.
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MpdError {
    #[error("cannot connect to MPD at {0}: {1}")]
    Connect(String, String),
    #[error("MPD connection lost: {0}")]
    Io(#[from] std::io::Error),
    #[error("MPD protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    Play,
    Pause,
    #[default]
    Stop,
}

impl PlaybackState {
    /// Anything MPD reports that we do not recognize is treated as stopped.
    fn parse(value: &str) -> Self {
        match value {
            "play" => Self::Play,
            "pause" => Self::Pause,
            _ => Self::Stop,
        }
    }
}

/// One `status` response, with absent fields mapped to their idle defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub elapsed: Option<f64>,
    pub duration: Option<f64>,
    pub volume: i64,
    pub song_id: String,
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
    pub consume: bool,
    pub playlist_version: String,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            state: PlaybackState::Stop,
            elapsed: None,
            duration: None,
            volume: 0,
            song_id: "0".to_string(),
            repeat: false,
            random: false,
            single: false,
            consume: false,
            playlist_version: "0".to_string(),
        }
    }
}

impl PlayerStatus {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut status = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "state" => status.state = PlaybackState::parse(value),
                "elapsed" => status.elapsed = value.parse().ok(),
                "duration" => status.duration = value.parse().ok(),
                "volume" => status.volume = value.parse().unwrap_or(0),
                "songid" => status.song_id = value.clone(),
                "repeat" => status.repeat = value == "1",
                "random" => status.random = value == "1",
                "single" => status.single = value == "1",
                "consume" => status.consume = value == "1",
                "playlist" => status.playlist_version = value.clone(),
                _ => {}
            }
        }
        status
    }
}

#[derive(Debug, Clone, Default)]
pub struct SongInfo {
    /// Raw `Track` tag; may be "7" or "7/12", parsed by the caller.
    pub track: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistSummary {
    pub total_tracks: i64,
    pub durations: Vec<f64>,
}

impl PlaylistSummary {
    pub fn total_duration(&self) -> f64 {
        self.durations.iter().sum()
    }
}

/// What the render loop needs from the player. Trait seam so planner tests
/// run against a scripted source instead of a live daemon.
pub trait PlayerSource {
    fn status(&mut self) -> Option<PlayerStatus>;
    fn current_song(&mut self) -> Option<SongInfo>;
    fn playlist_info(&mut self) -> Option<PlaylistSummary>;
}

pub struct MpdClient {
    host: String,
    port: u16,
    stream: Option<BufReader<TcpStream>>,
    last_try: Option<Instant>,
}

impl MpdClient {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            stream: None,
            last_try: None,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn open(&mut self) -> Result<(), MpdError> {
        let endpoint = self.endpoint();
        let addr: SocketAddr = endpoint
            .to_socket_addrs()
            .map_err(|e| MpdError::Connect(endpoint.clone(), e.to_string()))?
            .next()
            .ok_or_else(|| MpdError::Connect(endpoint.clone(), "no address".into()))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| MpdError::Connect(endpoint.clone(), e.to_string()))?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        let mut reader = BufReader::new(stream);
        let mut greeting = String::new();
        reader.read_line(&mut greeting)?;
        if !greeting.starts_with("OK MPD") {
            return Err(MpdError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }
        info!("connected to MPD at {endpoint} ({})", greeting.trim_end());
        self.stream = Some(reader);
        Ok(())
    }

    /// Reconnect if needed, rate limited so a dead daemon does not turn the
    /// tick loop into a connect storm.
    fn ensure_connected(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        if let Some(last) = self.last_try {
            if last.elapsed() < RETRY_INTERVAL {
                return false;
            }
        }
        self.last_try = Some(Instant::now());
        match self.open() {
            Ok(()) => true,
            Err(e) => {
                warn!("{e}");
                false
            }
        }
    }

    /// Send one command and collect the key/value pairs up to `OK`.
    fn command(&mut self, cmd: &str) -> Result<Vec<(String, String)>, MpdError> {
        let reader = self
            .stream
            .as_mut()
            .ok_or_else(|| MpdError::Protocol("not connected".into()))?;
        reader.get_mut().write_all(format!("{cmd}\n").as_bytes())?;
        let mut pairs = Vec::new();
        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                return Err(MpdError::Protocol("connection closed".into()));
            }
            let line = line.trim_end();
            if line == "OK" {
                return Ok(pairs);
            }
            if line.starts_with("ACK") {
                return Err(MpdError::Protocol(line.to_string()));
            }
            if let Some((key, value)) = line.split_once(": ") {
                pairs.push((key.to_string(), value.to_string()));
            }
        }
    }

    /// Run a command against the current connection, dropping the stream on
    /// failure so the next tick reconnects.
    fn query(&mut self, cmd: &str) -> Option<Vec<(String, String)>> {
        if !self.ensure_connected() {
            return None;
        }
        match self.command(cmd) {
            Ok(pairs) => Some(pairs),
            Err(e) => {
                warn!("MPD command {cmd:?} failed: {e}");
                self.stream = None;
                None
            }
        }
    }

    /// Block until MPD answers `status`, or give up after ~60 seconds.
    pub fn wait_for_ready(&mut self) -> bool {
        for attempt in 1..=30 {
            self.last_try = None;
            if self.query("status").is_some() {
                return true;
            }
            debug!("waiting for MPD (attempt {attempt}/30)");
            thread::sleep(Duration::from_secs(2));
        }
        false
    }

    pub fn stop(&mut self) {
        let _ = self.query("stop");
    }

    pub fn close(&mut self) {
        self.stream = None;
    }
}

impl PlayerSource for MpdClient {
    fn status(&mut self) -> Option<PlayerStatus> {
        self.query("status")
            .map(|pairs| PlayerStatus::from_pairs(&pairs))
    }

    fn current_song(&mut self) -> Option<SongInfo> {
        self.query("currentsong").map(|pairs| {
            let track = pairs
                .iter()
                .find(|(key, _)| key == "Track")
                .map(|(_, value)| value.clone());
            SongInfo { track }
        })
    }

    fn playlist_info(&mut self) -> Option<PlaylistSummary> {
        let status = self.query("status")?;
        let total_tracks = status
            .iter()
            .find(|(key, _)| key == "playlistlength")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(0);
        let info = self.query("playlistinfo")?;
        let durations = info
            .iter()
            .filter(|(key, _)| key == "duration")
            .filter_map(|(_, value)| value.parse().ok())
            .collect();
        Some(PlaylistSummary {
            total_tracks,
            durations,
        })
    }
}

impl crate::shutdown::Shutdown for MpdClient {
    fn name(&self) -> &'static str {
        "MPD connection"
    }

    fn shutdown(&mut self) {
        self.close();
    }
}
