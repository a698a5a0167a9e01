/*
 *  display/transport.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  Serial link to the TM1652 with bounded reconnect/retry. Display
 *  commands are fire-and-forget: a write either reaches the wire or is
 *  dropped after three attempts, it never fails the caller.
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

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use rppal::uart::{Parity, Uart};
use thiserror::Error;

pub const MAX_ATTEMPTS: u32 = 3;
/// Minimum spacing between consecutive connection attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);
/// Inter-command spacing required by the controller.
pub const SETTLE_DELAY: Duration = Duration::from_millis(2);
/// Pause between a failed write and the next attempt.
const REWRITE_PAUSE: Duration = Duration::from_millis(50);
/// Let the port settle after opening before the first command.
const OPEN_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial open failed: {0}")]
    Open(String),
    #[error("serial write failed: {0}")]
    Write(String),
}

/// The raw serial port. A trait so tests can stand in a scripted port.
pub trait SerialIo: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;
    /// Block until everything written has left the transmitter.
    fn drain(&mut self) -> Result<(), TransportError>;
}

pub type SerialOpener = Box<dyn FnMut() -> Result<Box<dyn SerialIo>, TransportError> + Send>;

pub struct Transport {
    opener: SerialOpener,
    port: Option<Box<dyn SerialIo>>,
    retry_count: u32,
    last_retry_at: Option<Instant>,
}

impl Transport {
    pub fn new(opener: SerialOpener) -> Self {
        Self {
            opener,
            port: None,
            retry_count: 0,
            last_retry_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Open (or reopen) the link. Connection attempts are spaced at least
    /// `RETRY_DELAY` apart; failure is recorded and reported, not raised.
    pub fn connect(&mut self) -> bool {
        self.port = None;
        if let Some(last) = self.last_retry_at {
            let since = last.elapsed();
            if since < RETRY_DELAY {
                thread::sleep(RETRY_DELAY - since);
            }
        }
        match (self.opener)() {
            Ok(mut port) => {
                let _ = port.drain();
                thread::sleep(OPEN_SETTLE);
                self.port = Some(port);
                self.retry_count = 0;
                debug!("serial link connected");
                true
            }
            Err(e) => {
                self.retry_count += 1;
                self.last_retry_at = Some(Instant::now());
                error!(
                    "failed to open serial link (attempt {}): {}",
                    self.retry_count, e
                );
                if self.retry_count >= MAX_ATTEMPTS {
                    error!("max connection retries reached; display may stay dark");
                }
                false
            }
        }
    }

    /// Write one command frame. Up to `MAX_ATTEMPTS` tries, reconnecting
    /// between them; the frame is silently dropped after the last failure.
    pub fn write(&mut self, data: &[u8]) {
        for attempt in 1..=MAX_ATTEMPTS {
            if self.port.is_none() && !self.connect() {
                return;
            }
            let result = match self.port.as_mut() {
                Some(port) => port.write_all(data).and_then(|()| port.drain()),
                None => return,
            };
            match result {
                Ok(()) => {
                    thread::sleep(SETTLE_DELAY);
                    return;
                }
                Err(e) => {
                    warn!("serial write failed (attempt {attempt}): {e}");
                    self.port = None;
                    if attempt < MAX_ATTEMPTS {
                        self.connect();
                        thread::sleep(REWRITE_PAUSE);
                    } else {
                        warn!("dropping display command after {MAX_ATTEMPTS} attempts");
                    }
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.port = None;
    }
}

struct UartIo(Uart);

impl SerialIo for UartIo {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut sent = 0;
        while sent < data.len() {
            sent += self
                .0
                .write(&data[sent..])
                .map_err(|e| TransportError::Write(e.to_string()))?;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), TransportError> {
        self.0
            .drain()
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

/// Opener for the real display port: 8 data bits, odd parity, 1 stop bit,
/// per the TM1652 datasheet.
pub fn uart_opener(path: String, baud_rate: u32) -> SerialOpener {
    Box::new(move || {
        let uart = Uart::with_path(&path, baud_rate, Parity::Odd, 8, 1)
            .map_err(|e| TransportError::Open(format!("{path}: {e}")))?;
        Ok(Box::new(UartIo(uart)) as Box<dyn SerialIo>)
    })
}


#[cfg(test)]
mod tests {
    use super::testutil::Recorder;
    use super::*;

    #[test]
    fn test_write_happy_path_opens_once() {
        let recorder = Recorder::new();
        let mut link = Transport::new(recorder.opener());
        link.write(&[0x18, 0x10]);
        link.write(&[0x08, 0, 0, 0, 0]);
        assert_eq!(recorder.open_count(), 1);
        assert_eq!(
            recorder.written(),
            vec![vec![0x18, 0x10], vec![0x08, 0, 0, 0, 0]]
        );
    }

    #[test]
    fn test_write_recovers_within_retry_budget() {
        let recorder = Recorder::new();
        *recorder.fail_writes.lock().expect("lock") = 2;
        let mut link = Transport::new(recorder.opener());
        link.write(&[0x08, 1, 2, 3, 4]);
        // Two failures then success on the third attempt.
        assert_eq!(recorder.written(), vec![vec![0x08, 1, 2, 3, 4]]);
        assert!(recorder.open_count() >= 3); // reopened after each failure
    }

    #[test]
    fn test_write_dropped_after_final_failure() {
        let recorder = Recorder::new();
        *recorder.fail_writes.lock().expect("lock") = 10;
        let mut link = Transport::new(recorder.opener());
        link.write(&[0x08, 1, 2, 3, 4]);
        // Never propagates and never lands.
        assert!(recorder.written().is_empty());
        // A later call starts a fresh attempt budget.
        *recorder.fail_writes.lock().expect("lock") = 0;
        link.write(&[0x18, 0x10]);
        assert_eq!(recorder.written(), vec![vec![0x18, 0x10]]);
    }

    #[test]
    fn test_failed_connect_reports_false_and_recovers_later() {
        let recorder = Recorder::new();
        *recorder.fail_opens.lock().expect("lock") = 1;
        let mut link = Transport::new(recorder.opener());
        assert!(!link.connect());
        assert!(!link.is_open());
        // Next call reconnects (after the retry-delay gate) and succeeds.
        link.write(&[0x08, 0, 0, 0, 0]);
        assert_eq!(recorder.written(), vec![vec![0x08, 0, 0, 0, 0]]);
    }
}
