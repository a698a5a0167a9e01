/*
 *  display/driver.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  Semantic operations over the TM1652 codec and serial transport.
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
use std::time::Duration;

use log::debug;

use super::codec;
use super::transport::Transport;

pub struct Tm1652 {
    link: Transport,
    brightness: u8,
}

impl Tm1652 {
    pub fn new(mut link: Transport, brightness: u8) -> Self {
        link.connect();
        let brightness = brightness.clamp(1, 8);
        let mut display = Self { link, brightness };
        display.send_brightness(brightness);
        debug!("TM1652 initialized at brightness {brightness}");
        display
    }

    fn send_brightness(&mut self, level: u8) {
        self.link.write(&codec::encode_brightness(level));
    }

    fn write_segments(&mut self, segments: [u8; 4], colon: bool) {
        self.link.write(&codec::encode_digits(segments, colon));
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Re-sends brightness only when the clamped level actually changed, so
    /// repeated config reloads with an unchanged value touch no hardware.
    pub fn set_brightness(&mut self, level: u8) {
        let level = level.clamp(1, 8);
        if level != self.brightness {
            self.brightness = level;
            self.send_brightness(level);
        }
    }

    pub fn show_number(&mut self, value: i32, colon: bool) {
        self.write_segments(codec::number_segments(value), colon);
    }

    pub fn show_time(&mut self, minutes: i64, seconds: i64, colon: bool) {
        self.write_segments(codec::time_segments(minutes, seconds), colon);
    }

    pub fn show_track_number(&mut self, number: i64) {
        self.write_segments(codec::track_number_segments(number), false);
    }

    pub fn show_track_total(&mut self, count: i64) {
        self.write_segments(codec::track_total_segments(count), false);
    }

    pub fn show_volume(&mut self, volume: i64) {
        self.write_segments(codec::volume_segments(volume), false);
    }

    pub fn show_dashes(&mut self) {
        self.write_segments(codec::dash_segments(), false);
    }

    pub fn clear(&mut self) {
        self.write_segments(codec::blank_segments(), false);
    }

    /// Shutdown path: drop to minimum brightness and clear repeatedly so the
    /// panel goes dark even if a frame was mid-flight.
    pub fn force_off(&mut self) {
        if !self.link.is_open() {
            return;
        }
        self.send_brightness(1);
        thread::sleep(Duration::from_millis(100));
        for _ in 0..3 {
            self.clear();
            thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn close(&mut self) {
        self.force_off();
        thread::sleep(Duration::from_millis(200));
        self.link.close();
    }
}

impl crate::shutdown::Shutdown for Tm1652 {
    fn name(&self) -> &'static str {
        "TM1652 display"
    }

    fn shutdown(&mut self) {
        self.close();
    }
}
