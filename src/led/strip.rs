/*
 *  led/strip.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  WS2812 strip access. The wire format is clocked out over SPI: each data
 *  bit becomes three SPI bits (1 -> 110, 0 -> 100) at 2.4 MHz, which lands
 *  inside the controller's pulse-width tolerances.
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

use log::debug;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use smart_leds::RGB8;
use thiserror::Error;

const SPI_CLOCK_HZ: u32 = 2_400_000;
/// Zero bytes appended after the frame; >60 us low latches the strip.
const LATCH_BYTES: usize = 18;

#[derive(Debug, Error)]
pub enum LedError {
    #[error("led strip open failed: {0}")]
    Open(String),
    #[error("led strip write failed: {0}")]
    Write(String),
}

/// Channel ordering expected by the strip hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOrder {
    Rgb,
    Grb,
    Bgr,
    Brg,
    Gbr,
    Rbg,
}

impl ColorOrder {
    /// Parses the config string; unknown values fall back to GRB, the
    /// most common WS2812 wiring.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "RGB" => Self::Rgb,
            "BGR" => Self::Bgr,
            "BRG" => Self::Brg,
            "GBR" => Self::Gbr,
            "RBG" => Self::Rbg,
            _ => Self::Grb,
        }
    }

    pub fn wire_bytes(self, color: RGB8) -> [u8; 3] {
        let RGB8 { r, g, b } = color;
        match self {
            Self::Rgb => [r, g, b],
            Self::Grb => [g, r, b],
            Self::Bgr => [b, g, r],
            Self::Brg => [b, r, g],
            Self::Gbr => [g, b, r],
            Self::Rbg => [r, b, g],
        }
    }
}

/// A strip of individually addressable LEDs. Trait seam so the renderer
/// and its tests do not need hardware.
pub trait LedStrip: Send {
    fn len(&self) -> usize;
    fn set(&mut self, index: usize, color: RGB8);
    /// Push the staged pixel values to hardware in one batched update.
    fn show(&mut self) -> Result<(), LedError>;
}

/// Expand one wire byte into its 24-bit SPI representation.
fn encode_byte(byte: u8, out: &mut Vec<u8>) {
    let mut acc: u32 = 0;
    for bit in (0..8).rev() {
        let pattern = if (byte >> bit) & 1 == 1 { 0b110 } else { 0b100 };
        acc = (acc << 3) | pattern;
    }
    out.push((acc >> 16) as u8);
    out.push((acc >> 8) as u8);
    out.push(acc as u8);
}

pub(crate) fn encode_frame(pixels: &[RGB8], order: ColorOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 9 + LATCH_BYTES);
    for pixel in pixels {
        for byte in order.wire_bytes(*pixel) {
            encode_byte(byte, &mut out);
        }
    }
    out.resize(out.len() + LATCH_BYTES, 0);
    out
}

/// WS2812 strip on the SPI MOSI line (GPIO10 on a Raspberry Pi).
pub struct Ws2812Strip {
    spi: Spi,
    order: ColorOrder,
    pixels: Vec<RGB8>,
}

impl Ws2812Strip {
    pub fn new(count: usize, order: ColorOrder) -> Result<Self, LedError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)
            .map_err(|e| LedError::Open(e.to_string()))?;
        debug!("WS2812 strip opened: {count} pixels, {order:?} order");
        Ok(Self {
            spi,
            order,
            pixels: vec![RGB8::default(); count],
        })
    }
}

impl LedStrip for Ws2812Strip {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set(&mut self, index: usize, color: RGB8) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn show(&mut self) -> Result<(), LedError> {
        let frame = encode_frame(&self.pixels, self.order);
        self.spi
            .write(&frame)
            .map_err(|e| LedError::Write(e.to_string()))?;
        Ok(())
    }
}
