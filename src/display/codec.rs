/*
 *  display/codec.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  TM1652 command encoding. Pure, no I/O.
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

/// Opcode: write the four segment data bytes.
pub const CMD_WRITE_DATA: u8 = 0x08;
/// Opcode: set display brightness.
pub const CMD_SET_BRIGHTNESS: u8 = 0x18;
/// Base nibble OR'd with the reversed brightness bits.
pub const CMD_BRIGHTNESS_BASE: u8 = 0x10;
/// The colon is wired into bit 7 of the second digit.
pub const COLON_BIT: u8 = 0x80;

pub const SEG_DASH: u8 = 0x40;
pub const SEG_BLANK: u8 = 0x00;

const DIGIT_SEGMENTS: [u8; 10] = [
    0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F,
];

/// Segment pattern for a display character. Only digits, `-` and space are
/// representable; anything else is a caller bug and is rejected.
pub fn segment(ch: char) -> Option<u8> {
    match ch {
        '0'..='9' => Some(DIGIT_SEGMENTS[(ch as u8 - b'0') as usize]),
        '-' => Some(SEG_DASH),
        ' ' => Some(SEG_BLANK),
        _ => None,
    }
}

fn digit(value: u32) -> u8 {
    DIGIT_SEGMENTS[(value % 10) as usize]
}

/// Reverse the low 4 bits of `n`. The TM1652 brightness register takes its
/// value LSB-first, so the level bits must be mirrored before sending.
pub fn reverse_nibble(n: u8) -> u8 {
    let n = n & 0x0F;
    ((n & 0x01) << 3) | ((n & 0x02) << 1) | ((n & 0x04) >> 1) | ((n & 0x08) >> 3)
}

/// Brightness command for a level in [1,8]; out-of-range levels are clamped.
pub fn encode_brightness(level: u8) -> [u8; 2] {
    let level = level.clamp(1, 8);
    [
        CMD_SET_BRIGHTNESS,
        CMD_BRIGHTNESS_BASE | (reverse_nibble(level - 1) & 0x0F),
    ]
}

/// Segment-data command for the four digits, left to right. The colon bit
/// lands in the second digit only; that matches the physical wiring.
pub fn encode_digits(segments: [u8; 4], colon: bool) -> [u8; 5] {
    let mut frame = [
        CMD_WRITE_DATA,
        segments[0],
        segments[1],
        segments[2],
        segments[3],
    ];
    if colon {
        frame[2] |= COLON_BIT;
    }
    frame
}

/// Integer in [-999, 9999], clamped. Negative values spend the thousands
/// digit on a leading dash.
pub fn number_segments(value: i32) -> [u8; 4] {
    let value = value.clamp(-999, 9999);
    let magnitude = value.unsigned_abs();
    let mut segments = [
        digit(magnitude / 1000),
        digit(magnitude / 100),
        digit(magnitude / 10),
        digit(magnitude),
    ];
    if value < 0 {
        segments[0] = SEG_DASH;
    }
    segments
}

/// `MM:SS`, zero padded, minutes clamped to [0,99] and seconds to [0,59].
pub fn time_segments(minutes: i64, seconds: i64) -> [u8; 4] {
    let minutes = minutes.clamp(0, 99) as u32;
    let seconds = seconds.clamp(0, 59) as u32;
    [
        digit(minutes / 10),
        digit(minutes),
        digit(seconds / 10),
        digit(seconds),
    ]
}

/// Track number as `-NN-`, clamped to [1,99].
pub fn track_number_segments(number: i64) -> [u8; 4] {
    let number = number.clamp(1, 99) as u32;
    [SEG_DASH, digit(number / 10), digit(number), SEG_DASH]
}

/// Playlist length as `NN--`, clamped to [0,99].
pub fn track_total_segments(count: i64) -> [u8; 4] {
    let count = count.clamp(0, 99) as u32;
    [digit(count / 10), digit(count), SEG_DASH, SEG_DASH]
}

/// Volume as `--NN`, clamped to [0,100]. Full volume does not fit that
/// pattern, so exactly 100 renders as `-100`.
pub fn volume_segments(volume: i64) -> [u8; 4] {
    let volume = volume.clamp(0, 100) as u32;
    if volume == 100 {
        [SEG_DASH, digit(1), digit(0), digit(0)]
    } else {
        [SEG_DASH, SEG_DASH, digit(volume / 10), digit(volume)]
    }
}

pub fn dash_segments() -> [u8; 4] {
    [SEG_DASH; 4]
}

pub fn blank_segments() -> [u8; 4] {
    [SEG_BLANK; 4]
}
