/*
 *  pacer.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
 *
 *  Drift-free tick scheduling. Deadlines advance by the interval from the
 *  previous deadline, not from "now", so per-tick processing time does not
 *  accumulate into clock skew.
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

use std::time::{Duration, Instant};

pub struct Pacer {
    next_target: Instant,
}

impl Pacer {
    pub fn new(start: Instant) -> Self {
        Self { next_target: start }
    }

    /// Compute the next wake deadline. If processing overran the previous
    /// deadline entirely, the schedule resets to `now` instead of burning
    /// CPU on a burst of catch-up ticks.
    pub fn advance(&mut self, now: Instant, interval: Duration) -> Instant {
        self.next_target += interval;
        if self.next_target < now {
            self.next_target = now;
        }
        self.next_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlines_do_not_drift() {
        let start = Instant::now();
        let interval = Duration::from_millis(500);
        let mut pacer = Pacer::new(start);
        let mut now = start;
        for tick in 1..=100u32 {
            // Simulate a tick that takes a while but finishes before the
            // deadline; the deadline must stay on the original grid.
            now += Duration::from_millis(3);
            let deadline = pacer.advance(now, interval);
            assert_eq!(deadline, start + interval * tick);
            now = deadline;
        }
    }

    #[test]
    fn test_overrun_resets_to_now() {
        let start = Instant::now();
        let interval = Duration::from_millis(500);
        let mut pacer = Pacer::new(start);
        // Processing blew past the deadline by two full intervals.
        let late = start + Duration::from_millis(1700);
        assert_eq!(pacer.advance(late, interval), late);
        // Schedule resumes from the reset point.
        assert_eq!(
            pacer.advance(late, interval),
            late + interval
        );
    }

    #[test]
    fn test_interval_can_change_between_ticks() {
        let start = Instant::now();
        let mut pacer = Pacer::new(start);
        let d1 = pacer.advance(start, Duration::from_millis(500));
        assert_eq!(d1, start + Duration::from_millis(500));
        let d2 = pacer.advance(d1, Duration::from_millis(100));
        assert_eq!(d2, start + Duration::from_millis(600));
    }
}
