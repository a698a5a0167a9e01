/*
 *  shutdown.rs
 *
 *  mpdash - MPD on the front panel
 *  (c) 2024-26 mpdash authors
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

use log::info;

/// A hardware resource that must be released on the way out. Shutdown is
/// best-effort: implementations log their own failures and never panic.
pub trait Shutdown {
    fn name(&self) -> &'static str;
    fn shutdown(&mut self);
}

/// Run every shutdown hook in the order given.
pub fn run_all(hooks: &mut [&mut dyn Shutdown]) {
    for hook in hooks.iter_mut() {
        info!("shutting down {}", hook.name());
        hook.shutdown();
    }
}
