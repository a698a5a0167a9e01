/*
 *  main.rs
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

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use env_logger::Env;
use log::{error, info};
use tokio::signal::unix::{signal, SignalKind};

mod button;
mod config;
mod display;
mod led;
mod mpd;
mod pacer;
mod service;
mod shutdown;

use config::Config;
use service::PlayerService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sig {
    Int,
    Term,
    Hup,
}

/// Wait for SIGINT, SIGTERM or SIGHUP. SIGINT is the appliance's
/// power-button path, so the caller needs to know which one fired.
async fn signal_handler() -> Result<Sig, std::io::Error> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
            Ok(Sig::Int)
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
            Ok(Sig::Term)
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
            Ok(Sig::Hup)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about("MPD status on a TM1652 segment display and WS2812 status LEDs")
        .arg(
            Arg::new("debug")
                .short('v')
                .long("debug")
                .alias("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .default_value("config/settings.yaml")
                .help("Path to the settings file"),
        )
        .arg(
            Arg::new("no-wait-mpd")
                .long("no-wait-mpd")
                .action(ArgAction::SetTrue)
                .help("Start without waiting for MPD to come up"),
        )
        .get_matches();

    let debug_enabled = matches.get_flag("debug");
    env_logger::Builder::from_env(
        Env::default().default_filter_or(if debug_enabled { "debug" } else { "info" }),
    )
    .format_timestamp_secs()
    .init();

    info!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config_path = PathBuf::from(
        matches
            .get_one::<String>("config")
            .map(String::as_str)
            .unwrap_or("config/settings.yaml"),
    );
    let config = Config::load_or_default(&config_path);

    let mut service = PlayerService::new(config, config_path, matches.get_flag("no-wait-mpd"))
        .context("hardware initialization failed")?;

    let received = tokio::select! {
        sig = signal_handler() => {
            match sig {
                Ok(sig) => Some(sig),
                Err(e) => {
                    error!("signal handler failed: {e}");
                    None
                }
            }
        }
        _ = service.run() => None,
    };

    // Orderly teardown: silence the player, give it a moment, then release
    // the hardware newest-first.
    service.stop_playback();
    tokio::time::sleep(Duration::from_secs(1)).await;
    service.cleanup();
    tokio::time::sleep(Duration::from_millis(500)).await;

    if received == Some(Sig::Int) {
        info!("powering off");
        if let Err(e) = std::process::Command::new("poweroff").status() {
            error!("poweroff failed: {e}");
        }
    }

    Ok(())
}
