//! driftwm - a stacking window manager for X11 with a scrolling virtual
//! desktop
//!
//! Windows live in a virtual area several screens wide; pushing the
//! pointer against a screen edge scrolls the view. Everything a key or
//! button does is configured in TOML per window context.
//!
//! # Features
//! - Three stacking layers with transients kept above their owners
//! - Outline or opaque move and resize, keyboard driven too
//! - Shading, maximizing into the work-area and fullscreen
//! - Up to 16 desktops, windows may sit on several at once
//! - Double clicks and delayed bindings

use std::os::unix::process::CommandExt;
use std::process::Command;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;

#[cfg(feature = "x11")]
mod atoms;
#[cfg(feature = "x11")]
mod x11;

/// driftwm - a stacking window manager with a scrolling virtual desktop
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Run in debug mode with verbose logging
    #[arg(short, long)]
    debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Print default configuration to stdout
    #[arg(long)]
    print_default_config: bool,

    /// X display to manage instead of $DISPLAY
    #[arg(long)]
    display: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins unless --debug asks for everything
    let builder = FmtSubscriber::builder()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .compact();
    if args.debug {
        tracing::subscriber::set_global_default(builder.with_max_level(Level::DEBUG).finish())?;
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())?;
    }

    info!("driftwm v{} starting...", env!("CARGO_PKG_VERSION"));

    if args.print_default_config {
        println!("{}", config::default_config_string());
        return Ok(());
    }

    if args.validate {
        config::load(args.config.as_deref())?;
        info!("Configuration is valid");
        return Ok(());
    }

    let config = match config::load(args.config.as_deref()) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        },
        Err(e) => {
            warn!("Failed to load config: {:#}, using defaults", e);
            config::Config::default()
        },
    };

    let restart = run(config, args.display.as_deref())?;
    if restart {
        restart_self()?;
    }
    info!("driftwm exiting");
    Ok(())
}

/// Manage the display until asked to quit. Returns whether a restart
/// was requested.
#[cfg(feature = "x11")]
fn run(config: config::Config, display: Option<&str>) -> Result<bool> {
    use driftwm_core::{Core, Event};

    let mut backend = x11::X11Backend::connect(display)?;
    backend.announce(
        config.general.desktop_count,
        config.general.virtual_x,
        config.general.virtual_y,
    )?;
    let root = backend.root();
    let (width, height) = backend.screen_size();
    let existing = backend.existing_clients()?;

    let mut core = Core::new(config, backend)?;
    core.add_screen(root, width, height);

    debug!("Adopting {} existing windows", existing.len());
    for client in existing {
        core.dispatch(Event::MapRequest {
            parent: root,
            window: client,
        });
    }

    core.run();
    if core.is_disconnected() {
        error!("Lost the connection to the X server");
    }
    Ok(core.restart_requested)
}

#[cfg(not(feature = "x11"))]
fn run(_config: config::Config, _display: Option<&str>) -> Result<bool> {
    anyhow::bail!("X11 feature not compiled in. Rebuild with --features x11");
}

/// Replace this process with a fresh copy of itself.
fn restart_self() -> Result<()> {
    let exe = std::env::current_exe()?;
    info!("Restarting {:?}", exe);
    let err = Command::new(&exe).args(std::env::args_os().skip(1)).exec();
    Err(anyhow::Error::new(err).context(format!("Failed to restart {:?}", exe)))
}
