//! newnym - rotate the Tor exit identity on a timer
//!
//! Connects to the local Tor ControlPort, authenticates with the control
//! password, then sends `SIGNAL NEWNYM` on a fixed interval and reports the
//! public address seen before and after each rotation.
//!
//! # Usage
//!
//! ```bash
//! # Rotate every 60s using /etc/newnym/config.toml or ./newnym.toml
//! TOR_CONTROL_PASSWORD=secret newnym
//!
//! # One rotation, lookups made directly rather than through Tor
//! newnym --password secret --run-once --direct-lookup
//! ```

use anyhow::Result;
use std::io;
use std::process::ExitCode;
use tracing::{error, info};

use newnym::cli::{self, Cli};
use newnym::config;
use newnym::logging;
use newnym::lookup::HttpLookup;
use newnym::rotator::Rotator;
use newnym::tor::TorController;
use newnym::RotatorError;
use newnym::util::shutdown::{self, or_shutdown};
use newnym::util::time::format_duration;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::parse();
    logging::init(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &Cli) -> Result<()> {
    info!("newnym v{} starting", newnym::VERSION);

    let mut config = config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config::validate(&config)?;

    let lookup = HttpLookup::new(&config.lookup, &config.tor)?;

    let shutdown = shutdown::signal();
    tokio::pin!(shutdown);

    let startup = async {
        let mut tor = TorController::connect(&config.tor).await?;
        let version = tor.version().await?;
        Ok::<_, RotatorError>((tor, version))
    };

    let Some(started) = or_shutdown(startup, &mut shutdown).await else {
        println!("[+] Interrupt received during startup, exiting");
        return Ok(());
    };
    let (tor, version) = started?;
    println!(
        "[+] Authenticated to Tor {} at {}",
        version,
        config.tor.control_addr()
    );
    println!(
        "[+] Rotating every {} (lookup: {}{}). Press Ctrl+C to stop.",
        format_duration(config.rotation.interval_secs),
        lookup.url(),
        if config.lookup.via_tor { " via Tor" } else { "" }
    );

    let mut rotator = Rotator::new(tor, lookup, &config.rotation, io::stdout());

    let finished = or_shutdown(rotator.run(), &mut shutdown).await;

    rotator.close().await;

    match finished {
        Some(result) => {
            let cycles = result?;
            println!("[+] Completed {} rotation(s)", cycles);
        },
        None => {
            println!();
            println!(
                "[+] Interrupt received, stopping after {} rotation(s)",
                rotator.cycles()
            );
        },
    }
    Ok(())
}
