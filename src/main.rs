// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
mod bridge;
mod config;
mod gpio;
mod router;
mod seq;

use std::error::Error;
use std::process;
use std::sync::{atomic::AtomicBool, Arc};

use clap::{crate_version, Parser};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bridge::Bridge;
use crate::config::Config;
use crate::router::{NoteMap, Router};
use crate::seq::Sequencer;

#[derive(Parser, Debug)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI to GPIO bridge."
)]
struct Cli {
    /// The MIDI source to subscribe to, as a client name or number with an
    /// optional port. For example, rtpmidi:0 or 128:0.
    #[clap(short, long, default_value = config::DEFAULT_PORTSPEC)]
    portspec: String,

    /// The GPIO character device to drive, as a name under /dev or an
    /// absolute path.
    #[clap(short, long, default_value = config::DEFAULT_CHIP)]
    chip: String,

    /// The note to line mappings. Should be in the form <NOTE>=<LINE>,...
    /// For example, 60=25,62=26,64=27.
    #[clap(short, long, default_value = config::DEFAULT_MAPPINGS)]
    map: String,

    /// Log MIDI and GPIO activity while bridging.
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            e.print()?;
            process::exit(code);
        }
    };

    init_logging(cli.verbose);

    let config = Config::new(&cli.portspec, &cli.chip, &cli.map)?;

    let seq = Sequencer::open()?;
    seq.subscribe_announcements()?;

    let router = Router::new(NoteMap::new(config.mappings()), config.portspec());
    let addr = seq.addr();
    info!(
        client = addr.client,
        port = addr.port,
        portspec = config.portspec(),
        chip = config.chip(),
        map = router.map().to_string(),
        "Starting MIDI to GPIO bridge."
    );

    // The source may not exist yet. Discovery events will retry this.
    router.attach(&seq);

    let lines: Vec<u32> = config
        .mappings()
        .iter()
        .map(|mapping| mapping.line())
        .collect();
    let bank = gpio::open(config.chip(), &lines)?;

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;

    Bridge::new(seq, bank, router, stop).run();

    Ok(())
}

/// Initializes the log subscriber. RUST_LOG overrides the verbose flag.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use clap::error::ErrorKind;
    use clap::Parser;

    use super::Cli;

    #[test]
    fn defaults() -> Result<(), Box<dyn Error>> {
        let cli = Cli::try_parse_from(["mgpio"])?;

        assert_eq!(cli.portspec, "rtpmidi:0");
        assert_eq!(cli.chip, "gpiochip0");
        assert_eq!(cli.map, "60=25,62=26,64=27");
        assert!(!cli.verbose);
        Ok(())
    }

    #[test]
    fn flags_override_defaults() -> Result<(), Box<dyn Error>> {
        let cli = Cli::try_parse_from([
            "mgpio", "-p", "128:0", "--chip", "gpiochip1", "-m", "36=5", "-v",
        ])?;

        assert_eq!(cli.portspec, "128:0");
        assert_eq!(cli.chip, "gpiochip1");
        assert_eq!(cli.map, "36=5");
        assert!(cli.verbose);
        Ok(())
    }

    #[test]
    fn positional_arguments_are_rejected() {
        let e = Cli::try_parse_from(["mgpio", "extra"]).expect_err("expected a usage error");

        assert!(!matches!(
            e.kind(),
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
        ));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let e = Cli::try_parse_from(["mgpio", "--bogus"]).expect_err("expected a usage error");

        assert!(!matches!(
            e.kind(),
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
        ));
    }

    #[test]
    fn help_is_not_a_usage_error() {
        let e =
            Cli::try_parse_from(["mgpio", "--help"]).expect_err("expected help to short circuit");

        assert_eq!(e.kind(), ErrorKind::DisplayHelp);
    }
}
