use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use vamp_cli::audio::clock::{Clock, SystemClock};
use vamp_cli::audio::device::RodioBackend;
use vamp_cli::audio::offline::OfflineBackend;
use vamp_cli::audio::AudioBackend;
use vamp_cli::config::{self, EngineConfig};
use vamp_cli::console;
use vamp_cli::engine::Engine;
use vamp_cli::storage::{setlist, watch};
use vamp_cli::{repl, tui};

fn cli() -> Command {
    Command::new("vamp")
        .about("Live backing-track player with bar-addressed sections and vamp loops")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("open")
                .short('o')
                .long("open")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Open a setlist on start and reload it when it changes"),
        )
        .arg(
            Arg::new("slots")
                .long("slots")
                .value_name("N")
                .value_parser(|raw: &str| config::parse_slots(raw).map_err(|e| e.expected))
                .help("Slots on a fresh board [env: VAMP_SLOTS]"),
        )
        .arg(
            Arg::new("tick-ms")
                .long("tick-ms")
                .value_name("MS")
                .value_parser(|raw: &str| config::parse_tick_ms(raw).map_err(|e| e.expected))
                .help("Scheduler tick in milliseconds [env: VAMP_TICK_MS]"),
        )
        .arg(
            Arg::new("no-exclusive")
                .long("no-exclusive")
                .action(ArgAction::SetTrue)
                .help("Let several slots play at once [env: VAMP_EXCLUSIVE=false]"),
        )
        .arg(
            Arg::new("stage")
                .long("stage")
                .action(ArgAction::SetTrue)
                .help("Full-screen slot board instead of the command prompt"),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .action(ArgAction::SetTrue)
                .help("Rehearse without an audio device (silent tracks)"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .conflicts_with_all(["open", "stage"])
                .help("Validate a setlist and exit"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Reduce startup banner and info output"),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let quiet = matches.get_flag("quiet");
    console::set_quiet(quiet);

    if let Some(path) = matches.get_one::<PathBuf>("check") {
        process::exit(run_check(path));
    }

    let config = engine_config(&matches)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let backend = open_backend(matches.get_flag("offline"), clock.clone());
    let mut engine = Engine::new(config, backend, clock);

    let open_path = matches.get_one::<PathBuf>("open").cloned();
    if let Some(path) = &open_path {
        let loaded = setlist::open(path).and_then(|s| engine.load_setlist(s).map_err(anyhow::Error::from));
        if let Err(e) = loaded {
            eprintln!("Failed to open {}: {:#}\nStarting with empty slots.", path.display(), e);
        }
        engine.drain_events();
    }

    if !quiet {
        let cfg = engine.config();
        println!(
            "VAMP: {} slots, tick {} ms, {} (type :help)",
            engine.slot_ids().len(),
            cfg.tick_interval.as_millis(),
            if cfg.exclusive_playback { "one slot at a time" } else { "slots mix" }
        );
    }

    let reloads = open_path.map(|path| {
        if !quiet {
            println!("watching: {}", path.display());
        }
        watch::spawn(path)
    });

    if matches.get_flag("stage") {
        tui::run(engine, reloads)
    } else {
        repl::run_repl(Arc::new(Mutex::new(engine)), reloads)
    }
}

fn run_check(path: &Path) -> i32 {
    match setlist::check(path) {
        Ok(set) => {
            let sections: usize = set.slots.iter().map(|s| s.sections.len()).sum();
            println!(
                "ok: {} ({} slots, {} sections)",
                path.display(),
                set.slots.len(),
                sections
            );
            0
        }
        Err(e) => {
            eprintln!("invalid: {:#}", e);
            1
        }
    }
}

/// Defaults, then `VAMP_*` (and `.env`), then flags.
fn engine_config(matches: &ArgMatches) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env().context("reading VAMP_* settings")?;
    if let Some(n) = matches.get_one::<usize>("slots") {
        config.slot_count = *n;
    }
    if let Some(tick) = matches.get_one::<Duration>("tick-ms") {
        config.tick_interval = *tick;
    }
    if matches.get_flag("no-exclusive") {
        config.exclusive_playback = false;
    }
    Ok(config)
}

fn open_backend(offline: bool, clock: Arc<dyn Clock>) -> Box<dyn AudioBackend> {
    if !offline {
        match RodioBackend::open_default() {
            Ok(backend) => return Box::new(backend),
            Err(e) => console::warn(format!("{}; continuing offline (silent)", e)),
        }
    }
    Box::new(OfflineBackend::new(clock))
}
