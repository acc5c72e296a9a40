use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{anyhow, bail, Result};
use rustyline::{error::ReadlineError, history::DefaultHistory, Editor, ExternalPrinter};

use crate::console;
use crate::engine::{ConfigError, Engine, SlotConfiguration, SlotSnapshot};
use crate::model::{Section, SectionId, SectionKind, Setlist, SlotId};
use crate::storage::setlist as setlist_io;

mod completer;
use completer::VampHelper;

pub type SharedEngine = Arc<Mutex<Engine>>;

fn lock(engine: &SharedEngine) -> MutexGuard<'_, Engine> {
    engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn run_repl(engine: SharedEngine, reloads: Option<Receiver<Setlist>>) -> Result<()> {
    let mut rl = Editor::<VampHelper, DefaultHistory>::new()?;
    rl.set_helper(Some(VampHelper::new()));

    // Background output goes above the prompt instead of through it.
    if let Ok(pr) = rl.create_external_printer() {
        let lock = Mutex::new(pr);
        set_external_printer(Some(Box::new(move |s: String| {
            if let Ok(mut g) = lock.lock() {
                let _ = g.print(s);
            }
        })));
    }

    let running = Arc::new(AtomicBool::new(true));
    let ticker = spawn_ticker(engine.clone(), reloads, running.clone());

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str())?;
                let result = handle_line(&mut lock(&engine), &line);
                match result {
                    Ok(Output::None) => {}
                    Ok(Output::Text(t)) => println!("{}", t),
                    Ok(Output::Quit) => {
                        println!("bye");
                        break;
                    }
                    Err(e) => eprintln!("error: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("bye");
                break;
            }
            Err(err) => {
                eprintln!("repl error: {}", err);
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    let _ = ticker.join();
    lock(&engine).shutdown();
    set_external_printer(None);
    Ok(())
}

/// Drives the engine between prompts: applies file reloads, fires due
/// ticks and prints what happened.
fn spawn_ticker(
    engine: SharedEngine,
    reloads: Option<Receiver<Setlist>>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let log = console::subscribe();
        let interval = lock(&engine).config().tick_interval;
        while running.load(Ordering::SeqCst) {
            let events = {
                let mut engine = lock(&engine);
                if let Some(rx) = &reloads {
                    for setlist in rx.try_iter() {
                        engine.reload_idle(setlist);
                    }
                }
                engine.poll();
                engine.drain_events()
            };
            for event in events.iter().filter(|e| !e.is_noisy()) {
                print_external(event.to_string());
            }
            for msg in log.drain() {
                print_external(format!("{}: {}", msg.level, msg.text));
            }
            thread::sleep(interval);
        }
    })
}

#[derive(Debug, PartialEq)]
enum Output {
    None,
    Text(String),
    Quit,
}

fn handle_line(engine: &mut Engine, line: &str) -> Result<Output> {
    let l = line.trim();
    if let Some(rest) = l.strip_prefix(':') {
        return handle_meta(rest);
    }

    let mut parts = shlex::Shlex::new(l);
    let cmd: String = parts.next().unwrap_or_default();
    let args: Vec<String> = parts.collect();
    match cmd.as_str() {
        "list" => Ok(Output::Text(render_list(&engine.snapshot()))),
        "status" => Ok(Output::Text(render_status(&engine.snapshot()))),
        "sections" => {
            let slot = slot_arg(engine, args.first(), "usage: sections <slot>")?;
            Ok(Output::Text(render_sections(&snapshot(engine, slot)?)))
        }
        "play" => {
            let slot = slot_arg(engine, args.first(), "usage: play <slot> [section]")?;
            let section = match args.get(1) {
                Some(raw) => Some(section_arg(engine, slot, raw)?),
                None => None,
            };
            require_audio(engine, slot)?;
            engine.play(slot, section)?;
            Ok(Output::None)
        }
        "stop" => {
            match args.first() {
                Some(raw) => {
                    let slot = slot_arg(engine, Some(raw), "usage: stop [slot]")?;
                    engine.stop(slot);
                }
                None => engine.stop_all(),
            }
            Ok(Output::None)
        }
        "jump" => {
            let (slot, section) = slot_and_section(engine, &args, "usage: jump <slot> <section>")?;
            require_audio(engine, slot)?;
            engine.jump_to_section(slot, section)?;
            Ok(Output::None)
        }
        "next" => {
            let (slot, section) = slot_and_section(engine, &args, "usage: next <slot> <section>")?;
            engine.queue_next_section(slot, section);
            let snap = snapshot(engine, slot)?;
            Ok(Output::Text(format!(
                "{}: next {}",
                snap.name,
                snap.next_section_name().unwrap_or("-")
            )))
        }
        "name" => {
            let slot = slot_arg(engine, args.first(), "usage: name <slot> \"Name\"")?;
            let name = args.get(1).ok_or_else(|| anyhow!("usage: name <slot> \"Name\""))?;
            edit_slot(engine, slot, |edit| {
                edit.name = name.clone();
                Ok(())
            })?;
            Ok(Output::Text(format!("slot {} renamed to {}", slot, name.trim())))
        }
        "bpm" => {
            let slot = slot_arg(engine, args.first(), "usage: bpm <slot> <bpm|none>")?;
            let raw = args.get(1).ok_or_else(|| anyhow!("usage: bpm <slot> <bpm|none>"))?;
            let tempo = parse_bpm(raw)?;
            edit_slot(engine, slot, |edit| {
                edit.tempo_bpm = tempo;
                Ok(())
            })?;
            Ok(Output::Text(match tempo {
                Some(bpm) => format!("slot {} at {} bpm", slot, bpm),
                None => format!("slot {} untimed", slot),
            }))
        }
        "audio" => {
            let slot = slot_arg(engine, args.first(), "usage: audio <slot> \"file.wav\"")?;
            let path = args.get(1).ok_or_else(|| anyhow!("usage: audio <slot> \"file.wav\""))?;
            edit_slot(engine, slot, |edit| {
                edit.audio_file = Some(PathBuf::from(path));
                Ok(())
            })?;
            Ok(Output::Text(format!("slot {} loaded {}", slot, path)))
        }
        "section" => handle_section(engine, &args),
        "remove" => {
            let slot = slot_arg(engine, args.first(), "usage: remove <slot>")?;
            engine.remove_audio(slot);
            Ok(Output::Text(format!("slot {} cleared", slot)))
        }
        "save" => {
            let path = args.first().ok_or_else(|| anyhow!("usage: save \"set.yaml\""))?;
            setlist_io::save(&engine.setlist(), path)?;
            Ok(Output::Text(format!("saved {}", path)))
        }
        "open" => {
            let path = args.first().ok_or_else(|| anyhow!("usage: open \"set.yaml\""))?;
            let setlist = setlist_io::open(path)?;
            engine.load_setlist(setlist)?;
            Ok(Output::Text(format!("opened {}", path)))
        }
        "" => Ok(Output::None),
        other => bail!("unknown command '{}' (try :help)", other),
    }
}

fn handle_meta(meta: &str) -> Result<Output> {
    match meta.trim() {
        "help" => Ok(Output::Text(HELP.to_string())),
        "q" | "quit" | "exit" => Ok(Output::Quit),
        _ => Ok(Output::Text("unknown meta command".into())),
    }
}

fn handle_section(engine: &mut Engine, args: &[String]) -> Result<Output> {
    const USAGE: &str = "usage: section add|set|rm <slot> ...";
    let sub = args.first().map(String::as_str).unwrap_or("");
    let slot = slot_arg(engine, args.get(1), USAGE)?;
    match sub {
        "add" => {
            // section add <slot> "Name" [start] [end]
            let name = args
                .get(2)
                .ok_or_else(|| anyhow!("usage: section add <slot> \"Name\" [start] [end]"))?;
            let snap = snapshot(engine, slot)?;
            let start = match args.get(3) {
                Some(raw) => parse_measure("start", raw)?,
                None => default_start(&snap.sections),
            };
            let id = SectionId(snap.sections.iter().map(|s| s.id.0).max().unwrap_or(0) + 1);
            let section = match args.get(4) {
                Some(raw) => Section::looped(id, name.clone(), start, parse_measure("end", raw)?),
                None => Section::normal(id, name.clone(), start),
            };
            let described = section.describe();
            edit_slot(engine, slot, |edit| {
                edit.sections.push(section);
                Ok(())
            })?;
            Ok(Output::Text(format!("added {}", described)))
        }
        "set" => {
            // section set <slot> <section> [name "x"] [start n] [end n|none]
            let raw = args
                .get(2)
                .ok_or_else(|| anyhow!("usage: section set <slot> <section> [name \"x\"] [start n] [end n|none]"))?;
            let target = section_arg(engine, slot, raw)?;
            let pairs = &args[3..];
            if pairs.is_empty() || pairs.len() % 2 != 0 {
                bail!("usage: section set <slot> <section> [name \"x\"] [start n] [end n|none]");
            }
            edit_slot(engine, slot, |edit| {
                let section = edit
                    .sections
                    .iter_mut()
                    .find(|s| s.id == target)
                    .ok_or_else(|| anyhow!("no such section"))?;
                for pair in pairs.chunks(2) {
                    let value = &pair[1];
                    match pair[0].as_str() {
                        "name" => section.name = value.clone(),
                        "start" => section.start_measure = parse_measure("start", value)?,
                        "end" if value == "none" => section.kind = SectionKind::Normal,
                        "end" => {
                            section.kind = SectionKind::Loop {
                                end_measure: parse_measure("end", value)?,
                            }
                        }
                        other => bail!("unknown section field '{}'", other),
                    }
                }
                Ok(())
            })?;
            Ok(Output::Text(render_sections(&snapshot(engine, slot)?)))
        }
        "rm" => {
            let raw = args.get(2).ok_or_else(|| anyhow!("usage: section rm <slot> <section>"))?;
            let target = section_arg(engine, slot, raw)?;
            edit_slot(engine, slot, |edit| {
                edit.sections.retain(|s| s.id != target);
                Ok(())
            })?;
            Ok(Output::Text(render_sections(&snapshot(engine, slot)?)))
        }
        _ => bail!(USAGE),
    }
}

/// Applies `change` to the slot's current settings and saves the result.
fn edit_slot(
    engine: &mut Engine,
    slot: SlotId,
    change: impl FnOnce(&mut SlotConfiguration) -> Result<()>,
) -> Result<()> {
    let mut edit = SlotConfiguration::from_snapshot(&snapshot(engine, slot)?);
    change(&mut edit)?;
    engine.save_slot_configuration(slot, edit)?;
    Ok(())
}

/// One measure past the end of the last section.
fn default_start(sections: &[Section]) -> u32 {
    sections
        .last()
        .map(|s| s.end_measure().unwrap_or(s.start_measure) + 1)
        .unwrap_or(1)
}

fn snapshot(engine: &Engine, slot: SlotId) -> Result<SlotSnapshot> {
    engine.slot(slot).ok_or_else(|| anyhow!("no slot {}", slot))
}

fn require_audio(engine: &Engine, slot: SlotId) -> Result<()> {
    if snapshot(engine, slot)?.has_audio {
        Ok(())
    } else {
        bail!("slot {} has no audio (use: audio {} \"file.wav\")", slot, slot)
    }
}

fn slot_arg(engine: &Engine, raw: Option<&String>, usage: &str) -> Result<SlotId> {
    let raw = raw.ok_or_else(|| anyhow!("{}", usage))?;
    let id = raw
        .parse::<u32>()
        .map(SlotId)
        .map_err(|_| anyhow!("slot must be a number, got '{}'", raw))?;
    if engine.slot(id).is_none() {
        bail!("no slot {}", id);
    }
    Ok(id)
}

fn section_arg(engine: &Engine, slot: SlotId, raw: &str) -> Result<SectionId> {
    engine
        .find_section(slot, raw)
        .ok_or_else(|| anyhow!("slot {} has no section '{}'", slot, raw))
}

fn slot_and_section(engine: &Engine, args: &[String], usage: &str) -> Result<(SlotId, SectionId)> {
    let slot = slot_arg(engine, args.first(), usage)?;
    let raw = args.get(1).ok_or_else(|| anyhow!("{}", usage))?;
    Ok((slot, section_arg(engine, slot, raw)?))
}

fn parse_bpm(raw: &str) -> Result<Option<u32>> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let value: i64 = raw.parse().map_err(|_| anyhow!("bpm must be a number, got '{}'", raw))?;
    if value <= 0 {
        return Err(ConfigError::InvalidBpm(value).into());
    }
    let bpm = u32::try_from(value).map_err(|_| anyhow!("bpm {} is out of range", value))?;
    Ok(Some(bpm))
}

fn parse_measure(label: &str, raw: &str) -> Result<u32> {
    raw.parse::<u32>()
        .map_err(|_| anyhow!("{} measure must be a whole number, got '{}'", label, raw))
}

fn render_list(slots: &[SlotSnapshot]) -> String {
    let mut out = String::new();
    for s in slots {
        let state = if s.playback.is_playing { ">" } else { " " };
        let bpm = s.tempo_bpm.map_or("-".to_string(), |b| format!("{} bpm", b));
        let file = s.file_name.as_deref().unwrap_or("[no audio]");
        out.push_str(&format!(
            "{}{:>2} {:<16} {:>8}  {}  ({} sections)\n",
            state,
            s.id,
            s.name,
            bpm,
            file,
            s.sections.len()
        ));
    }
    out.trim_end().to_string()
}

fn render_sections(slot: &SlotSnapshot) -> String {
    if slot.sections.is_empty() {
        return format!("{}: [no sections]", slot.name);
    }
    let mut out = format!("{}:\n", slot.name);
    for (i, section) in slot.sections.iter().enumerate() {
        let mark = if Some(section.id) == slot.playback.current_section {
            "*"
        } else if Some(section.id) == slot.playback.next_section {
            ">"
        } else {
            " "
        };
        out.push_str(&format!("{}{:>2} {}\n", mark, i + 1, section.describe()));
    }
    out.trim_end().to_string()
}

fn render_status(slots: &[SlotSnapshot]) -> String {
    let playing: Vec<&SlotSnapshot> = slots.iter().filter(|s| s.playback.is_playing).collect();
    if playing.is_empty() {
        return "stopped".to_string();
    }
    playing
        .iter()
        .map(|s| {
            let mut line = format!(
                "[{}] {} | {} | measure {}",
                s.id,
                s.name,
                s.current_section_name().unwrap_or("-"),
                s.current_measure.map_or("-".to_string(), |m| m.to_string()),
            );
            if let Some(next) = s.next_section_name() {
                line.push_str(&format!(" | next {}", next));
            }
            if s.playback.loops_completed > 0 {
                line.push_str(&format!(" | x{}", s.playback.loops_completed));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

type PrinterFn = Box<dyn Fn(String) + Send + Sync + 'static>;
static EXTERNAL_PRINTER: once_cell::sync::Lazy<Mutex<Option<PrinterFn>>> =
    once_cell::sync::Lazy::new(|| Mutex::new(None));

fn set_external_printer(p: Option<PrinterFn>) {
    if let Ok(mut guard) = EXTERNAL_PRINTER.lock() {
        *guard = p;
    }
}

fn print_external(s: String) {
    match EXTERNAL_PRINTER.lock() {
        Ok(guard) => match guard.as_ref() {
            Some(f) => f(s),
            None => println!("{}", s),
        },
        Err(_) => println!("{}", s),
    }
}

const HELP: &str = r#"Commands:
  :help                      Show this help
  :q / :quit                 Exit

Playback:
  play <slot> [section]      Start a slot (from its cue or first section)
  stop [slot]                Stop one slot, or all
  jump <slot> <section>      Cut over to a section now
  next <slot> <section>      Queue a section for the next bar line
  status                     What is playing, where

Slots:
  list                       All slots
  name <slot> "Name"         Rename
  bpm <slot> <n|none>        Set tempo (needed for sections)
  audio <slot> "file.wav"    Load a .wav or .mp3 (Tab completes paths)
  remove <slot>              Drop audio and reset the slot

Sections:
  sections <slot>            List (* playing, > queued)
  section add <slot> "Name" [start] [end]   end makes it a loop
  section set <slot> <section> [name "x"] [start n] [end n|none]
  section rm <slot> <section>

Setlist:
  save "set.yaml"            Save all slots (.json for JSON)
  open "set.yaml"            Load a setlist
"#;
