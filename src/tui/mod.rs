//! Stage view: a full-screen slot board driven from the keyboard.
//!
//! The event loop owns the engine and polls it every frame, so cue timing
//! never waits on a key press.

mod widgets;

use std::io::{self, Stdout};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};

use crate::console::{self, Level};
use crate::engine::{Engine, SlotSnapshot};
use crate::model::{SectionId, Setlist, SlotId};

pub use widgets::SlotBoard;

const FRAME: Duration = Duration::from_millis(33);
const MAX_MESSAGES: usize = 50;

struct Message {
    text: String,
    level: Level,
}

pub struct StageApp {
    engine: Engine,
    reloads: Option<Receiver<Setlist>>,
    selected: Option<SlotId>,
    section_cursor: usize,
    messages: Vec<Message>,
    console: console::Subscription,
    should_quit: bool,
}

impl StageApp {
    pub fn new(engine: Engine, reloads: Option<Receiver<Setlist>>) -> Self {
        let selected = engine.slot_ids().first().copied();
        Self {
            engine,
            reloads,
            selected,
            section_cursor: 0,
            messages: Vec::new(),
            console: console::subscribe(),
            should_quit: false,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        self.engine.shutdown();
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let frame = FRAME.min(self.engine.config().tick_interval);
        loop {
            self.step();
            terminal.draw(|f| self.render(f))?;

            if event::poll(frame)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code, key.modifiers);
                    }
                }
            }

            if self.should_quit {
                break;
            }
        }
        Ok(())
    }

    /// One engine turn: file reloads, due ticks, then everything worth showing.
    fn step(&mut self) {
        if let Some(rx) = &self.reloads {
            for setlist in rx.try_iter() {
                self.engine.reload_idle(setlist);
            }
        }
        self.engine.poll();
        for event in self.engine.drain_events() {
            if !event.is_noisy() {
                self.msg(event.to_string(), Level::Info);
            }
        }
        for log in self.console.drain() {
            self.msg(log.text, log.level);
        }
        self.clamp_cursor();
    }

    fn handle_key(&mut self, code: KeyCode, mods: KeyModifiers) {
        if mods.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char(c) if c.is_ascii_digit() => self.select_digit(c),
            KeyCode::Up => self.select_offset(-1),
            KeyCode::Down => self.select_offset(1),
            KeyCode::Left => self.section_cursor = self.section_cursor.saturating_sub(1),
            KeyCode::Right => {
                self.section_cursor += 1;
                self.clamp_cursor();
            }
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Enter => self.jump_selected(),
            KeyCode::Tab => self.queue_selected(),
            KeyCode::Char('s') => self.engine.stop_all(),
            _ => {}
        }
    }

    fn select_digit(&mut self, c: char) {
        let Some(n) = c.to_digit(10) else { return };
        let ids = self.engine.slot_ids();
        // 0 is the tenth slot, like a keyboard row.
        let index = if n == 0 { 9 } else { n as usize - 1 };
        if let Some(id) = ids.get(index) {
            self.select(*id);
        }
    }

    fn select_offset(&mut self, delta: isize) {
        let ids = self.engine.slot_ids();
        if ids.is_empty() {
            return;
        }
        let current = self
            .selected
            .and_then(|s| ids.iter().position(|id| *id == s))
            .unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(ids.len() as isize) as usize;
        self.select(ids[next]);
    }

    fn select(&mut self, id: SlotId) {
        if self.selected == Some(id) {
            return;
        }
        self.selected = Some(id);
        // Start the cursor where the music is.
        self.section_cursor = self
            .engine
            .slot(id)
            .and_then(|snap| {
                let current = snap.playback.current_section?;
                snap.sections.iter().position(|s| s.id == current)
            })
            .unwrap_or(0);
    }

    fn selected_snapshot(&self) -> Option<SlotSnapshot> {
        self.engine.slot(self.selected?)
    }

    fn cursor_section(&self) -> Option<SectionId> {
        let snap = self.selected_snapshot()?;
        snap.sections.get(self.section_cursor).map(|s| s.id)
    }

    fn clamp_cursor(&mut self) {
        let count = self.selected_snapshot().map_or(0, |s| s.sections.len());
        self.section_cursor = self.section_cursor.min(count.saturating_sub(1));
    }

    fn toggle_selected(&mut self) {
        let Some(snap) = self.selected_snapshot() else { return };
        if snap.playback.is_playing {
            self.engine.stop(snap.id);
            return;
        }
        if !snap.has_audio {
            self.msg(format!("{} has no audio", snap.name), Level::Warn);
            return;
        }
        if let Err(e) = self.engine.play(snap.id, None) {
            self.msg(e.to_string(), Level::Error);
        }
    }

    fn jump_selected(&mut self) {
        let (Some(id), Some(section)) = (self.selected, self.cursor_section()) else {
            return;
        };
        if let Err(e) = self.engine.jump_to_section(id, section) {
            self.msg(e.to_string(), Level::Error);
        }
    }

    fn queue_selected(&mut self) {
        let (Some(id), Some(section)) = (self.selected, self.cursor_section()) else {
            return;
        };
        self.engine.queue_next_section(id, section);
    }

    fn msg(&mut self, text: impl Into<String>, level: Level) {
        self.messages.push(Message { text: text.into(), level });
        if self.messages.len() > MAX_MESSAGES {
            self.messages.remove(0);
        }
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        frame.render_widget(ratatui::widgets::Clear, area);

        let slots = self.engine.snapshot();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Header
                Constraint::Min(6),    // Board
                Constraint::Length(7), // Messages
                Constraint::Length(1), // Keys
            ])
            .split(area);

        self.render_header(frame, chunks[0], &slots);
        self.render_board(frame, chunks[1], &slots);
        self.render_messages(frame, chunks[2]);
        render_keys(frame, chunks[3]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect, slots: &[SlotSnapshot]) {
        let playing = slots.iter().filter(|s| s.playback.is_playing).count();
        let transport = if playing > 0 {
            Span::styled(" ▶ ", Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD))
        } else {
            Span::styled(" ■ ", Style::default().fg(Color::DarkGray).bg(Color::Rgb(40, 40, 40)))
        };

        let mut spans = vec![
            Span::styled(" VAMP ", Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)),
            Span::raw(" "),
            transport,
            Span::raw("  "),
            Span::styled(format!("{} slots", slots.len()), Style::default().fg(Color::DarkGray)),
        ];
        if let Some(snap) = self.selected.and_then(|id| slots.iter().find(|s| s.id == id)) {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                format!("selected: {}", snap.name),
                Style::default().fg(Color::Cyan),
            ));
            if let Some(next) = snap.next_section_name() {
                spans.push(Span::styled(format!("  next: {}", next), Style::default().fg(Color::Yellow)));
            }
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_board(&self, frame: &mut Frame, area: Rect, slots: &[SlotSnapshot]) {
        let block = Block::default()
            .title(" Slots ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Rgb(60, 60, 60)));
        let board = SlotBoard::new(slots)
            .block(block)
            .selected(self.selected, self.cursor_section());
        frame.render_widget(board, area);
    }

    fn render_messages(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Output ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Rgb(60, 60, 60)));
        let inner = block.inner(area);
        let max_lines = inner.height as usize;

        let mut lines: Vec<Line> = Vec::new();
        for msg in self.messages.iter().rev().take(max_lines) {
            let style = match msg.level {
                Level::Error => Style::default().fg(Color::Red),
                Level::Warn => Style::default().fg(Color::Yellow),
                Level::Info => Style::default().fg(Color::DarkGray),
            };
            lines.push(Line::styled(msg.text.as_str(), style));
        }
        lines.reverse();

        frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);
    }
}

fn render_keys(frame: &mut Frame, area: Rect) {
    let keys = " 1-9 slot  ←/→ section  space play/stop  enter jump  tab queue  s stop all  q quit";
    frame.render_widget(
        Paragraph::new(Line::styled(keys, Style::default().fg(Color::DarkGray))),
        area,
    );
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

pub fn run(engine: Engine, reloads: Option<Receiver<Setlist>>) -> Result<()> {
    StageApp::new(engine, reloads).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::audio::clock::ManualClock;
    use crate::audio::offline::OfflineBackend;
    use crate::config::EngineConfig;
    use crate::engine::SlotConfiguration;
    use crate::model::{Section, SectionId};

    fn stage() -> (StageApp, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let backend = OfflineBackend::new(clock.clone()).with_track("song.wav", Duration::from_secs(60));
        let mut engine = Engine::new(EngineConfig::default(), Box::new(backend), clock.clone());
        engine
            .save_slot_configuration(
                SlotId(1),
                SlotConfiguration {
                    name: "Song".into(),
                    audio_file: Some(PathBuf::from("song.wav")),
                    tempo_bpm: Some(80),
                    sections: vec![
                        Section::normal(SectionId(1), "Intro", 1),
                        Section::normal(SectionId(2), "Verse", 5),
                    ],
                },
            )
            .expect("configure");
        (StageApp::new(engine, None), clock)
    }

    #[test]
    fn space_toggles_selected_slot() {
        let (mut app, _clock) = stage();
        app.handle_key(KeyCode::Char(' '), KeyModifiers::NONE);
        assert!(app.engine.is_playing(SlotId(1)));
        app.handle_key(KeyCode::Char(' '), KeyModifiers::NONE);
        assert!(!app.engine.is_playing(SlotId(1)));
    }

    #[test]
    fn enter_jumps_to_cursor_section() {
        let (mut app, _clock) = stage();
        app.handle_key(KeyCode::Right, KeyModifiers::NONE);
        app.handle_key(KeyCode::Right, KeyModifiers::NONE);
        assert_eq!(app.section_cursor, 1);
        app.handle_key(KeyCode::Enter, KeyModifiers::NONE);
        let snap = app.engine.slot(SlotId(1)).expect("slot");
        assert_eq!(snap.playback.current_section, Some(SectionId(2)));
    }

    #[test]
    fn tab_queues_without_starting() {
        let (mut app, _clock) = stage();
        app.handle_key(KeyCode::Right, KeyModifiers::NONE);
        app.handle_key(KeyCode::Tab, KeyModifiers::NONE);
        let snap = app.engine.slot(SlotId(1)).expect("slot");
        assert!(!snap.playback.is_playing);
        assert_eq!(snap.playback.next_section, Some(SectionId(2)));
    }

    #[test]
    fn digits_select_and_silent_slot_warns() {
        let (mut app, _clock) = stage();
        app.handle_key(KeyCode::Char('2'), KeyModifiers::NONE);
        assert_eq!(app.selected, Some(SlotId(2)));
        app.handle_key(KeyCode::Char(' '), KeyModifiers::NONE);
        assert!(!app.engine.is_playing(SlotId(2)));
        assert!(app.messages.iter().any(|m| m.level == Level::Warn));
    }

    #[test]
    fn step_reports_engine_events() {
        let (mut app, clock) = stage();
        app.handle_key(KeyCode::Char(' '), KeyModifiers::NONE);
        clock.advance(Duration::from_secs(13));
        app.step();
        assert!(app.messages.iter().any(|m| m.text.contains("Verse")));
    }

    #[test]
    fn quit_keys() {
        let (mut app, _clock) = stage();
        app.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(app.should_quit);
    }
}
