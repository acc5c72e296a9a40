//! Custom TUI widgets for the stage view.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Widget},
};

use crate::engine::SlotSnapshot;
use crate::model::{SectionId, SlotId};

const COL_NUM: usize = 3;
const COL_STATE: usize = 2;
const COL_NAME: usize = 16;
const COL_BPM: usize = 5;
const COL_MEASURE: usize = 5;
const PREFIX_WIDTH: usize = COL_NUM + 1 + COL_STATE + 1 + COL_NAME + 1 + COL_BPM + 1 + COL_MEASURE + 2;

/// One row per slot: state, name, tempo, measure and the section strip.
pub struct SlotBoard<'a> {
    slots: &'a [SlotSnapshot],
    block: Option<Block<'a>>,
    selected_slot: Option<SlotId>,
    selected_section: Option<SectionId>,
}

impl<'a> SlotBoard<'a> {
    pub fn new(slots: &'a [SlotSnapshot]) -> Self {
        Self {
            slots,
            block: None,
            selected_slot: None,
            selected_section: None,
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    pub fn selected(mut self, slot: Option<SlotId>, section: Option<SectionId>) -> Self {
        self.selected_slot = slot;
        self.selected_section = section;
        self
    }
}

fn clip(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn clear_row(buf: &mut Buffer, area: Rect, y: u16) {
    for x in area.x..area.x + area.width {
        buf[(x, y)].set_char(' ').set_style(Style::default());
    }
}

fn slot_color(slot: &SlotSnapshot) -> Color {
    match slot.color.rgb() {
        Some((r, g, b)) => Color::Rgb(r, g, b),
        None => Color::White,
    }
}

impl Widget for SlotBoard<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let SlotBoard {
            slots,
            block,
            selected_slot,
            selected_section,
        } = self;
        let mut area = area;
        if let Some(block) = block {
            let inner = block.inner(area);
            block.render(area, buf);
            area = inner;
        }
        if area.height < 1 {
            return;
        }

        if area.width as usize <= PREFIX_WIDTH + 4 {
            clear_row(buf, area, area.y);
            buf.set_string(
                area.x,
                area.y,
                "terminal too narrow, widen to view slots",
                Style::default().fg(Color::DarkGray),
            );
            return;
        }

        let dim = Style::default().fg(Color::DarkGray);
        let header_style = Style::default().fg(Color::Rgb(100, 100, 100));

        let y = area.y;
        clear_row(buf, area, y);
        let header = format!(
            "{:>n$} {:<s$} {:<w$} {:>b$} {:>m$}  SECTIONS",
            "#",
            "",
            "SLOT",
            "BPM",
            "MEAS",
            n = COL_NUM,
            s = COL_STATE,
            w = COL_NAME,
            b = COL_BPM,
            m = COL_MEASURE,
        );
        buf.set_string(area.x, y, &header, header_style);

        if slots.is_empty() {
            let y = area.y + 1;
            if y < area.y + area.height {
                clear_row(buf, area, y);
                buf.set_string(area.x + 2, y, "No slots. Open a setlist with --open", dim);
            }
            return;
        }

        let strip_x = area.x + PREFIX_WIDTH as u16;
        let strip_end = area.x + area.width;

        for (i, slot) in slots.iter().enumerate() {
            let y = area.y + 1 + i as u16;
            if y >= area.y + area.height {
                break;
            }
            clear_row(buf, area, y);
            let is_selected = selected_slot == Some(slot.id);
            let mut x = area.x;

            buf.set_string(x, y, &format!("{:>w$}", slot.id, w = COL_NUM), dim);
            x += (COL_NUM + 1) as u16;

            let (state, state_style) = if slot.playback.is_playing {
                ("▶", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
            } else if slot.has_audio {
                ("■", dim)
            } else {
                ("·", dim)
            };
            buf.set_string(x, y, state, state_style);
            x += (COL_STATE + 1) as u16;

            let mut name_style = Style::default().fg(slot_color(slot));
            if is_selected {
                name_style = name_style.add_modifier(Modifier::REVERSED);
            }
            let name = format!("{:<w$}", clip(&slot.name, COL_NAME), w = COL_NAME);
            buf.set_string(x, y, &name, name_style);
            x += (COL_NAME + 1) as u16;

            let bpm = slot.tempo_bpm.map_or("-".to_string(), |b| b.to_string());
            buf.set_string(x, y, &format!("{:>w$}", bpm, w = COL_BPM), Style::default().fg(Color::Cyan));
            x += (COL_BPM + 1) as u16;

            let measure = slot.current_measure.map_or("-".to_string(), |m| m.to_string());
            buf.set_string(x, y, &format!("{:>w$}", measure, w = COL_MEASURE), Style::default().fg(Color::White));

            if slot.sections.is_empty() {
                let hint = if slot.has_audio { "whole track" } else { "no audio" };
                buf.set_string(strip_x, y, hint, dim);
                continue;
            }

            let mut sx = strip_x;
            for section in &slot.sections {
                if sx >= strip_end {
                    break;
                }
                let label = if section.is_loop() {
                    format!("[{} ↻]", section.name)
                } else {
                    format!("[{}]", section.name)
                };
                let mut style = if slot.playback.current_section == Some(section.id) {
                    Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD)
                } else if slot.playback.next_section == Some(section.id) {
                    Style::default().fg(Color::Black).bg(Color::Yellow)
                } else {
                    Style::default().fg(Color::Rgb(150, 150, 150))
                };
                if is_selected && selected_section == Some(section.id) {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                let room = (strip_end - sx) as usize;
                let label = clip(&label, room);
                let width = label.chars().count() as u16;
                buf.set_string(sx, y, &label, style);
                sx += width + 1;
            }
        }

        let rows_end = area.y + 1 + slots.len() as u16;
        for y in rows_end..area.y + area.height {
            clear_row(buf, area, y);
        }
    }
}
