//! Full-screen ratatui dashboard.
//!
//! `Board` holds everything on screen and is plain data, so it can be
//! exercised without a terminal. `UiApp` owns the terminal and redraws the
//! board after every update.

use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table};
use ratatui::{Frame, Terminal};

use super::{Phase, Ui};
use crate::schema::EntityKind;

const FEED_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq)]
struct Meter {
    done: u64,
    total: u64,
    label: String,
}

impl Meter {
    fn ratio(&self) -> f64 {
        match self.total {
            0 => 0.0,
            total => (self.done as f64 / total as f64).min(1.0),
        }
    }
}

/// Committed counts of one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tally {
    kind: EntityKind,
    nodes: u64,
    edges: u64,
    skipped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FeedLine {
    text: String,
    warning: bool,
}

#[derive(Debug)]
struct Board {
    phase: Phase,
    info: String,
    meter: Option<Meter>,
    tallies: Vec<Tally>,
    feed: VecDeque<FeedLine>,
}

impl Board {
    fn new() -> Self {
        Self {
            phase: Phase::Starting,
            info: String::new(),
            meter: None,
            tallies: Vec::new(),
            feed: VecDeque::with_capacity(FEED_CAPACITY),
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        // A new graph pass starts its tally over
        if phase == Phase::Clearing {
            self.tallies.clear();
        }
        self.phase = phase;
    }

    fn record(&mut self, tally: Tally) {
        match self.tallies.iter_mut().find(|t| t.kind == tally.kind) {
            Some(existing) => *existing = tally,
            None => self.tallies.push(tally),
        }
    }

    fn push(&mut self, text: String, warning: bool) {
        if self.feed.len() == FEED_CAPACITY {
            self.feed.pop_front();
        }
        self.feed.push_back(FeedLine { text, warning });
    }

    fn draw(&self, frame: &mut Frame) {
        let [header, meter, body] = split(
            Direction::Vertical,
            [Constraint::Length(4), Constraint::Length(3), Constraint::Min(6)],
            frame.area(),
        );
        let [tallies, feed] = split(
            Direction::Horizontal,
            [Constraint::Length(46), Constraint::Min(20)],
            body,
        );

        self.draw_header(frame, header);
        self.draw_meter(frame, meter);
        self.draw_tallies(frame, tallies);
        self.draw_feed(frame, feed);
    }

    fn draw_header(&self, frame: &mut Frame, area: Rect) {
        let (mark, color) = match self.phase {
            Phase::Complete => ("✓", Color::Green),
            Phase::Failed(_) => ("✗", Color::Red),
            _ => ("•", Color::Cyan),
        };
        let accent = Style::default().fg(color).add_modifier(Modifier::BOLD);

        let text = vec![
            Line::from(vec![
                Span::styled(format!(" {} {}", mark, self.phase), accent),
                Span::styled(
                    format!("  [{}]", self.phase.stage()),
                    Style::default().fg(Color::DarkGray),
                ),
            ]),
            Line::from(Span::styled(
                format!("   {}", self.info),
                Style::default().fg(Color::Gray),
            )),
        ];

        frame.render_widget(Paragraph::new(text).block(framed(" Campus Mirror ")), area);
    }

    fn draw_meter(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::LEFT | Borders::RIGHT);
        let Some(meter) = &self.meter else {
            frame.render_widget(block, area);
            return;
        };

        let label = format!("{} {}/{}", meter.label, meter.done, meter.total);
        let gauge = Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
            .ratio(meter.ratio())
            .label(label);
        frame.render_widget(gauge, area);
    }

    fn draw_tallies(&self, frame: &mut Frame, area: Rect) {
        let failed = match self.phase {
            Phase::Failed(kind) => Some(kind),
            _ => None,
        };

        let mut rows: Vec<Row> = self
            .tallies
            .iter()
            .map(|t| {
                let skipped_style = if t.skipped > 0 {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    Cell::from(t.kind.label()),
                    Cell::from(t.nodes.to_string()),
                    Cell::from(t.edges.to_string()),
                    Cell::from(t.skipped.to_string()).style(skipped_style),
                ])
            })
            .collect();
        if let Some(kind) = failed {
            rows.push(
                Row::new(vec![Cell::from(kind.label()), Cell::from("rolled back")])
                    .style(Style::default().fg(Color::Red)),
            );
        }

        let table = Table::new(
            rows,
            [
                Constraint::Length(12),
                Constraint::Length(10),
                Constraint::Length(10),
                Constraint::Length(8),
            ],
        )
        .header(
            Row::new(vec!["Type", "Nodes", "Edges", "Skipped"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(framed(" Graph mirror "));
        frame.render_widget(table, area);
    }

    fn draw_feed(&self, frame: &mut Frame, area: Rect) {
        let height = area.height.saturating_sub(2) as usize;
        let items: Vec<ListItem> = self
            .feed
            .iter()
            .skip(self.feed.len().saturating_sub(height))
            .map(|line| {
                let color = if line.warning { Color::Yellow } else { Color::Gray };
                ListItem::new(Span::styled(line.text.as_str(), Style::default().fg(color)))
            })
            .collect();

        frame.render_widget(List::new(items).block(framed(" Activity ")), area);
    }
}

fn framed(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Blue))
}

fn split<const N: usize>(direction: Direction, constraints: [Constraint; N], area: Rect) -> [Rect; N] {
    Layout::default()
        .direction(direction)
        .constraints(constraints)
        .areas(area)
}

/// Terminal front end, enabled with `--tui`
pub struct UiApp {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    board: Board,
}

impl UiApp {
    /// Switch to the alternate screen in raw mode
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

        Ok(Self {
            terminal,
            board: Board::new(),
        })
    }

    fn refresh(&mut self) {
        let board = &self.board;
        // Drawing errors only cost a frame
        let _ = self.terminal.draw(|frame| board.draw(frame));
    }

    /// Show the summary and keep the screen up until a key is pressed.
    ///
    /// A failed run keeps its `Failed` phase on screen.
    pub fn finish(mut self, summary: &str) -> Result<()> {
        if !matches!(self.board.phase, Phase::Failed(_)) {
            self.board.set_phase(Phase::Complete);
        }
        self.board.meter = None;
        for line in summary.lines() {
            self.board.push(line.to_string(), false);
        }
        self.board.push("Press any key to exit".to_string(), false);
        self.terminal.draw(|frame| self.board.draw(frame))?;

        loop {
            if event::poll(Duration::from_millis(100))? && matches!(event::read()?, Event::Key(_)) {
                return Ok(());
            }
        }
    }

    fn leave_screen(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = self.terminal.backend_mut().execute(LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

impl Ui for UiApp {
    fn set_phase(&mut self, phase: Phase) {
        self.board.set_phase(phase);
        self.refresh();
    }

    fn set_info(&mut self, info: impl Into<String>) {
        self.board.info = info.into();
        self.refresh();
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        self.board.meter = Some(Meter {
            done: current,
            total,
            label: label.into(),
        });
        self.refresh();
    }

    fn clear_progress(&mut self) {
        self.board.meter = None;
        self.refresh();
    }

    fn log(&mut self, message: impl Into<String>) {
        self.board.push(message.into(), false);
        self.refresh();
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.board.push(message.into(), true);
        self.refresh();
    }

    fn tally(&mut self, kind: EntityKind, nodes: u64, edges: u64, skipped: u64) {
        self.board.record(Tally {
            kind,
            nodes,
            edges,
            skipped,
        });
        self.refresh();
    }
}

impl Drop for UiApp {
    fn drop(&mut self) {
        self.leave_screen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(kind: EntityKind, nodes: u64) -> Tally {
        Tally {
            kind,
            nodes,
            edges: 0,
            skipped: 0,
        }
    }

    #[test]
    fn test_feed_keeps_newest_lines() {
        let mut board = Board::new();
        for i in 0..FEED_CAPACITY + 5 {
            board.push(format!("line {}", i), i % 2 == 0);
        }

        assert_eq!(board.feed.len(), FEED_CAPACITY);
        assert_eq!(board.feed.front().unwrap().text, "line 5");
        assert_eq!(
            board.feed.back().unwrap().text,
            format!("line {}", FEED_CAPACITY + 4)
        );
    }

    #[test]
    fn test_tally_replaced_per_type_and_reset_on_clear() {
        let mut board = Board::new();
        board.record(tally(EntityKind::University, 5));
        board.record(tally(EntityKind::Institute, 8));
        board.record(tally(EntityKind::University, 6));

        assert_eq!(board.tallies.len(), 2);
        assert_eq!(board.tallies[0], tally(EntityKind::University, 6));

        board.set_phase(Phase::Clearing);
        assert!(board.tallies.is_empty());
    }

    #[test]
    fn test_meter_ratio_is_clamped() {
        let meter = |done, total| Meter {
            done,
            total,
            label: String::new(),
        };
        assert_eq!(meter(3, 0).ratio(), 0.0);
        assert_eq!(meter(1, 4).ratio(), 0.25);
        assert_eq!(meter(9, 4).ratio(), 1.0);
    }
}
