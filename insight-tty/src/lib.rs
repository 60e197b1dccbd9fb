use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use insight_core::{
    OutlineRow, PageRef, PreviewConfig, Session, SessionController, SessionHandle, SessionRuntime,
};
use insight_extract::HttpOutlineExtractor;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const INDENT_WIDTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Plain,
    Heading,
    Status,
    Error,
    Row { hovered: bool, clickable: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarLine {
    pub text: String,
    pub style: LineStyle,
}

impl SidebarLine {
    fn new(text: impl Into<String>, style: LineStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// Projects the session onto sidebar lines, each cut to `width` columns.
pub fn sidebar_lines(session: &Session, width: usize) -> Vec<SidebarLine> {
    let mut lines = Vec::new();

    match session.file_name() {
        Some(name) => lines.push(SidebarLine::new(
            format!("Selected: {name}"),
            LineStyle::Plain,
        )),
        None => lines.push(SidebarLine::new("No document selected", LineStyle::Status)),
    }

    if session.uploading {
        lines.push(SidebarLine::new("Processing PDF...", LineStyle::Status));
    } else if session.document_url.is_some() && !session.viewer_ready {
        lines.push(SidebarLine::new("Loading preview...", LineStyle::Status));
    }

    if let Some(message) = session.error_message() {
        lines.push(SidebarLine::new(message, LineStyle::Error));
    }

    if let Some(outline) = session.outline.as_ref() {
        let heading = match session.total_pages {
            Some(total) => format!("Outline (Total pages: {total})"),
            None => "Outline".to_string(),
        };
        lines.push(SidebarLine::new(heading, LineStyle::Heading));
        if let Some(page) = session.current_page {
            lines.push(SidebarLine::new(format!("Page {page}"), LineStyle::Status));
        }
        if outline.is_empty() {
            lines.push(SidebarLine::new("No headings found", LineStyle::Status));
        }

        let rows = session.outline_rows();
        for row in &rows {
            lines.push(SidebarLine::new(
                row_label(row),
                LineStyle::Row {
                    hovered: row.hovered,
                    clickable: row.clickable,
                },
            ));
        }
        if let Some(row) = rows.iter().find(|row| row.hovered) {
            lines.push(SidebarLine::new(row.tooltip(), LineStyle::Status));
        }
    }

    for line in &mut lines {
        line.text = truncate(&line.text, width);
    }
    lines
}

fn row_label(row: &OutlineRow) -> String {
    format!(
        "{}{} ({})",
        " ".repeat(row.indent * INDENT_WIDTH),
        row.text,
        row.page
    )
}

fn truncate(text: &str, width: usize) -> String {
    if width == 0 || text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub struct SidebarRenderer<W: Write> {
    writer: W,
}

impl<W: Write> SidebarRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Draws `lines` top-down starting at `(column, row)` inside one
    /// synchronized update.
    pub fn draw(&mut self, lines: &[SidebarLine], column: u16, row: u16) -> Result<()> {
        self.begin_sync_update()?;
        for (offset, line) in lines.iter().enumerate() {
            let offset = u16::try_from(offset).context("sidebar taller than the terminal")?;
            queue!(
                self.writer,
                cursor::MoveTo(column, row.saturating_add(offset)),
                Clear(ClearType::UntilNewLine)
            )?;
            self.apply_style(line.style)?;
            queue!(
                self.writer,
                Print(&line.text),
                SetAttribute(Attribute::Reset),
                ResetColor
            )?;
        }
        self.end_sync_update()
    }

    fn apply_style(&mut self, style: LineStyle) -> Result<()> {
        match style {
            LineStyle::Plain => {}
            LineStyle::Heading => queue!(self.writer, SetAttribute(Attribute::Bold))?,
            LineStyle::Status => queue!(self.writer, SetAttribute(Attribute::Italic))?,
            LineStyle::Error => queue!(self.writer, SetForegroundColor(Color::Red))?,
            LineStyle::Row { hovered, clickable } => {
                if !clickable {
                    queue!(
                        self.writer,
                        SetAttribute(Attribute::Dim),
                        SetAttribute(Attribute::CrossedOut)
                    )?;
                }
                if hovered {
                    queue!(self.writer, SetAttribute(Attribute::Reverse))?;
                }
            }
        }
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends the synchronized update so the terminal paints everything at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    MoveHover { direction: Direction, count: usize },
    Activate,
    Remove,
    Quit,
    None,
}

/// Maps key events to sidebar events. A numeric prefix repeats hover moves.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };

        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => UiEvent::MoveHover {
                direction: Direction::Up,
                count: self.take_count(),
            },
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => UiEvent::MoveHover {
                direction: Direction::Down,
                count: self.take_count(),
            },
            (KeyCode::Enter, _) | (KeyCode::Char(' '), _) => {
                self.reset_count();
                UiEvent::Activate
            }
            (KeyCode::Char('x'), _) | (KeyCode::Delete, _) => {
                self.reset_count();
                UiEvent::Remove
            }
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => UiEvent::Quit,
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    pub fn pending_input(&self) -> Option<String> {
        self.pending_count.map(|count| count.to_string())
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
    }

    fn take_count(&mut self) -> usize {
        self.pending_count.take().unwrap_or(1).max(1)
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
    }
}

/// What a UI event asks of the session, resolved against its current state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    Hover(Option<usize>),
    Navigate(PageRef),
    Remove,
    Quit,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Quit,
}

pub fn resolve(event: UiEvent, session: &Session) -> Intent {
    match event {
        UiEvent::MoveHover { direction, count } => {
            let rows = session.outline_rows();
            let target = step_hover(&rows, session.hover_index, direction, count);
            if target == session.hover_index {
                Intent::Nothing
            } else {
                Intent::Hover(target)
            }
        }
        UiEvent::Activate => session
            .outline_rows()
            .into_iter()
            .find(|row| row.hovered && row.clickable)
            .map(|row| Intent::Navigate(row.page))
            .unwrap_or(Intent::Nothing),
        UiEvent::Remove if session.is_active() => Intent::Remove,
        UiEvent::Remove => Intent::Nothing,
        UiEvent::Quit => Intent::Quit,
        UiEvent::None => Intent::Nothing,
    }
}

/// Moves the hover `count` clickable rows in `direction`, stopping at the
/// ends. Without a clickable hover the first (or last) clickable row is taken.
fn step_hover(
    rows: &[OutlineRow],
    current: Option<usize>,
    direction: Direction,
    count: usize,
) -> Option<usize> {
    let clickable: Vec<usize> = rows
        .iter()
        .filter(|row| row.clickable)
        .map(|row| row.index)
        .collect();
    let last = clickable.len().checked_sub(1)?;

    let position = match current.and_then(|index| clickable.iter().position(|&i| i == index)) {
        Some(position) => match direction {
            Direction::Up => position.saturating_sub(count),
            Direction::Down => position.saturating_add(count).min(last),
        },
        None => match direction {
            Direction::Up => last,
            Direction::Down => 0,
        },
    };
    clickable.get(position).copied()
}

pub fn dispatch(event: UiEvent, session: &Session, handle: &SessionHandle) -> LoopAction {
    let intent = resolve(event, session);
    if intent != Intent::Nothing {
        debug!(?intent, "dispatching sidebar event");
    }
    match intent {
        Intent::Hover(index) => handle.set_hover(index),
        Intent::Navigate(page) => handle.request_navigation(page),
        Intent::Remove => handle.remove_document(),
        Intent::Quit => return LoopAction::Quit,
        Intent::Nothing => {}
    }
    LoopAction::Continue
}

/// Wires the HTTP extraction client and the pdfium viewer into a session.
/// The runtime still has to be spawned on a tokio runtime.
pub fn build_session(config: &PreviewConfig) -> Result<(SessionRuntime, SessionHandle)> {
    let extractor = HttpOutlineExtractor::new(config)?;
    let viewer = insight_viewer::pdfium_viewer(&config.viewer);
    Ok(SessionRuntime::with_controller(
        SessionController::from_config(&config.viewer),
        Arc::new(extractor),
        Arc::new(viewer),
    ))
}

/// Same as [`build_session`] with the configuration from `insight.toml`.
pub fn open_session() -> Result<(SessionRuntime, SessionHandle)> {
    build_session(&PreviewConfig::load_or_default()?)
}

/// Installs the global subscriber: `RUST_LOG` filtering (default `info`), a
/// plain-text `insight.log` in `log_dir` and a console layer.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "insight.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
