mod clipboard;
mod editor;
mod help;
mod keys;
mod state;

use crate::cli::{build_config, read_source, Cli};
use crate::engine::{Backend, ModuleRunner, PlaygroundClient, WasmRunner};
use crate::model::{PlayEvent, DEFAULT_SOURCE};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, Event, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{palette, Effect, Palette, UiState, TAB_PLAYGROUND};
use std::path::Path;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Display width of a tab stop in the editor pane.
const TAB_WIDTH: usize = 4;

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let backend: Arc<dyn Backend> = Arc::new(PlaygroundClient::new(&cfg)?);
    let runner: Arc<dyn ModuleRunner> = Arc::new(WasmRunner::new()?);

    // stdin belongs to the terminal here, so only a real file is loaded.
    let source = match args.file.as_deref() {
        Some(p) if p != Path::new("-") => read_source(Some(p))?,
        _ => DEFAULT_SOURCE.to_string(),
    };
    let initial = UiState::new(
        &source,
        &cfg.base_url,
        cfg.target,
        args.theme,
        cfg.max_source_bytes,
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel::<PlayEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(initial, event_rx, cmd_tx));

    let res = orchestrator::run_controller(backend, runner, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    mut event_rx: UnboundedReceiver<PlayEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    // Lets Ctrl+Enter arrive as Enter with a modifier instead of Ctrl+J.
    let enhanced = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .ok();
    }

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut dirty = true;

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
            dirty = true;
        }

        if dirty || last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
            dirty = false;
        }

        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            let Ok(Event::Key(k)) = event::read() else {
                continue;
            };
            if k.kind != KeyEventKind::Press {
                continue;
            }
            let Some(action) = keys::map_key(k) else {
                continue;
            };
            dirty = true;
            match state.apply_action(action) {
                Effect::None => {}
                Effect::Send(cmd) => {
                    if cmd_tx.send(cmd).is_err() {
                        break Err(anyhow::anyhow!("controller stopped"));
                    }
                }
                Effect::Copy(text) => {
                    state.info = match clipboard::copy_to_clipboard(&text) {
                        Ok(()) => "Copied output to clipboard".into(),
                        Err(e) => format!("Clipboard copy failed: {e:#}"),
                    };
                }
                Effect::Quit => {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    let mut stdout = io::stdout();
    if enhanced {
        execute!(stdout, PopKeyboardEnhancementFlags).ok();
    }
    disable_raw_mode().ok();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let pal = palette(state.theme);
    f.render_widget(Block::default().style(pal.base), area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(4),
        ])
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Playground"), Line::from("Help")])
        .select(state.tab)
        .style(pal.base)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("goplay-cli @ {}", state.base_url)),
        )
        .highlight_style(pal.accent());
    f.render_widget(tabs, chunks[0]);

    if state.tab == TAB_PLAYGROUND {
        draw_playground(chunks[1], f, state, &pal);
    } else {
        help::draw_help(chunks[1], f, &pal);
    }
    draw_status(chunks[2], f, state, &pal);
}

fn expand_tabs(line: &str) -> String {
    line.replace('\t', &" ".repeat(TAB_WIDTH))
}

/// Screen column of char index `col` once tabs are expanded.
fn display_col(line: &str, col: usize) -> usize {
    line.chars()
        .take(col)
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

fn draw_playground(area: Rect, f: &mut ratatui::Frame, state: &UiState, pal: &Palette) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    let panes = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(cols[1]);

    // Editor
    let block = Block::default().borders(Borders::ALL).title("main.go");
    let inner = block.inner(cols[0]);
    let height = inner.height as usize;
    let top = state.editor.scroll_top(height);
    let lines: Vec<Line> = state
        .editor
        .lines()
        .iter()
        .skip(top)
        .take(height)
        .map(|l| Line::from(expand_tabs(l)))
        .collect();
    f.render_widget(Paragraph::new(lines).style(pal.base).block(block), cols[0]);

    let (row, col) = state.editor.cursor();
    let x = display_col(&state.editor.lines()[row], col);
    let y = row - top;
    if (x as u16) < inner.width && (y as u16) < inner.height {
        f.set_cursor_position((inner.x + x as u16, inner.y + y as u16));
    }

    let display = state.session.display();
    let output = Paragraph::new(display.output.as_str())
        .style(pal.base)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Output"));
    f.render_widget(output, panes[0]);

    let error = Paragraph::new(display.error.as_str())
        .style(pal.error())
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Errors"));
    f.render_widget(error, panes[1]);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState, pal: &Palette) {
    let busy = state.session.is_busy();
    let display = state.session.display();

    let mut first = vec![
        if busy {
            Span::styled("[Busy] ", pal.error())
        } else {
            Span::styled("[Ready] ", pal.accent())
        },
        Span::raw(display.status.clone()),
    ];
    if !state.info.is_empty() {
        first.push(Span::styled(format!("  {}", state.info), pal.muted()));
    }

    // Actions render dimmed while a request is in flight.
    let action_style = if busy { pal.muted() } else { pal.accent() };
    let second = Line::from(vec![
        Span::styled("^Enter", action_style),
        Span::raw(" run  "),
        Span::styled("^F", action_style),
        Span::raw(" format  "),
        Span::styled("^B", action_style),
        Span::raw(" compile  "),
        Span::raw(format!("target: {}  ", state.target.as_query_str())),
        Span::raw(format!("theme: {:?}  ", state.theme).to_lowercase()),
        Span::styled("F1", pal.accent()),
        Span::raw(" help"),
    ]);

    let p = Paragraph::new(vec![Line::from(first), second])
        .style(pal.base)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}
