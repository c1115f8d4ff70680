use super::state::Palette;
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

const KEYBINDS: &[(&str, &str)] = &[
    ("Ctrl-Enter / F5", "Run on the backend"),
    ("Ctrl-F", "Format source (gofmt)"),
    ("Ctrl-B", "Compile to the selected target and execute"),
    ("Ctrl-T", "Toggle target (wasm / wasi)"),
    ("Ctrl-Y", "Copy output to clipboard"),
    ("F2", "Toggle theme"),
    ("F1", "Show / hide this help"),
    ("Esc", "Back to the playground"),
    ("Ctrl-C / Ctrl-Q", "Quit"),
];

pub fn draw_help(area: Rect, f: &mut Frame, palette: &Palette) {
    let mut lines = vec![Line::from("Keybinds:")];
    for (keys, what) in KEYBINDS {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{keys:<18}"), palette.accent()),
            Span::raw(*what),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(
        "Actions are disabled while a request is in flight.",
    ));
    lines.push(Line::from(
        "wasi modules are compiled but not executed; a WASI runtime is not bundled.",
    ));

    let p = Paragraph::new(lines)
        .style(palette.base)
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
