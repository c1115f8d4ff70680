use crate::model::Command;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a key press asks the UI to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Submit(Command),
    ToggleTarget,
    ToggleTheme,
    CopyOutput,
    ToggleHelp,
    Back,
    Quit,
    Edit(EditKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Char(char),
    Newline,
    Tab,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
}

/// Map a key press to an action. Returns `None` for keys the UI ignores.
pub fn map_key(k: KeyEvent) -> Option<Action> {
    // Cmd arrives as SUPER on terminals that report it.
    let chord = k
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER);

    let action = match k.code {
        KeyCode::Enter if chord => Action::Submit(Command::Run),
        // Without keyboard enhancement most terminals send Ctrl+Enter as Ctrl+J.
        KeyCode::Char('j') if chord => Action::Submit(Command::Run),
        KeyCode::F(5) => Action::Submit(Command::Run),
        KeyCode::Char('f') if chord => Action::Submit(Command::Format),
        KeyCode::Char('b') if chord => Action::Submit(Command::Compile),
        KeyCode::Char('t') if chord => Action::ToggleTarget,
        KeyCode::Char('y') if chord => Action::CopyOutput,
        KeyCode::Char('c') | KeyCode::Char('q') if chord => Action::Quit,
        KeyCode::Char(_) if chord => return None,
        KeyCode::F(2) => Action::ToggleTheme,
        KeyCode::F(1) => Action::ToggleHelp,
        KeyCode::Esc => Action::Back,
        KeyCode::Char(c) => Action::Edit(EditKey::Char(c)),
        KeyCode::Enter => Action::Edit(EditKey::Newline),
        KeyCode::Tab => Action::Edit(EditKey::Tab),
        KeyCode::Backspace => Action::Edit(EditKey::Backspace),
        KeyCode::Delete => Action::Edit(EditKey::Delete),
        KeyCode::Left => Action::Edit(EditKey::Left),
        KeyCode::Right => Action::Edit(EditKey::Right),
        KeyCode::Up => Action::Edit(EditKey::Up),
        KeyCode::Down => Action::Edit(EditKey::Down),
        KeyCode::Home => Action::Edit(EditKey::Home),
        KeyCode::End => Action::Edit(EditKey::End),
        _ => return None,
    };
    Some(action)
}
