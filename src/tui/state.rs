use super::editor::TextBuffer;
use super::keys::{Action, EditKey};
use crate::model::{PlayEvent, Target, Theme};
use crate::orchestrator::{Session, UiCommand};
use ratatui::style::{Color, Modifier, Style};

pub const TAB_PLAYGROUND: usize = 0;
pub const TAB_HELP: usize = 1;

pub struct UiState {
    pub tab: usize,
    pub theme: Theme,
    pub target: Target,
    /// Transient notice shown in the status bar (busy rejections, clipboard).
    pub info: String,
    pub base_url: String,
    pub editor: TextBuffer,
    pub session: Session,
}

/// Side effect the UI loop performs after an action has updated the state.
#[derive(Debug)]
pub enum Effect {
    None,
    Send(UiCommand),
    Copy(String),
    Quit,
}

impl UiState {
    pub fn new(
        source: &str,
        base_url: &str,
        target: Target,
        theme: Theme,
        max_source_bytes: usize,
    ) -> Self {
        Self {
            tab: TAB_PLAYGROUND,
            theme,
            target,
            info: String::new(),
            base_url: base_url.to_string(),
            editor: TextBuffer::new(source),
            session: Session::new(max_source_bytes),
        }
    }

    pub fn apply_action(&mut self, action: Action) -> Effect {
        match action {
            Action::Quit => return Effect::Quit,
            Action::ToggleTheme => self.theme = self.theme.toggled(),
            Action::ToggleHelp => {
                self.tab = if self.tab == TAB_HELP {
                    TAB_PLAYGROUND
                } else {
                    TAB_HELP
                };
            }
            Action::Back => self.tab = TAB_PLAYGROUND,
            Action::ToggleTarget => {
                self.target = self.target.toggled();
                self.info = format!("Target: {}", self.target.as_query_str());
            }
            Action::CopyOutput => {
                let output = &self.session.display().output;
                if output.is_empty() {
                    self.info = "Nothing to copy".into();
                } else {
                    return Effect::Copy(output.clone());
                }
            }
            Action::Submit(command) => {
                if self.session.is_busy() {
                    return Effect::None;
                }
                self.info.clear();
                let operation = command.into_operation(self.target);
                if let Some(submission) = self.session.begin(operation, &self.editor) {
                    return Effect::Send(UiCommand::Submit(submission));
                }
            }
            Action::Edit(key) => {
                if self.tab == TAB_PLAYGROUND {
                    self.edit(key);
                }
            }
        }
        Effect::None
    }

    fn edit(&mut self, key: EditKey) {
        let buf = &mut self.editor;
        match key {
            EditKey::Char(c) => buf.insert_char(c),
            EditKey::Newline => buf.insert_newline(),
            EditKey::Tab => buf.insert_tab(),
            EditKey::Backspace => buf.backspace(),
            EditKey::Delete => buf.delete(),
            EditKey::Left => buf.move_left(),
            EditKey::Right => buf.move_right(),
            EditKey::Up => buf.move_up(),
            EditKey::Down => buf.move_down(),
            EditKey::Home => buf.home(),
            EditKey::End => buf.end(),
        }
    }

    pub fn apply_event(&mut self, ev: PlayEvent) {
        match ev {
            PlayEvent::Stage { id, message } => self.session.set_stage(id, &message),
            PlayEvent::Info(info) => self.info = info.to_message(),
            PlayEvent::Completed { id, outcome } => {
                self.session.finish(id, outcome, &mut self.editor);
            }
        }
    }
}

/// Colors for one theme.
pub struct Palette {
    pub base: Style,
    pub accent: Color,
    pub error: Color,
    pub muted: Color,
}

pub fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            base: Style::default().fg(Color::Gray).bg(Color::Black),
            accent: Color::Cyan,
            error: Color::LightRed,
            muted: Color::DarkGray,
        },
        Theme::Light => Palette {
            base: Style::default().fg(Color::Black).bg(Color::White),
            accent: Color::Blue,
            error: Color::Red,
            muted: Color::Gray,
        },
    }
}

impl Palette {
    pub fn accent(&self) -> Style {
        self.base.fg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn error(&self) -> Style {
        self.base.fg(self.error)
    }

    pub fn muted(&self) -> Style {
        self.base.fg(self.muted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Command, InfoEvent, Operation, Outcome, RunResponse};
    use crate::orchestrator::Editor;

    fn state() -> UiState {
        UiState::new(
            "package main\n",
            "http://localhost:8080",
            Target::Wasm,
            Theme::Dark,
            1024,
        )
    }

    #[test]
    fn second_submit_while_busy_is_ignored() {
        let mut s = state();
        assert!(matches!(
            s.apply_action(Action::Submit(Command::Run)),
            Effect::Send(UiCommand::Submit(_))
        ));
        assert!(s.session.is_busy());
        assert!(matches!(
            s.apply_action(Action::Submit(Command::Format)),
            Effect::None
        ));
        assert_eq!(s.session.pending().map(|p| p.operation), Some(Operation::Run));
    }

    #[test]
    fn compile_uses_current_target() {
        let mut s = state();
        s.apply_action(Action::ToggleTarget);
        let Effect::Send(UiCommand::Submit(sub)) = s.apply_action(Action::Submit(Command::Compile))
        else {
            panic!("expected a submission");
        };
        assert_eq!(sub.operation, Operation::Compile(Target::Wasi));
    }

    #[test]
    fn completion_returns_to_ready() {
        let mut s = state();
        let Effect::Send(UiCommand::Submit(sub)) = s.apply_action(Action::Submit(Command::Run))
        else {
            panic!("expected a submission");
        };
        s.apply_event(PlayEvent::Completed {
            id: sub.id,
            outcome: Outcome::Ran(RunResponse {
                output: "hi\n".into(),
                error: String::new(),
            }),
        });
        assert!(!s.session.is_busy());
        assert_eq!(s.session.display().output, "hi\n");
        assert!(matches!(s.apply_action(Action::CopyOutput), Effect::Copy(t) if t == "hi\n"));
    }

    #[test]
    fn formatted_source_replaces_editor() {
        let mut s = state();
        let Effect::Send(UiCommand::Submit(sub)) = s.apply_action(Action::Submit(Command::Format))
        else {
            panic!("expected a submission");
        };
        s.apply_event(PlayEvent::Completed {
            id: sub.id,
            outcome: Outcome::Formatted("package main\n\nfunc main() {}\n".into()),
        });
        assert_eq!(s.editor.text(), "package main\n\nfunc main() {}\n");
    }

    #[test]
    fn edits_only_apply_on_playground_tab() {
        let mut s = state();
        s.apply_action(Action::ToggleHelp);
        s.apply_action(Action::Edit(EditKey::Char('x')));
        assert_eq!(s.editor.text(), "package main\n");
        s.apply_action(Action::Back);
        s.apply_action(Action::Edit(EditKey::Char('x')));
        assert_eq!(s.editor.text(), "xpackage main\n");
    }

    #[test]
    fn theme_toggle_and_busy_notice() {
        let mut s = state();
        s.apply_action(Action::ToggleTheme);
        assert_eq!(s.theme, Theme::Light);
        s.apply_action(Action::ToggleTheme);
        assert_eq!(s.theme, Theme::Dark);

        s.apply_event(PlayEvent::Info(InfoEvent::Busy {
            rejected: Operation::Run,
        }));
        assert!(s.info.starts_with("Busy"));
        assert!(matches!(s.apply_action(Action::CopyOutput), Effect::None));
        assert_eq!(s.info, "Nothing to copy");
    }
}
