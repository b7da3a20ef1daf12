// Input capture: the single editable command line.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Enter on a non-empty line. The buffer is already cleared.
    Submit(String),
    CancelPending,
    Quit,
    Edited,
    Ignored,
}

#[derive(Debug, Default)]
pub struct InputLine {
    buf: String,
}

impl InputLine {
    pub fn value(&self) -> &str {
        &self.buf
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        if key.kind == KeyEventKind::Release {
            return InputAction::Ignored;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter if self.buf.is_empty() => InputAction::Ignored,
            KeyCode::Enter => InputAction::Submit(std::mem::take(&mut self.buf)),
            KeyCode::Char('c') | KeyCode::Char('d') if ctrl => InputAction::Quit,
            KeyCode::Char(_) if ctrl => InputAction::Ignored,
            KeyCode::Char(c) => {
                self.buf.push(c);
                InputAction::Edited
            }
            KeyCode::Backspace => match self.buf.pop() {
                Some(_) => InputAction::Edited,
                None => InputAction::Ignored,
            },
            KeyCode::Esc => InputAction::CancelPending,
            _ => InputAction::Ignored,
        }
    }
}
