use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Screen};
use crate::thumbnail::ThumbnailSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Shuffle,
  Previous,
  OpenBrowser,
  OpenFreeTube,
  CopyUrl,
  Update,
  NextTheme,
  Quit,
}

/// Key bindings per screen. The setup screen only knows build, theme and quit.
pub fn action_for(screen: Screen, key: KeyEvent) -> Option<Action> {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    return (key.code == KeyCode::Char('c')).then_some(Action::Quit);
  }
  let common = match key.code {
    KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
    KeyCode::Char('u') => Some(Action::Update),
    KeyCode::Char('t') => Some(Action::NextTheme),
    _ => None,
  };
  if common.is_some() || screen == Screen::Setup {
    return common;
  }
  match key.code {
    KeyCode::Char(' ') | KeyCode::Enter | KeyCode::Char('s') | KeyCode::Right => Some(Action::Shuffle),
    KeyCode::Char('p') | KeyCode::Left | KeyCode::Backspace => Some(Action::Previous),
    KeyCode::Char('b') => Some(Action::OpenBrowser),
    KeyCode::Char('f') => Some(Action::OpenFreeTube),
    KeyCode::Char('c') => Some(Action::CopyUrl),
    _ => None,
  }
}

pub fn handle_key_event<S: ThumbnailSource>(app: &mut App<S>, key: KeyEvent) {
  let Some(action) = action_for(app.screen, key) else { return };
  if action != Action::Quit {
    app.clear_error();
  }
  match action {
    Action::Shuffle => app.shuffle(),
    Action::Previous => app.previous(),
    Action::OpenBrowser => app.open_in_browser(),
    Action::OpenFreeTube => app.open_in_freetube(),
    Action::CopyUrl => app.copy_url(),
    Action::Update => app.start_update(),
    Action::NextTheme => app.next_theme(),
    Action::Quit => app.should_quit = true,
  }
}
