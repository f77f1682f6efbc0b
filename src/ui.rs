use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style},
  text::{Line, Span},
  widgets::{Block, BorderType, Padding, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthChar;

use crate::app::{App, Screen, ThumbnailState};
use crate::display::DisplayMode;
use crate::graphics::{ThumbnailWidget, scale_for_cells};
use crate::theme::Theme;
use crate::thumbnail::ThumbnailSource;

// --- Helpers ---

/// Truncate to `max_width` terminal columns, appending "…" if truncated.
pub fn truncate_str(s: &str, max_width: usize) -> String {
  let width: usize = s.chars().map(|c| c.width().unwrap_or(0)).sum();
  if width <= max_width {
    return s.to_string();
  }
  let budget = max_width.saturating_sub(1);
  let mut used = 0;
  let mut out = String::new();
  for c in s.chars() {
    let w = c.width().unwrap_or(0);
    if used + w > budget {
      break;
    }
    used += w;
    out.push(c);
  }
  out.push('…');
  out
}

/// Largest 16:9 rect (in cells, which are about twice as tall as wide) centered in `area`.
fn fit_16_9(area: Rect) -> Rect {
  let mut width = area.width;
  let mut height = (u32::from(width) * 9 / 32) as u16;
  if height > area.height {
    height = area.height;
    width = ((u32::from(height) * 32 / 9) as u16).min(area.width);
  }
  Rect {
    x: area.x + (area.width - width) / 2,
    y: area.y + (area.height - height) / 2,
    width,
    height: height.max(1).min(area.height),
  }
}

// --- UI Rendering ---

pub fn ui<S: ThumbnailSource>(frame: &mut Frame, app: &mut App<S>) {
  let theme = app.theme();
  app.gfx.thumb_area = None;

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, footer_area] =
    Layout::vertical([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1), Constraint::Length(1)])
      .areas(frame.area());

  render_header(frame, theme, header_area);
  match app.screen {
    Screen::Setup => render_setup(frame, app, main_area),
    Screen::Main => render_main(frame, app, main_area),
  }
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left =
    Line::from(Span::styled(" ▶ GG Shuffle ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_setup<S: ThumbnailSource>(frame: &mut Frame, app: &App<S>, area: Rect) {
  let theme = app.theme();
  let mut text = vec![
    Line::from(""),
    Line::from(Span::styled(
      "▶  Welcome to GG Shuffle!",
      Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
    )),
    Line::from(""),
    Line::from(Span::styled("Let's build your video database first.", Style::default().fg(theme.fg))),
    Line::from(""),
  ];
  if app.is_updating() {
    text.push(Line::from(Span::styled(
      "Building… this may take a few minutes.",
      Style::default().fg(theme.status),
    )));
  } else {
    text.push(Line::from(vec![
      Span::styled("Press ", Style::default().fg(theme.muted)),
      Span::styled(" u ", Style::default().fg(theme.key_fg).bg(theme.key_bg)),
      Span::styled(" to build the database.", Style::default().fg(theme.muted)),
    ]));
  }
  text.push(Line::from(""));
  text.push(Line::from(Span::styled(
    truncate_str(&app.paths.db.display().to_string(), area.width.saturating_sub(4) as usize),
    Style::default().fg(theme.muted),
  )));

  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
    Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border)),
  );
  frame.render_widget(paragraph, area);
}

fn render_main<S: ThumbnailSource>(frame: &mut Frame, app: &mut App<S>, area: Rect) {
  let [thumb_col, info_area] = Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)]).areas(area);
  render_thumbnail(frame, app, thumb_col);
  render_details(frame, app, info_area);
}

fn render_thumbnail<S: ThumbnailSource>(frame: &mut Frame, app: &mut App<S>, area: Rect) {
  let theme = app.theme();
  let block = Block::bordered()
    .title(Span::styled(format!(" {} ", app.display_mode.label()), Style::default().fg(theme.muted)))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border));
  let inner = block.inner(area);
  frame.render_widget(block, area);
  if inner.is_empty() {
    return;
  }
  let thumb_area = fit_16_9(inner);

  let placeholder = match &app.thumbnail {
    ThumbnailState::Ready { .. } => None,
    ThumbnailState::Loading => Some("Loading thumbnail…"),
    ThumbnailState::Unavailable => Some("No thumbnail available"),
    ThumbnailState::Empty => Some(""),
  };
  if let Some(label) = placeholder {
    let rows = thumb_area.height.saturating_sub(1) / 2;
    let mut lines = vec![Line::from(""); rows as usize];
    lines.push(Line::from(Span::styled(label, Style::default().fg(theme.muted))));
    frame.render_widget(
      Paragraph::new(lines).alignment(Alignment::Center).style(Style::default().bg(theme.placeholder)),
      thumb_area,
    );
    return;
  }

  if app.display_mode == DisplayMode::Kitty {
    app.gfx.thumb_area = Some(thumb_area);
    return;
  }

  let ThumbnailState::Ready { token, image } = &app.thumbnail else { return };
  let needs_resize = match &app.gfx.resized_thumb {
    Some((t, w, h, _)) => t != token || *w != thumb_area.width || *h != thumb_area.height,
    None => true,
  };
  if needs_resize {
    let scaled = scale_for_cells(image, thumb_area.width, thumb_area.height, app.display_mode);
    app.gfx.resized_thumb = Some((*token, thumb_area.width, thumb_area.height, scaled));
  }
  if let Some((_, _, _, scaled)) = &app.gfx.resized_thumb {
    frame.render_widget(ThumbnailWidget { image: scaled, display_mode: app.display_mode }, thumb_area);
  }
}

fn render_details<S: ThumbnailSource>(frame: &mut Frame, app: &App<S>, area: Rect) {
  let theme = app.theme();
  let block = Block::bordered()
    .title(Span::styled(" Now Showing ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border))
    .padding(Padding::horizontal(1));

  let Some(record) = &app.current else {
    let hint = Paragraph::new(vec![
      Line::from(""),
      Line::from(Span::styled("Press Space to shuffle.", Style::default().fg(theme.muted))),
    ])
    .block(block);
    frame.render_widget(hint, area);
    return;
  };

  let inner_w = area.width.saturating_sub(4) as usize;
  let field = |label: &'static str, value: String, style: Style| {
    Line::from(vec![
      Span::styled(label, Style::default().fg(theme.muted)),
      Span::styled(truncate_str(&value, inner_w.saturating_sub(label.len())), style),
    ])
  };

  let lines = vec![
    Line::from(Span::styled(record.display_title(), Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled(record.stats_text(), Style::default().fg(theme.status))),
    Line::from(""),
    field("URL       ", record.url.clone(), Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED)),
    field("ID        ", record.id.clone(), Style::default().fg(theme.fg)),
    field("FreeTube  ", record.freetube_url(), Style::default().fg(theme.muted)),
    Line::from(""),
    Line::from(Span::styled(record.description_text(), Style::default().fg(theme.fg))),
  ];
  frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }).block(block), area);
}

fn render_status<S: ThumbnailSource>(frame: &mut Frame, app: &App<S>, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(theme.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ℹ  {}", info), Style::default().fg(theme.muted))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer<S: ThumbnailSource>(frame: &mut Frame, app: &App<S>, area: Rect) {
  let theme = app.theme();
  let update_label = if app.screen == Screen::Setup { "Build DB" } else { "Update DB" };
  let keys: Vec<(&str, &str)> = match app.screen {
    Screen::Setup => vec![("u", update_label), ("t", "Theme"), ("q", "Quit")],
    Screen::Main => {
      let mut k = vec![("Space", "Shuffle")];
      if app.can_go_back() {
        k.push(("p", "Previous"));
      }
      k.extend([("b", "Browser"), ("f", "FreeTube"), ("c", "Copy URL"), ("u", update_label), ("t", "Theme")]);
      k.push(("q", "Quit"));
      k
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw(" "));
      }
      s
    })
    .collect();
  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}
