use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
  /// Fill for the thumbnail frame while nothing is shown.
  pub placeholder: Color,
}

pub static THEMES: [Theme; 3] = [
  Theme {
    name: "Midnight",
    bg: Color::Rgb(30, 31, 34),
    fg: Color::Rgb(230, 232, 235),
    accent: Color::Rgb(0, 122, 204),
    muted: Color::Rgb(142, 146, 151),
    border: Color::Rgb(58, 61, 66),
    status: Color::Rgb(185, 187, 190),
    error: Color::Rgb(237, 66, 69),
    key_fg: Color::Rgb(230, 232, 235),
    key_bg: Color::Rgb(43, 45, 49),
    placeholder: Color::Rgb(43, 45, 49),
  },
  Theme {
    name: "Grump Orange",
    bg: Color::Rgb(28, 22, 18),
    fg: Color::Rgb(245, 236, 225),
    accent: Color::Rgb(255, 140, 0),
    muted: Color::Rgb(170, 150, 130),
    border: Color::Rgb(90, 70, 50),
    status: Color::Rgb(255, 200, 120),
    error: Color::Rgb(255, 85, 85),
    key_fg: Color::Rgb(28, 22, 18),
    key_bg: Color::Rgb(255, 140, 0),
    placeholder: Color::Rgb(50, 40, 32),
  },
  Theme {
    name: "Nord",
    bg: Color::Rgb(46, 52, 64),
    fg: Color::Rgb(236, 239, 244),
    accent: Color::Rgb(136, 192, 208),
    muted: Color::Rgb(129, 161, 193),
    border: Color::Rgb(76, 86, 106),
    status: Color::Rgb(163, 190, 140),
    error: Color::Rgb(191, 97, 106),
    key_fg: Color::Rgb(46, 52, 64),
    key_bg: Color::Rgb(136, 192, 208),
    placeholder: Color::Rgb(59, 66, 82),
  },
];

/// Index of the theme called `name`, or the first theme.
pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name == n)).unwrap_or(0)
}
