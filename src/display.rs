use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliDisplayMode {
  Auto,
  Kitty,
  Halfblock,
  Ascii,
}

impl CliDisplayMode {
  /// Parse the `display_mode` pref. Unknown values mean auto-detect.
  pub fn from_config(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "kitty" => CliDisplayMode::Kitty,
      "halfblock" | "direct" => CliDisplayMode::Halfblock,
      "ascii" => CliDisplayMode::Ascii,
      _ => CliDisplayMode::Auto,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
  Ascii,
  HalfBlock,
  Kitty,
}

impl DisplayMode {
  pub fn label(self) -> &'static str {
    match self {
      DisplayMode::Ascii => "ascii",
      DisplayMode::HalfBlock => "half-block",
      DisplayMode::Kitty => "kitty",
    }
  }

  /// Terminal rows per image row: half blocks pack two pixels into one cell.
  pub fn pixels_per_row(self) -> u32 {
    match self {
      DisplayMode::HalfBlock => 2,
      DisplayMode::Ascii | DisplayMode::Kitty => 1,
    }
  }
}

/// Pick the best mode from terminal environment variables.
///
/// Probe order: Kitty graphics > true-color half-block > ASCII
fn detect_from(term: &str, term_program: &str, colorterm: &str) -> DisplayMode {
  let term_program = term_program.to_lowercase();
  if term == "xterm-kitty" || matches!(term_program.as_str(), "kitty" | "wezterm" | "ghostty") {
    return DisplayMode::Kitty;
  }
  let colorterm = colorterm.to_lowercase();
  if colorterm == "truecolor" || colorterm == "24bit" {
    return DisplayMode::HalfBlock;
  }
  DisplayMode::Ascii
}

pub fn detect_display_mode() -> DisplayMode {
  let var = |name: &str| std::env::var(name).unwrap_or_default();
  detect_from(&var("TERM"), &var("TERM_PROGRAM"), &var("COLORTERM"))
}

pub fn resolve_display_mode(cli: CliDisplayMode) -> DisplayMode {
  match cli {
    CliDisplayMode::Auto => detect_display_mode(),
    CliDisplayMode::Kitty => DisplayMode::Kitty,
    CliDisplayMode::Halfblock => DisplayMode::HalfBlock,
    CliDisplayMode::Ascii => DisplayMode::Ascii,
  }
}
