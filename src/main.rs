mod app;
mod catalog;
mod cli;
mod config;
mod constants;
mod display;
mod graphics;
mod input;
mod logging;
mod navigation;
mod opener;
mod scraper;
mod theme;
mod thumbnail;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use app::{App, ThumbnailState};
use cli::OpenWith;
use config::{Config, Paths};
use display::{CliDisplayMode, DisplayMode};
use graphics::{kitty_delete_all, kitty_delete_placement, kitty_render_image};
use thumbnail::ThumbnailCache;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Catalog database path (default: platform data directory)
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  /// Thumbnail display mode: 'auto', 'kitty', 'halfblock', or 'ascii' (default: prefs, then auto-detect)
  #[arg(short, long)]
  display_mode: Option<CliDisplayMode>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate or update the catalog from a channel's video listing
  Scrape {
    /// Channel videos URL (default: prefs, then the built-in channel)
    #[arg(long)]
    channel: Option<String>,
  },
  /// Print random videos and open them
  Random {
    /// How many videos to pick
    #[arg(short = 'n', long = "count", default_value_t = 1)]
    count: usize,
    /// Where to open each pick
    #[arg(long, value_enum, default_value = "browser")]
    open: OpenWith,
  },
  /// Print every video as `title|url`, sorted by title (pipe into fzf)
  #[command(alias = "tui")]
  List,
  /// Print shell completions
  Completions { shell: clap_complete::Shell },
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(Command::Completions { shell }) = args.command {
    clap_complete::generate(shell, &mut Args::command(), env!("CARGO_PKG_NAME"), &mut std::io::stdout());
    return Ok(());
  }

  let config = Config::load();
  let paths = Paths::resolve(args.db.clone(), &config);

  // Logging failure is not fatal.
  let _guard = match logging::init(&paths.logs) {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("warning: logging disabled: {:#}", e);
      None
    }
  };
  info!(version = env!("CARGO_PKG_VERSION"), db = %paths.db.display(), "starting");

  match args.command {
    Some(Command::Scrape { channel }) => {
      let channel = channel.unwrap_or_else(|| config.channel_url());
      cli::scrape(&channel, &paths.db).await
    }
    Some(Command::Random { count, open }) => cli::random(&paths.db, count, open),
    Some(Command::List) => cli::list(&paths.db),
    Some(Command::Completions { .. }) => Ok(()),
    None => run_tui(args.display_mode, config, paths).await,
  }
}

async fn run_tui(cli_mode: Option<CliDisplayMode>, config: Config, paths: Paths) -> Result<()> {
  let cli_mode = cli_mode
    .or_else(|| config.display_mode.as_deref().map(CliDisplayMode::from_config))
    .unwrap_or(CliDisplayMode::Auto);
  let display_mode = display::resolve_display_mode(cli_mode);
  info!(mode = display_mode.label(), "display mode");

  let thumbs = ThumbnailCache::http(paths.thumbnails.clone())?;
  if let Err(e) = thumbs.ensure_dir() {
    warn!(err = %format!("{:#}", e), "thumbnail cache directory unavailable");
  }
  let mut app = App::new(paths, thumbs, config, display_mode);
  if app.connect_catalog() {
    app.shuffle();
  }

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, &mut app).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  let uses_kitty = app.display_mode == DisplayMode::Kitty;

  loop {
    app.check_pending().await;
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, app))?;

    if uses_kitty {
      sync_kitty(app)?;
    }

    if event::poll(Duration::from_millis(100))?
      && let Event::Key(key) = event::read()?
      && key.kind == KeyEventKind::Press
    {
      input::handle_key_event(app, key);
    }

    if app.should_quit {
      break;
    }
  }

  if uses_kitty {
    kitty_delete_all()?;
  }
  info!("exiting");
  Ok(())
}

/// Place the current thumbnail after the frame is drawn; re-send only when it or its area changed.
fn sync_kitty(app: &mut App) -> Result<()> {
  let shown = match (&app.thumbnail, app.gfx.thumb_area) {
    (ThumbnailState::Ready { token, image }, Some(area)) => Some((*token, image, area)),
    _ => None,
  };
  match shown {
    Some((token, image, area)) => {
      if app.gfx.last_sent != Some((token, area)) {
        kitty_render_image(image, area)?;
        app.gfx.last_sent = Some((token, area));
      }
    }
    None => {
      if app.gfx.last_sent.take().is_some() {
        kitty_delete_placement()?;
      }
    }
  }
  Ok(())
}
