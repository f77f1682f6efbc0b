use anyhow::Result;
use image::DynamicImage;
use ratatui::layout::Rect;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, CatalogRecord};
use crate::config::{Config, Paths};
use crate::constants::constants;
use crate::display::DisplayMode;
use crate::navigation::Navigator;
use crate::opener;
use crate::scraper::{ScrapeProgress, ScrapeSummary, scrape_channel};
use crate::theme::{THEMES, Theme, theme_index};
use crate::thumbnail::{HttpSource, Thumbnail, ThumbnailCache, ThumbnailDelivery, ThumbnailSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
  /// No usable catalog yet: offer to build one.
  Setup,
  Main,
}

/// What the thumbnail frame currently shows.
#[derive(Debug, Default)]
pub enum ThumbnailState {
  #[default]
  Empty,
  Loading,
  Ready { token: u64, image: DynamicImage },
  Unavailable,
}

/// Terminal graphics protocol rendering state (Kitty).
#[derive(Default)]
pub struct GraphicsCache {
  pub thumb_area: Option<Rect>,
  pub last_sent: Option<(u64, Rect)>,
  pub resized_thumb: Option<(u64, u16, u16, DynamicImage)>,
}

/// A catalog build/update running in the background.
struct ScrapeTask {
  progress_rx: mpsc::UnboundedReceiver<ScrapeProgress>,
  handle: JoinHandle<Result<ScrapeSummary>>,
}

pub struct App<S = HttpSource> {
  pub paths: Paths,
  pub display_mode: DisplayMode,
  pub theme_index: usize,
  pub screen: Screen,
  pub current: Option<CatalogRecord>,
  pub thumbnail: ThumbnailState,
  pub status_message: Option<String>,
  /// Informational message, shown when there is no status or error.
  pub info_message: Option<String>,
  pub last_error: Option<String>,
  pub should_quit: bool,
  pub gfx: GraphicsCache,
  config: Config,
  catalog: Option<Catalog>,
  nav: Navigator,
  thumbs: ThumbnailCache<S>,
  thumb_tx: mpsc::UnboundedSender<ThumbnailDelivery>,
  thumb_rx: mpsc::UnboundedReceiver<ThumbnailDelivery>,
  next_token: u64,
  /// Token of the only request whose result may still be applied.
  pending_token: Option<u64>,
  scrape: Option<ScrapeTask>,
  error_time: Option<Instant>,
}

impl<S: ThumbnailSource> App<S> {
  pub fn new(paths: Paths, thumbs: ThumbnailCache<S>, config: Config, display_mode: DisplayMode) -> Self {
    let (thumb_tx, thumb_rx) = mpsc::unbounded_channel();
    Self {
      paths,
      display_mode,
      theme_index: theme_index(config.theme_name.as_deref()),
      screen: Screen::Setup,
      current: None,
      thumbnail: ThumbnailState::Empty,
      status_message: None,
      info_message: None,
      last_error: None,
      should_quit: false,
      gfx: GraphicsCache::default(),
      config,
      catalog: None,
      nav: Navigator::default(),
      thumbs,
      thumb_tx,
      thumb_rx,
      next_token: 0,
      pending_token: None,
      scrape: None,
      error_time: None,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    &THEMES[self.theme_index]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.config.theme_name = Some(self.theme().name.to_string());
    self.config.save();
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    warn!(err = %msg, "shown to user");
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after the configured display time.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(constants().error_display_secs)
    {
      self.clear_error();
    }
  }

  pub fn can_go_back(&self) -> bool {
    self.nav.can_go_back()
  }

  pub fn is_updating(&self) -> bool {
    self.scrape.is_some()
  }

  // --- Catalog state ---

  /// Open the catalog file if it exists. Never creates one: a missing file means setup is needed.
  pub fn connect_catalog(&mut self) -> bool {
    if !self.paths.db.exists() {
      info!(db = %self.paths.db.display(), "catalog missing");
      self.info_message = Some("Database not found - press u to build it".to_string());
      self.screen = Screen::Setup;
      return false;
    }
    match Catalog::open(&self.paths.db) {
      Ok(catalog) => self.attach_catalog(catalog),
      Err(e) => {
        error!(err = %format!("{:#}", e), "failed to open catalog");
        self.set_error(format!("Database error: {:#}", e));
        self.screen = Screen::Setup;
        false
      }
    }
  }

  /// Use `catalog` if it has any videos, otherwise stay on the setup screen.
  pub fn attach_catalog(&mut self, catalog: Catalog) -> bool {
    match catalog.count() {
      Ok(0) => {
        self.info_message = Some("Database is empty - press u to build it".to_string());
        self.catalog = None;
        self.screen = Screen::Setup;
        false
      }
      Ok(count) => {
        info!(count, "catalog ready");
        self.info_message = Some(format!("Ready - {} videos in database", count));
        self.catalog = Some(catalog);
        self.screen = Screen::Main;
        true
      }
      Err(e) => {
        self.set_error(format!("Database error: {:#}", e));
        self.catalog = None;
        self.screen = Screen::Setup;
        false
      }
    }
  }

  // --- Navigation ---

  pub fn shuffle(&mut self) {
    let Some(catalog) = self.catalog.as_ref() else { return };
    match self.nav.shuffle(|| catalog.random()) {
      Ok(Some(record)) => self.show(record),
      Ok(None) => {
        warn!("catalog has no videos left");
        self.info_message = Some("Database is empty - press u to build it".to_string());
        self.catalog = None;
        self.current = None;
        self.pending_token = None;
        self.thumbnail = ThumbnailState::Empty;
        self.screen = Screen::Setup;
      }
      Err(e) => self.set_error(format!("Error loading video: {:#}", e)),
    }
  }

  pub fn previous(&mut self) {
    let Some(catalog) = self.catalog.as_ref() else { return };
    match self.nav.back(|id| catalog.get(id)) {
      Ok(Some(record)) => self.show(record),
      Ok(None) => {}
      Err(e) => self.set_error(format!("Error loading previous video: {:#}", e)),
    }
  }

  fn show(&mut self, record: CatalogRecord) {
    self.next_token += 1;
    let token = self.next_token;
    debug!(video_id = %record.id, token, "requesting thumbnail");
    self.pending_token = Some(token);
    self.thumbnail = ThumbnailState::Loading;
    self.gfx.resized_thumb = None;
    // The task runs detached; its result comes back through thumb_rx.
    let _ = self.thumbs.resolve(token, &record.id, &self.thumb_tx);
    self.current = Some(record);
  }

  /// Apply a finished lookup if it belongs to the item on screen. Returns whether it was applied.
  pub fn apply_thumbnail(&mut self, delivery: ThumbnailDelivery) -> bool {
    if self.pending_token != Some(delivery.token) {
      debug!(video_id = %delivery.video_id, token = delivery.token, "discarding stale thumbnail");
      return false;
    }
    self.pending_token = None;
    self.thumbnail = match delivery.thumbnail {
      Thumbnail::Image(image) => ThumbnailState::Ready { token: delivery.token, image },
      Thumbnail::Unavailable => ThumbnailState::Unavailable,
    };
    true
  }

  // --- Background work ---

  pub async fn check_pending(&mut self) {
    while let Ok(delivery) = self.thumb_rx.try_recv() {
      self.apply_thumbnail(delivery);
    }

    let Some(task) = self.scrape.as_mut() else { return };
    while let Ok(event) = task.progress_rx.try_recv() {
      self.status_message = Some(match event {
        ScrapeProgress::Listed(total) => format!("Found {} videos, fetching details…", total),
        ScrapeProgress::Stored { done, total } => format!("Updating database… {}/{} videos", done, total),
      });
    }
    if !task.handle.is_finished() {
      return;
    }
    let Some(task) = self.scrape.take() else { return };
    self.status_message = None;
    match task.handle.await {
      Ok(Ok(summary)) => self.finish_update(summary),
      Ok(Err(e)) => self.set_error(format!("Update failed: {:#}", e)),
      Err(e) => self.set_error(format!("Update task failed: {}", e)),
    }
  }

  fn finish_update(&mut self, summary: ScrapeSummary) {
    info!(stored = summary.stored, total = summary.total, "catalog update finished");
    if self.catalog.is_none() {
      if self.connect_catalog() {
        self.shuffle();
      }
      return;
    }
    self.info_message = Some(format!("Database updated - {} videos available", summary.total));
  }

  /// Build or refresh the catalog from the configured channel in the background.
  pub fn start_update(&mut self) {
    if self.scrape.is_some() {
      return;
    }
    let channel = self.config.channel_url();
    let db = self.paths.db.clone();
    info!(channel = %channel, "catalog update requested");
    self.clear_error();
    self.status_message = Some(if self.catalog.is_some() {
      "Updating database…".to_string()
    } else {
      "Building database - this may take a few minutes…".to_string()
    });

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move { scrape_channel(&channel, &db, Some(progress_tx)).await });
    self.scrape = Some(ScrapeTask { progress_rx, handle });
  }

  // --- External viewers ---

  fn current_url(&self) -> Option<String> {
    self.current.as_ref().map(|r| r.url.clone()).filter(|u| !u.is_empty())
  }

  pub fn open_in_browser(&mut self) {
    let Some(url) = self.current_url() else { return };
    if let Err(e) = opener::open_url(&url) {
      self.set_error(format!("Failed to open browser: {:#}", e));
    }
  }

  pub fn open_in_freetube(&mut self) {
    let Some(record) = self.current.as_ref().filter(|r| !r.url.is_empty()) else { return };
    let url = record.freetube_url();
    if let Err(e) = opener::open_url(&url) {
      self.set_error(format!("Failed to open FreeTube: {:#}", e));
    }
  }

  pub fn copy_url(&mut self) {
    let Some(url) = self.current_url() else { return };
    match opener::copy_to_clipboard(&url) {
      Ok(()) => self.info_message = Some("URL copied to clipboard".to_string()),
      Err(e) => self.set_error(format!("Copy failed: {:#}", e)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use anyhow::anyhow;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct NoNetwork {
    calls: AtomicUsize,
  }

  impl ThumbnailSource for NoNetwork {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Err(anyhow!("offline"))
    }
  }

  fn record(id: &str) -> CatalogRecord {
    CatalogRecord {
      id: id.to_string(),
      title: format!("Ep {}", id),
      url: format!("https://www.youtube.com/watch?v={}", id),
      ..Default::default()
    }
  }

  fn app_with(ids: &[&str]) -> (tempfile::TempDir, App<NoNetwork>) {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths {
      db: dir.path().join("catalog.db"),
      thumbnails: dir.path().join("thumbs"),
      logs: dir.path().join("logs"),
    };
    let thumbs = ThumbnailCache::new(paths.thumbnails.clone(), NoNetwork { calls: AtomicUsize::new(0) });
    let mut app = App::new(paths, thumbs, Config::default(), DisplayMode::Ascii);
    let catalog = Catalog::open_in_memory().unwrap();
    for id in ids {
      catalog.upsert(&record(id)).unwrap();
    }
    app.attach_catalog(catalog);
    (dir, app)
  }

  fn image_delivery(token: u64, video_id: &str) -> ThumbnailDelivery {
    ThumbnailDelivery {
      token,
      video_id: video_id.to_string(),
      thumbnail: Thumbnail::Image(DynamicImage::new_rgb8(4, 4)),
    }
  }

  #[tokio::test]
  async fn empty_catalog_stays_on_setup_screen() {
    let (_dir, mut app) = app_with(&[]);
    assert_eq!(app.screen, Screen::Setup);
    app.shuffle();
    assert!(app.current.is_none());
  }

  #[tokio::test]
  async fn missing_database_file_needs_setup() {
    let (_dir, mut app) = app_with(&[]);
    assert!(!app.connect_catalog());
    assert!(!app.paths.db.exists());
    assert_eq!(app.screen, Screen::Setup);
  }

  #[tokio::test]
  async fn shuffle_shows_record_and_starts_loading() {
    let (_dir, mut app) = app_with(&["abc123"]);
    assert_eq!(app.screen, Screen::Main);
    app.shuffle();
    assert_eq!(app.current.as_ref().map(|r| r.id.as_str()), Some("abc123"));
    assert!(matches!(app.thumbnail, ThumbnailState::Loading));
    assert!(!app.can_go_back());
  }

  #[tokio::test]
  async fn stale_thumbnail_is_discarded() {
    let (_dir, mut app) = app_with(&["a", "b"]);
    app.shuffle();
    app.shuffle();
    // Two requests went out (tokens 1 and 2); only the latest may land.
    assert!(!app.apply_thumbnail(image_delivery(1, "a")));
    assert!(matches!(app.thumbnail, ThumbnailState::Loading));
    assert!(app.apply_thumbnail(image_delivery(2, "b")));
    assert!(matches!(app.thumbnail, ThumbnailState::Ready { token: 2, .. }));
    // A duplicate of an applied result is stale too.
    assert!(!app.apply_thumbnail(image_delivery(2, "b")));
  }

  #[tokio::test]
  async fn unavailable_thumbnail_reaches_the_ui() {
    let (_dir, mut app) = app_with(&["offline"]);
    app.shuffle();
    let deadline = Instant::now() + Duration::from_secs(5);
    while matches!(app.thumbnail, ThumbnailState::Loading) && Instant::now() < deadline {
      tokio::time::sleep(Duration::from_millis(10)).await;
      app.check_pending().await;
    }
    assert!(matches!(app.thumbnail, ThumbnailState::Unavailable));
    assert!(app.last_error.is_none());
  }

  #[tokio::test]
  async fn previous_returns_to_last_record() {
    let (_dir, mut app) = app_with(&["only"]);
    app.shuffle();
    app.shuffle();
    assert!(app.can_go_back());
    app.previous();
    assert_eq!(app.current.as_ref().map(|r| r.id.as_str()), Some("only"));
    assert!(!app.can_go_back());
    // Nothing left: a no-op, not an error.
    app.previous();
    assert!(app.last_error.is_none());
  }

  #[tokio::test]
  async fn previous_to_deleted_record_reports_error() {
    let (_dir, mut app) = app_with(&["gone", "kept"]);
    app.nav.shuffle(|| Ok(Some(record("gone")))).unwrap();
    app.nav.shuffle(|| Ok(Some(record("kept")))).unwrap();
    let catalog = Catalog::open_in_memory().unwrap();
    catalog.upsert(&record("kept")).unwrap();
    app.attach_catalog(catalog);

    app.previous();
    assert!(app.last_error.as_deref().is_some_and(|e| e.contains("gone")));
    assert!(!app.can_go_back());
  }

  #[tokio::test]
  async fn viewer_actions_without_current_are_noops() {
    let (_dir, mut app) = app_with(&["a"]);
    app.open_in_browser();
    app.open_in_freetube();
    app.copy_url();
    assert!(app.last_error.is_none());
    assert!(app.info_message.as_deref().is_some_and(|m| m.starts_with("Ready")));
  }

  #[tokio::test]
  async fn emptied_catalog_returns_to_setup() {
    let (_dir, mut app) = app_with(&["a"]);
    app.shuffle();
    assert!(app.current.is_some());

    app.catalog = Some(Catalog::open_in_memory().unwrap());
    app.shuffle();
    assert_eq!(app.screen, Screen::Setup);
    assert!(app.catalog.is_none() && app.current.is_none());
    assert!(matches!(app.thumbnail, ThumbnailState::Empty));
    assert!(app.info_message.as_deref().is_some_and(|m| m.contains("press u")));
  }

  #[tokio::test]
  async fn finished_first_build_switches_to_main_and_shuffles() {
    let (_dir, mut app) = app_with(&[]);
    assert_eq!(app.screen, Screen::Setup);

    let db = app.paths.db.clone();
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
      progress_tx.send(ScrapeProgress::Listed(2)).unwrap();
      let catalog = Catalog::open(&db)?;
      for id in ["x1", "x2"] {
        catalog.upsert(&record(id))?;
      }
      progress_tx.send(ScrapeProgress::Stored { done: 2, total: 2 }).unwrap();
      Ok::<_, anyhow::Error>(ScrapeSummary { listed: 2, stored: 2, total: catalog.count()? })
    });
    app.scrape = Some(ScrapeTask { progress_rx, handle });
    assert!(app.is_updating());

    let deadline = Instant::now() + Duration::from_secs(5);
    while app.is_updating() && Instant::now() < deadline {
      tokio::time::sleep(Duration::from_millis(10)).await;
      app.check_pending().await;
    }
    assert!(!app.is_updating());
    assert!(app.status_message.is_none());
    assert!(app.last_error.is_none());
    assert_eq!(app.screen, Screen::Main);
    assert!(app.current.as_ref().is_some_and(|r| r.id.starts_with('x')));
    assert!(matches!(app.thumbnail, ThumbnailState::Loading));
  }

  #[tokio::test]
  async fn failed_build_stays_on_setup_with_error() {
    let (_dir, mut app) = app_with(&[]);
    let (_progress_tx, progress_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async { Err::<ScrapeSummary, _>(anyhow!("yt-dlp not found")) });
    app.scrape = Some(ScrapeTask { progress_rx, handle });

    let deadline = Instant::now() + Duration::from_secs(5);
    while app.is_updating() && Instant::now() < deadline {
      tokio::time::sleep(Duration::from_millis(10)).await;
      app.check_pending().await;
    }
    assert_eq!(app.screen, Screen::Setup);
    assert!(app.last_error.as_deref().is_some_and(|e| e.contains("yt-dlp not found")));
  }
}
