//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!`, so there is no runtime file I/O.
//! Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub default_channel: String,

  // Thumbnails
  /// URL template for a video's thumbnail; `{id}` is replaced by the video id.
  pub thumbnail_url_template: String,
  pub thumb_width: u32,
  pub thumb_height: u32,
  pub thumb_max_age_days: u64,
  pub thumb_fetch_timeout_secs: u64,

  // Navigation
  pub history_limit: usize,

  // Scraping / yt-dlp
  pub enrich_concurrency: usize,
  pub description_limit: usize,

  // UI
  pub error_display_secs: u64,
}

impl Constants {
  pub fn thumb_max_age(&self) -> Duration {
    Duration::from_secs(self.thumb_max_age_days * 24 * 60 * 60)
  }

  pub fn thumb_fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.thumb_fetch_timeout_secs)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed the constants test fails.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
