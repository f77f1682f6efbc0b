use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogRecord};
use crate::constants::constants;

// --- URL helpers ---

pub fn watch_url(video_id: &str) -> String {
  format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Substitute `{id}` in a URL template.
pub fn fill_template(template: &str, video_id: &str) -> String {
  template.replace("{id}", video_id)
}

/// The FreeTube deep link for a watch URL, or empty when there is no URL.
pub fn freetube_url(url: &str) -> String {
  if url.is_empty() { String::new() } else { format!("freetube://{}", url) }
}

// --- yt-dlp ---

/// A channel entry from the fast `--flat-playlist` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedVideo {
  pub id: String,
  pub title: String,
}

/// Per-video metadata from the slow detail pass.
#[derive(Debug, Default, Deserialize)]
pub struct VideoDetails {
  pub title: Option<String>,
  pub description: Option<String>,
  pub view_count: Option<u64>,
  /// yt-dlp occasionally reports fractional seconds.
  pub duration: Option<f64>,
  pub upload_date: Option<String>,
}

/// Progress events while scraping into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeProgress {
  Listed(usize),
  Stored { done: usize, total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSummary {
  pub listed: usize,
  pub stored: usize,
  /// Catalog size after the scrape.
  pub total: u64,
}

const LIST_FORMAT: &str = "%(id)s\t%(title)s";

const DETAILS_FORMAT: &str = "%(.{title,description,view_count,duration,upload_date})j";

fn ytdlp_spawn_error(e: std::io::Error, action: &str) -> anyhow::Error {
  if e.kind() == std::io::ErrorKind::NotFound {
    anyhow!("yt-dlp not found. Install it with: pipx install yt-dlp (or pip install yt-dlp)")
  } else {
    anyhow!(e).context(format!("Failed to execute yt-dlp {}", action))
  }
}

/// Parse one `id\ttitle` line from the flat listing.
fn parse_listing_line(line: &str) -> Option<ListedVideo> {
  let (id, title) = line.split_once('\t').unwrap_or((line, ""));
  let id = id.trim();
  if id.is_empty() || id == "NA" {
    return None;
  }
  let title = title.trim();
  let title = if title == "NA" { "" } else { title };
  Some(ListedVideo { id: id.to_string(), title: title.to_string() })
}

fn parse_listing(stdout: &str) -> Vec<ListedVideo> {
  // Lines are not trimmed up front: a leading tab means the id column is empty.
  stdout.lines().filter(|l| !l.trim().is_empty()).filter_map(parse_listing_line).collect()
}

fn parse_details(stdout: &str) -> Option<VideoDetails> {
  let line = stdout.lines().map(str::trim).find(|l| l.starts_with('{'))?;
  serde_json::from_str(line).ok()
}

fn truncate_chars(s: &str, max: usize) -> String {
  s.chars().take(max).collect()
}

/// Merge the flat listing with whatever the detail pass produced.
pub fn build_record(listed: ListedVideo, details: Option<VideoDetails>) -> CatalogRecord {
  let details = details.unwrap_or_default();
  let title = if listed.title.is_empty() { details.title.unwrap_or_default() } else { listed.title };
  CatalogRecord {
    url: watch_url(&listed.id),
    id: listed.id,
    title,
    description: details
      .description
      .filter(|d| !d.trim().is_empty())
      .map(|d| truncate_chars(&d, constants().description_limit)),
    view_count: details.view_count.filter(|v| *v > 0),
    duration_seconds: details.duration.filter(|d| *d > 0.0).map(|d| d.round() as u64),
    upload_date: details.upload_date.filter(|d| d.len() == 8 && d.chars().all(|c| c.is_ascii_digit())),
  }
}

/// List every video on a channel (ids and titles only).
pub async fn list_channel(channel_url: &str) -> Result<Vec<ListedVideo>> {
  let output = Command::new("yt-dlp")
    .args(["--flat-playlist", "--print", LIST_FORMAT, "--ignore-errors", "--no-warnings", "--", channel_url])
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await
    .map_err(|e| ytdlp_spawn_error(e, "channel listing"))?;

  let stdout = String::from_utf8(output.stdout).context("yt-dlp output non-UTF8")?;
  let listed = parse_listing(&stdout);
  // --ignore-errors can exit non-zero with a usable partial listing.
  if !output.status.success() && listed.is_empty() {
    return Err(anyhow!("yt-dlp channel listing failed: {}", String::from_utf8_lossy(&output.stderr).trim()));
  }
  Ok(listed)
}

/// Fetch full metadata for one video. Failures are logged and yield `None`.
pub async fn fetch_details(video_id: &str) -> Option<VideoDetails> {
  let url = watch_url(video_id);
  let result = Command::new("yt-dlp")
    .args(["--skip-download", "--print", DETAILS_FORMAT, "--no-warnings", "--", &url])
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .output()
    .await;

  match result {
    Ok(output) if output.status.success() => {
      let details = String::from_utf8(output.stdout).ok().and_then(|s| parse_details(&s));
      if details.is_none() {
        debug!(video_id, "yt-dlp details unparsable");
      }
      details
    }
    Ok(output) => {
      debug!(video_id, status = %output.status, "yt-dlp details failed");
      None
    }
    Err(e) => {
      warn!(video_id, err = %e, "failed to spawn yt-dlp for details");
      None
    }
  }
}

/// Resolve details for each listed video with `fetch`, sending records through `tx` as they complete.
/// Runs up to `enrich_concurrency` fetches at once and stops starting new ones once `tx` is closed.
pub async fn stream_records<F, Fut>(listed: Vec<ListedVideo>, tx: mpsc::Sender<CatalogRecord>, fetch: F)
where
  F: Fn(String) -> Fut,
  Fut: Future<Output = Option<VideoDetails>>,
{
  use futures::stream::{self, StreamExt};

  let fetch = &fetch;
  stream::iter(listed)
    .map(|video| {
      let tx = tx.clone();
      async move {
        if tx.is_closed() {
          return;
        }
        let details = fetch(video.id.clone()).await;
        if tx.send(build_record(video, details)).await.is_err() {
          debug!("scrape: record receiver gone");
        }
      }
    })
    .buffer_unordered(constants().enrich_concurrency)
    .collect::<()>()
    .await;
}

/// Upsert records into the catalog at `db_path` as `fetch` resolves them.
/// A failed upsert aborts the remaining fetches.
pub async fn store_records<F, Fut>(
  listed: Vec<ListedVideo>,
  db_path: &Path,
  progress: Option<mpsc::UnboundedSender<ScrapeProgress>>,
  fetch: F,
) -> Result<ScrapeSummary>
where
  F: Fn(String) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Option<VideoDetails>> + Send + 'static,
{
  let total = listed.len();
  let report = |event: ScrapeProgress| {
    if let Some(tx) = &progress {
      let _ = tx.send(event);
    }
  };
  report(ScrapeProgress::Listed(total));

  let catalog = Catalog::open(db_path)?;
  let (tx, mut rx) = mpsc::channel(64);
  let producer = tokio::spawn(stream_records(listed, tx, fetch));

  let mut stored = 0;
  let mut failure = None;
  while let Some(record) = rx.recv().await {
    if let Err(e) = catalog.upsert(&record) {
      failure = Some(e);
      break;
    }
    stored += 1;
    report(ScrapeProgress::Stored { done: stored, total });
  }
  if let Some(e) = failure {
    producer.abort();
    warn!(stored, total, err = %format!("{:#}", e), "scrape: upsert failed, stopping");
    return Err(e);
  }
  producer.await.context("Scrape worker panicked")?;

  Ok(ScrapeSummary { listed: total, stored, total: catalog.count()? })
}

/// Scrape a channel into the catalog at `db_path`, upserting records as they arrive.
pub async fn scrape_channel(
  channel_url: &str,
  db_path: &Path,
  progress: Option<mpsc::UnboundedSender<ScrapeProgress>>,
) -> Result<ScrapeSummary> {
  info!(channel = %channel_url, db = %db_path.display(), "scrape: listing channel");
  let listed = list_channel(channel_url).await?;
  info!(count = listed.len(), "scrape: channel listed");

  let summary = store_records(listed, db_path, progress, |id| async move { fetch_details(&id).await }).await?;
  info!(stored = summary.stored, total = summary.total, "scrape: done");
  Ok(summary)
}
