//! SQLite-backed catalog of scraped videos.
//!
//! One table, keyed by video id. Re-scraping upserts in place, so a record is
//! never duplicated.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::scraper::freetube_url;

/// One video entry in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRecord {
  pub id: String,
  pub title: String,
  pub url: String,
  pub description: Option<String>,
  pub view_count: Option<u64>,
  pub duration_seconds: Option<u64>,
  /// `YYYYMMDD`, as reported by yt-dlp.
  pub upload_date: Option<String>,
}

impl CatalogRecord {
  pub fn display_title(&self) -> &str {
    if self.title.is_empty() { "(No title)" } else { &self.title }
  }

  pub fn description_text(&self) -> &str {
    self.description.as_deref().filter(|d| !d.trim().is_empty()).unwrap_or("No description available")
  }

  pub fn freetube_url(&self) -> String {
    freetube_url(&self.url)
  }

  /// One-line summary of views, duration and upload date, e.g. `1.2M views • 1h 5m • 2016-03-14`.
  pub fn stats_text(&self) -> String {
    let mut parts = Vec::new();
    if let Some(views) = self.view_count.filter(|v| *v > 0) {
      parts.push(format_views(views));
    }
    if let Some(secs) = self.duration_seconds.filter(|d| *d > 0) {
      parts.push(format_duration(secs));
    }
    if let Some(date) = self.upload_date.as_deref().and_then(format_upload_date) {
      parts.push(date);
    }
    if parts.is_empty() { "No stats available".to_string() } else { parts.join(" • ") }
  }
}

fn format_views(views: u64) -> String {
  if views >= 1_000_000 {
    format!("{:.1}M views", views as f64 / 1_000_000.0)
  } else if views >= 1_000 {
    format!("{:.1}K views", views as f64 / 1_000.0)
  } else {
    format!("{} views", views)
  }
}

fn format_duration(secs: u64) -> String {
  let hours = secs / 3600;
  let minutes = (secs % 3600) / 60;
  if hours > 0 { format!("{}h {}m", hours, minutes) } else { format!("{}m", minutes) }
}

/// `YYYYMMDD` → `YYYY-MM-DD`; anything else is dropped.
fn format_upload_date(raw: &str) -> Option<String> {
  NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").ok().map(|d| d.format("%Y-%m-%d").to_string())
}

const SELECT_COLUMNS: &str = "SELECT id, title, url, description, view_count, duration, upload_date FROM videos";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogRecord> {
  let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
  let positive = |n: Option<i64>| n.filter(|n| *n > 0).map(|n| n as u64);
  Ok(CatalogRecord {
    id: row.get(0)?,
    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
    url: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
    description: non_empty(row.get(3)?),
    view_count: positive(row.get(4)?),
    duration_seconds: positive(row.get(5)?),
    upload_date: non_empty(row.get(6)?),
  })
}

/// The local catalog store.
pub struct Catalog {
  conn: Connection,
}

impl Catalog {
  /// Open (or create) the catalog at `path`, creating parent directories and the schema.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create catalog directory {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open catalog at {}", path.display()))?;
    // A background scrape may be writing while the UI reads.
    conn.busy_timeout(Duration::from_secs(5)).context("Failed to set catalog busy timeout")?;
    let catalog = Self { conn };
    catalog.init_schema()?;
    debug!(path = %path.display(), "catalog opened");
    Ok(catalog)
  }

  pub fn open_in_memory() -> Result<Self> {
    let catalog = Self { conn: Connection::open_in_memory().context("Failed to open in-memory catalog")? };
    catalog.init_schema()?;
    Ok(catalog)
  }

  fn init_schema(&self) -> Result<()> {
    self
      .conn
      .execute(
        "CREATE TABLE IF NOT EXISTS videos (
          id          TEXT PRIMARY KEY,
          title       TEXT,
          url         TEXT,
          description TEXT,
          view_count  INTEGER,
          duration    INTEGER,
          upload_date TEXT
        )",
        [],
      )
      .context("Failed to create videos table")?;
    Ok(())
  }

  /// Insert a record, replacing any existing row with the same id.
  pub fn upsert(&self, record: &CatalogRecord) -> Result<()> {
    self
      .conn
      .execute(
        "INSERT OR REPLACE INTO videos (id, title, url, description, view_count, duration, upload_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
          record.id,
          record.title,
          record.url,
          record.description,
          record.view_count.map(|v| v as i64),
          record.duration_seconds.map(|d| d as i64),
          record.upload_date,
        ],
      )
      .with_context(|| format!("Failed to upsert video {}", record.id))?;
    Ok(())
  }

  pub fn count(&self) -> Result<u64> {
    let count: i64 =
      self.conn.query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0)).context("Failed to count videos")?;
    Ok(count as u64)
  }

  /// A uniformly random record, or `None` when the catalog is empty.
  pub fn random(&self) -> Result<Option<CatalogRecord>> {
    self
      .conn
      .query_row(&format!("{SELECT_COLUMNS} ORDER BY RANDOM() LIMIT 1"), [], record_from_row)
      .optional()
      .context("Failed to pick a random video")
  }

  /// Up to `n` distinct random records.
  pub fn random_many(&self, n: usize) -> Result<Vec<CatalogRecord>> {
    let mut stmt = self.conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY RANDOM() LIMIT ?1"))?;
    let rows = stmt.query_map([n as i64], record_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().context("Failed to pick random videos")
  }

  pub fn get(&self, id: &str) -> Result<Option<CatalogRecord>> {
    self
      .conn
      .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], record_from_row)
      .optional()
      .with_context(|| format!("Failed to look up video {}", id))
  }

  pub fn all_by_title(&self) -> Result<Vec<CatalogRecord>> {
    let mut stmt = self.conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY title ASC"))?;
    let rows = stmt.query_map([], record_from_row)?;
    let records = rows.collect::<rusqlite::Result<Vec<_>>>().context("Failed to list videos")?;
    info!(count = records.len(), "catalog listed");
    Ok(records)
  }
}
