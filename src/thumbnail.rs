//! Thumbnail cache: video id → display-sized image.
//!
//! A lookup prefers the file under the cache directory named by a hash of the
//! id (fresh while its mtime is younger than the max age), then falls back to
//! a single network fetch whose raw bytes are kept for next time. Nothing in
//! here returns an error to the caller: every failure degrades to
//! [`Thumbnail::Unavailable`].
//!
//! [`ThumbnailCache::resolve`] runs a lookup on its own task and hands the
//! result back over a channel tagged with the caller's request token, so the
//! interaction loop can drop results for items it no longer shows.

use anyhow::{Context, Result};
use image::{DynamicImage, imageops::FilterType};
use reqwest::Client;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::scraper::fill_template;

#[derive(Debug, Clone)]
pub enum Thumbnail {
  Image(DynamicImage),
  Unavailable,
}

/// A finished lookup, as seen by the interaction loop.
#[derive(Debug)]
pub struct ThumbnailDelivery {
  pub token: u64,
  pub video_id: String,
  pub thumbnail: Thumbnail,
}

/// Where thumbnail bytes come from on a cache miss.
pub trait ThumbnailSource: Send + Sync + 'static {
  fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Plain HTTP GET with a request timeout.
pub struct HttpSource {
  client: Client,
}

impl HttpSource {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build().context("Failed to build HTTP client")?;
    Ok(Self { client })
  }
}

impl ThumbnailSource for HttpSource {
  async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
    let response = self.client.get(url).send().await.with_context(|| format!("Request to {} failed", url))?;
    let response = response.error_for_status().with_context(|| format!("Bad status from {}", url))?;
    let bytes = response.bytes().await.with_context(|| format!("Failed to read image bytes from {}", url))?;
    Ok(bytes.to_vec())
  }
}

// --- Key derivation & expiry ---

/// Filename-safe cache key: the first 128 bits of the id's BLAKE3 digest, hex encoded.
pub fn cache_key(video_id: &str) -> String {
  blake3::hash(video_id.as_bytes()).to_hex().as_str()[..32].to_string()
}

/// Whether the file at `path` exists and was written less than `max_age` before `now`.
/// A modification time in the future counts as age zero.
pub fn is_fresh(path: &Path, max_age: Duration, now: SystemTime) -> bool {
  let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
    return false;
  };
  let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
  age < max_age
}

/// Downscale to fit within `max_w`×`max_h`, preserving aspect ratio. Smaller images are left alone.
pub fn fit_within(image: DynamicImage, max_w: u32, max_h: u32) -> DynamicImage {
  if image.width() > max_w || image.height() > max_h {
    image.resize(max_w, max_h, FilterType::Triangle)
  } else {
    image
  }
}

fn decode(bytes: &[u8], (max_w, max_h): (u32, u32)) -> Result<DynamicImage> {
  let image = image::load_from_memory(bytes).context("Failed to decode thumbnail")?;
  Ok(fit_within(image, max_w, max_h))
}

async fn remove_quietly(path: &Path) {
  match tokio::fs::remove_file(path).await {
    Ok(()) => debug!(path = %path.display(), "removed cache file"),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => warn!(path = %path.display(), err = %e, "failed to remove cache file"),
  }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// --- Cache ---

pub struct ThumbnailCache<S = HttpSource> {
  dir: PathBuf,
  max_age: Duration,
  bounds: (u32, u32),
  url_template: String,
  source: Arc<S>,
}

impl<S> Clone for ThumbnailCache<S> {
  fn clone(&self) -> Self {
    Self {
      dir: self.dir.clone(),
      max_age: self.max_age,
      bounds: self.bounds,
      url_template: self.url_template.clone(),
      source: Arc::clone(&self.source),
    }
  }
}

impl ThumbnailCache<HttpSource> {
  /// The production cache: HTTP fetches bounded by the configured timeout.
  pub fn http(dir: impl Into<PathBuf>) -> Result<Self> {
    Ok(Self::new(dir, HttpSource::new(constants().thumb_fetch_timeout())?))
  }
}

impl<S: ThumbnailSource> ThumbnailCache<S> {
  pub fn new(dir: impl Into<PathBuf>, source: S) -> Self {
    let c = constants();
    Self {
      dir: dir.into(),
      max_age: c.thumb_max_age(),
      bounds: (c.thumb_width, c.thumb_height),
      url_template: c.thumbnail_url_template.clone(),
      source: Arc::new(source),
    }
  }

  pub fn ensure_dir(&self) -> Result<()> {
    std::fs::create_dir_all(&self.dir)
      .with_context(|| format!("Failed to create thumbnail cache {}", self.dir.display()))
  }

  pub fn path_for(&self, video_id: &str) -> PathBuf {
    self.dir.join(format!("{}.jpg", cache_key(video_id)))
  }

  /// Cache check, then fetch-and-store on a miss.
  pub async fn load(&self, video_id: &str) -> Thumbnail {
    if video_id.is_empty() {
      return Thumbnail::Unavailable;
    }
    let path = self.path_for(video_id);
    if let Some(image) = self.load_cached(&path).await {
      debug!(video_id, "thumbnail cache hit");
      return Thumbnail::Image(image);
    }
    self.fetch_and_store(video_id, &path).await
  }

  async fn load_cached(&self, path: &Path) -> Option<DynamicImage> {
    if !is_fresh(path, self.max_age, SystemTime::now()) {
      return None;
    }
    let bytes = match tokio::fs::read(path).await {
      Ok(bytes) => bytes,
      Err(e) => {
        debug!(path = %path.display(), err = %e, "cached thumbnail unreadable");
        return None;
      }
    };
    match decode(&bytes, self.bounds) {
      Ok(image) => Some(image),
      Err(e) => {
        warn!(path = %path.display(), err = %format!("{:#}", e), "corrupt cached thumbnail, removing");
        remove_quietly(path).await;
        None
      }
    }
  }

  async fn fetch_and_store(&self, video_id: &str, path: &Path) -> Thumbnail {
    let url = fill_template(&self.url_template, video_id);
    let bytes = match self.source.fetch(&url).await {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!(video_id, err = %format!("{:#}", e), "thumbnail fetch failed");
        return Thumbnail::Unavailable;
      }
    };
    let image = match decode(&bytes, self.bounds) {
      Ok(image) => image,
      Err(e) => {
        warn!(video_id, err = %format!("{:#}", e), "fetched thumbnail is not an image");
        return Thumbnail::Unavailable;
      }
    };
    // The image is still worth showing when the disk write fails.
    if let Err(e) = self.persist(path, &bytes).await {
      warn!(video_id, err = %format!("{:#}", e), "failed to cache thumbnail");
    } else {
      info!(video_id, bytes = bytes.len(), "thumbnail cached");
    }
    Thumbnail::Image(image)
  }

  /// Write to a unique temp file next to `path`, then rename over it.
  async fn persist(&self, path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(&self.dir).await.context("Failed to create thumbnail cache")?;
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.{}.tmp", std::process::id(), n));
    let written = match tokio::fs::write(&tmp, bytes).await {
      Ok(()) => tokio::fs::rename(&tmp, path).await.context("Failed to move thumbnail into place"),
      Err(e) => Err(e).context("Failed to write thumbnail"),
    };
    if written.is_err() {
      remove_quietly(&tmp).await;
    }
    written
  }

  /// Resolve `video_id` without blocking the caller.
  ///
  /// An empty id is answered with `Unavailable` right away and nothing is
  /// scheduled (`None`). Otherwise the lookup runs on a new task, which sends
  /// one [`ThumbnailDelivery`] carrying `token` when it finishes.
  pub fn resolve(
    &self,
    token: u64,
    video_id: &str,
    tx: &mpsc::UnboundedSender<ThumbnailDelivery>,
  ) -> Option<JoinHandle<()>> {
    if video_id.is_empty() {
      let _ = tx.send(ThumbnailDelivery { token, video_id: String::new(), thumbnail: Thumbnail::Unavailable });
      return None;
    }
    let cache = self.clone();
    let tx = tx.clone();
    let video_id = video_id.to_string();
    Some(tokio::spawn(async move {
      let thumbnail = cache.load(&video_id).await;
      let _ = tx.send(ThumbnailDelivery { token, video_id, thumbnail });
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use anyhow::anyhow;
  use image::{ImageFormat, Rgb, RgbImage};
  use std::io::Cursor;
  use std::sync::atomic::AtomicUsize;

  const DAY: Duration = Duration::from_secs(24 * 60 * 60);

  struct FakeSource {
    body: Option<Vec<u8>>,
    calls: AtomicUsize,
  }

  impl FakeSource {
    fn serving(body: Vec<u8>) -> Self {
      Self { body: Some(body), calls: AtomicUsize::new(0) }
    }

    fn failing() -> Self {
      Self { body: None, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl ThumbnailSource for FakeSource {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.body.clone().ok_or_else(|| anyhow!("connection refused"))
    }
  }

  impl Thumbnail {
    fn image(&self) -> Option<&DynamicImage> {
      match self {
        Thumbnail::Image(image) => Some(image),
        Thumbnail::Unavailable => None,
      }
    }
  }

  impl<S> ThumbnailCache<S> {
    fn dir(&self) -> &Path {
      &self.dir
    }

    fn source(&self) -> &S {
      &self.source
    }
  }

  fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
  }

  fn cache_with(source: FakeSource) -> (tempfile::TempDir, ThumbnailCache<FakeSource>) {
    let dir = tempfile::tempdir().unwrap();
    let cache = ThumbnailCache::new(dir.path().join("thumbs"), source);
    (dir, cache)
  }

  fn set_age(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
  }

  /// Cache files keep a `.jpg` name whatever the served format, so sniff the bytes.
  fn decodes(path: &Path) -> bool {
    image::load_from_memory(&std::fs::read(path).unwrap()).is_ok()
  }

  fn leftover_temp_files(cache: &ThumbnailCache<FakeSource>) -> usize {
    let Ok(entries) = std::fs::read_dir(cache.dir()) else { return 0 };
    entries.filter_map(|e| e.ok()).filter(|e| e.path().to_string_lossy().ends_with(".tmp")).count()
  }

  // --- helpers ---

  #[test]
  fn cache_key_is_stable_hex() {
    let key = cache_key("abc123");
    assert_eq!(key.len(), 32);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(key, cache_key("abc123"));
    assert_ne!(key, cache_key("abc124"));
  }

  #[test]
  fn path_for_avoids_illegal_characters() {
    let (_dir, cache) = cache_with(FakeSource::failing());
    let path = cache.path_for("a/b?c:d");
    assert_eq!(path.parent(), Some(cache.dir()));
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with(".jpg"));
    assert!(!name.contains('/') && !name.contains('?') && !name.contains(':'));
  }

  #[test]
  fn fit_within_downscales_preserving_aspect() {
    let wide = DynamicImage::new_rgb8(640, 360);
    let fitted = fit_within(wide, 320, 180);
    assert_eq!((fitted.width(), fitted.height()), (320, 180));

    let four_three = DynamicImage::new_rgb8(480, 360);
    let fitted = fit_within(four_three, 320, 180);
    assert_eq!((fitted.width(), fitted.height()), (240, 180));
  }

  #[test]
  fn fit_within_leaves_small_images() {
    let small = DynamicImage::new_rgb8(100, 50);
    let fitted = fit_within(small, 320, 180);
    assert_eq!((fitted.width(), fitted.height()), (100, 50));
  }

  #[test]
  fn freshness_by_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.jpg");
    let max_age = 30 * DAY;
    assert!(!is_fresh(&path, max_age, SystemTime::now()));

    std::fs::write(&path, b"x").unwrap();
    assert!(is_fresh(&path, max_age, SystemTime::now()));
    assert!(!is_fresh(&path, Duration::ZERO, SystemTime::now()));

    set_age(&path, 29 * DAY);
    assert!(is_fresh(&path, max_age, SystemTime::now()));
    set_age(&path, 31 * DAY);
    assert!(!is_fresh(&path, max_age, SystemTime::now()));
  }

  // --- load ---

  #[tokio::test]
  async fn empty_id_is_unavailable_without_fetching() {
    let (_dir, cache) = cache_with(FakeSource::serving(png(10, 10)));
    assert!(matches!(cache.load("").await, Thumbnail::Unavailable));
    assert_eq!(cache.source().calls(), 0);
  }

  #[tokio::test]
  async fn miss_fetches_once_then_serves_from_disk() {
    let (_dir, cache) = cache_with(FakeSource::serving(png(640, 360)));

    let first = cache.load("abc123").await;
    let first = first.image().expect("fetched image");
    assert_eq!((first.width(), first.height()), (320, 180));
    assert_eq!(cache.source().calls(), 1);
    assert!(cache.path_for("abc123").exists());

    for _ in 0..3 {
      let again = cache.load("abc123").await;
      assert_eq!(again.image().unwrap().as_bytes(), first.as_bytes());
    }
    assert_eq!(cache.source().calls(), 1);
  }

  #[tokio::test]
  async fn cached_file_holds_raw_fetched_bytes() {
    let body = png(64, 36);
    let (_dir, cache) = cache_with(FakeSource::serving(body.clone()));
    cache.load("raw").await;
    assert_eq!(std::fs::read(cache.path_for("raw")).unwrap(), body);
  }

  #[tokio::test]
  async fn expired_entry_is_refetched_and_overwritten() {
    let (_dir, cache) = cache_with(FakeSource::serving(png(320, 180)));
    cache.ensure_dir().unwrap();
    let path = cache.path_for("old");
    std::fs::write(&path, png(8, 8)).unwrap();
    set_age(&path, 31 * DAY);

    let got = cache.load("old").await;
    assert_eq!(got.image().map(|i| (i.width(), i.height())), Some((320, 180)));
    assert_eq!(cache.source().calls(), 1);
    assert!(is_fresh(&path, 30 * DAY, SystemTime::now()));
  }

  #[tokio::test]
  async fn young_entry_is_served_without_network() {
    let (_dir, cache) = cache_with(FakeSource::failing());
    cache.ensure_dir().unwrap();
    let path = cache.path_for("young");
    std::fs::write(&path, png(200, 100)).unwrap();
    set_age(&path, 29 * DAY);

    let got = cache.load("young").await;
    assert_eq!(got.image().map(|i| (i.width(), i.height())), Some((200, 100)));
    assert_eq!(cache.source().calls(), 0);
  }

  #[tokio::test]
  async fn corrupt_entry_is_deleted_and_refetched() {
    let (_dir, cache) = cache_with(FakeSource::serving(png(320, 180)));
    cache.ensure_dir().unwrap();
    let path = cache.path_for("zzz");
    std::fs::write(&path, b"definitely not an image").unwrap();

    let got = cache.load("zzz").await;
    assert!(got.image().is_some());
    assert_eq!(cache.source().calls(), 1);
    assert!(decodes(&path));
  }

  #[tokio::test]
  async fn corrupt_entry_is_deleted_even_when_fetch_fails() {
    let (_dir, cache) = cache_with(FakeSource::failing());
    cache.ensure_dir().unwrap();
    let path = cache.path_for("zzz");
    std::fs::write(&path, b"definitely not an image").unwrap();

    assert!(matches!(cache.load("zzz").await, Thumbnail::Unavailable));
    assert_eq!(cache.source().calls(), 1);
    assert!(!path.exists());
  }

  #[tokio::test]
  async fn fetch_failure_is_unavailable_and_leaves_nothing_behind() {
    let (_dir, cache) = cache_with(FakeSource::failing());
    assert!(matches!(cache.load("offline").await, Thumbnail::Unavailable));
    assert!(!cache.path_for("offline").exists());
    assert_eq!(leftover_temp_files(&cache), 0);
  }

  #[tokio::test]
  async fn undecodable_download_is_not_cached() {
    let (_dir, cache) = cache_with(FakeSource::serving(b"<html>404</html>".to_vec()));
    assert!(matches!(cache.load("html").await, Thumbnail::Unavailable));
    assert!(!cache.path_for("html").exists());
    assert_eq!(leftover_temp_files(&cache), 0);
  }

  // --- resolve ---

  #[tokio::test]
  async fn resolve_empty_id_answers_immediately() {
    let (_dir, cache) = cache_with(FakeSource::serving(png(10, 10)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(cache.resolve(7, "", &tx).is_none());
    let delivery = rx.try_recv().unwrap();
    assert_eq!(delivery.token, 7);
    assert!(matches!(delivery.thumbnail, Thumbnail::Unavailable));
    assert_eq!(cache.source().calls(), 0);
  }

  #[tokio::test]
  async fn resolve_delivers_tagged_result() {
    let (_dir, cache) = cache_with(FakeSource::serving(png(640, 360)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = cache.resolve(42, "abc123", &tx).unwrap();
    handle.await.unwrap();
    let delivery = rx.recv().await.unwrap();
    assert_eq!(delivery.token, 42);
    assert_eq!(delivery.video_id, "abc123");
    assert!(delivery.thumbnail.image().is_some());
  }

  #[tokio::test]
  async fn overlapping_resolves_leave_one_valid_file() {
    let (_dir, cache) = cache_with(FakeSource::serving(png(640, 360)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handles: Vec<_> = (0..4).filter_map(|token| cache.resolve(token, "same", &tx)).collect();
    for handle in handles {
      handle.await.unwrap();
    }
    for _ in 0..4 {
      assert!(rx.recv().await.unwrap().thumbnail.image().is_some());
    }
    let files: Vec<_> = std::fs::read_dir(cache.dir()).unwrap().filter_map(|e| e.ok()).collect();
    assert_eq!(files.len(), 1);
    assert!(decodes(&cache.path_for("same")));
  }
}
