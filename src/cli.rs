//! Non-interactive subcommands. Output goes to stdout for piping; failures bubble up to `main`.

use anyhow::{Result, bail};
use clap::ValueEnum;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogRecord};
use crate::opener;
use crate::scraper::{ScrapeProgress, scrape_channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OpenWith {
  Browser,
  Freetube,
  None,
}

/// Open an existing catalog. Unlike `Catalog::open` this never creates the file.
fn existing_catalog(db: &Path) -> Result<Catalog> {
  if !db.exists() {
    bail!("No database at {}. Run 'gg-shuffle scrape' first.", db.display());
  }
  Catalog::open(db)
}

pub async fn scrape(channel: &str, db: &Path) -> Result<()> {
  println!("Scraping: {}", channel);
  let (tx, mut rx) = mpsc::unbounded_channel();
  let printer = tokio::spawn(async move {
    while let Some(event) = rx.recv().await {
      match event {
        ScrapeProgress::Listed(total) => println!("Found {} videos", total),
        ScrapeProgress::Stored { done, total } if done % 100 == 0 || done == total => {
          println!("Processed {}/{} videos...", done, total)
        }
        ScrapeProgress::Stored { .. } => {}
      }
    }
  });

  let result = scrape_channel(channel, db, Some(tx)).await;
  let _ = printer.await;
  let summary = result?;
  println!("Added {} videos. Total in DB: {}", summary.stored, summary.total);
  Ok(())
}

pub fn random_line(index: usize, record: &CatalogRecord) -> String {
  format!("{}. {}\n{}", index, record.display_title(), record.url)
}

pub fn random(db: &Path, count: usize, open: OpenWith) -> Result<()> {
  let catalog = existing_catalog(db)?;
  if catalog.count()? == 0 {
    bail!("No videos in database. Run 'gg-shuffle scrape' first.");
  }
  let picks = catalog.random_many(count)?;
  info!(count = picks.len(), open = ?open, "random picks");
  for (i, record) in picks.iter().enumerate() {
    println!("{}", random_line(i + 1, record));
    let target = match open {
      OpenWith::Browser => record.url.clone(),
      OpenWith::Freetube => record.freetube_url(),
      OpenWith::None => continue,
    };
    if let Err(e) = opener::open_url(&target) {
      warn!(err = %format!("{:#}", e), "open failed");
      eprintln!("warning: {:#}", e);
    }
  }
  Ok(())
}

/// `title|url`, with `|` in titles replaced so the line splits cleanly.
pub fn list_line(record: &CatalogRecord) -> String {
  format!("{}|{}", record.display_title().replace('|', "-"), record.url)
}

pub fn list(db: &Path) -> Result<()> {
  let catalog = existing_catalog(db)?;
  for record in catalog.all_by_title()? {
    println!("{}", list_line(&record));
  }
  Ok(())
}
