//! "What's shown now" and "what was shown before".
//!
//! The navigator never touches the catalog itself: callers hand in the
//! function that picks or looks up a record, which keeps it testable without
//! a store.

use anyhow::{Result, anyhow};
use std::collections::VecDeque;
use tracing::debug;

use crate::catalog::CatalogRecord;
use crate::constants::constants;

#[derive(Debug)]
pub struct Navigator {
  current: Option<String>,
  /// Oldest first; the back of the deque is the most recently left item.
  history: VecDeque<String>,
  limit: usize,
}

impl Default for Navigator {
  fn default() -> Self {
    Self::new(constants().history_limit)
  }
}

impl Navigator {
  pub fn new(limit: usize) -> Self {
    Self { current: None, history: VecDeque::with_capacity(limit), limit }
  }

  pub fn can_go_back(&self) -> bool {
    !self.history.is_empty()
  }

  /// Move to a freshly picked record.
  ///
  /// `pick` returns `Ok(None)` when there is nothing to pick (empty catalog);
  /// the state is then left untouched. Errors from `pick` propagate unchanged.
  pub fn shuffle<F>(&mut self, pick: F) -> Result<Option<CatalogRecord>>
  where
    F: FnOnce() -> Result<Option<CatalogRecord>>,
  {
    let Some(record) = pick()? else {
      debug!("shuffle: nothing to pick");
      return Ok(None);
    };
    if let Some(previous) = self.current.take() {
      self.push_history(previous);
    }
    self.current = Some(record.id.clone());
    debug!(video_id = %record.id, history = self.history.len(), "shuffle");
    Ok(Some(record))
  }

  /// Return to the most recently left record.
  ///
  /// `Ok(None)` when there is no history. The popped id is consumed even if
  /// `lookup` cannot find it any more.
  pub fn back<F>(&mut self, lookup: F) -> Result<Option<CatalogRecord>>
  where
    F: FnOnce(&str) -> Result<Option<CatalogRecord>>,
  {
    let Some(id) = self.history.pop_back() else {
      return Ok(None);
    };
    match lookup(&id) {
      Ok(Some(record)) => {
        debug!(video_id = %id, history = self.history.len(), "back");
        self.current = Some(id);
        Ok(Some(record))
      }
      Ok(None) => Err(anyhow!("Video {} is no longer in the catalog", id)),
      Err(e) => Err(e.context(format!("Failed to look up previous video {}", id))),
    }
  }

  fn push_history(&mut self, id: String) {
    if self.limit == 0 {
      return;
    }
    while self.history.len() >= self.limit {
      self.history.pop_front();
    }
    self.history.push_back(id);
  }
}
