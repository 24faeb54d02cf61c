//! Retained freehand drawing and the one-shot clear flag that suppresses its reuse.

use std::sync::Arc;

use crate::domain::Drawing;

/// What the renderer should put on the canvas for this pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanvasImage {
  /// Start from a blank canvas.
  Empty,
  /// Nothing has been drawn yet this session.
  Absent,
  Snapshot(Arc<Drawing>),
}

#[derive(Clone, Debug, Default)]
pub struct CanvasStore {
  snapshot: Option<Arc<Drawing>>,
  /// Set once a render blanked the canvas; cleared by the next `retain`.
  cleared_since_retain: bool,
}

impl CanvasStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store the latest drawing, replacing whatever was retained.
  pub fn retain(&mut self, drawing: Drawing) {
    self.snapshot = Some(Arc::new(drawing));
    self.cleared_since_retain = false;
  }

  /// The renderer was handed a blank canvas. The snapshot stays stored, but
  /// it no longer counts as the learner's working until something new is drawn.
  pub fn mark_cleared(&mut self) {
    if self.snapshot.is_some() {
      self.cleared_since_retain = true;
    }
  }

  /// The retained drawing, or a blank canvas when `clear_flag` is set.
  /// The stored snapshot itself is never erased here.
  pub fn image_for_display(&self, clear_flag: bool) -> CanvasImage {
    if clear_flag {
      return CanvasImage::Empty;
    }
    match &self.snapshot {
      Some(d) => CanvasImage::Snapshot(Arc::clone(d)),
      None => CanvasImage::Absent,
    }
  }

  /// Read the flag and reset it. Called once per pass, after `image_for_display`.
  pub fn consume_clear_flag(flag: &mut bool) -> bool {
    std::mem::take(flag)
  }

  pub fn snapshot(&self) -> Option<&Drawing> {
    self.snapshot.as_deref()
  }

  /// The drawing a submit may evaluate: retained after the last clear and
  /// carrying at least one stroke.
  pub fn submittable(&self) -> Option<&Drawing> {
    if self.cleared_since_retain {
      return None;
    }
    self.snapshot().filter(|d| !d.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn absent_until_something_is_drawn() {
    let store = CanvasStore::new();
    assert_eq!(store.image_for_display(false), CanvasImage::Absent);
    assert_eq!(store.image_for_display(true), CanvasImage::Empty);
  }

  #[test]
  fn clear_flag_hides_but_keeps_the_snapshot() {
    let mut store = CanvasStore::new();
    store.retain(Drawing::new(vec![1, 2], 3));
    assert_eq!(store.image_for_display(true), CanvasImage::Empty);
    assert_eq!(store.snapshot(), Some(&Drawing::new(vec![1, 2], 3)));
    assert_eq!(
      store.image_for_display(false),
      CanvasImage::Snapshot(Arc::new(Drawing::new(vec![1, 2], 3)))
    );
  }

  #[test]
  fn newer_drawing_overwrites() {
    let mut store = CanvasStore::new();
    store.retain(Drawing::new(vec![1], 1));
    store.retain(Drawing::new(vec![2], 2));
    assert_eq!(store.snapshot(), Some(&Drawing::new(vec![2], 2)));
  }

  #[test]
  fn cleared_snapshot_is_not_submittable_until_redrawn() {
    let mut store = CanvasStore::new();
    assert_eq!(store.submittable(), None);
    store.retain(Drawing::new(vec![1, 2], 3));
    assert_eq!(store.submittable(), Some(&Drawing::new(vec![1, 2], 3)));

    store.mark_cleared();
    assert_eq!(store.submittable(), None);
    assert_eq!(store.snapshot(), Some(&Drawing::new(vec![1, 2], 3)));

    store.retain(Drawing::new(vec![9], 1));
    assert_eq!(store.submittable(), Some(&Drawing::new(vec![9], 1)));
    store.retain(Drawing::new(vec![9], 0));
    assert_eq!(store.submittable(), None);
  }

  #[test]
  fn clear_flag_is_consumed_once() {
    let mut flag = true;
    assert!(CanvasStore::consume_clear_flag(&mut flag));
    assert!(!flag);
    assert!(!CanvasStore::consume_clear_flag(&mut flag));
  }
}
