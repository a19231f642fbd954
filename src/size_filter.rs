use crate::dataset::ImagePair;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SizeLimits {
    pub max_pixels: u64,
    pub max_edge: u32,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_pixels: 2048 * 2048,
            max_edge: 3000,
        }
    }
}

impl From<&crate::config::SizeFilter> for SizeLimits {
    fn from(cfg: &crate::config::SizeFilter) -> Self {
        Self {
            max_pixels: cfg.max_pixels,
            max_edge: cfg.max_edge,
        }
    }
}

impl SizeLimits {
    /// Dimensions exactly at a limit are accepted.
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        u64::from(width) * u64::from(height) <= self.max_pixels
            && width <= self.max_edge
            && height <= self.max_edge
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SizeFilterStats {
    pub checked: usize,
    pub oversized: usize,
    pub unreadable: usize,
}

impl SizeFilterStats {
    pub fn dropped(&self) -> usize {
        self.oversized + self.unreadable
    }
}

enum Verdict {
    Keep,
    Oversized,
    Unreadable,
}

/// Drops pairs where either image is over `limits` or cannot be opened.
///
/// Only image headers are read. Order of the kept pairs is preserved.
pub fn filter(
    pairs: Vec<ImagePair>,
    limits: SizeLimits,
    progress_every: usize,
) -> (Vec<ImagePair>, SizeFilterStats) {
    let total = pairs.len();
    let mut stats = SizeFilterStats::default();
    let mut kept = Vec::with_capacity(total);

    for pair in pairs {
        stats.checked += 1;
        match check_pair(&pair, limits) {
            Verdict::Keep => kept.push(pair),
            Verdict::Oversized => stats.oversized += 1,
            Verdict::Unreadable => stats.unreadable += 1,
        }
        if progress_every > 0 && stats.checked % progress_every == 0 {
            debug!("size filter {}/{} dropped={}", stats.checked, total, stats.dropped());
        }
    }

    info!(
        "size filter kept={} oversized={} unreadable={}",
        kept.len(),
        stats.oversized,
        stats.unreadable
    );
    (kept, stats)
}

fn check_pair(pair: &ImagePair, limits: SizeLimits) -> Verdict {
    for path in [&pair.original, &pair.edited] {
        match dimensions(path) {
            Some((w, h)) if limits.accepts(w, h) => {}
            Some((w, h)) => {
                debug!("oversized {}x{}: {}", w, h, path.display());
                return Verdict::Oversized;
            }
            None => return Verdict::Unreadable,
        }
    }
    Verdict::Keep
}

fn dimensions(path: &Path) -> Option<(u32, u32)> {
    match image::image_dimensions(path) {
        Ok(dims) => Some(dims),
        Err(err) => {
            warn!("cannot open image {}: {err}", path.display());
            None
        }
    }
}
