use facegate_config::{validate_threshold, DEFAULT_MATCH_THRESHOLD};
use serde::Serialize;
use tracing::trace;

use crate::errors::{AppError, AppResult};
use crate::faces::embedding::Embedding;
use crate::faces::gallery::Gallery;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    Matched {
        identity: String,
        distance: f64,
    },
    NoMatch {
        closest_identity: String,
        distance: f64,
    },
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }

    pub fn distance(&self) -> f64 {
        match self {
            MatchResult::Matched { distance, .. } | MatchResult::NoMatch { distance, .. } => {
                *distance
            }
        }
    }
}

/// Nearest-identity decision under an exclusive distance threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    threshold: f64,
}

impl Matcher {
    pub fn new(threshold: f64) -> AppResult<Self> {
        validate_threshold(threshold).map_err(AppError::InvalidConfig)?;
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn match_probe(&self, probe: &Embedding, gallery: &Gallery) -> AppResult<MatchResult> {
        gallery.check_dimension(probe)?;
        let (identity, distance) = closest_identity(probe, gallery)?;
        Ok(self.decide(identity, distance))
    }

    /// Every probe is checked against the gallery before any is scored, so a
    /// dimension mismatch surfaces even when an earlier probe would match.
    pub fn match_probes(&self, probes: &[Embedding], gallery: &Gallery) -> AppResult<MatchResult> {
        if probes.is_empty() {
            return Err(AppError::NoProbe);
        }
        for probe in probes {
            gallery.check_dimension(probe)?;
        }

        let mut closest: Option<(String, f64)> = None;
        for (index, probe) in probes.iter().enumerate() {
            let (identity, distance) = closest_identity(probe, gallery)?;
            trace!(target: "matcher", probe = index, identity = %identity, distance, "probe scored");
            if distance < self.threshold {
                return Ok(MatchResult::Matched { identity, distance });
            }
            if closest.as_ref().map_or(true, |(_, best)| distance < *best) {
                closest = Some((identity, distance));
            }
        }

        let (closest_identity, distance) = closest.ok_or(AppError::NoProbe)?;
        Ok(MatchResult::NoMatch {
            closest_identity,
            distance,
        })
    }

    fn decide(&self, identity: String, distance: f64) -> MatchResult {
        if distance < self.threshold {
            MatchResult::Matched { identity, distance }
        } else {
            MatchResult::NoMatch {
                closest_identity: identity,
                distance,
            }
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Minimum distance per identity, then the global minimum. Ties keep the
/// identity that comes first in gallery order.
fn closest_identity(probe: &Embedding, gallery: &Gallery) -> AppResult<(String, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for entry in gallery.iter() {
        let score = entry
            .embeddings
            .iter()
            .map(|enrolled| euclidean_distance(probe, enrolled))
            .fold(f64::INFINITY, f64::min);
        if best.map_or(true, |(_, current)| score < current) {
            best = Some((entry.identity.as_str(), score));
        }
    }

    best.map(|(identity, distance)| (identity.to_string(), distance))
        .ok_or(AppError::EmptyGallery)
}

pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(l, r)| (l - r) * (l - r))
        .sum::<f64>()
        .sqrt()
}
