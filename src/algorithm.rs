//! Recommendation scoring.
//!
//! Every track gets a scalar score built from five terms:
//!
//! ```text
//! recency    = last_played == 0 ? 0 : exp(-(now - last_played) / window)
//! plays      = play_count   * play_weight     (2)
//! repeats    = repeat_count * repeat_weight   (3)
//! skips      = skip_count   * skip_weight     (-1)
//! completion = average_play_duration / (duration_secs * 1000)
//! score      = recency + plays + repeats + skips + completion
//! ```
//!
//! Ranking sorts descending by score. The sort is stable, so tracks with
//! equal scores keep their enumeration order.

use crate::config::RECENCY_WINDOW_MS;
use crate::preferences::SongStats;
use crate::track::Track;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Weights of the scoring formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Decay constant of the recency term, in milliseconds.
    pub recency_window_ms: f64,
    pub play_weight: f64,
    pub repeat_weight: f64,
    /// Applied per skip. Negative.
    pub skip_weight: f64,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            recency_window_ms: RECENCY_WINDOW_MS,
            play_weight: 2.0,
            repeat_weight: 3.0,
            skip_weight: -1.0,
        }
    }
}

/// Recency term. Zero for never-played tracks.
#[inline]
fn recency_score(last_played: i64, now: i64, window_ms: f64) -> f64 {
    if last_played == 0 {
        return 0.0;
    }
    (-((now - last_played) as f64 / window_ms)).exp()
}

/// Fraction of the track the user hears on average.
#[inline]
fn completion_score(stats: &SongStats, track: &Track) -> f64 {
    let length_ms = track.duration_secs * 1000.0;
    if length_ms > 0.0 && length_ms.is_finite() {
        stats.average_play_duration / length_ms
    } else {
        0.0
    }
}

/// Score a single track at time `now` (epoch millis).
#[must_use]
pub fn score_track(stats: &SongStats, track: &Track, now: i64, context: &ScoringContext) -> f64 {
    let score = recency_score(stats.last_played, now, context.recency_window_ms)
        + f64::from(stats.play_count) * context.play_weight
        + f64::from(stats.repeat_count) * context.repeat_weight
        + f64::from(stats.skip_count) * context.skip_weight
        + completion_score(stats, track);

    log::trace!("Scored `{}' at {score:.4}", track.id);
    score
}

/// Rank `tracks` descending by score. Tracks without a stats entry use
/// zeroed defaults. No filtering, no truncation.
#[must_use]
pub fn rank_tracks(
    tracks: &[Track],
    stats: &HashMap<String, SongStats>,
    now: i64,
    context: &ScoringContext,
) -> Vec<Track> {
    let defaults = SongStats::default();

    let mut scored: Vec<(&Track, f64)> = tracks
        .iter()
        .map(|track| {
            let entry = stats.get(&track.id).unwrap_or(&defaults);
            (track, score_track(entry, track, now, context))
        })
        .collect();

    // `sort_by` is stable; equal scores keep enumeration order.
    scored.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    scored.into_iter().map(|(track, _)| track.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn track(id: &str, secs: f64) -> Track {
        Track::new(id, format!("/music/{id}.mp3"), id, secs)
    }

    #[test]
    fn test_unplayed_track_scores_zero() {
        let score = score_track(&SongStats::default(), &track("a", 120.0), 1_000_000, &ScoringContext::default());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_score_matches_formula() {
        let now = 100 * DAY_MS;
        let stats = SongStats {
            play_count: 3,
            skip_count: 1,
            repeat_count: 2,
            last_played: now - 7 * DAY_MS,
            total_play_duration: 180_000,
            average_play_duration: 60_000.0,
        };

        let score = score_track(&stats, &track("a", 120.0), now, &ScoringContext::default());
        let expected = (-1.0f64).exp() + 6.0 + 6.0 - 1.0 + 0.5;
        assert!((score - expected).abs() < 1e-9, "got {score}, expected {expected}");
    }

    #[test]
    fn test_recency_decays_with_age() {
        let now = 50 * DAY_MS;
        let fresh = SongStats { last_played: now, ..SongStats::default() };
        let stale = SongStats { last_played: now - 30 * DAY_MS, ..SongStats::default() };
        let context = ScoringContext::default();

        let fresh_score = score_track(&fresh, &track("a", 60.0), now, &context);
        let stale_score = score_track(&stale, &track("a", 60.0), now, &context);

        assert!((fresh_score - 1.0).abs() < 1e-12);
        assert!(stale_score < fresh_score);
        assert!(stale_score > 0.0);
    }

    #[test]
    fn test_zero_length_track_has_no_completion_term() {
        let stats = SongStats { average_play_duration: 5_000.0, ..SongStats::default() };
        let score = score_track(&stats, &track("a", 0.0), 0, &ScoringContext::default());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_rank_keeps_enumeration_order_for_ties() {
        let tracks = vec![track("a", 60.0), track("b", 60.0), track("c", 60.0)];
        let ranked = rank_tracks(&tracks, &HashMap::new(), 0, &ScoringContext::default());
        assert_eq!(ranked, tracks);
    }

    #[test]
    fn test_rank_orders_by_descending_score() {
        let tracks = vec![track("a", 60.0), track("b", 60.0), track("c", 60.0)];
        let mut stats = HashMap::new();
        stats.insert("c".to_string(), SongStats { play_count: 2, ..SongStats::default() });
        stats.insert("b".to_string(), SongStats { repeat_count: 1, ..SongStats::default() });
        stats.insert("a".to_string(), SongStats { skip_count: 4, ..SongStats::default() });

        let ranked = rank_tracks(&tracks, &stats, 0, &ScoringContext::default());
        let ids: Vec<&str> = ranked.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_rank_neither_filters_nor_truncates() {
        let tracks: Vec<Track> = (0..50).map(|i| track(&format!("t{i}"), 40.0)).collect();
        let ranked = rank_tracks(&tracks, &HashMap::new(), 0, &ScoringContext::default());
        assert_eq!(ranked.len(), 50);
    }
}
