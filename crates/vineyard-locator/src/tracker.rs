//! Frame-spacing tracker.
//!
//! Consecutive frames of a slow pass often show the same plant. The tracker
//! folds over the ordered frames, accumulating haversine distance, and marks
//! a frame redundant until the drone has moved `min_spacing_m` since the last
//! accepted frame.

use vineyard_core::GeoCoord;

/// Accumulator carried across the frame sequence
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackerState {
    /// Last frame with a GPS fix
    pub previous: Option<GeoCoord>,
    /// Distance travelled since the last accepted frame, meters
    pub travelled_m: f64,
    pub frames_seen: usize,
}

/// Outcome of one step of the fold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpacingDecision {
    Accepted,
    Redundant,
    /// No GPS fix: the state is left untouched
    NoFix,
}

impl TrackerState {
    /// Advance the accumulator by one frame
    pub fn step(self, gps: Option<GeoCoord>, min_spacing_m: f64) -> (Self, SpacingDecision) {
        let Some(position) = gps else {
            return (self, SpacingDecision::NoFix);
        };

        let frames_seen = self.frames_seen + 1;
        let Some(previous) = self.previous else {
            let state = Self {
                previous: Some(position),
                travelled_m: 0.0,
                frames_seen,
            };
            return (state, SpacingDecision::Accepted);
        };

        let travelled_m = self.travelled_m + previous.distance_to(&position);
        if travelled_m >= min_spacing_m {
            let state = Self {
                previous: Some(position),
                travelled_m: 0.0,
                frames_seen,
            };
            (state, SpacingDecision::Accepted)
        } else {
            let state = Self {
                previous: Some(position),
                travelled_m,
                frames_seen,
            };
            (state, SpacingDecision::Redundant)
        }
    }
}

/// Decision per frame for an ordered sequence of GPS fixes
pub fn track_spacing<I>(fixes: I, min_spacing_m: f64) -> Vec<SpacingDecision>
where
    I: IntoIterator<Item = Option<GeoCoord>>,
{
    fixes
        .into_iter()
        .scan(TrackerState::default(), |state, gps| {
            let (next, decision) = state.step(gps, min_spacing_m);
            *state = next;
            Some(decision)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fix `meters` north of the origin (1 m of latitude ≈ 8.993e-6°)
    fn north(meters: f64) -> Option<GeoCoord> {
        Some(GeoCoord::new(41.0 + meters / 111_195.0, 2.0))
    }

    #[test]
    fn test_zero_spacing_accepts_everything() {
        let decisions = track_spacing([north(0.0), north(0.0), north(0.1)], 0.0);
        assert!(decisions.iter().all(|d| *d == SpacingDecision::Accepted));
    }

    #[test]
    fn test_accumulates_until_spacing_reached() {
        let fixes = [north(0.0), north(0.25), north(0.5), north(0.75), north(1.0)];
        let decisions = track_spacing(fixes, 0.6);
        assert_eq!(
            decisions,
            vec![
                SpacingDecision::Accepted,
                SpacingDecision::Redundant,
                SpacingDecision::Redundant,
                SpacingDecision::Accepted,
                SpacingDecision::Redundant,
            ]
        );
    }

    #[test]
    fn test_missing_fix_leaves_state_untouched() {
        let (state, _) = TrackerState::default().step(north(0.0), 1.0);
        let (after, decision) = state.step(None, 1.0);
        assert_eq!(decision, SpacingDecision::NoFix);
        assert_eq!(after, state);
    }
}
