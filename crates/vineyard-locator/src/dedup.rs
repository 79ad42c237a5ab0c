//! Parcel claim deduplication

use crate::config::DistanceMetric;
use std::collections::HashMap;
use tracing::debug;
use vineyard_core::{Assignment, Candidate, Localization, UnresolvedObservation};

impl DistanceMetric {
    pub fn of(&self, candidate: &Candidate) -> f64 {
        match self {
            DistanceMetric::MatchDistance => candidate.match_distance,
            DistanceMetric::RayDistance => candidate.ray_distance,
        }
    }
}

/// Resolves parcels claimed by more than one observation
pub struct AssignmentDeduplicator {
    metric: DistanceMetric,
}

impl AssignmentDeduplicator {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }

    /// One assignment per localization, in input order.
    ///
    /// Each parcel goes to the claimant with the smallest distance; ties go to
    /// the lowest observation index. Losers keep their candidate data.
    pub fn resolve(&self, localizations: &[Localization]) -> Vec<Assignment> {
        let mut winners: HashMap<usize, (usize, f64)> = HashMap::new();
        for (i, localization) in localizations.iter().enumerate() {
            let Some(candidate) = localization.candidate() else {
                continue;
            };
            let distance = self.metric.of(candidate);
            winners
                .entry(candidate.parcel_index)
                .and_modify(|best| {
                    if distance.total_cmp(&best.1).is_lt() {
                        *best = (i, distance);
                    }
                })
                .or_insert((i, distance));
        }

        let assignments: Vec<Assignment> = localizations
            .iter()
            .enumerate()
            .map(|(i, localization)| match localization {
                Localization::Located(candidate) => {
                    let won = winners.get(&candidate.parcel_index).is_some_and(|(w, _)| *w == i);
                    Assignment {
                        observation_index: i,
                        parcel_index: won.then_some(candidate.parcel_index),
                        candidate: Some(*candidate),
                        unresolved: (!won).then_some(UnresolvedObservation::DuplicateClaim),
                    }
                }
                Localization::Unassigned(reason) => Assignment {
                    observation_index: i,
                    parcel_index: None,
                    candidate: None,
                    unresolved: Some(*reason),
                },
            })
            .collect();

        debug!(
            observations = localizations.len(),
            parcels_claimed = winners.len(),
            "Claims deduplicated"
        );
        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use vineyard_core::PixelPoint;

    fn located(parcel_index: usize, match_distance: f64, ray_distance: f64) -> Localization {
        Localization::Located(Candidate {
            parcel_index,
            row_index: Some(0),
            drone_pixel: PixelPoint::ORIGIN,
            intersection: PixelPoint::ORIGIN,
            ray_distance,
            match_distance,
        })
    }

    #[test]
    fn test_closest_claim_wins() {
        let localizations = vec![located(3, 5.0, 1.0), located(3, 2.0, 9.0)];
        let out = AssignmentDeduplicator::new(DistanceMetric::MatchDistance).resolve(&localizations);

        assert_eq!(out[0].parcel_index, None);
        assert_eq!(out[0].unresolved, Some(UnresolvedObservation::DuplicateClaim));
        assert_eq!(out[0].candidate.map(|c| c.parcel_index), Some(3));
        assert_eq!(out[1].parcel_index, Some(3));
        assert_eq!(out[1].unresolved, None);
    }

    #[test]
    fn test_ray_metric_flips_winner() {
        let localizations = vec![located(3, 5.0, 1.0), located(3, 2.0, 9.0)];
        let out = AssignmentDeduplicator::new(DistanceMetric::RayDistance).resolve(&localizations);
        assert_eq!(out[0].parcel_index, Some(3));
        assert_eq!(out[1].parcel_index, None);
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        let localizations = vec![located(1, 4.0, 0.0), located(1, 4.0, 0.0), located(1, 4.0, 0.0)];
        let out = AssignmentDeduplicator::new(DistanceMetric::MatchDistance).resolve(&localizations);
        let winners: Vec<usize> = out.iter().filter(|a| a.is_assigned()).map(|a| a.observation_index).collect();
        assert_eq!(winners, vec![0]);
    }

    #[test]
    fn test_unassigned_pass_through() {
        let localizations = vec![
            Localization::Unassigned(UnresolvedObservation::NoDetections),
            located(0, 1.0, 1.0),
        ];
        let out = AssignmentDeduplicator::new(DistanceMetric::MatchDistance).resolve(&localizations);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].unresolved, Some(UnresolvedObservation::NoDetections));
        assert_eq!(out[1].parcel_index, Some(0));
    }

    proptest! {
        #[test]
        fn test_no_parcel_assigned_twice(
            claims in prop::collection::vec((0usize..8, 0.0f64..50.0, proptest::bool::ANY), 0..60)
        ) {
            let localizations: Vec<Localization> = claims
                .iter()
                .map(|&(parcel, distance, located_frame)| {
                    if located_frame {
                        located(parcel, distance, distance)
                    } else {
                        Localization::Unassigned(UnresolvedObservation::MissingGps)
                    }
                })
                .collect();

            let out = AssignmentDeduplicator::new(DistanceMetric::MatchDistance).resolve(&localizations);
            prop_assert_eq!(out.len(), localizations.len());

            let mut seen = HashSet::new();
            for assignment in &out {
                if let Some(parcel) = assignment.parcel_index {
                    prop_assert!(seen.insert(parcel));
                }
            }

            // every claimed parcel keeps exactly one winner
            let claimed: HashSet<usize> = localizations.iter().filter_map(|l| l.candidate()).map(|c| c.parcel_index).collect();
            prop_assert_eq!(seen, claimed);
        }
    }
}
