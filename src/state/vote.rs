use crate::types::*;
use std::collections::BTreeMap;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Aggregate statistics over a set of ballots.
///
/// "?" ballots count towards the total, the distribution and agreement, but
/// not towards the average.
pub fn compute_stats<'a>(ballots: impl IntoIterator<Item = &'a VoteValue>) -> VoteStats {
    let mut distribution: BTreeMap<String, u32> = BTreeMap::new();
    let mut total_votes = 0u32;
    let mut point_sum = 0u32;
    let mut point_count = 0u32;

    for vote in ballots {
        total_votes += 1;
        *distribution.entry(vote.to_string()).or_insert(0) += 1;
        if let Some(points) = vote.points() {
            point_sum += u32::from(points);
            point_count += 1;
        }
    }

    let average = if point_count > 0 {
        round_to(f64::from(point_sum) / f64::from(point_count), 1)
    } else {
        0.0
    };

    let agreement = match distribution.values().max() {
        Some(&max) if total_votes > 0 => round_to(f64::from(max) / f64::from(total_votes), 2),
        _ => 0.0,
    };

    VoteStats {
        total_votes,
        average,
        distribution,
        agreement,
    }
}
