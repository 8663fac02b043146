use arena_core::{LeaderboardEntry, Team, TeamStanding};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

use super::standing_order;

/// Refresh team aggregates from the latest individual leaderboard and rank
/// the teams by total score.
///
/// Scores come only from the leaderboard pass: a team's totals are never
/// adjusted on their own. Empty teams keep a zero total and average.
pub fn recompute_teams(
    teams: &mut BTreeMap<String, Team>,
    leaderboard: &[LeaderboardEntry],
) -> Vec<TeamStanding> {
    let mut member_scores: HashMap<&str, (usize, f64)> = HashMap::new();
    for entry in leaderboard {
        if let Some(team_id) = entry.team.as_deref() {
            let totals = member_scores.entry(team_id).or_insert((0, 0.0));
            totals.0 += 1;
            totals.1 += entry.score;
        }
    }

    for team in teams.values_mut() {
        let (member_count, total_score) = member_scores
            .get(team.id.as_str())
            .copied()
            .unwrap_or((0, 0.0));
        team.total_score = total_score;
        team.average_score = if member_count == 0 {
            0.0
        } else {
            total_score / member_count as f64
        };
    }

    teams
        .values()
        .sorted_by(|a, b| {
            standing_order(
                (a.total_score, a.created_at, a.id.as_str()),
                (b.total_score, b.created_at, b.id.as_str()),
            )
        })
        .enumerate()
        .map(|(position, team)| TeamStanding {
            team_id: team.id.clone(),
            member_count: member_scores
                .get(team.id.as_str())
                .map(|(count, _)| *count)
                .unwrap_or(0),
            total_score: team.total_score,
            average_score: team.average_score,
            rank: position + 1,
        })
        .collect()
}
