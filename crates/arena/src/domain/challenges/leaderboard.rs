//! Deterministic ranking of participants within a challenge
//!
//! Ranking is a pure function of the current roster: scores are derived from
//! progress, then sorted with a total order so identical inputs always yield
//! identical ranks.

use arena_core::{Challenge, LeaderboardEntry, Participant, ProgressMetric, Requirement};
use itertools::Itertools;
use log::debug;
use std::cmp::Ordering;
use time::OffsetDateTime;

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Capped completion percentage of one requirement, 0 to 100
pub fn requirement_percent(participant: &Participant, requirement: &Requirement) -> f64 {
    if requirement.target <= 0.0 {
        return 0.0;
    }
    (participant.progress_for(&requirement.id) / requirement.target).min(1.0) * 100.0
}

/// Mean of capped per-requirement completion across every requirement
pub fn completion_percent(participant: &Participant, requirements: &[Requirement]) -> f64 {
    if requirements.is_empty() {
        return 0.0;
    }
    let sum: f64 = requirements
        .iter()
        .map(|requirement| requirement_percent(participant, requirement))
        .sum();
    sum / requirements.len() as f64
}

pub fn participant_score(participant: &Participant, challenge: &Challenge) -> f64 {
    match challenge.progress_metric {
        ProgressMetric::Total => challenge
            .requirements
            .iter()
            .map(|requirement| participant.progress_for(&requirement.id))
            .sum(),
        ProgressMetric::Average | ProgressMetric::CompletionRate => {
            completion_percent(participant, &challenge.requirements)
        }
    }
}

/// Higher score first, then earlier join, then smaller key
pub(crate) fn standing_order(
    (a_score, a_since, a_key): (f64, OffsetDateTime, &str),
    (b_score, b_since, b_key): (f64, OffsetDateTime, &str),
) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| a_since.cmp(&b_since))
        .then_with(|| a_key.cmp(b_key))
}

struct Scored<'a> {
    participant: &'a Participant,
    score: f64,
    progress_percent: f64,
}

#[derive(Debug, Clone)]
pub struct LeaderboardRanker {
    batch_size: usize,
}

impl Default for LeaderboardRanker {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl LeaderboardRanker {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Rank every participant, ranks forming 1..=N with no gaps.
    ///
    /// Scoring walks the roster in fixed size batches so the work for very
    /// large rosters stays bounded per step.
    pub fn recompute<'a, I>(&self, challenge: &Challenge, participants: I) -> Vec<LeaderboardEntry>
    where
        I: IntoIterator<Item = &'a Participant>,
    {
        let mut scored: Vec<Scored<'a>> = vec![];
        for (batch_index, batch) in participants
            .into_iter()
            .chunks(self.batch_size)
            .into_iter()
            .enumerate()
        {
            let before = scored.len();
            scored.extend(batch.map(|participant| Scored {
                participant,
                score: participant_score(participant, challenge),
                progress_percent: completion_percent(participant, &challenge.requirements),
            }));
            debug!(
                "scored batch {} of challenge {} ({} participants)",
                batch_index,
                challenge.id,
                scored.len() - before
            );
        }

        scored
            .into_iter()
            .sorted_by(|a, b| {
                standing_order(
                    (a.score, a.participant.joined_at, a.participant.user_id.as_str()),
                    (b.score, b.participant.joined_at, b.participant.user_id.as_str()),
                )
            })
            .enumerate()
            .map(|(position, scored)| LeaderboardEntry {
                user_id: scored.participant.user_id.clone(),
                score: scored.score,
                progress_percent: scored.progress_percent,
                rank: position + 1,
                team: scored.participant.team.clone(),
            })
            .collect()
    }
}
