use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::ChallengeRecord;
use crate::domain::Error;

/// Outcome of applying one progress delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub challenge_id: String,
    pub user_id: String,
    pub requirement_id: String,
    pub delta: f64,
    /// Accumulated value for the requirement after the delta
    pub progress: f64,
    pub completed: bool,
    /// True only on the update that flipped the participant to completed
    pub newly_completed: bool,
}

impl ChallengeRecord {
    /// Add a non-negative delta to one requirement and re-evaluate completion.
    /// A delta that would push the total past the largest finite value is rejected.
    ///
    /// Progress is accepted while the challenge is upcoming or active. Completion
    /// is one-way: once set it is never cleared.
    pub fn apply_progress(
        &mut self,
        user_id: &str,
        requirement_id: &str,
        delta: f64,
        now: OffsetDateTime,
    ) -> Result<ProgressUpdate, Error> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(Error::InvalidProgressDelta(delta));
        }
        self.ensure_open(now)?;

        if self.challenge.requirement(requirement_id).is_none() {
            return Err(Error::UnknownRequirement {
                challenge_id: self.id().to_string(),
                requirement_id: requirement_id.to_string(),
            });
        }

        let challenge_id = self.challenge.id.clone();
        let participant = self
            .participants
            .get_mut(user_id)
            .ok_or_else(|| Error::unknown_participant(&challenge_id, user_id))?;

        let progress = participant.progress_for(requirement_id) + delta;
        if !progress.is_finite() {
            return Err(Error::InvalidProgressDelta(delta));
        }
        participant
            .progress
            .insert(requirement_id.to_string(), progress);

        let newly_completed =
            !participant.completed && participant.meets_all(&self.challenge.requirements);
        if newly_completed {
            participant.completed = true;
            participant.completed_at = Some(now);
        }

        Ok(ProgressUpdate {
            challenge_id,
            user_id: user_id.to_string(),
            requirement_id: requirement_id.to_string(),
            delta,
            progress,
            completed: participant.completed,
            newly_completed,
        })
    }
}
