//! Validation applied to challenges before they are stored

use std::collections::HashSet;

use crate::{CoreError, CreateChallenge, Requirement, Reward};

/// Validate a challenge definition
pub fn validate_challenge(challenge: &CreateChallenge) -> Result<(), CoreError> {
    if challenge.title.trim().is_empty() {
        return Err(CoreError::Validation("title cannot be empty".into()));
    }

    if let Some(id) = &challenge.id {
        if id.trim().is_empty() {
            return Err(CoreError::Validation("id cannot be blank".into()));
        }
    }

    if challenge.end_date <= challenge.start_date {
        return Err(CoreError::Validation(format!(
            "end date {} must be after start date {}",
            challenge.end_date, challenge.start_date
        )));
    }

    if challenge.max_participants == Some(0) {
        return Err(CoreError::Validation(
            "max_participants must allow at least one participant".into(),
        ));
    }

    validate_requirements(&challenge.requirements)?;
    validate_rewards(&challenge.rewards)?;

    Ok(())
}

/// Validate requirement ids and targets
pub fn validate_requirements(requirements: &[Requirement]) -> Result<(), CoreError> {
    if requirements.is_empty() {
        return Err(CoreError::InvalidRequirement(
            "at least one requirement required".into(),
        ));
    }

    let mut seen = HashSet::new();
    for requirement in requirements {
        if requirement.id.is_empty() {
            return Err(CoreError::InvalidRequirement("id cannot be empty".into()));
        }
        if !seen.insert(requirement.id.as_str()) {
            return Err(CoreError::InvalidRequirement(format!(
                "duplicate requirement id {}",
                requirement.id
            )));
        }
        if !requirement.target.is_finite() || requirement.target <= 0.0 {
            return Err(CoreError::InvalidRequirement(format!(
                "target for {} must be positive, got {}",
                requirement.id, requirement.target
            )));
        }
    }

    Ok(())
}

/// Validate reward ids
pub fn validate_rewards(rewards: &[Reward]) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for reward in rewards {
        if reward.id.is_empty() {
            return Err(CoreError::InvalidReward("id cannot be empty".into()));
        }
        if !seen.insert(reward.id.as_str()) {
            return Err(CoreError::InvalidReward(format!(
                "duplicate reward id {}",
                reward.id
            )));
        }
    }

    Ok(())
}
