pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use config::*;
pub use domain::{
    ChallengeEngine, ChallengeRecord, ChallengeRepository, ChallengeStore, ChallengeSummary,
    ChallengeWatcher, Clock, Error as EngineError, JoinOutcome, LeaderboardRanker, ManualClock,
    MetricMappings, ProgressOutcome, ProgressUpdate, SqliteChallengeRepository, SystemClock,
};
pub use infra::db::*;
pub use infra::MemoryChallengeRepository;
pub use startup::*;
