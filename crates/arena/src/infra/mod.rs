pub mod db;
pub mod file_utils;
mod memory_store;

pub use memory_store::MemoryChallengeRepository;
