use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps the metric names emitted by activity sources onto requirement types.
///
/// Lookups ignore case and surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, String>", into = "HashMap<String, String>")]
pub struct MetricMappings {
    table: HashMap<String, String>,
}

impl MetricMappings {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            table: entries
                .into_iter()
                .map(|(metric, requirement)| {
                    (normalize(metric.as_ref()), normalize(requirement.as_ref()))
                })
                .collect(),
        }
    }

    pub fn requirement_type(&self, metric_type: &str) -> Option<&str> {
        self.table.get(&normalize(metric_type)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Both sides compared in lowercase so `Steps` and `steps` are the same type
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

impl Default for MetricMappings {
    fn default() -> Self {
        Self::new([
            ("reps", "reps"),
            ("workout_reps", "reps"),
            ("calories_burned", "calories"),
            ("calories", "calories"),
            ("steps", "steps"),
            ("step_count", "steps"),
            ("distance", "distance"),
            ("distance_km", "distance"),
        ])
    }
}

impl From<HashMap<String, String>> for MetricMappings {
    fn from(table: HashMap<String, String>) -> Self {
        Self::new(table)
    }
}

impl From<MetricMappings> for HashMap<String, String> {
    fn from(mappings: MetricMappings) -> Self {
        mappings.table
    }
}
