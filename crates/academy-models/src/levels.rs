use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ids::LevelId;

/// Threshold used when a level has no record or no configured passing percent.
pub const DEFAULT_PASSING_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub id: LevelId,
    pub name: String,
    pub passing_percent: Option<f64>,
}

impl Level {
    pub fn new(id: LevelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            passing_percent: None,
        }
    }

    pub fn with_passing_percent(mut self, percent: f64) -> Self {
        self.passing_percent = Some(percent);
        self
    }
}

/// Passing threshold for `level`, falling back to `default` when the level or
/// its threshold is missing.
pub fn passing_threshold(level: Option<&Level>, default: f64) -> f64 {
    level.and_then(|l| l.passing_percent).unwrap_or(default)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertLevelDto {
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub id: i32,
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(range(min = 0.0, max = 100.0, message = "must be between 0 and 100"))]
    pub passing_percent: Option<f64>,
}
