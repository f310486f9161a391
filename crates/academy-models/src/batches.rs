//! Batch (cohort) entity, schedule, and enrollment DTOs.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use validator::Validate;

use academy_core::FieldErrors;

use crate::ids::{BatchId, LevelId, StudentId, TeacherId};

/// Days a batch meets plus the daily time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub days: Vec<Weekday>,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
}

impl Schedule {
    pub fn field_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.days.is_empty() {
            errors.push("schedule.days", "at least one day is required");
        }
        if self.starts_at >= self.ends_at {
            errors.push("schedule.ends_at", "must be later than starts_at");
        }
        errors
    }

    /// Days encoded as 0 = Monday .. 6 = Sunday, deduplicated and sorted.
    pub fn day_numbers(&self) -> Vec<i16> {
        let mut days: Vec<i16> = self
            .days
            .iter()
            .map(|d| d.num_days_from_monday() as i16)
            .collect();
        days.sort_unstable();
        days.dedup();
        days
    }

    pub fn days_from_numbers(numbers: &[i16]) -> Option<Vec<Weekday>> {
        numbers.iter().map(|n| weekday_from_number(*n)).collect()
    }
}

fn weekday_from_number(n: i16) -> Option<Weekday> {
    match n {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub name: String,
    pub level_id: LevelId,
    pub teacher_id: Option<TeacherId>,
    pub schedule: Schedule,
    /// `None` means unlimited.
    pub capacity: Option<i64>,
    pub active_enrollment_count: i64,
}

impl Batch {
    pub fn is_full(&self) -> bool {
        matches!(self.capacity, Some(max) if self.active_enrollment_count >= max)
    }

    /// Seats left, or `None` when capacity is unlimited.
    pub fn remaining(&self) -> Option<i64> {
        self.capacity
            .map(|max| (max - self.active_enrollment_count).max(0))
    }

    pub fn occupancy(&self) -> BatchOccupancy {
        BatchOccupancy {
            batch_id: self.id,
            active_enrollment_count: self.active_enrollment_count,
            capacity: self.capacity,
            remaining: self.remaining(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBatchDto {
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub level_id: i32,
    pub teacher_id: Option<TeacherId>,
    pub schedule: Schedule,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AssignStudentDto {
    pub student_id: StudentId,
    pub batch_id: BatchId,
}

/// Non-blocking warnings returned with a successful assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advisory {
    LevelMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentResponse {
    pub success: bool,
    pub student_id: StudentId,
    pub batch_id: BatchId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_batch_id: Option<BatchId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<Advisory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOccupancy {
    pub batch_id: BatchId,
    pub active_enrollment_count: i64,
    pub capacity: Option<i64>,
    pub remaining: Option<i64>,
}
