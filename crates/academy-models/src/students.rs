//! Student entity.
//!
//! Only the batch assignment is owned by the core; name, contact and status are
//! maintained by the request layer and read here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, LevelId, StudentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentStatus {
    Active,
    Inactive,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "ACTIVE",
            StudentStatus::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(StudentStatus::Active),
            "INACTIVE" => Ok(StudentStatus::Inactive),
            other => Err(format!("unknown student status '{}'", other)),
        }
    }
}

/// Who to reach about a student.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParentContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub parent: ParentContact,
    pub current_level: LevelId,
    pub batch_id: Option<BatchId>,
    pub status: StudentStatus,
}

impl Student {
    /// A fresh, active student with no batch.
    pub fn new(name: impl Into<String>, current_level: LevelId, parent: ParentContact) -> Self {
        Self {
            id: StudentId::new(),
            name: name.into(),
            parent,
            current_level,
            batch_id: None,
            status: StudentStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_student_defaults() {
        let student = Student::new("Ada", LevelId(2), ParentContact::default());
        assert!(student.is_active());
        assert_eq!(student.batch_id, None);
        assert_eq!(student.current_level, LevelId(2));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [StudentStatus::Active, StudentStatus::Inactive] {
            assert_eq!(status.as_str().parse::<StudentStatus>().unwrap(), status);
        }
        assert!("GRADUATED".parse::<StudentStatus>().is_err());
    }
}
