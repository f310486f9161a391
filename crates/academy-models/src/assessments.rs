//! Tests, subject marks, and the pure scoring rules behind them.
//!
//! A [`TestRecord`] never stores its totals independently: they are derived from
//! the subject list whenever the record is built or its marks are replaced, so
//! the two cannot drift apart.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use academy_core::{AppError, FieldErrors, validation};

use crate::ids::{BatchId, LevelId, StudentId, TestId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SubjectMark {
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub obtained: f64,
    #[validate(range(exclusive_min = 0.0, message = "must be greater than 0"))]
    pub total: f64,
}

impl SubjectMark {
    pub fn new(name: impl Into<String>, obtained: f64, total: f64) -> Self {
        Self {
            name: name.into(),
            obtained,
            total,
        }
    }
}

/// Checks a subject list: at least one subject, every total positive, every
/// mark finite and no larger than its total, and sums that stay finite. Paths look like `subjects[1].total`.
pub fn subject_errors(subjects: &[SubjectMark]) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if subjects.is_empty() {
        errors.push("subjects", "at least one subject is required");
        return errors;
    }

    for (index, subject) in subjects.iter().enumerate() {
        let prefix = format!("subjects[{}]", index);
        if !subject.obtained.is_finite() {
            errors.push(format!("{}.obtained", prefix), "must be a finite number");
        }
        if !subject.total.is_finite() {
            errors.push(format!("{}.total", prefix), "must be a finite number");
        }

        let rules = validation::field_errors(subject);
        let rules_flag_obtained = rules.contains_field("obtained");
        errors.extend_prefixed(&prefix, rules);

        if !rules_flag_obtained
            && subject.total > 0.0
            && subject.obtained > subject.total
        {
            errors.push(format!("{}.obtained", prefix), "must not exceed total");
        }
    }

    if errors.is_empty() {
        let score = Score::from_subjects(subjects);
        if !score.total_possible.is_finite() || !score.percent.is_finite() {
            errors.push("subjects", "combined totals are too large");
        }
    }
    errors
}

/// Totals derived from a subject list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub total_obtained: f64,
    pub total_possible: f64,
    pub percent: f64,
}

impl Score {
    pub fn from_subjects(subjects: &[SubjectMark]) -> Self {
        let total_obtained: f64 = subjects.iter().map(|s| s.obtained).sum();
        let total_possible: f64 = subjects.iter().map(|s| s.total).sum();
        let percent = if total_possible > 0.0 {
            total_obtained / total_possible * 100.0
        } else {
            0.0
        };

        Self {
            total_obtained,
            total_possible,
            percent,
        }
    }
}

/// Input for building a new [`TestRecord`].
#[derive(Debug, Clone)]
pub struct NewTest {
    pub student_id: StudentId,
    pub batch_id: BatchId,
    pub level: LevelId,
    pub name: Option<String>,
    pub date: NaiveDate,
    pub subjects: Vec<SubjectMark>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRecord {
    id: TestId,
    student_id: StudentId,
    batch_id: BatchId,
    level: LevelId,
    name: Option<String>,
    date: NaiveDate,
    subjects: Vec<SubjectMark>,
    #[serde(flatten)]
    score: Score,
}

impl TestRecord {
    pub fn new(test: NewTest) -> Result<Self, AppError> {
        Self::from_parts(TestId::new(), test)
    }

    /// Rebuilds a stored record, recomputing its totals from the subjects.
    pub fn from_parts(id: TestId, test: NewTest) -> Result<Self, AppError> {
        subject_errors(&test.subjects).into_result()?;
        let score = Score::from_subjects(&test.subjects);

        Ok(Self {
            id,
            student_id: test.student_id,
            batch_id: test.batch_id,
            level: test.level,
            name: test.name,
            date: test.date,
            subjects: test.subjects,
            score,
        })
    }

    /// Swaps in a corrected subject list and recomputes the totals.
    pub fn replace_subjects(&mut self, subjects: Vec<SubjectMark>) -> Result<(), AppError> {
        subject_errors(&subjects).into_result()?;
        self.score = Score::from_subjects(&subjects);
        self.subjects = subjects;
        Ok(())
    }

    pub fn id(&self) -> TestId {
        self.id
    }

    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn level(&self) -> LevelId {
        self.level
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn subjects(&self) -> &[SubjectMark] {
        &self.subjects
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn percent(&self) -> f64 {
        self.score.percent
    }
}

/// Aggregate of every test a student took at one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelSummary {
    pub level: LevelId,
    pub total_tests: usize,
    pub average_percent: f64,
    pub passing_percent: f64,
    pub passing_tests: usize,
}

impl LevelSummary {
    /// Summarizes `percents` against `passing_percent`. An empty input yields
    /// zero tests and a zero average.
    pub fn from_percents<I>(level: LevelId, percents: I, passing_percent: f64) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut total_tests = 0usize;
        let mut passing_tests = 0usize;
        let mut sum = 0.0;

        for percent in percents {
            total_tests += 1;
            sum += percent;
            if percent >= passing_percent {
                passing_tests += 1;
            }
        }

        let average_percent = if total_tests == 0 {
            0.0
        } else {
            sum / total_tests as f64
        };

        Self {
            level,
            total_tests,
            average_percent,
            passing_percent,
            passing_tests,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordTestDto {
    pub student_id: StudentId,
    pub batch_id: BatchId,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub level: i32,
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub name: Option<String>,
    pub date: NaiveDate,
    pub subjects: Vec<SubjectMark>,
}

impl RecordTestDto {
    pub fn field_errors(&self) -> FieldErrors {
        let mut errors = validation::field_errors(self);
        errors.append(subject_errors(&self.subjects));
        errors
    }
}

/// Corrected marks for an existing test. Totals are always recomputed.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTestMarksDto {
    pub subjects: Vec<SubjectMark>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkGradeEntry {
    pub student_id: StudentId,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub level: i32,
    pub subjects: Vec<SubjectMark>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkGradeDto {
    pub batch_id: BatchId,
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub test_name: String,
    pub date: NaiveDate,
    #[validate(length(min = 1, message = "at least one entry is required"))]
    pub entries: Vec<BulkGradeEntry>,
}

impl BulkGradeDto {
    /// Header problems plus every entry's problems, each entry validated on its
    /// own and prefixed `entries[i]`.
    pub fn field_errors(&self) -> FieldErrors {
        let mut errors = validation::field_errors(self);
        for (index, entry) in self.entries.iter().enumerate() {
            let mut entry_errors = validation::field_errors(entry);
            entry_errors.append(subject_errors(&entry.subjects));
            errors.extend_prefixed(&format!("entries[{}]", index), entry_errors);
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkGradeResponse {
    pub batch_id: BatchId,
    pub recorded: Vec<TestRecord>,
}
