use std::time::Instant;

use chrono::{Days, NaiveTime, Utc, Weekday};
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use rand::Rng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;

use academy_core::AppError;
use academy_models::{
    Batch, BatchId, Fee, Level, LevelId, ParentContact, Schedule, Student,
};

use crate::store::Store;

const WEEKDAYS: [Weekday; 6] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

#[derive(Debug, Clone, Copy)]
pub struct SeedPlan {
    pub levels: i32,
    pub batches_per_level: usize,
    pub students: usize,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            levels: 3,
            batches_per_level: 2,
            students: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub levels: usize,
    pub batches: usize,
    pub students: usize,
    pub fees: usize,
}

/// Fills the store with fake levels, batches, students and one fee per student.
///
/// Records are generated in parallel with rayon and written in one
/// transaction. Students start without a batch.
pub async fn seed_database(store: &dyn Store, plan: SeedPlan) -> Result<SeedSummary, AppError> {
    if plan.levels < 1 {
        return Err(AppError::validation("levels", "must be at least 1"));
    }

    let start = Instant::now();

    let levels: Vec<Level> = LevelId(plan.levels)
        .up_to()
        .map(|id| Level::new(id, format!("Level {}", id)).with_passing_percent(40.0 + 5.0 * id.get() as f64))
        .collect();

    let batches = generate_batches(plan.levels, plan.batches_per_level);
    let students = generate_students(plan.students, plan.levels);
    let fees: Vec<Fee> = students.par_iter().map(generate_fee).collect();

    tracing::info!(
        levels = levels.len(),
        batches = batches.len(),
        students = students.len(),
        elapsed = ?start.elapsed(),
        "seed data generated"
    );

    let mut tx = store.begin().await?;
    for level in &levels {
        tx.save_level(level).await?;
    }
    for batch in &batches {
        tx.save_batch(batch).await?;
    }
    for student in &students {
        tx.save_student(student).await?;
    }
    for fee in &fees {
        tx.save_fee(fee).await?;
    }
    tx.commit().await?;

    tracing::info!(elapsed = ?start.elapsed(), "seed data written");

    Ok(SeedSummary {
        levels: levels.len(),
        batches: batches.len(),
        students: students.len(),
        fees: fees.len(),
    })
}

fn generate_batches(levels: i32, per_level: usize) -> Vec<Batch> {
    let specs: Vec<(LevelId, usize)> = LevelId(levels)
        .up_to()
        .flat_map(|level| (0..per_level).map(move |n| (level, n)))
        .collect();

    specs
        .into_par_iter()
        .map(|(level, n)| {
            let mut rng = rand::thread_rng();
            let mut days: Vec<Weekday> = WEEKDAYS
                .choose_multiple(&mut rng, 2)
                .copied()
                .collect();
            days.sort_by_key(|d| d.num_days_from_monday());

            let start_hour = rng.gen_range(8..18);
            let starts_at = NaiveTime::from_hms_opt(start_hour, 0, 0).unwrap_or(NaiveTime::MIN);
            let ends_at = NaiveTime::from_hms_opt(start_hour + 2, 0, 0).unwrap_or(NaiveTime::MIN);

            Batch {
                id: BatchId::new(),
                name: format!("Level {} {}", level, char::from(b'A' + (n % 26) as u8)),
                level_id: level,
                teacher_id: None,
                schedule: Schedule {
                    days,
                    starts_at,
                    ends_at,
                },
                capacity: Some(rng.gen_range(10..=30)),
                active_enrollment_count: 0,
            }
        })
        .collect()
}

fn generate_students(count: usize, levels: i32) -> Vec<Student> {
    (0..count)
        .into_par_iter()
        .map(|_| {
            let mut rng = rand::thread_rng();
            let first: String = FirstName().fake();
            let last: String = LastName().fake();
            let parent = ParentContact {
                name: Name().fake(),
                email: Some(SafeEmail().fake()),
                phone: Some(PhoneNumber().fake()),
            };
            Student::new(
                format!("{} {}", first, last),
                LevelId(rng.gen_range(1..=levels)),
                parent,
            )
        })
        .collect()
}

fn generate_fee(student: &Student) -> Fee {
    let mut rng = rand::thread_rng();
    let amount = Decimal::from(rng.gen_range(10..=50) * 100);
    let today = Utc::now().date_naive();
    let due = today.checked_add_days(Days::new(30)).unwrap_or(today);
    Fee::new(student.id, amount, due)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_generated_batches_have_valid_schedules() {
        let batches = generate_batches(2, 3);
        assert_eq!(batches.len(), 6);
        for batch in &batches {
            assert!(batch.schedule.field_errors().is_empty());
            assert!(batch.level_id.is_valid());
            assert_eq!(batch.active_enrollment_count, 0);
        }
    }

    #[tokio::test]
    async fn test_seed_writes_everything() {
        let store = InMemoryStore::new();
        let plan = SeedPlan {
            levels: 2,
            batches_per_level: 1,
            students: 10,
        };

        let summary = seed_database(&store, plan).await.unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                levels: 2,
                batches: 2,
                students: 10,
                fees: 10,
            }
        );
        assert!(store.level(LevelId(2)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_seed_rejects_zero_levels() {
        let store = InMemoryStore::new();
        let plan = SeedPlan {
            levels: 0,
            ..SeedPlan::default()
        };
        assert!(seed_database(&store, plan).await.is_err());
    }
}
