#![allow(dead_code)]

use std::sync::Arc;

use academy::events::RecordingEventSink;
use academy::modules::{EnrollmentService, PaymentService};
use academy::state::AppState;
use academy::store::{InMemoryStore, Store};
use academy_config::PolicyConfig;
use academy_core::AuthorizationContext;
use academy_models::{
    Batch, CreateBatchDto, CreateFeeDto, Fee, Level, LevelId, ParentContact, Schedule, Student,
    StudentId, SubjectMark, SubmitPaymentDto, FeePayment,
};
use chrono::{NaiveDate, NaiveTime, Weekday};
use rust_decimal::Decimal;
use uuid::Uuid;

/// An in-memory application with a recording event sink and one caller per role.
pub struct TestApp {
    pub state: AppState,
    pub store: InMemoryStore,
    pub events: Arc<RecordingEventSink>,
    pub admin: AuthorizationContext,
    pub teacher: AuthorizationContext,
    pub parent: AuthorizationContext,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_policy(PolicyConfig::default())
    }

    pub fn with_policy(policy: PolicyConfig) -> Self {
        let store = InMemoryStore::new();
        let events = Arc::new(RecordingEventSink::new());
        let state = AppState::new(Arc::new(store.clone()), events.clone(), policy);

        Self {
            state,
            store,
            events,
            admin: AuthorizationContext::admin(Uuid::new_v4()),
            teacher: AuthorizationContext::teacher(Uuid::new_v4()),
            parent: AuthorizationContext::parent(Uuid::new_v4()),
        }
    }

    /// Writes an active student at `level` straight to the store.
    pub async fn create_student(&self, level: i32) -> Student {
        let student = Student::new(
            format!("Student {}", Uuid::new_v4().simple()),
            LevelId(level),
            ParentContact {
                name: "Parent".to_string(),
                email: Some("parent@example.com".to_string()),
                phone: None,
            },
        );
        self.save_student(&student).await;
        student
    }

    pub async fn save_student(&self, student: &Student) {
        let mut tx = self.store.begin().await.unwrap();
        tx.save_student(student).await.unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn create_level(&self, id: i32, passing_percent: Option<f64>) -> Level {
        let level = Level {
            id: LevelId(id),
            name: format!("Level {}", id),
            passing_percent,
        };
        let mut tx = self.store.begin().await.unwrap();
        tx.save_level(&level).await.unwrap();
        tx.commit().await.unwrap();
        level
    }

    pub async fn create_batch(&self, level: i32, capacity: Option<i64>) -> Batch {
        EnrollmentService::create_batch(&self.state, &self.admin, batch_dto(level, capacity))
            .await
            .unwrap()
    }

    pub async fn create_fee(&self, student_id: StudentId, amount: Decimal) -> Fee {
        let dto = CreateFeeDto {
            student_id,
            amount,
            due_date: date(2026, 1, 31),
        };
        PaymentService::assess_fee(&self.state, &self.admin, dto)
            .await
            .unwrap()
    }

    pub async fn submit_payment(&self, fee: &Fee, amount: Decimal) -> FeePayment {
        let dto = SubmitPaymentDto {
            fee_id: fee.id,
            student_id: fee.student_id,
            amount,
            transaction_id: format!("TXN-{}", Uuid::new_v4().simple()),
            receipt_ref: None,
        };
        PaymentService::submit_payment(&self.state, &self.parent, dto)
            .await
            .unwrap()
    }

    pub async fn student(&self, id: StudentId) -> Student {
        self.store.student(id).await.unwrap().unwrap()
    }
}

pub fn batch_dto(level: i32, capacity: Option<i64>) -> CreateBatchDto {
    CreateBatchDto {
        name: format!("Batch {}", Uuid::new_v4().simple()),
        level_id: level,
        teacher_id: None,
        schedule: evening_schedule(),
        capacity,
    }
}

pub fn evening_schedule() -> Schedule {
    Schedule {
        days: vec![Weekday::Mon, Weekday::Wed],
        starts_at: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        ends_at: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
    }
}

pub fn mark(name: &str, obtained: f64, total: f64) -> SubjectMark {
    SubjectMark::new(name, obtained, total)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
