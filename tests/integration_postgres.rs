//! PostgreSQL adapter tests. They need `DATABASE_URL` pointing at a server
//! where `sqlx::test` may create scratch databases:
//!
//! ```bash
//! cargo test --test integration_postgres -- --ignored
//! ```

mod common;

use std::sync::Arc;
use std::time::Duration;

use academy::events::RecordingEventSink;
use academy::modules::{EnrollmentService, PaymentService, ScoringService};
use academy::state::AppState;
use academy::store::{PgStore, Store};
use academy_config::PolicyConfig;
use academy_core::{AppError, AuthorizationContext, ErrorKind};
use academy_models::{
    ApprovePaymentDto, AssignStudentDto, CreateFeeDto, FeeStatus, LevelId, ParentContact,
    RecordTestDto, Student, SubmitPaymentDto,
};
use common::{batch_dto, date, mark};
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

fn pg_state(pool: PgPool) -> (AppState, Arc<RecordingEventSink>) {
    let events = Arc::new(RecordingEventSink::new());
    let store = PgStore::new(pool, Duration::from_secs(5));
    let state = AppState::new(Arc::new(store), events.clone(), PolicyConfig::default());
    (state, events)
}

async fn insert_student(state: &AppState, level: i32) -> Student {
    let student = Student::new("Grace Hopper", LevelId(level), ParentContact::default());
    let mut tx = state.store.begin().await.unwrap();
    tx.save_student(&student).await.unwrap();
    tx.commit().await.unwrap();
    student
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL server"]
async fn test_pg_store_round_trips_entities(pool: PgPool) {
    let (state, _) = pg_state(pool);
    let admin = AuthorizationContext::admin(Uuid::new_v4());

    let student = insert_student(&state, 2).await;
    let batch = EnrollmentService::create_batch(&state, &admin, batch_dto(2, Some(10)))
        .await
        .unwrap();

    assert_eq!(state.store.student(student.id).await.unwrap(), Some(student));
    assert_eq!(state.store.batch(batch.id).await.unwrap(), Some(batch));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL server"]
async fn test_pg_capacity_race(pool: PgPool) {
    let (state, _) = pg_state(pool);
    let admin = AuthorizationContext::admin(Uuid::new_v4());
    let batch = EnrollmentService::create_batch(&state, &admin, batch_dto(1, Some(2)))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let student = insert_student(&state, 1).await;
        let state = state.clone();
        let dto = AssignStudentDto {
            student_id: student.id,
            batch_id: batch.id,
        };
        handles.push(tokio::spawn(async move {
            EnrollmentService::assign_student(&state, &admin, dto).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::CapacityExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(succeeded, 2);
    let stored = state.store.batch(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.active_enrollment_count, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL server"]
async fn test_pg_tests_and_summary(pool: PgPool) {
    let (state, _) = pg_state(pool);
    let admin = AuthorizationContext::admin(Uuid::new_v4());
    let student = insert_student(&state, 1).await;
    let batch = EnrollmentService::create_batch(&state, &admin, batch_dto(1, None))
        .await
        .unwrap();

    let record = ScoringService::record_test(
        &state,
        &admin,
        RecordTestDto {
            student_id: student.id,
            batch_id: batch.id,
            level: 1,
            name: None,
            date: date(2026, 3, 14),
            subjects: vec![mark("Maths", 45.0, 50.0), mark("Science", 30.0, 50.0)],
        },
    )
    .await
    .unwrap();

    let stored = state
        .store
        .tests_for_student(student.id, LevelId(1))
        .await
        .unwrap();
    assert_eq!(stored, vec![record]);

    let summary = ScoringService::level_summary(&state, &admin, student.id, LevelId(1))
        .await
        .unwrap();
    assert_eq!(summary.total_tests, 1);
    assert_eq!(summary.average_percent, 75.0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL server"]
async fn test_pg_payment_approval(pool: PgPool) {
    let (state, events) = pg_state(pool);
    let admin = AuthorizationContext::admin(Uuid::new_v4());
    let parent = AuthorizationContext::parent(Uuid::new_v4());
    let student = insert_student(&state, 1).await;

    let fee = PaymentService::assess_fee(
        &state,
        &admin,
        CreateFeeDto {
            student_id: student.id,
            amount: dec!(5000),
            due_date: date(2026, 1, 31),
        },
    )
    .await
    .unwrap();
    let payment = PaymentService::submit_payment(
        &state,
        &parent,
        SubmitPaymentDto {
            fee_id: fee.id,
            student_id: student.id,
            amount: dec!(5000),
            transaction_id: "TXN-42".to_string(),
            receipt_ref: Some("receipts/42.pdf".to_string()),
        },
    )
    .await
    .unwrap();

    let decision =
        PaymentService::approve_payment(&state, &admin, payment.id, ApprovePaymentDto::default())
            .await
            .unwrap();
    assert_eq!(decision.fee_status, Some(FeeStatus::Paid));

    let err =
        PaymentService::approve_payment(&state, &admin, payment.id, ApprovePaymentDto::default())
            .await
            .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    let stored = state.store.fee(fee.id).await.unwrap().unwrap();
    assert_eq!(stored.paid_amount, dec!(5000));
    assert_eq!(events.events().len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL server"]
async fn test_pg_delete_batch_keeps_test_history(pool: PgPool) {
    let (state, _) = pg_state(pool);
    let admin = AuthorizationContext::admin(Uuid::new_v4());
    let student = insert_student(&state, 1).await;
    let batch = EnrollmentService::create_batch(&state, &admin, batch_dto(1, None))
        .await
        .unwrap();

    ScoringService::record_test(
        &state,
        &admin,
        RecordTestDto {
            student_id: student.id,
            batch_id: batch.id,
            level: 1,
            name: Some("Unit 3".to_string()),
            date: date(2026, 4, 2),
            subjects: vec![mark("Maths", 40.0, 50.0)],
        },
    )
    .await
    .unwrap();

    let err = EnrollmentService::delete_batch(&state, &admin, batch.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // the schema refuses the delete even when the service check is bypassed
    let mut tx = state.store.begin().await.unwrap();
    let err = tx.remove_batch(batch.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    tx.rollback().await.unwrap();

    let summary = ScoringService::level_summary(&state, &admin, student.id, LevelId(1))
        .await
        .unwrap();
    assert_eq!(summary.total_tests, 1);
}
