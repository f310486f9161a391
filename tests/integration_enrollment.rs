mod common;

use academy::modules::{EnrollmentService, ScoringService};
use academy::store::Store;
use academy_config::{LevelMismatchPolicy, PolicyConfig};
use academy_core::{AppError, ErrorKind};
use academy_models::{
    Advisory, AssignStudentDto, BatchId, DomainEvent, LevelId, RecordTestDto, StudentStatus,
};
use common::{TestApp, batch_dto, date, mark};

fn assign(student: &academy_models::Student, batch: &academy_models::Batch) -> AssignStudentDto {
    AssignStudentDto {
        student_id: student.id,
        batch_id: batch.id,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assignments_never_exceed_capacity() {
    let app = TestApp::new();
    let batch = app.create_batch(1, Some(3)).await;

    let mut students = Vec::new();
    for _ in 0..10 {
        students.push(app.create_student(1).await);
    }

    let handles: Vec<_> = students
        .iter()
        .map(|student| {
            let state = app.state.clone();
            let ctx = app.teacher;
            let dto = assign(student, &batch);
            tokio::spawn(async move { EnrollmentService::assign_student(&state, &ctx, dto).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::CapacityExceeded { current, max, .. }) => {
                assert_eq!(current, 3);
                assert_eq!(max, 3);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(rejected, 7);

    let stored = app.store.batch(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.active_enrollment_count, 3);

    let mut enrolled = 0;
    for student in &students {
        if app.student(student.id).await.batch_id == Some(batch.id) {
            enrolled += 1;
        }
    }
    assert_eq!(enrolled, 3);

    let events = app.events.events();
    let successes = events
        .iter()
        .filter(|e| matches!(e, DomainEvent::EnrollmentSucceeded { .. }))
        .count();
    let overflows = events
        .iter()
        .filter(|e| matches!(e, DomainEvent::CapacityExceeded { .. }))
        .count();
    assert_eq!(successes, 3);
    assert_eq!(overflows, 7);
}

#[tokio::test]
async fn test_assign_to_unlimited_batch() {
    let app = TestApp::new();
    let batch = app.create_batch(1, None).await;
    let student = app.create_student(1).await;

    let outcome = EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.batch_id, batch.id);
    assert_eq!(outcome.previous_batch_id, None);
    assert_eq!(outcome.advisory, None);
    assert_eq!(app.student(student.id).await.batch_id, Some(batch.id));
    assert_eq!(
        app.events.events(),
        vec![DomainEvent::EnrollmentSucceeded {
            student_id: student.id,
            batch_id: batch.id,
        }]
    );
}

#[tokio::test]
async fn test_reassign_moves_count_between_batches() {
    let app = TestApp::new();
    let first = app.create_batch(1, Some(5)).await;
    let second = app.create_batch(1, Some(5)).await;
    let student = app.create_student(1).await;

    EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &first))
        .await
        .unwrap();
    let outcome = EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &second))
        .await
        .unwrap();

    assert_eq!(outcome.previous_batch_id, Some(first.id));
    let first = app.store.batch(first.id).await.unwrap().unwrap();
    let second = app.store.batch(second.id).await.unwrap().unwrap();
    assert_eq!(first.active_enrollment_count, 0);
    assert_eq!(second.active_enrollment_count, 1);
}

#[tokio::test]
async fn test_reassign_to_same_batch_keeps_count() {
    let app = TestApp::new();
    let batch = app.create_batch(1, Some(1)).await;
    let student = app.create_student(1).await;

    EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap();
    // The batch is now full; staying in it still succeeds.
    let outcome = EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap();

    assert!(outcome.success);
    let stored = app.store.batch(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.active_enrollment_count, 1);
}

#[tokio::test]
async fn test_level_mismatch_is_advisory_by_default() {
    let app = TestApp::new();
    let batch = app.create_batch(2, None).await;
    let student = app.create_student(1).await;

    let outcome = EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap();

    assert_eq!(outcome.advisory, Some(Advisory::LevelMismatch));
    assert_eq!(app.student(student.id).await.batch_id, Some(batch.id));
}

#[tokio::test]
async fn test_level_mismatch_blocked_by_policy() {
    let app = TestApp::with_policy(PolicyConfig {
        level_mismatch: LevelMismatchPolicy::Block,
        ..PolicyConfig::default()
    });
    let batch = app.create_batch(2, None).await;
    let student = app.create_student(1).await;

    let err = EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.field_errors().unwrap().contains_field("batch_id"));
    assert_eq!(app.student(student.id).await.batch_id, None);
    let stored = app.store.batch(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.active_enrollment_count, 0);
}

#[tokio::test]
async fn test_level_mismatch_blocked_when_reassigning_same_batch() {
    let app = TestApp::with_policy(PolicyConfig {
        level_mismatch: LevelMismatchPolicy::Block,
        ..PolicyConfig::default()
    });
    let batch = app.create_batch(2, Some(5)).await;
    let student = app.create_student(2).await;
    EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap();

    // promoted after enrolling, so the batch no longer matches
    let mut promoted = app.student(student.id).await;
    promoted.current_level = LevelId(3);
    app.save_student(&promoted).await;

    let err = EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.field_errors().unwrap().contains_field("batch_id"));
    assert_eq!(app.student(student.id).await.batch_id, Some(batch.id));
    let stored = app.store.batch(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.active_enrollment_count, 1);
}

#[tokio::test]
async fn test_assign_rejects_inactive_student() {
    let app = TestApp::new();
    let batch = app.create_batch(1, None).await;
    let mut student = app.create_student(1).await;
    student.status = StudentStatus::Inactive;
    app.save_student(&student).await;

    let err = EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_assign_missing_entities() {
    let app = TestApp::new();
    let batch = app.create_batch(1, None).await;
    let student = app.create_student(1).await;

    let err = EnrollmentService::assign_student(
        &app.state,
        &app.admin,
        AssignStudentDto {
            student_id: academy_models::StudentId::new(),
            batch_id: batch.id,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = EnrollmentService::assign_student(
        &app.state,
        &app.admin,
        AssignStudentDto {
            student_id: student.id,
            batch_id: BatchId::new(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_failed_commit_leaves_no_partial_assignment() {
    let app = TestApp::new();
    let batch = app.create_batch(1, Some(2)).await;
    let student = app.create_student(1).await;

    app.store.fail_next_commits(1);
    let err = EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(app.student(student.id).await.batch_id, None);
    let stored = app.store.batch(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.active_enrollment_count, 0);
    assert!(app.events.events().is_empty());

    // Locks were released with the failed transaction.
    EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_parent_cannot_assign() {
    let app = TestApp::new();
    let batch = app.create_batch(1, None).await;
    let student = app.create_student(1).await;

    let err = EnrollmentService::assign_student(&app.state, &app.parent, assign(&student, &batch))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_remove_student_decrements_once() {
    let app = TestApp::new();
    let batch = app.create_batch(1, Some(5)).await;
    let first = app.create_student(1).await;
    let second = app.create_student(1).await;
    for student in [&first, &second] {
        EnrollmentService::assign_student(&app.state, &app.admin, assign(student, &batch))
            .await
            .unwrap();
    }

    let occupancy = EnrollmentService::remove_student(&app.state, &app.teacher, first.id)
        .await
        .unwrap();

    assert_eq!(occupancy.active_enrollment_count, 1);
    assert_eq!(occupancy.remaining, Some(4));
    assert_eq!(app.student(first.id).await.batch_id, None);

    let err = EnrollmentService::remove_student(&app.state, &app.teacher, first.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let stored = app.store.batch(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.active_enrollment_count, 1);
}

#[tokio::test]
async fn test_change_capacity() {
    let app = TestApp::new();
    let batch = app.create_batch(1, Some(5)).await;
    for _ in 0..3 {
        let student = app.create_student(1).await;
        EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
            .await
            .unwrap();
    }

    let err = EnrollmentService::change_capacity(&app.state, &app.admin, batch.id, Some(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidCapacity {
            requested: 2,
            current: 3,
            ..
        }
    ));

    let occupancy = EnrollmentService::change_capacity(&app.state, &app.admin, batch.id, Some(3))
        .await
        .unwrap();
    assert_eq!(occupancy.capacity, Some(3));
    assert_eq!(occupancy.remaining, Some(0));

    let occupancy = EnrollmentService::change_capacity(&app.state, &app.admin, batch.id, None)
        .await
        .unwrap();
    assert_eq!(occupancy.capacity, None);
    assert_eq!(occupancy.remaining, None);

    let err = EnrollmentService::change_capacity(&app.state, &app.admin, batch.id, Some(-1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_change_capacity_is_admin_only() {
    let app = TestApp::new();
    let batch = app.create_batch(1, Some(5)).await;

    let err = EnrollmentService::change_capacity(&app.state, &app.teacher, batch.id, Some(10))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_delete_batch_requires_empty() {
    let app = TestApp::new();
    let batch = app.create_batch(1, None).await;
    let student = app.create_student(1).await;
    EnrollmentService::assign_student(&app.state, &app.admin, assign(&student, &batch))
        .await
        .unwrap();

    let err = EnrollmentService::delete_batch(&app.state, &app.admin, batch.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BatchNotEmpty { current: 1, .. }));

    EnrollmentService::remove_student(&app.state, &app.admin, student.id)
        .await
        .unwrap();
    EnrollmentService::delete_batch(&app.state, &app.admin, batch.id)
        .await
        .unwrap();

    assert!(app.store.batch(batch.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_batch_keeps_test_history() {
    let app = TestApp::new();
    let batch = app.create_batch(1, None).await;
    let student = app.create_student(1).await;
    ScoringService::record_test(
        &app.state,
        &app.teacher,
        RecordTestDto {
            student_id: student.id,
            batch_id: batch.id,
            level: 1,
            name: None,
            date: date(2026, 4, 2),
            subjects: vec![mark("Maths", 40.0, 50.0)],
        },
    )
    .await
    .unwrap();

    let err = EnrollmentService::delete_batch(&app.state, &app.admin, batch.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert!(app.store.batch(batch.id).await.unwrap().is_some());
    let summary = ScoringService::level_summary(&app.state, &app.admin, student.id, LevelId(1))
        .await
        .unwrap();
    assert_eq!(summary.total_tests, 1);
}

#[tokio::test]
async fn test_create_batch_validation() {
    let app = TestApp::new();
    let mut dto = batch_dto(0, Some(-1));
    dto.name = String::new();
    dto.schedule.days.clear();

    let err = EnrollmentService::create_batch(&app.state, &app.admin, dto)
        .await
        .unwrap_err();

    let fields = err.field_errors().unwrap();
    assert!(fields.contains_field("name"));
    assert!(fields.contains_field("level_id"));
    assert!(fields.contains_field("capacity"));
    assert!(fields.len() >= 4);
}

#[tokio::test]
async fn test_occupancy_readable_by_parent() {
    let app = TestApp::new();
    let batch = app.create_batch(1, Some(4)).await;

    let occupancy = EnrollmentService::batch_occupancy(&app.state, &app.parent, batch.id)
        .await
        .unwrap();

    assert_eq!(occupancy.batch_id, batch.id);
    assert_eq!(occupancy.active_enrollment_count, 0);
    assert_eq!(occupancy.remaining, Some(4));
}
