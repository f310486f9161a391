use tracing::{info, instrument, warn};

use academy_config::LevelMismatchPolicy;
use academy_core::{AppError, AuthorizationContext, permissions, validation};
use academy_models::{
    Advisory, AssignStudentDto, AssignmentResponse, Batch, BatchId, BatchOccupancy,
    CreateBatchDto, DomainEvent, LevelId, Student, StudentId,
};
use academy_observability::track_enrollment;

use crate::events::publish_all;
use crate::state::AppState;

pub struct EnrollmentService;

impl EnrollmentService {
    #[instrument(skip(state))]
    pub async fn create_batch(
        state: &AppState,
        ctx: &AuthorizationContext,
        dto: CreateBatchDto,
    ) -> Result<Batch, AppError> {
        ctx.require(permissions::BATCHES_CREATE)?;

        let mut errors = validation::field_errors(&dto);
        errors.append(dto.schedule.field_errors());
        errors.into_result()?;

        let batch = Batch {
            id: BatchId::new(),
            name: dto.name.trim().to_string(),
            level_id: LevelId(dto.level_id),
            teacher_id: dto.teacher_id,
            schedule: dto.schedule,
            capacity: dto.capacity,
            active_enrollment_count: 0,
        };

        let mut tx = state.store.begin().await?;
        tx.save_batch(&batch).await?;
        tx.commit().await?;

        info!(batch_id = %batch.id, capacity = ?batch.capacity, "batch created");
        Ok(batch)
    }

    /// Puts a student into a batch, releasing their previous batch in the same
    /// transaction.
    ///
    /// The student row is locked first, then the batches involved in ascending
    /// id order, so racing assignments to the same full batch see each other's
    /// counts and the losers fail with `CapacityExceeded`.
    #[instrument(skip(state))]
    pub async fn assign_student(
        state: &AppState,
        ctx: &AuthorizationContext,
        dto: AssignStudentDto,
    ) -> Result<AssignmentResponse, AppError> {
        ctx.require(permissions::BATCHES_ASSIGN_STUDENTS)?;

        let mut tx = state.store.begin().await?;

        let mut student = tx
            .student_for_update(dto.student_id)
            .await?
            .ok_or_else(|| AppError::not_found("student", dto.student_id))?;
        if !student.is_active() {
            return Err(AppError::validation(
                "student_id",
                format!("student is {}", student.status),
            ));
        }

        let previous = student.batch_id;

        if previous == Some(dto.batch_id) {
            let batch = tx
                .batch_for_update(dto.batch_id)
                .await?
                .ok_or_else(|| AppError::not_found("batch", dto.batch_id))?;
            tx.rollback().await?;
            let advisory = check_level(state.policy.level_mismatch, &student, &batch)?;

            info!(student_id = %student.id, batch_id = %batch.id, "student already in batch");
            return Ok(AssignmentResponse {
                success: true,
                student_id: student.id,
                batch_id: batch.id,
                previous_batch_id: None,
                advisory,
            });
        }

        let mut lock_order: Vec<BatchId> = previous.into_iter().chain([dto.batch_id]).collect();
        lock_order.sort();

        let mut target = None;
        let mut released = None;
        for batch_id in lock_order {
            let batch = tx.batch_for_update(batch_id).await?;
            if batch_id == dto.batch_id {
                target = Some(batch.ok_or_else(|| AppError::not_found("batch", batch_id))?);
            } else {
                released = batch;
            }
        }
        let mut target = target.ok_or_else(|| AppError::not_found("batch", dto.batch_id))?;

        if let Some(max) = target.capacity
            && target.active_enrollment_count >= max
        {
            let current = target.active_enrollment_count;
            tx.rollback().await?;

            warn!(batch_id = %target.id, current, max, "batch is full");
            track_enrollment("capacity_exceeded");
            publish_all(
                state.events.as_ref(),
                &[DomainEvent::CapacityExceeded {
                    batch_id: target.id,
                    current_count: current,
                    max_capacity: max,
                }],
            )
            .await;

            return Err(AppError::CapacityExceeded {
                batch_id: target.id.into_inner(),
                current,
                max,
            });
        }

        let advisory = check_level(state.policy.level_mismatch, &student, &target)?;

        if let Some(mut old) = released {
            old.active_enrollment_count = (old.active_enrollment_count - 1).max(0);
            tx.save_batch(&old).await?;
        }

        target.active_enrollment_count += 1;
        tx.save_batch(&target).await?;

        student.batch_id = Some(target.id);
        tx.save_student(&student).await?;

        tx.commit().await?;

        info!(
            student_id = %student.id,
            batch_id = %target.id,
            previous_batch_id = ?previous,
            count = target.active_enrollment_count,
            "student assigned to batch"
        );
        track_enrollment("success");
        publish_all(
            state.events.as_ref(),
            &[DomainEvent::EnrollmentSucceeded {
                student_id: student.id,
                batch_id: target.id,
            }],
        )
        .await;

        Ok(AssignmentResponse {
            success: true,
            student_id: student.id,
            batch_id: target.id,
            previous_batch_id: previous,
            advisory,
        })
    }

    #[instrument(skip(state))]
    pub async fn remove_student(
        state: &AppState,
        ctx: &AuthorizationContext,
        student_id: StudentId,
    ) -> Result<BatchOccupancy, AppError> {
        ctx.require(permissions::BATCHES_ASSIGN_STUDENTS)?;

        let mut tx = state.store.begin().await?;

        let mut student = tx
            .student_for_update(student_id)
            .await?
            .ok_or_else(|| AppError::not_found("student", student_id))?;
        let batch_id = student
            .batch_id
            .ok_or_else(|| AppError::not_found("enrollment", student_id))?;

        let mut batch = tx
            .batch_for_update(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("batch", batch_id))?;

        batch.active_enrollment_count = (batch.active_enrollment_count - 1).max(0);
        student.batch_id = None;

        tx.save_batch(&batch).await?;
        tx.save_student(&student).await?;
        tx.commit().await?;

        info!(student_id = %student_id, batch_id = %batch_id, count = batch.active_enrollment_count, "student removed from batch");
        Ok(batch.occupancy())
    }

    /// `None` lifts the limit. Lowering below the current count is refused
    /// rather than evicting anyone.
    #[instrument(skip(state))]
    pub async fn change_capacity(
        state: &AppState,
        ctx: &AuthorizationContext,
        batch_id: BatchId,
        capacity: Option<i64>,
    ) -> Result<BatchOccupancy, AppError> {
        ctx.require(permissions::BATCHES_UPDATE_CAPACITY)?;

        if let Some(requested) = capacity
            && requested < 0
        {
            return Err(AppError::validation("capacity", "must not be negative"));
        }

        let mut tx = state.store.begin().await?;
        let mut batch = tx
            .batch_for_update(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("batch", batch_id))?;

        if let Some(requested) = capacity
            && requested < batch.active_enrollment_count
        {
            warn!(batch_id = %batch_id, requested, current = batch.active_enrollment_count, "capacity below enrollment");
            return Err(AppError::InvalidCapacity {
                batch_id: batch_id.into_inner(),
                requested,
                current: batch.active_enrollment_count,
            });
        }

        batch.capacity = capacity;
        tx.save_batch(&batch).await?;
        tx.commit().await?;

        info!(batch_id = %batch_id, capacity = ?capacity, "batch capacity changed");
        Ok(batch.occupancy())
    }

    #[instrument(skip(state))]
    pub async fn delete_batch(
        state: &AppState,
        ctx: &AuthorizationContext,
        batch_id: BatchId,
    ) -> Result<(), AppError> {
        ctx.require(permissions::BATCHES_DELETE)?;

        let mut tx = state.store.begin().await?;
        let batch = tx
            .batch_for_update(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("batch", batch_id))?;

        if batch.active_enrollment_count > 0 {
            return Err(AppError::BatchNotEmpty {
                batch_id: batch_id.into_inner(),
                current: batch.active_enrollment_count,
            });
        }

        if tx.batch_has_tests(batch_id).await? {
            return Err(AppError::conflict(format!(
                "batch {} has recorded tests and cannot be deleted",
                batch_id
            )));
        }

        tx.remove_batch(batch_id).await?;
        tx.commit().await?;

        info!(batch_id = %batch_id, "batch deleted");
        Ok(())
    }

    #[instrument(skip(state))]
    pub async fn batch_occupancy(
        state: &AppState,
        ctx: &AuthorizationContext,
        batch_id: BatchId,
    ) -> Result<BatchOccupancy, AppError> {
        ctx.require(permissions::BATCHES_READ)?;

        let batch = state
            .store
            .batch(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("batch", batch_id))?;
        Ok(batch.occupancy())
    }
}

/// The advisory for a level mismatch, or a validation error when mismatches are blocked.
fn check_level(
    policy: LevelMismatchPolicy,
    student: &Student,
    batch: &Batch,
) -> Result<Option<Advisory>, AppError> {
    if student.current_level == batch.level_id {
        return Ok(None);
    }
    if policy == LevelMismatchPolicy::Block {
        return Err(AppError::validation(
            "batch_id",
            format!(
                "student is at level {} but the batch teaches level {}",
                student.current_level, batch.level_id
            ),
        ));
    }
    Ok(Some(Advisory::LevelMismatch))
}
