use tracing::{info, instrument};

use academy_core::{AppError, AuthorizationContext, permissions, validation};
use academy_models::levels::passing_threshold;
use academy_models::{
    BulkGradeDto, BulkGradeResponse, DomainEvent, Level, LevelId, LevelSummary, NewTest,
    RecordTestDto, StudentId, TestId, TestRecord, UpdateTestMarksDto, UpsertLevelDto,
};
use academy_observability::track_test_recorded;

use crate::events::publish_all;
use crate::state::AppState;

pub struct ScoringService;

impl ScoringService {
    #[instrument(skip(state))]
    pub async fn define_level(
        state: &AppState,
        ctx: &AuthorizationContext,
        dto: UpsertLevelDto,
    ) -> Result<Level, AppError> {
        ctx.require(permissions::LEVELS_UPDATE)?;
        validation::validate(&dto)?;

        let level = Level {
            id: LevelId(dto.id),
            name: dto.name.trim().to_string(),
            passing_percent: dto.passing_percent,
        };

        let mut tx = state.store.begin().await?;
        tx.save_level(&level).await?;
        tx.commit().await?;

        info!(level = %level.id, passing_percent = ?level.passing_percent, "level defined");
        Ok(level)
    }

    #[instrument(skip(state))]
    pub async fn record_test(
        state: &AppState,
        ctx: &AuthorizationContext,
        dto: RecordTestDto,
    ) -> Result<TestRecord, AppError> {
        ctx.require(permissions::TESTS_RECORD)?;
        dto.field_errors().into_result()?;

        if state.store.student(dto.student_id).await?.is_none() {
            return Err(AppError::not_found("student", dto.student_id));
        }

        let record = TestRecord::new(NewTest {
            student_id: dto.student_id,
            batch_id: dto.batch_id,
            level: LevelId(dto.level),
            name: dto.name,
            date: dto.date,
            subjects: dto.subjects,
        })?;

        // held until commit so delete_batch sees this test
        let mut tx = state.store.begin().await?;
        if tx.batch_for_update(record.batch_id()).await?.is_none() {
            return Err(AppError::not_found("batch", record.batch_id()));
        }
        tx.save_test(&record).await?;
        tx.commit().await?;

        info!(test_id = %record.id(), student_id = %record.student_id(), percent = record.percent(), "test recorded");
        track_test_recorded(1);
        publish_all(state.events.as_ref(), &[recorded_event(&record)]).await;

        Ok(record)
    }

    /// Replaces a test's subject list; totals are recomputed from the new list.
    #[instrument(skip(state))]
    pub async fn update_test_marks(
        state: &AppState,
        ctx: &AuthorizationContext,
        test_id: TestId,
        dto: UpdateTestMarksDto,
    ) -> Result<TestRecord, AppError> {
        ctx.require(permissions::TESTS_RECORD)?;

        let mut tx = state.store.begin().await?;
        let mut record = tx
            .test_for_update(test_id)
            .await?
            .ok_or_else(|| AppError::not_found("test", test_id))?;

        record.replace_subjects(dto.subjects)?;
        tx.save_test(&record).await?;
        tx.commit().await?;

        info!(test_id = %test_id, percent = record.percent(), "test marks updated");
        Ok(record)
    }

    #[instrument(skip(state))]
    pub async fn level_summary(
        state: &AppState,
        ctx: &AuthorizationContext,
        student_id: StudentId,
        level: LevelId,
    ) -> Result<LevelSummary, AppError> {
        ctx.require(permissions::SUMMARIES_READ)?;

        if !level.is_valid() {
            return Err(AppError::validation("level", "must be at least 1"));
        }
        if state.store.student(student_id).await?.is_none() {
            return Err(AppError::not_found("student", student_id));
        }

        Self::summarize(state, student_id, level).await
    }

    /// One summary per level from 1 up to the student's current level.
    #[instrument(skip(state))]
    pub async fn all_levels_summary(
        state: &AppState,
        ctx: &AuthorizationContext,
        student_id: StudentId,
    ) -> Result<Vec<LevelSummary>, AppError> {
        ctx.require(permissions::SUMMARIES_READ)?;

        let student = state
            .store
            .student(student_id)
            .await?
            .ok_or_else(|| AppError::not_found("student", student_id))?;

        let mut summaries = Vec::new();
        for level in student.current_level.up_to() {
            summaries.push(Self::summarize(state, student_id, level).await?);
        }
        Ok(summaries)
    }

    /// Records one test per entry, all in a single transaction.
    ///
    /// Every entry is checked before anything is written; problems from all
    /// entries come back together, keyed `entries[i].<field>`.
    #[instrument(skip(state, dto), fields(batch_id = %dto.batch_id, entries = dto.entries.len()))]
    pub async fn bulk_grade(
        state: &AppState,
        ctx: &AuthorizationContext,
        dto: BulkGradeDto,
    ) -> Result<BulkGradeResponse, AppError> {
        ctx.require(permissions::TESTS_RECORD)?;

        let mut errors = dto.field_errors();
        for (index, entry) in dto.entries.iter().enumerate() {
            if state.store.student(entry.student_id).await?.is_none() {
                errors.push(
                    format!("entries[{}].student_id", index),
                    "student not found",
                );
            }
        }
        errors.into_result()?;

        let name = dto.test_name.trim().to_string();
        let records = dto
            .entries
            .into_iter()
            .map(|entry| {
                TestRecord::new(NewTest {
                    student_id: entry.student_id,
                    batch_id: dto.batch_id,
                    level: LevelId(entry.level),
                    name: Some(name.clone()),
                    date: dto.date,
                    subjects: entry.subjects,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = state.store.begin().await?;
        if tx.batch_for_update(dto.batch_id).await?.is_none() {
            return Err(AppError::not_found("batch", dto.batch_id));
        }
        for record in &records {
            tx.save_test(record).await?;
        }
        tx.commit().await?;

        info!(count = records.len(), "bulk grades recorded");
        track_test_recorded(records.len() as u64);
        let events: Vec<DomainEvent> = records.iter().map(recorded_event).collect();
        publish_all(state.events.as_ref(), &events).await;

        Ok(BulkGradeResponse {
            batch_id: dto.batch_id,
            recorded: records,
        })
    }

    async fn summarize(
        state: &AppState,
        student_id: StudentId,
        level: LevelId,
    ) -> Result<LevelSummary, AppError> {
        let tests = state.store.tests_for_student(student_id, level).await?;
        let definition = state.store.level(level).await?;
        let passing = passing_threshold(definition.as_ref(), state.policy.default_passing_percent);

        Ok(LevelSummary::from_percents(
            level,
            tests.iter().map(TestRecord::percent),
            passing,
        ))
    }
}

fn recorded_event(record: &TestRecord) -> DomainEvent {
    DomainEvent::TestRecorded {
        student_id: record.student_id(),
        test_id: record.id(),
        percent: record.percent(),
    }
}
