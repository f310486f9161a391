//! PostgreSQL [`Store`] using runtime-checked sqlx queries.
//!
//! Locked reads use `SELECT ... FOR UPDATE` and every transaction sets
//! `lock_timeout`, so a stuck lock surfaces as `Conflict` instead of hanging.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use academy_core::AppError;
use academy_models::{
    Batch, BatchId, Fee, FeeId, FeePayment, FeeStatus, Level, LevelId, NewTest, ParentContact,
    PaymentId, PaymentStatus, Schedule, Student, StudentId, StudentStatus, SubjectMark, TeacherId,
    TestId, TestRecord,
};

use super::{Store, StoreTransaction};

/// SQLSTATEs that mean "retry later": serialization failure, deadlock, lock timeout.
const CONFLICT_CODES: [&str; 3] = ["40001", "40P01", "55P03"];

pub(crate) fn map_db_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err
        && let Some(code) = db_err.code()
        && CONFLICT_CODES.contains(&&*code)
    {
        return AppError::conflict(format!("concurrent update rejected ({})", code));
    }
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_foreign_key_violation()
    {
        return AppError::conflict(format!(
            "row is still referenced ({})",
            db_err.constraint().unwrap_or("foreign key")
        ));
    }
    AppError::database(err)
}

fn corrupt(
    entity: &'static str,
    id: impl std::fmt::Display,
    detail: impl std::fmt::Display,
) -> AppError {
    AppError::internal(anyhow::anyhow!("stored {} {} is invalid: {}", entity, id, detail))
}

#[derive(Debug, FromRow)]
struct StudentRow {
    id: StudentId,
    name: String,
    parent_name: String,
    parent_email: Option<String>,
    parent_phone: Option<String>,
    current_level: i32,
    batch_id: Option<BatchId>,
    status: String,
}

impl TryFrom<StudentRow> for Student {
    type Error = AppError;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<StudentStatus>()
            .map_err(|e| corrupt("student", row.id, e))?;
        Ok(Student {
            id: row.id,
            name: row.name,
            parent: ParentContact {
                name: row.parent_name,
                email: row.parent_email,
                phone: row.parent_phone,
            },
            current_level: LevelId(row.current_level),
            batch_id: row.batch_id,
            status,
        })
    }
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: BatchId,
    name: String,
    level_id: i32,
    teacher_id: Option<TeacherId>,
    schedule_days: Vec<i16>,
    starts_at: NaiveTime,
    ends_at: NaiveTime,
    capacity: Option<i64>,
    active_enrollment_count: i64,
}

impl TryFrom<BatchRow> for Batch {
    type Error = AppError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let days = Schedule::days_from_numbers(&row.schedule_days)
            .ok_or_else(|| corrupt("batch", row.id, "unknown schedule day"))?;
        Ok(Batch {
            id: row.id,
            name: row.name,
            level_id: LevelId(row.level_id),
            teacher_id: row.teacher_id,
            schedule: Schedule {
                days,
                starts_at: row.starts_at,
                ends_at: row.ends_at,
            },
            capacity: row.capacity,
            active_enrollment_count: row.active_enrollment_count,
        })
    }
}

#[derive(Debug, FromRow)]
struct LevelRow {
    id: i32,
    name: String,
    passing_percent: Option<f64>,
}

impl From<LevelRow> for Level {
    fn from(row: LevelRow) -> Self {
        Level {
            id: LevelId(row.id),
            name: row.name,
            passing_percent: row.passing_percent,
        }
    }
}

#[derive(Debug, FromRow)]
struct TestRow {
    id: TestId,
    student_id: StudentId,
    batch_id: BatchId,
    level: i32,
    name: Option<String>,
    test_date: NaiveDate,
    subjects: Json<Vec<SubjectMark>>,
}

impl TryFrom<TestRow> for TestRecord {
    type Error = AppError;

    fn try_from(row: TestRow) -> Result<Self, Self::Error> {
        let id = row.id;
        TestRecord::from_parts(
            id,
            NewTest {
                student_id: row.student_id,
                batch_id: row.batch_id,
                level: LevelId(row.level),
                name: row.name,
                date: row.test_date,
                subjects: row.subjects.0,
            },
        )
        .map_err(|e| corrupt("test", id, e))
    }
}

#[derive(Debug, FromRow)]
struct FeeRow {
    id: FeeId,
    student_id: StudentId,
    amount: Decimal,
    due_date: NaiveDate,
    paid_amount: Decimal,
    status: String,
}

impl TryFrom<FeeRow> for Fee {
    type Error = AppError;

    fn try_from(row: FeeRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<FeeStatus>()
            .map_err(|e| corrupt("fee", row.id, e))?;
        Ok(Fee {
            id: row.id,
            student_id: row.student_id,
            amount: row.amount,
            due_date: row.due_date,
            paid_amount: row.paid_amount,
            status,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: PaymentId,
    fee_id: FeeId,
    student_id: StudentId,
    amount: Decimal,
    transaction_id: String,
    receipt_ref: Option<String>,
    status: String,
    rejection_reason: Option<String>,
    note: Option<String>,
    approver_id: Option<Uuid>,
    submitted_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for FeePayment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<PaymentStatus>()
            .map_err(|e| corrupt("payment", row.id, e))?;
        Ok(FeePayment {
            id: row.id,
            fee_id: row.fee_id,
            student_id: row.student_id,
            amount: row.amount,
            transaction_id: row.transaction_id,
            receipt_ref: row.receipt_ref,
            status,
            rejection_reason: row.rejection_reason,
            note: row.note,
            approver_id: row.approver_id,
            submitted_at: row.submitted_at,
            decided_at: row.decided_at,
        })
    }
}

const STUDENT_COLUMNS: &str = "id, name, parent_name, parent_email, parent_phone, current_level, batch_id, status";
const BATCH_COLUMNS: &str = "id, name, level_id, teacher_id, schedule_days, starts_at, ends_at, capacity, active_enrollment_count";
const TEST_COLUMNS: &str = "id, student_id, batch_id, level, name, test_date, subjects";
const FEE_COLUMNS: &str = "id, student_id, amount, due_date, paid_amount, status";
const PAYMENT_COLUMNS: &str = "id, fee_id, student_id, amount, transaction_id, receipt_ref, status, rejection_reason, note, approver_id, submitted_at, decided_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn student(&self, id: StudentId) -> Result<Option<Student>, AppError> {
        let sql = format!("SELECT {} FROM students WHERE id = $1", STUDENT_COLUMNS);
        sqlx::query_as::<_, StudentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Student::try_from)
            .transpose()
    }

    async fn batch(&self, id: BatchId) -> Result<Option<Batch>, AppError> {
        let sql = format!("SELECT {} FROM batches WHERE id = $1", BATCH_COLUMNS);
        sqlx::query_as::<_, BatchRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Batch::try_from)
            .transpose()
    }

    async fn level(&self, id: LevelId) -> Result<Option<Level>, AppError> {
        let row = sqlx::query_as::<_, LevelRow>(
            "SELECT id, name, passing_percent FROM levels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(row.map(Level::from))
    }

    async fn fee(&self, id: FeeId) -> Result<Option<Fee>, AppError> {
        let sql = format!("SELECT {} FROM fees WHERE id = $1", FEE_COLUMNS);
        sqlx::query_as::<_, FeeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Fee::try_from)
            .transpose()
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<FeePayment>, AppError> {
        let sql = format!("SELECT {} FROM fee_payments WHERE id = $1", PAYMENT_COLUMNS);
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(FeePayment::try_from)
            .transpose()
    }

    async fn tests_for_student(
        &self,
        student_id: StudentId,
        level: LevelId,
    ) -> Result<Vec<TestRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM tests WHERE student_id = $1 AND level = $2 ORDER BY test_date, id",
            TEST_COLUMNS
        );
        sqlx::query_as::<_, TestRow>(&sql)
            .bind(student_id)
            .bind(level)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(TestRecord::try_from)
            .collect()
    }

    async fn payments_for_fee(&self, fee_id: FeeId) -> Result<Vec<FeePayment>, AppError> {
        let sql = format!(
            "SELECT {} FROM fee_payments WHERE fee_id = $1 ORDER BY submitted_at, id",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(fee_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(FeePayment::try_from)
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // SET does not take bind parameters; the value is an integer we produced.
        let set_timeout = format!("SET LOCAL lock_timeout = {}", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn student_for_update(&mut self, id: StudentId) -> Result<Option<Student>, AppError> {
        let sql = format!("SELECT {} FROM students WHERE id = $1 FOR UPDATE", STUDENT_COLUMNS);
        sqlx::query_as::<_, StudentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .map(Student::try_from)
            .transpose()
    }

    async fn batch_for_update(&mut self, id: BatchId) -> Result<Option<Batch>, AppError> {
        let sql = format!("SELECT {} FROM batches WHERE id = $1 FOR UPDATE", BATCH_COLUMNS);
        sqlx::query_as::<_, BatchRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .map(Batch::try_from)
            .transpose()
    }

    async fn test_for_update(&mut self, id: TestId) -> Result<Option<TestRecord>, AppError> {
        let sql = format!("SELECT {} FROM tests WHERE id = $1 FOR UPDATE", TEST_COLUMNS);
        sqlx::query_as::<_, TestRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .map(TestRecord::try_from)
            .transpose()
    }

    async fn fee_for_update(&mut self, id: FeeId) -> Result<Option<Fee>, AppError> {
        let sql = format!("SELECT {} FROM fees WHERE id = $1 FOR UPDATE", FEE_COLUMNS);
        sqlx::query_as::<_, FeeRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .map(Fee::try_from)
            .transpose()
    }

    async fn payment_for_update(&mut self, id: PaymentId) -> Result<Option<FeePayment>, AppError> {
        let sql = format!(
            "SELECT {} FROM fee_payments WHERE id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .map(FeePayment::try_from)
            .transpose()
    }

    async fn save_student(&mut self, student: &Student) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO students
                   (id, name, parent_name, parent_email, parent_phone, current_level, batch_id, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name,
                   parent_name = EXCLUDED.parent_name,
                   parent_email = EXCLUDED.parent_email,
                   parent_phone = EXCLUDED.parent_phone,
                   current_level = EXCLUDED.current_level,
                   batch_id = EXCLUDED.batch_id,
                   status = EXCLUDED.status"#,
        )
        .bind(student.id)
        .bind(&student.name)
        .bind(&student.parent.name)
        .bind(&student.parent.email)
        .bind(&student.parent.phone)
        .bind(student.current_level)
        .bind(student.batch_id)
        .bind(student.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn save_batch(&mut self, batch: &Batch) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO batches
                   (id, name, level_id, teacher_id, schedule_days, starts_at, ends_at,
                    capacity, active_enrollment_count)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name,
                   level_id = EXCLUDED.level_id,
                   teacher_id = EXCLUDED.teacher_id,
                   schedule_days = EXCLUDED.schedule_days,
                   starts_at = EXCLUDED.starts_at,
                   ends_at = EXCLUDED.ends_at,
                   capacity = EXCLUDED.capacity,
                   active_enrollment_count = EXCLUDED.active_enrollment_count"#,
        )
        .bind(batch.id)
        .bind(&batch.name)
        .bind(batch.level_id)
        .bind(batch.teacher_id)
        .bind(batch.schedule.day_numbers())
        .bind(batch.schedule.starts_at)
        .bind(batch.schedule.ends_at)
        .bind(batch.capacity)
        .bind(batch.active_enrollment_count)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn save_level(&mut self, level: &Level) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO levels (id, name, passing_percent)
               VALUES ($1, $2, $3)
               ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name,
                   passing_percent = EXCLUDED.passing_percent"#,
        )
        .bind(level.id)
        .bind(&level.name)
        .bind(level.passing_percent)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn save_test(&mut self, test: &TestRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO tests (id, student_id, batch_id, level, name, test_date, subjects)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name,
                   test_date = EXCLUDED.test_date,
                   subjects = EXCLUDED.subjects"#,
        )
        .bind(test.id())
        .bind(test.student_id())
        .bind(test.batch_id())
        .bind(test.level())
        .bind(test.name())
        .bind(test.date())
        .bind(Json(test.subjects()))
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn save_fee(&mut self, fee: &Fee) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO fees (id, student_id, amount, due_date, paid_amount, status)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (id) DO UPDATE SET
                   amount = EXCLUDED.amount,
                   due_date = EXCLUDED.due_date,
                   paid_amount = EXCLUDED.paid_amount,
                   status = EXCLUDED.status"#,
        )
        .bind(fee.id)
        .bind(fee.student_id)
        .bind(fee.amount)
        .bind(fee.due_date)
        .bind(fee.paid_amount)
        .bind(fee.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn save_payment(&mut self, payment: &FeePayment) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO fee_payments
                   (id, fee_id, student_id, amount, transaction_id, receipt_ref, status,
                    rejection_reason, note, approver_id, submitted_at, decided_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               ON CONFLICT (id) DO UPDATE SET
                   status = EXCLUDED.status,
                   rejection_reason = EXCLUDED.rejection_reason,
                   note = EXCLUDED.note,
                   approver_id = EXCLUDED.approver_id,
                   decided_at = EXCLUDED.decided_at"#,
        )
        .bind(payment.id)
        .bind(payment.fee_id)
        .bind(payment.student_id)
        .bind(payment.amount)
        .bind(&payment.transaction_id)
        .bind(&payment.receipt_ref)
        .bind(payment.status.as_str())
        .bind(&payment.rejection_reason)
        .bind(&payment.note)
        .bind(payment.approver_id)
        .bind(payment.submitted_at)
        .bind(payment.decided_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn batch_has_tests(&mut self, batch_id: BatchId) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM tests WHERE batch_id = $1)")
            .bind(batch_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn remove_batch(&mut self, id: BatchId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await.map_err(map_db_error)
    }
}
