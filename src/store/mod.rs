//! Persistence port.
//!
//! Services read through [`Store`] and make every guarded change inside a
//! [`StoreTransaction`]. The `*_for_update` reads lock the row until the
//! transaction ends; a transaction dropped without [`StoreTransaction::commit`]
//! is rolled back.
//!
//! Lock order, so that racing transactions cannot deadlock:
//!
//! - student, then batches by ascending id
//! - payment, then fee
//!
//! Two adapters ship with the crate: [`PgStore`] (PostgreSQL via sqlx) and
//! [`InMemoryStore`] (tests and embedded use).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use academy_core::AppError;
use academy_models::{
    Batch, BatchId, Fee, FeeId, FeePayment, Level, LevelId, PaymentId, Student, StudentId,
    TestId, TestRecord,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn student(&self, id: StudentId) -> Result<Option<Student>, AppError>;
    async fn batch(&self, id: BatchId) -> Result<Option<Batch>, AppError>;
    async fn level(&self, id: LevelId) -> Result<Option<Level>, AppError>;
    async fn fee(&self, id: FeeId) -> Result<Option<Fee>, AppError>;
    async fn payment(&self, id: PaymentId) -> Result<Option<FeePayment>, AppError>;

    /// Tests a student took at `level`, oldest first.
    async fn tests_for_student(
        &self,
        student_id: StudentId,
        level: LevelId,
    ) -> Result<Vec<TestRecord>, AppError>;

    /// Payments submitted against `fee_id`, oldest first.
    async fn payments_for_fee(&self, fee_id: FeeId) -> Result<Vec<FeePayment>, AppError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    async fn student_for_update(&mut self, id: StudentId) -> Result<Option<Student>, AppError>;
    async fn batch_for_update(&mut self, id: BatchId) -> Result<Option<Batch>, AppError>;
    async fn test_for_update(&mut self, id: TestId) -> Result<Option<TestRecord>, AppError>;
    async fn fee_for_update(&mut self, id: FeeId) -> Result<Option<Fee>, AppError>;
    async fn payment_for_update(&mut self, id: PaymentId) -> Result<Option<FeePayment>, AppError>;

    /// Whether any test, committed or buffered in this transaction, was taken in `batch_id`.
    async fn batch_has_tests(&mut self, batch_id: BatchId) -> Result<bool, AppError>;

    async fn save_student(&mut self, student: &Student) -> Result<(), AppError>;
    async fn save_batch(&mut self, batch: &Batch) -> Result<(), AppError>;
    async fn save_level(&mut self, level: &Level) -> Result<(), AppError>;
    async fn save_test(&mut self, test: &TestRecord) -> Result<(), AppError>;
    async fn save_fee(&mut self, fee: &Fee) -> Result<(), AppError>;
    async fn save_payment(&mut self, payment: &FeePayment) -> Result<(), AppError>;
    async fn remove_batch(&mut self, id: BatchId) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
