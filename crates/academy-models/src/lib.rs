//! # Academy Models
//!
//! Entities, DTOs, and domain events for the academy core.
//!
//! # Modules
//!
//! - [`ids`]: typed identifiers for every entity
//! - [`students`]: students and their parent contact
//! - [`batches`]: batches, schedules, and enrollment DTOs
//! - [`levels`]: curriculum levels and passing thresholds
//! - [`assessments`]: tests, subject marks, and score aggregation
//! - [`fees`]: fees, payments, and the approval state machine
//! - [`events`]: events emitted after committed changes
//!
//! # Example
//!
//! ```ignore
//! use academy_models::assessments::{Score, SubjectMark};
//!
//! let score = Score::from_subjects(&[SubjectMark::new("Maths", 45.0, 50.0)]);
//! assert_eq!(score.percent, 90.0);
//! ```

pub mod assessments;
pub mod batches;
pub mod events;
pub mod fees;
pub mod ids;
pub mod levels;
pub mod students;

pub use assessments::{
    BulkGradeDto, BulkGradeEntry, BulkGradeResponse, LevelSummary, NewTest, RecordTestDto, Score,
    SubjectMark, TestRecord, UpdateTestMarksDto,
};
pub use batches::{
    Advisory, AssignStudentDto, AssignmentResponse, Batch, BatchOccupancy, CreateBatchDto,
    Schedule,
};
pub use events::DomainEvent;
pub use fees::{
    ApprovePaymentDto, CreateFeeDto, Fee, FeePayment, FeeStatement, FeeStatus, PaymentDecision,
    PaymentStatus, RejectPaymentDto, SubmitPaymentDto,
};
pub use ids::{BatchId, FeeId, LevelId, PaymentId, StudentId, TeacherId, TestId};
pub use levels::{DEFAULT_PASSING_PERCENT, Level, UpsertLevelDto};
pub use students::{ParentContact, Student, StudentStatus};
