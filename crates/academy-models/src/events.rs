//! Domain events published after a state change commits.

use serde::Serialize;

use crate::fees::FeeStatus;
use crate::ids::{BatchId, FeeId, PaymentId, StudentId, TestId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    EnrollmentSucceeded {
        student_id: StudentId,
        batch_id: BatchId,
    },
    CapacityExceeded {
        batch_id: BatchId,
        current_count: i64,
        max_capacity: i64,
    },
    TestRecorded {
        student_id: StudentId,
        test_id: TestId,
        percent: f64,
    },
    PaymentApproved {
        payment_id: PaymentId,
        fee_id: FeeId,
        new_fee_status: FeeStatus,
    },
    PaymentRejected {
        payment_id: PaymentId,
        reason: String,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::EnrollmentSucceeded { .. } => "ENROLLMENT_SUCCEEDED",
            DomainEvent::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            DomainEvent::TestRecorded { .. } => "TEST_RECORDED",
            DomainEvent::PaymentApproved { .. } => "PAYMENT_APPROVED",
            DomainEvent::PaymentRejected { .. } => "PAYMENT_REJECTED",
        }
    }
}
