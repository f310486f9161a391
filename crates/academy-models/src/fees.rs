//! Fees, submitted payments, and the payment approval state machine.
//!
//! A [`FeePayment`] starts `PENDING` and moves exactly once, to `APPROVED` or
//! `REJECTED`. A [`Fee`]'s status is never set directly; it is derived from its
//! paid amount every time a payment is credited.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use academy_core::AppError;

use crate::ids::{FeeId, PaymentId, StudentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeStatus {
    Pending,
    Partial,
    Paid,
}

impl FeeStatus {
    /// Status implied by `paid` against `amount`.
    pub fn from_amounts(paid: Decimal, amount: Decimal) -> Self {
        if paid >= amount {
            FeeStatus::Paid
        } else if paid > Decimal::ZERO {
            FeeStatus::Partial
        } else {
            FeeStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Pending => "PENDING",
            FeeStatus::Partial => "PARTIAL",
            FeeStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(FeeStatus::Pending),
            "PARTIAL" => Ok(FeeStatus::Partial),
            "PAID" => Ok(FeeStatus::Paid),
            other => Err(format!("unknown fee status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub id: FeeId,
    pub student_id: StudentId,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub paid_amount: Decimal,
    pub status: FeeStatus,
}

impl Fee {
    pub fn new(student_id: StudentId, amount: Decimal, due_date: NaiveDate) -> Self {
        Self {
            id: FeeId::new(),
            student_id,
            amount,
            due_date,
            paid_amount: Decimal::ZERO,
            status: FeeStatus::Pending,
        }
    }

    /// Amount still owed, never negative.
    pub fn outstanding(&self) -> Decimal {
        (self.amount - self.paid_amount).max(Decimal::ZERO)
    }

    /// Adds `amount` to the paid total and recomputes the status.
    pub fn credit(&mut self, amount: Decimal) {
        self.paid_amount += amount;
        self.status = FeeStatus::from_amounts(self.paid_amount, self.amount);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "APPROVED" => Ok(PaymentStatus::Approved),
            "REJECTED" => Ok(PaymentStatus::Rejected),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeePayment {
    pub id: PaymentId,
    pub fee_id: FeeId,
    pub student_id: StudentId,
    pub amount: Decimal,
    pub transaction_id: String,
    pub receipt_ref: Option<String>,
    pub status: PaymentStatus,
    pub rejection_reason: Option<String>,
    pub note: Option<String>,
    pub approver_id: Option<uuid::Uuid>,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl FeePayment {
    pub fn submitted(fee: &Fee, dto: &SubmitPaymentDto) -> Self {
        Self {
            id: PaymentId::new(),
            fee_id: fee.id,
            student_id: fee.student_id,
            amount: dto.amount,
            transaction_id: dto.transaction_id.trim().to_string(),
            receipt_ref: dto.receipt_ref.clone(),
            status: PaymentStatus::Pending,
            rejection_reason: None,
            note: None,
            approver_id: None,
            submitted_at: Utc::now(),
            decided_at: None,
        }
    }

    fn ensure_pending(&self, to: PaymentStatus) -> Result<(), AppError> {
        if self.status == PaymentStatus::Pending {
            return Ok(());
        }
        Err(AppError::InvalidStateTransition {
            entity: "payment",
            id: self.id.into_inner(),
            from: self.status.to_string(),
            to: to.to_string(),
        })
    }

    pub fn approve(&mut self, approver_id: uuid::Uuid, note: Option<String>) -> Result<(), AppError> {
        self.ensure_pending(PaymentStatus::Approved)?;
        self.status = PaymentStatus::Approved;
        self.approver_id = Some(approver_id);
        self.note = note;
        self.decided_at = Some(Utc::now());
        Ok(())
    }

    pub fn reject(&mut self, approver_id: uuid::Uuid, reason: String) -> Result<(), AppError> {
        self.ensure_pending(PaymentStatus::Rejected)?;
        self.status = PaymentStatus::Rejected;
        self.approver_id = Some(approver_id);
        self.rejection_reason = Some(reason);
        self.decided_at = Some(Utc::now());
        Ok(())
    }
}

/// Decimal places a stored amount keeps.
pub const MONEY_SCALE: u32 = 2;

/// Smallest amount too large to store (`NUMERIC(12, 2)`).
pub const MONEY_LIMIT: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

/// Amounts must be positive, whole cents, and below [`MONEY_LIMIT`].
fn validate_money_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("positive").with_message("must be greater than 0".into()));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(ValidationError::new("scale")
            .with_message("must have at most 2 decimal places".into()));
    }
    if *amount >= MONEY_LIMIT {
        return Err(ValidationError::new("too_large")
            .with_message("must be less than 10000000000".into()));
    }
    Ok(())
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank").with_message("must not be blank".into()))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateFeeDto {
    pub student_id: StudentId,
    #[validate(custom(function = "validate_money_amount"))]
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitPaymentDto {
    pub fee_id: FeeId,
    pub student_id: StudentId,
    #[validate(custom(function = "validate_money_amount"))]
    pub amount: Decimal,
    #[validate(
        length(max = 100, message = "must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub transaction_id: String,
    #[validate(length(max = 255, message = "must be at most 255 characters"))]
    pub receipt_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ApprovePaymentDto {
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RejectPaymentDto {
    #[validate(
        length(max = 500, message = "must be at most 500 characters"),
        custom(function = "validate_not_blank")
    )]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentDecision {
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_status: Option<FeeStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeStatement {
    pub fee: Fee,
    pub outstanding: Decimal,
    pub payments: Vec<FeePayment>,
}
