use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use academy_config::OverpaymentPolicy;
use academy_core::{AppError, AuthorizationContext, permissions, validation};
use academy_models::{
    ApprovePaymentDto, CreateFeeDto, DomainEvent, Fee, FeeId, FeePayment, FeeStatement,
    PaymentDecision, PaymentId, PaymentStatus, RejectPaymentDto, SubmitPaymentDto,
};
use academy_observability::track_payment_decision;

use crate::events::publish_all;
use crate::state::AppState;

pub struct PaymentService;

impl PaymentService {
    #[instrument(skip(state))]
    pub async fn assess_fee(
        state: &AppState,
        ctx: &AuthorizationContext,
        dto: CreateFeeDto,
    ) -> Result<Fee, AppError> {
        ctx.require(permissions::FEES_CREATE)?;
        validation::validate(&dto)?;

        if state.store.student(dto.student_id).await?.is_none() {
            return Err(AppError::not_found("student", dto.student_id));
        }

        let fee = Fee::new(dto.student_id, dto.amount, dto.due_date);

        let mut tx = state.store.begin().await?;
        tx.save_fee(&fee).await?;
        tx.commit().await?;

        info!(fee_id = %fee.id, student_id = %fee.student_id, amount = %fee.amount, "fee assessed");
        Ok(fee)
    }

    /// Records proof of payment as `PENDING`. The fee is not touched until a
    /// staff member approves it.
    #[instrument(skip(state))]
    pub async fn submit_payment(
        state: &AppState,
        ctx: &AuthorizationContext,
        dto: SubmitPaymentDto,
    ) -> Result<FeePayment, AppError> {
        ctx.require(permissions::PAYMENTS_SUBMIT)?;
        validation::validate(&dto)?;

        let fee = state
            .store
            .fee(dto.fee_id)
            .await?
            .ok_or_else(|| AppError::not_found("fee", dto.fee_id))?;
        if fee.student_id != dto.student_id {
            return Err(AppError::validation(
                "student_id",
                "fee belongs to a different student",
            ));
        }

        let payment = FeePayment::submitted(&fee, &dto);

        let mut tx = state.store.begin().await?;
        tx.save_payment(&payment).await?;
        tx.commit().await?;

        info!(payment_id = %payment.id, fee_id = %fee.id, amount = %payment.amount, "payment submitted");
        Ok(payment)
    }

    /// Approves a pending payment and credits its fee.
    ///
    /// The payment row is locked before its status is checked, and the fee row
    /// after it, so of two racing decisions only the first sees `PENDING`.
    #[instrument(skip(state))]
    pub async fn approve_payment(
        state: &AppState,
        ctx: &AuthorizationContext,
        payment_id: PaymentId,
        dto: ApprovePaymentDto,
    ) -> Result<PaymentDecision, AppError> {
        ctx.require(permissions::PAYMENTS_DECIDE)?;
        validation::validate(&dto)?;

        let mut tx = state.store.begin().await?;

        let mut payment = tx
            .payment_for_update(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found("payment", payment_id))?;

        if let Err(e) = payment.approve(ctx.user_id, dto.note) {
            warn!(payment_id = %payment_id, status = %payment.status, "payment already decided");
            return Err(e);
        }

        let mut fee = tx
            .fee_for_update(payment.fee_id)
            .await?
            .ok_or_else(|| AppError::not_found("fee", payment.fee_id))?;

        let credited = credit_amount(state.policy.overpayment, &fee, payment.amount)?;
        fee.credit(credited);

        tx.save_payment(&payment).await?;
        tx.save_fee(&fee).await?;
        tx.commit().await?;

        info!(
            payment_id = %payment_id,
            fee_id = %fee.id,
            credited = %credited,
            paid_amount = %fee.paid_amount,
            fee_status = %fee.status,
            "payment approved"
        );
        track_payment_decision(PaymentStatus::Approved.as_str());
        publish_all(
            state.events.as_ref(),
            &[DomainEvent::PaymentApproved {
                payment_id,
                fee_id: fee.id,
                new_fee_status: fee.status,
            }],
        )
        .await;

        Ok(PaymentDecision {
            payment_status: payment.status,
            fee_status: Some(fee.status),
        })
    }

    #[instrument(skip(state))]
    pub async fn reject_payment(
        state: &AppState,
        ctx: &AuthorizationContext,
        payment_id: PaymentId,
        dto: RejectPaymentDto,
    ) -> Result<PaymentDecision, AppError> {
        ctx.require(permissions::PAYMENTS_DECIDE)?;
        validation::validate(&dto)?;

        let reason = dto.reason.trim().to_string();
        let mut tx = state.store.begin().await?;

        let mut payment = tx
            .payment_for_update(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found("payment", payment_id))?;

        if let Err(e) = payment.reject(ctx.user_id, reason.clone()) {
            warn!(payment_id = %payment_id, status = %payment.status, "payment already decided");
            return Err(e);
        }

        tx.save_payment(&payment).await?;
        tx.commit().await?;

        info!(payment_id = %payment_id, reason = %reason, "payment rejected");
        track_payment_decision(PaymentStatus::Rejected.as_str());
        publish_all(
            state.events.as_ref(),
            &[DomainEvent::PaymentRejected { payment_id, reason }],
        )
        .await;

        Ok(PaymentDecision {
            payment_status: payment.status,
            fee_status: None,
        })
    }

    #[instrument(skip(state))]
    pub async fn fee_statement(
        state: &AppState,
        ctx: &AuthorizationContext,
        fee_id: FeeId,
    ) -> Result<FeeStatement, AppError> {
        ctx.require(permissions::FEES_READ)?;

        let fee = state
            .store
            .fee(fee_id)
            .await?
            .ok_or_else(|| AppError::not_found("fee", fee_id))?;
        let payments = state.store.payments_for_fee(fee_id).await?;

        Ok(FeeStatement {
            outstanding: fee.outstanding(),
            fee,
            payments,
        })
    }
}

/// How much of `amount` to add to the fee's paid total under `policy`.
fn credit_amount(policy: OverpaymentPolicy, fee: &Fee, amount: Decimal) -> Result<Decimal, AppError> {
    let outstanding = fee.outstanding();
    match policy {
        OverpaymentPolicy::Allow => Ok(amount),
        OverpaymentPolicy::Cap => Ok(amount.min(outstanding)),
        OverpaymentPolicy::Reject if amount > outstanding => Err(AppError::validation(
            "amount",
            format!("payment of {} exceeds the outstanding balance of {}", amount, outstanding),
        )),
        OverpaymentPolicy::Reject => Ok(amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academy_models::StudentId;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn fee_with_paid(amount: Decimal, paid: Decimal) -> Fee {
        let mut fee = Fee::new(
            StudentId::new(),
            amount,
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        );
        fee.credit(paid);
        fee
    }

    #[test]
    fn test_allow_credits_full_amount() {
        let fee = fee_with_paid(dec!(100), dec!(80));
        assert_eq!(
            credit_amount(OverpaymentPolicy::Allow, &fee, dec!(50)).unwrap(),
            dec!(50)
        );
    }

    #[test]
    fn test_cap_limits_to_outstanding() {
        let fee = fee_with_paid(dec!(100), dec!(80));
        assert_eq!(
            credit_amount(OverpaymentPolicy::Cap, &fee, dec!(50)).unwrap(),
            dec!(20)
        );
    }

    #[test]
    fn test_reject_refuses_overpayment_only() {
        let fee = fee_with_paid(dec!(100), dec!(80));
        let err = credit_amount(OverpaymentPolicy::Reject, &fee, dec!(50)).unwrap_err();
        assert!(err.field_errors().unwrap().contains_field("amount"));
        assert_eq!(
            credit_amount(OverpaymentPolicy::Reject, &fee, dec!(20)).unwrap(),
            dec!(20)
        );
    }
}
