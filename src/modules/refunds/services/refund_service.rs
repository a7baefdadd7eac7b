use crate::config::RefundConfig;
use crate::core::{money, AppError, Result};
use crate::modules::payments::models::{PaymentStatus, PaymentTransaction};
use crate::modules::refunds::models::{
    ApproveRefundRequest, CreateRefundRequest, PayoutResultRequest, RefundChange, RefundTransaction,
    RejectRefundRequest,
};
use crate::modules::refunds::repositories::RefundRepository;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Refund workflow
///
/// Refunds up to the approval threshold go straight to `processing`; larger
/// ones wait in `pending` for a manager. The payout leg reports back through
/// [`RefundService::confirm_payout`].
pub struct RefundService {
    refunds: Arc<dyn RefundRepository>,
    config: RefundConfig,
}

impl RefundService {
    pub fn new(refunds: Arc<dyn RefundRepository>, config: RefundConfig) -> Self {
        Self { refunds, config }
    }

    /// Request a refund against a completed payment
    ///
    /// # Errors
    /// * `PaymentNotFound` / `PaymentNotCompleted`
    /// * `RefundExceedsOriginal` - amount above what is left after other refunds
    pub async fn initiate_refund(&self, request: CreateRefundRequest) -> Result<RefundTransaction> {
        money::validate_amount(request.amount, "amount").map_err(AppError::Validation)?;

        let threshold = self.config.approval_threshold;
        let build = |payment: &PaymentTransaction, committed: Decimal| -> Result<RefundTransaction> {
            if payment.status != PaymentStatus::Completed {
                return Err(AppError::PaymentNotCompleted(format!(
                    "{} is {}",
                    payment.payment_reference, payment.status
                )));
            }

            let refundable = (payment.amount - committed).max(Decimal::ZERO);
            if request.amount > refundable {
                return Err(AppError::RefundExceedsOriginal {
                    requested: request.amount,
                    refundable,
                });
            }

            Ok(RefundTransaction::new(
                &payment.id,
                &payment.booking_id,
                request.amount,
                request.reason,
                request.notes.clone(),
                request.requested_by.clone(),
                threshold,
            ))
        };

        let refund = self
            .refunds
            .insert_if_refundable(&request.payment_id, &build)
            .await?;

        tracing::info!(
            refund_id = %refund.id,
            payment_id = %refund.original_payment_id,
            amount = %money::format_amount(refund.refund_amount),
            reason = %refund.reason,
            status = %refund.status,
            requires_approval = refund.requires_approval,
            "Refund requested"
        );
        Ok(refund)
    }

    /// Approve a pending refund and hand it to the payout leg
    pub async fn approve_refund(
        &self,
        refund_id: &str,
        request: ApproveRefundRequest,
    ) -> Result<RefundTransaction> {
        let approved_by = request.approved_by.trim();
        if approved_by.is_empty() {
            return Err(AppError::validation("approvedBy is required"));
        }

        let approved = self
            .transition(
                refund_id,
                RefundChange::Approve {
                    approved_by: approved_by.to_string(),
                },
                "approved",
            )
            .await?;
        tracing::info!(refund_id = %approved.id, approved_by, "Refund approved");

        self.transition(refund_id, RefundChange::BeginProcessing, "processed")
            .await
    }

    pub async fn reject_refund(
        &self,
        refund_id: &str,
        request: RejectRefundRequest,
    ) -> Result<RefundTransaction> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(AppError::validation("reason is required"));
        }

        let rejected = self
            .transition(
                refund_id,
                RefundChange::Reject {
                    reason: reason.to_string(),
                },
                "rejected",
            )
            .await?;
        tracing::info!(refund_id = %rejected.id, reason, "Refund rejected");
        Ok(rejected)
    }

    /// Record the payout result. A completed refund that brings the total
    /// refunded up to the payment amount marks the payment refunded.
    pub async fn confirm_payout(
        &self,
        refund_id: &str,
        request: PayoutResultRequest,
    ) -> Result<RefundTransaction> {
        let change = if request.success {
            RefundChange::Complete {
                payout_reference: request.payout_reference,
            }
        } else {
            RefundChange::Fail {
                reason: request
                    .reason
                    .filter(|reason| !reason.trim().is_empty())
                    .unwrap_or_else(|| "Payout failed".to_string()),
            }
        };

        let refund = self.transition(refund_id, change, "settled").await?;
        tracing::info!(
            refund_id = %refund.id,
            status = %refund.status,
            payout_reference = refund.payout_reference.as_deref().unwrap_or("-"),
            "Refund payout recorded"
        );
        Ok(refund)
    }

    pub async fn get_refund(&self, refund_id: &str) -> Result<RefundTransaction> {
        self.refunds
            .find_by_id(refund_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Refund '{}'", refund_id)))
    }

    async fn transition(
        &self,
        refund_id: &str,
        change: RefundChange,
        verb: &str,
    ) -> Result<RefundTransaction> {
        if let Some(refund) = self
            .refunds
            .apply_change(refund_id, &change, Utc::now())
            .await?
        {
            return Ok(refund);
        }

        let current = self.get_refund(refund_id).await?;
        Err(AppError::conflict(format!(
            "Refund {} cannot be {} while {}",
            current.refund_reference, verb, current.status
        )))
    }
}
