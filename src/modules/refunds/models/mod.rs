pub mod refund;

pub use refund::{
    ApproveRefundRequest, CreateRefundRequest, PayoutResultRequest, RefundChange, RefundReason,
    RefundStatus, RefundTransaction, RejectRefundRequest,
};
