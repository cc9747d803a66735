//! HTTP middleware
pub mod correlation_id;

pub use correlation_id::{CorrelationId, CorrelationIdMiddleware, CORRELATION_ID_HEADER};
