//! Audit trail: records, outcome classification, the background interceptor
//! and the query side.

pub mod classify;
pub mod interceptor;
pub mod query;
pub mod record;

pub use classify::{Classify, Outcome};
pub use interceptor::Auditor;
pub use query::{ActorSummary, AuditEntry, AuditFilter, AuditPage, AuditStats};
pub use record::{is_sensitive_field, redact_details, AuditRecord, AuditStatus, RequestMeta};
