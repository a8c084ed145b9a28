//! Audit interceptor.
//!
//! Records the terminal outcome of gated operations without ever delaying or
//! failing them. Records are handed to a background worker over a bounded
//! channel; if the channel is full the write is dispatched on its own task
//! instead of being dropped. Persistence failures are logged and counted,
//! never surfaced to the caller.

use futures::FutureExt;
use metrics::counter;
use serde_json::{json, Value};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{error, info, warn};

use super::classify::Classify;
use super::record::{AuditRecord, AuditStatus, RequestMeta};
use crate::rbac::PrincipalId;
use crate::store::CredentialStore;

enum AuditCommand {
    Write(AuditRecord),
    Flush(oneshot::Sender<()>),
}

/// Writes that bypassed the channel and are still running.
#[derive(Default)]
struct Detached {
    in_flight: AtomicUsize,
    idle: Notify,
}

#[derive(Clone)]
pub struct Auditor {
    sender: mpsc::Sender<AuditCommand>,
    store: Arc<dyn CredentialStore>,
    detached: Arc<Detached>,
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor")
            .field("capacity", &self.sender.capacity())
            .field("detached_in_flight", &self.detached.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl Auditor {
    /// Start the background writer. Must be called inside a Tokio runtime.
    pub fn new(store: Arc<dyn CredentialStore>, buffer: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<AuditCommand>(buffer.max(1));
        let worker_store = store.clone();

        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    AuditCommand::Write(record) => persist(worker_store.as_ref(), record).await,
                    AuditCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self {
            sender,
            store,
            detached: Arc::new(Detached::default()),
        }
    }

    /// Record an outcome directly. Returns immediately; the write happens later.
    pub fn record(
        &self,
        actor: Option<PrincipalId>,
        action: &str,
        resource: &str,
        status: AuditStatus,
        details: Value,
        meta: &RequestMeta,
    ) {
        self.submit(AuditRecord::new(actor, action, resource, status, details, meta));
    }

    fn submit(&self, record: AuditRecord) {
        let record = match self.sender.try_send(AuditCommand::Write(record)) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(AuditCommand::Write(record))) => {
                warn!(record_id = %record.id, "Audit queue full, writing on a detached task");
                record
            }
            Err(mpsc::error::TrySendError::Closed(AuditCommand::Write(record))) => {
                warn!(record_id = %record.id, "Audit worker stopped, writing on a detached task");
                record
            }
            Err(_) => return,
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(record_id = %record.id, "No runtime available, audit record lost");
            counter!("audit_write_failures_total").increment(1);
            return;
        };

        let store = self.store.clone();
        let detached = self.detached.clone();
        detached.in_flight.fetch_add(1, Ordering::SeqCst);
        runtime.spawn(async move {
            persist(store.as_ref(), record).await;
            if detached.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                detached.idle.notify_waiters();
            }
        });
    }

    /// Run `operation` and record its outcome exactly once.
    ///
    /// A panic inside the operation produces a `failed` record and is then
    /// resumed. If the returned future is dropped before completion, a
    /// `failed` record marked `cancelled` is written.
    pub async fn wrap<F, T>(
        &self,
        actor: Option<PrincipalId>,
        action: &str,
        resource: &str,
        meta: &RequestMeta,
        operation: F,
    ) -> T
    where
        F: Future<Output = T>,
        T: Classify,
    {
        let mut pending = PendingRecord {
            auditor: self,
            actor,
            action,
            resource,
            meta,
            armed: true,
        };

        let result = AssertUnwindSafe(operation).catch_unwind().await;
        pending.armed = false;

        match result {
            Ok(outcome) => {
                self.record(
                    actor,
                    action,
                    resource,
                    outcome.audit_status(),
                    outcome.audit_details(),
                    meta,
                );
                outcome
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(action = %action, resource = %resource, panic = %message, "Audited operation panicked");
                self.record(
                    actor,
                    action,
                    resource,
                    AuditStatus::Failed,
                    json!({ "panic": true, "message": message }),
                    meta,
                );
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Wait until every record submitted so far has been handed to the store.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(AuditCommand::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }

        loop {
            let idle = self.detached.idle.notified();
            if self.detached.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            idle.await;
        }
    }

    /// Best-effort drain before process exit. Returns `false` on timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.flush()).await {
            Ok(()) => {
                info!("Audit trail drained");
                true
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Audit drain timed out, pending records may be lost");
                false
            }
        }
    }
}

async fn persist(store: &dyn CredentialStore, record: AuditRecord) {
    info!(
        target: "audit",
        record_id = %record.id,
        actor = ?record.actor_id.map(|id| id.to_string()),
        action = %record.action,
        resource = %record.resource,
        status = %record.status,
        origin = ?record.origin,
        "AUDIT"
    );

    match store.append_audit_record(&record).await {
        Ok(()) => {
            counter!("audit_records_total", "status" => record.status.as_str()).increment(1);
        }
        Err(e) => {
            error!(record_id = %record.id, action = %record.action, error = %e, "Audit write failed");
            counter!("audit_write_failures_total").increment(1);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Writes a `failed` record if dropped while still armed.
struct PendingRecord<'a> {
    auditor: &'a Auditor,
    actor: Option<PrincipalId>,
    action: &'a str,
    resource: &'a str,
    meta: &'a RequestMeta,
    armed: bool,
}

impl Drop for PendingRecord<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.auditor.record(
                self.actor,
                self.action,
                self.resource,
                AuditStatus::Failed,
                json!({ "cancelled": true }),
                self.meta,
            );
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Forbidden};
    use crate::audit::Outcome;
    use crate::store::MemoryStore;

    fn auditor(buffer: usize) -> (Auditor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Auditor::new(store.clone(), buffer), store)
    }

    #[tokio::test]
    async fn test_wrap_records_success_once() {
        let (auditor, store) = auditor(8);
        let actor = PrincipalId::new();

        let value: Result<u32, AuthError> = auditor
            .wrap(Some(actor), "view_users", "users", &RequestMeta::default(), async { Ok(7) })
            .await;
        assert_eq!(value.unwrap(), 7);

        auditor.flush().await;
        let records = store.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Success);
        assert_eq!(records[0].actor_id, Some(actor));
        assert_eq!(records[0].action, "view_users");
    }

    #[tokio::test]
    async fn test_wrap_classifies_denial_and_failure() {
        let (auditor, store) = auditor(8);
        let meta = RequestMeta::default();

        let _: Result<(), AuthError> = auditor
            .wrap(None, "delete_user", "users", &meta, async {
                Err(Forbidden::SelfDeletion.into())
            })
            .await;
        let _: Outcome<(), String> = auditor
            .wrap(None, "update_user", "users", &meta, async {
                Outcome::Failed("db".to_string())
            })
            .await;

        auditor.flush().await;
        let statuses: Vec<AuditStatus> = store.audit_records().iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![AuditStatus::Denied, AuditStatus::Failed]);
    }

    #[tokio::test]
    async fn test_panic_yields_failed_record() {
        let (auditor, store) = auditor(8);

        let handle = {
            let auditor = auditor.clone();
            tokio::spawn(async move {
                let _: Result<(), AuthError> = auditor
                    .wrap(None, "explode", "users", &RequestMeta::default(), async {
                        panic!("boom")
                    })
                    .await;
            })
        };
        assert!(handle.await.unwrap_err().is_panic());

        auditor.flush().await;
        let records = store.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Failed);
        assert_eq!(records[0].details["panic"], true);
        assert_eq!(records[0].details["message"], "boom");
    }

    #[tokio::test]
    async fn test_cancelled_operation_recorded_once() {
        let (auditor, store) = auditor(8);
        let meta = RequestMeta::default();

        let slow = auditor.wrap(None, "slow", "users", &meta, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), AuthError>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), slow).await;
        assert!(timed_out.is_err());

        auditor.flush().await;
        let records = store.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].details["cancelled"], true);
    }

    #[tokio::test]
    async fn test_store_failure_never_reaches_caller() {
        let (auditor, store) = auditor(8);
        store.fail_audit_writes(true);

        let value: Result<&str, AuthError> = auditor
            .wrap(None, "view_users", "users", &RequestMeta::default(), async { Ok("ok") })
            .await;
        assert_eq!(value.unwrap(), "ok");

        auditor.flush().await;
        assert!(store.audit_records().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_falls_back_to_detached_write() {
        let (auditor, store) = auditor(1);
        for i in 0..20 {
            auditor.record(
                None,
                &format!("action_{}", i),
                "users",
                AuditStatus::Success,
                Value::Null,
                &RequestMeta::default(),
            );
        }

        auditor.flush().await;
        assert_eq!(store.audit_records().len(), 20);
    }

    #[tokio::test]
    async fn test_shutdown_drains() {
        let (auditor, store) = auditor(8);
        auditor.record(None, "logout", "auth", AuditStatus::Success, Value::Null, &RequestMeta::default());
        assert!(auditor.shutdown(Duration::from_secs(1)).await);
        assert_eq!(store.audit_records().len(), 1);
    }
}
