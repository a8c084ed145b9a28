//! Read side of the audit trail: filtering, paging and counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{AuditRecord, AuditStatus};
use crate::rbac::PrincipalId;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Audit query parameters. All criteria are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Substring match on the action label.
    pub action: Option<String>,
    pub status: Option<AuditStatus>,
    pub actor_id: Option<PrincipalId>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl AuditFilter {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(ref action) = self.action {
            if !record.action.contains(action.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(actor) = self.actor_id {
            if record.actor_id != Some(actor) {
                return false;
            }
        }
        if let Some(start) = self.start {
            if record.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if record.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// Who performed an audited action, as that principal exists now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSummary {
    pub id: PrincipalId,
    pub username: String,
    pub email: String,
}

/// A record joined with its actor. `actor` is `None` for anonymous records
/// and for principals deleted since.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(flatten)]
    pub record: AuditRecord,
    pub actor: Option<ActorSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    /// Newest first.
    pub records: Vec<AuditEntry>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl AuditPage {
    pub fn new(records: Vec<AuditEntry>, total: u64, filter: &AuditFilter) -> Self {
        let limit = filter.limit();
        Self {
            records,
            total,
            page: filter.page(),
            limit,
            pages: total.div_ceil(u64::from(limit)),
        }
    }

    /// Filter, order and slice an in-memory record set, resolving actors for
    /// the returned page only.
    pub fn from_records<'a, I, F>(records: I, filter: &AuditFilter, resolve_actor: F) -> Self
    where
        I: IntoIterator<Item = &'a AuditRecord>,
        F: Fn(PrincipalId) -> Option<ActorSummary>,
    {
        let mut matching: Vec<&AuditRecord> =
            records.into_iter().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = matching.len() as u64;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(filter.limit() as usize)
            .map(|record| AuditEntry {
                actor: record.actor_id.and_then(&resolve_actor),
                record: record.clone(),
            })
            .collect();

        Self::new(page, total, filter)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub denied: u64,
}

impl AuditStats {
    pub fn tally<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AuditRecord>,
    {
        records.into_iter().fold(Self::default(), |mut stats, r| {
            stats.total += 1;
            match r.status {
                AuditStatus::Success => stats.success += 1,
                AuditStatus::Failed => stats.failed += 1,
                AuditStatus::Denied => stats.denied += 1,
            }
            stats
        })
    }
}
