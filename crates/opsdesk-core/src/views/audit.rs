use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use super::NoticeSink;
use crate::constants::{paths, AUDIT_PAGE_SIZE};
use crate::error::SyncResult;
use crate::events::Topic;
use crate::models::{AuditEntry, SecurityNotice};
use crate::pull::{pull_data, PullRequest, SharedPullClient};
use crate::refresh::{LoaderStatus, RefreshLoader};
use crate::router::{EventRouter, SubscriptionScope};

type Loader = RefreshLoader<Vec<AuditEntry>>;

/// Audit log list, newest first.
///
/// `audit:log` pushes carry the full entry and are prepended without a pull.
/// `audit:alert` pushes are handed to the notice sink verbatim.
pub struct AuditLogView {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
    loader: Loader,
    // held for its drop
    _scope: SubscriptionScope,
}

/// Prepend a pushed entry unless one with the same id is already listed.
fn prepend(entries: &mut Vec<AuditEntry>, entry: AuditEntry) -> bool {
    if entries.iter().any(|e| e.id == entry.id) {
        return false;
    }
    entries.insert(0, entry);
    true
}

/// Replace the list with a pulled page, keeping pushed entries that are
/// newer than anything the page contains.
fn merge_pulled(entries: &mut Vec<AuditEntry>, pulled: Vec<AuditEntry>) {
    let newest = pulled.iter().map(|e| e.created_at).max();
    let ids: HashSet<&str> = pulled.iter().map(|e| e.id.as_str()).collect();
    let mut merged: Vec<AuditEntry> = entries
        .iter()
        .filter(|e| !ids.contains(e.id.as_str()))
        .filter(|e| newest.map_or(true, |n| e.created_at > n))
        .cloned()
        .collect();
    merged.extend(pulled);
    *entries = merged;
}

fn notice_from(payload: &Value) -> Option<SecurityNotice> {
    match payload {
        Value::String(message) => Some(SecurityNotice {
            message: message.clone(),
        }),
        other => serde_json::from_value(other.clone()).ok(),
    }
}

impl AuditLogView {
    pub fn mount(router: &EventRouter, pull: SharedPullClient, notices: Arc<dyn NoticeSink>) -> Self {
        let loader: Loader = RefreshLoader::new("audit-logs", move || {
            let pull = pull.clone();
            async move {
                let request = PullRequest::get(paths::AUDIT_LOGS)
                    .with_param("limit", AUDIT_PAGE_SIZE.to_string());
                pull_data(pull.as_ref(), request).await
            }
        });

        let entries = Arc::new(Mutex::new(Vec::new()));
        let mut scope = SubscriptionScope::new("audit-logs", router);

        let weak = Arc::downgrade(&entries);
        let fallback = loader.clone();
        scope.subscribe(Topic::AuditLog, move |payload: &Value| {
            let Some(entries) = weak.upgrade() else {
                return;
            };
            match serde_json::from_value::<AuditEntry>(payload.clone()) {
                Ok(entry) => {
                    let id = entry.id.clone();
                    if !prepend(&mut entries.lock(), entry) {
                        debug!(id = %id, "duplicate audit entry ignored");
                    }
                }
                Err(e) => {
                    // Malformed push; the server list is authoritative.
                    debug!("audit:log payload not an entry ({}), pulling", e);
                    fallback.spawn_refresh(weak.clone(), merge_pulled);
                }
            }
        });

        scope.subscribe(Topic::AuditAlert, move |payload: &Value| {
            match notice_from(payload) {
                Some(notice) => {
                    warn!(message = %notice.message, "security alert");
                    notices.show_blocking(notice);
                }
                None => debug!("audit:alert without a message dropped"),
            }
        });

        Self {
            entries,
            loader,
            _scope: scope,
        }
    }

    pub async fn refresh(&self) -> SyncResult<bool> {
        self.loader
            .run_into(&Arc::downgrade(&self.entries), merge_pulled)
            .await
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn status(&self) -> LoaderStatus {
        self.loader.status()
    }
}
