//! # Audit Log
//!
//! Append-only record of topology-affecting writes with full before/after
//! feature snapshots. Entries are keyed by feature id and a global sequence,
//! so one prefix scan lists a feature's history in write order.

use crate::primitives::{AUDIT_LIMIT, DEFAULT_ACTOR};
use crate::storage::{TwinRead, TwinReadExt, TwinWrite, TwinWriteExt, composite_key, key_prefix, sequence_key, tables};
use crate::types::{AuditAction, AuditLogEntry};
use crate::TwinError;
use chrono::Utc;
use serde_json::Value;

/// Actor recorded on an entry: the trimmed caller, or `"system"` when blank.
#[must_use]
pub fn resolve_actor(changed_by: Option<&str>) -> String {
    match changed_by.map(str::trim) {
        Some(actor) if !actor.is_empty() => actor.to_string(),
        _ => DEFAULT_ACTOR.to_string(),
    }
}

/// Append one entry inside the caller's unit of work and return it.
pub fn append<W: TwinWrite + ?Sized>(
    uow: &W,
    feature_id: &str,
    action: AuditAction,
    changed_by: Option<&str>,
    before: Value,
    after: Value,
) -> Result<AuditLogEntry, TwinError> {
    let sequence = uow.next_sequence("audit")?;
    let entry = AuditLogEntry {
        id: sequence.to_string(),
        feature_id: feature_id.to_string(),
        action,
        changed_by: resolve_actor(changed_by),
        before,
        after,
        changed_at: Utc::now(),
    };
    let key = composite_key(&[feature_id, sequence_key(sequence).as_str()]);
    uow.put_as(tables::AUDIT_LOG, &key, &entry)?;
    tracing::debug!(feature_id, audit_id = %entry.id, %action, "audit entry appended");
    Ok(entry)
}

/// Entries of one feature, newest first. `limit` defaults to 30 and is
/// clamped to `1..=200`.
pub fn list_audit_log<R: TwinRead + ?Sized>(
    reader: &R,
    feature_id: &str,
    limit: Option<i64>,
) -> Result<Vec<AuditLogEntry>, TwinError> {
    let limit = AUDIT_LIMIT.resolve(limit);
    let mut entries: Vec<AuditLogEntry> =
        reader.scan_as(tables::AUDIT_LOG, &key_prefix(&[feature_id]))?;
    entries.reverse();
    entries.truncate(limit);
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::TwinStore;
    use serde_json::json;

    #[test]
    fn actor_defaults_to_system() {
        assert_eq!(resolve_actor(None), "system");
        assert_eq!(resolve_actor(Some("   ")), "system");
        assert_eq!(resolve_actor(Some("  alice ")), "alice");
    }

    #[test]
    fn list_is_newest_first_and_scoped_to_feature() {
        let store = TwinStore::in_memory().expect("open");
        store
            .write(|uow| {
                for n in 0..3 {
                    append(
                        uow,
                        "road-1",
                        AuditAction::PropertiesUpdate,
                        None,
                        json!({ "n": n }),
                        json!({ "n": n + 1 }),
                    )?;
                }
                append(uow, "road-10", AuditAction::GeometryUpdate, Some("bob"), json!(null), json!(null))?;
                Ok(())
            })
            .expect("append");

        let entries = store
            .read(|s| list_audit_log(s, "road-1", None))
            .expect("list");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].after, json!({ "n": 3 }));
        assert_eq!(entries[2].before, json!({ "n": 0 }));
        assert!(entries.iter().all(|e| e.feature_id == "road-1"));

        let limited = store
            .read(|s| list_audit_log(s, "road-1", Some(0)))
            .expect("list");
        assert_eq!(limited.len(), 1);
    }
}
