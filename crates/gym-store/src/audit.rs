//! Audit log backends: in-memory and JSONL file.

use gym_types::{AuditListOptions, AuditLog, AuditLogEntry, AuditLogError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// In-memory AuditLog (process lifetime only).
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditLogError> {
        let mut guard = self.entries.write().await;
        if guard.iter().any(|e| e.entry_id == entry.entry_id) {
            return Ok(());
        }
        guard.push(entry);
        Ok(())
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let mut out = self.entries.read().await.clone();
        apply_list_opts(&mut out, opts);
        Ok(out)
    }
}

/// JSONL file-backed AuditLog (persists across restarts). One entry per line.
pub struct JsonlAuditLog {
    path: PathBuf,
    /// Entry ids already in the file; loaded on first append.
    seen: Mutex<Option<HashSet<String>>>,
}

impl JsonlAuditLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            seen: Mutex::new(None),
        }
    }

    async fn read_all(&self) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuditLogError::Other(e.to_string())),
        };
        let mut out = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => out.push(entry),
                Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "skipping unreadable audit line"),
            }
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl AuditLog for JsonlAuditLog {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditLogError> {
        let mut seen = self.seen.lock().await;
        if seen.is_none() {
            let ids = self
                .read_all()
                .await?
                .into_iter()
                .map(|e| e.entry_id)
                .collect();
            *seen = Some(ids);
        }
        if let Some(ids) = seen.as_ref() {
            if ids.contains(&entry.entry_id) {
                return Ok(());
            }
        }
        let line =
            serde_json::to_string(&entry).map_err(|e| AuditLogError::Other(e.to_string()))?;
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AuditLogError::Other(e.to_string()))?;
        f.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| AuditLogError::Other(e.to_string()))?;
        f.flush()
            .await
            .map_err(|e| AuditLogError::Other(e.to_string()))?;
        if let Some(ids) = seen.as_mut() {
            ids.insert(entry.entry_id);
        }
        Ok(())
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let mut out = self.read_all().await?;
        apply_list_opts(&mut out, opts);
        Ok(out)
    }
}

/// Filter, order newest first (append order breaks ties), then paginate.
pub(crate) fn apply_list_opts(out: &mut Vec<AuditLogEntry>, opts: &AuditListOptions) {
    if let Some(ref member_id) = opts.member_id {
        out.retain(|e| &e.member_id == member_id);
    }
    if let Some(since) = opts.since {
        out.retain(|e| e.logged_at >= since);
    }
    out.reverse();
    out.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
    let offset = opts.offset.unwrap_or(0) as usize;
    let limit = opts.limit.unwrap_or(100) as usize;
    let taken: Vec<AuditLogEntry> = std::mem::take(out)
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect();
    *out = taken;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use gym_types::AuditAction;

    fn entry(id: &str, member_id: &str, minute: i64) -> AuditLogEntry {
        AuditLogEntry {
            entry_id: id.to_string(),
            member_id: member_id.to_string(),
            assignment_id: None,
            plan_id: "basic".to_string(),
            plan_name: "Basic".to_string(),
            action: AuditAction::Assigned,
            status_before: None,
            status_after: None,
            start_date: None,
            end_date: None,
            price_paid: None,
            notes: None,
            logged_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    #[tokio::test]
    async fn in_memory_lists_newest_first_and_ignores_duplicates() {
        let log = InMemoryAuditLog::new();
        log.append(entry("e1", "m1", 0)).await.unwrap();
        log.append(entry("e2", "m1", 5)).await.unwrap();
        log.append(entry("e3", "m2", 1)).await.unwrap();
        log.append(entry("e1", "m1", 9)).await.unwrap();

        let opts = AuditListOptions {
            member_id: Some("m1".to_string()),
            ..Default::default()
        };
        let listed = log.list(&opts).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|e| e.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
    }

    #[tokio::test]
    async fn same_timestamp_keeps_latest_append_first() {
        let log = InMemoryAuditLog::new();
        log.append(entry("first", "m1", 0)).await.unwrap();
        log.append(entry("second", "m1", 0)).await.unwrap();
        let listed = log.list(&AuditListOptions::default()).await.unwrap();
        assert_eq!(listed[0].entry_id, "second");
        assert_eq!(listed[1].entry_id, "first");
    }

    #[tokio::test]
    async fn jsonl_persists_and_dedups_across_instances() {
        let path = std::env::temp_dir().join(format!(
            "gym-audit-{}.jsonl",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        {
            let log = JsonlAuditLog::new(&path);
            log.append(entry("e1", "m1", 0)).await.unwrap();
            log.append(entry("e2", "m1", 1)).await.unwrap();
        }
        let reopened = JsonlAuditLog::new(&path);
        reopened.append(entry("e1", "m1", 0)).await.unwrap();
        let opts = AuditListOptions {
            limit: Some(1),
            ..Default::default()
        };
        let listed = reopened.list(&opts).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].entry_id, "e2");
        let all = reopened.list(&AuditListOptions::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
