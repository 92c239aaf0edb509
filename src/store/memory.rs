use std::cmp::Ordering;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use anyhow::{Result, anyhow, bail};

use super::{Committed, DatasetRecord, EvictedRecord, NewRecord, RecordRepo};

#[derive(Default)]
struct State {
    next_id: i64,
    records: Vec<DatasetRecord>,
}

/// Non-persistent [`RecordRepo`], selected with `--database :memory:`.
#[derive(Default)]
pub struct MemoryRepo {
    state: Mutex<State>,
    fail_evictions: AtomicBool,
}

fn newest_first(a: &DatasetRecord, b: &DatasetRecord) -> Ordering {
    b.uploaded_at
        .cmp(&a.uploaded_at)
        .then_with(|| b.id.cmp(&a.id))
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert that would evict a record fail, leaving the state untouched.
    pub fn set_fail_evictions(&self, fail: bool) {
        self.fail_evictions.store(fail, AtomicOrdering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| anyhow!("memory repository mutex poisoned"))
    }
}

impl RecordRepo for MemoryRepo {
    fn insert(&self, record: NewRecord, retention: usize) -> Result<Committed> {
        let mut state = self.lock()?;
        let id = state.next_id + 1;

        let stored = DatasetRecord {
            id,
            name: record.name,
            raw_reference: record.raw_reference,
            uploaded_at: record.uploaded_at,
            summary: record.summary,
        };

        let mut records = state.records.clone();
        records.push(stored.clone());
        records.sort_by(newest_first);
        let evicted: Vec<EvictedRecord> = records
            .split_off(retention.min(records.len()))
            .into_iter()
            .map(|r| EvictedRecord {
                id: r.id,
                raw_reference: r.raw_reference,
            })
            .collect();

        if !evicted.is_empty() && self.fail_evictions.load(AtomicOrdering::SeqCst) {
            bail!("failed to evict datasets beyond retention");
        }

        state.next_id = id;
        state.records = records;
        Ok(Committed {
            record: stored,
            evicted,
        })
    }

    fn get(&self, id: i64) -> Result<Option<DatasetRecord>> {
        Ok(self.lock()?.records.iter().find(|r| r.id == id).cloned())
    }

    fn list_desc(&self, limit: Option<usize>) -> Result<Vec<DatasetRecord>> {
        let mut records = self.lock()?.records.clone();
        records.sort_by(newest_first);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::DatasetSummary;
    use chrono::{TimeZone, Utc};

    fn new_record(name: &str, second: u32) -> NewRecord {
        NewRecord {
            name: name.to_string(),
            raw_reference: format!("uploads/{name}"),
            uploaded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap(),
            summary: DatasetSummary::default(),
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let repo = MemoryRepo::new();
        assert_eq!(repo.insert(new_record("a", 0), 5).unwrap().record.id, 1);
        assert_eq!(repo.insert(new_record("b", 1), 5).unwrap().record.id, 2);
    }

    #[test]
    fn test_list_desc_orders_by_timestamp_then_id() {
        let repo = MemoryRepo::new();
        repo.insert(new_record("late", 30), 5).unwrap();
        repo.insert(new_record("early", 10), 5).unwrap();
        repo.insert(new_record("late-twin", 30), 5).unwrap();

        let names: Vec<String> = repo
            .list_desc(None)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["late-twin", "late", "early"]);
        assert_eq!(repo.list_desc(Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_evicts_oldest_beyond_retention() {
        let repo = MemoryRepo::new();
        repo.insert(new_record("a", 10), 2).unwrap();
        repo.insert(new_record("b", 20), 2).unwrap();
        let committed = repo.insert(new_record("backfilled", 5), 2).unwrap();

        // The backfilled record is older than both kept ones and goes straight out.
        assert_eq!(committed.evicted.len(), 1);
        assert_eq!(committed.evicted[0].id, committed.record.id);
        assert_eq!(committed.evicted[0].raw_reference, "uploads/backfilled");
        assert!(repo.get(committed.record.id).unwrap().is_none());
        assert_eq!(repo.list_desc(None).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_eviction_leaves_state_untouched() {
        let repo = MemoryRepo::new();
        repo.insert(new_record("a", 10), 1).unwrap();
        repo.set_fail_evictions(true);

        assert!(repo.insert(new_record("b", 20), 1).is_err());
        let names: Vec<String> = repo
            .list_desc(None)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a"]);

        repo.set_fail_evictions(false);
        assert_eq!(repo.insert(new_record("b", 20), 1).unwrap().record.id, 2);
    }
}
