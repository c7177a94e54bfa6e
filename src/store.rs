use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::models::NormalizedTable;

/// One published table. Immutable once built; readers hold it by `Arc`.
#[derive(Debug)]
pub struct Snapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub table: NormalizedTable,
}

/// Holds the process-wide table. `replace` swaps in a fully built snapshot,
/// so `get` sees either the old table or the new one, never a mix.
#[derive(Debug)]
pub struct TableStore {
    current: RwLock<Arc<Snapshot>>,
}

impl TableStore {
    pub fn new(table: NormalizedTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot {
                version: 1,
                loaded_at: Utc::now(),
                table,
            })),
        }
    }

    pub fn get(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Publishes `table` and returns its version.
    pub fn replace(&self, table: NormalizedTable) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let version = guard.version + 1;
        *guard = Arc::new(Snapshot {
            version,
            loaded_at: Utc::now(),
            table,
        });
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskRecord;
    use chrono::NaiveDate;

    fn table_of(len: usize) -> NormalizedTable {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows = (0..len)
            .map(|i| TaskRecord {
                task_id: format!("T{i}"),
                task_type: "Feature".to_string(),
                status: "Done".to_string(),
                resource: "Avery".to_string(),
                story_points: Some(1.0),
                estimated_hours: Some(1.0),
                actual_hours: Some(1.0),
                defects_reported: Some(0),
                rework_hours: Some(0.0),
                date: day,
                start_date: day,
                end_date: day,
                cycle_time: 0,
                sprint: 1,
            })
            .collect();
        NormalizedTable { rows }
    }

    #[test]
    fn replace_bumps_version_and_swaps_table() {
        let store = TableStore::new(table_of(1));
        assert_eq!(store.get().version, 1);

        let version = store.replace(table_of(3));
        assert_eq!(version, 2);
        assert_eq!(store.get().version, 2);
        assert_eq!(store.get().table.len(), 3);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_replace() {
        let store = TableStore::new(table_of(2));
        let before = store.get();
        store.replace(table_of(5));

        assert_eq!(before.version, 1);
        assert_eq!(before.table.len(), 2);
        assert_eq!(store.get().table.len(), 5);
    }

    #[test]
    fn concurrent_readers_see_whole_tables() {
        let store = Arc::new(TableStore::new(table_of(2)));
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for len in [4, 6, 8, 10] {
                    store.replace(table_of(len));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let snapshot = store.get();
                        let expected = snapshot.version as usize * 2;
                        assert_eq!(snapshot.table.len(), expected);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get().version, 5);
    }
}
