//! StateStore — redb-backed persistence for simulated jobs and workers.
//!
//! Provides the operations the scheduler and execution lanes need: bulk
//! seeding of pending jobs, point lookup and update by id, the pending-job
//! scan, and the first-idle-worker query. The store supports both on-disk
//! and in-memory backends (the latter for testing and for runs without a
//! data directory).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(JOBS).map_err(map_err!(Table))?;
        txn.open_table(WORKERS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Jobs ───────────────────────────────────────────────────────

    /// Insert `count` pending jobs in one transaction.
    ///
    /// Ids continue from the stored sequence, so repeated seeding never
    /// reuses an id. Returns the new ids in creation order.
    pub fn insert_pending_jobs(&self, count: u64, created_at: u64) -> StateResult<Vec<JobId>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let ids = {
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let first = meta
                .get(NEXT_JOB_ID)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(1);

            let mut jobs = txn.open_table(JOBS).map_err(map_err!(Table))?;
            let ids: Vec<JobId> = (first..first + count).collect();
            for &id in &ids {
                let value = serde_json::to_vec(&Job::pending(id, created_at))
                    .map_err(map_err!(Serialize))?;
                jobs.insert(id, value.as_slice()).map_err(map_err!(Write))?;
            }
            meta.insert(NEXT_JOB_ID, first + count)
                .map_err(map_err!(Write))?;
            ids
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count, "pending jobs inserted");
        Ok(ids)
    }

    /// Insert or update a job record.
    pub fn put_job(&self, job: &Job) -> StateResult<()> {
        let value = serde_json::to_vec(job).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            table
                .insert(job.id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a job by id.
    pub fn get_job(&self, id: JobId) -> StateResult<Option<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let job: Job =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// All jobs in creation order.
    pub fn list_jobs(&self) -> StateResult<Vec<Job>> {
        self.scan_jobs(|_| true)
    }

    /// Jobs still `pending`, in creation order.
    pub fn list_pending_jobs(&self) -> StateResult<Vec<Job>> {
        self.scan_jobs(|job| job.status == JobStatus::Pending)
    }

    pub fn count_jobs_with_status(&self, status: JobStatus) -> StateResult<usize> {
        Ok(self.scan_jobs(|job| job.status == status)?.len())
    }

    fn scan_jobs(&self, keep: impl Fn(&Job) -> bool) -> StateResult<Vec<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let job: Job =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&job) {
                results.push(job);
            }
        }
        Ok(results)
    }

    // ── Workers ────────────────────────────────────────────────────

    /// Insert or update a worker record.
    pub fn put_worker(&self, worker: &Worker) -> StateResult<()> {
        let value = serde_json::to_vec(worker).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            table
                .insert(worker.id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn get_worker(&self, id: WorkerId) -> StateResult<Option<Worker>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let worker: Worker =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(worker))
            }
            None => Ok(None),
        }
    }

    /// All workers ordered by ordinal.
    pub fn list_workers(&self) -> StateResult<Vec<Worker>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let worker: Worker =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(worker);
        }
        Ok(results)
    }

    /// Lowest-ordinal worker whose status is idle.
    pub fn first_idle_worker(&self) -> StateResult<Option<Worker>> {
        Ok(self
            .list_workers()?
            .into_iter()
            .find(|w| w.status == WorkerStatus::Idle))
    }

    pub fn count_workers(&self) -> StateResult<u32> {
        Ok(self.list_workers()?.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Job CRUD ───────────────────────────────────────────────────

    #[test]
    fn insert_pending_jobs_allocates_sequential_ids() {
        let store = StateStore::open_in_memory().unwrap();

        let ids = store.insert_pending_jobs(3, 1000).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);

        let more = store.insert_pending_jobs(2, 2000).unwrap();
        assert_eq!(more, vec![4, 5]);

        let all = store.list_jobs().unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[test]
    fn insert_zero_jobs_is_noop() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.insert_pending_jobs(0, 1000).unwrap().is_empty());
        assert!(store.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn job_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_pending_jobs(1, 1000).unwrap();

        let mut job = store.get_job(1).unwrap().unwrap();
        job.assigned_worker = Some(2);
        job.status = JobStatus::InProgress;
        job.started_at = Some(1500);
        store.put_job(&job).unwrap();

        assert_eq!(store.get_job(1).unwrap(), Some(job));
    }

    #[test]
    fn job_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_job(42).unwrap().is_none());
    }

    #[test]
    fn pending_scan_skips_started_jobs_and_keeps_order() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_pending_jobs(4, 1000).unwrap();

        let mut job = store.get_job(2).unwrap().unwrap();
        job.status = JobStatus::InProgress;
        store.put_job(&job).unwrap();

        let pending: Vec<JobId> = store
            .list_pending_jobs()
            .unwrap()
            .iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(pending, vec![1, 3, 4]);
        assert_eq!(store.count_jobs_with_status(JobStatus::InProgress).unwrap(), 1);
    }

    // ── Worker CRUD ────────────────────────────────────────────────

    #[test]
    fn worker_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let worker = Worker::idle(0, 1000);

        store.put_worker(&worker).unwrap();
        assert_eq!(store.get_worker(0).unwrap(), Some(worker));
        assert_eq!(store.count_workers().unwrap(), 1);
    }

    #[test]
    fn first_idle_worker_prefers_lowest_ordinal() {
        let store = StateStore::open_in_memory().unwrap();
        for id in 0..3 {
            store.put_worker(&Worker::idle(id, 1000)).unwrap();
        }

        let mut busy = store.get_worker(0).unwrap().unwrap();
        busy.status = WorkerStatus::Busy;
        busy.current_job = Some(1);
        store.put_worker(&busy).unwrap();

        let idle = store.first_idle_worker().unwrap().unwrap();
        assert_eq!(idle.id, 1);
    }

    #[test]
    fn first_idle_worker_none_when_all_busy() {
        let store = StateStore::open_in_memory().unwrap();
        let mut worker = Worker::idle(0, 1000);
        worker.status = WorkerStatus::Busy;
        store.put_worker(&worker).unwrap();

        assert!(store.first_idle_worker().unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.insert_pending_jobs(2, 1000).unwrap();
            store.put_worker(&Worker::idle(0, 1000)).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.list_pending_jobs().unwrap().len(), 2);
        assert_eq!(store.count_workers().unwrap(), 1);

        // The id sequence survives too.
        assert_eq!(store.insert_pending_jobs(1, 2000).unwrap(), vec![3]);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_jobs().unwrap().is_empty());
        assert!(store.list_pending_jobs().unwrap().is_empty());
        assert!(store.list_workers().unwrap().is_empty());
        assert!(store.first_idle_worker().unwrap().is_none());
        assert_eq!(store.count_workers().unwrap(), 0);
    }
}
