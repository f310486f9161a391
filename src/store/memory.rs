//! In-process [`Store`] backed by hash maps.
//!
//! Row locks are per-key `tokio` mutexes held by the transaction until it ends.
//! Writes are buffered in the transaction and applied to the shared tables in
//! one step at commit, so an abandoned transaction leaves nothing behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use academy_core::AppError;
use academy_models::{
    Batch, BatchId, Fee, FeeId, FeePayment, Level, LevelId, PaymentId, Student, StudentId,
    TestId, TestRecord,
};

use super::{Store, StoreTransaction};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Student(StudentId),
    Batch(BatchId),
    Test(TestId),
    Fee(FeeId),
    Payment(PaymentId),
}

#[derive(Default)]
struct Tables {
    students: HashMap<StudentId, Student>,
    batches: HashMap<BatchId, Batch>,
    levels: BTreeMap<LevelId, Level>,
    tests: HashMap<TestId, TestRecord>,
    fees: HashMap<FeeId, Fee>,
    payments: HashMap<PaymentId, FeePayment>,
}

enum Write {
    Student(Student),
    Batch(Batch),
    Level(Level),
    Test(TestRecord),
    Fee(Fee),
    Payment(FeePayment),
    RemoveBatch(BatchId),
}

impl Tables {
    fn apply(&mut self, write: Write) {
        match write {
            Write::Student(student) => {
                self.students.insert(student.id, student);
            }
            Write::Batch(batch) => {
                self.batches.insert(batch.id, batch);
            }
            Write::Level(level) => {
                self.levels.insert(level.id, level);
            }
            Write::Test(test) => {
                self.tests.insert(test.id(), test);
            }
            Write::Fee(fee) => {
                self.fees.insert(fee.id, fee);
            }
            Write::Payment(payment) => {
                self.payments.insert(payment.id, payment);
            }
            Write::RemoveBatch(id) => {
                self.batches.remove(&id);
            }
        }
    }
}

struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<AsyncMutex<()>>>>,
    lock_timeout: Duration,
    #[cfg(any(test, feature = "test-utils"))]
    failing_commits: std::sync::atomic::AtomicUsize,
}

impl Inner {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_locks(&self) -> MutexGuard<'_, HashMap<RowKey, Arc<AsyncMutex<()>>>> {
        self.row_locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, key: RowKey) -> Arc<AsyncMutex<()>> {
        self.row_locks().entry(key).or_default().clone()
    }

    /// Drops lock entries nobody holds or waits on.
    fn prune_row_locks(&self, keys: impl IntoIterator<Item = RowKey>) {
        let mut locks = self.row_locks();
        for key in keys {
            if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&key);
            }
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    fn injected_commit_failure(&self) -> Result<(), AppError> {
        use std::sync::atomic::Ordering;

        let failed = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AppError::internal(anyhow::anyhow!("injected commit failure")));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "test-utils")))]
    fn injected_commit_failure(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Thread-safe in-memory store; clones share the same tables.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// A store whose row lock waits give up with `Conflict` after `lock_timeout`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                lock_timeout,
                #[cfg(any(test, feature = "test-utils"))]
                failing_commits: std::sync::atomic::AtomicUsize::new(0),
            }),
        }
    }

    /// Makes the next `count` commits fail after all their reads and writes
    /// succeeded, discarding the buffered writes.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn fail_next_commits(&self, count: usize) {
        self.inner
            .failing_commits
            .store(count, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn student(&self, id: StudentId) -> Result<Option<Student>, AppError> {
        Ok(self.inner.tables().students.get(&id).cloned())
    }

    async fn batch(&self, id: BatchId) -> Result<Option<Batch>, AppError> {
        Ok(self.inner.tables().batches.get(&id).cloned())
    }

    async fn level(&self, id: LevelId) -> Result<Option<Level>, AppError> {
        Ok(self.inner.tables().levels.get(&id).cloned())
    }

    async fn fee(&self, id: FeeId) -> Result<Option<Fee>, AppError> {
        Ok(self.inner.tables().fees.get(&id).cloned())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<FeePayment>, AppError> {
        Ok(self.inner.tables().payments.get(&id).cloned())
    }

    async fn tests_for_student(
        &self,
        student_id: StudentId,
        level: LevelId,
    ) -> Result<Vec<TestRecord>, AppError> {
        let mut tests: Vec<TestRecord> = self
            .inner
            .tables()
            .tests
            .values()
            .filter(|t| t.student_id() == student_id && t.level() == level)
            .cloned()
            .collect();
        tests.sort_by_key(|t| (t.date(), t.id()));
        Ok(tests)
    }

    async fn payments_for_fee(&self, fee_id: FeeId) -> Result<Vec<FeePayment>, AppError> {
        let mut payments: Vec<FeePayment> = self
            .inner
            .tables()
            .payments
            .values()
            .filter(|p| p.fee_id == fee_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.submitted_at, p.id));
        Ok(payments)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError> {
        Ok(Box::new(InMemoryTransaction {
            inner: Arc::clone(&self.inner),
            held: HashMap::new(),
            writes: Vec::new(),
        }))
    }
}

pub struct InMemoryTransaction {
    inner: Arc<Inner>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    writes: Vec<Write>,
}

impl InMemoryTransaction {
    async fn lock(&mut self, key: RowKey) -> Result<(), AppError> {
        if self.held.contains_key(&key) {
            return Ok(());
        }

        let mutex = self.inner.row_lock(key);
        let guard = tokio::time::timeout(self.inner.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| AppError::conflict(format!("timed out waiting for row lock {:?}", key)))?;
        self.held.insert(key, guard);
        Ok(())
    }

    fn release_locks(&mut self) {
        let keys: Vec<RowKey> = self.held.keys().copied().collect();
        self.held.clear();
        self.inner.prune_row_locks(keys);
    }

    /// Latest buffered write for a row: `Some(None)` when buffered as deleted.
    fn pending<T>(&self, pick: impl Fn(&Write) -> Option<Option<T>>) -> Option<Option<T>> {
        self.writes.iter().rev().find_map(pick)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn student_for_update(&mut self, id: StudentId) -> Result<Option<Student>, AppError> {
        self.lock(RowKey::Student(id)).await?;
        if let Some(found) = self.pending(|w| match w {
            Write::Student(s) if s.id == id => Some(Some(s.clone())),
            _ => None,
        }) {
            return Ok(found);
        }
        Ok(self.inner.tables().students.get(&id).cloned())
    }

    async fn batch_for_update(&mut self, id: BatchId) -> Result<Option<Batch>, AppError> {
        self.lock(RowKey::Batch(id)).await?;
        if let Some(found) = self.pending(|w| match w {
            Write::Batch(b) if b.id == id => Some(Some(b.clone())),
            Write::RemoveBatch(removed) if *removed == id => Some(None),
            _ => None,
        }) {
            return Ok(found);
        }
        Ok(self.inner.tables().batches.get(&id).cloned())
    }

    async fn test_for_update(&mut self, id: TestId) -> Result<Option<TestRecord>, AppError> {
        self.lock(RowKey::Test(id)).await?;
        if let Some(found) = self.pending(|w| match w {
            Write::Test(t) if t.id() == id => Some(Some(t.clone())),
            _ => None,
        }) {
            return Ok(found);
        }
        Ok(self.inner.tables().tests.get(&id).cloned())
    }

    async fn fee_for_update(&mut self, id: FeeId) -> Result<Option<Fee>, AppError> {
        self.lock(RowKey::Fee(id)).await?;
        if let Some(found) = self.pending(|w| match w {
            Write::Fee(f) if f.id == id => Some(Some(f.clone())),
            _ => None,
        }) {
            return Ok(found);
        }
        Ok(self.inner.tables().fees.get(&id).cloned())
    }

    async fn payment_for_update(&mut self, id: PaymentId) -> Result<Option<FeePayment>, AppError> {
        self.lock(RowKey::Payment(id)).await?;
        if let Some(found) = self.pending(|w| match w {
            Write::Payment(p) if p.id == id => Some(Some(p.clone())),
            _ => None,
        }) {
            return Ok(found);
        }
        Ok(self.inner.tables().payments.get(&id).cloned())
    }

    async fn batch_has_tests(&mut self, batch_id: BatchId) -> Result<bool, AppError> {
        let buffered = self
            .writes
            .iter()
            .any(|w| matches!(w, Write::Test(t) if t.batch_id() == batch_id));
        if buffered {
            return Ok(true);
        }
        Ok(self
            .inner
            .tables()
            .tests
            .values()
            .any(|t| t.batch_id() == batch_id))
    }

    async fn save_student(&mut self, student: &Student) -> Result<(), AppError> {
        self.writes.push(Write::Student(student.clone()));
        Ok(())
    }

    async fn save_batch(&mut self, batch: &Batch) -> Result<(), AppError> {
        self.writes.push(Write::Batch(batch.clone()));
        Ok(())
    }

    async fn save_level(&mut self, level: &Level) -> Result<(), AppError> {
        self.writes.push(Write::Level(level.clone()));
        Ok(())
    }

    async fn save_test(&mut self, test: &TestRecord) -> Result<(), AppError> {
        self.writes.push(Write::Test(test.clone()));
        Ok(())
    }

    async fn save_fee(&mut self, fee: &Fee) -> Result<(), AppError> {
        self.writes.push(Write::Fee(fee.clone()));
        Ok(())
    }

    async fn save_payment(&mut self, payment: &FeePayment) -> Result<(), AppError> {
        self.writes.push(Write::Payment(payment.clone()));
        Ok(())
    }

    async fn remove_batch(&mut self, id: BatchId) -> Result<(), AppError> {
        self.writes.push(Write::RemoveBatch(id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let mut this = self;
        this.inner.injected_commit_failure()?;

        let writes = std::mem::take(&mut this.writes);
        let mut tables = this.inner.tables();
        for write in writes {
            tables.apply(write);
        }
        drop(tables);
        // row locks are released only after the writes are visible
        this.release_locks();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        let mut this = self;
        this.writes.clear();
        this.release_locks();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}
