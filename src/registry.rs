//! Per-owner job bookkeeping with a hard concurrency bound.
//!
//! [`JobRegistry`] is the only structure shared between concurrently running
//! jobs. Admission and retirement each take a single short lock, so the
//! per-owner count is linearizable: no owner ever observes more than
//! `limit` tracked jobs, even transiently.

use crate::error::{Error, Result};
use crate::types::{JobId, OwnerId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Tracks the running jobs of every owner and enforces the per-owner bound
///
/// Cloning is cheap; clones share the same bookkeeping.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    limit: usize,
    owners: Mutex<HashMap<OwnerId, HashSet<JobId>>>,
    next_id: AtomicU64,
}

impl JobRegistry {
    /// Create a registry allowing at most `limit` concurrent jobs per owner
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                limit,
                owners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// The per-owner concurrency bound
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Atomically admit a new job for `owner`
    ///
    /// The count check and the insertion happen under one lock, so two
    /// concurrent admissions can never both take the last free slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdmissionRejected`] when the owner is already at the
    /// bound. Rejection has no side effects.
    pub fn try_admit(&self, owner: OwnerId) -> Result<JobSlot> {
        let id = {
            let mut owners = self.lock();
            let jobs = owners.entry(owner).or_default();
            if jobs.len() >= self.inner.limit {
                if jobs.is_empty() {
                    // limit == 0: never leave an empty entry behind
                    owners.remove(&owner);
                }
                return Err(Error::AdmissionRejected {
                    owner,
                    limit: self.inner.limit,
                });
            }
            let id = JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
            jobs.insert(id);
            id
        };

        tracing::debug!(owner = owner.0, job_id = id.0, "job admitted");

        Ok(JobSlot {
            registry: self.clone(),
            owner,
            id,
            retired: false,
        })
    }

    /// Remove a job from its owner's set
    ///
    /// Idempotent: returns `true` only for the call that actually removed the
    /// job. The owner entry is deleted once its set is empty.
    pub fn retire(&self, owner: OwnerId, id: JobId) -> bool {
        let mut owners = self.lock();
        let Some(jobs) = owners.get_mut(&owner) else {
            return false;
        };
        let removed = jobs.remove(&id);
        if jobs.is_empty() {
            owners.remove(&owner);
        }
        drop(owners);

        if removed {
            tracing::debug!(owner = owner.0, job_id = id.0, "job retired");
        }
        removed
    }

    /// Number of jobs currently tracked for `owner`
    pub fn active_count(&self, owner: OwnerId) -> usize {
        self.lock().get(&owner).map_or(0, HashSet::len)
    }

    /// Whether `id` is currently tracked for `owner`
    pub fn is_active(&self, owner: OwnerId, id: JobId) -> bool {
        self.lock().get(&owner).is_some_and(|jobs| jobs.contains(&id))
    }

    /// Number of jobs currently tracked across all owners
    pub fn total_active(&self) -> usize {
        self.lock().values().map(HashSet::len).sum()
    }

    /// Number of owners that currently have an entry
    pub fn tracked_owners(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OwnerId, HashSet<JobId>>> {
        // The map is always left consistent, so a poisoned lock is still usable
        self.inner
            .owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("limit", &self.inner.limit)
            .field("total_active", &self.total_active())
            .finish()
    }
}

/// A registry slot held by one admitted job
///
/// The slot retires its job exactly once: either through [`JobSlot::release`]
/// or, if the holder returns early or panics, when it is dropped.
#[must_use = "dropping the slot retires the job immediately"]
pub struct JobSlot {
    registry: JobRegistry,
    owner: OwnerId,
    id: JobId,
    retired: bool,
}

impl JobSlot {
    /// The admitted job's id
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The owner the slot counts against
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Retire the job now
    ///
    /// Returns whether this call removed the job (false if someone already
    /// retired it through [`JobRegistry::retire`]).
    pub fn release(mut self) -> bool {
        self.retired = true;
        self.registry.retire(self.owner, self.id)
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        if self.retired {
            return;
        }
        self.retired = true;
        if self.registry.retire(self.owner, self.id) {
            tracing::warn!(
                owner = self.owner.0,
                job_id = self.id.0,
                "job slot dropped without explicit release"
            );
        }
    }
}

impl std::fmt::Debug for JobSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSlot")
            .field("owner", &self.owner)
            .field("id", &self.id)
            .field("retired", &self.retired)
            .finish()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    const U1: OwnerId = OwnerId(1);
    const U2: OwnerId = OwnerId(2);

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let registry = JobRegistry::new(3);

        let slots: Vec<_> = (0..3).map(|_| registry.try_admit(U1).unwrap()).collect();
        assert_eq!(registry.active_count(U1), 3);

        match registry.try_admit(U1) {
            Err(Error::AdmissionRejected { owner, limit }) => {
                assert_eq!(owner, U1);
                assert_eq!(limit, 3);
            }
            other => panic!("expected AdmissionRejected, got: {:?}", other),
        }
        assert_eq!(
            registry.active_count(U1),
            3,
            "rejection must not change the count"
        );

        drop(slots);
    }

    #[test]
    fn bound_is_per_owner() {
        let registry = JobRegistry::new(1);

        let _a = registry.try_admit(U1).unwrap();
        let _b = registry.try_admit(U2).unwrap();

        assert!(registry.try_admit(U1).is_err());
        assert!(registry.try_admit(U2).is_err());
        assert_eq!(registry.total_active(), 2);
        assert_eq!(registry.tracked_owners(), 2);
    }

    #[test]
    fn retire_frees_a_slot_for_the_next_admission() {
        let registry = JobRegistry::new(3);
        let mut slots: Vec<_> = (0..3).map(|_| registry.try_admit(U1).unwrap()).collect();
        assert!(registry.try_admit(U1).is_err());

        assert!(slots.pop().unwrap().release());

        let fourth = registry.try_admit(U1).unwrap();
        assert_eq!(registry.active_count(U1), 3);
        assert!(registry.is_active(U1, fourth.id()));
    }

    #[test]
    fn retire_is_idempotent() {
        let registry = JobRegistry::new(3);
        let keep = registry.try_admit(U1).unwrap();
        let slot = registry.try_admit(U1).unwrap();
        let id = slot.id();

        assert!(registry.retire(U1, id));
        assert!(!registry.retire(U1, id), "second retire must be a no-op");
        assert!(!slot.release(), "slot release after manual retire is a no-op");

        assert_eq!(registry.active_count(U1), 1);
        assert!(registry.is_active(U1, keep.id()));
    }

    #[test]
    fn empty_owner_entry_is_removed() {
        let registry = JobRegistry::new(3);
        let slot = registry.try_admit(U1).unwrap();
        assert_eq!(registry.tracked_owners(), 1);

        slot.release();

        assert_eq!(registry.active_count(U1), 0);
        assert_eq!(registry.tracked_owners(), 0, "owner entry must be deleted");
    }

    #[test]
    fn retire_for_unknown_owner_is_noop() {
        let registry = JobRegistry::new(3);
        assert!(!registry.retire(U2, JobId(99)));
        assert_eq!(registry.tracked_owners(), 0);
    }

    #[test]
    fn dropping_slot_retires_job() {
        let registry = JobRegistry::new(3);
        {
            let _slot = registry.try_admit(U1).unwrap();
            assert_eq!(registry.active_count(U1), 1);
        }
        assert_eq!(registry.active_count(U1), 0);
        assert_eq!(registry.tracked_owners(), 0);
    }

    #[test]
    fn slot_retires_on_panic_unwind() {
        let registry = JobRegistry::new(3);
        let cloned = registry.clone();

        let result = std::thread::spawn(move || {
            let _slot = cloned.try_admit(U1).unwrap();
            panic!("job panicked");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(registry.active_count(U1), 0);
    }

    #[test]
    fn job_ids_are_unique() {
        let registry = JobRegistry::new(10);
        let a = registry.try_admit(U1).unwrap();
        let b = registry.try_admit(U1).unwrap();
        let c = registry.try_admit(U2).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn zero_limit_rejects_without_leaving_entry() {
        let registry = JobRegistry::new(0);
        assert!(registry.try_admit(U1).is_err());
        assert_eq!(registry.tracked_owners(), 0);
    }

    #[test]
    fn concurrent_admissions_never_exceed_bound() {
        const THREADS: usize = 32;
        let registry = JobRegistry::new(3);
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.try_admit(U1).ok()
                })
            })
            .collect();

        let admitted: Vec<JobSlot> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(admitted.len(), 3, "exactly `limit` admissions may succeed");
        assert_eq!(registry.active_count(U1), 3);
    }

    #[test]
    fn concurrent_admit_and_retire_keep_count_bounded() {
        const ROUNDS: usize = 200;
        let registry = JobRegistry::new(3);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        if let Ok(slot) = registry.try_admit(U1) {
                            assert!(registry.active_count(U1) <= 3);
                            slot.release();
                        }
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(registry.active_count(U1), 0);
        assert_eq!(registry.tracked_owners(), 0);
    }
}
