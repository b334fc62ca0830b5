//! Canonical in-memory job store with an owner index.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LockResult, Mutex, MutexGuard, RwLock};

use crate::broadcast::JobEvent;
use crate::job::Job;

fn recover<T>(result: LockResult<T>, what: &str) -> T {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job registry {} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

/// Storage slot for one job.
///
/// `state` guards the record itself. Events produced by a transition are
/// queued in `outbox` while `state` is held, so the queue order is the
/// mutation order. Whoever finds the outbox idle delivers the queue; callers
/// arriving while it is being delivered only enqueue, so no lock is held
/// while listeners run and a listener may call back into the same job.
pub(crate) struct JobEntry {
    state: Mutex<Job>,
    retired: AtomicBool,
    outbox: Mutex<Outbox>,
}

#[derive(Default)]
struct Outbox {
    pending: VecDeque<JobEvent>,
    draining: bool,
}

impl JobEntry {
    pub(crate) fn new(job: Job) -> Self {
        Self {
            state: Mutex::new(job),
            retired: AtomicBool::new(false),
            outbox: Mutex::new(Outbox::default()),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, Job> {
        recover(self.state.lock(), "entry")
    }

    pub(crate) fn snapshot(&self) -> Job {
        self.state().clone()
    }

    /// Marks the entry as removed from the registry. Call with `state` held.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Whether the entry was removed. Read with `state` held.
    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Queues `event` for delivery. Call with `state` held.
    pub(crate) fn enqueue(&self, event: JobEvent) {
        recover(self.outbox.lock(), "outbox").pending.push_back(event);
    }

    /// Delivers queued events in order, unless another caller is already
    /// doing so; that caller then also delivers what was queued here.
    pub(crate) fn drain<F>(&self, mut deliver: F)
    where
        F: FnMut(&JobEvent),
    {
        {
            let mut outbox = recover(self.outbox.lock(), "outbox");
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let event = {
                let mut outbox = recover(self.outbox.lock(), "outbox");
                match outbox.pending.pop_front() {
                    Some(event) => event,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            deliver(&event);
        }
    }
}

/// Owns every job record, keyed by id, plus an owner → ids lookup index.
///
/// The map locks are only held to find, insert or drop an entry; per-job
/// state has its own lock, so work on different jobs never serializes.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobEntry>>>,
    owners: RwLock<HashMap<String, HashSet<String>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces a job and indexes it under its owner.
    pub fn put(&self, job: Job) {
        self.insert(Arc::new(JobEntry::new(job)));
    }

    pub(crate) fn insert(&self, entry: Arc<JobEntry>) {
        let (id, owner) = {
            let job = entry.state();
            (job.id.clone(), job.owner_id.clone())
        };

        let mut jobs = recover(self.jobs.write(), "jobs");
        let previous = jobs.insert(id.clone(), entry);

        let mut owners = recover(self.owners.write(), "owner index");
        if let Some(previous) = previous {
            let previous_owner = previous.state().owner_id.clone();
            if previous_owner != owner {
                Self::unindex(&mut owners, &previous_owner, &id);
            }
        }
        owners.entry(owner).or_default().insert(id);
    }

    /// Snapshot of a job.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.entry(id).map(|entry| entry.snapshot())
    }

    pub fn contains(&self, id: &str) -> bool {
        recover(self.jobs.read(), "jobs").contains_key(id)
    }

    /// Removes a job and its owner-index entry. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) -> Option<Job> {
        self.take(id).map(|entry| entry.snapshot())
    }

    /// Detaches the entry for `id`. Only one caller ever gets a given entry.
    pub(crate) fn take(&self, id: &str) -> Option<Arc<JobEntry>> {
        let mut jobs = recover(self.jobs.write(), "jobs");
        let entry = jobs.remove(id)?;
        let owner = entry.state().owner_id.clone();

        let mut owners = recover(self.owners.write(), "owner index");
        Self::unindex(&mut owners, &owner, id);
        Some(entry)
    }

    /// All jobs of `owner_id`, in no particular order.
    pub fn list_by_owner(&self, owner_id: &str) -> Vec<Job> {
        let ids: Vec<String> = {
            let owners = recover(self.owners.read(), "owner index");
            match owners.get(owner_id) {
                Some(ids) => ids.iter().cloned().collect(),
                None => return Vec::new(),
            }
        };

        let entries: Vec<Arc<JobEntry>> = {
            let jobs = recover(self.jobs.read(), "jobs");
            ids.iter().filter_map(|id| jobs.get(id).cloned()).collect()
        };

        entries.iter().map(|entry| entry.snapshot()).collect()
    }

    /// Drops `id` from the owner's index without touching the job record.
    pub fn remove_from_owner_index(&self, owner_id: &str, id: &str) -> bool {
        let mut owners = recover(self.owners.write(), "owner index");
        Self::unindex(&mut owners, owner_id, id)
    }

    /// Snapshot of every job.
    pub fn snapshot_all(&self) -> Vec<Job> {
        let entries: Vec<Arc<JobEntry>> =
            recover(self.jobs.read(), "jobs").values().cloned().collect();
        entries.iter().map(|entry| entry.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        recover(self.jobs.read(), "jobs").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of owners with at least one indexed job.
    pub fn owner_count(&self) -> usize {
        recover(self.owners.read(), "owner index").len()
    }

    pub(crate) fn entry(&self, id: &str) -> Option<Arc<JobEntry>> {
        recover(self.jobs.read(), "jobs").get(id).cloned()
    }

    fn unindex(owners: &mut HashMap<String, HashSet<String>>, owner_id: &str, id: &str) -> bool {
        let Some(ids) = owners.get_mut(owner_id) else {
            return false;
        };
        let removed = ids.remove(id);
        if ids.is_empty() {
            owners.remove(owner_id);
        }
        removed
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
