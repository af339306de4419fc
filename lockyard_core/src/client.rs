use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{self, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::LockError;
use crate::lock::{ExclusiveLock, LockEntry, SharedLock};
use crate::manager::ManagerInner;
use crate::table::ResourceType;
use crate::tracer::LockTracer;
use crate::waitset::WaitSet;

// Contention iterations an exclusive acquirer sits out before trying to
// upgrade a shared lock, so upgraders cannot starve readers.
const UPGRADE_GRACE_TRIES: u64 = 50;

// Count maps at most this large are cleared in place on close; larger ones
// are reallocated so pooled clients cannot accumulate giant tables.
const SMALL_COUNT_MAP: usize = 32;

const STOPPED: u32 = 1 << 31;

// Stopped bit plus the number of operations currently inside the client.
pub(crate) struct ClientStateHolder {
    state: AtomicU32,
}

impl ClientStateHolder {
    fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    pub(crate) fn enter(&self) -> bool {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & STOPPED != 0 {
                return false;
            }
            match self.state.compare_exchange(
                state,
                state + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => state = observed,
            }
        }
    }

    pub(crate) fn leave(&self) {
        self.state.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn stop(&self) {
        self.state.fetch_or(STOPPED, Ordering::AcqRel);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) & STOPPED != 0
    }

    pub(crate) fn has_active(&self) -> bool {
        self.state.load(Ordering::Acquire) & !STOPPED != 0
    }

    pub(crate) fn reset(&self) {
        self.state.store(0, Ordering::Release);
    }
}

struct ActivityGuard {
    handle: Arc<ClientHandle>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.handle.state.leave();
    }
}

// The cross-thread-readable slice of a client: its id, the wait-list bitset
// peers read during deadlock detection, and the stop/active state machine.
pub struct ClientHandle {
    id: u32,
    session_seq: AtomicU64,
    wait_list: WaitSet,
    state: ClientStateHolder,
}

impl ClientHandle {
    pub(crate) fn new(id: u32, wait_capacity: usize) -> Self {
        Self {
            id,
            session_seq: AtomicU64::new(0),
            wait_list: WaitSet::with_capacity(wait_capacity),
            state: ClientStateHolder::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    // Ids are pooled; the checkout sequence is what "younger" means to
    // deadlock resolution.
    pub fn session_seq(&self) -> u64 {
        self.session_seq.load(Ordering::Acquire)
    }

    pub(crate) fn begin_session(&self, session_seq: u64) {
        self.session_seq.store(session_seq, Ordering::Release);
        self.state.reset();
    }

    pub fn is_waiting_for(&self, client_id: u32) -> bool {
        client_id != self.id && self.wait_list.contains(client_id)
    }

    pub fn copy_wait_list_to(&self, target: &WaitSet) {
        target.union_from(&self.wait_list);
    }

    pub fn wait_list_size(&self) -> usize {
        self.wait_list.size()
    }

    pub fn describe_wait_list(&self) -> String {
        let ids: Vec<String> = self
            .wait_list
            .client_ids()
            .into_iter()
            .filter(|id| *id != self.id)
            .map(|id| id.to_string())
            .collect();
        format!("Client[{}] waits for [{}]", self.id, ids.join(","))
    }

    // Waiters wake when their next validity check fails. Cancelling a stop
    // is not a thing; we just keep polling.
    pub fn stop(&self) {
        self.state.stop();
        while self.state.has_active() {
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    pub(crate) fn wait_list(&self) -> &WaitSet {
        &self.wait_list
    }

    pub(crate) fn clear_wait_list(&self) {
        self.wait_list.clear();
        self.wait_list.put(self.id);
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client[{}]", self.id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "SHARED"),
            LockMode::Exclusive => write!(f, "EXCLUSIVE"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveLock {
    pub resource_type: ResourceType,
    pub resource_id: u64,
    pub mode: LockMode,
}

// Local counters track how many times each lock is held, so the client only
// talks to the global table when a count appears or disappears. Lock
// operations take &mut self: a client is single-threaded with respect to
// itself, and the one cross-thread entry point is stop, via the handle.
pub struct LockClient {
    manager: Arc<ManagerInner>,
    handle: Arc<ClientHandle>,
    my_exclusive: Arc<ExclusiveLock>,
    shared_counts: Vec<HashMap<u64, u32>>,
    exclusive_counts: Vec<HashMap<u64, u32>>,
    has_locks: bool,
    closed: bool,
}

impl LockClient {
    pub(crate) fn new(
        manager: Arc<ManagerInner>,
        handle: Arc<ClientHandle>,
        shared_counts: Vec<HashMap<u64, u32>>,
        exclusive_counts: Vec<HashMap<u64, u32>>,
    ) -> Self {
        let my_exclusive = Arc::new(ExclusiveLock::new(Arc::clone(&handle)));
        Self {
            manager,
            handle,
            my_exclusive,
            shared_counts,
            exclusive_counts,
            has_locks: false,
            closed: false,
        }
    }

    pub fn acquire_shared<Tr: LockTracer>(
        &mut self,
        tracer: &Tr,
        resource_type: ResourceType,
        resource_ids: &[u64],
    ) -> Result<(), LockError> {
        self.has_locks = true;
        let _activity = self.enter_active()?;
        let type_id = self.check_type(resource_type)?;
        let client_id = self.handle.id();

        for &resource_id in resource_ids {
            if let Some(count) = self.shared_counts[type_id].get_mut(&resource_id) {
                *count = bumped(*count, client_id, type_id, resource_id)?;
                continue;
            }

            if self.exclusive_counts[type_id].contains_key(&resource_id) {
                // Holding exclusive already: bumping the share count arms the
                // downgrade that happens when the exclusive is released.
                self.shared_counts[type_id].insert(resource_id, 1);
                continue;
            }

            let mut tries: u64 = 0;
            let mut my_shared: Option<Arc<SharedLock>> = None;
            let wait_start = Instant::now();
            let mut wait_event: Option<Tr::Event> = None;

            loop {
                self.assert_valid(wait_start, resource_type, resource_id)?;

                let existing = match self.manager.table.get(type_id, resource_id) {
                    None => {
                        let candidate = my_shared
                            .get_or_insert_with(|| Arc::new(SharedLock::new(&self.handle)))
                            .clone();
                        match self.manager.table.put_if_absent(
                            type_id,
                            resource_id,
                            LockEntry::Shared(candidate),
                        ) {
                            None => break,
                            // Lost the install race; retry without backing off.
                            Some(_) => continue,
                        }
                    }
                    Some(existing) => existing,
                };

                if let LockEntry::Shared(shared) = &existing {
                    if shared.acquire(&self.handle) {
                        break;
                    }
                    // The lock died under us or an upgrade is pending; wait.
                }

                if wait_event.is_none() {
                    wait_event = Some(tracer.wait_for_lock(false, resource_type, resource_id));
                }
                self.apply_wait_strategy(type_id, tries);
                tries += 1;
                self.mark_as_waiting_for(&existing, resource_type, resource_id)?;
            }

            drop(wait_event);
            self.clear_wait_list();
            self.shared_counts[type_id].insert(resource_id, 1);
        }
        Ok(())
    }

    pub fn acquire_exclusive<Tr: LockTracer>(
        &mut self,
        tracer: &Tr,
        resource_type: ResourceType,
        resource_ids: &[u64],
    ) -> Result<(), LockError> {
        self.has_locks = true;
        let _activity = self.enter_active()?;
        let type_id = self.check_type(resource_type)?;
        let client_id = self.handle.id();

        for &resource_id in resource_ids {
            if let Some(count) = self.exclusive_counts[type_id].get_mut(&resource_id) {
                *count = bumped(*count, client_id, type_id, resource_id)?;
                continue;
            }

            let mut tries: u64 = 0;
            let wait_start = Instant::now();
            let mut wait_event: Option<Tr::Event> = None;

            loop {
                let existing = match self.manager.table.put_if_absent(
                    type_id,
                    resource_id,
                    LockEntry::Exclusive(Arc::clone(&self.my_exclusive)),
                ) {
                    None => break,
                    Some(existing) => existing,
                };
                self.assert_valid(wait_start, resource_type, resource_id)?;

                if tries > UPGRADE_GRACE_TRIES {
                    if let LockEntry::Shared(shared) = &existing {
                        if self.try_upgrade_shared_to_exclusive(
                            tracer,
                            wait_event.is_some(),
                            resource_type,
                            resource_id,
                            shared,
                            wait_start,
                        )? {
                            break;
                        }
                    }
                }

                if wait_event.is_none() {
                    wait_event = Some(tracer.wait_for_lock(true, resource_type, resource_id));
                }
                self.apply_wait_strategy(type_id, tries);
                tries += 1;
                self.mark_as_waiting_for(&existing, resource_type, resource_id)?;
            }

            drop(wait_event);
            self.clear_wait_list();
            self.exclusive_counts[type_id].insert(resource_id, 1);
        }
        Ok(())
    }

    pub fn try_shared(
        &mut self,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> Result<bool, LockError> {
        self.has_locks = true;
        let _activity = self.enter_active()?;
        let type_id = self.check_type(resource_type)?;
        let client_id = self.handle.id();

        if let Some(count) = self.shared_counts[type_id].get_mut(&resource_id) {
            *count = bumped(*count, client_id, type_id, resource_id)?;
            return Ok(true);
        }
        if self.exclusive_counts[type_id].contains_key(&resource_id) {
            self.shared_counts[type_id].insert(resource_id, 1);
            return Ok(true);
        }

        let wait_start = Instant::now();
        loop {
            self.assert_valid(wait_start, resource_type, resource_id)?;
            match self.manager.table.get(type_id, resource_id) {
                None => {
                    let fresh = LockEntry::Shared(Arc::new(SharedLock::new(&self.handle)));
                    if self
                        .manager
                        .table
                        .put_if_absent(type_id, resource_id, fresh)
                        .is_none()
                    {
                        break;
                    }
                }
                Some(LockEntry::Shared(shared)) => {
                    // A dying lock mid-removal is a retryable race, even for
                    // a try-lock call.
                    if shared.acquire(&self.handle) {
                        break;
                    }
                    if shared.is_update_lock() {
                        return Ok(false);
                    }
                }
                Some(LockEntry::Exclusive(_)) => return Ok(false),
            }
        }
        self.shared_counts[type_id].insert(resource_id, 1);
        Ok(true)
    }

    pub fn try_exclusive(
        &mut self,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> Result<bool, LockError> {
        self.has_locks = true;
        let _activity = self.enter_active()?;
        let type_id = self.check_type(resource_type)?;
        let client_id = self.handle.id();

        if let Some(count) = self.exclusive_counts[type_id].get_mut(&resource_id) {
            *count = bumped(*count, client_id, type_id, resource_id)?;
            return Ok(true);
        }

        match self.manager.table.put_if_absent(
            type_id,
            resource_id,
            LockEntry::Exclusive(Arc::clone(&self.my_exclusive)),
        ) {
            None => {
                self.exclusive_counts[type_id].insert(resource_id, 1);
                Ok(true)
            }
            Some(LockEntry::Shared(shared))
                if self.shared_counts[type_id].contains_key(&resource_id) =>
            {
                if shared.try_acquire_update_lock(client_id) {
                    if shared.number_of_holders() == 1 {
                        // Sole holder: the entry stays shared, with the
                        // update reservation enforcing exclusivity.
                        self.exclusive_counts[type_id].insert(resource_id, 1);
                        Ok(true)
                    } else {
                        shared.release_update_lock();
                        Ok(false)
                    }
                } else {
                    Ok(false)
                }
            }
            Some(_) => Ok(false),
        }
    }

    pub fn release_shared(
        &mut self,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> Result<(), LockError> {
        let _activity = self.enter_active()?;
        let type_id = self.check_type(resource_type)?;

        if self.release_local(type_id, resource_id, LockMode::Shared)? {
            return Ok(());
        }

        // Keep the global lock while an exclusive hold remains; releasing
        // that will downgrade in place.
        if !self.exclusive_counts[type_id].contains_key(&resource_id) {
            self.release_global(type_id, resource_id)?;
        }
        Ok(())
    }

    pub fn release_exclusive(
        &mut self,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> Result<(), LockError> {
        let _activity = self.enter_active()?;
        let type_id = self.check_type(resource_type)?;
        let client_id = self.handle.id();

        if self.release_local(type_id, resource_id, LockMode::Exclusive)? {
            return Ok(());
        }

        if self.shared_counts[type_id].contains_key(&resource_id) {
            match self.manager.table.get(type_id, resource_id) {
                Some(LockEntry::Shared(shared)) => {
                    // Upgraded in place: drop the reservation, keep the share.
                    if shared.is_update_lock() {
                        shared.release_update_lock();
                    } else {
                        return Err(LockError::SharedLockNotUpgraded {
                            client_id,
                            type_id,
                            resource_id,
                        });
                    }
                }
                _ => {
                    // Swap our exclusive entry for a fresh shared one without
                    // ever leaving the slot empty, so no other exclusive can
                    // slip in between.
                    let downgraded = LockEntry::Shared(Arc::new(SharedLock::new(&self.handle)));
                    self.manager.table.replace(type_id, resource_id, downgraded);
                }
            }
        } else {
            self.release_global(type_id, resource_id)?;
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn close(mut self) -> Result<(), LockError> {
        self.close_internal()
    }

    pub fn lock_session_id(&self) -> u32 {
        self.handle.id()
    }

    pub fn handle(&self) -> &Arc<ClientHandle> {
        &self.handle
    }

    pub fn active_locks(&self) -> Vec<ActiveLock> {
        let mut locks = Vec::with_capacity(self.lock_count());
        collect_active_locks(&self.exclusive_counts, LockMode::Exclusive, &mut locks);
        collect_active_locks(&self.shared_counts, LockMode::Shared, &mut locks);
        locks
    }

    pub fn lock_count(&self) -> usize {
        self.shared_counts.iter().map(HashMap::len).sum::<usize>()
            + self.exclusive_counts.iter().map(HashMap::len).sum::<usize>()
    }

    pub fn wait_list_size(&self) -> usize {
        self.handle.wait_list_size()
    }

    pub fn is_waiting_for(&self, client_id: u32) -> bool {
        self.handle.is_waiting_for(client_id)
    }

    pub fn copy_wait_list_to(&self, target: &WaitSet) {
        self.handle.copy_wait_list_to(target);
    }

    pub fn describe_wait_list(&self) -> String {
        self.handle.describe_wait_list()
    }

    fn close_internal(&mut self) -> Result<(), LockError> {
        if self.closed {
            return Ok(());
        }
        self.handle.stop();

        let mut result = Ok(());
        if self.has_locks {
            result = self.release_all_locks();
            self.clear_wait_list();
            self.has_locks = false;
        }
        self.closed = true;

        let shared_counts = std::mem::take(&mut self.shared_counts);
        let exclusive_counts = std::mem::take(&mut self.exclusive_counts);
        let pooled = self.manager.release_client(
            Arc::clone(&self.handle),
            shared_counts,
            exclusive_counts,
        );
        result.and(pooled)
    }

    // Exclusive holds go first so an armed downgrade share on the same
    // resource is thrown away instead of being re-instated. A failed release
    // does not stop the sweep.
    fn release_all_locks(&mut self) -> Result<(), LockError> {
        let mut result = Ok(());
        for type_id in 0..self.exclusive_counts.len() {
            let ids: Vec<u64> = self.exclusive_counts[type_id].keys().copied().collect();
            for resource_id in ids {
                if let Err(err) = self.release_global(type_id, resource_id) {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
                self.shared_counts[type_id].remove(&resource_id);
            }
            clear_counts(&mut self.exclusive_counts[type_id]);

            let ids: Vec<u64> = self.shared_counts[type_id].keys().copied().collect();
            for resource_id in ids {
                if let Err(err) = self.release_global(type_id, resource_id) {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
            clear_counts(&mut self.shared_counts[type_id]);
        }
        result
    }

    // True while local holds remain.
    fn release_local(
        &mut self,
        type_id: usize,
        resource_id: u64,
        mode: LockMode,
    ) -> Result<bool, LockError> {
        let client_id = self.handle.id();
        let counts = match mode {
            LockMode::Shared => &mut self.shared_counts[type_id],
            LockMode::Exclusive => &mut self.exclusive_counts[type_id],
        };
        let count = counts.remove(&resource_id).ok_or(LockError::NotHeld {
            client_id,
            type_id,
            resource_id,
        })?;
        if count > 1 {
            counts.insert(resource_id, count - 1);
            return Ok(true);
        }
        Ok(false)
    }

    fn release_global(&self, type_id: usize, resource_id: u64) -> Result<(), LockError> {
        match self.manager.table.get(type_id, resource_id) {
            Some(LockEntry::Exclusive(_)) => {
                self.manager.table.remove(type_id, resource_id);
            }
            Some(LockEntry::Shared(shared)) => match shared.release(self.handle.id()) {
                Some(true) => {
                    // Last holder out: clear any leftover reservation and
                    // pull the dead lock.
                    shared.clean_update_holder();
                    self.manager.table.remove(type_id, resource_id);
                }
                Some(false) => {}
                None => {
                    return Err(LockError::NotHeld {
                        client_id: self.handle.id(),
                        type_id,
                        resource_id,
                    });
                }
            },
            None => {}
        }
        Ok(())
    }

    fn try_upgrade_shared_to_exclusive<Tr: LockTracer>(
        &self,
        tracer: &Tr,
        has_prior_event: bool,
        resource_type: ResourceType,
        resource_id: u64,
        shared: &Arc<SharedLock>,
        wait_start: Instant,
    ) -> Result<bool, LockError> {
        let type_id = resource_type.type_id();
        if self.shared_counts[type_id].contains_key(&resource_id) {
            return self.try_upgrade_with_share_held(
                tracer,
                has_prior_event,
                resource_type,
                resource_id,
                shared,
                wait_start,
            );
        }

        if !shared.acquire(&self.handle) {
            return Ok(false);
        }
        match self.try_upgrade_with_share_held(
            tracer,
            has_prior_event,
            resource_type,
            resource_id,
            shared,
            wait_start,
        ) {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.release_global(type_id, resource_id)?;
                Ok(false)
            }
            Err(err) => {
                // Give back the share grabbed only for this attempt; the
                // original error wins over any release failure.
                let _ = self.release_global(type_id, resource_id);
                Err(err)
            }
        }
    }

    fn try_upgrade_with_share_held<Tr: LockTracer>(
        &self,
        tracer: &Tr,
        has_prior_event: bool,
        resource_type: ResourceType,
        resource_id: u64,
        shared: &Arc<SharedLock>,
        wait_start: Instant,
    ) -> Result<bool, LockError> {
        if !shared.try_acquire_update_lock(self.handle.id()) {
            return Ok(false);
        }

        let mut wait_event: Option<Tr::Event> = None;
        match self.wait_for_sole_holder(
            tracer,
            has_prior_event,
            &mut wait_event,
            resource_type,
            resource_id,
            shared,
            wait_start,
        ) {
            Ok(()) => Ok(true),
            Err(err @ LockError::Deadlock { .. }) => {
                // The detector cleared the wait list before raising; leave
                // it that way.
                shared.release_update_lock();
                Err(err)
            }
            Err(err) => {
                shared.release_update_lock();
                self.clear_wait_list();
                Err(err)
            }
        }
    }

    fn wait_for_sole_holder<Tr: LockTracer>(
        &self,
        tracer: &Tr,
        has_prior_event: bool,
        wait_event: &mut Option<Tr::Event>,
        resource_type: ResourceType,
        resource_id: u64,
        shared: &Arc<SharedLock>,
        wait_start: Instant,
    ) -> Result<(), LockError> {
        let type_id = resource_type.type_id();
        let entry = LockEntry::Shared(Arc::clone(shared));
        // The grace counter of the enclosing acquire does not carry over;
        // this wait starts from a cold backoff.
        let mut tries: u64 = 0;
        while shared.number_of_holders() > 1 {
            self.assert_valid(wait_start, resource_type, resource_id)?;
            if wait_event.is_none() && !has_prior_event {
                *wait_event = Some(tracer.wait_for_lock(true, resource_type, resource_id));
            }
            self.apply_wait_strategy(type_id, tries);
            tries += 1;
            self.mark_as_waiting_for(&entry, resource_type, resource_id)?;
        }
        Ok(())
    }

    fn mark_as_waiting_for(
        &self,
        lock: &LockEntry,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> Result<(), LockError> {
        self.clear_wait_list();
        lock.copy_holder_wait_lists_into(self.handle.wait_list());

        let Some(blocker_id) = lock.detect_deadlock(self.handle.id()) else {
            return Ok(());
        };
        let Some(blocker) = self.manager.client_by_id(blocker_id) else {
            return Ok(());
        };
        if !self
            .manager
            .config
            .deadlock_resolution_strategy
            .should_abort(&self.handle, &blocker)
        {
            return Ok(());
        }

        // Order everything below after the reads the detection just did.
        atomic::fence(Ordering::Acquire);

        // Build the message before clearing the wait list, so it has a
        // chance of being coherent.
        let message = format!(
            "{} can't acquire {} on {}({}), because holders of that lock are waiting for {}.\n \
             Wait list:{}",
            self.handle,
            lock,
            resource_type,
            resource_id,
            self.handle,
            lock.describe_wait_list()
        );

        // Double-check to cut down on false positives from the racy
        // wait-list reads.
        if lock.detect_deadlock(self.handle.id()).is_some() {
            self.handle.wait_list().clear();
            return Err(LockError::Deadlock { message });
        }
        Ok(())
    }

    fn clear_wait_list(&self) {
        self.handle.clear_wait_list();
    }

    fn apply_wait_strategy(&self, type_id: usize, tries: u64) {
        self.manager.wait_strategies[type_id].apply(tries);
    }

    fn assert_valid(
        &self,
        wait_start: Instant,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> Result<(), LockError> {
        if self.handle.state.is_stopped() {
            return Err(LockError::ClientStopped {
                client_id: self.handle.id(),
            });
        }
        let timeout_millis = self.manager.config.lock_acquisition_timeout_millis;
        if timeout_millis > 0 && wait_start.elapsed() > Duration::from_millis(timeout_millis) {
            return Err(LockError::AcquireTimeout {
                type_id: resource_type.type_id(),
                resource_id,
                timeout_millis,
            });
        }
        Ok(())
    }

    fn enter_active(&self) -> Result<ActivityGuard, LockError> {
        if self.handle.state.enter() {
            Ok(ActivityGuard {
                handle: Arc::clone(&self.handle),
            })
        } else {
            Err(LockError::ClientStopped {
                client_id: self.handle.id(),
            })
        }
    }

    fn check_type(&self, resource_type: ResourceType) -> Result<usize, LockError> {
        let type_id = resource_type.type_id();
        let resource_types = self.manager.table.resource_types();
        if type_id >= resource_types {
            return Err(LockError::UnknownResourceType {
                type_id,
                resource_types,
            });
        }
        Ok(type_id)
    }
}

impl Drop for LockClient {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close_internal();
        }
    }
}

impl fmt::Display for LockClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.handle.fmt(f)
    }
}

fn bumped(
    count: u32,
    client_id: u32,
    type_id: usize,
    resource_id: u64,
) -> Result<u32, LockError> {
    count.checked_add(1).ok_or(LockError::HoldCounterOverflow {
        client_id,
        type_id,
        resource_id,
    })
}

fn collect_active_locks(
    counts: &[HashMap<u64, u32>],
    mode: LockMode,
    locks: &mut Vec<ActiveLock>,
) {
    for (type_id, map) in counts.iter().enumerate() {
        for &resource_id in map.keys() {
            locks.push(ActiveLock {
                resource_type: ResourceType(type_id as u32),
                resource_id,
                mode,
            });
        }
    }
}

fn clear_counts(counts: &mut HashMap<u64, u32>) {
    if counts.len() <= SMALL_COUNT_MAP {
        counts.clear();
    } else {
        *counts = HashMap::new();
    }
}
