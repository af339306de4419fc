use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use crate::client::ClientHandle;
use crate::waitset::WaitSet;

const NO_CLIENT: u32 = u32::MAX;

// Arc identity stands in for the reference identity the table's
// put-if-absent relies on.
#[derive(Clone)]
pub enum LockEntry {
    Shared(Arc<SharedLock>),
    Exclusive(Arc<ExclusiveLock>),
}

impl LockEntry {
    pub fn same_instance(&self, other: &LockEntry) -> bool {
        match (self, other) {
            (LockEntry::Shared(a), LockEntry::Shared(b)) => Arc::ptr_eq(a, b),
            (LockEntry::Exclusive(a), LockEntry::Exclusive(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_shared(&self) -> Option<&Arc<SharedLock>> {
        match self {
            LockEntry::Shared(lock) => Some(lock),
            LockEntry::Exclusive(_) => None,
        }
    }

    pub fn as_exclusive(&self) -> Option<&Arc<ExclusiveLock>> {
        match self {
            LockEntry::Exclusive(lock) => Some(lock),
            LockEntry::Shared(_) => None,
        }
    }

    pub fn copy_holder_wait_lists_into(&self, target: &WaitSet) {
        match self {
            LockEntry::Shared(lock) => lock.copy_holder_wait_lists_into(target),
            LockEntry::Exclusive(lock) => lock.copy_holder_wait_lists_into(target),
        }
    }

    pub fn detect_deadlock(&self, probe: u32) -> Option<u32> {
        match self {
            LockEntry::Shared(lock) => lock.detect_deadlock(probe),
            LockEntry::Exclusive(lock) => lock.detect_deadlock(probe),
        }
    }

    pub fn describe_wait_list(&self) -> String {
        match self {
            LockEntry::Shared(lock) => lock.describe_wait_list(),
            LockEntry::Exclusive(lock) => lock.describe_wait_list(),
        }
    }
}

impl fmt::Display for LockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockEntry::Shared(lock) => lock.fmt(f),
            LockEntry::Exclusive(lock) => lock.fmt(f),
        }
    }
}

struct HolderSlot {
    client: Arc<ClientHandle>,
    count: AtomicU32,
}

const UPDATE_LOCK_FLAG: u32 = 1 << 31;
const COUNT_MASK: u32 = UPDATE_LOCK_FLAG - 1;

// Low bits of state count active acquisitions; zero means the lock is dead
// and must never be re-acquired. Bit 31 of the same word is the update
// reservation. Flag and count share one word so the flag and every
// increment are totally ordered; once the flag is in, no stranger's
// increment can land after it unseen.
pub struct SharedLock {
    state: AtomicU32,
    update_owner: AtomicU32,
    holders: SkipMap<u32, HolderSlot>,
}

impl SharedLock {
    pub(crate) fn new(owner: &Arc<ClientHandle>) -> Self {
        let holders = SkipMap::new();
        holders.insert(
            owner.id(),
            HolderSlot {
                client: Arc::clone(owner),
                count: AtomicU32::new(1),
            },
        );
        Self {
            state: AtomicU32::new(1),
            update_owner: AtomicU32::new(NO_CLIENT),
            holders,
        }
    }

    pub(crate) fn acquire(&self, client: &Arc<ClientHandle>) -> bool {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & UPDATE_LOCK_FLAG != 0
                && self.update_owner.load(Ordering::Acquire) != client.id()
            {
                return false;
            }
            if state & COUNT_MASK == 0 {
                return false;
            }
            match self.state.compare_exchange(
                state,
                state + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => state = observed,
            }
        }

        match self.holders.get(&client.id()) {
            Some(slot) => {
                slot.value().count.fetch_add(1, Ordering::AcqRel);
            }
            None => {
                self.holders.insert(
                    client.id(),
                    HolderSlot {
                        client: Arc::clone(client),
                        count: AtomicU32::new(1),
                    },
                );
            }
        }
        true
    }

    // None when the client is not a holder; Some(true) when the lock is now
    // dead and the caller must remove it from the table.
    pub(crate) fn release(&self, client_id: u32) -> Option<bool> {
        let slot = self.holders.get(&client_id)?;
        if slot.value().count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.holders.remove(&client_id);
        }
        Some(self.state.fetch_sub(1, Ordering::AcqRel) & COUNT_MASK == 1)
    }

    pub(crate) fn try_acquire_update_lock(&self, client_id: u32) -> bool {
        if self
            .update_owner
            .compare_exchange(NO_CLIENT, client_id, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // The owner slot is claimed; the flag in the state word is what new
        // acquirers actually observe.
        self.state.fetch_or(UPDATE_LOCK_FLAG, Ordering::AcqRel);
        true
    }

    pub(crate) fn release_update_lock(&self) {
        self.state.fetch_and(!UPDATE_LOCK_FLAG, Ordering::AcqRel);
        self.update_owner.store(NO_CLIENT, Ordering::Release);
    }

    pub(crate) fn clean_update_holder(&self) {
        self.state.fetch_and(!UPDATE_LOCK_FLAG, Ordering::AcqRel);
        self.update_owner.store(NO_CLIENT, Ordering::Release);
    }

    pub fn is_update_lock(&self) -> bool {
        self.state.load(Ordering::Acquire) & UPDATE_LOCK_FLAG != 0
    }

    pub fn update_holder(&self) -> Option<u32> {
        if self.state.load(Ordering::Acquire) & UPDATE_LOCK_FLAG == 0 {
            return None;
        }
        let owner = self.update_owner.load(Ordering::Acquire);
        (owner != NO_CLIENT).then_some(owner)
    }

    pub fn number_of_holders(&self) -> u32 {
        self.state.load(Ordering::Acquire) & COUNT_MASK
    }

    pub fn holder_ids(&self) -> Vec<u32> {
        self.holders.iter().map(|entry| *entry.key()).collect()
    }

    pub(crate) fn copy_holder_wait_lists_into(&self, target: &WaitSet) {
        for entry in self.holders.iter() {
            entry.value().client.copy_wait_list_to(target);
        }
    }

    pub(crate) fn detect_deadlock(&self, probe: u32) -> Option<u32> {
        for entry in self.holders.iter() {
            let holder = &entry.value().client;
            if holder.is_waiting_for(probe) {
                return Some(holder.id());
            }
        }
        None
    }

    pub(crate) fn describe_wait_list(&self) -> String {
        let mut description = String::new();
        for entry in self.holders.iter() {
            description.push_str(&entry.value().client.describe_wait_list());
        }
        description
    }
}

impl fmt::Display for SharedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let holders: Vec<String> = self
            .holder_ids()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        write!(f, "SharedLock{{holders=[{}]", holders.join(","))?;
        match self.update_holder() {
            Some(holder) => write!(f, ", update_holder=Client[{}]}}", holder),
            None => write!(f, "}}"),
        }
    }
}

// One reusable instance per client, CAS-placed into any number of table
// slots; the exclusive fast path allocates nothing.
pub struct ExclusiveLock {
    owner: Arc<ClientHandle>,
}

impl ExclusiveLock {
    pub(crate) fn new(owner: Arc<ClientHandle>) -> Self {
        Self { owner }
    }

    pub fn owner_id(&self) -> u32 {
        self.owner.id()
    }

    pub(crate) fn copy_holder_wait_lists_into(&self, target: &WaitSet) {
        self.owner.copy_wait_list_to(target);
    }

    pub(crate) fn detect_deadlock(&self, probe: u32) -> Option<u32> {
        self.owner.is_waiting_for(probe).then(|| self.owner.id())
    }

    pub(crate) fn describe_wait_list(&self) -> String {
        self.owner.describe_wait_list()
    }
}

impl fmt::Display for ExclusiveLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExclusiveLock{{owner=Client[{}]}}", self.owner.id())
    }
}
