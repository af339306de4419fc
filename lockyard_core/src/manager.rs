use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_skiplist::SkipMap;

use crate::client::{ClientHandle, LockClient};
use crate::error::LockError;
use crate::lock::LockEntry;
use crate::strategy::WaitStrategy;
use crate::table::{LockTable, ResourceType};

// For the same two clients on both sides of a cycle, exactly one side must
// answer true; asymmetry is what prevents mutual-abort live-locks.
// AbortSelf trades that guarantee for simplicity and relies on retry.
#[derive(Clone, Copy, Debug)]
pub enum DeadlockResolutionStrategy {
    AbortYoungest,
    AbortRandom,
    AbortSelf,
    Custom(fn(&ClientHandle, &ClientHandle) -> bool),
}

impl DeadlockResolutionStrategy {
    pub fn should_abort(&self, client: &ClientHandle, blocker: &ClientHandle) -> bool {
        match *self {
            DeadlockResolutionStrategy::AbortYoungest => {
                client.session_seq() > blocker.session_seq()
            }
            DeadlockResolutionStrategy::AbortRandom => {
                let mine = client.session_seq();
                let theirs = blocker.session_seq();
                let victim = if mix(mine ^ theirs) & 1 == 0 {
                    mine.min(theirs)
                } else {
                    mine.max(theirs)
                };
                victim == mine
            }
            DeadlockResolutionStrategy::AbortSelf => true,
            DeadlockResolutionStrategy::Custom(decide) => decide(client, blocker),
        }
    }
}

fn mix(seed: u64) -> u64 {
    let mut x = seed ^ 0x9E37_79B9_7F4A_7C15;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

#[derive(Clone, Copy, Debug)]
pub struct LockManagerConfig {
    // 0 disables the timeout check.
    pub lock_acquisition_timeout_millis: u64,
    pub deadlock_resolution_strategy: DeadlockResolutionStrategy,
    // Wait-list bitsets are sized to this, so it is fixed for the lifetime
    // of the manager.
    pub max_clients: usize,
}

impl LockManagerConfig {
    pub const LOCK_ACQUISITION_TIMEOUT_MILLIS: u64 = 0;
    pub const MAX_CLIENTS: usize = 1024;

    pub const fn new() -> Self {
        Self {
            lock_acquisition_timeout_millis: Self::LOCK_ACQUISITION_TIMEOUT_MILLIS,
            deadlock_resolution_strategy: DeadlockResolutionStrategy::AbortYoungest,
            max_clients: Self::MAX_CLIENTS,
        }
    }
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct PooledClient {
    handle: Arc<ClientHandle>,
    shared_counts: Vec<HashMap<u64, u32>>,
    exclusive_counts: Vec<HashMap<u64, u32>>,
}

pub(crate) struct ManagerInner {
    pub(crate) table: LockTable,
    pub(crate) wait_strategies: Box<[WaitStrategy]>,
    pub(crate) config: LockManagerConfig,
    clients: SkipMap<u32, Arc<ClientHandle>>,
    pool: Mutex<Vec<PooledClient>>,
    next_client_id: AtomicU32,
    next_session_seq: AtomicU64,
}

impl ManagerInner {
    pub(crate) fn client_by_id(&self, client_id: u32) -> Option<Arc<ClientHandle>> {
        self.clients
            .get(&client_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn release_client(
        &self,
        handle: Arc<ClientHandle>,
        shared_counts: Vec<HashMap<u64, u32>>,
        exclusive_counts: Vec<HashMap<u64, u32>>,
    ) -> Result<(), LockError> {
        let mut pool = self.pool.lock().map_err(|_| LockError::PoolPoisoned)?;
        pool.push(PooledClient {
            handle,
            shared_counts,
            exclusive_counts,
        });
        Ok(())
    }
}

#[derive(Clone)]
pub struct LockManager {
    inner: Arc<ManagerInner>,
}

impl LockManager {
    // One wait strategy per resource type; the number of types is fixed
    // here for the lifetime of the manager.
    pub fn new(wait_strategies: Vec<WaitStrategy>, config: LockManagerConfig) -> Self {
        let resource_types = wait_strategies.len();
        Self {
            inner: Arc::new(ManagerInner {
                table: LockTable::new(resource_types),
                wait_strategies: wait_strategies.into_boxed_slice(),
                config,
                clients: SkipMap::new(),
                pool: Mutex::new(Vec::new()),
                next_client_id: AtomicU32::new(0),
                next_session_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_resource_types(resource_types: usize, config: LockManagerConfig) -> Self {
        Self::new(vec![WaitStrategy::default(); resource_types], config)
    }

    pub fn resource_types(&self) -> usize {
        self.inner.table.resource_types()
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.inner.config
    }

    pub fn new_client(&self) -> Result<LockClient, LockError> {
        let session_seq = self.inner.next_session_seq.fetch_add(1, Ordering::AcqRel);
        let pooled = {
            let mut pool = self.inner.pool.lock().map_err(|_| LockError::PoolPoisoned)?;
            pool.pop()
        };

        let (handle, shared_counts, exclusive_counts) = match pooled {
            Some(pooled) => (
                pooled.handle,
                pooled.shared_counts,
                pooled.exclusive_counts,
            ),
            None => {
                let id = self.inner.next_client_id.fetch_add(1, Ordering::AcqRel);
                if id as usize >= self.inner.config.max_clients {
                    return Err(LockError::ClientSlotsExhausted {
                        max_clients: self.inner.config.max_clients,
                    });
                }
                let handle = Arc::new(ClientHandle::new(id, self.inner.config.max_clients));
                self.inner.clients.insert(id, Arc::clone(&handle));
                let types = self.inner.table.resource_types();
                (
                    handle,
                    vec![HashMap::new(); types],
                    vec![HashMap::new(); types],
                )
            }
        };

        handle.begin_session(session_seq);
        Ok(LockClient::new(
            Arc::clone(&self.inner),
            handle,
            shared_counts,
            exclusive_counts,
        ))
    }

    pub fn client_by_id(&self, client_id: u32) -> Option<Arc<ClientHandle>> {
        self.inner.client_by_id(client_id)
    }

    // Read-only view of one table slot, for monitoring and tests.
    pub fn lock_entry(&self, resource_type: ResourceType, resource_id: u64) -> Option<LockEntry> {
        self.inner.table.get(resource_type.type_id(), resource_id)
    }

    pub fn resource_count(&self, resource_type: ResourceType) -> usize {
        self.inner.table.resource_count(resource_type.type_id())
    }
}
