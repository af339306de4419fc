use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    AcquireTimeout {
        type_id: usize,
        resource_id: u64,
        timeout_millis: u64,
    },
    Deadlock {
        message: String,
    },
    ClientStopped {
        client_id: u32,
    },
    NotHeld {
        client_id: u32,
        type_id: usize,
        resource_id: u64,
    },
    HoldCounterOverflow {
        client_id: u32,
        type_id: usize,
        resource_id: u64,
    },
    SharedLockNotUpgraded {
        client_id: u32,
        type_id: usize,
        resource_id: u64,
    },
    UnknownResourceType {
        type_id: usize,
        resource_types: usize,
    },
    ClientSlotsExhausted {
        max_clients: usize,
    },
    PoolPoisoned,
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::AcquireTimeout {
                type_id,
                resource_id,
                timeout_millis,
            } => write!(
                f,
                "unable to acquire lock on ResourceType({}) resource {} within {} ms",
                type_id, resource_id, timeout_millis
            ),
            LockError::Deadlock { message } => write!(f, "{}", message),
            LockError::ClientStopped { client_id } => {
                write!(f, "Client[{}] is stopped and cannot perform lock operations", client_id)
            }
            LockError::NotHeld {
                client_id,
                type_id,
                resource_id,
            } => write!(
                f,
                "Client[{}] cannot release lock that it does not hold: ResourceType({})[{}]",
                client_id, type_id, resource_id
            ),
            LockError::HoldCounterOverflow {
                client_id,
                type_id,
                resource_id,
            } => write!(
                f,
                "Client[{}] overflowed its hold counter on ResourceType({})[{}]",
                client_id, type_id, resource_id
            ),
            LockError::SharedLockNotUpgraded {
                client_id,
                type_id,
                resource_id,
            } => write!(
                f,
                "Client[{}] released exclusive lock on ResourceType({})[{}], but the shared lock \
                 was never upgraded to exclusive",
                client_id, type_id, resource_id
            ),
            LockError::UnknownResourceType {
                type_id,
                resource_types,
            } => write!(
                f,
                "resource type {} is out of range; this manager was built with {} resource types",
                type_id, resource_types
            ),
            LockError::ClientSlotsExhausted { max_clients } => write!(
                f,
                "no free client slot available; max {} concurrent lock clients reached",
                max_clients
            ),
            LockError::PoolPoisoned => write!(f, "lock client pool mutex was poisoned"),
        }
    }
}

impl std::error::Error for LockError {}
