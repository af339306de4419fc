pub mod client;
pub mod error;
pub mod lock;
pub mod manager;
pub mod strategy;
pub mod table;
pub mod tracer;
pub mod waitset;

pub use client::{ActiveLock, ClientHandle, LockClient, LockMode};
pub use error::LockError;
pub use lock::{ExclusiveLock, LockEntry, SharedLock};
pub use manager::{DeadlockResolutionStrategy, LockManager, LockManagerConfig};
pub use strategy::WaitStrategy;
pub use table::{LockTable, ResourceType};
pub use tracer::{LockTracer, NoopLockTracer, TracedWaitEvent, TracingLockTracer};
pub use waitset::WaitSet;
