use std::time::Instant;

use crate::table::ResourceType;

// Called lazily, once per acquire attempt, when the client first has to
// wait; dropping the returned event marks the wait's end.
pub trait LockTracer {
    type Event;

    fn wait_for_lock(
        &self,
        exclusive: bool,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> Self::Event;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLockTracer;

impl LockTracer for NoopLockTracer {
    type Event = ();

    #[inline]
    fn wait_for_lock(&self, _exclusive: bool, _resource_type: ResourceType, _resource_id: u64) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLockTracer;

impl LockTracer for TracingLockTracer {
    type Event = TracedWaitEvent;

    fn wait_for_lock(
        &self,
        exclusive: bool,
        resource_type: ResourceType,
        resource_id: u64,
    ) -> TracedWaitEvent {
        tracing::trace!(
            exclusive,
            type_id = resource_type.type_id(),
            resource_id,
            "waiting for lock"
        );
        TracedWaitEvent {
            exclusive,
            resource_type,
            resource_id,
            started: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub struct TracedWaitEvent {
    exclusive: bool,
    resource_type: ResourceType,
    resource_id: u64,
    started: Instant,
}

impl Drop for TracedWaitEvent {
    fn drop(&mut self) {
        tracing::trace!(
            exclusive = self.exclusive,
            type_id = self.resource_type.type_id(),
            resource_id = self.resource_id,
            waited_micros = self.started.elapsed().as_micros() as u64,
            "lock wait over"
        );
    }
}
