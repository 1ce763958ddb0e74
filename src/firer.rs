//! Stateless dispatch of event callbacks.

use serde_json::Value;
use tracing::debug;

use crate::event::{Event, EventError};
use crate::storage::CallbackStore;

/// Invoke an event's stored callback with call-time arguments.
///
/// Shared by [`Event::invoke`] and the manager's fire paths. The contract:
///
/// 1. A propagation-stopped event never runs its callback; the attempt
///    still ticks the `fired` counter and yields the last recorded result.
/// 2. The callback runs with no internal locks held, so it may freely
///    re-enter the event and its manager (register, remove, fire).
/// 3. A non-`Null` result is captured as the return value; a `Null` result
///    defers to whatever the callback set explicitly.
/// 4. Once-removal happens after the callback returns: a callback that
///    checks its own registration mid-flight observes itself as still
///    registered. The `once` flag is re-read here, so a callback may clear
///    it during its own execution to stay registered. Manager removal is
///    id-guarded: a replacement the callback registered under the same name
///    survives.
pub(crate) fn fire(event: &Event, args: &[Value]) -> Result<Option<Value>, EventError> {
    if event.is_propagation_stopped() {
        debug!(name = %event.name(), "propagation stopped, skipping callback");
        event.bump_fired();
        return Ok(event.return_value());
    }

    let callback =
        CallbackStore::get(&event.id()).ok_or(EventError::MissingCallback(event.id()))?;

    debug!(id = %event.id(), name = %event.name(), "dispatching event");
    let result = (*callback)(event, args);
    if !result.is_null() {
        event.set_return_value(result);
    }

    if event.once() {
        CallbackStore::remove(&event.id());
        if let Some(manager) = event.manager() {
            manager.discard(event);
            debug!(name = %event.name(), "once event removed after dispatch");
        }
    }

    event.bump_fired();
    Ok(event.return_value())
}
