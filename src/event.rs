//! Event identity, state, and the invocation protocol.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::firer;
use crate::manager::{EventManager, ManagerInner};
use crate::storage::CallbackStore;
use crate::util::{self, Callback};

/// Reserved state keys, pre-populated at construction.
const KEY_ONCE: &str = "once";
const KEY_DATA: &str = "data";
const KEY_FIRED: &str = "fired";

/// Errors surfaced by event construction, state access, and invocation.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Supplied name trimmed down to the empty string
    #[error("Event name must not be empty")]
    EmptyName,

    /// Read of a state key that was never written
    #[error("No state entry with key: {0}")]
    NoSuchState(String),

    /// No stored callback for the event's id at invocation time; indicates
    /// a lifecycle bug or an event whose callback was evicted by removal
    #[error("No callback stored for event: {0}")]
    MissingCallback(Uuid),
}

/// Construction options for [`Event`].
#[derive(Clone)]
pub struct EventOptions {
    /// Remove the event from its manager after the first dispatch
    pub once: bool,

    /// Initial payload for the reserved `data` state key
    pub data: Option<Value>,

    /// Owning object the event is scoped to (informational only)
    pub target: Option<Arc<dyn Any + Send + Sync>>,
}

impl EventOptions {
    /// Default options: once, no data, no target.
    pub fn new() -> Self {
        Self {
            once: true,
            data: None,
            target: None,
        }
    }

    /// Set the once flag.
    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Set the initial `data` payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the target object.
    pub fn with_target(mut self, target: Arc<dyn Any + Send + Sync>) -> Self {
        self.target = Some(target);
        self
    }
}

impl Default for EventOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct EventInner {
    id: Uuid,
    name: String,
    target: Option<Arc<dyn Any + Send + Sync>>,
    created_at: DateTime<Utc>,
    state: Mutex<HashMap<String, Value>>,
    return_value: Mutex<Option<Value>>,
    propagation_stopped: AtomicBool,
    manager: Mutex<Option<Weak<ManagerInner>>>,
}

impl Drop for EventInner {
    fn drop(&mut self) {
        // Backstop for the explicit evictions on once-fire and removal: an
        // event nobody can reach must not pin its callback in the store.
        CallbackStore::remove(&self.id);
    }
}

/// A named, identified registration of one callback plus mutable state.
///
/// `Event` is a cheaply clonable handle; clones share identity and state.
/// The callback itself lives in a process-wide side table keyed by the
/// event's id, never in the event record (see the [`storage`](crate::storage)
/// module), so `Debug` output and [`snapshot`](Event::snapshot) stay shallow.
///
/// # Examples
///
/// ```
/// use serde_json::{json, Value};
/// use tinderbox::{Event, EventOptions};
///
/// let event = Event::new(" Save ", |_event, args| args[0].clone(), EventOptions::new())?;
/// assert_eq!(event.name(), "save");
///
/// let result = event.invoke(&[json!("payload")])?;
/// assert_eq!(result, Some(json!("payload")));
/// # Ok::<(), tinderbox::EventError>(())
/// ```
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    /// Create an event without attaching it to a manager.
    ///
    /// The name is normalized (trim + lowercase) and the callback is
    /// registered in the callback store under the event's freshly generated
    /// id. The state bag starts with the reserved keys: `once` from the
    /// options, `data` from the options (`Null` when unset), `fired` at 0.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyName`] if the name normalizes to the empty
    /// string; no callback is stored in that case.
    pub fn new<F>(name: &str, callback: F, options: EventOptions) -> Result<Self, EventError>
    where
        F: Fn(&Event, &[Value]) -> Value + Send + Sync + 'static,
    {
        Self::from_callback(name, util::normalize_callback(callback), options)
    }

    pub(crate) fn from_callback(
        name: &str,
        callback: Callback,
        options: EventOptions,
    ) -> Result<Self, EventError> {
        // Validate the name before touching the store: a rejected
        // construction must not leave an entry behind.
        let name = util::normalize_name(name)?;
        let id = Uuid::new_v4();

        let mut state = HashMap::new();
        state.insert(KEY_ONCE.to_string(), Value::Bool(options.once));
        state.insert(KEY_DATA.to_string(), options.data.unwrap_or(Value::Null));
        state.insert(KEY_FIRED.to_string(), Value::from(0u64));

        let event = Self {
            inner: Arc::new(EventInner {
                id,
                name,
                target: options.target,
                created_at: Utc::now(),
                state: Mutex::new(state),
                return_value: Mutex::new(None),
                propagation_stopped: AtomicBool::new(false),
                manager: Mutex::new(None),
            }),
        };

        CallbackStore::add(id, callback);
        debug!(id = %id, name = %event.inner.name, "event created");

        Ok(event)
    }

    /// Process-unique identity, generated at construction.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Normalized name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Owning object the event is scoped to, if any.
    pub fn target(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.target.clone()
    }

    /// Construction timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Read a state entry.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::NoSuchState`] for keys that were never written.
    pub fn get(&self, key: &str) -> Result<Value, EventError> {
        self.inner
            .state
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| EventError::NoSuchState(key.to_string()))
    }

    /// Write a state entry, creating or updating it.
    ///
    /// The reserved keys `once`, `data`, and `fired` may be overridden like
    /// any other.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.state.lock().insert(key.into(), value);
    }

    /// Whether the event is removed from its manager after the first
    /// dispatch.
    ///
    /// Reads the reserved `once` key strictly: a non-boolean override reads
    /// as `false`.
    pub fn once(&self) -> bool {
        self.inner
            .state
            .lock()
            .get(KEY_ONCE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Current payload under the reserved `data` key.
    pub fn data(&self) -> Value {
        self.inner
            .state
            .lock()
            .get(KEY_DATA)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Number of invocation attempts so far, including attempts short-
    /// circuited by [`stop_propagation`](Event::stop_propagation).
    pub fn fired(&self) -> u64 {
        self.inner
            .state
            .lock()
            .get(KEY_FIRED)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    pub(crate) fn bump_fired(&self) {
        let mut state = self.inner.state.lock();
        let fired = state.get(KEY_FIRED).and_then(Value::as_u64).unwrap_or(0);
        state.insert(KEY_FIRED.to_string(), Value::from(fired + 1));
    }

    /// Last recorded result, either captured from the callback's return or
    /// set through [`set_return_value`](Event::set_return_value).
    pub fn return_value(&self) -> Option<Value> {
        self.inner.return_value.lock().clone()
    }

    /// Record a result explicitly.
    ///
    /// A callback may call this during its own execution and return `Null`
    /// to make the recorded value differ from its return.
    pub fn set_return_value(&self, value: Value) {
        *self.inner.return_value.lock() = Some(value);
    }

    /// Permanently disable future callback invocation for this event.
    ///
    /// In-flight calls are unaffected; subsequent invocation attempts tick
    /// the `fired` counter but never run the callback. The event record
    /// stays registered until explicitly removed.
    pub fn stop_propagation(&self) {
        self.inner.propagation_stopped.store(true, Ordering::SeqCst);
    }

    /// Whether propagation has been stopped.
    pub fn is_propagation_stopped(&self) -> bool {
        self.inner.propagation_stopped.load(Ordering::SeqCst)
    }

    /// Attach the owning manager. The link is non-owning: dropping the
    /// manager does not keep the event alive and vice versa.
    pub fn set_manager(&self, manager: &EventManager) {
        *self.inner.manager.lock() = Some(manager.downgrade());
    }

    /// The owning manager, if the event is registered and the manager is
    /// still alive.
    pub fn manager(&self) -> Option<EventManager> {
        self.inner
            .manager
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(EventManager::from_inner)
    }

    /// Invoke the stored callback with call-time arguments.
    ///
    /// Equivalent to firing through a manager, usable standalone. See the
    /// crate documentation for the dispatch contract.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MissingCallback`] if the callback store has no
    /// entry for this event's id.
    pub fn invoke(&self, args: &[Value]) -> Result<Option<Value>, EventError> {
        firer::fire(self, args)
    }

    /// Whether the callback store currently holds this event's callback.
    /// Diagnostic: false after once-fire or removal.
    pub fn has_callback(&self) -> bool {
        CallbackStore::contains(&self.inner.id)
    }

    /// Serializable diagnostic view of the event, without its callback.
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            id: self.inner.id,
            name: self.inner.name.clone(),
            created_at: self.inner.created_at,
            state: self.inner.state.lock().clone(),
            return_value: self.inner.return_value.lock().clone(),
            propagation_stopped: self.is_propagation_stopped(),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow on purpose: the callback lives in the side table and the
        // target is an opaque Any.
        f.debug_struct("Event")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("once", &self.once())
            .field("fired", &self.fired())
            .field("propagation_stopped", &self.is_propagation_stopped())
            .finish()
    }
}

/// Serializable diagnostic view of an [`Event`].
///
/// Carries identity and state only; the callback stays in the side table,
/// so serializing a snapshot never touches a closure's captured environment.
#[derive(Debug, Clone, Serialize)]
pub struct EventSnapshot {
    /// Event identity
    pub id: Uuid,

    /// Normalized name
    pub name: String,

    /// Construction timestamp
    pub created_at: DateTime<Utc>,

    /// State bag contents, reserved keys included
    pub state: HashMap<String, Value>,

    /// Last recorded result
    pub return_value: Option<Value>,

    /// Whether future invocations are disabled
    pub propagation_stopped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn noop(_event: &Event, _args: &[Value]) -> Value {
        Value::Null
    }

    #[test]
    fn test_construction_defaults() {
        let event = Event::new("Ready", noop, EventOptions::new()).unwrap();

        assert_eq!(event.name(), "ready");
        assert!(event.once());
        assert_eq!(event.fired(), 0);
        assert_eq!(event.data(), Value::Null);
        assert_eq!(event.return_value(), None);
        assert!(!event.is_propagation_stopped());
        assert!(event.manager().is_none());
        assert!(event.has_callback());
    }

    #[test]
    fn test_construction_normalizes_name() {
        let event = Event::new("  CLICK  ", noop, EventOptions::new()).unwrap();
        assert_eq!(event.name(), "click");
    }

    #[test]
    fn test_construction_rejects_empty_name() {
        assert!(matches!(
            Event::new("   ", noop, EventOptions::new()),
            Err(EventError::EmptyName)
        ));
    }

    #[test]
    fn test_rejected_construction_stores_no_callback() {
        let sentinel = Arc::new(());
        let probe = Arc::clone(&sentinel);

        let result = Event::new(
            " \t ",
            move |_event, _args| {
                let _ = &probe;
                Value::Null
            },
            EventOptions::new(),
        );

        assert!(matches!(result, Err(EventError::EmptyName)));
        // The closure was dropped, so no store entry can be holding it.
        assert_eq!(Arc::strong_count(&sentinel), 1);
    }

    #[test]
    fn test_options_carry_data_and_once() {
        let options = EventOptions::new()
            .with_once(false)
            .with_data(json!({"source": "disk"}));
        let event = Event::new("load", noop, options).unwrap();

        assert!(!event.once());
        assert_eq!(event.data(), json!({"source": "disk"}));
        assert_eq!(event.get("data").unwrap(), json!({"source": "disk"}));
    }

    #[test]
    fn test_state_round_trip() {
        let event = Event::new("state", noop, EventOptions::new()).unwrap();

        event.set("x", json!(5));
        assert_eq!(event.get("x").unwrap(), json!(5));

        event.set("x", json!(6));
        assert_eq!(event.get("x").unwrap(), json!(6));
    }

    #[test]
    fn test_unset_state_key_fails() {
        let event = Event::new("state", noop, EventOptions::new()).unwrap();

        match event.get("y") {
            Err(EventError::NoSuchState(key)) => assert_eq!(key, "y"),
            other => panic!("expected NoSuchState, got {other:?}"),
        }
    }

    #[test]
    fn test_reserved_keys_can_be_overridden() {
        let event = Event::new("state", noop, EventOptions::new()).unwrap();
        assert!(event.once());

        event.set("once", json!(false));
        assert!(!event.once());

        event.set("data", json!([1, 2, 3]));
        assert_eq!(event.data(), json!([1, 2, 3]));
    }

    #[test]
    fn test_invoke_runs_callback_and_captures_result() {
        let event = Event::new(
            "double",
            |_event, args| json!(args[0].as_i64().unwrap_or(0) * 2),
            EventOptions::new(),
        )
        .unwrap();

        let result = event.invoke(&[json!(21)]).unwrap();

        assert_eq!(result, Some(json!(42)));
        assert_eq!(event.return_value(), Some(json!(42)));
        assert_eq!(event.fired(), 1);
    }

    #[test]
    fn test_once_invoke_evicts_callback() {
        let event = Event::new("boot", noop, EventOptions::new()).unwrap();
        assert!(event.has_callback());

        event.invoke(&[]).unwrap();

        assert!(!event.has_callback());
        assert!(matches!(
            event.invoke(&[]),
            Err(EventError::MissingCallback(_))
        ));
    }

    #[test]
    fn test_non_once_invoke_keeps_callback() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let event = Event::new(
            "tick",
            move |_event, _args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Value::Null
            },
            EventOptions::new().with_once(false),
        )
        .unwrap();

        event.invoke(&[]).unwrap();
        event.invoke(&[]).unwrap();
        event.invoke(&[]).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(event.has_callback());
        assert_eq!(event.fired(), 3);
    }

    #[test]
    fn test_stop_propagation_blocks_callback() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let event = Event::new(
            "halted",
            move |_event, _args| {
                counter.fetch_add(1, Ordering::SeqCst);
                json!("ran")
            },
            EventOptions::new(),
        )
        .unwrap();

        event.stop_propagation();
        assert!(event.is_propagation_stopped());

        assert_eq!(event.invoke(&[]).unwrap(), None);
        assert_eq!(event.invoke(&[]).unwrap(), None);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // Attempts still tick the counter and the callback stays stored.
        assert_eq!(event.fired(), 2);
        assert!(event.has_callback());
    }

    #[test]
    fn test_explicit_return_value_survives_null_return() {
        let event = Event::new(
            "report",
            |event, _args| {
                event.set_return_value(json!(7));
                Value::Null
            },
            EventOptions::new().with_once(false),
        )
        .unwrap();

        assert_eq!(event.invoke(&[]).unwrap(), Some(json!(7)));
    }

    #[test]
    fn test_non_null_return_wins_over_explicit() {
        let event = Event::new(
            "report",
            |event, _args| {
                event.set_return_value(json!(7));
                json!(8)
            },
            EventOptions::new().with_once(false),
        )
        .unwrap();

        assert_eq!(event.invoke(&[]).unwrap(), Some(json!(8)));
    }

    #[test]
    fn test_callback_can_stash_state_for_caller() {
        let event = Event::new(
            "job",
            |event, args| {
                event.set("seen", args[0].clone());
                Value::Null
            },
            EventOptions::new().with_once(false),
        )
        .unwrap();

        event.invoke(&[json!("payload")]).unwrap();

        assert_eq!(event.get("seen").unwrap(), json!("payload"));
    }

    #[test]
    fn test_snapshot_serializes_without_callback() {
        let event = Event::new(
            "snap",
            noop,
            EventOptions::new().with_data(json!({"k": 1})),
        )
        .unwrap();
        event.set("extra", json!(true));

        let snapshot = event.snapshot();
        let serialized = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(serialized["name"], json!("snap"));
        assert_eq!(serialized["state"]["data"], json!({"k": 1}));
        assert_eq!(serialized["state"]["extra"], json!(true));
        assert_eq!(serialized["state"]["fired"], json!(0));
        assert_eq!(serialized["propagation_stopped"], json!(false));
        assert!(serialized.get("callback").is_none());
    }

    #[test]
    fn test_debug_is_shallow() {
        let event = Event::new("dbg", noop, EventOptions::new()).unwrap();
        let rendered = format!("{event:?}");

        assert!(rendered.contains("dbg"));
        assert!(rendered.contains("once"));
    }

    #[test]
    fn test_dropping_last_handle_evicts_callback() {
        let sentinel = Arc::new(());
        let probe = Arc::clone(&sentinel);
        let event = Event::new(
            "transient",
            move |_event, _args| {
                let _ = &probe;
                Value::Null
            },
            EventOptions::new(),
        )
        .unwrap();

        assert_eq!(Arc::strong_count(&sentinel), 2);
        drop(event);
        assert_eq!(Arc::strong_count(&sentinel), 1);
    }
}
