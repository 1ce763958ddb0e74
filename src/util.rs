//! Name and callback normalization.

use std::sync::Arc;

use serde_json::Value;

use crate::event::{Event, EventError};

/// Canonical form for event callbacks.
///
/// Every invocable handed to event construction is wrapped into this shared,
/// uniformly-callable form. A callback receives the event itself plus the
/// call-time arguments and produces a [`Value`] result; returning
/// [`Value::Null`] defers to whatever the callback set through
/// [`Event::set_return_value`].
pub type Callback = Arc<dyn Fn(&Event, &[Value]) -> Value + Send + Sync>;

/// Normalize an event name: trim surrounding whitespace, then lowercase.
///
/// # Errors
///
/// Returns [`EventError::EmptyName`] if the trimmed name is empty.
///
/// # Examples
///
/// ```
/// use tinderbox::normalize_name;
///
/// assert_eq!(normalize_name(" Click ").unwrap(), "click");
/// assert!(normalize_name("   ").is_err());
/// ```
pub fn normalize_name(name: &str) -> Result<String, EventError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EventError::EmptyName);
    }

    Ok(name.to_lowercase())
}

/// Wrap a compatible closure or function into the canonical [`Callback`] form.
pub fn normalize_callback<F>(callback: F) -> Callback
where
    F: Fn(&Event, &[Value]) -> Value + Send + Sync + 'static,
{
    Arc::new(callback)
}
