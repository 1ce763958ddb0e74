//! In-process named events with synchronous dispatch.
//!
//! Register a callback under a string name, optionally mark it repeating,
//! and fire it later by name with run-time arguments. Dispatch is
//! synchronous and re-entrant: the callback runs on the caller's thread
//! before `fire` returns, and may itself register, remove, or fire events
//! through the same manager.
//!
//! ## Features
//!
//! - **Named registry** - One callback per normalized name; the last
//!   registration wins
//! - **Once events** - Registrations removed automatically after their
//!   first dispatch (the default)
//! - **Dynamic state** - A free-form per-event attribute bag callbacks can
//!   read and write mid-dispatch
//! - **Propagation control** - Permanently disable an event's callback
//!   while keeping its record
//! - **Decoupled callbacks** - Closures live in a side table keyed by event
//!   identity, so inspecting an event never drags in captured state
//!
//! ## Quick Start
//!
//! ```
//! use serde_json::json;
//! use tinderbox::EventManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = EventManager::new();
//!
//! manager.add("save", |_event, args| {
//!     json!(args[0].as_i64().unwrap_or(0) * 2)
//! })?;
//!
//! assert_eq!(manager.fire("save", &[json!(21)])?, Some(json!(42)));
//!
//! // Events default to once: the registration is gone after the fire.
//! assert!(!manager.has("save")?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Repeating Events
//!
//! ```
//! use serde_json::json;
//! use tinderbox::{EventManager, EventOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = EventManager::new();
//!
//! manager.add_with(
//!     "tick",
//!     |event, _args| json!(event.fired() + 1),
//!     EventOptions::new().with_once(false),
//! )?;
//!
//! assert_eq!(manager.fire("tick", &[])?, Some(json!(1)));
//! assert_eq!(manager.fire("tick", &[])?, Some(json!(2)));
//! assert!(manager.has("tick")?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Event State
//!
//! Every event carries an attribute bag with the reserved keys `once`,
//! `data`, and `fired` pre-populated. Callbacks may stash ad-hoc values on
//! the event for the caller to read afterwards; reading a key that was
//! never written is an error.
//!
//! ```
//! use serde_json::json;
//! use tinderbox::{EventManager, EventOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = EventManager::new();
//!
//! manager.add_with(
//!     "upload",
//!     |event, args| {
//!         event.set("bytes", args[0].clone());
//!         json!("done")
//!     },
//!     EventOptions::new().with_data(json!({"retries": 3})),
//! )?;
//!
//! let event = manager.get("upload")?.unwrap();
//! manager.fire("upload", &[json!(1024)])?;
//!
//! assert_eq!(event.get("bytes")?, json!(1024));
//! assert_eq!(event.get("data")?, json!({"retries": 3}));
//! assert!(event.get("nope").is_err());
//! # Ok(())
//! # }
//! ```
//!
//! ## Propagation Control
//!
//! ```
//! use serde_json::json;
//! use tinderbox::{Event, EventOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let event = Event::new("beacon", |_event, _args| json!("ran"), EventOptions::new())?;
//!
//! event.stop_propagation();
//!
//! // The callback never runs; attempts still count.
//! assert_eq!(event.invoke(&[])?, None);
//! assert_eq!(event.fired(), 1);
//! # Ok(())
//! # }
//! ```

pub mod event;
pub mod manager;
pub mod storage;
pub mod util;

mod firer;

pub use event::{Event, EventError, EventOptions, EventSnapshot};
pub use manager::{Emitter, EventManager, EventManagerError};
pub use util::{Callback, normalize_callback, normalize_name};
