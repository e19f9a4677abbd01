//! Watch coordination and change notification.
//!
//! A configuration with at least one watching source runs two background
//! tasks: the coordinator, which serializes source reports and recomputes,
//! and the dispatcher, which invokes registered callbacks. They are joined
//! by a bounded queue so slow callbacks never stall ingestion.

mod callbacks;
pub(crate) mod coordinator;
mod reporter;

pub use callbacks::{Callback, CallbackHandle};
pub use coordinator::{ErrorHook, ValueHook};
pub use reporter::Reporter;

pub(crate) use callbacks::{CallbackRegistry, Dispatch, catch_up};
pub(crate) use coordinator::{Coordinator, Event, Hooks};
