//! Subscriber session state.
//!
//! Sessions carry only their IMSI and the time of the last admission.
//! Billing categories are derived at the state transition and written as
//! CDRs, never stored on the session.

mod registry;

pub use registry::{SessionRegistry, SharedSessionRegistry};
