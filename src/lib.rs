//! pgwd: a PGW control-plane simulator.
//!
//! Subscribers attach over UDP with a BCD-encoded IMSI. Each attach is
//! checked against a blacklist and admitted into a session registry with a
//! time-to-live. Session transitions are billed as CDRs, and an operator can
//! drain all sessions at a bounded rate before the process exits.

pub mod blacklist;
pub mod bootstrap;
pub mod cdr;
pub mod client;
pub mod codec;
pub mod config;
pub mod control;
pub mod pipeline;
pub mod session;
pub mod telemetry;
