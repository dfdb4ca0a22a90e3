//! Core of the watchbeat monitoring agent: snapshot model, heap trend
//! prediction, weighted health scoring, the alert state machine, and
//! best-effort alert dispatch, driven by a periodic coordinator.

pub mod alerts;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod models;
pub mod scorer;
pub mod trend;
