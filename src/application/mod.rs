//! Application layer containing the core orchestration.
//!
//! `PaymentEngine` drives each payment through its lifecycle and persists
//! every transition; `ProcessorRouter` decides which processor handles a
//! payment from an ordered set of `RoutingRule`s.

pub mod engine;
pub mod router;
pub mod rules;
