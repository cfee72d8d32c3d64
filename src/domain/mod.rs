//! Domain layer: the payment model, its state machine, and the ports the
//! application layer talks through.

pub mod money;
pub mod payment;
pub mod ports;
