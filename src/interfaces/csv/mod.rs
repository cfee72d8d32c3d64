//! CSV batch interface: command rows in, payment rows out.

pub mod batch;
pub mod command_reader;
pub mod payment_writer;
