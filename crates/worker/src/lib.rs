//! Queue-driven email delivery: decode, send, record, settle.

pub mod consumer;
pub mod decoder;
pub mod dispatcher;
pub mod service;
