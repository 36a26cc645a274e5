//! Tokio runtime driving the scheduling loop.

pub mod dispatcher;

pub use dispatcher::BuildDispatcher;
