//! # RPM Dispatch
//!
//! Admission scheduler for RPM build tasks.
//!
//! A build system hands over a set of pending build tasks: source builds
//! (SRPMs) and binary builds for one chroot each. The dispatcher decides which
//! of them may start now, given a set of concurrency limits, starts a worker
//! process for each admitted task and frees the slot again when the worker
//! finishes or vanishes.
//!
//! ## Scheduling model
//!
//! Scheduling is level-triggered. Every pass reloads the full pending set,
//! orders it and admits tasks one by one:
//!
//! 1. Candidates are sorted by combined priority (frontend priority, plus a
//!    penalty of [`BACKGROUND_PENALTY`](core::task::BACKGROUND_PENALTY) for
//!    background jobs, plus the scheduler-side backend priority). Lower runs
//!    first.
//! 2. A task already owning a worker is skipped.
//! 3. Every [`WorkerLimit`](core::WorkerLimit) matching the task must have a
//!    free slot; otherwise the task waits for a later pass.
//! 4. The slot is reserved and the worker launched. A failed launch gives the
//!    slot back and the task is retried on the next pass.
//!
//! ## Limits
//!
//! - **Global**: cap on all workers.
//! - **Architecture**: cap per build architecture, derived from the chroot
//!   name (`fedora-rawhide-x86_64` builds on `x86_64`; any `*86` counts as
//!   `x86_64`). Source builds do not count here.
//! - **Sandbox / owner**: caps applied to each sandbox or project owner
//!   separately.
//! - **Custom**: any [`TaskClassifier`](core::TaskClassifier).
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rpm_dispatch::core::{LimitSet, WorkerLimit, WorkerManager};
//! use rpm_dispatch::infra::{InMemoryLauncher, InMemoryTaskSource};
//! use rpm_dispatch::runtime::BuildDispatcher;
//!
//! let mut limits = LimitSet::new();
//! limits.add(WorkerLimit::global(8));
//! limits.add(WorkerLimit::architecture("aarch64", 2));
//!
//! let manager = Arc::new(WorkerManager::new(InMemoryLauncher::new(), limits));
//! let dispatcher = BuildDispatcher::new(
//!     manager,
//!     Box::new(InMemoryTaskSource::new()),
//!     Duration::from_secs(5),
//! );
//! let report = dispatcher.run_once().await?;
//! ```
//!
//! ## Modules
//!
//! - [`core`]: tasks, limits, worker registry and the manager.
//! - [`config`]: JSON configuration.
//! - [`builders`]: manager and intake construction from configuration.
//! - [`infra`]: process and in-memory launchers, intake sources.
//! - [`runtime`]: the tokio scheduling loop.
//! - [`util`]: clock and telemetry helpers.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and capacity accounting.
pub mod core;
/// Configuration models for the dispatcher, its launcher and intake.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure adapters: worker launchers and intake sources.
pub mod infra;
/// Tokio runtime driving the scheduling loop.
pub mod runtime;
/// Shared utilities.
pub mod util;
