//! # Academy
//!
//! Core of a tutoring academy's management system: enrolling students into
//! capacity-limited batches, scoring tests, and approving fee payments.
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── cli/              # The `academy` command and the fake-data seeder
//! ├── events/           # Domain event sinks (log, mail, recording)
//! ├── modules/          # Services
//! │   ├── enrollment/  # Batches, assignment, capacity
//! │   ├── scoring/     # Levels, tests, summaries, bulk grading
//! │   └── payments/    # Fees and the payment approval workflow
//! ├── store/            # Persistence port with PostgreSQL and in-memory adapters
//! └── state.rs          # Shared application state
//! ```
//!
//! Shared building blocks live in workspace crates, re-exported here:
//!
//! - [`academy_core`]: errors, authorization context, permissions
//! - [`academy_models`]: entities, DTOs, events
//! - [`academy_config`]: environment configuration
//! - [`academy_db`]: pool and migrations
//! - [`academy_observability`]: tracing setup and metrics
//!
//! ## Concurrency
//!
//! Every guarded change runs in one store transaction that locks the rows it
//! reads for update. Student rows are locked before batch rows, batches in
//! ascending id order, and payments before fees. A lock wait that outlives
//! the configured timeout fails with `Conflict` instead of blocking.
//!
//! ## Example
//!
//! ```ignore
//! use academy::modules::EnrollmentService;
//! use academy_core::AuthorizationContext;
//! use academy_models::AssignStudentDto;
//!
//! let ctx = AuthorizationContext::admin(operator_id);
//! let outcome = EnrollmentService::assign_student(
//!     &state,
//!     &ctx,
//!     AssignStudentDto { student_id, batch_id },
//! )
//! .await?;
//! ```

pub mod cli;
pub mod events;
pub mod modules;
pub mod state;
pub mod store;

// Re-export workspace crates for convenience
pub use academy_config;
pub use academy_core;
pub use academy_db;
pub use academy_models;
pub use academy_observability;
