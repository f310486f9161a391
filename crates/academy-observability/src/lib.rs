//! Academy Observability
//!
//! - [`logging`]: installs the `tracing` subscriber (console plus optional
//!   rolling file)
//! - [`metrics`]: counters for enrollments, recorded tests, and payment decisions
//!
//! Counters go through the `metrics` facade, so they are no-ops until the host
//! process installs a recorder.
//!
//! # Examples
//!
//! ```no_run
//! use academy_config::LogConfig;
//! use academy_observability::init_tracing;
//!
//! let _guard = init_tracing(&LogConfig::from_env());
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{track_enrollment, track_payment_decision, track_test_recorded};
