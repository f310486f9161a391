//! # Academy Core
//!
//! Foundational types shared by every academy crate:
//!
//! - [`errors`]: the [`AppError`] taxonomy and typed field errors
//! - [`auth`]: the explicit [`AuthorizationContext`] passed into each operation
//! - [`permissions`]: permission names and the role table granting them
//! - [`validation`]: converts `validator` derive results into field errors
//!
//! # Example
//!
//! ```ignore
//! use academy_core::{AppError, AuthorizationContext, permissions, validation};
//!
//! ctx.require(permissions::TESTS_RECORD)?;
//! validation::validate(&dto)?;
//! let err = AppError::not_found("student", student_id);
//! ```

pub mod auth;
pub mod errors;
pub mod permissions;
pub mod validation;

pub use auth::{AuthorizationContext, Role};
pub use errors::{AppError, ErrorKind, FieldError, FieldErrors};
