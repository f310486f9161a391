//! Permission names and the role table that grants them.
//!
//! Services call [`crate::auth::AuthorizationContext::require`] with one of
//! these constants instead of string literals.
//!
//! # Example
//!
//! ```ignore
//! use academy_core::permissions;
//!
//! ctx.require(permissions::BATCHES_ASSIGN_STUDENTS)?;
//! ```

use crate::auth::Role;

// =============================================================================
// Batches permissions
// =============================================================================

/// Permission to create batches
pub const BATCHES_CREATE: &str = "batches:create";
/// Permission to read batch occupancy
pub const BATCHES_READ: &str = "batches:read";
/// Permission to change a batch's capacity
pub const BATCHES_UPDATE_CAPACITY: &str = "batches:update_capacity";
/// Permission to delete batches
pub const BATCHES_DELETE: &str = "batches:delete";
/// Permission to assign students to (and remove them from) batches
pub const BATCHES_ASSIGN_STUDENTS: &str = "batches:assign_students";

// =============================================================================
// Tests permissions
// =============================================================================

/// Permission to record or correct test marks, one at a time or in bulk
pub const TESTS_RECORD: &str = "tests:record";
/// Permission to read level summaries
pub const SUMMARIES_READ: &str = "summaries:read";
/// Permission to define levels and their passing thresholds
pub const LEVELS_UPDATE: &str = "levels:update";

// =============================================================================
// Fees permissions
// =============================================================================

/// Permission to assess a new fee
pub const FEES_CREATE: &str = "fees:create";
/// Permission to read a fee statement
pub const FEES_READ: &str = "fees:read";
/// Permission to submit proof of payment
pub const PAYMENTS_SUBMIT: &str = "payments:submit";
/// Permission to approve or reject a submitted payment
pub const PAYMENTS_DECIDE: &str = "payments:decide";

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const STAFF: &[Role] = &[Role::Admin, Role::Teacher];
const EVERYONE: &[Role] = &[Role::Admin, Role::Teacher, Role::Parent];

/// Roles granted `permission`. Unknown permissions grant nobody.
pub fn allowed_roles(permission: &str) -> &'static [Role] {
    match permission {
        BATCHES_CREATE | BATCHES_UPDATE_CAPACITY | BATCHES_DELETE | LEVELS_UPDATE
        | FEES_CREATE => ADMIN_ONLY,
        BATCHES_ASSIGN_STUDENTS | TESTS_RECORD | PAYMENTS_DECIDE => STAFF,
        BATCHES_READ | SUMMARIES_READ | FEES_READ | PAYMENTS_SUBMIT => EVERYONE,
        _ => &[],
    }
}
