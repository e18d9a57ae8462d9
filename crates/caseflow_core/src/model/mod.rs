//! Domain model for expropriation case tracking.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Hold pure business rules (stage transitions, delivery preferences,
//!   upload constraints) that need no storage access.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID.
//! - Cases and documents are soft-deleted, never hard-deleted.

pub mod activity;
pub mod case;
pub mod directory;
pub mod document;
pub mod meeting;
pub mod notification;
pub mod stage;
pub mod task;
