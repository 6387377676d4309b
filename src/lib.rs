//! samalloc: portfolio allocation decision engine.
//!
//! Given a price history and optional auxiliary datasets, a [`domain::strategy::Strategy`]
//! computes per-instrument signals, runs its ordered adjustment rules and
//! returns a normalized target allocation.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
