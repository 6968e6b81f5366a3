//! Domain layer for the laundry back-office inventory.
//!
//! Everything here is pure: no I/O, no clocks read implicitly. Storage and
//! HTTP crates feed values in and persist what comes out.

pub mod catalog;
pub mod ledger;
pub mod report;
pub mod types;
