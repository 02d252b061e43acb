//! Parley shared library — typed IDs, error contracts, and size limits shared
//! between the encryption core and its hosting applications.

pub mod constants;
pub mod error;
pub mod ids;
