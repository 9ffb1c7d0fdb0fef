//! Redcode library.
//!
//! Assembles Redcode warriors and runs Core War matches between them.

pub mod utils;
pub mod virtual_machine;
