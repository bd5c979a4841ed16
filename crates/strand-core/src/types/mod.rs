//! Core data types: order enums, connection state and trading structs.

pub mod enums;
pub mod trading;

pub use enums::*;
pub use trading::*;
