pub(crate) mod data_structures;
pub mod error;
pub(crate) mod timeutils;

pub use data_structures::{Map, Set};
