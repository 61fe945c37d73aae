//! Core identity model.
//!
//! # Responsibility
//! - Define how graph participants are identified and compared.

pub mod object;

pub use object::{ObjectId, Participant, SourceObject};
