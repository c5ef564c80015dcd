//! kb-core - Core types and ports for the hybrid knowledge retriever
//!
//! This crate provides the domain types, the collaborator traits (ports)
//! for the external lexical, embedding, vector and chunk-store services,
//! the error taxonomy and the configuration shared by the rest of the
//! workspace.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{KbError, Result};
pub use traits::*;
pub use types::*;
