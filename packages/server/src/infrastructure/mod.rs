//! Infrastructure layer: concrete state owners and adapters behind the
//! domain traits.

pub mod directory;
pub mod dto;
pub mod identity;
pub mod registry;
pub mod repository;
