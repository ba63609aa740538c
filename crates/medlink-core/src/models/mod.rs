//! Domain models for MedLink.

mod capability;
mod drug;
mod inventory;

pub use capability::*;
pub use drug::*;
pub use inventory::*;
