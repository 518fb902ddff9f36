//! Pantry domain - the persisted food-assistance location records.

pub mod models;
pub mod store;

pub use models::{NewPantry, Pantry, PantryStatus, PantryUpdate};
pub use store::{BasePantryStore, MemoryPantryStore, PostgresPantryStore};
