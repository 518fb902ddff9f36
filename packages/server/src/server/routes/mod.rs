// HTTP routes
pub mod discovery;
pub mod health;
pub mod pantries;

pub use discovery::*;
pub use health::*;
pub use pantries::*;
