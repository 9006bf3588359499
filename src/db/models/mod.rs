//! Database models split into domain-specific modules.

pub mod audit;
pub mod owner;
pub mod pet;
pub mod user;
pub mod veterinarian;
pub mod visit;

pub use audit::*;
pub use owner::*;
pub use pet::*;
pub use user::*;
pub use veterinarian::*;
pub use visit::*;
