//! Database models split into domain-specific modules.

pub mod booking;
pub mod room;
pub mod service;
pub mod user;

pub use booking::*;
pub use room::*;
pub use service::*;
pub use user::*;
