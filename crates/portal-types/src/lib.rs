//! Portal Types - record definitions shared by the storage layer and the server
//!
//! This crate contains only plain data types and the `Record` trait that
//! describes how they are keyed, with no runtime or storage dependencies.

pub mod record;
pub mod session;
pub mod user;

pub use record::*;
pub use session::*;
pub use user::*;
