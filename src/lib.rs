//! Client-side session and route authorization for the SmartRental portal.

pub mod error;
pub mod storage;
pub mod identity;
pub mod http;
pub mod navigation;
pub mod guard;
pub mod routes;
pub mod config;
pub mod portal;
pub mod cli;

pub use error::{AuthError, AuthResult};
pub use portal::{Portal, Visit};
