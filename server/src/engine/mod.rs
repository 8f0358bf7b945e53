pub mod connection;
pub mod error;
pub mod events;
pub mod registry;
pub mod session;
pub mod validation;
