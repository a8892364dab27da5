pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod oauth;
pub mod router;
pub mod scim;
pub mod service;
pub mod types;

pub use error::{ConsoleError, ConsoleResult};
pub use router::{ConsoleState, console_router};
