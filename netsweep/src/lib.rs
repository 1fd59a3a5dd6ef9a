pub mod config;
pub mod credentials;
pub mod enumerator;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod net;
pub mod orchestrator;
pub mod report;
pub mod services;
pub mod types;

pub use error::Error;
pub use error::Result;
