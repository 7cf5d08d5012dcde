pub mod config;
pub mod context;
pub mod locks;

pub use config::LeadsConfig;
pub use context::HubContext;
pub use locks::KeyedLocks;
