mod activity;
mod catalog;
mod conversion;
mod error;
mod loss_reasons;
mod memory_store;
mod migration;
mod service;
mod settings;
mod state_machine;
mod store;
mod types;

pub use activity::*;
pub use catalog::*;
pub use conversion::*;
pub use error::*;
pub use loss_reasons::*;
pub use memory_store::*;
pub use migration::*;
pub use service::*;
pub use settings::*;
pub use state_machine::*;
pub use store::*;
pub use types::*;
