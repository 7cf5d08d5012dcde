pub mod core;
pub mod leads;

pub use crate::core::{HubContext, LeadsConfig};
pub use crate::leads::{LeadService, LeadsError};
