use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::leads::{LeadSource, LeadsError};

const MIN_CONVERSION_TIMEOUT_MS: u64 = 100;
const MAX_CONVERSION_TIMEOUT_MS: u64 = 60_000;

/// Runtime settings for the leads core.
///
/// Layered as built-in defaults, then an optional TOML file, then
/// `LEADS_*` environment variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeadsConfig {
    pub conversion_timeout_ms: u64,

    pub activity_page_size: usize,

    /// Seed for `LeadSettings::auto_create_customer_on_win` when a hub's
    /// settings are first created.
    pub auto_create_customer_on_win: bool,

    pub default_source: LeadSource,

    pub customer_service_url: Option<String>,

    pub customer_service_token: Option<String>,
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            conversion_timeout_ms: 5_000,
            activity_page_size: 50,
            auto_create_customer_on_win: false,
            default_source: LeadSource::Manual,
            customer_service_url: None,
            customer_service_token: None,
        }
    }
}

impl LeadsConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, LeadsError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            debug!("Loading leads config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed("LEADS_"))
            .extract()
            .map_err(|e| LeadsError::Config(e.to_string()))?;
        Ok(config.normalized())
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_millis(self.conversion_timeout_ms)
    }

    fn normalized(mut self) -> Self {
        let clamped = self
            .conversion_timeout_ms
            .clamp(MIN_CONVERSION_TIMEOUT_MS, MAX_CONVERSION_TIMEOUT_MS);
        if clamped != self.conversion_timeout_ms {
            warn!(
                "Conversion timeout {}ms is out of range, using {}ms",
                self.conversion_timeout_ms, clamped
            );
            self.conversion_timeout_ms = clamped;
        }

        if self.activity_page_size == 0 {
            warn!("Activity page size 0 is invalid, using 1");
            self.activity_page_size = 1;
        }

        if let Some(url) = self.customer_service_url.as_mut() {
            while url.ends_with('/') {
                url.pop();
            }
        }

        self
    }
}
