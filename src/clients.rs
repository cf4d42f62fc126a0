use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::resolver::{AddressResolver, ArmAddressResolver};
use crate::table::{StateTable, TableServiceClient};

/// A type used to hold the collaborators the handler talks to.
/// Both are trait objects so tests can swap in fakes.
#[derive(Clone)]
pub struct Clients {
    pub table: Arc<dyn StateTable>,
    pub resolver: Arc<dyn AddressResolver>,
}

impl Clients {
    pub fn new(table: Arc<dyn StateTable>, resolver: Arc<dyn AddressResolver>) -> Self {
        Clients { table, resolver }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Clients {
            table: Arc::new(TableServiceClient::new(
                http.clone(),
                &config.table_endpoint,
                &config.sas_token,
            )),
            resolver: Arc::new(ArmAddressResolver::new(
                http,
                &config.management_endpoint,
                &config.subscription_id,
                &config.api_version,
                &config.management_token,
            )),
        })
    }
}
