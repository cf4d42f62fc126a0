use std::env;
use std::string::String;

pub const DEFAULT_TABLE_NAME: &str = "containergroups";
pub const DEFAULT_RESOURCE_PROVIDER: &str = "Microsoft.ContainerInstance";
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_API_VERSION: &str = "2018-10-01";

#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub resource_provider: String,
    pub table_endpoint: String,
    pub sas_token: String,
    pub subscription_id: String,
    pub management_endpoint: String,
    pub management_token: String,
    pub api_version: String,
    pub request_timeout: u64,
    pub conditional_writes: bool,
}

impl Config {
    pub fn load_from_env() -> Result<Config, String> {
        let table_endpoint = match env::var("AZURE_TABLE_ENDPOINT") {
            Ok(endpoint) => endpoint,
            Err(_) => env::var("AZURE_STORAGE_ACCOUNT")
                .map(|account| format!("https://{}.table.core.windows.net", account))
                .map_err(|e| {
                    format!(
                        "neither AZURE_TABLE_ENDPOINT nor AZURE_STORAGE_ACCOUNT is set - {}",
                        e
                    )
                })?,
        };

        let conf = Config {
            table_name: env::var("TABLE_NAME").unwrap_or(DEFAULT_TABLE_NAME.to_string()),
            resource_provider: env::var("RESOURCE_PROVIDER")
                .unwrap_or(DEFAULT_RESOURCE_PROVIDER.to_string()),
            table_endpoint,
            sas_token: env::var("AZURE_STORAGE_SAS_TOKEN")
                .map_err(|e| format!("AZURE_STORAGE_SAS_TOKEN not set - {}", e))?,
            subscription_id: env::var("AZURE_SUBSCRIPTION_ID")
                .map_err(|e| format!("AZURE_SUBSCRIPTION_ID not set - {}", e))?,
            management_endpoint: env::var("AZURE_MANAGEMENT_ENDPOINT")
                .unwrap_or(DEFAULT_MANAGEMENT_ENDPOINT.to_string()),
            management_token: env::var("AZURE_MANAGEMENT_TOKEN")
                .map_err(|e| format!("AZURE_MANAGEMENT_TOKEN not set - {}", e))?,
            api_version: env::var("CONTAINER_INSTANCE_API_VERSION")
                .unwrap_or(DEFAULT_API_VERSION.to_string()),
            request_timeout: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or("30".to_string())
                .parse::<u64>()
                .map_err(|e| format!("Error parsing REQUEST_TIMEOUT_SECONDS to u64 - {}", e))?,
            conditional_writes: env::var("CONDITIONAL_WRITES")
                .unwrap_or("true".to_string())
                .parse::<bool>()
                .map_err(|e| format!("Error parsing CONDITIONAL_WRITES to bool - {}", e))?,
        };

        Ok(conf)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const REQUIRED: [(&str, Option<&str>); 4] = [
        ("AZURE_STORAGE_SAS_TOKEN", Some("sv=2019&sig=abc")),
        ("AZURE_SUBSCRIPTION_ID", Some("0000-1111")),
        ("AZURE_MANAGEMENT_TOKEN", Some("token")),
        ("AZURE_STORAGE_ACCOUNT", Some("acistate")),
    ];

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            REQUIRED
                .into_iter()
                .chain([
                    ("AZURE_TABLE_ENDPOINT", None),
                    ("TABLE_NAME", None),
                    ("RESOURCE_PROVIDER", None),
                    ("REQUEST_TIMEOUT_SECONDS", None),
                    ("CONDITIONAL_WRITES", None),
                ])
                .collect::<Vec<_>>(),
            || {
                let config = Config::load_from_env().unwrap();
                assert_eq!(config.table_endpoint, "https://acistate.table.core.windows.net");
                assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
                assert_eq!(config.resource_provider, DEFAULT_RESOURCE_PROVIDER);
                assert_eq!(config.management_endpoint, DEFAULT_MANAGEMENT_ENDPOINT);
                assert_eq!(config.api_version, DEFAULT_API_VERSION);
                assert_eq!(config.request_timeout, 30);
                assert!(config.conditional_writes);
            },
        );
    }

    #[test]
    fn test_explicit_endpoint_wins() {
        temp_env::with_vars(
            REQUIRED.into_iter().chain([
                ("AZURE_TABLE_ENDPOINT", Some("http://127.0.0.1:10002/devstoreaccount1")),
                ("CONDITIONAL_WRITES", Some("false")),
            ])
            .collect::<Vec<_>>(),
            || {
                let config = Config::load_from_env().unwrap();
                assert_eq!(config.table_endpoint, "http://127.0.0.1:10002/devstoreaccount1");
                assert!(!config.conditional_writes);
            },
        );
    }

    #[test]
    fn test_missing_storage_location() {
        temp_env::with_vars(
            [
                ("AZURE_STORAGE_SAS_TOKEN", Some("sv=2019&sig=abc")),
                ("AZURE_SUBSCRIPTION_ID", Some("0000-1111")),
                ("AZURE_MANAGEMENT_TOKEN", Some("token")),
                ("AZURE_STORAGE_ACCOUNT", None),
                ("AZURE_TABLE_ENDPOINT", None),
            ],
            || {
                let err = Config::load_from_env().unwrap_err();
                assert!(err.contains("AZURE_STORAGE_ACCOUNT"), "got: {}", err);
            },
        );
    }

    #[test]
    fn test_invalid_timeout() {
        temp_env::with_vars(
            REQUIRED
                .into_iter()
                .chain([("REQUEST_TIMEOUT_SECONDS", Some("soon"))])
                .collect::<Vec<_>>(),
            || {
                let err = Config::load_from_env().unwrap_err();
                assert!(err.contains("REQUEST_TIMEOUT_SECONDS"), "got: {}", err);
            },
        );
    }
}
