use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{ACCEPT, ETAG, IF_MATCH};
use reqwest::{Method, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::identity::encode_segment;
use crate::state::{StateEntity, StoredEntity};

const STORAGE_API_VERSION: &str = "2019-02-02";
const NO_METADATA: &str = "application/json;odata=nometadata";

static MERGE: Lazy<Method> =
    Lazy::new(|| Method::from_bytes(b"MERGE").expect("MERGE is a valid method token"));

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("table request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("table service returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("entity with PartitionKey {partition_key} and RowKey {row_key} was modified concurrently")]
    PreconditionFailed {
        partition_key: String,
        row_key: String,
    },
    #[error("failed to decode table entity: {0}")]
    Decode(String),
}

/// Precondition attached to a merge write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Merge into whatever version is stored; the row must still exist.
    Exists,
    /// Merge only if the stored version still carries this etag.
    Matches(String),
}

impl WriteCondition {
    fn if_match(&self) -> &str {
        match self {
            WriteCondition::Exists => "*",
            WriteCondition::Matches(etag) => etag,
        }
    }
}

/// The durable key-value table the reflector keeps its state in.
#[async_trait]
pub trait StateTable: Send + Sync {
    async fn create_table_if_absent(&self, table: &str) -> Result<(), StorageError>;

    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredEntity>, StorageError>;

    /// Merge the set columns of `entity` into the existing row. Never inserts.
    async fn merge(
        &self,
        table: &str,
        entity: &StateEntity,
        condition: WriteCondition,
    ) -> Result<(), StorageError>;
}

/// Table service REST client authenticated with a shared access signature.
#[derive(Clone)]
pub struct TableServiceClient {
    http: reqwest::Client,
    endpoint: String,
    sas_token: String,
}

impl TableServiceClient {
    pub fn new(http: reqwest::Client, endpoint: &str, sas_token: &str) -> Self {
        TableServiceClient {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            sas_token: sas_token.trim_start_matches('?').to_string(),
        }
    }

    fn entity_url(&self, table: &str, partition_key: &str, row_key: &str) -> String {
        format!(
            "{}/{}(PartitionKey='{}',RowKey='{}')?{}",
            self.endpoint,
            table,
            encode_key(partition_key),
            encode_key(row_key),
            self.sas_token
        )
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("DataServiceVersion", "3.0")
            .header(ACCEPT, NO_METADATA)
    }
}

// keys end up inside a quoted OData literal
fn encode_key(key: &str) -> String {
    encode_segment(&key.replace('\'', "''"))
}

async fn status_error(operation: &'static str, response: reqwest::Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    StorageError::Status {
        operation,
        status,
        body,
    }
}

#[async_trait]
impl StateTable for TableServiceClient {
    async fn create_table_if_absent(&self, table: &str) -> Result<(), StorageError> {
        let url = format!("{}/Tables?{}", self.endpoint, self.sas_token);
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return-no-content")
            .json(&serde_json::json!({ "TableName": table }))
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::NO_CONTENT => {
                debug!("created table {}", table);
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!("table {} already exists", table);
                Ok(())
            }
            _ => Err(status_error("create table", response).await),
        }
    }

    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredEntity>, StorageError> {
        let url = self.entity_url(table, partition_key, row_key);
        let response = self.request(Method::GET, url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = response.bytes().await?;
                let entity = serde_json::from_slice::<StateEntity>(&body)
                    .map_err(|e| StorageError::Decode(e.to_string()))?;
                Ok(Some(StoredEntity { entity, etag }))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(status_error("get entity", response).await),
        }
    }

    async fn merge(
        &self,
        table: &str,
        entity: &StateEntity,
        condition: WriteCondition,
    ) -> Result<(), StorageError> {
        let url = self.entity_url(table, &entity.partition_key, &entity.row_key);
        let response = self
            .request(MERGE.clone(), url)
            .header(IF_MATCH, condition.if_match())
            .json(entity)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::PRECONDITION_FAILED => Err(StorageError::PreconditionFailed {
                partition_key: entity.partition_key.clone(),
                row_key: entity.row_key.clone(),
            }),
            _ => Err(status_error("merge entity", response).await),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_entity_url_escapes_keys() {
        let client = TableServiceClient::new(
            reqwest::Client::new(),
            "https://account.table.core.windows.net/",
            "?sv=2019&sig=abc",
        );
        assert_eq!(
            client.entity_url("containergroups", "rg 1", "o'brien"),
            "https://account.table.core.windows.net/containergroups(PartitionKey='rg%201',RowKey='o%27%27brien')?sv=2019&sig=abc"
        );
    }

    #[test]
    fn test_if_match_header_value() {
        assert_eq!(WriteCondition::Exists.if_match(), "*");
        assert_eq!(
            WriteCondition::Matches("W/\"datetime'2024'\"".to_string()).if_match(),
            "W/\"datetime'2024'\""
        );
    }
}
