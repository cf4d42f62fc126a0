use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::identity::{encode_segment, ResourceIdentity};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("address lookup request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("container group {0} not found")]
    NotFound(ResourceIdentity),
    #[error("not authorized to read container group {identity} ({status})")]
    Unauthorized {
        identity: ResourceIdentity,
        status: StatusCode,
    },
    #[error("resource manager returned {status} for container group {identity}: {body}")]
    Status {
        identity: ResourceIdentity,
        status: StatusCode,
        body: String,
    },
    #[error("container group {0} has no public ip address")]
    NoAddress(ResourceIdentity),
}

/// Looks up the current public address of a container group.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve_address(&self, identity: &ResourceIdentity) -> Result<String, ResolveError>;
}

#[derive(Deserialize, Debug)]
struct ContainerGroup {
    #[serde(default)]
    properties: Option<ContainerGroupProperties>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ContainerGroupProperties {
    #[serde(default)]
    ip_address: Option<IpAddress>,
}

#[derive(Deserialize, Debug)]
struct IpAddress {
    #[serde(default)]
    ip: Option<String>,
}

/// Resolves addresses through the resource manager container group endpoint.
#[derive(Clone)]
pub struct ArmAddressResolver {
    http: reqwest::Client,
    endpoint: String,
    subscription_id: String,
    api_version: String,
    token: String,
}

impl ArmAddressResolver {
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        subscription_id: &str,
        api_version: &str,
        token: &str,
    ) -> Self {
        ArmAddressResolver {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            api_version: api_version.to_string(),
            token: token.to_string(),
        }
    }

    fn container_group_url(&self, identity: &ResourceIdentity) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerInstance/containerGroups/{}?api-version={}",
            self.endpoint,
            encode_segment(&self.subscription_id),
            encode_segment(&identity.resource_group),
            encode_segment(&identity.container_group),
            self.api_version
        )
    }
}

#[async_trait]
impl AddressResolver for ArmAddressResolver {
    async fn resolve_address(&self, identity: &ResourceIdentity) -> Result<String, ResolveError> {
        let url = self.container_group_url(identity);
        debug!("resolving address of {} via {}", identity, url);

        let response = self.http.get(url).bearer_auth(&self.token).send().await?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => return Err(ResolveError::NotFound(identity.clone())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ResolveError::Unauthorized {
                    identity: identity.clone(),
                    status,
                })
            }
            _ => {
                return Err(ResolveError::Status {
                    identity: identity.clone(),
                    status,
                    body: response.text().await.unwrap_or_default(),
                })
            }
        }

        let group: ContainerGroup = response.json().await?;
        group
            .properties
            .and_then(|p| p.ip_address)
            .and_then(|a| a.ip)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| ResolveError::NoAddress(identity.clone()))
    }
}
