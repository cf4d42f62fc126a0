//! Maps resource write notifications onto container group state rows.
//!
//! Each event runs one linear chain: provider filter, identity parse, table
//! bootstrap, then at most one read, one address lookup and one merge write.

use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{ResourceEvent, ResourceEventType};
use crate::identity::{ParseError, ResourceIdentity};
use crate::resolver::{AddressResolver, ResolveError};
use crate::state::{InstanceState, StateEntity, StoredEntity};
use crate::table::{StateTable, StorageError, WriteCondition};

#[derive(Error, Debug)]
pub enum ReflectError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("entity with PartitionKey {} and RowKey {} not found", .0.resource_group, .0.container_group)]
    NotFound(ResourceIdentity),
    #[error("Not updated ResourceGroup {} and ID {} since it is in state {}", .identity.resource_group, .identity.container_group, .state)]
    StaleState {
        identity: ResourceIdentity,
        state: InstanceState,
    },
    #[error(transparent)]
    Resolver(#[from] ResolveError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What a successfully reflected event did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Updated {
        identity: ResourceIdentity,
        state: InstanceState,
    },
    AlreadyRunning(ResourceIdentity),
    UnhandledProvider(String),
    UnhandledEventType(ResourceEventType),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Updated { identity, state } => write!(
                f,
                "Updated ResourceGroup {} and ID {} and State {}",
                identity.resource_group, identity.container_group, state
            ),
            Outcome::AlreadyRunning(identity) => write!(
                f,
                "Not updated ResourceGroup {} and ID {} since it is already in the running state",
                identity.resource_group, identity.container_group
            ),
            Outcome::UnhandledProvider(provider) => {
                write!(f, "Received event from RP {} was unhandled", provider)
            }
            Outcome::UnhandledEventType(event_type) => {
                write!(f, "Event with type {} arrived and was unhandled", event_type)
            }
        }
    }
}

pub struct Reflector<'a> {
    table: &'a dyn StateTable,
    resolver: &'a dyn AddressResolver,
    table_name: &'a str,
    resource_provider: &'a str,
    conditional_writes: bool,
}

impl<'a> Reflector<'a> {
    pub fn new(
        table: &'a dyn StateTable,
        resolver: &'a dyn AddressResolver,
        table_name: &'a str,
        resource_provider: &'a str,
    ) -> Self {
        Reflector {
            table,
            resolver,
            table_name,
            resource_provider,
            conditional_writes: true,
        }
    }

    /// Guard the Creating -> Running write with the etag observed on read.
    pub fn with_conditional_writes(mut self, enabled: bool) -> Self {
        self.conditional_writes = enabled;
        self
    }

    pub async fn reflect(&self, event: &ResourceEvent) -> Result<Outcome, ReflectError> {
        if event.data.resource_provider != self.resource_provider {
            return Ok(Outcome::UnhandledProvider(
                event.data.resource_provider.clone(),
            ));
        }

        let identity = ResourceIdentity::parse(&event.data.resource_uri)?;
        debug!("event {} targets {}", event.event_type, identity);

        self.table.create_table_if_absent(self.table_name).await?;

        match &event.event_type {
            ResourceEventType::WriteSuccess => self.mark_running(identity).await,
            ResourceEventType::WriteFailure | ResourceEventType::WriteCancel => {
                self.mark_failed(identity).await
            }
            other => Ok(Outcome::UnhandledEventType(other.clone())),
        }
    }

    async fn mark_running(&self, identity: ResourceIdentity) -> Result<Outcome, ReflectError> {
        let StoredEntity { entity, etag } = self
            .table
            .get(
                self.table_name,
                &identity.resource_group,
                &identity.container_group,
            )
            .await?
            .ok_or_else(|| ReflectError::NotFound(identity.clone()))?;

        match entity.current_state() {
            InstanceState::Creating => {
                let ip = self.resolver.resolve_address(&identity).await?;
                info!("container group {} is reachable at {}", identity, ip);

                let update = StateEntity::new(&identity.resource_group, &identity.container_group)
                    .with_state(InstanceState::Running)
                    .with_public_ip(ip);
                let condition = match etag {
                    Some(etag) if self.conditional_writes => WriteCondition::Matches(etag),
                    _ => WriteCondition::Exists,
                };

                self.table
                    .merge(self.table_name, &update, condition)
                    .await
                    .inspect_err(|e| {
                        if let StorageError::PreconditionFailed { .. } = e {
                            warn!("lost the race to mark {} running", identity);
                        }
                    })?;

                Ok(Outcome::Updated {
                    identity,
                    state: InstanceState::Running,
                })
            }
            // redelivered notification
            InstanceState::Running => Ok(Outcome::AlreadyRunning(identity)),
            state @ (InstanceState::Failed | InstanceState::MarkedForDeletion) => {
                Err(ReflectError::StaleState { identity, state })
            }
        }
    }

    async fn mark_failed(&self, identity: ResourceIdentity) -> Result<Outcome, ReflectError> {
        let update = StateEntity::new(&identity.resource_group, &identity.container_group)
            .with_state(InstanceState::Failed);
        self.table
            .merge(self.table_name, &update, WriteCondition::Exists)
            .await?;

        Ok(Outcome::Updated {
            identity,
            state: InstanceState::Failed,
        })
    }
}
