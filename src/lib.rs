use lambda_runtime::{Error, LambdaEvent};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::reflector::{ReflectError, Reflector};

pub mod clients;
pub mod config;
pub mod events;
pub mod identity;
pub mod reflector;
pub mod resolver;
pub mod state;
pub mod table;

pub use crate::clients::Clients;

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();
}

/// Per-event result returned to the host.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub id: Option<String>,
    pub handled: bool,
    pub message: String,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Response {
    pub reports: Vec<EventReport>,
}

// lambda handler
// Every event is acknowledged; failures end up in the report and the log, never
// in the invocation result.
pub async fn handler(
    clients: &Clients,
    config: &Config,
    evt: LambdaEvent<events::Delivery>,
) -> Result<Response, Error> {
    info!("Handling lambda invocation");
    debug!("Handling event payload: {:?}", evt.payload);

    let reflector = Reflector::new(
        clients.table.as_ref(),
        clients.resolver.as_ref(),
        &config.table_name,
        &config.resource_provider,
    )
    .with_conditional_writes(config.conditional_writes);

    let mut response = Response::default();
    for decoded in evt.payload.into_events() {
        let event = match decoded {
            Ok(event) => event,
            Err(undecodable) => {
                error!("{}", undecodable.reason);
                response.reports.push(EventReport {
                    id: undecodable.id,
                    handled: false,
                    message: undecodable.reason,
                });
                continue;
            }
        };
        let report = match reflector.reflect(&event).await {
            Ok(outcome) => {
                info!(
                    operation = event.data.operation_name.as_deref().unwrap_or("-"),
                    status = event.data.status.as_deref().unwrap_or("-"),
                    "{}",
                    outcome
                );
                EventReport {
                    id: event.id,
                    handled: true,
                    message: outcome.to_string(),
                }
            }
            Err(err) => {
                match &err {
                    ReflectError::NotFound(_) | ReflectError::StaleState { .. } => {
                        warn!("{}", err)
                    }
                    _ => error!("{}", err),
                }
                EventReport {
                    id: event.id,
                    handled: false,
                    message: err.to_string(),
                }
            }
        };
        response.reports.push(report);
    }

    Ok(response)
}
