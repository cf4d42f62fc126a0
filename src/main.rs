use container_state_reflector::config;
use container_state_reflector::events::Delivery;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    container_state_reflector::set_up_logging();

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = config::Config::load_from_env()?;
    let clients = container_state_reflector::Clients::from_config(&config)?;

    info!(
        "Reflecting {} events into table {}",
        config.resource_provider, config.table_name
    );

    run(service_fn(|request: LambdaEvent<Delivery>| {
        container_state_reflector::handler(&clients, &config, request)
    }))
    .await
}
