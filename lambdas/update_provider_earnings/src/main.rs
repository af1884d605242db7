use crate::event_handler::HandlerDeps;
use event_handler::function_handler;
use lambda_runtime::{run, service_fn, tracing, Error};
use shared::{adapters::DynamoDbEarningsRepository, core::EarningsPoster, store_client};

mod config;
mod event_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();
    let config = config::Config::load()?;
    let dynamodb_client = store_client::dynamodb_client().await.clone();

    let earnings_repo = DynamoDbEarningsRepository::new(
        config.earnings_table_name,
        config.providers_table_name,
        dynamodb_client,
    );
    let earnings_poster = EarningsPoster::new(earnings_repo, config.earnings_write_mode);
    let handler_deps = HandlerDeps { earnings_poster };

    run(service_fn(|event| function_handler(&handler_deps, event))).await
}
