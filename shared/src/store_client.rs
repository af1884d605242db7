use aws_sdk_dynamodb::Client;
use tokio::sync::OnceCell;

static DYNAMODB_CLIENT: OnceCell<Client> = OnceCell::const_new();

/// Process-wide DynamoDB client. Built on first use and shared by every
/// invocation handled by this execution environment.
pub async fn dynamodb_client() -> &'static Client {
    DYNAMODB_CLIENT
        .get_or_init(|| async {
            tracing::debug!("Initializing DynamoDB client");
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Client::new(&aws_config)
        })
        .await
}
