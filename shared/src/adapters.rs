use crate::{
    core::{CuidGenerator, Earning, EarningsRepository, NewEarning},
    error::WriteError,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    operation::transact_write_items::TransactWriteItemsError,
    types::{
        error::TransactionCanceledException, AttributeValue, Put, TransactWriteItem, Update,
    },
    Client,
};
use chrono::Utc;
use std::collections::HashMap;

const EARNING_ID: &str = "earningId";
const PROVIDER_ID: &str = "providerID";
const BOOKING_ID: &str = "bookingID";

const INCREMENT_TOTAL_EARNINGS: &str = "ADD totalEarnings :amount";
const PROVIDER_EXISTS: &str = "attribute_exists(providerID)";
const EARNING_NOT_EXISTS: &str = "attribute_not_exists(earningId)";

#[derive(Debug)]
pub struct DynamoDbEarningsRepository {
    earnings_table_name: String,
    providers_table_name: String,
    dynamodb_client: Client,
    id_generator: CuidGenerator,
}

impl DynamoDbEarningsRepository {
    pub fn new(
        earnings_table_name: String,
        providers_table_name: String,
        dynamodb_client: Client,
    ) -> Self {
        Self {
            earnings_table_name,
            providers_table_name,
            dynamodb_client,
            id_generator: CuidGenerator::new(),
        }
    }
}

#[async_trait]
impl EarningsRepository for DynamoDbEarningsRepository {
    async fn append_earning(&self, earning: NewEarning) -> Result<Earning, WriteError> {
        // DynamoDB has no server-side timestamp, so the store layer stamps the
        // record right before the write is issued.
        let earning = Earning::new(self.id_generator.generate_id(), earning, Utc::now());

        let result = self
            .dynamodb_client
            .put_item()
            .table_name(&self.earnings_table_name)
            .set_item(Some(earning_item(&earning)))
            .condition_expression(EARNING_NOT_EXISTS)
            .send()
            .await;

        match result {
            Ok(_) => Ok(earning),
            Err(e) => Err(WriteError::AppendEarning {
                booking_id: earning.booking_id,
                message: format!("Error adding item: {:?}", e),
            }),
        }
    }

    async fn increment_total_earnings(
        &self,
        provider_id: &str,
        amount: f64,
    ) -> Result<(), WriteError> {
        self.dynamodb_client
            .update_item()
            .table_name(&self.providers_table_name)
            .key(PROVIDER_ID, AttributeValue::S(provider_id.to_string()))
            .update_expression(INCREMENT_TOTAL_EARNINGS)
            .condition_expression(PROVIDER_EXISTS)
            .expression_attribute_values(":amount", AttributeValue::N(amount.to_string()))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| WriteError::IncrementTotalEarnings {
                provider_id: provider_id.to_string(),
                message: format!("Error incrementing totalEarnings: {:?}", e),
            })
    }

    async fn append_and_increment(
        &self,
        earning: NewEarning,
    ) -> Result<Option<Earning>, WriteError> {
        // Keyed on the booking so a redelivered completion collides with the first one.
        let earning_id = format!("booking#{}", earning.booking_id);
        let earning = Earning::new(earning_id, earning, Utc::now());
        let booking_id = earning.booking_id.clone();
        let transaction_error = |message: String| WriteError::Transaction {
            booking_id: booking_id.clone(),
            message,
        };

        let put = Put::builder()
            .table_name(&self.earnings_table_name)
            .set_item(Some(earning_item(&earning)))
            .condition_expression(EARNING_NOT_EXISTS)
            .build()
            .map_err(|e| transaction_error(format!("Error building put: {:?}", e)))?;

        let update = Update::builder()
            .table_name(&self.providers_table_name)
            .key(PROVIDER_ID, AttributeValue::S(earning.provider_id.clone()))
            .update_expression(INCREMENT_TOTAL_EARNINGS)
            .condition_expression(PROVIDER_EXISTS)
            .expression_attribute_values(":amount", AttributeValue::N(earning.amount.to_string()))
            .build()
            .map_err(|e| transaction_error(format!("Error building update: {:?}", e)))?;

        let result = self
            .dynamodb_client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put).build())
            .transact_items(TransactWriteItem::builder().update(update).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(Some(earning)),
            Err(e) => {
                let generic_err_msg = format!("Error writing transaction: {:?}", e);
                match e.into_service_error() {
                    TransactWriteItemsError::TransactionCanceledException(cancelled)
                        if earning_already_exists(&cancelled) =>
                    {
                        Ok(None)
                    }
                    _ => Err(transaction_error(generic_err_msg)),
                }
            }
        }
    }
}

/// The put is the first item of the transaction, so its cancellation reason
/// comes first.
fn earning_already_exists(cancelled: &TransactionCanceledException) -> bool {
    cancelled
        .cancellation_reasons()
        .first()
        .and_then(|reason| reason.code())
        == Some("ConditionalCheckFailed")
}

fn earning_item(earning: &Earning) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            EARNING_ID.to_string(),
            AttributeValue::S(earning.earning_id.clone()),
        ),
        (
            PROVIDER_ID.to_string(),
            AttributeValue::S(earning.provider_id.clone()),
        ),
        (
            BOOKING_ID.to_string(),
            AttributeValue::S(earning.booking_id.clone()),
        ),
        (
            "amount".to_string(),
            AttributeValue::N(earning.amount.to_string()),
        ),
        (
            "timestamp".to_string(),
            AttributeValue::S(earning.timestamp.to_rfc3339()),
        ),
    ])
}
