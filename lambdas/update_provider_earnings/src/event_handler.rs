use aws_lambda_events::{
    event::dynamodb::{Event, EventRecord},
    streams::{DynamoDbBatchItemFailure, DynamoDbEventResponse},
};
use lambda_runtime::{tracing, Error, LambdaEvent};
use serde::Deserialize;
use shared::{
    core::{Booking, BookingChange, EarningsPoster, EarningsRepository, PostingOutcome},
    error::WriteError,
};

pub(crate) struct HandlerDeps<R: EarningsRepository> {
    pub earnings_poster: EarningsPoster<R>,
}

#[derive(Deserialize)]
struct BookingKey {
    #[serde(rename = "bookingId")]
    booking_id: String,
}

#[derive(thiserror::Error, Debug)]
enum RecordError {
    #[error("stream record {event_id} has no readable bookingId key: {reason}")]
    UnreadableKey { event_id: String, reason: String },
    #[error("cannot read {image} of booking {booking_id}: {reason}")]
    UnreadableImage {
        booking_id: String,
        image: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Posting(#[from] WriteError),
}

#[tracing::instrument(skip(deps, event))]
pub(crate) async fn function_handler<R: EarningsRepository>(
    deps: &HandlerDeps<R>,
    event: LambdaEvent<Event>,
) -> Result<DynamoDbEventResponse, Error> {
    let mut response = DynamoDbEventResponse::default();

    for record in event.payload.records {
        if record.event_name != "MODIFY" {
            tracing::debug!(
                "Ignoring {} record {}",
                record.event_name,
                record.event_id
            );
            continue;
        }

        let sequence_number = record.change.sequence_number.clone();
        if let Err(e) = process_record(&deps.earnings_poster, record).await {
            tracing::error!(
                "Failed to process stream record {:?}: {}",
                sequence_number,
                e
            );
            let mut failure = DynamoDbBatchItemFailure::default();
            failure.item_identifier = sequence_number;
            response.batch_item_failures.push(failure);
            // The stream checkpoints just before the reported record and redelivers
            // everything after it, so later records are left for that retry.
            break;
        }
    }

    Ok(response)
}

async fn process_record<R: EarningsRepository>(
    earnings_poster: &EarningsPoster<R>,
    record: EventRecord,
) -> Result<(), RecordError> {
    let change = booking_change_from(record)?;
    if let PostingOutcome::Posted(earning) = earnings_poster.post(&change).await? {
        tracing::debug!(
            "Posted earning {} for booking {}",
            earning.earning_id,
            earning.booking_id
        );
    }
    Ok(())
}

fn booking_change_from(record: EventRecord) -> Result<BookingChange, RecordError> {
    let stream_record = record.change;

    let key: BookingKey =
        serde_dynamo::from_item(stream_record.keys).map_err(|e| RecordError::UnreadableKey {
            event_id: record.event_id.clone(),
            reason: e.to_string(),
        })?;

    let before: Booking = serde_dynamo::from_item(stream_record.old_image).map_err(|e| {
        RecordError::UnreadableImage {
            booking_id: key.booking_id.clone(),
            image: "OldImage",
            reason: e.to_string(),
        }
    })?;
    let after: Booking = serde_dynamo::from_item(stream_record.new_image).map_err(|e| {
        RecordError::UnreadableImage {
            booking_id: key.booking_id.clone(),
            image: "NewImage",
            reason: e.to_string(),
        }
    })?;

    Ok(BookingChange::new(key.booking_id, before, after))
}
