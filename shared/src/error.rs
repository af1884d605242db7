/// Failures surfaced to the trigger host. Nothing here is retried or compensated
/// locally; the Lambda runtime decides whether the invocation is redelivered.
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("failed to append earning for booking {booking_id}: {message}")]
    AppendEarning { booking_id: String, message: String },
    #[error("failed to increment total earnings for provider {provider_id}: {message}")]
    IncrementTotalEarnings { provider_id: String, message: String },
    #[error("earnings transaction failed for booking {booking_id}: {message}")]
    Transaction { booking_id: String, message: String },
    #[error("malformed booking {booking_id}: {reason}")]
    MalformedBooking { booking_id: String, reason: String },
}
