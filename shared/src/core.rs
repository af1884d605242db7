use crate::error::WriteError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cuid2::CuidConstructor;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[cfg(any(test, feature = "mocks"))]
use mockall::{automock, predicate::*};

#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait EarningsRepository: Debug {
    async fn append_earning(&self, earning: NewEarning) -> Result<Earning, WriteError>;
    async fn increment_total_earnings(
        &self,
        provider_id: &str,
        amount: f64,
    ) -> Result<(), WriteError>;
    /// Both writes in one transaction. Returns `None` when an earning for the
    /// booking already exists, in which case nothing was written.
    async fn append_and_increment(&self, earning: NewEarning)
        -> Result<Option<Earning>, WriteError>;
}

#[derive(Debug)]
pub struct CuidGenerator {
    length: u16,
}

impl CuidGenerator {
    pub fn new() -> Self {
        Self { length: 10 }
    }

    pub fn generate_id(&self) -> String {
        CuidConstructor::new().with_length(self.length).create_id()
    }
}

impl Default for CuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Other(String),
}

impl From<String> for BookingStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Confirmed" => Self::Confirmed,
            "Completed" => Self::Completed,
            "Cancelled" => Self::Cancelled,
            _ => Self::Other(value),
        }
    }
}

impl From<BookingStatus> for String {
    fn from(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Pending => "Pending".to_string(),
            BookingStatus::Confirmed => "Confirmed".to_string(),
            BookingStatus::Completed => "Completed".to_string(),
            BookingStatus::Cancelled => "Cancelled".to_string(),
            BookingStatus::Other(value) => value,
        }
    }
}

/// A booking document as seen in one side of a change. Every field is optional
/// because the document is owned by whatever workflow writes bookings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Booking {
    #[serde(default)]
    pub status: Option<BookingStatus>,
    #[serde(rename = "providerID", default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl Booking {
    pub fn is_completed(&self) -> bool {
        self.status == Some(BookingStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingChange {
    pub booking_id: String,
    pub before: Booking,
    pub after: Booking,
}

impl BookingChange {
    pub fn new(booking_id: String, before: Booking, after: Booking) -> Self {
        Self {
            booking_id,
            before,
            after,
        }
    }

    /// Edge-triggered: only the change that moves a booking into Completed counts.
    pub fn is_completion(&self) -> bool {
        !self.before.is_completed() && self.after.is_completed()
    }

    pub fn new_earning(&self) -> Result<NewEarning, WriteError> {
        let provider_id = self
            .after
            .provider_id
            .clone()
            .ok_or_else(|| self.malformed("providerID is missing"))?;
        let amount = self
            .after
            .amount
            .ok_or_else(|| self.malformed("amount is missing"))?;

        Ok(NewEarning {
            provider_id,
            booking_id: self.booking_id.clone(),
            amount,
        })
    }

    fn malformed(&self, reason: &str) -> WriteError {
        WriteError::MalformedBooking {
            booking_id: self.booking_id.clone(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEarning {
    pub provider_id: String,
    pub booking_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Earning {
    pub earning_id: String,
    pub provider_id: String,
    pub booking_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl Earning {
    pub fn new(earning_id: String, earning: NewEarning, timestamp: DateTime<Utc>) -> Self {
        Self {
            earning_id,
            provider_id: earning.provider_id,
            booking_id: earning.booking_id,
            amount: earning.amount,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Append then increment, as two independent writes.
    #[default]
    Independent,
    Transactional,
}

#[derive(Debug, PartialEq)]
pub enum PostingOutcome {
    Skipped,
    Posted(Earning),
    AlreadyPosted,
}

#[derive(Debug)]
pub struct EarningsPoster<R: EarningsRepository> {
    earnings_repo: R,
    write_mode: WriteMode,
}

impl<R: EarningsRepository> EarningsPoster<R> {
    pub fn new(earnings_repo: R, write_mode: WriteMode) -> Self {
        Self {
            earnings_repo,
            write_mode,
        }
    }

    pub async fn post(&self, change: &BookingChange) -> Result<PostingOutcome, WriteError> {
        if !change.is_completion() {
            tracing::debug!(
                "Booking {} did not transition to Completed, nothing to post",
                change.booking_id
            );
            return Ok(PostingOutcome::Skipped);
        }

        let new_earning = change.new_earning()?;

        match self.write_mode {
            WriteMode::Independent => {
                let provider_id = new_earning.provider_id.clone();
                let amount = new_earning.amount;

                let earning = self.earnings_repo.append_earning(new_earning).await?;
                self.earnings_repo
                    .increment_total_earnings(&provider_id, amount)
                    .await?;

                tracing::info!("Earnings updated for provider: {}", provider_id);
                Ok(PostingOutcome::Posted(earning))
            }
            WriteMode::Transactional => {
                match self.earnings_repo.append_and_increment(new_earning).await? {
                    Some(earning) => {
                        tracing::info!("Earnings updated for provider: {}", earning.provider_id);
                        Ok(PostingOutcome::Posted(earning))
                    }
                    None => {
                        tracing::info!(
                            "Earnings already posted for booking: {}",
                            change.booking_id
                        );
                        Ok(PostingOutcome::AlreadyPosted)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::{predicate, Sequence};

    use super::*;

    fn booking(status: &str, provider_id: &str, amount: f64) -> Booking {
        Booking {
            status: Some(BookingStatus::from(status.to_string())),
            provider_id: Some(provider_id.to_string()),
            amount: Some(amount),
        }
    }

    fn change(before: &str, after: &str) -> BookingChange {
        BookingChange::new(
            "B1".to_string(),
            booking(before, "P1", 50.0),
            booking(after, "P1", 50.0),
        )
    }

    fn earning_from(earning: NewEarning) -> Earning {
        Earning::new("earning-1".to_string(), earning, Utc::now())
    }

    #[test]
    fn status_round_trips_unknown_values_verbatim() {
        let status: BookingStatus = serde_json::from_str("\"AwaitingReview\"").unwrap();
        assert_eq!(status, BookingStatus::Other("AwaitingReview".to_string()));
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            "\"AwaitingReview\""
        );

        let status: BookingStatus = serde_json::from_str("\"Completed\"").unwrap();
        assert_eq!(status, BookingStatus::Completed);
    }

    #[test]
    fn only_the_edge_into_completed_is_a_completion() {
        assert!(change("Pending", "Completed").is_completion());
        assert!(change("Cancelled", "Completed").is_completion());
        assert!(!change("Pending", "Pending").is_completion());
        assert!(!change("Pending", "Confirmed").is_completion());
        assert!(!change("Completed", "Completed").is_completion());
        assert!(!change("Completed", "Pending").is_completion());
    }

    #[test]
    fn missing_previous_status_counts_as_not_completed() {
        let change = BookingChange::new(
            "B1".to_string(),
            Booking::default(),
            booking("Completed", "P1", 50.0),
        );
        assert!(change.is_completion());
    }

    #[test]
    fn status_is_case_sensitive() {
        assert!(!change("Pending", "completed").is_completion());
    }

    #[tokio::test]
    async fn when_booking_completes_should_append_then_increment() {
        let mut seq = Sequence::new();
        let mut earnings_repo = MockEarningsRepository::new();
        earnings_repo
            .expect_append_earning()
            .with(predicate::eq(NewEarning {
                provider_id: "P1".to_string(),
                booking_id: "B1".to_string(),
                amount: 50.0,
            }))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|earning| Ok(earning_from(earning)));
        earnings_repo
            .expect_increment_total_earnings()
            .with(predicate::eq("P1"), predicate::eq(50.0))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        earnings_repo.expect_append_and_increment().times(0);

        let poster = EarningsPoster::new(earnings_repo, WriteMode::Independent);

        let outcome = poster.post(&change("Pending", "Completed")).await.unwrap();

        match outcome {
            PostingOutcome::Posted(earning) => {
                assert_eq!(earning.provider_id, "P1");
                assert_eq!(earning.booking_id, "B1");
                assert_eq!(earning.amount, 50.0);
            }
            other => panic!("expected a posted earning, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn when_transition_is_not_a_completion_should_not_write() {
        for (before, after) in [
            ("Pending", "Pending"),
            ("Pending", "Cancelled"),
            ("Completed", "Completed"),
            ("Completed", "Pending"),
        ] {
            let mut earnings_repo = MockEarningsRepository::new();
            earnings_repo.expect_append_earning().times(0);
            earnings_repo.expect_increment_total_earnings().times(0);
            earnings_repo.expect_append_and_increment().times(0);

            let poster = EarningsPoster::new(earnings_repo, WriteMode::Independent);

            let outcome = poster.post(&change(before, after)).await.unwrap();
            assert_eq!(outcome, PostingOutcome::Skipped);
        }
    }

    #[tokio::test]
    async fn when_append_fails_should_not_increment() {
        let mut earnings_repo = MockEarningsRepository::new();
        earnings_repo
            .expect_append_earning()
            .times(1)
            .returning(|earning| {
                Err(WriteError::AppendEarning {
                    booking_id: earning.booking_id,
                    message: "DB error".to_string(),
                })
            });
        earnings_repo.expect_increment_total_earnings().times(0);

        let poster = EarningsPoster::new(earnings_repo, WriteMode::Independent);

        let result = poster.post(&change("Pending", "Completed")).await;

        assert!(matches!(result, Err(WriteError::AppendEarning { .. })));
    }

    #[tokio::test]
    async fn when_increment_fails_should_surface_the_error() {
        let mut earnings_repo = MockEarningsRepository::new();
        earnings_repo
            .expect_append_earning()
            .times(1)
            .returning(|earning| Ok(earning_from(earning)));
        earnings_repo
            .expect_increment_total_earnings()
            .times(1)
            .returning(|provider_id, _| {
                Err(WriteError::IncrementTotalEarnings {
                    provider_id: provider_id.to_string(),
                    message: "DB error".to_string(),
                })
            });

        let poster = EarningsPoster::new(earnings_repo, WriteMode::Independent);

        let result = poster.post(&change("Pending", "Completed")).await;

        assert!(matches!(
            result,
            Err(WriteError::IncrementTotalEarnings { .. })
        ));
    }

    #[tokio::test]
    async fn when_completed_booking_has_no_provider_should_fail_without_writing() {
        let mut earnings_repo = MockEarningsRepository::new();
        earnings_repo.expect_append_earning().times(0);
        earnings_repo.expect_increment_total_earnings().times(0);

        let poster = EarningsPoster::new(earnings_repo, WriteMode::Independent);
        let change = BookingChange::new(
            "B1".to_string(),
            booking("Pending", "P1", 50.0),
            Booking {
                status: Some(BookingStatus::Completed),
                provider_id: None,
                amount: Some(50.0),
            },
        );

        let result = poster.post(&change).await;

        assert!(matches!(result, Err(WriteError::MalformedBooking { .. })));
    }

    #[tokio::test]
    async fn when_transactional_should_use_a_single_write() {
        let mut earnings_repo = MockEarningsRepository::new();
        earnings_repo.expect_append_earning().times(0);
        earnings_repo.expect_increment_total_earnings().times(0);
        earnings_repo
            .expect_append_and_increment()
            .times(1)
            .returning(|earning| Ok(Some(earning_from(earning))));

        let poster = EarningsPoster::new(earnings_repo, WriteMode::Transactional);

        let outcome = poster.post(&change("Pending", "Completed")).await.unwrap();

        assert!(matches!(outcome, PostingOutcome::Posted(_)));
    }

    #[tokio::test]
    async fn when_transactional_and_already_recorded_should_report_already_posted() {
        let mut earnings_repo = MockEarningsRepository::new();
        earnings_repo
            .expect_append_and_increment()
            .times(1)
            .returning(|_| Ok(None));

        let poster = EarningsPoster::new(earnings_repo, WriteMode::Transactional);

        let outcome = poster.post(&change("Pending", "Completed")).await.unwrap();

        assert_eq!(outcome, PostingOutcome::AlreadyPosted);
    }

    #[test]
    fn generated_ids_have_the_configured_length() {
        let id = CuidGenerator::new().generate_id();
        assert_eq!(id.len(), 10);
    }
}
