use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::contact::ContactId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Draft,
    Ready,
    Sent,
    Viewed,
    Accepted,
    Refused,
    Expired,
    Done,
    Archived,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 9] = [
        QuoteStatus::Draft,
        QuoteStatus::Ready,
        QuoteStatus::Sent,
        QuoteStatus::Viewed,
        QuoteStatus::Accepted,
        QuoteStatus::Refused,
        QuoteStatus::Expired,
        QuoteStatus::Done,
        QuoteStatus::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Ready => "READY",
            Self::Sent => "SENT",
            Self::Viewed => "VIEWED",
            Self::Accepted => "ACCEPTED",
            Self::Refused => "REFUSED",
            Self::Expired => "EXPIRED",
            Self::Done => "DONE",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Statuses that count toward the conversion denominator: the quote reached
    /// the customer, whatever happened afterwards.
    pub fn reached_customer(self) -> bool {
        matches!(self, Self::Sent | Self::Viewed | Self::Accepted | Self::Refused | Self::Expired)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|status| status.as_str() == normalized).ok_or_else(|| {
            DomainError::InvariantViolation(format!("unknown quote status `{value}`"))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub contact_id: ContactId,
    pub number: String,
    pub status: QuoteStatus,
    pub total: Decimal,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        use QuoteStatus::*;

        matches!(
            (self.status, next),
            (Draft, Ready)
                | (Ready, Draft)
                | (Ready, Sent)
                | (Sent, Viewed)
                | (Sent, Accepted)
                | (Sent, Refused)
                | (Sent, Expired)
                | (Viewed, Accepted)
                | (Viewed, Refused)
                | (Viewed, Expired)
                | (Accepted, Done)
        ) || (next == Archived && self.status != Archived)
    }

    /// Applies a lifecycle move. Acceptance stamps `accepted_at`; DONE keeps the
    /// stamp as purchase history, every other exit from ACCEPTED clears it.
    pub fn transition_to(
        &mut self,
        next: QuoteStatus,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidQuoteTransition { from: self.status, to: next });
        }

        match next {
            QuoteStatus::Accepted => self.accepted_at = Some(at),
            QuoteStatus::Done => {}
            _ => self.accepted_at = None,
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::contact::ContactId;
    use crate::errors::DomainError;

    use super::{Quote, QuoteId, QuoteStatus};

    fn quote(status: QuoteStatus) -> Quote {
        let now = Utc::now();
        Quote {
            id: QuoteId("Q-1".to_string()),
            contact_id: ContactId("C-1".to_string()),
            number: "DEV-2026-0001".to_string(),
            status,
            total: Decimal::new(150_000, 2),
            accepted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn walks_the_happy_path_to_done() {
        let mut quote = quote(QuoteStatus::Draft);
        let accepted_at = Utc::now();

        quote.transition_to(QuoteStatus::Ready, accepted_at).expect("draft -> ready");
        quote.transition_to(QuoteStatus::Sent, accepted_at).expect("ready -> sent");
        quote.transition_to(QuoteStatus::Viewed, accepted_at).expect("sent -> viewed");
        quote.transition_to(QuoteStatus::Accepted, accepted_at).expect("viewed -> accepted");
        assert_eq!(quote.accepted_at, Some(accepted_at));

        quote
            .transition_to(QuoteStatus::Done, accepted_at + Duration::days(3))
            .expect("accepted -> done");
        assert_eq!(quote.status, QuoteStatus::Done);
        assert_eq!(quote.accepted_at, Some(accepted_at), "done keeps purchase timestamp");
    }

    #[test]
    fn blocks_sending_a_draft() {
        let mut quote = quote(QuoteStatus::Draft);
        let error =
            quote.transition_to(QuoteStatus::Sent, Utc::now()).expect_err("draft->sent fails");
        assert_eq!(
            error,
            DomainError::InvalidQuoteTransition {
                from: QuoteStatus::Draft,
                to: QuoteStatus::Sent
            }
        );
        assert_eq!(quote.status, QuoteStatus::Draft);
    }

    #[test]
    fn archiving_an_accepted_quote_drops_the_acceptance_stamp() {
        let mut quote = quote(QuoteStatus::Accepted);
        quote.accepted_at = Some(Utc::now());

        quote.transition_to(QuoteStatus::Archived, Utc::now()).expect("accepted -> archived");
        assert_eq!(quote.accepted_at, None);
        assert!(!quote.can_transition_to(QuoteStatus::Archived));
    }

    #[test]
    fn status_parsing_is_case_insensitive_and_strict() {
        assert_eq!("viewed".parse::<QuoteStatus>().expect("parse"), QuoteStatus::Viewed);
        assert_eq!(" ACCEPTED ".parse::<QuoteStatus>().expect("parse"), QuoteStatus::Accepted);
        assert!("signed".parse::<QuoteStatus>().is_err());
    }

    #[test]
    fn only_customer_facing_statuses_reach_the_customer() {
        let reached: Vec<_> =
            QuoteStatus::ALL.into_iter().filter(|status| status.reached_customer()).collect();
        assert_eq!(
            reached,
            vec![
                QuoteStatus::Sent,
                QuoteStatus::Viewed,
                QuoteStatus::Accepted,
                QuoteStatus::Refused,
                QuoteStatus::Expired
            ]
        );
    }
}
