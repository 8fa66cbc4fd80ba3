use crate::domain::quote::{Quote, QuoteStatus};

/// A contact's quotes split by conversion relevance. `accepted` is always a
/// subset of `sent`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassifiedQuotes<'a> {
    pub accepted: Vec<&'a Quote>,
    pub sent: Vec<&'a Quote>,
}

impl ClassifiedQuotes<'_> {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }
}

pub fn classify(quotes: &[Quote]) -> ClassifiedQuotes<'_> {
    let mut classified = ClassifiedQuotes::default();

    for quote in quotes {
        if quote.status.reached_customer() {
            classified.sent.push(quote);
        }
        if quote.status == QuoteStatus::Accepted {
            classified.accepted.push(quote);
        }
    }

    classified
}
