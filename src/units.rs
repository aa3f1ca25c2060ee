//! Billing unit calculation for SMS messages.
//!
//! A unit is the billing quantum for one message segment delivered to one
//! recipient. Both quoting and charging go through the same segment size so
//! quoted and actual costs can never diverge.

use serde::{Deserialize, Serialize};

/// Authoritative segment size in characters.
///
/// One unit covers up to this many characters per recipient. The same
/// constant is used for quoting and for charging; concatenated-message
/// overhead is deliberately not modelled separately.
pub const SEGMENT_SIZE: usize = 160;

/// Number of billable pages (segments) for a message.
///
/// Empty messages cost nothing; anything up to [`SEGMENT_SIZE`] characters is
/// one page; longer messages are billed per started segment.
#[must_use]
pub fn pages_for_message(message: &str) -> u32 {
    let len = message.chars().count();
    if len == 0 {
        return 0;
    }
    len.div_ceil(SEGMENT_SIZE) as u32
}

/// Total billing units to send `message` to `recipient_count` recipients.
#[must_use]
pub fn units_needed(message: &str, recipient_count: u32) -> u64 {
    u64::from(pages_for_message(message)) * u64::from(recipient_count)
}

/// Cost quote for a prospective send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsQuote {
    /// Segments per recipient.
    pub pages: u32,
    /// Total units across all recipients.
    pub units_needed: u64,
    /// Whether the available balance covers the send.
    pub can_send: bool,
    /// Units missing when the balance is insufficient (0 otherwise).
    pub shortfall: u64,
}

/// Quote a send against an available balance.
#[must_use]
pub fn quote(message: &str, recipient_count: u32, available_balance: u64) -> SmsQuote {
    let pages = pages_for_message(message);
    let units = units_needed(message, recipient_count);

    SmsQuote {
        pages,
        units_needed: units,
        can_send: available_balance >= units,
        shortfall: units.saturating_sub(available_balance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_costs_nothing() {
        assert_eq!(pages_for_message(""), 0);
        assert_eq!(units_needed("", 5), 0);
    }

    #[test]
    fn test_single_segment() {
        assert_eq!(pages_for_message("hello"), 1);
        assert_eq!(pages_for_message(&"a".repeat(160)), 1);
    }

    #[test]
    fn test_multi_segment_boundaries() {
        assert_eq!(pages_for_message(&"a".repeat(161)), 2);
        assert_eq!(pages_for_message(&"a".repeat(320)), 2);
        assert_eq!(pages_for_message(&"a".repeat(321)), 3);
    }

    #[test]
    fn test_units_scale_with_recipients() {
        let message = "a".repeat(200); // 2 pages
        assert_eq!(units_needed(&message, 0), 0);
        assert_eq!(units_needed(&message, 1), 2);
        assert_eq!(units_needed(&message, 3), 6);
    }

    #[test]
    fn test_multibyte_counted_as_chars() {
        // 161 characters, not bytes
        let message = "é".repeat(161);
        assert_eq!(pages_for_message(&message), 2);
    }

    #[test]
    fn test_quote_sufficient_balance() {
        let q = quote("hello", 3, 5);
        assert_eq!(q.pages, 1);
        assert_eq!(q.units_needed, 3);
        assert!(q.can_send);
        assert_eq!(q.shortfall, 0);
    }

    #[test]
    fn test_quote_shortfall() {
        let message = "a".repeat(200); // 2 pages
        let q = quote(&message, 2, 2);
        assert_eq!(q.units_needed, 4);
        assert!(!q.can_send);
        assert_eq!(q.shortfall, 2);
    }
}
