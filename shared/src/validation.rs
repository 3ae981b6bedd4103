//! Validation utilities for the Waste Collection Management Platform

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Validate a phone number: optional leading `+`, then 8 to 15 digits.
/// Spaces, dots and dashes are ignored.
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if body
        .chars()
        .any(|c| !(c.is_ascii_digit() || c == ' ' || c == '-' || c == '.'))
    {
        return Err("Phone number may only contain digits, spaces, dots and dashes");
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(8..=15).contains(&digits) {
        return Err("Phone number must have between 8 and 15 digits");
    }
    Ok(())
}

// ============================================================================
// Registry Validations
// ============================================================================

/// Validate zone code format (2-20 uppercase alphanumeric, dashes allowed)
pub fn validate_zone_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 || code.len() > 20 {
        return Err("Zone code must be between 2 and 20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Zone code must be uppercase alphanumeric");
    }
    Ok(())
}

/// Validate a map display colour in `#rrggbb` form
pub fn validate_hex_color(color: &str) -> Result<(), &'static str> {
    match color.strip_prefix('#') {
        Some(hex) if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) => Ok(()),
        _ => Err("Colour must be in #rrggbb format"),
    }
}

/// Validate GPS coordinates
pub fn validate_coordinates(latitude: Decimal, longitude: Decimal) -> Result<(), &'static str> {
    if latitude < Decimal::from(-90) || latitude > Decimal::from(90) {
        return Err("Latitude must be between -90 and 90");
    }
    if longitude < Decimal::from(-180) || longitude > Decimal::from(180) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}

/// Validate that a planned time window ends after it starts
pub fn validate_time_window(start: NaiveTime, end: NaiveTime) -> Result<(), &'static str> {
    if end <= start {
        return Err("End time must be after start time");
    }
    Ok(())
}

/// Validate that a date range is not inverted
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), &'static str> {
    if end < start {
        return Err("End date must not be before start date");
    }
    Ok(())
}

// ============================================================================
// Billing Validations
// ============================================================================

/// Money and rates are stored with two decimals
pub fn validate_money_precision(value: Decimal) -> Result<(), &'static str> {
    if value.round_dp(2) != value {
        return Err("Value cannot have more than 2 decimal places");
    }
    Ok(())
}

/// Validate a tax rate expressed in percent
pub fn validate_tax_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate < Decimal::ZERO || rate > Decimal::from(100) {
        return Err("Tax rate must be between 0 and 100%");
    }
    validate_money_precision(rate)
}

/// Validate a money amount that must be strictly positive
pub fn validate_positive_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount <= Decimal::ZERO {
        return Err("Amount must be positive");
    }
    if amount.round_dp(2) != amount {
        return Err("Amount cannot have more than 2 decimal places");
    }
    Ok(())
}

/// Validate a 1-5 client satisfaction score
pub fn validate_satisfaction_score(score: i32) -> Result<(), &'static str> {
    if !(1..=5).contains(&score) {
        return Err("Satisfaction score must be between 1 and 5");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("agent@ete.bf").is_ok());
        assert!(validate_email("a.b@mail.example.com").is_ok());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("@ete.bf").is_err());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("user@.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("s3cretpass").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+226 70 12 34 56").is_ok());
        assert!(validate_phone("70-12-34-56").is_ok());
        assert!(validate_phone("1234567").is_err());
        assert!(validate_phone("+226 70 AB 34 56").is_err());
    }

    #[test]
    fn test_validate_zone_code() {
        assert!(validate_zone_code("OUA-01").is_ok());
        assert!(validate_zone_code("Z").is_err());
        assert!(validate_zone_code("zone1").is_err());
    }

    #[test]
    fn test_validate_hex_color() {
        assert!(validate_hex_color("#1e3a8a").is_ok());
        assert!(validate_hex_color("#FFFFFF").is_ok());
        assert!(validate_hex_color("1e3a8a").is_err());
        assert!(validate_hex_color("#1e3a8").is_err());
        assert!(validate_hex_color("#1e3a8g").is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(dec("12.3714"), dec("-1.5197")).is_ok());
        assert!(validate_coordinates(dec("91"), dec("0")).is_err());
        assert!(validate_coordinates(dec("0"), dec("-180.5")).is_err());
    }

    #[test]
    fn test_validate_time_window() {
        let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert!(validate_time_window(eight, noon).is_ok());
        assert!(validate_time_window(noon, eight).is_err());
        assert!(validate_time_window(noon, noon).is_err());
    }

    #[test]
    fn test_validate_tax_rate() {
        assert!(validate_tax_rate(dec("18.00")).is_ok());
        assert!(validate_tax_rate(Decimal::ZERO).is_ok());
        assert!(validate_tax_rate(dec("-1")).is_err());
        assert!(validate_tax_rate(dec("100.01")).is_err());
        assert!(validate_tax_rate(dec("18.125")).is_err());
        assert!(validate_tax_rate(dec("18.500")).is_ok());
    }

    #[test]
    fn test_validate_positive_amount() {
        assert!(validate_positive_amount(dec("14160.00")).is_ok());
        assert!(validate_positive_amount(Decimal::ZERO).is_err());
        assert!(validate_positive_amount(dec("-5")).is_err());
        assert!(validate_positive_amount(dec("10.005")).is_err());
        assert!(validate_positive_amount(dec("10.000")).is_ok());
    }

    #[test]
    fn test_validate_satisfaction_score() {
        assert!(validate_satisfaction_score(1).is_ok());
        assert!(validate_satisfaction_score(5).is_ok());
        assert!(validate_satisfaction_score(0).is_err());
        assert!(validate_satisfaction_score(6).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any whole number of cents is accepted as money
        #[test]
        fn test_cent_amounts_are_accepted(cents in 1i64..1_000_000_000_000) {
            prop_assert!(validate_positive_amount(Decimal::new(cents, 2)).is_ok());
            prop_assert!(validate_money_precision(Decimal::new(cents, 2)).is_ok());
        }

        /// A non-zero third decimal is always rejected
        #[test]
        fn test_sub_cent_values_are_rejected(cents in 0i64..1_000_000_000, mills in 1i64..10) {
            let value = Decimal::new(cents * 10 + mills, 3);
            prop_assert!(validate_money_precision(value).is_err());
            prop_assert!(validate_positive_amount(value).is_err());
        }

        /// Separators never change whether a phone number is valid
        #[test]
        fn test_phone_separators_are_ignored(digits in "[0-9]{8,15}", sep in "[ .-]") {
            let spaced: String = digits
                .chars()
                .enumerate()
                .flat_map(|(i, c)| {
                    let lead = (i > 0 && i % 2 == 0).then(|| sep.chars().next()).flatten();
                    lead.into_iter().chain(std::iter::once(c))
                })
                .collect();
            prop_assert!(validate_phone(&digits).is_ok());
            prop_assert!(validate_phone(&spaced).is_ok());
            let international = format!("+{}", spaced);
            prop_assert!(validate_phone(&international).is_ok());
        }

        /// Dates accepted as a range are never reversed
        #[test]
        fn test_date_range_order(offset in -400i64..400) {
            let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
            let end = start + chrono::Duration::days(offset);
            prop_assert_eq!(validate_date_range(start, end).is_ok(), offset >= 0);
        }
    }
}
