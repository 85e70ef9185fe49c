//! Message texts and phone-number helpers.

use crate::geo::Coordinate;

pub const MAX_SMS_LENGTH: usize = 160;
const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;

pub fn emergency_text(location: &Coordinate, address: Option<&str>) -> String {
    let mut text = String::from("EMERGENCY ALERT\n\nI need help right now!\n\n");
    if let Some(address) = address {
        text.push_str(&format!("Location: {}\n\n", address));
    }
    text.push_str(&format!("Map:\n{}\n\nPlease call me immediately!", location.maps_url()));
    text
}

pub fn journey_start_text(
    start_address: Option<&str>,
    destination_address: Option<&str>,
    expected_minutes: Option<i32>,
) -> String {
    let mut text = String::from("Safe journey\n\nI just started a safe journey.\n\n");
    if let Some(from) = start_address {
        text.push_str(&format!("From: {}\n", from));
    }
    if let Some(to) = destination_address {
        text.push_str(&format!("To: {}\n", to));
    }
    if let Some(minutes) = expected_minutes {
        text.push_str(&format!("\nExpected time: {} min\n", minutes));
    }
    text.push_str("\nI will let you know when I arrive.");
    text
}

pub fn journey_complete_text(destination_address: Option<&str>) -> String {
    let mut text = String::from("Arrived safely\n\n");
    if let Some(address) = destination_address {
        text.push_str(&format!("Location: {}\n\n", address));
    }
    text.push_str("Thanks for following along!");
    text
}

pub fn deviation_text(location: &Coordinate) -> String {
    format!(
        "ROUTE DEVIATION ALERT\n\nI have left the planned route.\n\nMy location now:\n{}",
        location.maps_url()
    )
}

pub fn stopped_text(location: &Coordinate, stopped_minutes: i64) -> String {
    format!(
        "STOPPED ALERT\n\nI have not moved for {} min.\n\nMy location now:\n{}",
        stopped_minutes,
        location.maps_url()
    )
}

pub fn unsafe_zone_text(location: &Coordinate, score: i32) -> String {
    format!(
        "UNSAFE AREA WARNING\n\nI am passing through an area with safety score {}/100.\n\nMy location now:\n{}",
        score,
        location.maps_url()
    )
}

/// Strips spaces, dashes and parentheses.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect()
}

/// Optional leading `+`, then 10 to 15 digits.
pub fn is_valid_phone(raw: &str) -> bool {
    let phone = normalize_phone(raw);
    let digits = phone.strip_prefix('+').unwrap_or(&phone);
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Number of 160-character segments needed for `text`.
pub fn sms_parts(text: &str) -> usize {
    let len = text.chars().count();
    if len <= MAX_SMS_LENGTH {
        1
    } else {
        len.div_ceil(MAX_SMS_LENGTH)
    }
}
