//! Id, timestamp and completion-parsing helpers.

pub mod json;
pub mod timestamps;

pub use json::{extract_json, parse_llm_json, require_keys, to_content, ResponseFormatError};
pub use timestamps::{iso_timestamp, now_millis, now_utc, Timestamp};

use uuid::Uuid;

/// Generates a random UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a time-ordered UUID v7.
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Builds the id of an adjusted artifact: `adj_<original>_<millis>`.
#[must_use]
pub fn adjustment_id(original_id: &str, timestamp_millis: i64) -> String {
    format!("adj_{original_id}_{timestamp_millis}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_valid() {
        assert_eq!(generate_uuid().get_version_num(), 4);
        assert_eq!(generate_uuid_v7().get_version_num(), 7);
    }

    #[test]
    fn test_adjustment_id() {
        assert_eq!(adjustment_id("plan-7", 1_700_000_000_000), "adj_plan-7_1700000000000");
    }
}
