/// Topic matching for MQTT 3.1.1
/// This module provides the core topic matching algorithm with full support
/// for single-level (+) and multi-level (#) wildcards according to the MQTT
/// specification.
use crate::error::{MqttError, Result};

/// Matches a topic name against a topic filter with wildcard support
///
/// # Arguments
/// * `topic` - The topic name to match (no wildcards allowed)
/// * `filter` - The topic filter which may contain wildcards
///
/// # Examples
/// ```
/// # use mqtt_v3::topic_matching::matches;
/// assert!(matches("sensors/42/temp", "sensors/+/temp"));
/// assert!(matches("sensors/42/temp", "sensors/#"));
/// assert!(!matches("sensors/42/humidity", "sensors/+/temp"));
/// ```
#[must_use]
pub fn matches(topic: &str, filter: &str) -> bool {
    // Empty topic doesn't match anything
    if topic.is_empty() {
        return false;
    }

    if !is_valid_topic(topic) || !is_valid_filter(filter) {
        return false;
    }

    // Fast path for exact match
    if topic == filter {
        return true;
    }

    // Fast path for # at root
    if filter == "#" {
        return true;
    }

    let topic_parts: Vec<&str> = topic.split('/').collect();
    let filter_parts: Vec<&str> = filter.split('/').collect();

    match_parts(&topic_parts, &filter_parts)
}

/// Recursive helper for matching topic parts against filter parts
fn match_parts(topic_parts: &[&str], filter_parts: &[&str]) -> bool {
    match (topic_parts.first(), filter_parts.first()) {
        // Both exhausted - match
        (None, None) => true,

        // Filter has # - matches everything remaining
        (_, Some(&"#")) => filter_parts.len() == 1, // # must be last

        // One exhausted but not both - no match
        (None, Some(_)) | (Some(_), None) => false,

        // Both have parts
        (Some(&topic_part), Some(&filter_part)) => {
            let level_match = filter_part == "+" || filter_part == topic_part;

            level_match && match_parts(&topic_parts[1..], &filter_parts[1..])
        }
    }
}

/// Validates a topic name (no wildcards allowed)
#[must_use]
pub fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && !topic.contains('\0')
        && !topic.contains('+')
        && !topic.contains('#')
        && topic.len() <= 65535
}

/// Validates a topic filter (may contain wildcards)
#[must_use]
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.contains('\0') || filter.len() > 65535 {
        return false;
    }

    let parts: Vec<&str> = filter.split('/').collect();

    for (i, part) in parts.iter().enumerate() {
        // # must be alone and last
        if part.contains('#') {
            return *part == "#" && i == parts.len() - 1;
        }

        // + must be alone in its level
        if part.contains('+') && *part != "+" {
            return false;
        }
    }

    true
}

/// Validates a topic name and returns an error if invalid
///
/// # Errors
/// Returns `MqttError::BadParameter` if the topic is invalid
pub fn validate_topic(topic: &str) -> Result<()> {
    if !is_valid_topic(topic) {
        return Err(MqttError::BadParameter(format!(
            "invalid topic name: {}",
            if topic.is_empty() {
                "empty topic"
            } else if topic.contains('+') || topic.contains('#') {
                "wildcards not allowed in topic names"
            } else if topic.contains('\0') {
                "null character not allowed"
            } else {
                "topic too long"
            }
        )));
    }
    Ok(())
}

/// Validates a topic filter and returns an error if invalid
///
/// # Errors
/// Returns `MqttError::BadParameter` if the filter is invalid
pub fn validate_filter(filter: &str) -> Result<()> {
    if !is_valid_filter(filter) {
        return Err(MqttError::BadParameter(format!(
            "invalid topic filter: {}",
            if filter.is_empty() {
                "empty filter"
            } else if filter.contains('\0') {
                "null character not allowed"
            } else if filter.len() > 65535 {
                "filter too long"
            } else {
                "invalid wildcard usage"
            }
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("sport/tennis", "sport/tennis"));
        assert!(matches("/", "/"));
        assert!(matches("sport", "sport"));
        assert!(!matches("sport", "sports"));
        assert!(!matches("sport/tennis", "sport/tennis/player1"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(matches("sport/tennis", "sport/+"));
        assert!(matches("sport/", "sport/+"));
        assert!(!matches("sport/tennis/player1", "sport/+"));

        assert!(matches("sport/tennis/player1", "sport/+/+"));
        assert!(matches("sport/tennis/player1", "+/+/+"));
        assert!(!matches("sport/tennis", "+/+/+"));

        assert!(matches("sport/tennis", "+/tennis"));
        assert!(matches("sport/tennis/player1", "sport/tennis/+"));
        assert!(matches("/tennis", "+/tennis"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(matches("sport", "sport/#"));
        assert!(matches("sport/", "sport/#"));
        assert!(matches("sport/tennis", "sport/#"));
        assert!(matches("sport/tennis/player1/ranking", "sport/#"));

        assert!(matches("sport", "#"));
        assert!(matches("sport/tennis", "#"));
        assert!(!matches("", "#")); // Empty topic never matches
        assert!(matches("/", "#"));

        assert!(!matches("sports", "sport/#"));
    }

    #[test]
    fn test_mixed_wildcards() {
        assert!(matches("sport/tennis/player1", "sport/+/#"));
        assert!(matches("sport/tennis", "sport/+/#"));
        assert!(!matches("sport", "sport/+/#"));

        assert!(matches("/finance", "+/+/#"));
        assert!(matches("/finance/stock", "+/+/#"));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(!matches("sport/tennis+", "sport/tennis+"));
        assert!(!matches("sport/tennis#", "sport/tennis#"));
        assert!(!matches("", ""));
        assert!(!matches("sport\0tennis", "sport\0tennis"));

        assert!(!matches("sport/tennis", "sport/tennis/#/extra"));
        assert!(!matches("sport/tennis", "sport/+tennis"));
        assert!(!matches("sport/tennis", "sport/#extra"));
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_topic("sport/tennis"));
        assert!(is_valid_topic("/"));

        assert!(!is_valid_topic(""));
        assert!(!is_valid_topic("sport/+"));
        assert!(!is_valid_topic("sport/#"));
        assert!(!is_valid_topic("sport\0tennis"));
        assert!(!is_valid_topic(&"a".repeat(65536)));

        assert!(is_valid_filter("sport/tennis"));
        assert!(is_valid_filter("sport/+"));
        assert!(is_valid_filter("sport/#"));
        assert!(is_valid_filter("+/+/+"));
        assert!(is_valid_filter("#"));

        assert!(!is_valid_filter(""));
        assert!(!is_valid_filter("sport/+tennis"));
        assert!(!is_valid_filter("sport/#/extra"));
        assert!(!is_valid_filter("sport/tennis#"));
    }

    #[test]
    fn test_error_messages() {
        assert!(validate_topic("sport/tennis").is_ok());
        assert_eq!(
            validate_topic("sport/+").unwrap_err().to_string(),
            "Bad parameter: invalid topic name: wildcards not allowed in topic names"
        );
        assert_eq!(
            validate_filter("sport/+tennis").unwrap_err().to_string(),
            "Bad parameter: invalid topic filter: invalid wildcard usage"
        );
    }
}
