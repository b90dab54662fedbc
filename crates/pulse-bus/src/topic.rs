use pulse_core::error::BusError;
use pulse_core::types::EventType;

/// Exact topic a producer publishes one event type on.
pub fn event_topic(service: &str, event_type: EventType) -> String {
    format!("{service}/events/{event_type}")
}

/// Wildcard filter covering every event topic of one producer.
pub fn wildcard_topic(service: &str) -> String {
    format!("{service}/events/#")
}

/// A filter is either an exact topic or ends in a single trailing `#`
/// segment.
pub fn validate_filter(filter: &str) -> Result<(), BusError> {
    let invalid = || BusError::InvalidFilter {
        filter: filter.to_string(),
    };
    if filter.is_empty() {
        return Err(invalid());
    }
    match filter.find('#') {
        None => Ok(()),
        Some(pos) if pos + 1 == filter.len() && (filter == "#" || filter.ends_with("/#")) => Ok(()),
        Some(_) => Err(invalid()),
    }
}

/// MQTT-style matching: `a/b/#` matches `a/b` and any topic below it.
pub fn matches(filter: &str, topic: &str) -> bool {
    if filter == "#" {
        return true;
    }
    if let Some(prefix) = filter.strip_suffix("/#") {
        return topic == prefix
            || topic
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
    }
    filter == topic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_topic_shape() {
        assert_eq!(
            event_topic("service-a", EventType::DbSearch),
            "service-a/events/DB_SEARCH"
        );
        assert_eq!(wildcard_topic("service-a"), "service-a/events/#");
    }

    #[test]
    fn test_wildcard_matches_suffixes() {
        assert!(matches("service-a/events/#", "service-a/events/DB_SEARCH"));
        assert!(matches("service-a/events/#", "service-a/events/x/y"));
        assert!(matches("service-a/events/#", "service-a/events"));
        assert!(!matches("service-a/events/#", "service-b/events/DB_SEARCH"));
        assert!(!matches("service-a/events/#", "service-a/eventsX"));
    }

    #[test]
    fn test_exact_filter_matches_exactly() {
        assert!(matches("a/b", "a/b"));
        assert!(!matches("a/b", "a/b/c"));
    }

    #[test]
    fn test_validate_rejects_embedded_wildcards() {
        assert!(validate_filter("a/#/b").is_err());
        assert!(validate_filter("a#").is_err());
        assert!(validate_filter("").is_err());
        assert!(validate_filter("#").is_ok());
        assert!(validate_filter("a/b/#").is_ok());
        assert!(validate_filter("a/b").is_ok());
    }
}
