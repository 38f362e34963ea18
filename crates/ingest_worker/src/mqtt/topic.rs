use common::domain::{DeviceClass, DomainError, DomainResult};

/// Parsed telemetry topic.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub root: String,
    pub class: DeviceClass,
}

/// Parse a telemetry topic in the format `{root}/{device_class}/telemetry`,
/// where the device class segment is one of `tag`, `active` or `sense`.
///
/// # Examples
/// ```
/// use common::domain::DeviceClass;
/// use ingest_worker::mqtt::parse_topic;
///
/// let parsed = parse_topic("pettrack/tag/telemetry").unwrap();
/// assert_eq!(parsed.root, "pettrack");
/// assert_eq!(parsed.class, DeviceClass::Tag);
/// ```
pub fn parse_topic(topic: &str) -> DomainResult<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();

    if parts.len() != 3 || parts[2] != "telemetry" {
        return Err(DomainError::InvalidTopic(format!(
            "invalid topic '{}': expected '{{root}}/{{device_class}}/telemetry'",
            topic
        )));
    }

    let root = parts[0].trim();
    if root.is_empty() {
        return Err(DomainError::InvalidTopic(
            "topic root cannot be empty".to_string(),
        ));
    }

    let class = DeviceClass::from_topic_segment(parts[1].trim())?;

    Ok(ParsedTopic {
        root: root.to_string(),
        class,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_topic() {
        let parsed = parse_topic("pettrack/tag/telemetry").unwrap();
        assert_eq!(parsed.root, "pettrack");
        assert_eq!(parsed.class, DeviceClass::Tag);
    }

    #[test]
    fn test_parse_each_device_class() {
        assert_eq!(
            parse_topic("pettrack/active/telemetry").unwrap().class,
            DeviceClass::Active
        );
        assert_eq!(
            parse_topic("pettrack/sense/telemetry").unwrap().class,
            DeviceClass::Sense
        );
    }

    #[test]
    fn test_unknown_device_class_is_rejected() {
        let err = parse_topic("pettrack/collar/telemetry").unwrap_err();
        assert!(matches!(err, DomainError::UnknownDeviceClass(class) if class == "collar"));
    }

    #[test]
    fn test_wrong_segment_count_is_rejected() {
        assert!(matches!(
            parse_topic("pettrack/tag"),
            Err(DomainError::InvalidTopic(_))
        ));
        assert!(matches!(
            parse_topic("pettrack/tag/telemetry/extra"),
            Err(DomainError::InvalidTopic(_))
        ));
    }

    #[test]
    fn test_wrong_suffix_is_rejected() {
        assert!(matches!(
            parse_topic("pettrack/tag/commands"),
            Err(DomainError::InvalidTopic(_))
        ));
    }

    #[test]
    fn test_empty_root_is_rejected() {
        assert!(matches!(
            parse_topic("/tag/telemetry"),
            Err(DomainError::InvalidTopic(_))
        ));
    }
}
