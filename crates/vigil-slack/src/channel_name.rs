pub const MAX_CHANNEL_NAME_CHARS: usize = 80;

/// Normalizes text into a valid Slack channel name: lowercase ASCII
/// letters, digits and single hyphens, at most 80 characters.
///
/// ```
/// use vigil_slack::sanitize_channel_name;
///
/// assert_eq!(sanitize_channel_name("Incident API Gateway_Down!"), "incident-api-gateway-down");
/// ```
pub fn sanitize_channel_name(raw: &str) -> String {
    let mut sanitized = String::with_capacity(raw.len());
    for ch in raw.trim().to_lowercase().chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' => ch,
            ' ' | '_' | '-' => '-',
            _ => continue,
        };
        if mapped == '-' && (sanitized.is_empty() || sanitized.ends_with('-')) {
            continue;
        }
        sanitized.push(mapped);
    }

    let mut sanitized = sanitized.trim_end_matches('-').to_string();
    if sanitized.len() > MAX_CHANNEL_NAME_CHARS {
        sanitized.truncate(MAX_CHANNEL_NAME_CHARS);
        sanitized = sanitized.trim_end_matches('-').to_string();
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::sanitize_channel_name;

    #[test]
    fn unit_sanitize_collapses_separators_and_drops_symbols() {
        assert_eq!(
            sanitize_channel_name("  incident--20260314 -- DB  latency!!  "),
            "incident-20260314-db-latency"
        );
        assert_eq!(sanitize_channel_name("#ops_war room"), "ops-war-room");
        assert_eq!(sanitize_channel_name("ünïcode"), "ncode");
    }

    #[test]
    fn regression_sanitize_caps_length_without_trailing_hyphen() {
        let long = format!("{}-{}", "a".repeat(79), "b".repeat(10));
        let sanitized = sanitize_channel_name(&long);
        assert_eq!(sanitized.len(), 79);
        assert!(!sanitized.ends_with('-'));
    }
}
