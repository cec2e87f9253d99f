/// Reuse fingerprint for session deduplication (spec.md §4.6): two
/// deliveries that land on the same tenant, trigger, repository/channel,
/// and subject (PR/issue number or Slack thread) are considered the same
/// logical conversation and may share a session when the trigger's
/// `reuse_session` flag is set.
pub fn compute(
    tenant_id: &str,
    trigger_id: &str,
    repository_or_channel: Option<&str>,
    subject_key: Option<&str>,
) -> String {
    format!(
        "{tenant_id}:{trigger_id}:{}:{}",
        repository_or_channel.unwrap_or("-"),
        subject_key.unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_identical_fingerprints() {
        let a = compute("t1", "trig1", Some("acme/widgets"), Some("42"));
        let b = compute("t1", "trig1", Some("acme/widgets"), Some("42"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_subjects_produce_different_fingerprints() {
        let a = compute("t1", "trig1", Some("acme/widgets"), Some("42"));
        let b = compute("t1", "trig1", Some("acme/widgets"), Some("43"));
        assert_ne!(a, b);
    }

    #[test]
    fn missing_fields_fall_back_to_placeholder() {
        let a = compute("t1", "trig1", None, None);
        assert_eq!(a, "t1:trig1:-:-");
    }
}
