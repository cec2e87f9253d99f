use crate::glob_match::{glob_matches, repository_matches};
use crate::model::{Conditions, Trigger};
use crate::payload::Envelope;
use crate::template;

/// Evaluate a tenant's ordered trigger list against a payload envelope and
/// return the first match under priority ordering with stop-on-match
/// semantics (spec.md §4.3).
///
/// Triggers are stably sorted by ascending `priority`; ties preserve
/// declaration order (`Vec::sort_by` is a stable sort, so this falls out
/// of sorting by priority alone — no secondary key needed). Disabled
/// triggers are skipped. The current receiver set always halts on the
/// first satisfied trigger: `stop_on_match=false` is reserved for future
/// fan-out (spec.md §4.3, §9 Open Questions) but does not change today's
/// single-match behavior.
pub fn find_match<'a>(triggers: &'a [Trigger], envelope: &Envelope) -> Option<&'a Trigger> {
    let mut ordered: Vec<&Trigger> = triggers.iter().filter(|t| t.enabled).collect();
    ordered.sort_by_key(|t| t.priority);

    ordered
        .into_iter()
        .find(|trigger| trigger.conditions.platform() == envelope.platform && matches(trigger, envelope))
}

fn matches(trigger: &Trigger, envelope: &Envelope) -> bool {
    match &trigger.conditions {
        Conditions::GitHub(c) => {
            set_matches(&c.events, &envelope.event_type)
                && envelope
                    .action
                    .as_deref()
                    .map(|a| set_matches(&c.actions, a))
                    .unwrap_or_else(|| c.actions.is_empty())
                && branch_matches(&c.branches, envelope.branch_name().as_deref())
                && branch_matches(&c.base_branches, envelope.base_branch_name().as_deref())
                && repo_matches(&c.repositories, envelope.repository.as_ref().map(|r| r.full_name.as_str()))
                && labels_match(&c.labels, &envelope.labels())
                && sender_matches(&c.senders, envelope.sender.as_ref().map(|s| s.login.as_str()))
                && draft_matches(c.draft, envelope.draft())
                && paths_match(&c.paths, &envelope.changed_paths())
        }
        Conditions::Slack(c) => {
            set_matches(&c.event_types, &envelope.event_type)
                && set_matches(&c.channel_ids, envelope.channel_id.as_deref().unwrap_or(""))
        }
        Conditions::Custom(c) => custom_matches(c, envelope),
    }
}

/// An empty/absent list means "no restriction on this dimension".
fn set_matches(allowed: &[String], value: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|v| v == value)
}

fn branch_matches(patterns: &[String], branch: Option<&str>) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let Some(branch) = branch else {
        return false;
    };
    patterns.iter().any(|p| glob_matches(p, branch))
}

fn repo_matches(patterns: &[String], repo: Option<&str>) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let Some(repo) = repo else {
        return false;
    };
    patterns.iter().any(|p| repository_matches(p, repo))
}

/// Trigger matches if **any** configured label appears in the payload.
fn labels_match(configured: &[String], actual: &[String]) -> bool {
    if configured.is_empty() {
        return true;
    }
    configured.iter().any(|label| actual.contains(label))
}

fn sender_matches(allowed: &[String], sender: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(sender) = sender else {
        return false;
    };
    allowed.iter().any(|s| s == sender)
}

fn draft_matches(configured: Option<bool>, actual: Option<bool>) -> bool {
    match configured {
        None => true,
        Some(expected) => actual == Some(expected),
    }
}

/// Union of changed paths must contain at least one match against any
/// configured pattern.
fn paths_match(patterns: &[String], changed: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    changed
        .iter()
        .any(|path| patterns.iter().any(|p| glob_matches(p, path)))
}

fn custom_matches(conditions: &crate::model::CustomConditions, envelope: &Envelope) -> bool {
    if conditions.template.trim().is_empty() {
        return false;
    }
    let data = template::TemplateData::from_envelope(envelope);
    match template::render(&conditions.template, &data) {
        Ok(rendered) => is_truthy(&rendered),
        Err(_) => false,
    }
}

fn is_truthy(rendered: &str) -> bool {
    !matches!(
        rendered.trim().to_lowercase().as_str(),
        "" | "false" | "0" | "null" | "undefined"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Conditions, GitHubConditions, Trigger};
    use crate::payload::parse_github;

    fn trigger(id: &str, priority: i32, conditions: GitHubConditions) -> Trigger {
        Trigger {
            id: id.to_string(),
            name: id.to_string(),
            priority,
            enabled: true,
            conditions: Conditions::GitHub(conditions),
            session_config: None,
            stop_on_match: true,
        }
    }

    fn pr_opened_payload() -> Vec<u8> {
        serde_json::json!({
            "action": "opened",
            "repository": {"full_name": "acme/widgets"},
            "pull_request": {
                "number": 42,
                "base": {"ref": "main"},
                "head": {"ref": "feature/x"},
                "draft": false,
            },
            "sender": {"login": "octocat"}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn empty_conditions_match_any_payload_of_the_right_platform() {
        let envelope =
            parse_github("pull_request", "d1", &pr_opened_payload()).expect("parses");
        let triggers = vec![trigger("t1", 10, GitHubConditions::default())];
        let matched = find_match(&triggers, &envelope).expect("matches");
        assert_eq!(matched.id, "t1");
    }

    #[test]
    fn disabled_triggers_never_match() {
        let envelope =
            parse_github("pull_request", "d1", &pr_opened_payload()).expect("parses");
        let mut t = trigger("t1", 10, GitHubConditions::default());
        t.enabled = false;
        assert!(find_match(&[t], &envelope).is_none());
    }

    #[test]
    fn lowest_priority_wins_ties_broken_by_declaration_order() {
        let envelope =
            parse_github("pull_request", "d1", &pr_opened_payload()).expect("parses");
        let a = trigger("a", 5, GitHubConditions::default());
        let b = trigger("b", 5, GitHubConditions::default());
        let c = trigger("c", 1, GitHubConditions::default());
        let matched = find_match(&[a, b, c], &envelope).unwrap();
        assert_eq!(matched.id, "c");

        let a2 = trigger("a", 5, GitHubConditions::default());
        let b2 = trigger("b", 5, GitHubConditions::default());
        let matched2 = find_match(&[a2, b2], &envelope).unwrap();
        assert_eq!(matched2.id, "a");
    }

    #[test]
    fn base_branch_condition_filters_non_matching_targets() {
        let envelope =
            parse_github("pull_request", "d1", &pr_opened_payload()).expect("parses");
        let mut conditions = GitHubConditions::default();
        conditions.base_branches = vec!["release/*".to_string()];
        let t = trigger("t1", 10, conditions);
        assert!(find_match(&[t], &envelope).is_none());
    }

    #[test]
    fn path_condition_requires_at_least_one_changed_file_to_match() {
        let body = serde_json::json!({
            "repository": {"full_name": "acme/widgets"},
            "commits": [{"id": "1", "message": "m", "added": [], "modified": ["src/a.go"], "removed": []}]
        })
        .to_string()
        .into_bytes();
        let envelope = parse_github("push", "d1", &body).expect("parses");

        let mut matching = GitHubConditions::default();
        matching.paths = vec!["src/**/*.go".to_string()];
        assert!(find_match(&[trigger("t1", 1, matching)], &envelope).is_some());

        let mut non_matching = GitHubConditions::default();
        non_matching.paths = vec!["docs/**".to_string()];
        assert!(find_match(&[trigger("t1", 1, non_matching)], &envelope).is_none());
    }

    #[test]
    fn repository_wildcard_condition_matches_any_repo_under_owner() {
        let envelope =
            parse_github("pull_request", "d1", &pr_opened_payload()).expect("parses");
        let mut conditions = GitHubConditions::default();
        conditions.repositories = vec!["acme/*".to_string()];
        assert!(find_match(&[trigger("t1", 1, conditions)], &envelope).is_some());

        let mut other = GitHubConditions::default();
        other.repositories = vec!["other/*".to_string()];
        assert!(find_match(&[trigger("t1", 1, other)], &envelope).is_none());
    }
}
