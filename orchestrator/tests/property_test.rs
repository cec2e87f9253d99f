//! Universal properties from spec.md §8, checked against randomly
//! generated inputs rather than fixed examples: signature tampering always
//! invalidates a delivery, repository/path globs behave consistently
//! across arbitrary owners and segments, and trigger matching always picks
//! the lowest-priority enabled candidate.

use hmac::{Hmac, Mac};
use proptest::prelude::*;
use sha2::Sha256;

use webhook_orchestrator::glob_match::{glob_matches, repository_matches};
use webhook_orchestrator::model::{Conditions, GitHubConditions, Trigger};
use webhook_orchestrator::payload::parse_github;
use webhook_orchestrator::{matcher, signature};

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,8}"
}

proptest! {
    /// A signature computed over one body never verifies against a
    /// different, non-empty body signed with the same secret.
    #[test]
    fn tampered_body_always_fails_verification(
        secret in "[a-zA-Z0-9]{8,32}",
        body in prop::collection::vec(any::<u8>(), 1..64),
        tamper_index in 0usize..64,
    ) {
        let header = sign(&secret, &body);
        let mut tampered = body.clone();
        let index = tamper_index % tampered.len();
        tampered[index] ^= 0x01;

        prop_assert!(signature::verify(&body, &header, &secret));
        prop_assert!(!signature::verify(&tampered, &header, &secret));
    }

    /// Verification with the wrong secret never succeeds, for any two
    /// distinct non-empty secrets.
    #[test]
    fn wrong_secret_always_fails_verification(
        secret in "[a-zA-Z0-9]{8,32}",
        other_secret in "[a-zA-Z0-9]{8,32}",
        body in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assume!(secret != other_secret);
        let header = sign(&secret, &body);
        prop_assert!(!signature::verify(&body, &header, &other_secret));
    }

    /// `owner/*` admits every repository under that owner and rejects every
    /// repository under any other owner.
    #[test]
    fn owner_wildcard_matches_only_that_owner(
        owner in segment(),
        other_owner in segment(),
        repo in segment(),
    ) {
        prop_assume!(owner != other_owner);
        let pattern = format!("{owner}/*");
        prop_assert!(repository_matches(&pattern, &format!("{owner}/{repo}")));
        prop_assert!(!repository_matches(&pattern, &format!("{other_owner}/{repo}")));
    }

    /// `src/**/*.go` matches a `.go` file at any depth under `src/`, and
    /// never matches a sibling tree outside `src/`.
    #[test]
    fn recursive_glob_matches_any_depth_under_prefix(
        segments in prop::collection::vec(segment(), 0..4),
        file_stem in segment(),
        other_root in segment(),
    ) {
        prop_assume!(other_root != "src");
        let mut path = String::from("src/");
        for s in &segments {
            path.push_str(s);
            path.push('/');
        }
        path.push_str(&file_stem);
        path.push_str(".go");

        prop_assert!(glob_matches("src/**/*.go", &path));

        let outside = format!("{other_root}/{file_stem}.go");
        prop_assert!(!glob_matches("src/**/*.go", &outside));
    }

    /// Among any set of enabled, platform-matching triggers, `find_match`
    /// always returns the one with the lowest `priority`, regardless of
    /// declaration order.
    #[test]
    fn find_match_always_picks_lowest_priority(
        mut priorities in prop::collection::vec(-100i32..100, 2..8),
    ) {
        priorities.dedup();
        prop_assume!(priorities.len() >= 2);

        let body = br#"{"action":"opened","repository":{"full_name":"acme/widgets"},"pull_request":{"number":1,"base":{"ref":"main"},"head":{"ref":"feature"},"draft":false},"sender":{"login":"octocat"}}"#;
        let envelope = parse_github("pull_request", "d1", body).unwrap();

        let triggers: Vec<Trigger> = priorities
            .iter()
            .enumerate()
            .map(|(i, &priority)| Trigger {
                id: format!("t{i}"),
                name: format!("trigger-{i}"),
                priority,
                enabled: true,
                conditions: Conditions::GitHub(GitHubConditions::default()),
                session_config: None,
                stop_on_match: true,
            })
            .collect();

        let expected_min = *priorities.iter().min().unwrap();
        let matched = matcher::find_match(&triggers, &envelope).expect("some trigger always matches empty conditions");
        prop_assert_eq!(matched.priority, expected_min);
    }
}
