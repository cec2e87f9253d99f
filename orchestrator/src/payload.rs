use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;
use crate::model::Platform;

#[derive(Debug, Clone, Serialize)]
pub struct Sender {
    pub login: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryRef {
    pub full_name: String,
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullRequestRef {
    pub number: i64,
    pub base_ref: String,
    pub head_ref: String,
    pub draft: bool,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueRef {
    pub number: i64,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitRef {
    pub id: String,
    pub message: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

/// Normalized view of an inbound event (spec.md §4.2). `raw_payload` is
/// retained verbatim for template rendering.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub platform: Platform,
    pub event_type: String,
    pub action: Option<String>,
    pub delivery_id: String,
    pub raw_payload: Value,
    pub sender: Option<Sender>,
    pub repository: Option<RepositoryRef>,
    pub pull_request: Option<PullRequestRef>,
    pub issue: Option<IssueRef>,
    pub commits: Option<Vec<CommitRef>>,
    /// Slack channel ID, when platform is Slack.
    pub channel_id: Option<String>,
}

impl Envelope {
    /// Branch name extraction per event type (spec.md §4.3): `push` takes
    /// the `refs/heads/` suffix, `pull_request` the head ref, `create`/
    /// `delete` the ref as given.
    pub fn branch_name(&self) -> Option<String> {
        match self.event_type.as_str() {
            "push" => self
                .raw_payload
                .get("ref")
                .and_then(Value::as_str)
                .map(|r| r.trim_start_matches("refs/heads/").to_string()),
            "pull_request" => self.pull_request.as_ref().map(|pr| pr.head_ref.clone()),
            "create" | "delete" => self
                .raw_payload
                .get("ref")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            _ => None,
        }
    }

    pub fn base_branch_name(&self) -> Option<String> {
        self.pull_request.as_ref().map(|pr| pr.base_ref.clone())
    }

    /// Union of labels on the PR or issue referenced by this event.
    pub fn labels(&self) -> Vec<String> {
        if let Some(pr) = &self.pull_request {
            return pr.labels.clone();
        }
        if let Some(issue) = &self.issue {
            return issue.labels.clone();
        }
        Vec::new()
    }

    pub fn draft(&self) -> Option<bool> {
        self.pull_request.as_ref().map(|pr| pr.draft)
    }

    /// Union of `added ∪ modified ∪ removed` across all commits.
    pub fn changed_paths(&self) -> Vec<String> {
        let Some(commits) = &self.commits else {
            return Vec::new();
        };
        let mut paths = Vec::new();
        for commit in commits {
            paths.extend(commit.added.iter().cloned());
            paths.extend(commit.modified.iter().cloned());
            paths.extend(commit.removed.iter().cloned());
        }
        paths
    }

    /// PR number, issue number, or Slack thread key — the "subject" half
    /// of a reuse fingerprint (spec.md §4.6).
    pub fn subject_key(&self) -> Option<String> {
        if let Some(pr) = &self.pull_request {
            return Some(pr.number.to_string());
        }
        if let Some(issue) = &self.issue {
            return Some(issue.number.to_string());
        }
        self.raw_payload
            .get("thread_ts")
            .or_else(|| self.raw_payload.get("event").and_then(|e| e.get("thread_ts")))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
    }

    pub fn repository_or_channel(&self) -> Option<String> {
        self.repository
            .as_ref()
            .map(|r| r.full_name.clone())
            .or_else(|| self.channel_id.clone())
    }
}

/// Parse a raw GitHub webhook body into the normalized envelope. Returns
/// `BadRequest` on unparseable JSON or when a platform-mandated field
/// (repository, for non-ping events) is missing (spec.md §4.2).
pub fn parse_github(
    event_type: &str,
    delivery_id: &str,
    body: &[u8],
) -> Result<Envelope, ProxyError> {
    let raw_payload: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::BadRequest(format!("invalid JSON body: {e}")))?;

    let action = raw_payload
        .get("action")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let repository = raw_payload.get("repository").map(parse_repository);
    if repository.is_none() && event_type != "ping" {
        return Err(ProxyError::BadRequest(
            "github payload missing repository".into(),
        ));
    }

    let sender = raw_payload.get("sender").and_then(|s| {
        s.get("login")
            .and_then(Value::as_str)
            .map(|login| Sender {
                login: login.to_string(),
            })
    });

    let pull_request = raw_payload
        .get("pull_request")
        .map(|pr| parse_pull_request(pr, &raw_payload));

    let issue = raw_payload.get("issue").map(|issue| IssueRef {
        number: issue.get("number").and_then(Value::as_i64).unwrap_or(0),
        labels: parse_labels(issue),
    });

    let commits = raw_payload.get("commits").and_then(Value::as_array).map(|arr| {
        arr.iter()
            .map(|c| CommitRef {
                id: c
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                message: c
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                added: string_array(c, "added"),
                modified: string_array(c, "modified"),
                removed: string_array(c, "removed"),
            })
            .collect()
    });

    Ok(Envelope {
        platform: Platform::GitHub,
        event_type: event_type.to_string(),
        action,
        delivery_id: delivery_id.to_string(),
        raw_payload,
        sender,
        repository,
        pull_request,
        issue,
        commits,
        channel_id: None,
    })
}

fn parse_repository(repo: &Value) -> RepositoryRef {
    let full_name = repo
        .get("full_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let (owner, name) = full_name
        .split_once('/')
        .map(|(o, n)| (o.to_string(), n.to_string()))
        .unwrap_or_default();
    RepositoryRef {
        full_name,
        owner,
        name,
    }
}

fn parse_pull_request(pr: &Value, root: &Value) -> PullRequestRef {
    PullRequestRef {
        number: pr.get("number").and_then(Value::as_i64).unwrap_or(0),
        base_ref: pr
            .get("base")
            .and_then(|b| b.get("ref"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        head_ref: pr
            .get("head")
            .and_then(|h| h.get("ref"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        draft: pr.get("draft").and_then(Value::as_bool).unwrap_or(false),
        labels: parse_labels(pr).into_iter().chain(parse_labels(root)).collect(),
    }
}

fn parse_labels(v: &Value) -> Vec<String> {
    v.get("labels")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|l| l.get("name").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn string_array(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Slack Events API envelope: `{type, event: {type, channel, ...}}` for
/// callback events, or `{type: "url_verification", challenge}`.
pub fn parse_slack(tenant_id: &str, body: &[u8]) -> Result<Envelope, ProxyError> {
    let raw_payload: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::BadRequest(format!("invalid JSON body: {e}")))?;

    let outer_type = raw_payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let event = raw_payload.get("event");
    let event_type = event
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(outer_type);

    let channel_id = event
        .and_then(|e| e.get("channel"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let sender = event
        .and_then(|e| e.get("user"))
        .and_then(Value::as_str)
        .map(|u| Sender {
            login: u.to_string(),
        });

    Ok(Envelope {
        platform: Platform::Slack,
        event_type,
        action: None,
        delivery_id: format!("{tenant_id}-{}", uuid::Uuid::new_v4()),
        raw_payload,
        sender,
        repository: None,
        pull_request: None,
        issue: None,
        commits: None,
        channel_id,
    })
}

/// Custom tenants accept free-form JSON; there is no platform schema to
/// validate beyond "it parses".
pub fn parse_custom(tenant_id: &str, body: &[u8]) -> Result<Envelope, ProxyError> {
    let raw_payload: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::BadRequest(format!("invalid JSON body: {e}")))?;
    let event_type = raw_payload
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("custom")
        .to_string();
    Ok(Envelope {
        platform: Platform::Custom,
        event_type,
        action: None,
        delivery_id: format!("{tenant_id}-{}", uuid::Uuid::new_v4()),
        raw_payload,
        sender: None,
        repository: None,
        pull_request: None,
        issue: None,
        commits: None,
        channel_id: None,
    })
}

#[derive(Debug, Deserialize)]
pub struct SlackUrlVerification {
    pub challenge: String,
}
