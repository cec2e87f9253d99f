use serde_json::Value;

use crate::payload::Envelope;

/// Data dictionary a template is rendered against (spec.md §4.4).
pub struct TemplateData {
    pub event: String,
    pub payload: Value,
    pub repository: Option<Value>,
    pub sender: Option<Value>,
    pub pull_request: Option<Value>,
    pub issue: Option<Value>,
}

impl TemplateData {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            event: envelope.event_type.clone(),
            payload: envelope.raw_payload.clone(),
            repository: envelope.raw_payload.get("repository").cloned(),
            sender: envelope.raw_payload.get("sender").cloned(),
            pull_request: envelope.raw_payload.get("pull_request").cloned(),
            issue: envelope.raw_payload.get("issue").cloned(),
        }
    }

    fn root(&self) -> Value {
        let mut root = serde_json::Map::new();
        root.insert("event".to_string(), Value::String(self.event.clone()));
        root.insert("payload".to_string(), self.payload.clone());
        if let Some(v) = &self.repository {
            root.insert("repository".to_string(), v.clone());
        }
        if let Some(v) = &self.sender {
            root.insert("sender".to_string(), v.clone());
        }
        if let Some(v) = &self.pull_request {
            root.insert("pull_request".to_string(), v.clone());
        }
        if let Some(v) = &self.issue {
            root.insert("issue".to_string(), v.clone());
        }
        Value::Object(root)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("unterminated ${{ expression in template")]
    Unterminated,
}

/// Deterministic `${path}`-style substitution, where `path` is a dotted
/// traversal of the data dictionary (spec.md §4.4). Unresolved references
/// remain as literal `${path}`. Intentionally limited to dotted-path
/// lookups — no arithmetic, no conditionals — to avoid turning
/// tenant-authored templates into an execution surface (spec.md §9).
pub fn render(template: &str, data: &TemplateData) -> Result<String, TemplateError> {
    let root = data.root();
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    let mut plain_start = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            out.push_str(&template[plain_start..i]);
            let close = template[i + 2..]
                .find('}')
                .ok_or(TemplateError::Unterminated)?;
            let path = &template[i + 2..i + 2 + close];
            match resolve_path(&root, path) {
                Some(value) => out.push_str(&value_to_string(&value)),
                None => out.push_str(&format!("${{{path}}}")),
            }
            i += 2 + close + 1;
            plain_start = i;
        } else {
            i += 1;
        }
    }
    out.push_str(&template[plain_start..]);

    Ok(out)
}

fn resolve_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root.clone();
    for segment in path.split('.') {
        current = current.get(segment)?.clone();
    }
    Some(current)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Platform-specific default message used when a tenant has no template,
/// or when the configured template fails to parse (spec.md §4.4): event
/// name, repo full name, branch, 7-char commit SHA prefix, commit
/// message, and sender login.
pub fn render_default_github(envelope: &Envelope) -> String {
    let repo = envelope
        .repository
        .as_ref()
        .map(|r| r.full_name.as_str())
        .unwrap_or("unknown/unknown");
    let branch = envelope.branch_name().unwrap_or_else(|| "unknown".to_string());
    let (sha_prefix, message) = envelope
        .commits
        .as_ref()
        .and_then(|c| c.last())
        .map(|c| {
            let prefix: String = c.id.chars().take(7).collect();
            (prefix, c.message.clone())
        })
        .unwrap_or_else(|| (String::new(), String::new()));
    let sender = envelope
        .sender
        .as_ref()
        .map(|s| s.login.as_str())
        .unwrap_or("unknown");

    format!(
        "[{event}] {repo}@{branch} {sha}: {message} (by {sender})",
        event = envelope.event_type,
        repo = repo,
        branch = branch,
        sha = sha_prefix,
        message = message,
        sender = sender
    )
}
