use globset::GlobBuilder;

/// Glob match with `**` treated as a recursive wildcard and `*` confined
/// to a single path segment, matching the corpus's convention for
/// include/exclude path globs (grounded on `abp-glob`'s `literal_separator`
/// usage). Used for trigger path patterns and branch/base-branch globs
/// (spec.md §4.3).
pub fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let Ok(glob) = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
    else {
        return false;
    };
    glob.compile_matcher().is_match(candidate)
}

/// `owner/repo` exact match, or `owner/*` meaning any repo under that
/// owner. No other wildcards are supported (spec.md §4.3, §4.5).
pub fn repository_matches(pattern: &str, repo_full_name: &str) -> bool {
    if pattern == repo_full_name {
        return true;
    }
    if let Some(owner) = pattern.strip_suffix("/*") {
        if let Some((repo_owner, _name)) = repo_full_name.split_once('/') {
            return repo_owner == owner;
        }
    }
    false
}
