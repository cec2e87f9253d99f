use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ProxyError, ProxyResult};
use crate::model::{Platform, Tenant, TenantFilter, TenantStatus};
use crate::store::TenantStore;
use crate::AppState;

/// Mirrors `crate::error::ErrorResponse`; kept alongside handlers so
/// `utoipa` can derive a schema for it without pulling the schema
/// dependency into the core error module.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    is_admin: bool,
    #[serde(default)]
    teams: Vec<String>,
    exp: i64,
}

/// The authenticated caller (spec.md §4.8). User account management is
/// out of scope; a caller is resolved directly from JWT claims rather
/// than a signup/signin record, so there is no user table to join
/// against.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub is_admin: bool,
    pub teams: Vec<String>,
}

impl Principal {
    pub fn owns_or_admin(&self, owner_user_id: &str) -> bool {
        self.is_admin || self.user_id == owner_user_id
    }

    pub fn in_team(&self, team_id: &str) -> bool {
        self.is_admin || self.teams.iter().any(|t| t == team_id)
    }
}

fn decode_claims(token: &str, jwt_secret: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(jwt_secret.as_bytes()), &validation)
        .ok()
        .map(|data| data.claims)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ProxyError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.config.auth_disabled || state.config.local_mode {
            return Ok(Principal {
                user_id: "local".to_string(),
                is_admin: true,
                teams: Vec::new(),
            });
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get("auth_token")
            .map(|c| c.value().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get("Authorization")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.strip_prefix("Bearer ").map(str::to_string))
            })
            .ok_or(ProxyError::Unauthorized)?;

        let claims = decode_claims(&token, &state.config.jwt_secret).ok_or(ProxyError::Unauthorized)?;

        Ok(Principal {
            user_id: claims.sub,
            is_admin: claims.is_admin,
            teams: claims.teams,
        })
    }
}

/// Shared `State<Arc<AppState>>` extraction shorthand used by every
/// management handler.
pub type AppStateExtractor = State<Arc<AppState>>;

/// List the tenants visible to `principal` (spec.md §4.8 "a `user`-scoped
/// tenant is accessible only to its owner … a `team`-scoped tenant is
/// accessible to any user whose team memberships contain the tenant's
/// team identifier"). Visibility is a **union** of "owned by me" and
/// "shared with one of my teams", not an intersection: a single
/// `TenantFilter` with both `user_id` and `team_ids` set would AND the two
/// together and, per `TenantFilter::matches`, reject every `User`-scoped
/// tenant outright for any caller who belongs to a team (the `team_ids`
/// branch always returns `false` for `TenantScope::User`). So the two
/// halves are fetched as separate store queries and concatenated; they
/// can never overlap since one is pinned to `scope = "user"` and the
/// other to `scope = "team"`.
pub async fn list_visible_tenants(
    store: &TenantStore,
    principal: &Principal,
    status: Option<TenantStatus>,
    requested_scope: Option<&'static str>,
    team_id: Option<&str>,
    platform: Option<Platform>,
) -> ProxyResult<Vec<Tenant>> {
    if principal.is_admin {
        let team_ids = match team_id {
            Some(id) => vec![id.to_string()],
            None => Vec::new(),
        };
        let filter = TenantFilter {
            user_id: None,
            status,
            scope: requested_scope,
            platform,
            team_ids,
        };
        return store.list(&filter).await;
    }

    let mut tenants = Vec::new();

    if requested_scope != Some("team") {
        let owned_filter = TenantFilter {
            user_id: Some(principal.user_id.clone()),
            status,
            scope: Some("user"),
            platform,
            team_ids: Vec::new(),
        };
        tenants.extend(store.list(&owned_filter).await?);
    }

    if requested_scope != Some("user") {
        // An empty `team_ids` means "no restriction" to `TenantFilter`, so
        // a caller with no team memberships (or asking for a team they are
        // not in) must skip this branch entirely rather than pass an empty
        // vec, which would otherwise hand back every team's tenants.
        let effective_team_ids: Vec<String> = match team_id {
            Some(id) if principal.teams.iter().any(|t| t == id) => vec![id.to_string()],
            Some(_) => Vec::new(),
            None => principal.teams.clone(),
        };
        if !effective_team_ids.is_empty() {
            let team_filter = TenantFilter {
                user_id: None,
                status,
                scope: Some("team"),
                platform,
                team_ids: effective_team_ids,
            };
            tenants.extend(store.list(&team_filter).await?);
        }
    }

    Ok(tenants)
}
