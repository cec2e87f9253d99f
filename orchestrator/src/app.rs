use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{receivers, slackbots, webhooks};
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        webhooks::handlers::list_webhooks,
        webhooks::handlers::create_webhook,
        webhooks::handlers::get_webhook,
        webhooks::handlers::update_webhook,
        webhooks::handlers::delete_webhook,
        webhooks::handlers::regenerate_secret,
        webhooks::handlers::dry_run_trigger,
        slackbots::handlers::list_slackbots,
        slackbots::handlers::create_slackbot,
        slackbots::handlers::get_slackbot,
        slackbots::handlers::update_slackbot,
        slackbots::handlers::delete_slackbot,
        slackbots::handlers::regenerate_secret,
        slackbots::handlers::dry_run_trigger,
    ),
    components(schemas(
        webhooks::handlers::WebhookView,
        webhooks::handlers::WebhookSecretView,
        webhooks::handlers::CreateWebhookRequest,
        webhooks::handlers::UpdateWebhookRequest,
        webhooks::handlers::DryRunTriggerRequest,
        webhooks::handlers::DryRunTriggerResponse,
        slackbots::handlers::SlackBotView,
        slackbots::handlers::SlackBotSecretView,
        slackbots::handlers::CreateSlackBotRequest,
        slackbots::handlers::UpdateSlackBotRequest,
        slackbots::handlers::DryRunSlackTriggerRequest,
        slackbots::handlers::DryRunSlackTriggerResponse,
        crate::api::common::ErrorResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Webhooks", description = "GitHub/custom webhook tenant management"),
        (name = "SlackBots", description = "Slack-bot tenant management"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
        let components = openapi.components.as_mut().expect("components registered above");
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
        components.add_security_scheme(
            "cookie_auth",
            SecurityScheme::ApiKey(utoipa::openapi::security::ApiKey::Cookie(ApiKeyValue::new(
                "auth_token",
            ))),
        );
    }
}

/// Build the full axum router wired to `state`, shared by the real binary
/// (`main.rs`) and by in-process integration tests (`tests/*.rs`), the way
/// the pack's `create_router(state) -> Router` + `tower::ServiceExt::oneshot`
/// pattern drives request/response assertions without a bound socket.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = if state.config.local_mode {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(
                state
                    .config
                    .cors_origin
                    .parse()
                    .expect("invalid CORS_ORIGIN"),
            ))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/health", get(health))
        .route("/hooks/github", post(receivers::github::handle))
        .route("/hooks/slack/:id", post(receivers::slack::handle))
        .route("/hooks/custom/:id", post(receivers::custom::handle))
        .route(
            "/api/webhooks",
            get(webhooks::handlers::list_webhooks).post(webhooks::handlers::create_webhook),
        )
        .route(
            "/api/webhooks/:id",
            get(webhooks::handlers::get_webhook)
                .put(webhooks::handlers::update_webhook)
                .delete(webhooks::handlers::delete_webhook),
        )
        .route("/api/webhooks/:id/secret", post(webhooks::handlers::regenerate_secret))
        .route("/api/webhooks/:id/trigger", post(webhooks::handlers::dry_run_trigger))
        .route(
            "/api/slackbots",
            get(slackbots::handlers::list_slackbots).post(slackbots::handlers::create_slackbot),
        )
        .route(
            "/api/slackbots/:id",
            get(slackbots::handlers::get_slackbot)
                .put(slackbots::handlers::update_slackbot)
                .delete(slackbots::handlers::delete_slackbot),
        )
        .route("/api/slackbots/:id/secret", post(slackbots::handlers::regenerate_secret))
        .route("/api/slackbots/:id/trigger", post(slackbots::handlers::dry_run_trigger))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
