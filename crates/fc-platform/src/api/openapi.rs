//! OpenAPI Documentation

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Platform API OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "FlowCatalyst Platform API",
        version = "1.0.0",
        description = "Dispatch job processing endpoint called by the message router"
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "dispatch-processing", description = "Webhook dispatch processing")
    ),
    paths(
        super::dispatch_processing::process_dispatch_job,
    ),
    components(
        schemas(fc_common::ProcessRequest, fc_common::ProcessResponse)
    ),
    modifiers(&SecurityAddon)
)]
pub struct PlatformApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Dispatch auth token issued for the job"))
                        .build(),
                ),
            );
        }
    }
}
