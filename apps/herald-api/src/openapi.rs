use utoipa::OpenApi;

/// Notification API documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::notifications::service_info,
        crate::api::notifications::send_email,
        crate::api::notifications::service_status,
        crate::api::notifications::send_test_email,
        crate::api::health::health,
    ),
    components(schemas(
        crate::api::notifications::EmailRequest,
        crate::api::notifications::EmailResponse,
        crate::api::health::HealthResponse,
        crate::error::ErrorResponse,
    )),
    tags(
        (name = "notifications", description = "Email notification operations"),
        (name = "health", description = "Service health probes")
    )
)]
pub struct ApiDoc;
