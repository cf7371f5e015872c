//! OpenAPI document assembled from the handler annotations, served at `/docs`.

use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::models::configs::{ConfigCreate, ConfigResponse};
use crate::api::models::webhooks::{
    AttemptResponse, WebhookEnqueueRequest, WebhookEnqueueResponse, WebhookStatusResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "courierd", description = "Webhook delivery intake API"),
    paths(
        handlers::webhooks::enqueue_webhook,
        handlers::webhooks::get_webhook,
        handlers::configs::create_config,
        handlers::configs::list_configs,
        handlers::configs::get_config,
        handlers::health,
        handlers::metrics,
    ),
    components(schemas(
        WebhookEnqueueRequest,
        WebhookEnqueueResponse,
        WebhookStatusResponse,
        AttemptResponse,
        ConfigCreate,
        ConfigResponse,
    )),
    tags(
        (name = "webhooks", description = "Delivery intake and status"),
        (name = "configs", description = "Webhook endpoint configuration"),
        (name = "system", description = "Health and metrics"),
    )
)]
pub struct ApiDoc;
