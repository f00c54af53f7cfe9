//! HTTP handlers and gateway error types

mod error;
mod health;
mod response;
mod soa;

pub use error::{GatewayError, GatewayResult};
pub use health::{health_check, metrics_handler, readiness_check, HealthResponse, ReadinessResponse};
pub use response::{ApiError, ApiResult};
pub use soa::{
    connections_count, get_endpoint, publish_to_channel, GetEndpointRequest, GetEndpointResponse,
    PublishRequest, PublishResponse,
};
