use serde::{Deserialize, Serialize};
use warp::http::StatusCode;

use crate::error_handling::types::ServiceError;
use crate::service_management::ProvisioningRequest;

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Body of `POST /api/services`.
#[derive(Debug, Deserialize)]
pub struct CreateServiceBody {
    pub name: String,
    #[serde(flatten)]
    pub request: ProvisioningRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub container_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FreePortQuery {
    pub start: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct FreePortResponse {
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    /// Sequence number the poller already has.
    pub after: Option<u64>,
}

pub fn error_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Precondition(_) => StatusCode::BAD_REQUEST,
        ServiceError::Engine(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Io(_) | ServiceError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
