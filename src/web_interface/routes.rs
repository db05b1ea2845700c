use log::{info, warn};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use warp::reply::Response;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{
    error_status, ApiError, CreateServiceBody, CreatedResponse, FreePortQuery, FreePortResponse,
    StateQuery,
};
use crate::error_handling::types::ServiceError;
use crate::service_management::catalog::POSTGRES_PORT;
use crate::service_management::ServicesManager;
use crate::transport::WatchTransport;

const MAX_BODY_BYTES: u64 = 1024 * 1024;

fn with_manager(
    manager: Arc<ServicesManager>,
) -> impl Filter<Extract = (Arc<ServicesManager>,), Error = Infallible> + Clone {
    warp::any().map(move || manager.clone())
}

fn error_reply(err: &ServiceError) -> Response {
    reply::with_status(
        reply::json(&ApiError {
            message: err.to_string(),
        }),
        error_status(err),
    )
    .into_response()
}

fn json_reply<T: serde::Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

/// GET /
pub fn dashboard_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end().and(warp::get()).and_then(|| async move {
        let html = r#"<html><head><title>pgservices</title></head>
                <body><h1>pgservices is running</h1><p>See /api/services for JSON.</p></body></html>"#;
        Ok::<_, Rejection>(reply::html(html))
    })
}

/// GET /api/services
pub fn list_services_route(
    manager: Arc<ServicesManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "services")
        .and(warp::get())
        .and(with_manager(manager))
        .and_then(list_services)
}

/// GET /api/services/:id
pub fn service_details_route(
    manager: Arc<ServicesManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "services" / String)
        .and(warp::get())
        .and(with_manager(manager))
        .and_then(service_details)
}

/// GET /api/services/:id/connection-strings
pub fn connection_strings_route(
    manager: Arc<ServicesManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "services" / String / "connection-strings")
        .and(warp::get())
        .and(with_manager(manager))
        .and_then(connection_strings)
}

/// GET /api/images
pub fn images_route(
    manager: Arc<ServicesManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "images")
        .and(warp::get())
        .and(with_manager(manager))
        .and_then(service_images)
}

/// GET /api/free-port?start=
pub fn free_port_route(
    manager: Arc<ServicesManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "free-port")
        .and(warp::get())
        .and(warp::query::<FreePortQuery>())
        .and(with_manager(manager))
        .and_then(free_port)
}

/// POST /api/services
pub fn create_service_route(
    manager: Arc<ServicesManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "services")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json::<CreateServiceBody>())
        .and(with_manager(manager))
        .and_then(create_service)
}

/// GET /api/state?after=
pub fn state_route(
    transport: Arc<WatchTransport>,
    poll_timeout: Duration,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "state")
        .and(warp::get())
        .and(warp::query::<StateQuery>())
        .and(warp::any().map(move || transport.clone()))
        .and_then(move |query: StateQuery, transport: Arc<WatchTransport>| {
            poll_state(query, transport, poll_timeout)
        })
}

pub async fn list_services(manager: Arc<ServicesManager>) -> Result<Response, Rejection> {
    Ok(json_reply(&manager.services(), StatusCode::OK))
}

pub async fn service_details(
    id: String,
    manager: Arc<ServicesManager>,
) -> Result<Response, Rejection> {
    match manager.service_details(&id) {
        Ok(service) => Ok(json_reply(&service, StatusCode::OK)),
        Err(e) => Ok(error_reply(&e)),
    }
}

pub async fn connection_strings(
    id: String,
    manager: Arc<ServicesManager>,
) -> Result<Response, Rejection> {
    match manager.connection_strings(&id) {
        Ok(strings) => Ok(json_reply(&strings, StatusCode::OK)),
        Err(e) => Ok(error_reply(&e)),
    }
}

pub async fn service_images(manager: Arc<ServicesManager>) -> Result<Response, Rejection> {
    Ok(json_reply(&manager.service_images(), StatusCode::OK))
}

pub async fn free_port(
    query: FreePortQuery,
    manager: Arc<ServicesManager>,
) -> Result<Response, Rejection> {
    let start = query.start.unwrap_or(POSTGRES_PORT);
    match manager.free_port(start).await {
        Ok(port) => Ok(json_reply(&FreePortResponse { port }, StatusCode::OK)),
        Err(e) => Ok(error_reply(&e)),
    }
}

pub async fn create_service(
    body: CreateServiceBody,
    manager: Arc<ServicesManager>,
) -> Result<Response, Rejection> {
    info!("Create request for service '{}'", body.name);
    match manager.create_service(&body.name, &body.request).await {
        Ok(container_id) => Ok(json_reply(
            &CreatedResponse { container_id },
            StatusCode::CREATED,
        )),
        Err(e) => {
            warn!("Create request for '{}' failed: {}", body.name, e);
            Ok(error_reply(&e))
        }
    }
}

pub async fn poll_state(
    query: StateQuery,
    transport: Arc<WatchTransport>,
    poll_timeout: Duration,
) -> Result<Response, Rejection> {
    let message = match query.after {
        Some(after) => transport.wait_newer(after, poll_timeout).await,
        None => transport.latest(),
    };
    Ok(json_reply(&message, StatusCode::OK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake_engine::{container, inspect, FakeEngine};
    use crate::service_management::{PathTranslator, ProvisionerSettings, ProvisioningRequest};
    use crate::transport::{StateMessage, UiTransport};

    fn setup(root: &std::path::Path) -> (Arc<FakeEngine>, Arc<ServicesManager>, Arc<WatchTransport>) {
        let engine = Arc::new(FakeEngine::with_started_provider());
        let transport = Arc::new(WatchTransport::new());
        let manager = Arc::new(ServicesManager::new(
            engine.clone(),
            transport.clone(),
            ProvisionerSettings {
                storage_root: root.to_path_buf(),
                use_pod: true,
                pgadmin_email: "user@domain.com".to_string(),
                pgadmin_password: "admin".to_string(),
            },
            PathTranslator::new(false).unwrap(),
        ));
        (engine, manager, transport)
    }

    fn body(pgadmin: bool, pgadmin_port: Option<u16>) -> CreateServiceBody {
        CreateServiceBody {
            name: "db".to_string(),
            request: ProvisioningRequest {
                image: "docker.io/library/postgres:16".to_string(),
                local_port: 5433,
                db_name: None,
                user: None,
                password: "pw".to_string(),
                pgadmin,
                pgadmin_port,
                scripts: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_details_status_codes() {
        let root = tempfile::tempdir().unwrap();
        let (engine, manager, _) = setup(root.path());
        engine.add_container(container("c1", "docker.io/library/postgres:16"), inspect("c1", &[]));
        manager.reconciler().reconcile(None).await.unwrap();

        let found = service_details("c1".to_string(), manager.clone()).await.unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        let missing = service_details("nope".to_string(), manager.clone()).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let missing = connection_strings("nope".to_string(), manager).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_status_codes() {
        let root = tempfile::tempdir().unwrap();
        let (engine, manager, _) = setup(root.path());

        let rejected = create_service(body(true, None), manager.clone()).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

        let created = create_service(body(false, None), manager.clone()).await.unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);

        engine.fail_on("pull_image");
        let failed = create_service(body(false, None), manager).await.unwrap();
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_listing_routes() {
        let root = tempfile::tempdir().unwrap();
        let (_, manager, _) = setup(root.path());

        let services = list_services(manager.clone()).await.unwrap();
        assert_eq!(services.status(), StatusCode::OK);
        let images = service_images(manager.clone()).await.unwrap();
        assert_eq!(images.status(), StatusCode::OK);
        let port = free_port(FreePortQuery { start: Some(20000) }, manager)
            .await
            .unwrap();
        assert_eq!(port.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_state_poll_returns_published_message() {
        let root = tempfile::tempdir().unwrap();
        let (_, _, transport) = setup(root.path());
        transport
            .post_state(&StateMessage::new(4, Vec::new()))
            .unwrap();

        let latest = poll_state(StateQuery { after: None }, transport.clone(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(latest.status(), StatusCode::OK);
        let timed_out = poll_state(StateQuery { after: Some(4) }, transport, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(timed_out.status(), StatusCode::OK);
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            error_status(&ServiceError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&ServiceError::Precondition("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&ServiceError::Engine(
                crate::error_handling::types::EngineError::NotFound("x".to_string())
            )),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_create_body_accepts_flat_json() {
        let parsed: CreateServiceBody = serde_json::from_str(
            r#"{"name":"db","image":"docker.io/library/postgres:16","localPort":5433,
                "password":"pw","pgadmin":true,"pgadminPort":8080,
                "scripts":[{"name":"01.sql","content":"select 1;"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.name, "db");
        assert_eq!(parsed.request.local_port, 5433);
        assert_eq!(parsed.request.pgadmin_port, Some(8080));
        assert_eq!(parsed.request.scripts.len(), 1);
        assert_eq!(parsed.request.user, None);
    }
}
