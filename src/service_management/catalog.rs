//! Known database images and the labels, ports and variable names shared by
//! classification and provisioning.

use serde::Serialize;

/// Label recording the catalog image a derived image was built from.
pub const BASE_IMAGE_LABEL: &str = "postgres.baseImage";
/// Label on a standalone admin console pointing at its database container.
pub const SERVICE_CONTAINER_LABEL: &str = "postgres.containerId";
/// Label carrying the host port of the admin console.
pub const PGADMIN_PORT_LABEL: &str = "pgadmin.localPort";

pub const PGADMIN_IMAGE: &str = "docker.io/dpage/pgadmin4";
pub const PGADMIN_IMAGE_TAG: &str = "latest";

pub const POSTGRES_PORT: u16 = 5432;
pub const PGADMIN_PORT: u16 = 80;
pub const INIT_SCRIPTS_DIR: &str = "/docker-entrypoint-initdb.d";

pub const POSTGRES_PASSWORD_ENV: &str = "POSTGRES_PASSWORD";
pub const POSTGRES_DB_ENV: &str = "POSTGRES_DB";
pub const POSTGRES_USER_ENV: &str = "POSTGRES_USER";
pub const DEFAULT_USER: &str = "postgres";

pub const UNKNOWN: &str = "unknown";

/// One catalog entry: an image-name prefix and its display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceImage {
    pub prefix: &'static str,
    pub label: &'static str,
}

/// Ordered catalog; the first matching prefix wins.
pub const SERVICE_IMAGES: &[ServiceImage] = &[
    ServiceImage {
        prefix: "docker.io/library/postgres:",
        label: "postgres Docker Official Image",
    },
    ServiceImage {
        prefix: "docker.io/pgvector/pgvector:",
        label: "pgvector/pgvector",
    },
];

pub fn service_images() -> &'static [ServiceImage] {
    SERVICE_IMAGES
}

pub fn lookup(image_ref: &str) -> Option<&'static ServiceImage> {
    SERVICE_IMAGES
        .iter()
        .find(|entry| image_ref.starts_with(entry.prefix))
}

pub fn pgadmin_image() -> String {
    format!("{}:{}", PGADMIN_IMAGE, PGADMIN_IMAGE_TAG)
}
