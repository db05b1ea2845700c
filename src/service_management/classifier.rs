//! Pure predicates deciding what a container is and how containers pair up.

use crate::engine::types::ContainerInfo;
use crate::service_management::catalog::{
    self, BASE_IMAGE_LABEL, PGADMIN_IMAGE, SERVICE_CONTAINER_LABEL, UNKNOWN,
};

/// True for containers running a catalog image, directly or through the base-image label.
pub fn is_service_image(container: &ContainerInfo) -> bool {
    container
        .label(BASE_IMAGE_LABEL)
        .is_some_and(|base| catalog::lookup(base).is_some())
        || catalog::lookup(&container.image).is_some()
}

pub fn is_admin_console_image(container: &ContainerInfo) -> bool {
    image_repository(&container.image) == PGADMIN_IMAGE
}

/// True when `admin` records `service`'s id in its service-container label.
pub fn is_admin_console_for_service(admin: &ContainerInfo, service: &ContainerInfo) -> bool {
    admin.label(SERVICE_CONTAINER_LABEL) == Some(service.id.as_str())
}

pub fn share_pod(admin: &ContainerInfo, service: &ContainerInfo) -> bool {
    matches!((&admin.pod, &service.pod), (Some(a), Some(b)) if a == b)
}

/// Ways an admin console can be tied to a service container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStrategy {
    SharedPod,
    ServiceLabel,
}

/// Evaluated in order; the first strategy with a match wins.
pub const PAIRING_STRATEGIES: [PairingStrategy; 2] =
    [PairingStrategy::SharedPod, PairingStrategy::ServiceLabel];

impl PairingStrategy {
    pub fn matches(&self, admin: &ContainerInfo, service: &ContainerInfo) -> bool {
        match self {
            PairingStrategy::SharedPod => share_pod(admin, service),
            PairingStrategy::ServiceLabel => is_admin_console_for_service(admin, service),
        }
    }
}

pub fn find_admin_console<'a>(
    service: &ContainerInfo,
    admins: &'a [ContainerInfo],
) -> Option<(&'a ContainerInfo, PairingStrategy)> {
    PAIRING_STRATEGIES.iter().find_map(|strategy| {
        admins
            .iter()
            .find(|admin| strategy.matches(admin, service))
            .map(|admin| (admin, *strategy))
    })
}

/// Byte offset of the `:` introducing the tag, ignoring registry ports and digests.
fn tag_separator(image_ref: &str) -> Option<usize> {
    let name = image_ref.split('@').next().unwrap_or(image_ref);
    let colon = name.rfind(':')?;
    match name.rfind('/') {
        Some(slash) if slash > colon => None,
        _ => Some(colon),
    }
}

/// The image reference without its tag or digest.
pub fn image_repository(image_ref: &str) -> &str {
    let name = image_ref.split('@').next().unwrap_or(image_ref);
    match tag_separator(name) {
        Some(colon) => &name[..colon],
        None => name,
    }
}

pub fn friendly_image_name(image_ref: &str) -> String {
    match catalog::lookup(image_ref) {
        Some(entry) => entry.label.to_string(),
        None => image_repository(image_ref).to_string(),
    }
}

pub fn image_version(image_ref: &str) -> String {
    match tag_separator(image_ref) {
        Some(colon) => image_ref[colon + 1..].to_string(),
        None => UNKNOWN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake_engine::container;

    fn labelled(id: &str, image: &str, key: &str, value: &str) -> ContainerInfo {
        let mut c = container(id, image);
        c.labels.insert(key.to_string(), value.to_string());
        c
    }

    #[test]
    fn plain_image_outside_catalog_is_not_a_service() {
        assert!(!is_service_image(&container("c", "httpd")));
    }

    #[test]
    fn catalog_images_are_services() {
        assert!(is_service_image(&container("c", "docker.io/library/postgres:v42")));
        assert!(is_service_image(&container("c", "docker.io/pgvector/pgvector:pg17")));
    }

    #[test]
    fn base_image_label_overrides_own_image() {
        let derived = labelled(
            "c",
            "my-image",
            BASE_IMAGE_LABEL,
            "docker.io/library/postgres:v42",
        );
        assert!(is_service_image(&derived));

        let unrelated = labelled("c", "my-image", BASE_IMAGE_LABEL, "my-base-image");
        assert!(!is_service_image(&unrelated));
    }

    #[test]
    fn admin_console_image_detection() {
        assert!(is_admin_console_image(&container("a", "docker.io/dpage/pgadmin4:v42")));
        assert!(is_admin_console_image(&container("a", "docker.io/dpage/pgadmin4")));
        assert!(!is_admin_console_image(&container("a", "my-image")));
        assert!(!is_admin_console_image(&container("a", "docker.io/dpage/pgadmin4-fork:1")));
    }

    #[test]
    fn label_pairing_requires_matching_id() {
        let service = container("container1", "docker.io/library/postgres:16");
        let admin = labelled("a", PGADMIN_IMAGE, SERVICE_CONTAINER_LABEL, "container1");
        let other = labelled("a", PGADMIN_IMAGE, SERVICE_CONTAINER_LABEL, "container2");
        let unlabelled = container("a", PGADMIN_IMAGE);

        assert!(is_admin_console_for_service(&admin, &service));
        assert!(!is_admin_console_for_service(&other, &service));
        assert!(!is_admin_console_for_service(&unlabelled, &service));
    }

    #[test]
    fn pod_pairing_takes_precedence_over_labels() {
        let mut service = container("db", "docker.io/library/postgres:16");
        service.pod = Some("pod1".to_string());

        let by_label = labelled("admin-label", PGADMIN_IMAGE, SERVICE_CONTAINER_LABEL, "db");
        let mut by_pod = container("admin-pod", PGADMIN_IMAGE);
        by_pod.pod = Some("pod1".to_string());

        let admins = vec![by_label, by_pod];
        let (admin, strategy) = find_admin_console(&service, &admins).unwrap();
        assert_eq!(admin.id, "admin-pod");
        assert_eq!(strategy, PairingStrategy::SharedPod);
    }

    #[test]
    fn containers_outside_pods_never_share_one() {
        let service = container("db", "docker.io/library/postgres:16");
        let admin = container("admin", PGADMIN_IMAGE);
        assert!(!share_pod(&admin, &service));
        assert!(find_admin_console(&service, &[admin]).is_none());
    }

    #[test]
    fn friendly_names() {
        assert_eq!(
            friendly_image_name("docker.io/library/postgres:16"),
            "postgres Docker Official Image"
        );
        assert_eq!(friendly_image_name("quay.io/me/x:1"), "quay.io/me/x");
        assert_eq!(friendly_image_name("quay.io/me/my-image:v42"), "quay.io/me/my-image");
        assert_eq!(friendly_image_name("localhost:5000/pg"), "localhost:5000/pg");
    }

    #[test]
    fn versions() {
        assert_eq!(image_version("a:b"), "b");
        assert_eq!(image_version("a"), "unknown");
        assert_eq!(image_version("docker.io/library/postgres:16.2"), "16.2");
        assert_eq!(image_version("localhost:5000/pg"), "unknown");
        assert_eq!(image_version("localhost:5000/pg:15"), "15");
    }
}
