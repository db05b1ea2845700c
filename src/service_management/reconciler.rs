use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::engine::types::{ContainerEvent, ContainerInfo, EngineEvent, PortMapping};
use crate::engine::ContainerEngine;
use crate::error_handling::types::{EngineError, ServiceError};
use crate::service_management::catalog::{
    self, BASE_IMAGE_LABEL, DEFAULT_USER, PGADMIN_PORT, PGADMIN_PORT_LABEL, POSTGRES_DB_ENV,
    POSTGRES_PASSWORD_ENV, POSTGRES_PORT, POSTGRES_USER_ENV, UNKNOWN,
};
use crate::service_management::classifier;
use crate::service_management::registry::ServiceRegistry;
use crate::service_management::types::TrackedService;
use crate::transport::{StateMessage, UiTransport};

/// What caused a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileTrigger {
    /// Rebuild unconditionally.
    Full,
    /// Rebuild only if one of these containers is a service, an admin console or tracked.
    Containers(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// None of the triggering containers were relevant.
    Skipped,
    Rebuilt { tracked: usize, dropped: usize },
}

/// Maps an engine event to the pass it should cause, if any.
pub fn trigger_for(event: &EngineEvent) -> Option<ReconcileTrigger> {
    match event {
        EngineEvent::Container(ContainerEvent { kind, status, id }) => {
            if kind != "container" || status == "health_status" {
                return None;
            }
            if status == "remove" {
                Some(ReconcileTrigger::Full)
            } else {
                Some(ReconcileTrigger::Containers(vec![id.clone()]))
            }
        }
        EngineEvent::Provider(_) => Some(ReconcileTrigger::Full),
    }
}

/// Folds triggers queued behind a running pass into the next one.
///
/// A full pass absorbs everything else; otherwise duplicate ids collapse and the
/// first-seen order is kept.
pub fn coalesce(triggers: Vec<ReconcileTrigger>) -> Option<ReconcileTrigger> {
    let mut ids: Vec<String> = Vec::new();
    for trigger in triggers {
        match trigger {
            ReconcileTrigger::Full => return Some(ReconcileTrigger::Full),
            ReconcileTrigger::Containers(batch) => {
                for id in batch {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
    }
    if ids.is_empty() {
        None
    } else {
        Some(ReconcileTrigger::Containers(ids))
    }
}

/// Sole writer of the [`ServiceRegistry`].
pub struct Reconciler {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn UiTransport>,
    sequence: AtomicU64,
}

impl Reconciler {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn UiTransport>,
    ) -> Self {
        Self {
            engine,
            registry,
            transport,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Runs one pass. With a triggering id the pass is skipped unless that container
    /// is a service, an admin console or already tracked.
    pub async fn reconcile(&self, trigger: Option<&str>) -> Result<PassOutcome, ServiceError> {
        match trigger {
            Some(id) => self.reconcile_matching(&[id.to_string()]).await,
            None => self.reconcile_matching(&[]).await,
        }
    }

    pub async fn reconcile_trigger(
        &self,
        trigger: &ReconcileTrigger,
    ) -> Result<PassOutcome, ServiceError> {
        match trigger {
            ReconcileTrigger::Full => self.reconcile(None).await,
            ReconcileTrigger::Containers(ids) => self.reconcile_matching(ids).await,
        }
    }

    /// An empty `ids` slice means a full pass.
    async fn reconcile_matching(&self, ids: &[String]) -> Result<PassOutcome, ServiceError> {
        let containers = self.engine.list_containers().await?;

        let (services, admins): (Vec<ContainerInfo>, Vec<ContainerInfo>) = containers
            .into_iter()
            .filter(|c| classifier::is_service_image(c) || classifier::is_admin_console_image(c))
            .partition(classifier::is_service_image);

        if !ids.is_empty() {
            let known = self.registry.snapshot();
            let relevant = ids.iter().any(|id| known.contains_key(id))
                || services
                    .iter()
                    .chain(admins.iter())
                    .any(|c| ids.iter().any(|id| *id == c.id));
            if !relevant {
                debug!("Skipping pass, no relevant container among {:?}", ids);
                return Ok(PassOutcome::Skipped);
            }
        }

        let mut entries = BTreeMap::new();
        for service in &services {
            let entry = self.build_entry(service, &admins).await?;
            entries.insert(entry.container_id.clone(), entry);
        }

        let tracked = entries.len();
        let dropped = self.registry.replace(entries);
        if !dropped.is_empty() {
            info!("No longer tracking {:?}", dropped);
        }
        info!(
            "Reconciled {} services ({} admin consoles seen)",
            tracked,
            admins.len()
        );

        self.publish();
        Ok(PassOutcome::Rebuilt {
            tracked,
            dropped: dropped.len(),
        })
    }

    async fn build_entry(
        &self,
        service: &ContainerInfo,
        admins: &[ContainerInfo],
    ) -> Result<TrackedService, EngineError> {
        let inspect = self
            .engine
            .inspect_container(&service.engine_id, &service.id)
            .await?;

        let admin_port = match classifier::find_admin_console(service, admins) {
            Some((admin, strategy)) => {
                debug!(
                    "Paired admin console {} with {} ({:?})",
                    admin.id, service.id, strategy
                );
                resolve_admin_port(service, admin)
            }
            None => None,
        };

        let image_ref = service
            .label(BASE_IMAGE_LABEL)
            .filter(|base| catalog::lookup(base).is_some())
            .unwrap_or(&service.image);

        let user = inspect
            .env_value(POSTGRES_USER_ENV)
            .unwrap_or(DEFAULT_USER)
            .to_string();
        let db_name = inspect
            .env_value(POSTGRES_DB_ENV)
            .map(str::to_string)
            .unwrap_or_else(|| user.clone());
        let password = inspect
            .env_value(POSTGRES_PASSWORD_ENV)
            .unwrap_or(UNKNOWN)
            .to_string();

        let entry = TrackedService {
            container_id: service.id.clone(),
            engine_id: service.engine_id.clone(),
            name: display_name(&service.names),
            running: inspect.running,
            image_name: classifier::friendly_image_name(image_ref),
            image_version: classifier::image_version(image_ref),
            port: exposed_port(&service.ports),
            db_name,
            user,
            password,
            pgadmin: false,
            pgadmin_port: None,
        };
        Ok(entry.with_admin_console(admin_port))
    }

    /// Pushes the current registry to the UI. Failures are logged only.
    pub fn publish(&self) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let message = StateMessage::new(sequence, self.registry.list());
        if let Err(e) = self.transport.post_state(&message) {
            warn!("Unable to publish services state #{}: {}", sequence, e);
        }
    }

    /// Consumes engine events until the channel closes, one pass at a time.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<EngineEvent>) {
        info!("Reconciliation loop started");
        while let Some(event) = events.recv().await {
            let mut pending: Vec<ReconcileTrigger> = trigger_for(&event).into_iter().collect();
            while let Ok(queued) = events.try_recv() {
                pending.extend(trigger_for(&queued));
            }
            let Some(trigger) = coalesce(pending) else {
                continue;
            };
            if let Err(e) = self.reconcile_trigger(&trigger).await {
                error!("Reconciliation pass failed: {}", e);
            }
        }
        info!("Engine event stream closed, reconciliation loop exiting");
    }
}

/// Admin port from the admin console's label, then the service's, then the
/// console's own mapping of its HTTP port.
fn resolve_admin_port(service: &ContainerInfo, admin: &ContainerInfo) -> Option<u16> {
    let labelled = admin
        .label(PGADMIN_PORT_LABEL)
        .or_else(|| service.label(PGADMIN_PORT_LABEL))
        .and_then(|value| value.parse::<u16>().ok());
    labelled.or_else(|| {
        admin
            .ports
            .iter()
            .find(|p| p.container_port == PGADMIN_PORT && p.host_port != 0)
            .map(|p| p.host_port)
    })
}

fn display_name(names: &[String]) -> String {
    names
        .first()
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn exposed_port(ports: &[PortMapping]) -> u16 {
    ports
        .iter()
        .find(|p| p.container_port == POSTGRES_PORT)
        .or_else(|| ports.first())
        .map(|p| p.host_port)
        .unwrap_or(0)
}
