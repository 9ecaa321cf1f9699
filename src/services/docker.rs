use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::service::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::pin::pin;
use tracing::{debug, error, info, warn};

use crate::errors::{DblessError, DblessResult};
use crate::models::{ContainerHandle, ContainerSpec};

/// Seconds Docker waits for the database to exit before killing it.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Creates and destroys the throwaway database container.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a container for `spec`. On error no container is left behind.
    async fn start(&self, spec: &ContainerSpec) -> DblessResult<ContainerHandle>;

    /// Stop and remove the container. Never fails; problems are logged.
    async fn stop(&self, handle: &ContainerHandle);
}

#[derive(Clone)]
pub struct DockerService {
    docker: Docker,
}

impl DockerService {
    pub async fn new() -> Result<Self, DockerError> {
        Self::from_client(Docker::connect_with_local_defaults()?).await
    }

    /// Connect for a run that will start `image`. An unreachable daemon is
    /// reported as a failure to start that image.
    pub async fn for_image(image: &str) -> DblessResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|source| start_failed(image, source))?;
        Self::ready_for(docker, image).await
    }

    async fn ready_for(docker: Docker, image: &str) -> DblessResult<Self> {
        Self::from_client(docker)
            .await
            .map_err(|source| start_failed(image, source))
    }

    #[tracing::instrument(skip(docker))]
    async fn from_client(docker: Docker) -> Result<Self, DockerError> {
        let version = docker.version().await?;
        info!(version = ?version.version, "Docker service initialized successfully");
        Ok(Self { docker })
    }

    /// Pull `image` unless it is already present locally.
    pub async fn ensure_image(&self, image: &str) -> Result<(), DockerError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => {
                debug!("Image already present: {}", image);
                return Ok(());
            }
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(e),
        }

        info!("Pulling image: {}", image);
        let (from_image, tag) = split_image_tag(image);
        let options = Some(CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        });

        let mut stream = pin!(self.docker.create_image(options, None, None));
        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if let Some(message) = progress.error {
                error!("Image pull failed: {}", message);
                return Err(DockerError::DockerStreamError { error: message });
            }

            let layer = progress.id.as_deref().unwrap_or("-");
            match progress.status.as_deref() {
                Some(status @ ("Downloading" | "Extracting")) => {
                    let detail = progress.progress_detail.unwrap_or_default();
                    debug!(
                        layer,
                        current = detail.current.unwrap_or(0),
                        total = detail.total.unwrap_or(0),
                        "{}",
                        status
                    );
                }
                Some(status) => info!(layer, "{}", status),
                None => {}
            }
        }

        info!("Image pulled: {}", image);
        Ok(())
    }

    /// Find a container by exact name, running or not.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<String>, DockerError> {
        let options = Some(ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([("name".to_string(), vec![name.to_string()])]),
            ..Default::default()
        });
        let wanted = format!("/{name}");

        let containers = match self.docker.list_containers(options).await {
            Ok(containers) => containers,
            Err(e) => {
                error!("Failed to list containers: {}", e);
                return Err(e);
            }
        };

        // The name filter matches substrings, so compare exactly.
        Ok(containers
            .into_iter()
            .find(|c| {
                c.names
                    .as_ref()
                    .is_some_and(|names| names.iter().any(|n| *n == wanted))
            })
            .and_then(|c| c.id))
    }

    /// Stop and remove the container called `name`. Returns false if none existed.
    pub async fn stop_by_name(&self, name: &str) -> Result<bool, DockerError> {
        let Some(id) = self.find_by_name(name).await? else {
            warn!("No container to stop: {}", name);
            return Ok(false);
        };

        info!("Stopping container: {}", name);
        self.stop_and_remove(&id).await?;
        Ok(true)
    }

    async fn stop_and_remove(&self, container_id: &str) -> Result<(), DockerError> {
        match self
            .docker
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await
        {
            Ok(()) => {}
            // 304: already stopped
            Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => {}
            Err(e) => warn!("Failed to stop container {}: {}", container_id, e),
        }

        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;
        info!("Container removed: {}", container_id);
        Ok(())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, DockerError> {
        self.ensure_image(&spec.image).await?;

        if self.stop_by_name(&spec.name).await? {
            info!("Removed stale container: {}", spec.name);
        }

        info!("Creating container {} from image {}", spec.name, spec.image);
        let options = Some(CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        });
        let config = container_config(spec);

        let container_id = match self.docker.create_container(options, config).await {
            Ok(response) => response.id,
            Err(e) => {
                error!("Failed to create container: {}", e);
                return Err(e);
            }
        };

        if let Err(e) = self
            .docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
        {
            error!("Failed to start container {}: {}", container_id, e);
            if let Err(cleanup) = self.stop_and_remove(&container_id).await {
                warn!(
                    "Failed to remove unstarted container {}: {}",
                    container_id, cleanup
                );
            }
            return Err(e);
        }

        info!("Container started: {}", container_id);
        Ok(container_id)
    }
}

#[async_trait]
impl ContainerRuntime for DockerService {
    async fn start(&self, spec: &ContainerSpec) -> DblessResult<ContainerHandle> {
        let id = self
            .create_and_start(spec)
            .await
            .map_err(|source| start_failed(&spec.image, source))?;

        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn stop(&self, handle: &ContainerHandle) {
        info!("Stopping container: {}", handle.name);
        if let Err(e) = self.stop_and_remove(&handle.id).await {
            warn!("Failed to remove container {}: {}", handle.name, e);
        }
    }
}

fn start_failed(image: &str, source: DockerError) -> DblessError {
    DblessError::ContainerStart {
        image: image.to_string(),
        source,
    }
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    let mut exposed_ports = HashMap::new();
    let mut port_bindings = HashMap::new();

    for mapping in &spec.ports {
        let key = mapping.container_port();
        exposed_ports.insert(key.clone(), HashMap::new());
        port_bindings
            .entry(key)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: None,
                host_port: Some(mapping.host_port.to_string()),
            });
    }

    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env_list()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Split `repo[:tag]` so an untagged pull fetches `latest` rather than every tag.
fn split_image_tag(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PortMapping;

    #[test]
    fn splits_image_tags() {
        assert_eq!(
            split_image_tag("postgres:14.5-alpine"),
            ("postgres", "14.5-alpine")
        );
        assert_eq!(split_image_tag("postgres"), ("postgres", "latest"));
        assert_eq!(
            split_image_tag("localhost:5000/postgres"),
            ("localhost:5000/postgres", "latest")
        );
        assert_eq!(
            split_image_tag("localhost:5000/postgres:15"),
            ("localhost:5000/postgres", "15")
        );
        assert_eq!(
            split_image_tag("postgres@sha256:abcd"),
            ("postgres@sha256:abcd", "")
        );
    }

    #[tokio::test]
    async fn unreachable_daemon_is_start_error() {
        let docker =
            Docker::connect_with_http("http://127.0.0.1:1", 2, bollard::API_DEFAULT_VERSION)
                .unwrap();

        let err = DockerService::ready_for(docker, "postgres:14.5-alpine")
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            DblessError::ContainerStart { ref image, .. } if image == "postgres:14.5-alpine"
        ));
    }

    #[test]
    fn builds_port_bindings_and_env() {
        let spec = ContainerSpec {
            name: "dbless".to_string(),
            image: "postgres:14.5-alpine".to_string(),
            env: vec![("POSTGRES_PASSWORD".to_string(), "123456".to_string())],
            ports: vec![PortMapping::new("5432", 5433).unwrap()],
        };

        let config = container_config(&spec);

        assert_eq!(config.image.as_deref(), Some("postgres:14.5-alpine"));
        assert_eq!(
            config.env,
            Some(vec!["POSTGRES_PASSWORD=123456".to_string()])
        );
        assert!(config.exposed_ports.unwrap().contains_key("5432/tcp"));

        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        let binding = &bindings["5432/tcp"].as_ref().unwrap()[0];
        assert_eq!(binding.host_port.as_deref(), Some("5433"));
    }
}
