//! Docker Engine implementation of the container runtime

use crate::runtime::{canonical_name, image_tag, ContainerRuntime, OrchestratorError};
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::{BuildImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use dashmap::DashMap;
use futures::StreamExt;
use raid_profiles::{build_container_spec, Profile, RAID_IMAGE_LABEL};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct DockerRuntime {
    docker: Docker,
    /// Path to the worker binary shipped into build contexts.
    worker_binary: PathBuf,
    /// Serialises ensure_running per canonical name.
    name_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Deduplicates concurrent builds per image tag.
    build_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, OrchestratorError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| OrchestratorError::Unreachable(e.to_string()))?;
        Ok(Self {
            docker,
            worker_binary: PathBuf::from("raid-worker"),
            name_locks: DashMap::new(),
            build_locks: DashMap::new(),
        })
    }

    pub fn with_worker_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_binary = path.into();
        self
    }

    fn lock_for(map: &DashMap<String, Arc<Mutex<()>>>, key: &str) -> Arc<Mutex<()>> {
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Tar archive holding the synthesized build context.
    fn build_context(&self, profile: &Profile) -> Result<Vec<u8>, OrchestratorError> {
        let spec = build_container_spec(profile);

        let mut builder = tar::Builder::new(Vec::new());
        append_file(&mut builder, "Dockerfile", spec.dockerfile.as_bytes())?;
        append_file(&mut builder, "requirements.txt", spec.requirements.as_bytes())?;

        let profile_yaml = profile
            .to_yaml()
            .map_err(|e| OrchestratorError::Api(e.to_string()))?;
        append_file(
            &mut builder,
            &format!("profiles/{}.yaml", profile.name),
            profile_yaml.as_bytes(),
        )?;

        let worker = std::fs::read(&self.worker_binary).map_err(|e| {
            OrchestratorError::BuildFailed {
                message: format!(
                    "worker binary not found at {}: {e}",
                    self.worker_binary.display()
                ),
                build_log: String::new(),
            }
        })?;
        append_executable(&mut builder, "raid-worker", &worker)?;

        builder
            .into_inner()
            .map_err(|e| OrchestratorError::Api(e.to_string()))
    }

    async fn find_image(&self, tag: &str) -> Option<String> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{RAID_IMAGE_LABEL}=true")]);
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await
            .ok()?;

        images
            .into_iter()
            .find(|img| img.repo_tags.iter().any(|t| t == tag))
            .map(|img| img.id)
    }

    /// Image ids referenced by any container, live or exited.
    async fn images_in_use(&self) -> HashSet<String> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .unwrap_or_default();

        containers
            .into_iter()
            .filter_map(|c| c.image_id)
            .collect()
    }
}

fn append_file(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &str,
    data: &[u8],
) -> Result<(), OrchestratorError> {
    append_with_mode(builder, path, data, 0o644)
}

fn append_executable(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &str,
    data: &[u8],
) -> Result<(), OrchestratorError> {
    append_with_mode(builder, path, data, 0o755)
}

fn append_with_mode(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &str,
    data: &[u8],
    mode: u32,
) -> Result<(), OrchestratorError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    builder
        .append_data(&mut header, path, data)
        .map_err(|e| OrchestratorError::Api(e.to_string()))
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), OrchestratorError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| OrchestratorError::Unreachable(e.to_string()))
    }

    async fn ensure_image(&self, profile: &Profile) -> Result<String, OrchestratorError> {
        let tag = image_tag(profile);
        let lock = Self::lock_for(&self.build_locks, &tag);
        let _guard = lock.lock().await;

        // A concurrent build may have finished while we waited on the lock
        if let Some(id) = self.find_image(&tag).await {
            debug!("reusing image {} ({})", tag, &id[..id.len().min(19)]);
            return Ok(id);
        }

        info!("building image {}", tag);
        let context = self.build_context(profile)?;
        let spec = build_container_spec(profile);

        let options = BuildImageOptions::<String> {
            dockerfile: "Dockerfile".to_string(),
            t: tag.clone(),
            rm: true,
            labels: spec.labels.into_iter().collect(),
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(context.into()));

        let mut build_log = String::new();
        let mut image_id: Option<String> = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(line) = info.stream {
                        build_log.push_str(&line);
                    }
                    if let Some(error) = info.error {
                        return Err(OrchestratorError::BuildFailed {
                            message: error,
                            build_log,
                        });
                    }
                    if let Some(aux) = info.aux {
                        image_id = aux.id;
                    }
                }
                Err(e) => {
                    return Err(OrchestratorError::BuildFailed {
                        message: e.to_string(),
                        build_log,
                    })
                }
            }
        }

        info!("built image {}", tag);
        Ok(image_id.unwrap_or(tag))
    }

    async fn ensure_running(
        &self,
        profile: &Profile,
        env: &HashMap<String, String>,
    ) -> Result<String, OrchestratorError> {
        let name = canonical_name(&profile.name);
        let lock = Self::lock_for(&self.name_locks, &name);
        let _guard = lock.lock().await;

        match self.docker.inspect_container(&name, None).await {
            Ok(existing) => {
                let running = existing
                    .state
                    .as_ref()
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                if running {
                    debug!("reusing running container {}", name);
                    return Ok(name);
                }
                // Exists but stopped: remove and recreate below
                debug!("removing stopped container {}", name);
                self.docker
                    .remove_container(
                        &name,
                        Some(RemoveContainerOptions {
                            force: true,
                            v: true,
                            ..Default::default()
                        }),
                    )
                    .await
                    .map_err(|e| OrchestratorError::Api(e.to_string()))?;
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(OrchestratorError::Api(e.to_string())),
        }

        let tag = image_tag(profile);
        self.ensure_image(profile).await?;

        let env_vec: Vec<String> = {
            let mut keys: Vec<&String> = env.keys().collect();
            keys.sort();
            keys.iter().map(|k| format!("{}={}", k, env[*k])).collect()
        };

        let spec = build_container_spec(profile);
        let config = Config {
            image: Some(tag.clone()),
            env: Some(env_vec),
            labels: Some(spec.labels.into_iter().collect()),
            host_config: Some(HostConfig {
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                // Workers reach the host-side broker through the gateway
                extra_hosts: Some(vec!["host.docker.internal:host-gateway".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| OrchestratorError::StartFailed(e.to_string()))?;

        self.docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| OrchestratorError::StartFailed(e.to_string()))?;

        info!("started container {}", name);
        Ok(name)
    }

    async fn stop(&self, handle: &str) -> Result<(), OrchestratorError> {
        match self
            .docker
            .stop_container(handle, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(OrchestratorError::Api(e.to_string())),
        }
    }

    async fn remove(&self, handle: &str) -> Result<(), OrchestratorError> {
        match self
            .docker
            .remove_container(
                handle,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(OrchestratorError::Api(e.to_string())),
        }
    }

    async fn is_running(&self, handle: &str) -> Result<bool, OrchestratorError> {
        match self.docker.inspect_container(handle, None).await {
            Ok(info) => Ok(info.state.and_then(|s| s.running).unwrap_or(false)),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(OrchestratorError::Api(e.to_string())),
        }
    }

    async fn logs(&self, handle: &str, tail: usize) -> Result<String, OrchestratorError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(handle, Some(options));
        let mut output = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => output.push_str(&chunk.to_string()),
                Err(e) if is_not_found(&e) => return Ok(String::new()),
                Err(e) => return Err(OrchestratorError::Api(e.to_string())),
            }
        }
        Ok(output)
    }

    async fn prune_unused_images(&self, keep_n: usize) -> Result<usize, OrchestratorError> {
        let mut removed = 0usize;

        // Dangling images first
        let mut filters = HashMap::new();
        filters.insert("dangling".to_string(), vec!["true".to_string()]);
        let dangling = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await
            .unwrap_or_default();
        for image in dangling {
            match self
                .docker
                .remove_image(&image.id, None::<RemoveImageOptions>, None)
                .await
            {
                Ok(_) => removed += 1,
                Err(e) => warn!("could not remove dangling image {}: {}", image.id, e),
            }
        }

        // Labeled worker images, newest first
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{RAID_IMAGE_LABEL}=true")]);
        let mut labeled = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await
            .unwrap_or_default();
        labeled.sort_by_key(|img| std::cmp::Reverse(img.created));

        let in_use = self.images_in_use().await;

        let mut kept = 0usize;
        for image in labeled {
            if in_use.contains(&image.id) {
                continue;
            }
            if kept < keep_n {
                kept += 1;
                continue;
            }
            match self
                .docker
                .remove_image(&image.id, None::<RemoveImageOptions>, None)
                .await
            {
                Ok(_) => {
                    debug!("pruned image {}", image.id);
                    removed += 1;
                }
                // In-use races are expected; skip and keep going
                Err(e) => warn!("could not prune image {}: {}", image.id, e),
            }
        }

        if removed > 0 {
            info!("pruned {} unused image(s)", removed);
        }
        Ok(removed)
    }
}
