//! In-memory container runtime
//!
//! Mirrors the Docker adapter's observable semantics so the lifecycle
//! supervisor and engine can be exercised without a container engine.
//! Test knobs simulate container death and stop failures.

use crate::runtime::{canonical_name, image_tag, ContainerRuntime, OrchestratorError};
use raid_profiles::Profile;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

struct FakeContainer {
    image: String,
    running: bool,
    env: HashMap<String, String>,
}

#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
    /// Image tag -> creation order (monotonic).
    images: Mutex<HashMap<String, usize>>,
    image_counter: AtomicUsize,
    build_count: AtomicUsize,
    fail_stop: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the container engine losing a container.
    pub fn kill(&self, handle: &str) {
        if let Some(c) = self.containers.lock().expect("containers").get_mut(handle) {
            c.running = false;
        }
    }

    /// Make subsequent `stop` calls fail.
    pub fn fail_stops(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn build_count(&self) -> usize {
        self.build_count.load(Ordering::SeqCst)
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().expect("containers").len()
    }

    pub fn image_count(&self) -> usize {
        self.images.lock().expect("images").len()
    }

    pub fn env_of(&self, handle: &str) -> Option<HashMap<String, String>> {
        self.containers
            .lock()
            .expect("containers")
            .get(handle)
            .map(|c| c.env.clone())
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn ensure_image(&self, profile: &Profile) -> Result<String, OrchestratorError> {
        let tag = image_tag(profile);
        let mut images = self.images.lock().expect("images");
        if !images.contains_key(&tag) {
            let order = self.image_counter.fetch_add(1, Ordering::SeqCst);
            images.insert(tag.clone(), order);
            self.build_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(tag)
    }

    async fn ensure_running(
        &self,
        profile: &Profile,
        env: &HashMap<String, String>,
    ) -> Result<String, OrchestratorError> {
        let name = canonical_name(&profile.name);
        let image = self.ensure_image(profile).await?;

        let mut containers = self.containers.lock().expect("containers");
        match containers.get_mut(&name) {
            Some(existing) if existing.running => {}
            _ => {
                containers.insert(
                    name.clone(),
                    FakeContainer {
                        image,
                        running: true,
                        env: env.clone(),
                    },
                );
            }
        }
        Ok(name)
    }

    async fn stop(&self, handle: &str) -> Result<(), OrchestratorError> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Api("simulated stop failure".to_string()));
        }
        if let Some(c) = self.containers.lock().expect("containers").get_mut(handle) {
            c.running = false;
        }
        Ok(())
    }

    async fn remove(&self, handle: &str) -> Result<(), OrchestratorError> {
        self.containers.lock().expect("containers").remove(handle);
        Ok(())
    }

    async fn is_running(&self, handle: &str) -> Result<bool, OrchestratorError> {
        Ok(self
            .containers
            .lock()
            .expect("containers")
            .get(handle)
            .map(|c| c.running)
            .unwrap_or(false))
    }

    async fn logs(&self, _handle: &str, _tail: usize) -> Result<String, OrchestratorError> {
        Ok(String::new())
    }

    async fn prune_unused_images(&self, keep_n: usize) -> Result<usize, OrchestratorError> {
        let referenced: std::collections::HashSet<String> = self
            .containers
            .lock()
            .expect("containers")
            .values()
            .map(|c| c.image.clone())
            .collect();

        let mut images = self.images.lock().expect("images");
        let mut unreferenced: Vec<(String, usize)> = images
            .iter()
            .filter(|(tag, _)| !referenced.contains(*tag))
            .map(|(tag, order)| (tag.clone(), *order))
            .collect();
        // Newest first
        unreferenced.sort_by_key(|(_, order)| std::cmp::Reverse(*order));

        let mut removed = 0;
        for (tag, _) in unreferenced.into_iter().skip(keep_n) {
            images.remove(&tag);
            removed += 1;
        }
        Ok(removed)
    }
}
