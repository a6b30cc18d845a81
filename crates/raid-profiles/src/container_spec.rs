//! Deterministic container spec synthesis
//!
//! The Dockerfile layout is fixed so identical profiles always produce
//! identical build contexts; the orchestrator relies on this for image reuse.

use crate::profile::Profile;
use std::collections::HashMap;

/// Label applied to every produced image so the orchestrator can enumerate
/// and prune them.
pub const RAID_IMAGE_LABEL: &str = "org.raid.agent";

/// Synthesized build inputs for a worker image.
#[derive(Clone, Debug)]
pub struct ContainerSpec {
    pub dockerfile: String,
    pub requirements: String,
    pub labels: HashMap<String, String>,
}

/// Build the container spec for a profile.
pub fn build_container_spec(profile: &Profile) -> ContainerSpec {
    let docker = &profile.docker_config;

    let mut packages: Vec<String> = docker.additional_packages.clone().unwrap_or_default();
    // Slim images ship without pip; the tool runtime needs it
    if docker.base_image.contains("slim") && !packages.iter().any(|p| p == "python3-pip") {
        packages.push("python3-pip".to_string());
    }
    packages.sort();
    packages.dedup();

    let install_section = if packages.is_empty() {
        String::new()
    } else {
        format!(
            "RUN apt-get update -y && \\\n    apt-get install -y --no-install-recommends {} && \\\n    rm -rf /var/lib/apt/lists/*\n\n",
            packages.join(" ")
        )
    };

    let mut env_lines = vec![
        "ENV PYTHONUNBUFFERED=1".to_string(),
        format!("ENV RAID_SUB_AGENT_PROFILE={}", profile.name),
    ];
    if let Some(extra) = &docker.environment_variables {
        let mut keys: Vec<&String> = extra.keys().collect();
        keys.sort();
        for key in keys {
            env_lines.push(format!("ENV {}={}", key, extra[key]));
        }
    }

    let expose_section = docker
        .expose_port
        .map(|port| format!("\nEXPOSE {port}\n"))
        .unwrap_or_default();

    let dockerfile = format!(
        "# Dockerfile for {name}\n\
         FROM {base}\n\
         \n\
         WORKDIR {workdir}\n\
         \n\
         {env}\n\
         \n\
         {install}\
         COPY requirements.txt .\n\
         RUN python3 -m pip install --no-cache-dir -r requirements.txt\n\
         \n\
         COPY raid-worker /usr/local/bin/raid-worker\n\
         \n\
         COPY profiles/{name}.yaml ./profile.yaml\n\
         \n\
         CMD [\"raid-worker\"]\n\
         {expose}",
        name = profile.name,
        base = docker.base_image,
        workdir = docker.working_dir,
        env = env_lines.join("\n"),
        install = install_section,
        expose = expose_section,
    );

    let mut labels = HashMap::new();
    labels.insert(RAID_IMAGE_LABEL.to_string(), "true".to_string());
    labels.insert("org.raid.profile".to_string(), profile.name.clone());
    labels.insert("org.raid.version".to_string(), profile.version.clone());

    ContainerSpec {
        dockerfile,
        requirements: default_requirements(),
        labels,
    }
}

/// Python dependencies available to worker tools inside the image.
fn default_requirements() -> String {
    "requests>=2.28.0\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ContainerOptions;

    fn profile() -> Profile {
        Profile {
            name: "calculator_agent".to_string(),
            description: "math".to_string(),
            version: "1.0".to_string(),
            llm_config: Default::default(),
            tools: vec!["calculator".to_string()],
            system_prompt: "You compute.".to_string(),
            docker_config: ContainerOptions::default(),
            lifecycle_config: None,
        }
    }

    #[test]
    fn dockerfile_carries_profile_env_and_label() {
        let spec = build_container_spec(&profile());
        assert!(spec.dockerfile.contains("FROM python:3.11-slim"));
        assert!(spec
            .dockerfile
            .contains("ENV RAID_SUB_AGENT_PROFILE=calculator_agent"));
        assert!(spec.dockerfile.contains("ENV PYTHONUNBUFFERED=1"));
        assert!(spec.dockerfile.contains("COPY profiles/calculator_agent.yaml ./profile.yaml"));
        assert_eq!(spec.labels.get(RAID_IMAGE_LABEL).unwrap(), "true");
    }

    #[test]
    fn slim_image_gains_pip() {
        let spec = build_container_spec(&profile());
        assert!(spec.dockerfile.contains("python3-pip"));
    }

    #[test]
    fn expose_port_appended_when_set() {
        let mut p = profile();
        p.docker_config.expose_port = Some(8080);
        let spec = build_container_spec(&p);
        assert!(spec.dockerfile.contains("EXPOSE 8080"));
    }

    #[test]
    fn synthesis_is_deterministic() {
        let mut p = profile();
        let mut env = std::collections::HashMap::new();
        env.insert("B_VAR".to_string(), "2".to_string());
        env.insert("A_VAR".to_string(), "1".to_string());
        p.docker_config.environment_variables = Some(env);

        let first = build_container_spec(&p);
        let second = build_container_spec(&p);
        assert_eq!(first.dockerfile, second.dockerfile);
        // Sorted env keys
        let a = first.dockerfile.find("ENV A_VAR=1").unwrap();
        let b = first.dockerfile.find("ENV B_VAR=2").unwrap();
        assert!(a < b);
    }
}
