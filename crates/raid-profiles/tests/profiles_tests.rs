//! Tests for raid-profiles: YAML round-trips, registry, roles, dynamic bounds

use raid_profiles::*;

fn sample_yaml() -> &'static str {
    r#"
name: calculator_agent
description: Mathematical specialist
version: "1.0"
llm_config:
  model: gpt-4o-mini
  temperature: 0.2
tools:
  - calculator
system_prompt: You are a calculator agent.
docker_config:
  base_image: python:3.11-slim
  working_dir: /app
lifecycle_config:
  persistent: false
  auto_cleanup: true
  exclude_from_count: false
"#
}

// ===========================================================================
// Profile model
// ===========================================================================

#[test]
fn profile_parses_from_yaml() {
    let profile = Profile::from_yaml(sample_yaml()).unwrap();
    assert_eq!(profile.name, "calculator_agent");
    assert_eq!(profile.tools, vec!["calculator"]);
    assert_eq!(profile.docker_config.base_image, "python:3.11-slim");
    assert!(!profile.lifecycle().persistent);
    assert!(profile.lifecycle().auto_cleanup);
}

#[test]
fn profile_yaml_roundtrip() {
    let profile = Profile::from_yaml(sample_yaml()).unwrap();
    let yaml = profile.to_yaml().unwrap();
    let back = Profile::from_yaml(&yaml).unwrap();
    assert_eq!(profile, back);
}

#[test]
fn lifecycle_defaults_when_absent() {
    let yaml = sample_yaml().replace("lifecycle_config:", "ignored_key:");
    let yaml: String = yaml
        .lines()
        .filter(|l| !l.contains("persistent:") && !l.contains("auto_cleanup:") && !l.contains("exclude_from_count:") && !l.contains("ignored_key"))
        .collect::<Vec<_>>()
        .join("\n");
    let profile = Profile::from_yaml(&yaml).unwrap();
    let lifecycle = profile.lifecycle();
    assert!(!lifecycle.persistent);
    assert!(lifecycle.auto_cleanup);
    assert!(!lifecycle.exclude_from_count);
}

#[test]
fn validate_rejects_unknown_tool() {
    let profile = Profile::from_yaml(sample_yaml()).unwrap();
    assert!(profile.validate(&["calculator"]).is_ok());
    let err = profile.validate(&["run_bash_command"]).unwrap_err();
    assert!(err.to_string().contains("unknown tool"));
}

// ===========================================================================
// ProfileRegistry
// ===========================================================================

#[test]
fn registry_save_load_list() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ProfileRegistry::new(dir.path()).with_known_tools(&["calculator"]);

    let profile = Profile::from_yaml(sample_yaml()).unwrap();
    registry.save(&profile).unwrap();

    assert_eq!(registry.list(), vec!["calculator_agent"]);
    let loaded = registry.load("calculator_agent").unwrap();
    assert_eq!(loaded, profile);

    let all = registry.all();
    assert_eq!(all.len(), 1);
    assert!(all.contains_key("calculator_agent"));
}

#[test]
fn registry_load_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ProfileRegistry::new(dir.path());
    let err = registry.load("ghost").unwrap_err();
    assert!(matches!(err, raid_core::Error::ProfileNotFound(_)));
}

#[test]
fn registry_falls_back_to_container_profile() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("profile.yaml"), sample_yaml()).unwrap();

    let registry = ProfileRegistry::new(dir.path());
    // Any name resolves to the fixed container path when present
    let loaded = registry.load("calculator_agent").unwrap();
    assert_eq!(loaded.name, "calculator_agent");
}

#[test]
fn registry_remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ProfileRegistry::new(dir.path());
    let profile = Profile::from_yaml(sample_yaml()).unwrap();
    registry.save(&profile).unwrap();

    registry.remove("calculator_agent").unwrap();
    registry.remove("calculator_agent").unwrap();
    assert!(registry.list().is_empty());
}

#[test]
fn registry_rejects_saving_invalid_profile() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ProfileRegistry::new(dir.path()).with_known_tools(&["calculator"]);

    let mut profile = Profile::from_yaml(sample_yaml()).unwrap();
    profile.tools = vec!["nonexistent_tool".to_string()];
    assert!(registry.save(&profile).is_err());
}

// ===========================================================================
// Roles
// ===========================================================================

#[test]
fn suggest_role_keyword_map() {
    assert_eq!(suggest_role("Compute the project budget"), "financial_analyst");
    assert_eq!(suggest_role("Find a trend in this data"), "data_analyst");
    assert_eq!(suggest_role("Investigate this topic"), "research_analyst");
    assert_eq!(suggest_role("Verify these results"), "quality_analyst");
    assert_eq!(suggest_role("Just figure it out"), "problem_solver");
}

#[test]
fn five_builtin_roles() {
    let names = RoleTemplates::names();
    assert_eq!(names.len(), 5);
    for role in [
        "data_analyst",
        "financial_analyst",
        "research_analyst",
        "problem_solver",
        "quality_analyst",
    ] {
        assert!(names.contains(&role), "missing role {role}");
    }
}

#[test]
fn role_profile_parameterises_prompt() {
    let role = RoleTemplates::get("financial_analyst").unwrap();
    let profile = role.create_profile("compute the tip", Default::default());
    assert!(profile.name.starts_with("dynamic_financial_analyst_"));
    assert!(profile.system_prompt.contains("compute the tip"));
    assert!(profile.system_prompt.contains("financial analysis"));
    assert!(!profile.system_prompt.contains("{task_description}"));
}

// ===========================================================================
// DynamicWorkerManager
// ===========================================================================

#[test]
fn dynamic_names_are_unique() {
    let mut manager = DynamicWorkerManager::new(5);
    let a = manager.create("task one", None, Default::default()).unwrap();
    let b = manager.create("task one", None, Default::default()).unwrap();
    assert_ne!(a.name, b.name);
}

#[test]
fn dynamic_manager_enforces_bound() {
    let mut manager = DynamicWorkerManager::new(2);
    manager.create("a", Some("problem_solver"), Default::default()).unwrap();
    manager.create("b", Some("problem_solver"), Default::default()).unwrap();
    let err = manager.create("c", Some("problem_solver"), Default::default());
    assert!(err.is_err());
    assert_eq!(manager.active_count(), 2);
}

#[test]
fn dynamic_manager_zero_capacity_rejects_all() {
    let mut manager = DynamicWorkerManager::new(0);
    assert!(!manager.can_create());
    assert!(manager.create("x", None, Default::default()).is_err());
}

#[test]
fn dynamic_manager_remove_frees_slot() {
    let mut manager = DynamicWorkerManager::new(1);
    let profile = manager.create("a", None, Default::default()).unwrap();
    assert!(!manager.can_create());
    manager.remove(&profile.name);
    assert!(manager.can_create());
}

#[test]
fn cleanup_old_ignores_fresh_profiles() {
    let mut manager = DynamicWorkerManager::new(3);
    manager.create("a", None, Default::default()).unwrap();
    let removed = manager.cleanup_old(24);
    assert!(removed.is_empty());
    assert_eq!(manager.active_count(), 1);
}
