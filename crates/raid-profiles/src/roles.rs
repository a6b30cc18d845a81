//! Role templates and dynamic worker instantiation

use crate::profile::{ContainerOptions, Profile};
use chrono::{DateTime, Duration, Utc};
use raid_core::{Error, Result};
use std::collections::HashMap;
use uuid::Uuid;

/// A role template for dynamically created workers.
#[derive(Clone, Debug)]
pub struct RoleTemplate {
    pub role_name: &'static str,
    pub description: &'static str,
    pub tools: &'static [&'static str],
    pub specialization: &'static str,
    system_prompt_template: &'static str,
}

impl RoleTemplate {
    /// Instantiate a profile for this role, parameterised by the task.
    pub fn create_profile(
        &self,
        task_description: &str,
        llm_config: serde_json::Map<String, serde_json::Value>,
    ) -> Profile {
        let instance_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let profile_name = format!("dynamic_{}_{}", self.role_name, instance_id);

        let system_prompt = self
            .system_prompt_template
            .replace("{task_description}", task_description)
            .replace("{specialization}", self.specialization);

        Profile {
            name: profile_name,
            description: format!("{} (created for: {})", self.description, task_description),
            version: "dynamic-1.0".to_string(),
            llm_config,
            tools: self.tools.iter().map(|s| s.to_string()).collect(),
            system_prompt,
            docker_config: ContainerOptions::default(),
            lifecycle_config: None,
        }
    }
}

const DATA_ANALYST: RoleTemplate = RoleTemplate {
    role_name: "data_analyst",
    description: "Specialized worker for data analysis and calculations",
    tools: &["calculator", "run_python_code"],
    specialization: "data analysis and statistical calculations",
    system_prompt_template: "You are a specialized Data Analyst worker focused on {specialization}.\n\n\
Task context: {task_description}\n\n\
Your expertise covers statistical analysis, mathematical modeling, and data\n\
validation. For the current task:\n\
1. Understand the data requirements\n\
2. Perform accurate calculations using the calculator tool\n\
3. Validate results for correctness\n\
4. Provide clear explanations of findings\n\n\
Always use the calculator tool for mathematical operations, even simple ones.",
};

const FINANCIAL_ANALYST: RoleTemplate = RoleTemplate {
    role_name: "financial_analyst",
    description: "Specialized worker for financial calculations and analysis",
    tools: &["calculator"],
    specialization: "financial analysis and monetary calculations",
    system_prompt_template: "You are a specialized Financial Analyst worker focused on {specialization}.\n\n\
Task context: {task_description}\n\n\
Your expertise covers financial modeling, cost-benefit analysis, ROI\n\
assessment, and tax and discount calculations. For the current task:\n\
1. Understand the financial context\n\
2. Perform accurate financial calculations using the calculator tool\n\
3. Apply relevant financial principles\n\
4. Present results in clear financial terms\n\n\
Always use the calculator tool for mathematical operations.",
};

const RESEARCH_ANALYST: RoleTemplate = RoleTemplate {
    role_name: "research_analyst",
    description: "Specialized worker for research and information analysis",
    tools: &["calculator", "read_file", "create_file"],
    specialization: "research and analytical investigations",
    system_prompt_template: "You are a specialized Research Analyst worker focused on {specialization}.\n\n\
Task context: {task_description}\n\n\
Your expertise covers research methodology, data synthesis, and\n\
evidence-based reasoning. For the current task:\n\
1. Analyze the information requirements systematically\n\
2. Use the calculator tool for quantitative analysis\n\
3. Synthesize findings into coherent insights\n\
4. Provide evidence-based conclusions\n\n\
Structure your findings clearly with supporting evidence.",
};

const PROBLEM_SOLVER: RoleTemplate = RoleTemplate {
    role_name: "problem_solver",
    description: "Specialized worker for general problem-solving tasks",
    tools: &["calculator", "run_python_code"],
    specialization: "systematic problem-solving and logical analysis",
    system_prompt_template: "You are a specialized Problem Solver worker focused on {specialization}.\n\n\
Task context: {task_description}\n\n\
Your expertise covers problem decomposition, logical reasoning, and\n\
step-by-step resolution. For the current task:\n\
1. Break the problem into manageable components\n\
2. Use the calculator tool for computational elements\n\
3. Apply logical reasoning to find solutions\n\
4. Verify solutions for completeness\n\n\
Provide clear, step-by-step solutions with reasoning.",
};

const QUALITY_ANALYST: RoleTemplate = RoleTemplate {
    role_name: "quality_analyst",
    description: "Specialized worker for quality assurance and validation",
    tools: &["calculator"],
    specialization: "quality assurance and validation processes",
    system_prompt_template: "You are a specialized Quality Analyst worker focused on {specialization}.\n\n\
Task context: {task_description}\n\n\
Your expertise covers validation, verification, error detection, and\n\
accuracy assessment. For the current task:\n\
1. Validate the accuracy of all inputs\n\
2. Use the calculator tool to verify calculations\n\
3. Check for errors, inconsistencies, and edge cases\n\
4. Ensure outputs meet quality standards\n\n\
Provide thorough quality assessments with detailed validation.",
};

/// The built-in role templates.
pub struct RoleTemplates;

impl RoleTemplates {
    pub fn all() -> &'static [RoleTemplate] {
        const ALL: &[RoleTemplate] = &[
            DATA_ANALYST,
            FINANCIAL_ANALYST,
            RESEARCH_ANALYST,
            PROBLEM_SOLVER,
            QUALITY_ANALYST,
        ];
        ALL
    }

    pub fn get(role_name: &str) -> Result<&'static RoleTemplate> {
        Self::all()
            .iter()
            .find(|r| r.role_name == role_name)
            .ok_or_else(|| Error::Internal(format!("role '{role_name}' not found")))
    }

    pub fn names() -> Vec<&'static str> {
        Self::all().iter().map(|r| r.role_name).collect()
    }
}

/// Deterministic keyword-based role suggestion over the lower-cased goal.
pub fn suggest_role(task_description: &str) -> &'static str {
    let task = task_description.to_lowercase();

    let matches = |words: &[&str]| words.iter().any(|w| task.contains(w));

    if matches(&["financial", "money", "cost", "price", "budget", "profit", "discount"]) {
        "financial_analyst"
    } else if matches(&["data", "statistics", "analysis", "trend", "pattern"]) {
        "data_analyst"
    } else if matches(&["research", "investigate", "study", "explore"]) {
        "research_analyst"
    } else if matches(&["quality", "verify", "validate", "check", "accurate"]) {
        "quality_analyst"
    } else {
        "problem_solver"
    }
}

/// Tracks dynamically created worker profiles against a creation bound.
pub struct DynamicWorkerManager {
    max_workers: usize,
    active: HashMap<String, DynamicWorkerInfo>,
}

#[derive(Clone, Debug)]
pub struct DynamicWorkerInfo {
    pub role: String,
    pub task_description: String,
    pub created_at: DateTime<Utc>,
}

impl DynamicWorkerManager {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            active: HashMap::new(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn can_create(&self) -> bool {
        self.active.len() < self.max_workers
    }

    /// Create a dynamic profile for the task, auto-suggesting the role when
    /// none is given.
    pub fn create(
        &mut self,
        task_description: &str,
        role_name: Option<&str>,
        llm_config: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Profile> {
        if !self.can_create() {
            return Err(Error::CapacityExceeded {
                current: self.active.len(),
                limit: self.max_workers,
            });
        }

        let role_name = role_name.unwrap_or_else(|| suggest_role(task_description));
        let role = RoleTemplates::get(role_name)?;
        let profile = role.create_profile(task_description, llm_config);

        self.active.insert(
            profile.name.clone(),
            DynamicWorkerInfo {
                role: role_name.to_string(),
                task_description: task_description.to_string(),
                created_at: Utc::now(),
            },
        );

        Ok(profile)
    }

    pub fn get(&self, profile_name: &str) -> Option<&DynamicWorkerInfo> {
        self.active.get(profile_name)
    }

    pub fn remove(&mut self, profile_name: &str) {
        self.active.remove(profile_name);
    }

    /// Drop tracking for profiles older than `max_age_hours`; returns the
    /// removed names.
    pub fn cleanup_old(&mut self, max_age_hours: i64) -> Vec<String> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let stale: Vec<String> = self
            .active
            .iter()
            .filter(|(_, info)| info.created_at < cutoff)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            self.active.remove(name);
        }
        stale
    }
}
