//! Worker profiles: how each role is launched.

use cohort_domain::InvocationSpec;
use std::collections::BTreeMap;

/// Launch recipe for one worker role. The prompt is appended per cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerProfile {
    pub role: String,
    pub model: Option<String>,
    pub invocation: InvocationSpec,
    pub enabled: bool,
}

impl WorkerProfile {
    pub fn new(role: impl Into<String>, invocation: InvocationSpec) -> Self {
        Self {
            role: role.into(),
            model: None,
            invocation,
            enabled: true,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The invocation for one attempt with `prompt` as input.
    pub fn invocation_for(&self, prompt: &str) -> InvocationSpec {
        self.invocation.clone().with_input(prompt)
    }
}

/// Profiles keyed by role.
#[derive(Debug, Clone, Default)]
pub struct WorkerCatalog {
    profiles: BTreeMap<String, WorkerProfile>,
}

impl WorkerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, profile: WorkerProfile) -> Self {
        self.insert(profile);
        self
    }

    pub fn insert(&mut self, profile: WorkerProfile) {
        self.profiles.insert(profile.role.clone(), profile);
    }

    pub fn get(&self, role: &str) -> Option<&WorkerProfile> {
        self.profiles.get(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Enabled roles in name order.
    pub fn enabled_roles(&self) -> Vec<String> {
        self.profiles
            .values()
            .filter(|p| p.enabled)
            .map(|p| p.role.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
