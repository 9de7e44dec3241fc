//! Feature file format and install outcome model.
//!
//! # Invariants
//! - A feature's status is always derived from its component states.
//! - A valid feature file names at least one component and no component twice.

use crate::agent::ComponentRef;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.-]+)?$").expect("valid feature version regex")
});

/// On-disk feature description: a named set of components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFile {
    pub id: String,
    pub name: String,
    pub version: String,
    pub components: Vec<ComponentRef>,
}

impl FeatureFile {
    pub fn validate(&self) -> Result<(), FeatureValidationError> {
        if self.id.trim().is_empty() {
            return Err(FeatureValidationError::EmptyId);
        }
        if self.name.trim().is_empty() {
            return Err(FeatureValidationError::EmptyName);
        }
        if !VERSION_RE.is_match(self.version.trim()) {
            return Err(FeatureValidationError::InvalidVersion(self.version.clone()));
        }
        if self.components.is_empty() {
            return Err(FeatureValidationError::NoComponents);
        }

        let mut seen = BTreeSet::new();
        for (position, component) in self.components.iter().enumerate() {
            if component.id.trim().is_empty() {
                return Err(FeatureValidationError::EmptyComponentId { position });
            }
            if !seen.insert(component.id.as_str()) {
                return Err(FeatureValidationError::DuplicateComponent(
                    component.id.clone(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureValidationError {
    EmptyId,
    EmptyName,
    InvalidVersion(String),
    NoComponents,
    EmptyComponentId { position: usize },
    DuplicateComponent(String),
}

impl Display for FeatureValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "feature id cannot be empty"),
            Self::EmptyName => write!(f, "feature name cannot be empty"),
            Self::InvalidVersion(version) => {
                write!(f, "feature version `{version}` is not major.minor.patch")
            }
            Self::NoComponents => write!(f, "feature lists no components"),
            Self::EmptyComponentId { position } => {
                write!(f, "component #{position} has an empty id")
            }
            Self::DuplicateComponent(id) => write!(f, "component `{id}` is listed twice"),
        }
    }
}

impl Error for FeatureValidationError {}

/// Install outcome of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ComponentState {
    Installed,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub id: String,
    pub location: String,
    #[serde(flatten)]
    pub state: ComponentState,
}

impl ComponentStatus {
    pub fn is_installed(&self) -> bool {
        matches!(self.state, ComponentState::Installed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Installed,
    PartiallyInstalled,
    Failed,
}

impl FeatureStatus {
    /// Every component installed, some installed, or none.
    pub fn from_components(components: &[ComponentStatus]) -> Self {
        let installed = components.iter().filter(|c| c.is_installed()).count();
        if installed == 0 {
            Self::Failed
        } else if installed == components.len() {
            Self::Installed
        } else {
            Self::PartiallyInstalled
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::PartiallyInstalled => "partially_installed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "installed" => Some(Self::Installed),
            "partially_installed" => Some(Self::PartiallyInstalled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl Display for FeatureStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded result of installing one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Distinguishes repeated installs of the same feature id.
    pub install_id: Uuid,
    pub installed_at_ms: i64,
    pub components: Vec<ComponentStatus>,
    pub status: FeatureStatus,
}

impl FeatureDescriptor {
    pub(crate) fn from_outcome(
        file: &FeatureFile,
        components: Vec<ComponentStatus>,
        installed_at_ms: i64,
    ) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            version: file.version.clone(),
            install_id: Uuid::new_v4(),
            installed_at_ms,
            status: FeatureStatus::from_components(&components),
            components,
        }
    }

    pub fn installed_components(&self) -> impl Iterator<Item = &ComponentStatus> {
        self.components.iter().filter(|component| component.is_installed())
    }

    pub fn failed_components(&self) -> impl Iterator<Item = &ComponentStatus> {
        self.components
            .iter()
            .filter(|component| !component.is_installed())
    }
}
