//! Feature installation against a managed runtime.
//!
//! # Responsibility
//! - Read a feature file, install each component through an [`Agent`] and
//!   record the per-component outcome.
//! - Persist outcomes and notify listeners.
//!
//! # Invariants
//! - File read/parse/validation, storage and uninstall failures are returned
//!   as `Err`; a component that fails to install is reported in the descriptor.
//! - A component the runtime could not uninstall stays on the record.
//! - Installs and removals are serialized by the store lock.

use crate::agent::{Agent, AgentError, ComponentRef};
use crate::db::DbError;
use crate::feature::descriptor::{
    ComponentState, ComponentStatus, FeatureDescriptor, FeatureFile, FeatureStatus,
    FeatureValidationError,
};
use crate::feature::store::FeatureStore;
use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub type FeatureResult<T> = Result<T, FeatureError>;

/// Observer of feature install and removal.
pub trait FeatureListener: Send + Sync {
    fn on_installed(&self, _feature: &FeatureDescriptor) {}
    fn on_removed(&self, _feature: &FeatureDescriptor) {}
}

#[derive(Debug)]
pub enum FeatureError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Invalid {
        feature_id: String,
        source: FeatureValidationError,
    },
    Store(DbError),
    NotInstalled(String),
    /// Removal stopped short; the record keeps the components listed here.
    Uninstall {
        feature_id: String,
        failures: Vec<UninstallFailure>,
    },
}

/// A component the runtime refused to uninstall.
#[derive(Debug)]
pub struct UninstallFailure {
    pub component_id: String,
    pub source: AgentError,
}

impl Display for FeatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read feature file `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse feature file `{}`: {source}", path.display())
            }
            Self::Invalid { feature_id, source } => {
                write!(f, "feature `{feature_id}` is invalid: {source}")
            }
            Self::Store(err) => write!(f, "feature store failure: {err}"),
            Self::NotInstalled(id) => write!(f, "feature `{id}` is not installed"),
            Self::Uninstall {
                feature_id,
                failures,
            } => {
                write!(f, "feature `{feature_id}` could not be fully removed:")?;
                for failure in failures {
                    write!(f, " `{}` ({})", failure.component_id, failure.source)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for FeatureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            Self::NotInstalled(_) => None,
            Self::Uninstall { failures, .. } => failures
                .first()
                .map(|failure| &failure.source as &(dyn Error + 'static)),
        }
    }
}

impl From<DbError> for FeatureError {
    fn from(value: DbError) -> Self {
        Self::Store(value)
    }
}

/// Reads and validates a feature file.
pub fn read_feature_file(path: impl AsRef<Path>) -> FeatureResult<FeatureFile> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| FeatureError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: FeatureFile = serde_json::from_str(&raw).map_err(|source| FeatureError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    file.validate().map_err(|source| FeatureError::Invalid {
        feature_id: file.id.clone(),
        source,
    })?;
    Ok(file)
}

pub struct FeatureInstaller {
    agent: Arc<dyn Agent>,
    store: Mutex<FeatureStore>,
    listeners: RwLock<Vec<Arc<dyn FeatureListener>>>,
}

impl FeatureInstaller {
    pub fn new(agent: Arc<dyn Agent>, store: FeatureStore) -> Self {
        Self {
            agent,
            store: Mutex::new(store),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn FeatureListener>) {
        self.listeners.write().push(listener);
    }

    // listeners run without the list lock held
    fn listeners_snapshot(&self) -> Vec<Arc<dyn FeatureListener>> {
        self.listeners.read().clone()
    }

    /// Installs the feature described by the file at `path`.
    ///
    /// # Errors
    /// - `Read`/`Parse`/`Invalid` before any component is touched.
    /// - `Store` when the outcome cannot be persisted.
    pub fn install(&self, path: impl AsRef<Path>) -> FeatureResult<FeatureDescriptor> {
        let path = path.as_ref();
        let file = read_feature_file(path).map_err(|err| {
            error!(
                "event=feature_install module=feature status=error path={} error={err}",
                path.display()
            );
            err
        })?;
        self.install_file(&file)
    }

    /// Installs an already parsed feature.
    ///
    /// Reinstalling an id replaces its record; components the previous
    /// install left in place and the new file no longer lists are uninstalled.
    pub fn install_file(&self, file: &FeatureFile) -> FeatureResult<FeatureDescriptor> {
        file.validate().map_err(|source| FeatureError::Invalid {
            feature_id: file.id.clone(),
            source,
        })?;

        let started_at = Instant::now();
        info!(
            "event=feature_install module=feature status=start feature_id={} components={}",
            file.id,
            file.components.len()
        );

        let descriptor = {
            let mut store = self.store.lock();
            let previous = store.load(&file.id)?;

            let components: Vec<ComponentStatus> = file
                .components
                .iter()
                .map(|component| self.install_component(component))
                .collect();
            let mut descriptor = FeatureDescriptor::from_outcome(file, components, now_ms());

            if let Some(previous) = previous {
                let retained = self.uninstall_dropped(&previous, file);
                if !retained.is_empty() {
                    descriptor.components.extend(retained);
                    descriptor.status = FeatureStatus::from_components(&descriptor.components);
                }
            }
            store.save(&descriptor)?;
            descriptor
        };

        let log_line = format!(
            "event=feature_install module=feature status={} feature_id={} install_id={} duration_ms={}",
            descriptor.status,
            descriptor.id,
            descriptor.install_id,
            started_at.elapsed().as_millis()
        );
        match descriptor.status {
            FeatureStatus::Installed => info!("{log_line}"),
            FeatureStatus::PartiallyInstalled | FeatureStatus::Failed => warn!("{log_line}"),
        }

        for listener in self.listeners_snapshot() {
            listener.on_installed(&descriptor);
        }
        Ok(descriptor)
    }

    fn install_component(&self, component: &ComponentRef) -> ComponentStatus {
        let state = match self.agent.install_component(component) {
            Ok(()) => ComponentState::Installed,
            Err(err) => {
                warn!(
                    "event=component_install module=feature status=error component_id={} error={err}",
                    component.id
                );
                ComponentState::Failed {
                    reason: err.to_string(),
                }
            }
        };
        ComponentStatus {
            id: component.id.clone(),
            location: component.location.clone(),
            state,
        }
    }

    /// Returns the dropped components that are still installed.
    fn uninstall_dropped(
        &self,
        previous: &FeatureDescriptor,
        file: &FeatureFile,
    ) -> Vec<ComponentStatus> {
        previous
            .installed_components()
            .filter(|old| !file.components.iter().any(|new| new.id == old.id))
            .filter(|component| self.uninstall_component(&component.id).is_err())
            .cloned()
            .collect()
    }

    fn uninstall_component(&self, component_id: &str) -> Result<(), AgentError> {
        self.agent.uninstall_component(component_id).map_err(|err| {
            warn!(
                "event=component_uninstall module=feature status=error component_id={component_id} error={err}"
            );
            err
        })
    }

    /// Uninstalls the components recorded as installed and deletes the record.
    ///
    /// `listener` and every registered listener observe the removal.
    ///
    /// # Errors
    /// - `Uninstall` when the runtime refuses any component. The record is
    ///   kept with only those components, so a later call retries them.
    pub fn remove(
        &self,
        feature_id: &str,
        listener: &dyn FeatureListener,
    ) -> FeatureResult<FeatureDescriptor> {
        let removed = {
            let mut store = self.store.lock();
            let Some(descriptor) = store.load(feature_id)? else {
                warn!("event=feature_remove module=feature status=error error_code=not_installed feature_id={feature_id}");
                return Err(FeatureError::NotInstalled(feature_id.to_string()));
            };
            let mut failures = Vec::new();
            let mut retained = Vec::new();
            for component in descriptor.installed_components() {
                if let Err(source) = self.uninstall_component(&component.id) {
                    failures.push(UninstallFailure {
                        component_id: component.id.clone(),
                        source,
                    });
                    retained.push(component.clone());
                }
            }
            if !failures.is_empty() {
                let mut kept = descriptor;
                kept.status = FeatureStatus::from_components(&retained);
                kept.components = retained;
                store.save(&kept)?;
                error!(
                    "event=feature_remove module=feature status=error feature_id={feature_id} remaining={}",
                    kept.components.len()
                );
                return Err(FeatureError::Uninstall {
                    feature_id: feature_id.to_string(),
                    failures,
                });
            }
            store.delete(feature_id)?;
            descriptor
        };

        info!("event=feature_remove module=feature status=ok feature_id={feature_id}");
        listener.on_removed(&removed);
        for registered in self.listeners_snapshot() {
            registered.on_removed(&removed);
        }
        Ok(removed)
    }

    /// Persisted install records, ordered by feature id.
    pub fn installed_features(&self) -> FeatureResult<Vec<FeatureDescriptor>> {
        Ok(self.store.lock().list()?)
    }

    pub fn installed_feature(&self, feature_id: &str) -> FeatureResult<Option<FeatureDescriptor>> {
        Ok(self.store.lock().load(feature_id)?)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
