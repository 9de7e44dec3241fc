//! Feature (component set) installation and its persisted records.

pub mod descriptor;
pub mod installer;
pub mod store;

pub use descriptor::{
    ComponentState, ComponentStatus, FeatureDescriptor, FeatureFile, FeatureStatus,
    FeatureValidationError,
};
pub use installer::{
    read_feature_file, FeatureError, FeatureInstaller, FeatureListener, FeatureResult,
    UninstallFailure,
};
pub use store::FeatureStore;
