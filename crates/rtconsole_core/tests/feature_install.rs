use rtconsole_core::feature::ComponentState;
use rtconsole_core::{
    AgentEndpoint, ExtensionRegistry, FeatureError, FeatureInstaller, FeatureStatus, FeatureStore,
    InMemoryRuntime,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn installer_on(runtime: &Arc<InMemoryRuntime>, db_path: &Path) -> FeatureInstaller {
    let endpoint = AgentEndpoint::new(Arc::new(ExtensionRegistry::new()), runtime.clone());
    let store = FeatureStore::open(db_path).expect("feature store opens");
    FeatureInstaller::new(Arc::new(endpoint), store)
}

fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write feature file");
    path
}

const PARTIAL_FEATURE: &str = r#"{
    "id": "org.example.console",
    "name": "Console",
    "version": "1.4.2",
    "components": [
        {"id": "A", "location": "file:/bundles/a.jar"},
        {"id": "B", "location": ""}
    ]
}"#;

#[test]
fn partial_failure_is_reported_not_raised() {
    let dir = tempfile::tempdir().expect("temp dir");
    let runtime = Arc::new(InMemoryRuntime::new());
    let installer = installer_on(&runtime, &dir.path().join("features.sqlite3"));
    let path = write_file(dir.path(), "console.json", PARTIAL_FEATURE);

    let descriptor = installer.install(&path).expect("install returns a descriptor");

    assert_eq!(descriptor.status, FeatureStatus::PartiallyInstalled);
    assert_eq!(descriptor.components.len(), 2);
    assert_eq!(descriptor.components[0].id, "A");
    assert_eq!(descriptor.components[0].state, ComponentState::Installed);
    assert_eq!(descriptor.components[1].id, "B");
    assert!(matches!(
        &descriptor.components[1].state,
        ComponentState::Failed { reason } if !reason.is_empty()
    ));
    assert_eq!(runtime.installed_ids(), vec!["A"]);
}

#[test]
fn every_component_failing_yields_failed_status() {
    let dir = tempfile::tempdir().expect("temp dir");
    let runtime = Arc::new(InMemoryRuntime::new());
    let installer = installer_on(&runtime, &dir.path().join("features.sqlite3"));
    let path = write_file(
        dir.path(),
        "broken.json",
        r#"{"id":"broken","name":"Broken","version":"0.1.0","components":[{"id":"X","location":" "}]}"#,
    );

    let descriptor = installer.install(&path).expect("install returns a descriptor");
    assert_eq!(descriptor.status, FeatureStatus::Failed);
    assert_eq!(descriptor.failed_components().count(), 1);
    assert!(runtime.installed_ids().is_empty());
}

#[test]
fn installed_features_survive_reopening_the_store() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("features.sqlite3");
    let path = write_file(dir.path(), "console.json", PARTIAL_FEATURE);

    let installed = {
        let runtime = Arc::new(InMemoryRuntime::new());
        let installer = installer_on(&runtime, &db_path);
        installer.install(&path).expect("install")
    };

    let runtime = Arc::new(InMemoryRuntime::new());
    let reopened = installer_on(&runtime, &db_path);
    let features = reopened.installed_features().expect("list features");
    assert_eq!(features, vec![installed.clone()]);
    assert_eq!(
        reopened
            .installed_feature("org.example.console")
            .expect("lookup")
            .map(|feature| feature.install_id),
        Some(installed.install_id)
    );
}

#[test]
fn malformed_or_invalid_files_touch_nothing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let runtime = Arc::new(InMemoryRuntime::new());
    let installer = installer_on(&runtime, &dir.path().join("features.sqlite3"));

    let garbled = write_file(dir.path(), "garbled.json", "{\"id\": ");
    assert!(matches!(
        installer.install(&garbled),
        Err(FeatureError::Parse { .. })
    ));

    let bad_version = write_file(
        dir.path(),
        "bad.json",
        r#"{"id":"f","name":"F","version":"latest","components":[{"id":"A","location":"file:/a.jar"}]}"#,
    );
    let err = installer.install(&bad_version).expect_err("version must be x.y.z");
    assert!(matches!(err, FeatureError::Invalid { feature_id, .. } if feature_id == "f"));

    assert!(runtime.installed_ids().is_empty());
    assert!(installer.installed_features().expect("list").is_empty());
}
