//! SQLite persistence of feature install outcomes.
//!
//! # Invariants
//! - At most one record per feature id; saving again replaces it.
//! - Component rows keep the order of the feature file.

use crate::db::{open_db, open_db_in_memory, DbError, DbResult};
use crate::feature::descriptor::{
    ComponentState, ComponentStatus, FeatureDescriptor, FeatureStatus,
};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use uuid::Uuid;

const FEATURE_SELECT_SQL: &str = "SELECT feature_id, install_id, name, version, status, installed_at
     FROM installed_features";

pub struct FeatureStore {
    conn: Connection,
}

impl FeatureStore {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }

    /// Inserts or replaces the record for `descriptor.id`.
    pub fn save(&mut self, descriptor: &FeatureDescriptor) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM installed_features WHERE feature_id = ?1;",
            params![descriptor.id],
        )?;
        tx.execute(
            "INSERT INTO installed_features
                 (feature_id, install_id, name, version, status, installed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                descriptor.id,
                descriptor.install_id.to_string(),
                descriptor.name,
                descriptor.version,
                descriptor.status.as_str(),
                descriptor.installed_at_ms,
            ],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO feature_components
                     (feature_id, position, component_id, location, state, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            )?;
            for (position, component) in descriptor.components.iter().enumerate() {
                let (state, reason) = match &component.state {
                    ComponentState::Installed => ("installed", None),
                    ComponentState::Failed { reason } => ("failed", Some(reason.as_str())),
                };
                insert.execute(params![
                    descriptor.id,
                    position as i64,
                    component.id,
                    component.location,
                    state,
                    reason,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load(&self, feature_id: &str) -> DbResult<Option<FeatureDescriptor>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FEATURE_SELECT_SQL} WHERE feature_id = ?1;"))?;
        let mut rows = stmt.query(params![feature_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(self.parse_feature_row(row)?)),
            None => Ok(None),
        }
    }

    /// All records, ordered by feature id.
    pub fn list(&self) -> DbResult<Vec<FeatureDescriptor>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FEATURE_SELECT_SQL} ORDER BY feature_id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut features = Vec::new();
        while let Some(row) = rows.next()? {
            features.push(self.parse_feature_row(row)?);
        }
        Ok(features)
    }

    /// Deletes the record; returns `false` when none existed.
    pub fn delete(&mut self, feature_id: &str) -> DbResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM installed_features WHERE feature_id = ?1;",
            params![feature_id],
        )?;
        Ok(changed > 0)
    }

    fn parse_feature_row(&self, row: &Row<'_>) -> DbResult<FeatureDescriptor> {
        let id: String = row.get(0)?;
        let install_id: String = row.get(1)?;
        let status: String = row.get(4)?;

        let install_id = Uuid::parse_str(&install_id).map_err(|err| DbError::CorruptRow {
            table: "installed_features",
            message: format!("install_id `{install_id}`: {err}"),
        })?;
        let status = FeatureStatus::parse(&status).ok_or_else(|| DbError::CorruptRow {
            table: "installed_features",
            message: format!("status `{status}`"),
        })?;

        Ok(FeatureDescriptor {
            components: self.load_components(&id)?,
            id,
            install_id,
            name: row.get(2)?,
            version: row.get(3)?,
            status,
            installed_at_ms: row.get(5)?,
        })
    }

    fn load_components(&self, feature_id: &str) -> DbResult<Vec<ComponentStatus>> {
        let mut stmt = self.conn.prepare(
            "SELECT component_id, location, state, reason
             FROM feature_components
             WHERE feature_id = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query(params![feature_id])?;
        let mut components = Vec::new();
        while let Some(row) = rows.next()? {
            let state: String = row.get(2)?;
            let reason: Option<String> = row.get(3)?;
            let state = match state.as_str() {
                "installed" => ComponentState::Installed,
                "failed" => ComponentState::Failed {
                    reason: reason.unwrap_or_default(),
                },
                other => {
                    return Err(DbError::CorruptRow {
                        table: "feature_components",
                        message: format!("state `{other}`"),
                    })
                }
            };
            components.push(ComponentStatus {
                id: row.get(0)?,
                location: row.get(1)?,
                state,
            });
        }
        Ok(components)
    }
}

#[cfg(test)]
mod tests {
    use super::FeatureStore;
    use crate::db::migrations::{latest_version, schema_version};
    use crate::feature::descriptor::{
        ComponentState, ComponentStatus, FeatureDescriptor, FeatureStatus,
    };
    use uuid::Uuid;

    fn descriptor(id: &str, states: Vec<(&str, ComponentState)>) -> FeatureDescriptor {
        let components: Vec<ComponentStatus> = states
            .into_iter()
            .map(|(component_id, state)| ComponentStatus {
                id: component_id.to_string(),
                location: format!("file:/bundles/{component_id}.jar"),
                state,
            })
            .collect();
        FeatureDescriptor {
            id: id.to_string(),
            name: "Shell".to_string(),
            version: "1.0.0".to_string(),
            install_id: Uuid::new_v4(),
            installed_at_ms: 1_700_000_000_000,
            status: FeatureStatus::from_components(&components),
            components,
        }
    }

    #[test]
    fn fresh_store_is_fully_migrated() {
        let store = FeatureStore::open_in_memory().expect("store opens");
        assert_eq!(
            schema_version(&store.conn).expect("version readable"),
            latest_version()
        );
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn save_and_load_keep_component_order_and_reasons() {
        let mut store = FeatureStore::open_in_memory().expect("store opens");
        let saved = descriptor(
            "shell",
            vec![
                ("b", ComponentState::Installed),
                (
                    "a",
                    ComponentState::Failed {
                        reason: "unresolved".to_string(),
                    },
                ),
            ],
        );
        store.save(&saved).expect("save");

        let loaded = store.load("shell").expect("load").expect("record exists");
        assert_eq!(loaded, saved);
        assert_eq!(loaded.status, FeatureStatus::PartiallyInstalled);
    }

    #[test]
    fn save_replaces_previous_record() {
        let mut store = FeatureStore::open_in_memory().expect("store opens");
        store
            .save(&descriptor("shell", vec![("a", ComponentState::Installed)]))
            .expect("first save");
        let second = descriptor("shell", vec![("c", ComponentState::Installed)]);
        store.save(&second).expect("second save");

        let all = store.list().expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].components[0].id, "c");
        assert_eq!(all[0].install_id, second.install_id);
    }

    #[test]
    fn delete_cascades_components() {
        let mut store = FeatureStore::open_in_memory().expect("store opens");
        store
            .save(&descriptor("shell", vec![("a", ComponentState::Installed)]))
            .expect("save");
        assert!(store.delete("shell").expect("delete"));
        assert!(!store.delete("shell").expect("second delete"));

        let remaining: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM feature_components;", [], |row| {
                row.get(0)
            })
            .expect("count components");
        assert_eq!(remaining, 0);
    }
}
