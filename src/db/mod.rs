mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StoreError;
use crate::field_path;
use crate::models::*;
use crate::store::{ContainerStore, FieldChanges};

/// Top-level keys the storage layer owns. Field updates may not touch them.
const READ_ONLY_FIELDS: &[&str] = &["id", "kind", "revision", "created_at", "updated_at"];

pub fn is_read_only(field_path: &str) -> bool {
    let root = field_path.split('.').next().unwrap_or_default();
    READ_ONLY_FIELDS.contains(&root)
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "inlay")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("inlay.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Container operations
    // ============================================================

    pub fn get_all_containers(&self) -> Result<Vec<Container>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, ownership, locked, system, revision, created_at, updated_at
             FROM containers ORDER BY name",
        )?;

        let containers = stmt
            .query_map([], container_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(containers)
    }

    pub fn get_container(&self, id: Uuid) -> Result<Option<Container>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        query_container(&conn, id)
    }

    pub fn create_container(&self, input: CreateContainerInput) -> Result<Container> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();
        let system = match input.system {
            Some(Value::Object(map)) => Value::Object(map),
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(_) => anyhow::bail!("Container system data must be an object"),
        };

        conn.execute(
            "INSERT INTO containers (id, name, kind, ownership, locked, system, revision, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
            (
                id.to_string(),
                &input.name,
                input.kind.as_str(),
                serde_json::to_string(&input.ownership)?,
                if input.locked { 1 } else { 0 },
                serde_json::to_string(&system)?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Container {
            id,
            name: input.name,
            kind: input.kind,
            ownership: input.ownership,
            locked: input.locked,
            system,
            revision: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_container(
        &self,
        id: Uuid,
        input: UpdateContainerInput,
    ) -> Result<Option<Container>> {
        let mut changes = FieldChanges::new();
        if let Some(name) = input.name {
            changes.insert("name".to_string(), Value::String(name));
        }
        if let Some(locked) = input.locked {
            changes.insert("locked".to_string(), Value::Bool(locked));
        }
        if let Some(ownership) = input.ownership {
            changes.insert("ownership".to_string(), serde_json::to_value(ownership)?);
        }

        if changes.is_empty() {
            return self.get_container(id);
        }
        self.update_container_fields(id, &changes)
    }

    /// Apply dotted-path field changes to a container in one transaction.
    ///
    /// The container is re-validated after the changes are applied, so a
    /// change that would leave it undecodable is rejected as a whole.
    pub fn update_container_fields(
        &self,
        id: Uuid,
        changes: &FieldChanges,
    ) -> Result<Option<Container>> {
        if let Some(path) = changes.keys().find(|p| is_read_only(p)) {
            anyhow::bail!("Field `{}` is read-only", path);
        }

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        let Some(existing) = query_container(&tx, id)? else {
            return Ok(None);
        };

        let mut doc = serde_json::to_value(&existing)?;
        for (path, value) in changes {
            field_path::set(&mut doc, path, value.clone())
                .with_context(|| format!("Failed to set `{}`", path))?;
        }

        let mut updated: Container =
            serde_json::from_value(doc).context("Update produced an invalid container")?;
        updated.revision = existing.revision + 1;
        updated.updated_at = Utc::now();

        tx.execute(
            "UPDATE containers SET name = ?, ownership = ?, locked = ?, system = ?, revision = ?, updated_at = ?
             WHERE id = ?",
            (
                &updated.name,
                serde_json::to_string(&updated.ownership)?,
                if updated.locked { 1 } else { 0 },
                serde_json::to_string(&updated.system)?,
                updated.revision,
                updated.updated_at.to_rfc3339(),
                id.to_string(),
            ),
        )?;
        tx.commit()?;

        tracing::debug!(
            container = %id,
            revision = updated.revision,
            fields = ?changes.keys().collect::<Vec<_>>(),
            "Container fields updated"
        );

        Ok(Some(updated))
    }

    pub fn delete_container(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM containers WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl ContainerStore for Database {
    async fn load(&self, id: Uuid) -> Result<Container, StoreError> {
        self.get_container(id)?
            .ok_or(StoreError::ContainerNotFound(id))
    }

    async fn get(&self, id: Uuid, field_path: &str) -> Result<Option<Value>, StoreError> {
        let container = self
            .get_container(id)?
            .ok_or(StoreError::ContainerNotFound(id))?;
        Ok(container.get(field_path).filter(|v| !v.is_null()))
    }

    async fn update(&self, id: Uuid, changes: FieldChanges) -> Result<(), StoreError> {
        if let Some(path) = changes.keys().find(|p| is_read_only(p)) {
            return Err(StoreError::ReadOnlyField(path.clone()));
        }
        self.update_container_fields(id, &changes)?
            .map(|_| ())
            .ok_or(StoreError::ContainerNotFound(id))
    }
}

fn query_container(conn: &Connection, id: Uuid) -> Result<Option<Container>> {
    let container = conn
        .query_row(
            "SELECT id, name, kind, ownership, locked, system, revision, created_at, updated_at
             FROM containers WHERE id = ?",
            [id.to_string()],
            container_from_row,
        )
        .optional()?;
    Ok(container)
}

fn container_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Container> {
    let ownership: String = row.get(3)?;
    let system: String = row.get(5)?;
    Ok(Container {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        kind: ContainerKind::from_str(&row.get::<_, String>(2)?).unwrap_or(ContainerKind::Item),
        ownership: serde_json::from_str(&ownership).unwrap_or_default(),
        locked: row.get::<_, i32>(4)? != 0,
        system: serde_json::from_str(&system).unwrap_or_else(|_| Value::Object(Map::new())),
        revision: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
        updated_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
