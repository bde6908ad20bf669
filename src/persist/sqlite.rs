//! SQLite-backed annotation collaborator and settings table.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    annotation::{Annotation, AnnotationDraft, AnnotationPatch},
    types::{AnnotationId, BrushOp, ClassId},
};

use super::{
    AnnotationBackend, BackendError, BackendResult, SettingsStore, brushed_shape, merged_shape,
    now_ms, owning_image,
};

const PAYLOAD_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PayloadEnvelope {
    format_version: u16,
    draft: AnnotationDraft,
}

/// SQLite implementation of [`AnnotationBackend`].
///
/// Statements run on the blocking pool; one row per annotation, the
/// geometry and labels stored as a versioned JSON payload.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens or creates a database at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> BackendResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> BackendResult<T>
    where
        F: FnOnce(&mut Connection) -> BackendResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }
}

impl AnnotationBackend for SqliteBackend {
    async fn load_annotations(&self, image_id: &str) -> BackendResult<Vec<Annotation>> {
        let image_id = image_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, image_id, created_at_ms, payload FROM annotations \
                 WHERE image_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![image_id], read_row)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(decode_row(row?)?);
            }
            Ok(out)
        })
        .await
    }

    async fn create_annotation(
        &self,
        image_id: &str,
        draft: AnnotationDraft,
    ) -> BackendResult<Annotation> {
        let image_id = image_id.to_string();
        self.with_conn(move |conn| insert(conn, &image_id, draft)).await
    }

    async fn update_annotation(&self, id: &str, patch: AnnotationPatch) -> BackendResult<Annotation> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut ann = fetch(conn, &id)?.ok_or_else(|| BackendError::NotFound(id.clone()))?;
            patch.normalized().apply_to(&mut ann);
            store_payload(conn, &ann)?;
            Ok(ann)
        })
        .await
    }

    async fn delete_annotation(&self, id: &str) -> BackendResult<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let removed = match parse_id(&id) {
                Some(rowid) => conn.execute("DELETE FROM annotations WHERE id = ?1", params![rowid])?,
                None => 0,
            };
            if removed == 0 {
                return Err(BackendError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn merge_annotations(
        &self,
        ids: &[AnnotationId],
        class_id: ClassId,
        class_name: &str,
    ) -> BackendResult<Option<Annotation>> {
        if ids.len() < 2 {
            return Ok(None);
        }
        let ids = ids.to_vec();
        let class_name = class_name.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut sources = Vec::with_capacity(ids.len());
            for id in &ids {
                match fetch(&tx, id)? {
                    Some(ann) => sources.push(ann),
                    None => return Ok(None),
                }
            }
            let Some(image_id) = owning_image(&sources) else {
                return Ok(None);
            };
            let Some(shape) = merged_shape(&sources) else {
                return Ok(None);
            };

            for id in &ids {
                if let Some(rowid) = parse_id(id) {
                    tx.execute("DELETE FROM annotations WHERE id = ?1", params![rowid])?;
                }
            }
            let merged = insert(
                &tx,
                &image_id,
                AnnotationDraft::from_shape(class_id, class_name, shape),
            )?;
            tx.commit()?;
            Ok(Some(merged))
        })
        .await
    }

    async fn apply_brush(
        &self,
        id: &str,
        path: &[(f64, f64)],
        radius: f64,
        op: BrushOp,
    ) -> BackendResult<Annotation> {
        let id = id.to_string();
        let path = path.to_vec();
        self.with_conn(move |conn| {
            let mut ann = fetch(conn, &id)?.ok_or_else(|| BackendError::NotFound(id.clone()))?;
            let shape = brushed_shape(&ann, &path, radius, op)?;
            ann.segmentation = shape.segmentation;
            ann.bbox = shape.bbox;
            ann.area = shape.area;
            store_payload(conn, &ann)?;
            Ok(ann)
        })
        .await
    }
}

/// Key-value settings table on its own connection.
pub struct SqliteSettings {
    conn: Connection,
}

impl SqliteSettings {
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl SettingsStore for SqliteSettings {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> BackendResult<()> {
        self.conn.execute(
            "INSERT INTO settings(key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

type RawRow = (i64, String, i64, Vec<u8>);

fn init_schema(conn: &Connection) -> BackendResult<()> {
    conn.execute_batch(include_str!("schema.sql"))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_row((id, image_id, created_at_ms, payload): RawRow) -> BackendResult<Annotation> {
    let env: PayloadEnvelope = serde_json::from_slice(&payload)?;
    if env.format_version != PAYLOAD_FORMAT_VERSION {
        return Err(BackendError::Rejected(format!(
            "unsupported payload format version: {}",
            env.format_version
        )));
    }
    Ok(env
        .draft
        .into_annotation(id.to_string(), image_id, created_at_ms as u64))
}

fn encode_payload(draft: AnnotationDraft) -> BackendResult<Vec<u8>> {
    let env = PayloadEnvelope {
        format_version: PAYLOAD_FORMAT_VERSION,
        draft,
    };
    Ok(serde_json::to_vec(&env)?)
}

fn parse_id(id: &str) -> Option<i64> {
    id.parse().ok()
}

fn fetch(conn: &Connection, id: &str) -> BackendResult<Option<Annotation>> {
    let Some(rowid) = parse_id(id) else {
        return Ok(None);
    };
    let raw = conn
        .query_row(
            "SELECT id, image_id, created_at_ms, payload FROM annotations WHERE id = ?1",
            params![rowid],
            read_row,
        )
        .optional()?;
    raw.map(decode_row).transpose()
}

fn insert(conn: &Connection, image_id: &str, draft: AnnotationDraft) -> BackendResult<Annotation> {
    let created_at_ms = now_ms();
    let payload = encode_payload(draft.clone())?;
    conn.execute(
        "INSERT INTO annotations(image_id, created_at_ms, payload) VALUES (?1, ?2, ?3)",
        params![image_id, created_at_ms as i64, payload],
    )?;
    let id = conn.last_insert_rowid();
    Ok(draft.into_annotation(id.to_string(), image_id.to_string(), created_at_ms))
}

fn store_payload(conn: &Connection, ann: &Annotation) -> BackendResult<()> {
    let Some(rowid) = parse_id(&ann.id) else {
        return Err(BackendError::NotFound(ann.id.clone()));
    };
    let payload = encode_payload(ann.to_draft())?;
    conn.execute(
        "UPDATE annotations SET payload = ?1 WHERE id = ?2",
        params![payload, rowid],
    )?;
    Ok(())
}
