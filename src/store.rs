use libsql::Connection;

use crate::error::{StoreError, StoreResult};
use crate::model::Producto;

/// Row-level operations on the `producto` table.
///
/// Works on any connection, so the same calls run standalone on a pooled
/// connection or grouped inside [`Database::with_transaction`](crate::db::Database::with_transaction).
pub struct Productos<'a> {
    conn: &'a Connection,
}

impl<'a> Productos<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn list_all(&self) -> StoreResult<Vec<Producto>> {
        let query = "SELECT id, nombre, camara FROM producto ORDER BY id";

        let mut rows = self.conn.query(query, ()).await?;
        let mut productos = Vec::new();

        while let Some(row) = rows.next().await? {
            productos.push(row_to_producto(&row)?);
        }

        Ok(productos)
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<Option<Producto>> {
        let query = "SELECT id, nombre, camara FROM producto WHERE id = ?";
        self.fetch_optional(query, libsql::params![id]).await
    }

    pub async fn create(&self, name: &str, camera: &str) -> StoreResult<Producto> {
        validate("nombre", name)?;
        validate("camara", camera)?;

        let query = r#"
            INSERT INTO producto (nombre, camara)
            VALUES (?, ?)
            RETURNING id, nombre, camara
        "#;

        self.fetch_optional(query, libsql::params![name, camera])
            .await?
            .ok_or(StoreError::MissingRow("insert producto"))
    }

    pub async fn update_full(&self, id: i64, name: &str, camera: &str) -> StoreResult<Option<Producto>> {
        validate("nombre", name)?;
        validate("camara", camera)?;

        let query = r#"
            UPDATE producto SET nombre = ?, camara = ?
            WHERE id = ?
            RETURNING id, nombre, camara
        "#;
        self.fetch_optional(query, libsql::params![name, camera, id]).await
    }

    pub async fn update_camera(&self, id: i64, camera: &str) -> StoreResult<Option<Producto>> {
        validate("camara", camera)?;

        let query = r#"
            UPDATE producto SET camara = ?
            WHERE id = ?
            RETURNING id, nombre, camara
        "#;
        self.fetch_optional(query, libsql::params![camera, id]).await
    }

    pub async fn delete(&self, id: i64) -> StoreResult<Option<Producto>> {
        let query = "DELETE FROM producto WHERE id = ? RETURNING id, nombre, camara";
        self.fetch_optional(query, libsql::params![id]).await
    }

    /// Batch update used by synchronization. Values go to SQL unchecked so
    /// the table constraints decide; returns the number of rows touched.
    pub(crate) async fn apply_update(&self, id: i64, name: Option<&str>, camera: Option<&str>) -> StoreResult<u64> {
        let query = "UPDATE producto SET nombre = ?, camara = ? WHERE id = ?";
        Ok(self.conn.execute(query, libsql::params![name, camera, id]).await?)
    }

    /// Batch insert used by synchronization; returns the assigned id.
    pub(crate) async fn apply_insert(&self, name: Option<&str>, camera: Option<&str>) -> StoreResult<i64> {
        let query = "INSERT INTO producto (nombre, camara) VALUES (?, ?) RETURNING id";

        let mut rows = self.conn.query(query, libsql::params![name, camera]).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Err(StoreError::MissingRow("insert producto")),
        }
    }

    async fn fetch_optional(&self, query: &str, params: impl libsql::params::IntoParams) -> StoreResult<Option<Producto>> {
        let mut rows = self.conn.query(query, params).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_producto(&row)?))
        } else {
            Ok(None)
        }
    }
}

fn validate(field: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn row_to_producto(row: &libsql::Row) -> StoreResult<Producto> {
    Ok(Producto {
        id: row.get(0)?,
        name: row.get(1)?,
        camera: row.get(2)?,
    })
}
