use serde::{Deserialize, Serialize};

/// A persisted inventory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producto {
    pub id: i64,
    pub name: String,
    pub camera: String,
}

/// One entry of a synchronization batch as sent by a client.
///
/// `id` selects between updating an existing row and inserting a new one.
/// Names and cameras are passed through as-is; a missing value reaches the
/// store as NULL and fails the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientItem {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(default, alias = "camara")]
    pub camera: Option<String>,
}

impl ClientItem {
    pub fn new(name: &str, camera: &str) -> Self {
        ClientItem {
            id: None,
            name: Some(name.to_owned()),
            camera: Some(camera.to_owned()),
        }
    }

    pub fn existing(id: i64, name: &str, camera: &str) -> Self {
        ClientItem {
            id: Some(id),
            ..ClientItem::new(name, camera)
        }
    }

    /// The row this item targets. Legacy clients send `0` for rows they
    /// have not saved yet, so it counts as absent.
    pub fn target_id(&self) -> Option<i64> {
        self.id.filter(|id| *id != 0)
    }
}
