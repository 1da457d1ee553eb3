use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::model::{ClientItem, Producto};
use crate::sync::SyncReport;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Serialize, Default)]
pub struct APIResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Producto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Producto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncReport>,
}

impl APIResponse {
    pub fn success(msg: &str) -> Self {
        APIResponse {
            status: STATUS_SUCCESS.to_owned(),
            message: msg.to_owned(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        APIResponse {
            status: STATUS_ERROR.to_owned(),
            message: msg.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_item(mut self, item: Producto) -> Self {
        self.item = Some(item);
        self
    }

    pub fn with_items(mut self, items: Vec<Producto>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_summary(mut self, summary: SyncReport) -> Self {
        self.summary = Some(summary);
        self
    }
}

/// Body of create and full-update requests.
#[derive(Debug, Deserialize, Default)]
pub struct ProductoPayload {
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(default, alias = "camara")]
    pub camera: Option<String>,
}

impl ProductoPayload {
    pub fn into_fields(self) -> Result<(String, String), ApiError> {
        match (non_empty(self.name), non_empty(self.camera)) {
            (Some(name), Some(camera)) => Ok((name, camera)),
            _ => Err(ApiError::BadRequest("Se requiere nombre y cámara".to_owned())),
        }
    }
}

/// Body of the camera-only update.
#[derive(Debug, Deserialize, Default)]
pub struct CameraPayload {
    #[serde(default, alias = "camara")]
    pub camera: Option<String>,
}

impl CameraPayload {
    pub fn into_camera(self) -> Result<String, ApiError> {
        non_empty(self.camera).ok_or_else(|| ApiError::BadRequest("Se requiere el valor de la cámara".to_owned()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Extracts the batch from a sync request body.
///
/// The body must carry an array under `items` (or the legacy `productos`);
/// anything else is rejected before the store is touched.
pub fn parse_sync_request(body: Value) -> Result<Vec<ClientItem>, ApiError> {
    let missing = || ApiError::BadRequest("Se requiere un array de productos".to_owned());

    let mut body = match body {
        Value::Object(map) => map,
        _ => return Err(missing()),
    };
    let items = body
        .remove("items")
        .or_else(|| body.remove("productos"))
        .ok_or_else(missing)?;

    let entries = match items {
        Value::Array(entries) => entries,
        _ => return Err(missing()),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<ClientItem>(entry)
                .map_err(|e| ApiError::BadRequest(format!("producto {index} inválido: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_requires_both_fields() {
        let payload = ProductoPayload {
            name: Some("Queso".into()),
            camera: None,
        };
        assert!(matches!(payload.into_fields(), Err(ApiError::BadRequest(_))));

        let payload = ProductoPayload {
            name: Some(String::new()),
            camera: Some("C1".into()),
        };
        assert!(payload.into_fields().is_err());

        let payload: ProductoPayload = serde_json::from_value(json!({"nombre": "Queso", "camara": "C1"})).unwrap();
        assert_eq!(payload.into_fields().unwrap(), ("Queso".to_owned(), "C1".to_owned()));
    }

    #[test]
    fn sync_request_requires_an_array() {
        assert!(parse_sync_request(json!({})).is_err());
        assert!(parse_sync_request(json!({"items": {"id": 1}})).is_err());
        assert!(parse_sync_request(json!([1, 2])).is_err());
        assert!(parse_sync_request(json!({"items": [{"id": "uno"}]})).is_err());

        let items = parse_sync_request(json!({"items": []})).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn sync_request_accepts_legacy_key() {
        let items = parse_sync_request(json!({
            "productos": [
                {"id": 3, "nombre": "Yogur", "camara": "C4"},
                {"nombre": "Mantequilla", "camara": "C1"}
            ]
        }))
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], ClientItem::existing(3, "Yogur", "C4"));
        assert_eq!(items[1], ClientItem::new("Mantequilla", "C1"));
    }

    #[test]
    fn error_body_omits_empty_payloads() {
        let body = serde_json::to_value(APIResponse::error("boom")).unwrap();
        assert_eq!(body, json!({"status": "error", "message": "boom"}));
    }
}
