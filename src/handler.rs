use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;

use tracing::info;

use crate::api::{APIResponse, CameraPayload, ProductoPayload, parse_sync_request};
use crate::db::Database;
use crate::error::{ApiError, StoreError};
use crate::model::Producto;
use crate::store::Productos;
use crate::sync;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

type HandlerResult<T> = Result<T, ApiError>;

fn path_id(path: Result<Path<i64>, PathRejection>) -> HandlerResult<i64> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(format!("id inválido: {}", e.body_text())))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> HandlerResult<T> {
    body.map(|Json(payload)| payload)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(APIResponse::success("API de productos funcionando correctamente"))
}

pub async fn test_connection(State(state): State<AppState>) -> HandlerResult<Json<APIResponse>> {
    state.db.test_connection().await?;
    info!("database connection ok");
    Ok(Json(APIResponse::success(
        "Conexión a la base de datos establecida correctamente",
    )))
}

pub async fn list_productos(State(state): State<AppState>) -> HandlerResult<Json<Vec<Producto>>> {
    let conn = state.db.acquire().await?;
    let productos = Productos::new(&conn).list_all().await?;

    info!(count = productos.len(), "got productos");
    Ok(Json(productos))
}

pub async fn get_producto(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> HandlerResult<Json<Producto>> {
    let id = path_id(path)?;
    let conn = state.db.acquire().await?;

    match Productos::new(&conn).get_by_id(id).await? {
        Some(producto) => Ok(Json(producto)),
        None => Err(StoreError::NotFound(id).into()),
    }
}

pub async fn create_producto(
    State(state): State<AppState>,
    body: Result<Json<ProductoPayload>, JsonRejection>,
) -> HandlerResult<(StatusCode, Json<Producto>)> {
    let (name, camera) = json_body(body)?.into_fields()?;
    let conn = state.db.acquire().await?;
    let producto = Productos::new(&conn).create(&name, &camera).await?;

    info!(id = producto.id, "created producto");
    Ok((StatusCode::CREATED, Json(producto)))
}

pub async fn update_producto(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<ProductoPayload>, JsonRejection>,
) -> HandlerResult<Json<Producto>> {
    let id = path_id(path)?;
    let (name, camera) = json_body(body)?.into_fields()?;
    let conn = state.db.acquire().await?;

    match Productos::new(&conn).update_full(id, &name, &camera).await? {
        Some(producto) => {
            info!(id, "updated producto");
            Ok(Json(producto))
        }
        None => Err(StoreError::NotFound(id).into()),
    }
}

pub async fn update_camara(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<CameraPayload>, JsonRejection>,
) -> HandlerResult<Json<Producto>> {
    let id = path_id(path)?;
    let camera = json_body(body)?.into_camera()?;
    let conn = state.db.acquire().await?;

    match Productos::new(&conn).update_camera(id, &camera).await? {
        Some(producto) => {
            info!(id, camera = %producto.camera, "updated producto camera");
            Ok(Json(producto))
        }
        None => Err(StoreError::NotFound(id).into()),
    }
}

pub async fn delete_producto(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> HandlerResult<Json<APIResponse>> {
    let id = path_id(path)?;
    let conn = state.db.acquire().await?;

    match Productos::new(&conn).delete(id).await? {
        Some(producto) => {
            info!(id, "deleted producto");
            Ok(Json(
                APIResponse::success("Producto eliminado correctamente").with_item(producto),
            ))
        }
        None => Err(StoreError::NotFound(id).into()),
    }
}

/// Applies a client's batch, then answers with the full listing as of
/// after the commit.
pub async fn sincronizar(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> HandlerResult<Json<APIResponse>> {
    let items = parse_sync_request(json_body(body)?)?;
    let report = sync::synchronize(&state.db, items).await?;

    let conn = state.db.acquire().await?;
    let productos = Productos::new(&conn).list_all().await?;

    Ok(Json(
        APIResponse::success("Sincronización completada correctamente")
            .with_items(productos)
            .with_summary(report),
    ))
}
