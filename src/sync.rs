//! Batch synchronization for offline clients.
//!
//! A client sends every item it holds locally. Items carrying an id are
//! written over the matching row; items without one become new rows. The
//! whole batch runs in one transaction: if any item faults, nothing from
//! the batch is kept.
//!
//! An id that matches no row is skipped without error. The client may be
//! working from a listing that has since lost that row, and failing the
//! batch would block every other change it carries.

use serde::Serialize;

use crate::db::Database;
use crate::error::{StoreResult, SyncError};
use crate::model::ClientItem;
use crate::store::Productos;

pub enum SyncResult {
    Created(i64),
    Updated(i64),
    Skipped(i64),
}

impl SyncResult {
    pub fn record(self, report: &mut SyncReport) {
        match self {
            SyncResult::Created(_) => report.created += 1,
            SyncResult::Updated(_) => report.updated += 1,
            SyncResult::Skipped(id) => {
                log_update_not_found(id);
                report.skipped += 1;
            }
        }
    }
}

/// Counts of what a committed batch did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
}

fn log_update_not_found(id: i64) {
    tracing::warn!(id, "producto not found for sync update, skipping");
}

/// Applies one client item on the transaction's connection.
pub async fn apply_item(store: &Productos<'_>, item: &ClientItem) -> StoreResult<SyncResult> {
    let name = item.name.as_deref();
    let camera = item.camera.as_deref();

    match item.target_id() {
        Some(id) => {
            let touched = store.apply_update(id, name, camera).await?;
            if touched == 0 {
                Ok(SyncResult::Skipped(id))
            } else {
                Ok(SyncResult::Updated(id))
            }
        }
        None => {
            let id = store.apply_insert(name, camera).await?;
            Ok(SyncResult::Created(id))
        }
    }
}

/// Applies `items` in order as one all-or-nothing unit.
///
/// Stops at the first faulting item and rolls back everything the batch
/// already wrote. The returned error names the item's position.
pub async fn synchronize(db: &Database, items: Vec<ClientItem>) -> Result<SyncReport, SyncError> {
    let total = items.len();
    tracing::info!(items = total, "sync batch started");

    let report = db
        .with_transaction(move |conn| {
            Box::pin(async move {
                let store = Productos::new(conn);
                let mut report = SyncReport::default();

                for (index, item) in items.iter().enumerate() {
                    let result = apply_item(&store, item)
                        .await
                        .map_err(|source| SyncError::Item { index, source })?;
                    result.record(&mut report);
                }

                Ok::<_, SyncError>(report)
            })
        })
        .await
        .inspect_err(|e| tracing::error!(error = %crate::unpack_error(e), "sync batch rolled back"))?;

    tracing::info!(
        items = total,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        "sync batch committed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::open_test_db;
    use crate::error::StoreError;
    use crate::model::Producto;

    async fn seed(db: &Database, rows: &[(&str, &str)]) -> Vec<Producto> {
        let conn = db.acquire().await.unwrap();
        let store = Productos::new(&conn);
        let mut created = Vec::new();
        for (name, camera) in rows {
            created.push(store.create(name, camera).await.unwrap());
        }
        created
    }

    async fn snapshot(db: &Database) -> Vec<Producto> {
        let conn = db.acquire().await.unwrap();
        Productos::new(&conn).list_all().await.unwrap()
    }

    #[tokio::test]
    async fn inserts_and_updates_in_one_batch() {
        let (_dir, db) = open_test_db().await;
        let seeded = seed(&db, &[("Leche", "C1"), ("Queso", "C2")]).await;

        let report = synchronize(
            &db,
            vec![
                ClientItem::existing(seeded[0].id, "Leche", "C5"),
                ClientItem::new("Yogur", "C3"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report, SyncReport { created: 1, updated: 1, skipped: 0 });

        let rows = snapshot(&db).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].camera, "C5");
        assert_eq!(rows[1], seeded[1]);
        assert_eq!(rows[2].name, "Yogur");
        assert!(rows[2].id > seeded[1].id);
    }

    #[tokio::test]
    async fn unknown_id_is_a_silent_no_op() {
        let (_dir, db) = open_test_db().await;
        let seeded = seed(&db, &[("Leche", "C1")]).await;

        let report = synchronize(
            &db,
            vec![ClientItem::new("Yogur", "C3"), ClientItem::existing(4242, "Fantasma", "C0")],
        )
        .await
        .unwrap();

        assert_eq!(report, SyncReport { created: 1, updated: 0, skipped: 1 });

        let rows = snapshot(&db).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], seeded[0]);
        assert!(rows.iter().all(|p| p.id != 4242 && p.name != "Fantasma"));
    }

    #[tokio::test]
    async fn fault_rolls_back_the_whole_batch() {
        let (_dir, db) = open_test_db().await;
        let seeded = seed(&db, &[("Leche", "C1"), ("Queso", "C2")]).await;
        let before = snapshot(&db).await;

        let broken = ClientItem {
            id: None,
            name: None,
            camera: Some("C4".into()),
        };
        let err = synchronize(
            &db,
            vec![
                ClientItem::existing(seeded[0].id, "Leche", "C9"),
                ClientItem::new("Yogur", "C3"),
                broken,
                ClientItem::existing(seeded[1].id, "Queso", "C9"),
            ],
        )
        .await
        .unwrap_err();

        assert_eq!(err.index(), Some(2));
        assert!(matches!(err.store_error(), StoreError::Unavailable(_)));
        assert_eq!(snapshot(&db).await, before);
    }

    #[tokio::test]
    async fn fault_on_update_rolls_back_earlier_inserts() {
        let (_dir, db) = open_test_db().await;
        let seeded = seed(&db, &[("Leche", "C1")]).await;
        let before = snapshot(&db).await;

        let err = synchronize(
            &db,
            vec![
                ClientItem::new("Yogur", "C3"),
                ClientItem {
                    id: Some(seeded[0].id),
                    name: Some("Leche".into()),
                    camera: None,
                },
            ],
        )
        .await
        .unwrap_err();

        assert_eq!(err.index(), Some(1));
        assert_eq!(snapshot(&db).await, before);

        let created = seed(&db, &[("Mantequilla", "C2")]).await;
        assert!(created[0].id > seeded[0].id);
    }

    #[tokio::test]
    async fn zero_id_inserts_a_new_row() {
        let (_dir, db) = open_test_db().await;
        let seeded = seed(&db, &[("Leche", "C1")]).await;

        let report = synchronize(
            &db,
            vec![ClientItem {
                id: Some(0),
                ..ClientItem::new("Yogur", "C3")
            }],
        )
        .await
        .unwrap();

        assert_eq!(report, SyncReport { created: 1, updated: 0, skipped: 0 });

        let rows = snapshot(&db).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], seeded[0]);
        assert_eq!(rows[1].name, "Yogur");
        assert!(rows[1].id > 0);
    }

    #[tokio::test]
    async fn update_only_batches_are_idempotent() {
        let (_dir, db) = open_test_db().await;
        let seeded = seed(&db, &[("Leche", "C1"), ("Queso", "C2"), ("Yogur", "C3")]).await;

        let batch = vec![
            ClientItem::existing(seeded[2].id, "Yogur griego", "C8"),
            ClientItem::existing(seeded[0].id, "Leche", "C7"),
        ];

        synchronize(&db, batch.clone()).await.unwrap();
        let first = snapshot(&db).await;
        synchronize(&db, batch).await.unwrap();
        let second = snapshot(&db).await;

        assert_eq!(first, second);
        assert_eq!(first[1], seeded[1]);
    }

    #[tokio::test]
    async fn update_order_does_not_change_the_result() {
        let (_dir, db) = open_test_db().await;
        let seeded = seed(&db, &[("Leche", "C1"), ("Queso", "C2")]).await;

        let a = ClientItem::existing(seeded[0].id, "Leche", "C5");
        let b = ClientItem::existing(seeded[1].id, "Queso", "C6");

        synchronize(&db, vec![a.clone(), b.clone()]).await.unwrap();
        let forward = snapshot(&db).await;

        synchronize(&db, vec![b, a]).await.unwrap();
        let backward = snapshot(&db).await;

        assert_eq!(forward, backward);
    }

    #[tokio::test]
    async fn create_then_sync_update_keeps_identity() {
        let (_dir, db) = open_test_db().await;
        let created = seed(&db, &[("Leche", "C1")]).await.remove(0);

        synchronize(&db, vec![ClientItem::existing(created.id, &created.name, "new")])
            .await
            .unwrap();

        let rows = snapshot(&db).await;
        assert_eq!(
            rows,
            vec![Producto {
                id: created.id,
                name: created.name,
                camera: "new".into(),
            }]
        );
    }

    #[tokio::test]
    async fn empty_batch_commits_nothing() {
        let (_dir, db) = open_test_db().await;
        seed(&db, &[("Leche", "C1")]).await;
        let before = snapshot(&db).await;

        let report = synchronize(&db, Vec::new()).await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(snapshot(&db).await, before);
    }

    #[tokio::test]
    async fn concurrent_disjoint_batches_both_land() {
        let (_dir, db) = open_test_db().await;
        let seeded = seed(&db, &[("Leche", "C1"), ("Queso", "C2")]).await;
        let db = std::sync::Arc::new(db);

        let left = {
            let db = db.clone();
            let id = seeded[0].id;
            tokio::spawn(async move {
                synchronize(&db, vec![ClientItem::existing(id, "Leche", "L"), ClientItem::new("Nata", "L")]).await
            })
        };
        let right = {
            let db = db.clone();
            let id = seeded[1].id;
            tokio::spawn(async move {
                synchronize(&db, vec![ClientItem::existing(id, "Queso", "R"), ClientItem::new("Kéfir", "R")]).await
            })
        };

        left.await.unwrap().unwrap();
        right.await.unwrap().unwrap();

        let rows = snapshot(&db).await;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].camera, "L");
        assert_eq!(rows[1].camera, "R");
        assert!(rows.iter().any(|p| p.name == "Nata" && p.camera == "L"));
        assert!(rows.iter().any(|p| p.name == "Kéfir" && p.camera == "R"));
    }
}
