mod common;

use karat_store::prelude::*;
use tokio::time::Instant;

async fn seed_vendors(db: &Database, names: &[&str]) -> Vec<Record> {
    db.vendors()
        .batch_create(
            names
                .iter()
                .map(|name| Record::new().with("name", *name).with("phone", "555-0100"))
                .collect(),
        )
        .await
        .unwrap()
}

fn names(rows: &[Record]) -> Vec<&str> {
    rows.iter().filter_map(|row| row.get_str("name")).collect()
}

#[tokio::test]
async fn test_equality_filter_returns_exactly_matching_rows() {
    let db = common::open().await;
    let pieces = db.jewelry().pieces().clone();
    for (code, status) in [
        ("A", "In Stock"),
        ("B", "Sold"),
        ("C", "In Stock"),
        ("D", "Reserved"),
    ] {
        pieces
            .create(Record::new().with("code", code).with("name", code).with("status", status))
            .await
            .unwrap();
    }

    let in_stock = pieces
        .find_all(
            &Filter::new().eq("status", JewelryStatus::InStock),
            &Sort::asc("code"),
            Page::Unbounded,
            &Projection::All,
        )
        .await
        .unwrap();
    let codes: Vec<_> = in_stock.iter().filter_map(|r| r.get_str("code")).collect();
    assert_eq!(codes, ["A", "C"]);
}

#[tokio::test]
async fn test_membership_filter_returns_exactly_listed_ids() {
    let db = common::open().await;
    seed_vendors(&db, &["v1", "v2", "v3", "v4", "v5"]).await;

    let rows = db
        .vendors()
        .find_all(
            &Filter::new().in_list("id", [1_i64, 2, 3]),
            &Sort::new(),
            Page::Unbounded,
            &Projection::All,
        )
        .await
        .unwrap();
    let mut ids: Vec<i64> = rows.iter().filter_map(|r| r.get_i64("id")).collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 2, 3]);

    let none = db
        .vendors()
        .find_all(
            &Filter::new().in_list("id", Vec::<i64>::new()),
            &Sort::new(),
            Page::Unbounded,
            &Projection::All,
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_page_window_over_sorted_results() {
    let db = common::open().await;
    let all: Vec<String> = (0..10).map(|i| format!("vendor-{:02}", i)).collect();
    let refs: Vec<&str> = all.iter().map(String::as_str).collect();
    seed_vendors(&db, &refs).await;
    let vendors = db.vendors();
    let sort = Sort::asc("name");

    let page = vendors
        .find_all(&Filter::new(), &sort, Page::window(3, 4), &Projection::All)
        .await
        .unwrap();
    assert_eq!(names(&page), ["vendor-04", "vendor-05", "vendor-06"]);

    let tail = vendors
        .find_all(&Filter::new(), &sort, Page::number(4, 3), &Projection::All)
        .await
        .unwrap();
    assert_eq!(names(&tail), ["vendor-09"]);

    let everything = vendors
        .find_all(&Filter::new(), &sort, Page::Unbounded, &Projection::All)
        .await
        .unwrap();
    assert_eq!(everything.len(), 10);
}

#[tokio::test]
async fn test_projection_and_descending_sort() {
    let db = common::open().await;
    seed_vendors(&db, &["b", "c", "a"]).await;

    let rows = db
        .vendors()
        .find_all(
            &Filter::new(),
            &Sort::new().then_parsed("name", "DESC").unwrap(),
            Page::Unbounded,
            &Projection::columns(["id", "name"]),
        )
        .await
        .unwrap();
    assert_eq!(names(&rows), ["c", "b", "a"]);
    assert!(rows.iter().all(|row| row.len() == 2));
}

#[tokio::test]
async fn test_find_one_count_exists() {
    let db = common::open().await;
    seed_vendors(&db, &["Aurum", "Argent"]).await;
    let vendors = db.vendors();

    let found = vendors
        .find_one(&Filter::new().op("name", FilterOperator::Like, "Arg%"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get_str("name"), Some("Argent"));
    assert!(vendors
        .find_one(&Filter::new().eq("name", "Platina"))
        .await
        .unwrap()
        .is_none());

    assert_eq!(vendors.count(&Filter::new()).await.unwrap(), 2);
    let optional_city: Option<&str> = None;
    assert_eq!(
        vendors
            .count(&Filter::new().eq_opt("city", optional_city))
            .await
            .unwrap(),
        2
    );
    assert!(vendors.exists(&Filter::new().eq("name", "Aurum")).await.unwrap());
}

#[tokio::test]
async fn test_hostile_values_are_bound_not_executed() {
    let db = common::open().await;
    seed_vendors(&db, &["Aurum"]).await;

    let rows = db
        .vendors()
        .find_all(
            &Filter::new().eq("name", "x' OR '1'='1"),
            &Sort::new(),
            Page::Unbounded,
            &Projection::All,
        )
        .await
        .unwrap();
    assert!(rows.is_empty());

    let err = db
        .vendors()
        .find_all(
            &Filter::new(),
            &Sort::asc("name; DROP TABLE vendors"),
            Page::Unbounded,
            &Projection::All,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    assert_eq!(db.vendors().count(&Filter::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_patches_only_supplied_columns() {
    let db = common::open().await;
    let users = db.users();
    let created = users
        .create(
            Record::new()
                .with("username", "asha")
                .with("email", "asha@example.com")
                .with("role", "admin"),
        )
        .await
        .unwrap();
    let id = created.get("id").cloned().unwrap();

    let updated = users
        .update(&id, Record::new().with("email", "asha@karat.shop"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get_str("email"), Some("asha@karat.shop"));
    assert_eq!(updated.get_str("role"), Some("admin"));
    assert!(updated.get_str("updated_at") >= created.get_str("updated_at"));

    assert!(users
        .update(&Value::Integer(404), Record::new().with("email", "x"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_soft_and_hard_delete() {
    let db = common::open().await;
    let categories = db.categories();
    let rings = categories
        .create(Record::new().with("name", "Rings"))
        .await
        .unwrap();
    let id = rings.get("id").cloned().unwrap();

    let retired = categories.soft_delete(&id).await.unwrap().unwrap();
    assert_eq!(retired.get("is_active").and_then(Value::as_bool), Some(false));
    assert!(categories.find_by_id(&id).await.unwrap().is_some());

    assert!(categories.delete(&id).await.unwrap());
    assert!(!categories.delete(&id).await.unwrap());
    assert!(categories.find_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_constraint_violation_is_distinct_from_absence() {
    let db = common::open().await;
    let materials = db.materials();
    materials
        .create(Record::new().with("name", "Gold 22K").with("rate_per_gram", 6100.0))
        .await
        .unwrap();

    let duplicate = materials
        .create(Record::new().with("name", "Gold 22K"))
        .await
        .unwrap_err();
    assert_eq!(duplicate.kind, RepositoryErrorKind::ConstraintViolation);
    assert_eq!(duplicate.constraint.as_deref(), Some("unique materials.name"));
    assert!(!duplicate.is_retriable());

    let negative = materials
        .create(Record::new().with("name", "Silver").with("rate_per_gram", -1.0))
        .await
        .unwrap_err();
    assert_eq!(negative.kind, RepositoryErrorKind::ConstraintViolation);

    assert!(materials.find_by_id(&Value::Integer(99)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_create_persists_nothing_on_failure() {
    let db = common::open().await;
    let err = db
        .materials()
        .batch_create(vec![
            Record::new().with("name", "Gold"),
            Record::new().with("name", "Silver"),
            Record::new().with("name", "Gold"),
        ])
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::ConstraintViolation);
    assert_eq!(db.materials().count(&Filter::new()).await.unwrap(), 0);
    common::assert_all_connections_released(&db).await;
}

#[tokio::test]
async fn test_manual_transaction_commit_and_drop() {
    let db = common::open_with(1).await;
    let vendors = db.vendors();

    let mut tx = vendors.begin_transaction().await.unwrap();
    vendors
        .create_in(&mut tx, Record::new().with("name", "Committed"))
        .await
        .unwrap();
    vendors.commit_transaction(tx).await.unwrap();

    {
        let mut tx = vendors.begin_transaction().await.unwrap();
        vendors
            .create_in(&mut tx, Record::new().with("name", "Abandoned"))
            .await
            .unwrap();
        // Dropped without commit
    }

    // With a single connection this only succeeds if both handles gave it back
    let rows = vendors
        .find_all(&Filter::new(), &Sort::asc("id"), Page::Unbounded, &Projection::All)
        .await
        .unwrap();
    assert_eq!(names(&rows), ["Committed"]);
    common::assert_all_connections_released(&db).await;
}

#[tokio::test]
async fn test_expired_deadline_times_out_and_rolls_back() {
    let db = common::open_with(1).await;
    let vendors = db.vendors();

    let mut tx = vendors.begin_transaction().await.unwrap();
    vendors
        .create_in(&mut tx, Record::new().with("name", "Half written"))
        .await
        .unwrap();

    tx.set_deadline(Some(Instant::now()));
    let err = vendors
        .create_in(&mut tx, Record::new().with("name", "Too late"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::Timeout);
    assert!(err.is_retriable());

    let err = tx.finish::<()>(Err(err)).await.unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::Timeout);

    assert_eq!(vendors.count(&Filter::new()).await.unwrap(), 0);
    common::assert_all_connections_released(&db).await;
}

#[tokio::test]
async fn test_delete_where_requires_a_filter() {
    let db = common::open().await;
    seed_vendors(&db, &["a", "b"]).await;
    let vendors = db.vendors();

    let mut tx = vendors.begin_transaction().await.unwrap();
    let err = vendors
        .delete_where_in(&mut tx, &Filter::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);

    let removed = vendors
        .delete_where_in(&mut tx, &Filter::new().eq("name", "a"))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    vendors.commit_transaction(tx).await.unwrap();

    assert_eq!(vendors.count(&Filter::new()).await.unwrap(), 1);
}
