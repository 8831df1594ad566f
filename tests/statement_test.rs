//! Integration tests for prepared statements and parameter binding.

use dbdevice::{
    BindingError, Connection, Current, DbError, Device, MemoryStore, OpenFlags, Role, Row, Value,
};
use rand::Rng;
use serde_json::json;
use tempfile::TempDir;

async fn exec(conn: &mut Connection, sql: &str) {
    let mut rs = conn.query(sql).await.unwrap();
    while rs.valid().await.unwrap() {
        rs.next();
    }
}

async fn sqlite_connection(dir: &TempDir) -> (Device, Connection) {
    let path = dir.path().join("stmt.db");
    let device = Device::sqlite(path.to_string_lossy(), OpenFlags::default(), None).unwrap();
    let mut conn = device.connection(Role::Master).await.unwrap();
    exec(
        &mut conn,
        "CREATE TABLE people (name TEXT, age INTEGER, score REAL, photo BLOB)",
    )
    .await;
    (device, conn)
}

fn binding_error(err: DbError) -> BindingError {
    match err {
        DbError::Binding(e) => e,
        other => panic!("expected binding error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bind_param_validation_order() {
    let dir = TempDir::new().unwrap();
    let (_device, mut conn) = sqlite_connection(&dir).await;
    let mut stmt = conn
        .prepare("SELECT name FROM people WHERE age = ? AND name = ?")
        .await
        .unwrap();
    assert_eq!(stmt.param_count(), 2);

    stmt.bind_param("is", &[1.into(), "a".into()]).unwrap();
    assert_eq!(stmt.bound_values().len(), 2);

    let err = binding_error(stmt.bind_param("is", &[1.into()]).unwrap_err());
    assert_eq!(
        err,
        BindingError::CountMismatch {
            types: 2,
            values: 1
        }
    );

    // Unknown tags are reported before the count check
    let err = binding_error(stmt.bind_param("x?", &[1.into()]).unwrap_err());
    assert!(matches!(err, BindingError::InvalidType { tag: 'x', .. }));

    let err = binding_error(
        stmt.bind_param("iss", &[1.into(), "a".into(), "b".into()])
            .unwrap_err(),
    );
    assert_eq!(
        err,
        BindingError::ArityMismatch {
            given: 3,
            required: 2
        }
    );

    let err = binding_error(stmt.bind_param("is", &["old".into(), "a".into()]).unwrap_err());
    assert!(matches!(err, BindingError::Incompatible { index: 0, .. }));

    // Integral floats beyond the i64 range are rejected rather than clamped
    let err = binding_error(
        stmt.bind_param("is", &[Value::Float(1e20), "a".into()])
            .unwrap_err(),
    );
    assert!(matches!(err, BindingError::Incompatible { index: 0, .. }));

    // Failed binds leave the previous bindings in place
    assert_eq!(stmt.bound_values().len(), 2);
}

#[tokio::test]
async fn test_execute_without_bindings_is_arity_mismatch() {
    let dir = TempDir::new().unwrap();
    let (_device, mut conn) = sqlite_connection(&dir).await;
    let mut stmt = conn
        .prepare("SELECT * FROM people WHERE age > ?")
        .await
        .unwrap();

    let err = binding_error(stmt.execute().await.unwrap_err());
    assert_eq!(
        err,
        BindingError::ArityMismatch {
            given: 0,
            required: 1
        }
    );
}

#[tokio::test]
async fn test_statement_reuse_with_random_rows() {
    let dir = TempDir::new().unwrap();
    let (_device, mut conn) = sqlite_connection(&dir).await;
    let mut rng = rand::thread_rng();

    let people: Vec<(String, i64, f64)> = (0..20)
        .map(|i| {
            (
                format!("person-{}", i),
                rng.gen_range(18..90),
                rng.gen_range(0.0..100.0),
            )
        })
        .collect();

    {
        let mut insert = conn
            .prepare("INSERT INTO people (name, age, score, photo) VALUES (?, ?, ?, ?)")
            .await
            .unwrap();
        for (name, age, score) in &people {
            insert
                .bind_param(
                    "sidb",
                    &[
                        name.as_str().into(),
                        (*age).into(),
                        (*score).into(),
                        Value::Null,
                    ],
                )
                .unwrap();
            let mut rs = insert.execute().await.unwrap();
            assert!(!rs.valid().await.unwrap());
        }
    }

    let threshold = 50;
    let expected: Vec<&str> = people
        .iter()
        .filter(|(_, age, _)| *age >= threshold)
        .map(|(name, _, _)| name.as_str())
        .collect();

    let mut select = conn
        .prepare("SELECT name, age, photo FROM people WHERE age >= ? ORDER BY rowid")
        .await
        .unwrap();
    // Text is coerced to the integer tag
    select.bind_param("i", &[threshold.to_string().into()]).unwrap();

    for _ in 0..2 {
        let rows = select.execute().await.unwrap().fetch_all().await.unwrap();
        let names: Vec<String> = rows
            .iter()
            .map(|row| row.row()["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, expected);
        assert!(rows.iter().all(|row| row.row()["photo"].is_null()));
    }
}

#[tokio::test]
async fn test_blob_and_float_values() {
    let dir = TempDir::new().unwrap();
    let (_device, mut conn) = sqlite_connection(&dir).await;

    {
        let mut insert = conn
            .prepare("INSERT INTO people (name, score, photo) VALUES (?, ?, ?)")
            .await
            .unwrap();
        insert
            .bind_param("sdb", &["ann".into(), 7.into(), vec![0u8, 1, 2].into()])
            .unwrap();
        insert.execute().await.unwrap();
    }

    let mut rs = conn.query("SELECT score, photo FROM people").await.unwrap();
    assert!(rs.valid().await.unwrap());
    let row = rs.current().unwrap().into_row();
    assert_eq!(row["score"], json!(7.0));
    assert_eq!(row["photo"], json!("AAEC"));
}

#[tokio::test]
async fn test_compile_error_carries_query() {
    let dir = TempDir::new().unwrap();
    let (_device, mut conn) = sqlite_connection(&dir).await;

    let err = conn.prepare("SELECT FROM WHERE").await.unwrap_err();
    match err {
        DbError::Compile { query, .. } => assert_eq!(query, "SELECT FROM WHERE"),
        other => panic!("expected compile error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_memory_statement_binding() {
    let store = MemoryStore::new();
    for (name, team) in [("ann", "red"), ("bob", "blue"), ("cy", "red")] {
        let row: Row = json!({"name": name, "team": team})
            .as_object()
            .cloned()
            .unwrap();
        store.insert("players", row);
    }
    let device = Device::memory(store).unwrap();
    let mut conn = device.connection(Role::Slave).await.unwrap();

    {
        let mut stmt = conn.prepare("FIND players WHERE team = ?").await.unwrap();
        assert_eq!(stmt.param_count(), 1);
        assert!(matches!(
            stmt.bind_param("ss", &["red".into(), "x".into()]),
            Err(DbError::Binding(BindingError::ArityMismatch { .. }))
        ));

        stmt.bind_param("s", &["red".into()]).unwrap();
        let rows = stmt.execute().await.unwrap().fetch_all().await.unwrap();
        let names: Vec<_> = rows
            .into_iter()
            .map(Current::into_row)
            .map(|row| row["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("ann"), json!("cy")]);
    }

    conn.release().await.unwrap();
}
