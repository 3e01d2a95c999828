#![cfg(feature = "memory")]

use clickmig_client::{Client, ClientError, Column, MemoryEngine, Row};
use serde_json::json;

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn create_insert_select() {
    let engine = MemoryEngine::new();
    let client = Client::new(engine.clone());

    client
        .execute("CREATE TABLE events (id UInt64, name String) ENGINE = MergeTree ORDER BY id")
        .await
        .unwrap();

    assert!(client.table_exists("events").await.unwrap());

    client
        .insert(
            "events",
            vec![
                row(json!({ "id": 1, "name": "signup" })),
                row(json!({ "id": 2, "name": "login" })),
            ],
        )
        .await
        .unwrap();

    let rows = client.select("SELECT name FROM events").await.unwrap();

    assert_eq!(
        rows,
        vec![row(json!({ "name": "signup" })), row(json!({ "name": "login" }))]
    );

    assert_eq!(client.select("SELECT * FROM events").await.unwrap().len(), 2);
    assert_eq!(engine.rows("events").len(), 2);
}

#[tokio::test]
async fn create_is_idempotent_only_when_asked() {
    let client = Client::new(MemoryEngine::new());

    client
        .execute("CREATE TABLE IF NOT EXISTS t (id UInt64) ENGINE = MergeTree ORDER BY id")
        .await
        .unwrap();
    client
        .execute("CREATE TABLE IF NOT EXISTS t (id UInt64) ENGINE = MergeTree ORDER BY id")
        .await
        .unwrap();

    let err = client
        .execute("CREATE TABLE t (id UInt64) ENGINE = MergeTree ORDER BY id")
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::TableExists(name) if name == "t"));
}

#[tokio::test]
async fn alter_columns() {
    let client = Client::new(MemoryEngine::new());

    client
        .execute("CREATE TABLE t (id UInt64) ENGINE = MergeTree ORDER BY id")
        .await
        .unwrap();
    client
        .execute("ALTER TABLE t ADD COLUMN region LowCardinality(String) DEFAULT 'eu'")
        .await
        .unwrap();

    assert_eq!(
        client.describe_table("t").await.unwrap(),
        vec![
            Column {
                name: "id".to_owned(),
                data_type: "UInt64".to_owned()
            },
            Column {
                name: "region".to_owned(),
                data_type: "LowCardinality(String)".to_owned()
            },
        ]
    );

    client
        .execute("ALTER TABLE t DROP COLUMN region")
        .await
        .unwrap();
    client
        .execute("ALTER TABLE t DROP COLUMN IF EXISTS region")
        .await
        .unwrap();

    assert_eq!(client.describe_table("t").await.unwrap().len(), 1);
    assert!(client
        .execute("ALTER TABLE t DROP COLUMN region")
        .await
        .is_err());
}

#[tokio::test]
async fn drop_table() {
    let client = Client::new(MemoryEngine::new());

    client
        .execute("CREATE TABLE t (id UInt64) ENGINE = MergeTree ORDER BY id")
        .await
        .unwrap();
    client.execute("DROP TABLE t").await.unwrap();

    assert!(!client.table_exists("t").await.unwrap());
    assert!(client.execute("DROP TABLE IF EXISTS t").await.is_ok());
    assert!(matches!(
        client.execute("DROP TABLE t").await.unwrap_err(),
        ClientError::UnknownTable(_)
    ));
}

#[tokio::test]
async fn rejects_and_records_unknown_statements() {
    let engine = MemoryEngine::new();
    let client = Client::new(engine.clone());

    let err = client.execute("OPTIMIZE TABLE t FINAL").await.unwrap_err();
    assert!(matches!(err, ClientError::Unsupported(_)));

    let err = client.execute("SYSTEM FLUSH LOGS;").await.unwrap_err();
    assert!(matches!(err, ClientError::Unsupported(_)));

    assert_eq!(
        engine.statements(),
        vec![
            "OPTIMIZE TABLE t FINAL".to_owned(),
            "SYSTEM FLUSH LOGS".to_owned()
        ]
    );
}

#[tokio::test]
async fn insert_into_missing_table() {
    let client = Client::new(MemoryEngine::new());

    client.insert("missing", Vec::new()).await.unwrap();

    let err = client
        .insert("missing", vec![row(json!({ "id": 1 }))])
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::UnknownTable(name) if name == "missing"));
}

#[tokio::test]
async fn insert_fills_column_defaults() {
    let engine = MemoryEngine::new();
    let client = Client::new(engine.clone());

    client
        .execute(
            "CREATE TABLE t (id UInt64, state LowCardinality(String) DEFAULT 'new', retries UInt8 NOT NULL DEFAULT 0, seen_at DateTime64(6, 'UTC') DEFAULT now64()) ENGINE = MergeTree ORDER BY id",
        )
        .await
        .unwrap();

    client
        .insert(
            "t",
            vec![
                row(json!({ "id": 1 })),
                row(json!({ "id": 2, "state": "done", "retries": 3 })),
            ],
        )
        .await
        .unwrap();

    let rows = client
        .select("SELECT id, state, retries FROM t")
        .await
        .unwrap();

    assert_eq!(
        rows,
        vec![
            row(json!({ "id": 1, "state": "new", "retries": 0 })),
            row(json!({ "id": 2, "state": "done", "retries": 3 })),
        ]
    );
    assert!(engine
        .rows("t")
        .iter()
        .all(|row| matches!(row.get("seen_at"), Some(serde_json::Value::String(_)))));

    client
        .execute("ALTER TABLE t ADD COLUMN token String DEFAULT generateUUIDv4()")
        .await
        .unwrap();

    let err = client
        .insert("t", vec![row(json!({ "id": 3 }))])
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Unsupported(_)));
    assert_eq!(engine.rows("t").len(), 2);
}

#[tokio::test]
async fn select_orders_rows() {
    let client = Client::new(MemoryEngine::new());

    client
        .execute("CREATE TABLE t (id UInt64, at String) ENGINE = MergeTree ORDER BY id")
        .await
        .unwrap();

    client
        .insert(
            "t",
            vec![
                row(json!({ "id": 1, "at": "2024-01-01 00:00:05" })),
                row(json!({ "id": 2, "at": "2024-01-01 00:00:01" })),
                row(json!({ "id": 3, "at": "2024-01-01 00:00:05" })),
                row(json!({ "id": 4 })),
            ],
        )
        .await
        .unwrap();

    let ids = |rows: Vec<Row>| {
        rows.iter()
            .map(|row| row["id"].as_u64().unwrap())
            .collect::<Vec<_>>()
    };

    assert_eq!(
        ids(client.select("SELECT id FROM t ORDER BY at").await.unwrap()),
        vec![4, 2, 1, 3]
    );
    assert_eq!(
        ids(client
            .select("SELECT id FROM t ORDER BY at DESC, id DESC;")
            .await
            .unwrap()),
        vec![3, 1, 2, 4]
    );
    assert!(matches!(
        client.select("SELECT id FROM t ORDER BY at WITH FILL").await,
        Err(ClientError::Unsupported(_))
    ));
}
