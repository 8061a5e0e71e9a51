use std::sync::Arc;
use std::time::Duration;

use mysql_middleware::FailureKind;
use mysql_middleware::prelude::*;
use mysql_middleware::test_utils::{MockConnector, MockResponse, init_test_logging, text_column};

async fn connected(mock: &MockConnector) -> Result<Connection, SqlMiddlewareDbError> {
    let config = ConnectionConfig::builder("db.test", "app", "shop").build()?;
    Connection::open(Arc::new(config), Arc::new(mock.clone())).await
}

#[tokio::test]
async fn loss_mid_result_discards_partial_rows() -> Result<(), SqlMiddlewareDbError> {
    init_test_logging();
    let mock = MockConnector::new();
    mock.on(
        "SELECT name FROM big_table",
        MockResponse::DropMidRows {
            columns: vec![text_column("name")],
            rows: vec![vec![Some(b"a".to_vec())], vec![Some(b"b".to_vec())]],
        },
    );
    let mut conn = connected(&mock).await?;

    let result = conn.execute_query("SELECT name FROM big_table").await?;
    assert!(!result.is_success());
    assert!(result.rows().is_empty());
    assert_eq!(result.failure().map(|f| &f.kind), Some(&FailureKind::Drain));
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    // No implicit reconnect.
    assert!(matches!(
        conn.execute_query("SELECT 1").await,
        Err(SqlMiddlewareDbError::NotConnected(_))
    ));
    assert_eq!(mock.opened(), 1);

    conn.connect().await?;
    let result = conn.execute_query("SELECT 1").await?;
    assert!(result.is_success());
    assert_eq!(mock.opened(), 2);
    Ok(())
}

#[tokio::test]
async fn severed_network_fails_the_statement_and_disconnects() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let mut conn = connected(&mock).await?;

    mock.sever();
    let result = conn
        .execute_statement("UPDATE stock SET qty = 0")
        .await?;
    assert_eq!(
        result.failure().map(|f| &f.kind),
        Some(&FailureKind::ConnectionLost)
    );
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    assert!(matches!(
        conn.connect().await,
        Err(SqlMiddlewareDbError::ConnectError(_))
    ));

    mock.restore();
    conn.connect().await?;
    assert!(conn.execute_statement("UPDATE stock SET qty = 0").await?.is_success());
    Ok(())
}

#[tokio::test]
async fn loss_inside_transaction_ends_it() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    mock.on("DELETE FROM orders", MockResponse::DropConnection);
    let mut conn = connected(&mock).await?;

    conn.begin_transaction().await?;
    let result = conn.execute_statement("DELETE FROM orders").await?;
    assert!(!result.is_success());
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(!conn.in_transaction());

    assert!(matches!(
        conn.commit_transaction().await,
        Err(SqlMiddlewareDbError::NotConnected(_))
    ));
    assert!(matches!(
        result.into_checked(),
        Err(SqlMiddlewareDbError::ConnectionLost(_))
    ));
    Ok(())
}

#[tokio::test]
async fn lost_commit_reports_connection_lost() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    mock.on("COMMIT", MockResponse::DropConnection);
    let mut conn = connected(&mock).await?;

    conn.begin_transaction().await?;
    assert!(matches!(
        conn.commit_transaction().await,
        Err(SqlMiddlewareDbError::ConnectionLost(_))
    ));
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(mock.statements(), vec!["START TRANSACTION", "COMMIT"]);
    Ok(())
}

#[tokio::test]
async fn ping_detects_a_dead_link() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let mut conn = connected(&mock).await?;
    conn.ping().await?;

    mock.sever();
    assert!(matches!(
        conn.ping().await,
        Err(SqlMiddlewareDbError::ConnectionLost(_))
    ));
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn pool_replaces_a_connection_that_lost_its_link() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let config = ConnectionConfig::builder("db.test", "app", "shop").build()?;
    let pool = MiddlewarePool::new(
        config,
        Arc::new(mock.clone()),
        PoolOptions::new(1)?.with_acquire_timeout(Duration::from_secs(2)),
    )?;

    let mut lease = pool.acquire().await?;
    mock.sever();
    let result = lease.execute_query("SELECT 1").await?;
    assert!(!result.is_success());
    mock.restore();
    pool.release(lease, result.is_success()).await;

    let mut lease = pool.acquire().await?;
    assert!(lease.execute_query("SELECT 1").await?.is_success());
    assert_eq!(mock.opened(), 2);
    assert_eq!(pool.status().evicted, 1);
    Ok(())
}
