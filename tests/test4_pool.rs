use std::sync::Arc;
use std::time::Duration;

use mysql_middleware::prelude::*;
use mysql_middleware::test_utils::{MockConnector, init_test_logging};

fn pool(mock: &MockConnector, max_size: usize) -> Result<MiddlewarePool, SqlMiddlewareDbError> {
    let config = ConnectionConfig::builder("db.test", "app", "shop")
        .password("secret")
        .build()?;
    let options = PoolOptions::new(max_size)?.with_acquire_timeout(Duration::from_secs(5));
    MiddlewarePool::new(config, Arc::new(mock.clone()), options)
}

#[tokio::test]
async fn pool_opens_lazily() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let pool = pool(&mock, 3)?;

    let status = pool.status();
    assert_eq!(status.capacity, 3);
    assert_eq!(status.open, 0);
    assert_eq!(mock.opened(), 0);
    Ok(())
}

#[tokio::test]
async fn acquire_blocks_at_capacity_until_release() -> Result<(), SqlMiddlewareDbError> {
    init_test_logging();
    let mock = MockConnector::new();
    let pool = pool(&mock, 2)?;

    let first = pool.acquire().await?;
    let second = pool.acquire().await?;
    assert_ne!(first.id(), second.id());
    assert_eq!(pool.status().leased, 2);

    assert!(matches!(
        pool.acquire_timeout(Duration::from_millis(100)).await,
        Err(SqlMiddlewareDbError::PoolExhausted(_))
    ));

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert_eq!(pool.status().waiting, 1);

    let first_id = first.id();
    pool.release(first, true).await;

    let third = waiter
        .await
        .map_err(|e| SqlMiddlewareDbError::Other(e.to_string()))??;
    assert_eq!(third.id(), first_id);
    assert_eq!(mock.opened(), 2);

    pool.release(second, true).await;
    pool.release(third, true).await;
    let status = pool.status();
    assert_eq!(status.open, 2);
    assert_eq!(status.idle, 2);
    assert_eq!(status.evicted, 0);
    Ok(())
}

#[tokio::test]
async fn release_inside_transaction_evicts() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let pool = pool(&mock, 1)?;

    let mut lease = pool.acquire().await?;
    lease.begin_transaction().await?;
    let tainted = lease.id();
    pool.release(lease, true).await;

    assert_eq!(pool.status().evicted, 1);
    assert_eq!(mock.statements_for(1), vec!["START TRANSACTION", "ROLLBACK"]);
    assert_eq!(mock.closed(), 1);

    let fresh = pool.acquire().await?;
    assert_ne!(fresh.id(), tainted);
    assert_eq!(fresh.state(), ConnectionState::Connected);
    assert_eq!(mock.opened(), 2);
    Ok(())
}

#[tokio::test]
async fn eviction_keeps_the_slot_until_the_session_is_closed() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    mock.delay("ROLLBACK", Duration::from_millis(300));
    let pool = pool(&mock, 1)?;

    let mut lease = pool.acquire().await?;
    lease.begin_transaction().await?;
    let releasing = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.release(lease, true).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(
        pool.acquire_timeout(Duration::from_millis(100)).await,
        Err(SqlMiddlewareDbError::PoolExhausted(_))
    ));
    assert_eq!(mock.opened(), 1);

    releasing
        .await
        .map_err(|e| SqlMiddlewareDbError::Other(e.to_string()))?;
    assert_eq!(mock.live(), 0);

    let fresh = pool.acquire().await?;
    assert!(fresh.is_connected());
    assert_eq!(mock.opened(), 2);
    assert_eq!(mock.peak_live(), 1);
    assert_eq!(pool.status().evicted, 1);
    Ok(())
}

#[tokio::test]
async fn unhealthy_release_evicts() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let pool = pool(&mock, 1)?;

    let lease = pool.acquire().await?;
    let first = lease.id();
    pool.release(lease, false).await;
    assert_eq!(pool.status().evicted, 1);
    assert_eq!(pool.status().open, 0);

    let lease = pool.acquire().await?;
    assert_ne!(lease.id(), first);
    assert_eq!(mock.opened(), 2);
    Ok(())
}

#[tokio::test]
async fn dropped_lease_in_transaction_is_not_reused() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let pool = pool(&mock, 1)?;

    let mut lease = pool.acquire().await?;
    lease.begin_transaction().await?;
    let tainted = lease.id();
    drop(lease);

    let lease = pool.acquire().await?;
    assert_ne!(lease.id(), tainted);
    assert_eq!(lease.state(), ConnectionState::Connected);
    assert_eq!(pool.status().evicted, 1);
    Ok(())
}

#[tokio::test]
async fn connect_failure_surfaces_through_acquire() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    mock.fail_connect("Access denied for user 'app'@'%'");
    let pool = pool(&mock, 2)?;

    assert!(matches!(
        pool.acquire().await,
        Err(SqlMiddlewareDbError::ConnectError(ref msg)) if msg.contains("Access denied")
    ));
    assert_eq!(pool.status().open, 0);

    mock.restore();
    let lease = pool.acquire().await?;
    assert!(lease.is_connected());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_a_bounded_pool() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let pool = pool(&mock, 2)?;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let mut lease = pool.acquire().await?;
            let sql = format!("SELECT {i}");
            let result = lease.execute_query(&sql).await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
            pool.release(lease, result.is_success()).await;
            Ok::<_, SqlMiddlewareDbError>(())
        }));
    }
    for task in tasks {
        task.await
            .map_err(|e| SqlMiddlewareDbError::Other(e.to_string()))??;
    }

    assert!(mock.opened() <= 2);
    assert_eq!(mock.statements().len(), 8);
    assert_eq!(pool.status().evicted, 0);
    Ok(())
}

#[tokio::test]
async fn closed_pool_refuses_new_leases() -> Result<(), SqlMiddlewareDbError> {
    let mock = MockConnector::new();
    let pool = pool(&mock, 1)?;
    pool.close();
    assert!(pool.is_closed());
    assert!(matches!(
        pool.acquire().await,
        Err(SqlMiddlewareDbError::PoolExhausted(_))
    ));
    Ok(())
}

#[test]
fn zero_capacity_is_rejected() {
    assert!(matches!(
        PoolOptions::new(0),
        Err(SqlMiddlewareDbError::ConfigError(_))
    ));
}
