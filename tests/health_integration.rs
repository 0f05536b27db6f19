//! Integration tests for the quarantine health scheduler.

mod common;

use common::{make_config, make_keys, make_pool_from, StaticProber};
use keypool::health::HealthCheckConfig;
use keypool::registry::{CredentialStatus, FailureKind};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn quarantine_all(pool: &keypool::pool::KeyPool, keys: &[String]) {
    for key in keys {
        for _ in 0..3 {
            pool.record_failure(key, FailureKind::ServerError).unwrap();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_recovers_healthy_credentials() {
    let keys = make_keys(3);
    let (pool, _clock) = make_pool_from(&make_config(&keys, 5, 100));
    quarantine_all(&pool, &keys);

    let prober = StaticProber::new([keys[0].clone(), keys[2].clone()]);
    let cancel = CancellationToken::new();
    let handle = pool
        .start_scheduler(prober.clone(), cancel.clone())
        .expect("scheduler enabled by default");

    sleep(Duration::from_secs(3600 + 1)).await;

    let snapshot = pool.status_snapshot();
    assert_eq!(snapshot.quarantined, vec![keys[1].clone()]);
    assert_eq!(snapshot.active.len(), 2);
    assert_eq!(prober.calls(), 3);

    // next cycle probes only the one still quarantined
    sleep(Duration::from_secs(3600)).await;
    assert_eq!(prober.calls(), 4);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_never_probes_active_credentials() {
    let keys = make_keys(2);
    let (pool, _clock) = make_pool_from(&make_config(&keys, 5, 100));

    let prober = StaticProber::new(keys.clone());
    let cancel = CancellationToken::new();
    let handle = pool.start_scheduler(prober.clone(), cancel.clone()).unwrap();

    sleep(Duration::from_secs(3 * 3600 + 1)).await;
    assert_eq!(prober.calls(), 0);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_disabled_scheduler_does_not_start() {
    let keys = make_keys(1);
    let mut config = make_config(&keys, 5, 100);
    config.health_check = HealthCheckConfig {
        enabled: false,
        ..Default::default()
    };
    let (pool, _clock) = make_pool_from(&config);

    assert!(pool
        .start_scheduler(StaticProber::new(Vec::<String>::new()), CancellationToken::new())
        .is_none());
}

#[tokio::test]
async fn test_verify_many_mixed_pool() {
    let keys = make_keys(3);
    let (pool, _clock) = make_pool_from(&make_config(&keys, 5, 100));
    quarantine_all(&pool, &keys[..1]);

    let prober = StaticProber::new([keys[0].clone(), keys[1].clone()]);
    let report = pool.verify_many(prober, keys.clone()).await;

    assert_eq!(report.successful, vec![keys[0].clone(), keys[1].clone()]);
    assert_eq!(report.invalid_count(), 1);
    assert!(report.failed[&keys[2]].contains("HTTP 401"));
    assert_eq!(
        pool.credential_view(&keys[0]).unwrap().status,
        CredentialStatus::Active
    );
}

#[tokio::test]
async fn test_credential_deleted_before_probe_is_tolerated() {
    let keys = make_keys(2);
    let (pool, _clock) = make_pool_from(&make_config(&keys, 5, 100));
    quarantine_all(&pool, &keys);

    let scheduler = pool.health_scheduler(StaticProber::new(keys.clone()));
    pool.delete_credential(&keys[0]).unwrap();

    let reports = scheduler.check_quarantined().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].promoted);
    assert!(pool.status_snapshot().quarantined.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_check_history_shared_between_verify_and_scheduler() {
    let keys = make_keys(1);
    let (pool, _clock) = make_pool_from(&make_config(&keys, 5, 100));
    quarantine_all(&pool, &keys);

    let prober = StaticProber::new(Vec::<String>::new());
    let result = pool.verify(prober.clone(), &keys[0]).await.unwrap();
    assert!(result.is_err());
    assert_eq!(pool.probe_state(&keys[0]).unwrap().consecutive_failed_probes, 1);

    let cancel = CancellationToken::new();
    let handle = pool.start_scheduler(prober.clone(), cancel.clone()).unwrap();
    sleep(Duration::from_secs(3600 + 1)).await;

    // the scheduler builds on the failure recorded by verify
    assert_eq!(pool.probe_state(&keys[0]).unwrap().consecutive_failed_probes, 2);

    cancel.cancel();
    handle.await.unwrap();

    pool.delete_credential(&keys[0]).unwrap();
    assert!(pool.probe_state(&keys[0]).is_none());
}

#[tokio::test]
async fn test_checks_use_configured_test_model() {
    let keys = make_keys(2);
    let mut config = make_config(&keys, 5, 100);
    config.health_check.test_model = "gemini-2.0-flash-lite".to_string();
    let (pool, _clock) = make_pool_from(&config);
    quarantine_all(&pool, &keys[..1]);

    let prober = StaticProber::new(keys.clone());
    pool.health_scheduler(prober.clone()).check_quarantined().await;
    pool.verify(prober.clone(), &keys[1]).await.unwrap().unwrap();

    assert_eq!(
        prober.models(),
        vec!["gemini-2.0-flash-lite", "gemini-2.0-flash-lite"]
    );
}
