use mock_service::MockConfig;
use std::future::IntoFuture;
use std::net::TcpListener;
use std::time::{Duration, Instant};
use throng::core::{ConfigError, ThinkTime};
use throng::pool::PoolState;
use throng::prelude::*;
use throng::scenario::{ADD, GET, LAST_TIMESTAMP};
use throng::{Method, RequestStep, StatusCode};
use throng_tests::{mock, quick_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn ramps_five_users_against_a_healthy_backend() {
    let mock = mock(MockConfig::default()).await;
    let config = RunConfig::new(&mock.url())
        .users(5)
        .ramp_rate(1.)
        .duration(Duration::from_secs(10))
        .think_time(ThinkTime::between(
            Duration::from_millis(100),
            Duration::from_millis(300),
        ))
        .report_interval(Duration::from_secs(2));

    let run = Run::new(config);
    let monitor = run.monitor();
    let started = Instant::now();
    let handle = tokio::spawn(run.into_future());

    let steady = tokio::time::timeout(Duration::from_millis(5_500), async {
        while monitor.running_users() < 5 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(steady.is_ok(), "5 users not running after {:?}", started.elapsed());
    assert_eq!(monitor.state(), PoolState::Steady);

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(monitor.peak_users(), 5);
    assert_eq!(monitor.state(), PoolState::Stopped);
    assert!(stats.elapsed >= Duration::from_secs(10));

    assert_eq!(stats.aggregated.failures, 0);
    let ts = stats.successes(LAST_TIMESTAMP);
    let add = stats.successes(ADD);
    let get = stats.successes(GET);
    assert!(ts >= add && add >= get, "{ts} {add} {get}");
    assert!(ts - get <= 5, "{ts} {get}");

    assert_eq!(mock.hits("/lasttimestamp"), ts);
    assert_eq!(mock.hits("/add"), add);
    assert_eq!(mock.hits("/get"), get);
    assert!(mock.total() >= add && mock.total() <= add * 5);

    println!("{stats}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn failing_add_is_contained() {
    let mock = mock(MockConfig::default().failing("/add")).await;
    let stats = run(quick_config(&mock.url())).await.unwrap();

    assert!(stats.failures(ADD) > 0);
    assert_eq!(stats.successes(ADD), 0);
    assert_eq!(stats.failures(LAST_TIMESTAMP), 0);
    assert_eq!(stats.failures(GET), 0);
    assert!(stats.successes(GET) > 0);

    let add = stats.get(ADD).unwrap();
    assert_eq!(add.failure_causes.get("status 500"), Some(&add.failures));
    assert_eq!(mock.total(), 0);

    let report = stats.to_string();
    assert!(report.contains("status 500"), "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn external_shutdown_stops_the_run() {
    let mock = mock(MockConfig::default()).await;
    let config = quick_config(&mock.url()).duration(Duration::from_secs(3600));

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let run = Run::new(config).shutdown_on(async move {
        let _ = rx.await;
    });
    let monitor = run.monitor();
    let handle = tokio::spawn(run.into_future());

    monitor.wait_for(PoolState::Steady).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(()).unwrap();

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(monitor.state(), PoolState::Stopped);
    assert_eq!(monitor.running_users(), 0);
    assert!(stats.total() > 0);
    assert_eq!(stats.aggregated.failures, 0);
    assert_eq!(
        mock.hits("/lasttimestamp") + mock.hits("/add") + mock.hits("/get"),
        stats.total()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn unreachable_host_counts_connection_errors() {
    throng_tests::init();
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let config = quick_config(&format!("http://{addr}")).users(2);
    let stats = run(config).await.unwrap();

    assert!(stats.total() > 0);
    assert_eq!(stats.aggregated.successes, 0);
    assert!(stats.failures(GET) <= stats.failures(ADD));
    let ts = stats.get(LAST_TIMESTAMP).unwrap();
    assert_eq!(ts.failure_causes.get("connection error"), Some(&ts.failures));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn slow_backend_times_out() {
    let mock = mock(MockConfig::default().delay(Duration::from_millis(500))).await;
    let config = quick_config(&mock.url())
        .users(1)
        .timeout(Duration::from_millis(100));

    let stats = run(config).await.unwrap();

    assert_eq!(stats.aggregated.successes, 0);
    let ts = stats.get(LAST_TIMESTAMP).unwrap();
    assert!(ts.failures > 0);
    assert_eq!(ts.failure_causes.get("timeout"), Some(&ts.failures));
    assert!(ts.latency.max < Duration::from_millis(400));
}

#[tokio::test]
async fn zero_users_is_rejected_before_any_request() {
    let mock = mock(MockConfig::default()).await;
    let err = run(quick_config(&mock.url()).users(0)).await.unwrap_err();

    assert!(matches!(err, RunError::Config(ConfigError::NoUsers)));
    assert_eq!(
        mock.hits("/lasttimestamp") + mock.hits("/add") + mock.hits("/get"),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn steps_succeed_on_their_expected_status() {
    let mock = mock(
        MockConfig::default()
            .failing("/lasttimestamp")
            .failure_status(mock_service::StatusCode::SERVICE_UNAVAILABLE),
    )
    .await;
    let scenario = Scenario::new(
        "expectations",
        vec![
            RequestStep::new("unavailable", Method::GET, "/lasttimestamp")
                .expect(StatusCode::SERVICE_UNAVAILABLE),
            RequestStep::new("created", Method::GET, "/get").expect(StatusCode::CREATED),
        ],
    );

    let stats = Run::new(quick_config(&mock.url()))
        .scenario(scenario)
        .await
        .unwrap();

    let unavailable = stats.get("unavailable").unwrap();
    assert!(unavailable.successes > 0);
    assert_eq!(unavailable.failures, 0);
    assert_eq!(mock.hits("/lasttimestamp"), unavailable.successes);

    let created = stats.get("created").unwrap();
    assert!(created.failures > 0);
    assert_eq!(created.successes, 0);
    assert_eq!(created.failure_causes.get("status 200"), Some(&created.failures));
}
