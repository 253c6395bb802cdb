//! Full scan cycles over a mixed fleet.

mod common;

use std::sync::Arc;

use common::{alarm, config, event, host, FakeConnector, Fleet};
use vmware_aiops::model::{IssueSource, Severity};
use vmware_aiops::AppContext;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn busy_fleet() -> Fleet {
    Fleet::default().with(|s| {
        s.alarms = vec![
            alarm("Host CPU usage", "esx-01", "red", false),
            alarm("Datastore usage", "esx-01", "yellow", true),
        ];
        s.events = vec![
            event("HostConnectionLostEvent", "esx-01"),
            event("VmPoweredOnEvent", "web-01"),
        ];
        s.hosts = vec![host("esx-01")];
        s.logs.insert(
            ("esx-01".into(), "hostd".into()),
            vec![
                "2026-10-19T10:00:00Z info hostd: heartbeat ok".into(),
                "2026-10-19T10:00:01Z ERROR lost access to volume ds-01".into(),
                "2026-10-19T10:00:02Z kernel panic in vmkernel worker".into(),
            ],
        );
    })
}

async fn context(dir: &std::path::Path, webhook: Option<String>) -> AppContext {
    let mut cfg = config(&["sc-alpha", "sc-beta", "sc-gamma"], dir);
    if let Some(url) = webhook {
        cfg.notify.webhook_url = url;
    }
    let connector = FakeConnector::new()
        .with_fleet("sc-alpha", busy_fleet())
        .unreachable("sc-beta");
    AppContext::new(cfg, Arc::new(connector)).await.unwrap()
}

#[tokio::test]
async fn test_unreachable_target_does_not_abort_cycle() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = context(dir.path(), None).await;

    let report = ctx.orchestrator().await.unwrap().run_cycle().await;

    assert_eq!(report.targets_scanned, 2);
    assert_eq!(report.targets_failed, vec!["sc-beta".to_string()]);

    let connection: Vec<_> = report
        .issues
        .iter()
        .filter(|i| i.source == IssueSource::Connection)
        .collect();
    assert_eq!(connection.len(), 1);
    assert_eq!(connection[0].entity, "sc-beta");
    assert_eq!(connection[0].severity, Severity::Critical);
    assert!(connection[0].message.contains("connection refused"));

    // alarm + critical event + two log lines + connection failure
    assert_eq!(report.issues.len(), 5);
    assert_eq!(report.count(Severity::Critical), 4);
    assert_eq!(report.count(Severity::Warning), 1);
    assert!(!report.notified);

    let logged = std::fs::read_to_string(dir.path().join("scan.log")).unwrap();
    assert_eq!(logged.lines().count(), 5);
    for line in logged.lines() {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(v["timestamp"].is_string());
        assert!(v["severity"].is_string());
    }
}

#[tokio::test]
async fn test_acknowledged_alarm_and_info_event_are_not_issues() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = context(dir.path(), None).await;

    let report = ctx
        .orchestrator()
        .await
        .unwrap()
        .run_for(&["sc-alpha".to_string()])
        .await;

    assert!(report
        .issues
        .iter()
        .all(|i| !i.message.contains("Datastore usage")));
    assert!(report
        .issues
        .iter()
        .all(|i| i.event_type.as_deref() != Some("VmPoweredOnEvent")));
    let host_log = report
        .issues
        .iter()
        .filter(|i| i.source == IssueSource::HostLog("hostd".into()))
        .count();
    assert_eq!(host_log, 2);
}

#[tokio::test]
async fn test_significant_issues_reach_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let ctx = context(dir.path(), Some(format!("{}/hook", server.uri()))).await;
    let report = ctx.orchestrator().await.unwrap().run_cycle().await;
    assert!(report.notified);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["source"], "vmware-aiops");
    assert_eq!(body["summary"], "VMware AIops: 4 critical, 1 warning issue(s)");
    assert_eq!(body["issues"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_sessions_are_reused_across_cycles() {
    let dir = tempfile::TempDir::new().unwrap();
    let cfg = config(&["sc-reuse"], dir.path());
    let connector = Arc::new(FakeConnector::new());
    let ctx = AppContext::new(cfg, connector.clone()).await.unwrap();
    let orchestrator = ctx.orchestrator().await.unwrap();

    orchestrator.run_cycle().await;
    orchestrator.run_cycle().await;
    assert_eq!(connector.connects(), 1);
}
