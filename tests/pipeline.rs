//! UDP pipeline integration tests
//!
//! Runs a real gateway on 127.0.0.1 and drives it with `UdpClient`.

use std::sync::Arc;
use std::time::Duration;

use pgwd::blacklist::Blacklist;
use pgwd::bootstrap::{Gateway, GatewayConfig, LifecycleState};
use pgwd::cdr::{self, CdrAction, CdrWriter, MemoryCdrWriter};
use pgwd::client::{ClientError, UdpClient};
use pgwd::session::SessionRegistry;

const BLACKLISTED: &str = "001010111111111";
const IMSI_A: &str = "250991234567890";
const IMSI_B: &str = "250991234567891";

/// Test fixture running a gateway with an in-memory CDR sink
struct TestGateway {
    gateway: Arc<Gateway>,
    cdrs: Arc<MemoryCdrWriter>,
    addr: std::net::SocketAddr,
}

impl TestGateway {
    async fn start(config: GatewayConfig) -> Self {
        let cdrs = Arc::new(MemoryCdrWriter::new("memory", 10_000));
        let (cdr, _task) = cdr::start(vec![cdrs.clone() as Arc<dyn CdrWriter>]);

        let blacklist = Arc::new(Blacklist::from_entries([BLACKLISTED], None));
        let registry = SessionRegistry::new(cdr.clone());
        let gateway = Arc::new(Gateway::new(config, blacklist, registry, cdr));
        let addr = gateway.start().await.unwrap();

        Self {
            gateway,
            cdrs,
            addr,
        }
    }

    async fn client(&self) -> UdpClient {
        UdpClient::connect(self.addr)
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(2))
    }

    /// Wait until at least `n` records with `action` reached the sink
    async fn wait_for_cdrs(&self, action: CdrAction, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.cdrs.count_action(&action) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {n} {action} CDRs"));
    }
}

fn config() -> GatewayConfig {
    GatewayConfig {
        address: "127.0.0.1:0".parse().unwrap(),
        queue_capacity: 64,
        ..GatewayConfig::default()
    }
}

#[tokio::test]
async fn test_attach_verdicts() {
    let server = TestGateway::start(config()).await;
    let client = server.client().await;

    assert_eq!(client.attach(IMSI_A).await.unwrap(), "created");
    assert_eq!(client.attach(IMSI_A).await.unwrap(), "exists");
    assert_eq!(client.attach(IMSI_B).await.unwrap(), "created");
    assert_eq!(client.attach(BLACKLISTED).await.unwrap(), "rejected");

    client.send_raw(&[0xAB, 0xCD, 0xEF]).await.unwrap();
    assert_eq!(client.receive().await.unwrap(), "invalid");

    assert_eq!(server.gateway.registry().count(), 2);
    assert!(!server.gateway.registry().exists(BLACKLISTED));

    server.wait_for_cdrs(CdrAction::Rejected, 1).await;
    server.wait_for_cdrs(CdrAction::Created, 2).await;
    assert_eq!(server.cdrs.by_imsi(IMSI_A).len(), 1);

    server.gateway.stop().await;
}

#[tokio::test]
async fn test_empty_datagram_discarded() {
    let server = TestGateway::start(config()).await;
    let client = server.client().await.with_timeout(Duration::from_millis(100));

    client.send_raw(&[]).await.unwrap();
    assert!(matches!(client.receive().await, Err(ClientError::Timeout(_))));

    let client = client.with_timeout(Duration::from_secs(2));
    assert_eq!(client.attach(IMSI_A).await.unwrap(), "created");

    server.gateway.stop().await;
}

#[tokio::test]
async fn test_concurrent_attaches_create_once() {
    let server = TestGateway::start(config()).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let client = server.client().await;
        handles.push(tokio::spawn(async move { client.attach(IMSI_A).await.unwrap() }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap().as_str() {
            "created" => created += 1,
            "exists" => {}
            other => panic!("unexpected verdict {other}"),
        }
    }

    assert_eq!(created, 1);
    server.wait_for_cdrs(CdrAction::Created, 1).await;
    assert_eq!(server.cdrs.count_action(&CdrAction::Created), 1);

    server.gateway.stop().await;
}

#[tokio::test]
async fn test_sessions_expire_after_ttl() {
    let server = TestGateway::start(GatewayConfig {
        session_ttl: Duration::from_millis(50),
        sweep_interval: Duration::from_millis(10),
        ..config()
    })
    .await;
    let client = server.client().await;

    assert_eq!(client.attach(IMSI_A).await.unwrap(), "created");
    server.wait_for_cdrs(CdrAction::Timeout, 1).await;
    assert!(!server.gateway.registry().exists(IMSI_A));

    assert_eq!(client.attach(IMSI_A).await.unwrap(), "created");

    let history: Vec<CdrAction> = server
        .cdrs
        .by_imsi(IMSI_A)
        .into_iter()
        .map(|c| c.action)
        .collect();
    assert_eq!(history[..2], [CdrAction::Created, CdrAction::Timeout]);

    server.gateway.stop().await;
}

#[tokio::test]
async fn test_graceful_drain_offloads_every_session() {
    let server = TestGateway::start(GatewayConfig {
        drain_rate: 2,
        drain_interval: Duration::from_millis(20),
        ..config()
    })
    .await;
    let client = server.client().await;

    for i in 0..5 {
        let imsi = format!("25099000000000{i}");
        assert_eq!(client.attach(&imsi).await.unwrap(), "created");
    }

    let started = std::time::Instant::now();
    server.gateway.initiate_graceful_shutdown();
    assert_eq!(server.gateway.state(), LifecycleState::Draining);

    tokio::time::timeout(Duration::from_secs(5), server.gateway.wait_drained())
        .await
        .unwrap();

    // 5 sessions at 2 per batch: three paced batches plus the empty one
    assert!(started.elapsed() >= Duration::from_millis(3 * 20));
    assert!(server.gateway.registry().is_empty());
    server.wait_for_cdrs(CdrAction::Offload, 5).await;
    assert_eq!(server.cdrs.count_action(&CdrAction::Offload), 5);

    server.gateway.stop().await;
    assert_eq!(server.gateway.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let server = TestGateway::start(config()).await;
    server.gateway.stop().await;

    let addr = server.gateway.start().await.unwrap();
    let client = UdpClient::connect(addr).await.unwrap();
    assert_eq!(client.attach(IMSI_B).await.unwrap(), "created");

    server.gateway.stop().await;
}
