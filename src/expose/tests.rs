use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;
use crate::core::{PortConfig, PreviewConfig, TlsConfig};
use crate::server::PortAllocator;
use crate::tls::CertificateProvider;

/// Domain with an explicit port 0 so each test binds an ephemeral port
const DOMAIN: &str = "preview.test:0";
const HOSTNAME: &str = "preview.test";

struct Fixture {
    _dir: TempDir,
    root: std::path::PathBuf,
    hosts_file: std::path::PathBuf,
    certificates: Arc<CertificateProvider>,
    controller: ExposeController,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("site");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("index.html"), "<h1>exposed</h1>").unwrap();

    let hosts_file = dir.path().join("hosts");
    std::fs::write(&hosts_file, "127.0.0.1\tlocalhost\n").unwrap();

    let mut config = PreviewConfig::default();
    config.hosts.hosts_file = hosts_file.clone();

    let ports = Arc::new(PortAllocator::new(PortConfig::default()));
    let certificates = Arc::new(CertificateProvider::new(TlsConfig::default()));
    let controller = ExposeController::new(&config, ports, Arc::clone(&certificates));

    Fixture {
        _dir: dir,
        root,
        hosts_file,
        certificates,
        controller,
    }
}

fn hosts_contents(fixture: &Fixture) -> String {
    std::fs::read_to_string(&fixture.hosts_file).unwrap()
}

async fn http_get(port: u16) -> std::io::Result<String> {
    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await?;
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: preview.test\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}

async fn wait_for_status(
    controller: &ExposeController,
    predicate: impl FnMut(&ExposeStatus) -> bool,
) -> ExposeStatus {
    let mut rx = controller.subscribe();
    let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("status not reached in time")
        .unwrap()
        .clone();
    status
}

#[tokio::test]
async fn test_starts_idle() {
    let fixture = fixture();
    assert_eq!(fixture.controller.status(), ExposeStatus::Idle);
    assert!(fixture.controller.state().is_none());
    assert!(!fixture.controller.is_expired());
}

#[tokio::test]
async fn test_expose_publishes_host_and_serves() {
    let fixture = fixture();
    let options = ExposeOptions::new(&fixture.root).with_domain(DOMAIN);

    let state = fixture.controller.expose(options).await.unwrap();

    assert!(fixture.controller.hosts().was_auto_added(HOSTNAME));
    assert!(hosts_contents(&fixture).contains(HOSTNAME));

    match fixture.controller.status() {
        ExposeStatus::Ready {
            state: ready,
            public_url,
            expires_at,
        } => {
            assert_eq!(ready, state);
            assert_eq!(public_url, format!("http://{}:{}", HOSTNAME, state.port));
            assert!(expires_at > chrono::Utc::now());
        }
        other => panic!("unexpected status {:?}", other),
    }

    let response = http_get(state.port).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("<h1>exposed</h1>"));

    fixture.controller.unexpose().await;
}

#[tokio::test]
async fn test_expose_twice_returns_existing_state() {
    let fixture = fixture();
    let first = fixture
        .controller
        .expose(ExposeOptions::new(&fixture.root).with_domain(DOMAIN))
        .await
        .unwrap();
    let second = fixture
        .controller
        .expose(ExposeOptions::new(&fixture.root).with_domain("other.test:0"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert!(!fixture.controller.hosts().was_auto_added("other.test"));

    fixture.controller.unexpose().await;
}

#[tokio::test]
async fn test_unexpose_cleans_up_and_is_idempotent() {
    let fixture = fixture();
    let state = fixture
        .controller
        .expose(ExposeOptions::new(&fixture.root).with_domain(DOMAIN))
        .await
        .unwrap();

    fixture.controller.unexpose().await;

    assert_eq!(fixture.controller.status(), ExposeStatus::Stopped);
    assert!(fixture.controller.state().is_none());
    assert!(!fixture.controller.hosts().was_auto_added(HOSTNAME));
    assert_eq!(hosts_contents(&fixture), "127.0.0.1\tlocalhost\n");
    assert!(http_get(state.port).await.is_err());
    assert!(!fixture.controller.is_expired());

    fixture.controller.unexpose().await;
    assert_eq!(fixture.controller.status(), ExposeStatus::Stopped);
}

#[tokio::test]
async fn test_expiry_stops_server_and_removes_host() {
    let fixture = fixture();
    let state = fixture
        .controller
        .expose(
            ExposeOptions::new(&fixture.root)
                .with_domain(DOMAIN)
                .with_duration(Duration::from_millis(150)),
        )
        .await
        .unwrap();

    let status = wait_for_status(&fixture.controller, |s| *s == ExposeStatus::Expired).await;

    assert_eq!(status, ExposeStatus::Expired);
    assert!(fixture.controller.is_expired());
    assert!(!fixture.controller.hosts().was_auto_added(HOSTNAME));
    assert!(!hosts_contents(&fixture).contains(HOSTNAME));
    assert!(http_get(state.port).await.is_err());
}

#[tokio::test]
async fn test_extend_pushes_expiry_back() {
    let fixture = fixture();
    fixture
        .controller
        .expose(
            ExposeOptions::new(&fixture.root)
                .with_domain(DOMAIN)
                .with_duration(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    let extended = fixture.controller.extend(Duration::from_secs(60)).await;
    assert!(extended.is_some());

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(fixture.controller.status().is_ready());
    assert!(!fixture.controller.is_expired());
    match fixture.controller.status() {
        ExposeStatus::Ready { expires_at, .. } => assert_eq!(Some(expires_at), extended),
        other => panic!("unexpected status {:?}", other),
    }

    fixture.controller.unexpose().await;
}

#[tokio::test]
async fn test_extend_without_exposure() {
    let fixture = fixture();
    assert!(fixture.controller.extend(Duration::from_secs(1)).await.is_none());
}

#[tokio::test]
async fn test_failed_expose_rolls_back_hosts() {
    let fixture = fixture();
    let missing = fixture.root.join("does-not-exist");

    let err = fixture
        .controller
        .expose(ExposeOptions::new(missing).with_domain(DOMAIN))
        .await
        .unwrap_err();

    assert_eq!(err.status(), "root-unavailable");
    assert!(matches!(fixture.controller.status(), ExposeStatus::Failed { .. }));
    assert!(!fixture.controller.hosts().was_auto_added(HOSTNAME));
    assert_eq!(hosts_contents(&fixture), "127.0.0.1\tlocalhost\n");
}

#[tokio::test]
async fn test_https_expose_certifies_domain() {
    let fixture = fixture();
    let state = fixture
        .controller
        .expose(
            ExposeOptions::new(&fixture.root)
                .with_https(true)
                .with_domain(DOMAIN),
        )
        .await
        .unwrap();

    assert!(state.use_https);
    assert!(state.url.starts_with("https://127.0.0.1:"));

    let bundle = fixture
        .certificates
        .get_certificate(&["localhost", "127.0.0.1", HOSTNAME])
        .unwrap();
    assert!(bundle.domains.contains(&HOSTNAME.to_string()));
    assert_eq!(fixture.certificates.cached_certificates(), 1);

    fixture.controller.unexpose().await;
}

#[tokio::test]
async fn test_unpublished_domain_advertises_loopback() {
    let fixture = fixture();
    std::fs::remove_file(&fixture.hosts_file).unwrap();

    let state = fixture
        .controller
        .expose(ExposeOptions::new(&fixture.root).with_domain(DOMAIN))
        .await
        .unwrap();

    assert!(!fixture.controller.hosts().was_auto_added(HOSTNAME));
    match fixture.controller.status() {
        ExposeStatus::Ready { public_url, .. } => assert_eq!(public_url, state.url),
        other => panic!("unexpected status {:?}", other),
    }

    fixture.controller.unexpose().await;
}

#[tokio::test]
async fn test_pre_existing_domain_is_advertised() {
    let fixture = fixture();
    std::fs::write(&fixture.hosts_file, "127.0.0.1\tlocalhost preview.test\n").unwrap();

    let state = fixture
        .controller
        .expose(ExposeOptions::new(&fixture.root).with_domain(DOMAIN))
        .await
        .unwrap();

    assert!(!fixture.controller.hosts().was_auto_added(HOSTNAME));
    match fixture.controller.status() {
        ExposeStatus::Ready { public_url, .. } => {
            assert_eq!(public_url, format!("http://{}:{}", HOSTNAME, state.port))
        }
        other => panic!("unexpected status {:?}", other),
    }

    fixture.controller.unexpose().await;
    assert_eq!(hosts_contents(&fixture), "127.0.0.1\tlocalhost preview.test\n");
}
