//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use async_trait::async_trait;
use ohsite_core::{
    config::SiteConfig,
    discovery::{Discovery, DiscoveryCandidate, DiscoverySource},
    publish::{CommandOutput, CommandRunner, CommandSpec},
    retry::RetryPolicy,
    SiteError,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Two standards, max id 7, in the on-disk layout the site uses.
#[allow(dead_code)]
pub const CATALOG_FIXTURE: &str = r#"{
  "standards": [
    {
      "id": 1,
      "code": "GBZ 1-2010",
      "title": "工业企业设计卫生标准",
      "fullTitle": "GBZ 1-2010 工业企业设计卫生标准",
      "year": 2010,
      "status": "现行",
      "category": "基础标准",
      "slug": "gbz-1-2010",
      "pdfUrl": "/uploads/standards/gbz-1-2010.pdf"
    },
    {
      "id": 7,
      "code": "GBZ 2.1-2019",
      "title": "工作场所有害因素职业接触限值 第1部分：化学有害因素",
      "year": 2019,
      "status": "现行",
      "category": "基础标准",
      "slug": "gbz-2.1-2019"
    }
  ],
  "categories": ["基础标准"],
  "stats": { "total": 2 },
  "generatedAt": "2026-01-01T00:00:00.000Z"
}
"#;

/// A site checkout in a temp dir: `<tmp>/site` with the catalog fixture, state under
/// `<tmp>/state`.
#[allow(dead_code)]
pub struct TestSite {
    pub temp: TempDir,
    pub config: SiteConfig,
}

#[allow(dead_code)]
impl TestSite {
    pub fn new() -> Self {
        Self::with_catalog(CATALOG_FIXTURE)
    }

    pub fn with_catalog(raw: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("site");
        let mut config = SiteConfig::for_site(&site).with_state_dir(temp.path().join("state"));
        config.publish.push_retry = RetryPolicy::new(2, Duration::ZERO);
        config.publish.restart_timeout = Duration::from_millis(10);
        config.publish.liveness_url = None;
        config.maintain.pages = Vec::new();
        let catalog = config.catalog_path();
        fs::create_dir_all(catalog.parent().unwrap()).unwrap();
        fs::write(&catalog, raw).unwrap();
        TestSite { temp, config }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.config.catalog_path()
    }

    pub fn catalog_bytes(&self) -> Vec<u8> {
        fs::read(self.catalog_path()).unwrap()
    }

    pub fn backups(&self) -> Vec<PathBuf> {
        let dir = self.config.backup_dir();
        if !dir.exists() {
            return Vec::new();
        }
        let mut found: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        found.sort();
        found
    }
}

/// Discovery source answering every query with the same candidates, or failing.
#[allow(dead_code)]
pub struct FakeSource {
    pub candidates: Vec<DiscoveryCandidate>,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DiscoverySource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    fn queries(&self) -> Vec<String> {
        vec!["职业病诊断".to_string()]
    }

    async fn search(&self, _query: &str) -> Result<Vec<DiscoveryCandidate>, SiteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(SiteError::Network("connection reset".to_string()))
        } else {
            Ok(self.candidates.clone())
        }
    }
}

#[allow(dead_code)]
pub fn candidates(pairs: &[(&str, &str)]) -> Vec<DiscoveryCandidate> {
    pairs
        .iter()
        .map(|(code, title)| DiscoveryCandidate::new(*code, *title))
        .collect()
}

#[allow(dead_code)]
pub fn discovery(found: Vec<DiscoveryCandidate>) -> Discovery {
    Discovery::new(
        vec![Box::new(FakeSource {
            candidates: found,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        })],
        RetryPolicy::new(2, Duration::ZERO),
        Duration::ZERO,
    )
}

#[allow(dead_code)]
pub fn failing_discovery(calls: Arc<AtomicUsize>) -> Discovery {
    Discovery::new(
        vec![Box::new(FakeSource {
            candidates: Vec::new(),
            fail: true,
            calls,
        })],
        RetryPolicy::new(3, Duration::ZERO),
        Duration::ZERO,
    )
}

/// A source whose search panics, as a scraper hitting an unexpected page layout would.
#[allow(dead_code)]
pub struct PanickingSource;

#[async_trait]
impl DiscoverySource for PanickingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    fn queries(&self) -> Vec<String> {
        vec!["职业病诊断".to_string()]
    }

    async fn search(&self, _query: &str) -> Result<Vec<DiscoveryCandidate>, SiteError> {
        let rows: Vec<DiscoveryCandidate> = Vec::new();
        Ok(vec![rows[3].clone()])
    }
}

#[allow(dead_code)]
pub fn panicking_discovery() -> Discovery {
    Discovery::new(
        vec![Box::new(PanickingSource)],
        RetryPolicy::new(1, Duration::ZERO),
        Duration::ZERO,
    )
}

/// Records every command; fails those whose rendered line starts with a configured prefix.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingRunner {
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingRunner {
    pub fn failing(prefixes: &[&str]) -> Self {
        RecordingRunner {
            failing: prefixes.iter().map(|p| p.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, _cwd: &Path, spec: &CommandSpec) -> Result<CommandOutput, SiteError> {
        let line = spec.display();
        self.calls.lock().unwrap().push(line.clone());
        let failed = self.failing.iter().any(|p| line.starts_with(p.as_str()));
        Ok(CommandOutput {
            code: Some(if failed { 1 } else { 0 }),
            stdout: String::new(),
            stderr: if failed {
                format!("{} failed", spec.program)
            } else {
                String::new()
            },
        })
    }

    async fn spawn_detached(&self, _cwd: &Path, spec: &CommandSpec) -> Result<(), SiteError> {
        self.calls.lock().unwrap().push(format!("spawn {}", spec.display()));
        Ok(())
    }
}

/// One request as seen by [`serve`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query string.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[allow(dead_code)]
impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> RecordedRequest {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end.min(buf.len())..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}

/// Minimal HTTP/1.1 server on an ephemeral port. `handler` maps each request to a status code
/// and JSON body. Returns the base URL and the log of requests received.
#[allow(dead_code)]
pub async fn serve<F>(handler: F) -> (String, Arc<Mutex<Vec<RecordedRequest>>>)
where
    F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
{
    use tokio::io::AsyncWriteExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let request = read_request(&mut stream).await;
            let (status, body) = handler(&request);
            seen.lock().unwrap().push(request);
            let response = format!(
                "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.ok();
            stream.shutdown().await.ok();
        }
    });
    (format!("http://{addr}"), log)
}
