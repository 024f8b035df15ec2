//! ReelKit smoke harness.
//!
//! Drives the full offline stack (reqwest fetcher, in-memory store, client
//! registry) through a scripted drill against a loopback HTTP server:
//! install, activation sweep, live-traffic caching, offline navigation, and a
//! version upgrade. Exits nonzero if any check fails.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{error, info};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reelkit_common::{init_logging, LogConfig};
use reelkit_net::{HttpFetcher, NetConfig};
use reelkit_sw::{
    CacheStorage, ClientRegistry, FetchDecision, MemoryCacheStorage, OfflineCacheProxy,
    ProxyEvent, ProxyPhase, Request, ShellManifest,
};

const INDEX_HTML: &str =
    "<!doctype html><html><head><title>LogReel Pro</title></head><body></body></html>";
const APP_JS: &str = "console.log('logreel boot');";

/// Pass/fail tally for the drill.
struct Tally {
    passed: usize,
    failed: usize,
}

impl Tally {
    fn new() -> Self {
        Self {
            passed: 0,
            failed: 0,
        }
    }

    fn check(&mut self, name: &str, ok: bool) {
        if ok {
            self.passed += 1;
            info!(check = name, "ok");
        } else {
            self.failed += 1;
            error!(check = name, "FAILED");
        }
    }
}

fn shell_manifest(version: &str) -> ShellManifest {
    ShellManifest {
        app_prefix: "logreelpro".to_string(),
        version: version.to_string(),
        shell_urls: vec![
            "./".to_string(),
            "./index.html".to_string(),
            "./manifest.json".to_string(),
            "./icon-192x192.png".to_string(),
            "./icon-512x512.png".to_string(),
        ],
        fallback_url: "./index.html".to_string(),
        bypass_schemes: vec!["chrome-extension".to_string()],
    }
}

async fn start_shell_server() -> MockServer {
    let server = MockServer::start().await;
    let fixtures = [
        ("/", INDEX_HTML, "text/html"),
        ("/index.html", INDEX_HTML, "text/html"),
        (
            "/manifest.json",
            r#"{"name":"LogReel Pro","display":"standalone"}"#,
            "application/json",
        ),
        ("/icon-192x192.png", "png-192", "image/png"),
        ("/icon-512x512.png", "png-512", "image/png"),
        ("/app.js", APP_JS, "application/javascript"),
    ];
    for (route, body, content_type) in fixtures {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, content_type))
            .mount(&server)
            .await;
    }
    server
}

async fn wait_for_cache_update(events: &mut mpsc::UnboundedReceiver<ProxyEvent>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(event) = events.recv().await {
            if let ProxyEvent::CacheUpdated { key, .. } = event {
                return Some(key);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogConfig::default().with_filter("info,reelkit_sw=debug"));
    let mut tally = Tally::new();

    // v1 rollout against a live loopback server.
    let server = start_shell_server().await;
    let scope = Url::parse(&format!("{}/", server.uri()))?;
    info!(scope = %scope, "loopback shell server up");

    let storage = Arc::new(MemoryCacheStorage::new());
    // A leftover store from a previous deployment, due for the sweep.
    storage.open("logreelpro-cache-0.9.0").await?;

    let clients = Arc::new(ClientRegistry::new());
    clients.connect(scope.clone()).await;
    clients.connect(scope.join("reels")?).await;

    let fetcher = Arc::new(HttpFetcher::new(scope.clone(), NetConfig::default())?);
    let (proxy, mut events) = OfflineCacheProxy::new(
        scope.clone(),
        shell_manifest("1.0.0"),
        storage.clone(),
        fetcher,
        clients.clone(),
    )?;

    proxy.install().await?;
    tally.check(
        "install reaches Installed",
        proxy.phase().await == ProxyPhase::Installed,
    );
    tally.check("install requests skip-waiting", proxy.skip_waiting_requested());
    tally.check(
        "store holds every manifest entry",
        storage.entry_count("logreelpro-cache-1.0.0").await == Some(5),
    );

    proxy.activate().await?;
    let names = storage.keys().await?;
    tally.check(
        "stale store swept",
        !names.iter().any(|n| n == "logreelpro-cache-0.9.0"),
    );
    tally.check(
        "current store kept",
        names.iter().any(|n| n == "logreelpro-cache-1.0.0"),
    );
    tally.check(
        "all clients claimed",
        clients.controlled_by("logreelpro-cache-1.0.0").await == 2,
    );

    // Live traffic: first fetch goes to the network, a copy lands behind.
    let app_js = Request::get(scope.join("app.js")?);
    match proxy.handle_fetch(&app_js).await? {
        FetchDecision::Respond(r) => {
            tally.check(
                "live fetch served from network",
                !r.from_cache && r.status == 200,
            );
            tally.check("live fetch body intact", &r.body[..] == APP_JS.as_bytes());
        }
        FetchDecision::Passthrough => tally.check("live fetch served from network", false),
    }
    tally.check(
        "write-behind landed",
        wait_for_cache_update(&mut events).await.as_deref() == Some(app_js.cache_key().as_str()),
    );

    match proxy.handle_fetch(&app_js).await? {
        FetchDecision::Respond(r) => {
            tally.check("second fetch is a cache hit", r.from_cache);
            tally.check("cache hit body identical", &r.body[..] == APP_JS.as_bytes());
        }
        FetchDecision::Passthrough => tally.check("second fetch is a cache hit", false),
    }

    let extension = Request::get(Url::parse("chrome-extension://abcdef/options.html")?);
    tally.check(
        "extension scheme passes through",
        matches!(proxy.handle_fetch(&extension).await?, FetchDecision::Passthrough),
    );

    // Offline drill: the server goes away.
    info!("dropping the loopback server; going offline");
    drop(server);

    let navigation = Request::navigate(scope.join("reels/today")?);
    match proxy.handle_fetch(&navigation).await? {
        FetchDecision::Respond(r) => {
            tally.check(
                "offline navigation gets the cached shell",
                r.from_cache && &r.body[..] == INDEX_HTML.as_bytes(),
            );
        }
        FetchDecision::Passthrough => tally.check("offline navigation gets the cached shell", false),
    }
    let api = Request::get(scope.join("api/reels.json")?);
    tally.check(
        "offline subresource fails through",
        proxy.handle_fetch(&api).await.is_err(),
    );

    // v2 deployment: fresh server, same storage; the sweep retires v1.
    let server2 = start_shell_server().await;
    let scope2 = Url::parse(&format!("{}/", server2.uri()))?;
    let fetcher2 = Arc::new(HttpFetcher::new(scope2.clone(), NetConfig::default())?);
    let (proxy2, _events2) = OfflineCacheProxy::new(
        scope2,
        shell_manifest("2.0.0"),
        storage.clone(),
        fetcher2,
        clients.clone(),
    )?;
    proxy2.install().await?;
    proxy2.activate().await?;

    let mut names = storage.keys().await?;
    names.sort();
    tally.check(
        "upgrade leaves only the new store",
        names == vec!["logreelpro-cache-2.0.0"],
    );
    tally.check(
        "clients re-claimed by v2",
        clients.controlled_by("logreelpro-cache-2.0.0").await == 2,
    );

    info!(passed = tally.passed, failed = tally.failed, "smoke drill complete");
    if tally.failed > 0 {
        bail!("{} smoke check(s) failed", tally.failed);
    }
    Ok(())
}
