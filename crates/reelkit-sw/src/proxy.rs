//! The offline cache proxy: install, activation, fetch interception and the
//! background sync hook.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::cache::{request_key, CacheEntry, CacheStorage};
use crate::clients::ClientRegistry;
use crate::fetch::{NetworkFetcher, Request, Response};
use crate::manifest::ShellManifest;
use crate::sync::{SyncTask, DATA_SYNC_TAG};
use crate::SwError;

/// Lifecycle phase of one proxy version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyPhase {
    /// Constructed, install not yet run.
    #[default]
    New,
    /// Populating this version's store.
    Installing,
    /// Store fully populated; eligible for activation.
    Installed,
    /// Sweeping stale stores and claiming clients.
    Activating,
    /// Serving traffic as the current version.
    Activated,
    /// Install failed; this version will never serve.
    Redundant,
}

/// Notifications emitted by the proxy.
#[derive(Debug, Clone)]
pub enum ProxyEvent {
    /// Install began for the named store.
    InstallStarted { cache: String },
    /// Every manifest entry is cached.
    Installed { cache: String, entries: usize },
    /// Install aborted; the store was not promoted.
    InstallFailed { cache: String, reason: String },
    /// The host may activate this version immediately instead of waiting for
    /// open instances to close.
    SkipWaitingRequested,
    /// Activation finished: stale stores purged.
    Activated { cache: String, purged: Vec<String> },
    /// All open instances are now controlled by this version.
    ClientsClaimed { count: usize },
    /// A live-traffic response copy landed in the store.
    CacheUpdated { cache: String, key: String },
    /// A background sync task fired.
    SyncRequested { task: SyncTask },
}

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not intercepted: the host performs the request natively, with no cache
    /// lookup and no storage.
    Passthrough,
    /// The proxy produced a response.
    Respond(Response),
}

/// The offline cache proxy for one deployed shell version.
///
/// One instance exists per version. Each version owns the store named
/// `<app-prefix>-cache-<version>`; activating a version purges every other
/// store of the same application and claims all open instances.
pub struct OfflineCacheProxy {
    manifest: ShellManifest,
    /// Resolved shell asset URLs, in manifest order.
    shell_urls: Vec<Url>,
    /// Store key of the offline fallback document.
    fallback_key: String,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn NetworkFetcher>,
    clients: Arc<ClientRegistry>,
    phase: RwLock<ProxyPhase>,
    skip_waiting: AtomicBool,
    event_tx: mpsc::UnboundedSender<ProxyEvent>,
}

impl OfflineCacheProxy {
    /// Create a proxy for `manifest`, serving the application at `scope`.
    ///
    /// `scope` is the base URL the manifest's relative locators resolve
    /// against, usually the directory the shell is served from. Returns the
    /// proxy and the receiving end of its event stream.
    pub fn new(
        scope: Url,
        manifest: ShellManifest,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn NetworkFetcher>,
        clients: Arc<ClientRegistry>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProxyEvent>), SwError> {
        manifest.validate()?;
        if scope.cannot_be_a_base() {
            return Err(SwError::Config(format!(
                "scope {} cannot be a base URL",
                scope
            )));
        }

        let shell_urls = manifest.resolve_shell_urls(&scope)?;
        let fallback = manifest.resolve_fallback(&scope)?;
        let fallback_key = request_key("GET", &fallback);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                manifest,
                shell_urls,
                fallback_key,
                storage,
                network,
                clients,
                phase: RwLock::new(ProxyPhase::New),
                skip_waiting: AtomicBool::new(false),
                event_tx,
            },
            event_rx,
        ))
    }

    /// The manifest this version serves.
    pub fn manifest(&self) -> &ShellManifest {
        &self.manifest
    }

    /// Store name owned by this version.
    pub fn cache_name(&self) -> String {
        self.manifest.cache_name()
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> ProxyPhase {
        *self.phase.read().await
    }

    /// Whether install asked the host to activate immediately instead of
    /// waiting for open instances to close. Raised only by a successful
    /// install.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    async fn set_phase(&self, phase: ProxyPhase) {
        *self.phase.write().await = phase;
    }

    fn emit(&self, event: ProxyEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Install this version: open its store and populate it with every shell
    /// manifest entry.
    ///
    /// Population is all-or-nothing. Every manifest URL is fetched before the
    /// first entry is written, and any fetch that does not come back an HTTP
    /// success aborts the whole install. A failed install leaves this version
    /// [`ProxyPhase::Redundant`] and never promoted, so whichever version is
    /// currently active keeps serving. Re-running a successful install
    /// overwrites entries with identical content.
    pub async fn install(&self) -> Result<(), SwError> {
        let cache = self.cache_name();
        self.set_phase(ProxyPhase::Installing).await;
        self.emit(ProxyEvent::InstallStarted {
            cache: cache.clone(),
        });
        info!(cache = %cache, version = %self.manifest.version, "installing app shell");

        match self.populate(&cache).await {
            Ok(entries) => {
                self.skip_waiting.store(true, Ordering::Relaxed);
                self.set_phase(ProxyPhase::Installed).await;
                self.emit(ProxyEvent::Installed {
                    cache: cache.clone(),
                    entries,
                });
                self.emit(ProxyEvent::SkipWaitingRequested);
                info!(cache = %cache, count = entries, "app shell cached");
                Ok(())
            }
            Err(e) => {
                self.set_phase(ProxyPhase::Redundant).await;
                self.emit(ProxyEvent::InstallFailed {
                    cache: cache.clone(),
                    reason: e.to_string(),
                });
                warn!(cache = %cache, error = %e, "install failed; previous version keeps serving");
                Err(e)
            }
        }
    }

    /// Fetch every manifest entry, then commit all snapshots to the store.
    async fn populate(&self, cache: &str) -> Result<usize, SwError> {
        self.storage.open(cache).await?;

        let mut entries = Vec::with_capacity(self.shell_urls.len());
        for url in &self.shell_urls {
            let request = Request::get(url.clone());
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| SwError::InstallFailed(format!("{}: {}", url, e)))?;
            if !response.ok() {
                return Err(SwError::InstallFailed(format!(
                    "{}: status {}",
                    url, response.status
                )));
            }
            trace!(url = %url, status = response.status, "manifest entry fetched");
            entries.push(CacheEntry::snapshot(&request, &response));
        }

        let count = entries.len();
        for entry in entries {
            self.storage.put(cache, entry).await?;
        }
        Ok(count)
    }

    /// Activate this version: purge every stale same-family store, then claim
    /// all open instances.
    ///
    /// Only legal once install has fully completed. The sweep finishes before
    /// any client changes hands, so there is never a moment with two
    /// same-family stores both serving.
    pub async fn activate(&self) -> Result<(), SwError> {
        if self.phase().await != ProxyPhase::Installed {
            return Err(SwError::State(
                "activate requires a completed install".to_string(),
            ));
        }
        self.set_phase(ProxyPhase::Activating).await;

        let cache = self.cache_name();
        let mut purged = Vec::new();
        for name in self.storage.keys().await? {
            if self.manifest.is_stale_store(&name) {
                self.storage.delete(&name).await?;
                info!(cache = %name, "purged stale store");
                purged.push(name);
            }
        }

        let claimed = self.clients.claim_all(&cache).await;
        self.set_phase(ProxyPhase::Activated).await;
        info!(cache = %cache, purged = purged.len(), claimed = claimed, "proxy activated");
        self.emit(ProxyEvent::Activated {
            cache,
            purged,
        });
        self.emit(ProxyEvent::ClientsClaimed { count: claimed });
        Ok(())
    }

    /// Decide a response for an intercepted request.
    ///
    /// Policy order: bypass check, then cache lookup, then network. A
    /// cacheable network response (status exactly 200, same-origin) is copied
    /// into the store behind the caller's back. When the network itself is
    /// unreachable, a navigation gets the cached shell document and anything
    /// else propagates the failure.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchDecision, SwError> {
        if self.manifest.is_bypassed(&request.url) {
            trace!(url = %request.url, "bypassed scheme; not intercepting");
            return Ok(FetchDecision::Passthrough);
        }

        let cache = self.cache_name();
        let key = request.cache_key();

        match self.storage.match_key(&cache, &key).await {
            Ok(Some(entry)) => {
                debug!(url = %request.url, "cache hit");
                return Ok(FetchDecision::Respond(entry.into_response()));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(url = %request.url, error = %e, "cache lookup failed; treating as miss")
            }
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.write_behind(cache, request, &response);
                }
                Ok(FetchDecision::Respond(response))
            }
            Err(net_err) => {
                if request.mode.is_navigation() {
                    match self.storage.match_key(&cache, &self.fallback_key).await {
                        Ok(Some(entry)) => {
                            info!(url = %request.url, "network unreachable; serving cached shell");
                            return Ok(FetchDecision::Respond(entry.into_response()));
                        }
                        Ok(None) => {
                            warn!(url = %request.url, "offline with no cached shell document")
                        }
                        Err(e) => {
                            warn!(url = %request.url, error = %e, "fallback lookup failed")
                        }
                    }
                }
                Err(net_err)
            }
        }
    }

    /// Copy a response into the store without delaying the caller.
    ///
    /// The snapshot is written from a spawned task. A failure is logged and
    /// swallowed; the caller already has its response. A successful write is
    /// announced with [`ProxyEvent::CacheUpdated`].
    fn write_behind(&self, cache: String, request: &Request, response: &Response) {
        let entry = CacheEntry::snapshot(request, response);
        let key = entry.key();
        let storage = Arc::clone(&self.storage);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            match storage.put(&cache, entry).await {
                Ok(()) => {
                    trace!(cache = %cache, key = %key, "response copied into store");
                    let _ = event_tx.send(ProxyEvent::CacheUpdated { cache, key });
                }
                Err(e) => {
                    warn!(cache = %cache, key = %key, error = %e, "cache write failed")
                }
            }
        });
    }

    /// Run the background sync task registered under `tag`.
    pub async fn handle_sync_tag(&self, tag: &str) -> Result<(), SwError> {
        self.handle_sync(SyncTask::from_tag(tag)).await
    }

    /// Run a background sync task.
    ///
    /// [`SyncTask::DataSync`] is reserved: it records that the task fired and
    /// returns without contacting any endpoint. Unrecognized tasks are
    /// ignored outright.
    pub async fn handle_sync(&self, task: SyncTask) -> Result<(), SwError> {
        match task {
            SyncTask::DataSync => {
                // TODO: push pending reel data to the sync endpoint once the server API exists.
                info!(tag = DATA_SYNC_TAG, "background data sync requested");
                self.emit(ProxyEvent::SyncRequested { task });
                Ok(())
            }
            SyncTask::Ignored => {
                debug!("ignoring unrecognized sync registration");
                Ok(())
            }
        }
    }
}
