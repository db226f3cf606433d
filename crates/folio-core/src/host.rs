//! Document hosts: where pages are loaded and queried
//!
//! The engine never touches a DOM directly. A host loads documents, runs the
//! snapshot query program against them, and hands back a [`DocumentSnapshot`].

use crate::chrome::ChromeHost;
use crate::config::BrowserConfig;
use crate::snapshot::{DocumentSnapshot, SNAPSHOT_SCRIPT};
use crate::{FolioError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Opaque reference to a document loaded in a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Sequential handle ids for a host
#[derive(Debug, Default)]
pub(crate) struct HandleCounter(AtomicU64);

impl HandleCounter {
    pub(crate) fn next(&self) -> DocumentHandle {
        DocumentHandle(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// A query the engine runs inside a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryProgram {
    /// Structural snapshot of the page (see [`DocumentSnapshot`])
    Snapshot,
}

impl QueryProgram {
    pub fn snapshot() -> Self {
        QueryProgram::Snapshot
    }

    /// JavaScript source, for hosts that evaluate it in a page
    pub fn script(&self) -> &'static str {
        match self {
            QueryProgram::Snapshot => SNAPSHOT_SCRIPT,
        }
    }
}

/// A place documents are loaded and queried
#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Load `url` into a new document
    async fn open(&self, url: &str) -> Result<DocumentHandle>;

    /// Load `url` into an existing document
    async fn navigate(&self, doc: &DocumentHandle, url: &str) -> Result<()>;

    /// Run a query program against the document's current content
    async fn run_query(&self, doc: &DocumentHandle, program: &QueryProgram) -> Result<DocumentSnapshot>;

    /// Discard a document. Unknown handles are ignored.
    async fn release(&self, doc: DocumentHandle);
}

/// Pick a host for the browser settings: headless Chrome when JavaScript is
/// wanted and a browser can be started, plain HTTP otherwise.
pub async fn connect(config: &BrowserConfig) -> Result<Arc<dyn DocumentHost>> {
    if config.javascript && config.mode != "none" {
        match ChromeHost::launch(config.to_chrome_config()).await {
            Ok(host) => return Ok(Arc::new(host)),
            Err(e) => warn!("Failed to initialize browser, falling back to HTTP-only: {}", e),
        }
    }
    Ok(Arc::new(StaticHost::new(config)?))
}

struct StaticDocument {
    url: String,
    html: String,
}

/// HTTP-only host: fetches HTML with `reqwest` and evaluates the snapshot
/// program natively. Scripts on the page never run.
pub struct StaticHost {
    client: Client,
    documents: Mutex<HashMap<DocumentHandle, StaticDocument>>,
    handles: HandleCounter,
}

impl StaticHost {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("Folio/{} (Reading Mode)", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            documents: Mutex::new(HashMap::new()),
            handles: HandleCounter::default(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<StaticDocument> {
        let url = Url::parse(url)?;
        debug!("Fetching with HTTP: {}", url);
        let response = self.client.get(url.as_str()).send().await?.error_for_status()?;
        let final_url = response.url().to_string();
        let html = response.text().await?;
        Ok(StaticDocument {
            url: final_url,
            html,
        })
    }
}

#[async_trait]
impl DocumentHost for StaticHost {
    async fn open(&self, url: &str) -> Result<DocumentHandle> {
        let document = self.fetch(url).await?;
        let handle = self.handles.next();
        info!("Opened {} as document {}", document.url, handle.id());
        self.documents.lock().await.insert(handle, document);
        Ok(handle)
    }

    async fn navigate(&self, doc: &DocumentHandle, url: &str) -> Result<()> {
        if !self.documents.lock().await.contains_key(doc) {
            return Err(FolioError::HostError(format!("unknown document {}", doc.id())));
        }
        let document = self.fetch(url).await?;
        info!("Navigated document {} to {}", doc.id(), document.url);
        self.documents.lock().await.insert(*doc, document);
        Ok(())
    }

    async fn run_query(&self, doc: &DocumentHandle, program: &QueryProgram) -> Result<DocumentSnapshot> {
        let documents = self.documents.lock().await;
        let document = documents
            .get(doc)
            .ok_or_else(|| FolioError::HostError(format!("unknown document {}", doc.id())))?;

        match program {
            QueryProgram::Snapshot => Ok(DocumentSnapshot::from_html(&document.html, &document.url)),
        }
    }

    async fn release(&self, doc: DocumentHandle) {
        if self.documents.lock().await.remove(&doc).is_some() {
            debug!("Released document {}", doc.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_distinct() {
        let counter = HandleCounter::default();
        let a = counter.next();
        let b = counter.next();
        assert_ne!(a, b);
        assert_eq!(b.id(), a.id() + 1);
    }

    #[test]
    fn test_snapshot_program_script() {
        assert_eq!(QueryProgram::snapshot(), QueryProgram::Snapshot);
        assert!(QueryProgram::snapshot().script().contains("containers"));
    }

    #[test]
    fn test_static_host_unknown_document() {
        tokio_test::block_on(async {
            let host = StaticHost::new(&BrowserConfig::default()).unwrap();
            let result = host
                .run_query(&DocumentHandle::new(99), &QueryProgram::snapshot())
                .await;
            assert!(matches!(result, Err(FolioError::HostError(_))));

            // Releasing an unknown document is a no-op
            host.release(DocumentHandle::new(99)).await;
        });
    }

    #[test]
    fn test_static_host_rejects_bad_url() {
        tokio_test::block_on(async {
            let host = StaticHost::new(&BrowserConfig::default()).unwrap();
            let result = host.open("not a url").await;
            assert!(matches!(result, Err(FolioError::UrlError(_))));
        });
    }
}
