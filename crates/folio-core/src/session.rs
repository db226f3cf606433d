//! Reading session state machine
//!
//! A [`ReadingSession`] owns every piece of mutable reading-mode state: the
//! visible document, the current chapter index, the retry counter and the
//! pending retry deadline. Transitions happen through `&mut self`, so only
//! one query is ever in flight. [`SessionHandle`] runs a session on its own
//! task and fires retries from a timer that `exit` cancels.

use crate::catalog::{CatalogCache, ChapterList};
use crate::classify::{classify, url_catalog_hint, ClassificationResult, PageKind};
use crate::config::EngineConfig;
use crate::extract::{extract, ExtractionResult};
use crate::host::{DocumentHandle, DocumentHost, QueryProgram};
use crate::resolve::resolve;
use crate::snapshot::DocumentSnapshot;
use crate::{char_len, ChapterLink, FolioError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Whether reading mode is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Active,
}

/// Notifications for the UI collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        active: bool,
    },
    ChapterLoaded {
        title: String,
        body: String,
        has_next: bool,
        has_prev: bool,
        /// Content follows the previous chapter rather than replacing it
        is_append: bool,
    },
    ChapterLoadFailed {
        reason: String,
    },
    CatalogLoaded(Arc<ChapterList>),
    CatalogLoadFailed {
        reason: String,
    },
    /// The visible page is itself a chapter list
    CatalogPageDetected(Arc<ChapterList>),
    /// Retries ran out; the raw document text is shown instead
    FallbackDisplayed {
        title: String,
        text: String,
    },
}

/// The navigation a load was started for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingNavigation {
    Next,
    Prev,
    Jump(String),
}

/// What a classification pass did to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    ChapterShown,
    CatalogShown,
    /// A re-query is scheduled
    RetryScheduled { attempt: u32, delay: Duration },
    /// Retries are exhausted
    Degraded,
}

/// Reading-mode session over one visible document
pub struct ReadingSession {
    host: Arc<dyn DocumentHost>,
    cache: Arc<CatalogCache>,
    config: EngineConfig,
    events: mpsc::UnboundedSender<SessionEvent>,

    state: SessionState,
    document: Option<DocumentHandle>,
    original_url: Option<String>,
    current_url: Option<String>,
    current_index: Option<usize>,
    pending_navigation: Option<PendingNavigation>,
    retry_count: u32,
    retry_due: Option<Instant>,
    chapter_list: Option<Arc<ChapterList>>,
    last_extraction: Option<ExtractionResult>,
}

impl ReadingSession {
    /// Create an inactive session and the receiver for its events
    pub fn new(
        host: Arc<dyn DocumentHost>,
        cache: Arc<CatalogCache>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            host,
            cache,
            config,
            events,
            state: SessionState::Inactive,
            document: None,
            original_url: None,
            current_url: None,
            current_index: None,
            pending_navigation: None,
            retry_count: 0,
            retry_due: None,
            chapter_list: None,
            last_extraction: None,
        };
        (session, receiver)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn chapter_list(&self) -> Option<Arc<ChapterList>> {
        self.chapter_list.clone()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// URL shown before reading mode was first entered
    pub fn original_url(&self) -> Option<&str> {
        self.original_url.as_deref()
    }

    /// The load in flight, if any
    pub fn pending_navigation(&self) -> Option<&PendingNavigation> {
        self.pending_navigation.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// When the pending re-query should run, if one is scheduled
    pub fn retry_due(&self) -> Option<Instant> {
        self.retry_due
    }

    /// Turn reading mode on for `url` and classify it
    pub async fn enter(&mut self, url: &str) -> Result<Transition> {
        if self.original_url.is_none() {
            self.original_url = Some(url.to_string());
        }
        if self.state == SessionState::Inactive {
            self.state = SessionState::Active;
            info!("Reading mode on at {}", url);
            self.emit(SessionEvent::StateChanged { active: true });
        }

        if url_catalog_hint(url) {
            debug!("{} looks like a catalog URL", url);
        }

        self.current_url = Some(url.to_string());
        self.current_index = None;
        self.pending_navigation = None;
        self.retry_count = 0;
        self.retry_due = None;
        if self.chapter_list.is_none() {
            self.chapter_list = self.cache.get_or_load();
        }

        match self.document {
            Some(doc) => self.host.navigate(&doc, url).await.map_err(|e| self.fail(e))?,
            None => {
                let doc = self.host.open(url).await.map_err(|e| self.fail(e))?;
                self.document = Some(doc);
            }
        }

        self.classify_current().await
    }

    /// Turn reading mode off, restoring the page it started on.
    ///
    /// Always succeeds; a pending retry is discarded. The chapter list and
    /// catalog cache are kept for the next entry.
    pub async fn exit(&mut self) {
        if self.state == SessionState::Inactive {
            return;
        }

        self.retry_due = None;
        self.retry_count = 0;
        self.current_index = None;
        self.pending_navigation = None;
        self.state = SessionState::Inactive;

        if let (Some(doc), Some(url)) = (self.document, self.original_url.take()) {
            if self.current_url.as_deref() != Some(url.as_str()) {
                match self.host.navigate(&doc, &url).await {
                    Ok(()) => self.current_url = Some(url),
                    Err(e) => warn!("Failed to restore {}: {}", url, e),
                }
            }
        }

        info!("Reading mode off");
        self.emit(SessionEvent::StateChanged { active: false });
    }

    /// Run the scheduled re-query. Returns `None` when nothing was pending,
    /// which is the case after `exit`.
    pub async fn retry(&mut self) -> Result<Option<Transition>> {
        if self.state == SessionState::Inactive || self.retry_due.take().is_none() {
            return Ok(None);
        }
        debug!("Retry {} of {}", self.retry_count, self.config.session.max_retries);
        self.classify_current().await.map(Some)
    }

    pub async fn load_next(&mut self) -> Result<()> {
        self.load_relative(1).await
    }

    pub async fn load_prev(&mut self) -> Result<()> {
        self.load_relative(-1).await
    }

    /// Load an arbitrary chapter, placing it in the list when possible
    pub async fn load_chapter(&mut self, url: &str) -> Result<()> {
        self.require_active()?;
        let index = self.chapter_list.as_ref().and_then(|list| resolve(url, list));
        self.load_target(url, index, PendingNavigation::Jump(url.to_string()))
            .await
    }

    /// Fetch the book's catalog page, or fall back to the cached list
    pub async fn load_catalog(&mut self) -> Result<Arc<ChapterList>> {
        self.require_active()?;

        let catalog_url = self
            .last_extraction
            .as_ref()
            .and_then(|e| e.catalog_url.clone());

        if let Some(url) = catalog_url {
            match self.fetch_snapshot(&url).await {
                Ok(snapshot) => {
                    let extraction = extract(&snapshot, &self.config.extract);
                    if extraction.chapter_links.len() >= self.config.classify.catalog_min_links {
                        let result = classify(&extraction, &url, &self.config.classify);
                        let list = self.adopt_list(&extraction.chapter_links, result.confidence);
                        self.current_index = self
                            .current_url
                            .as_deref()
                            .and_then(|current| resolve(current, &list));
                        info!("Loaded catalog of {} chapters from {}", list.len(), url);
                        self.emit(SessionEvent::CatalogLoaded(list.clone()));
                        return Ok(list);
                    }
                    debug!("Catalog page {} had no chapter list", url);
                }
                Err(e) => warn!("Failed to fetch catalog {}: {}", url, e),
            }
        }

        match self.chapter_list.clone().or_else(|| self.cache.get_or_load()) {
            Some(list) if !list.is_empty() => {
                self.chapter_list = Some(list.clone());
                self.emit(SessionEvent::CatalogLoaded(list.clone()));
                Ok(list)
            }
            _ => {
                self.emit(SessionEvent::CatalogLoadFailed {
                    reason: FolioError::NoChapterList.to_string(),
                });
                Err(FolioError::NoChapterList)
            }
        }
    }

    /// Release the visible document. The session cannot be used afterwards.
    pub async fn shutdown(mut self) {
        self.exit().await;
        if let Some(doc) = self.document.take() {
            self.host.release(doc).await;
        }
    }

    /// Run the session on its own task
    pub fn spawn(self) -> SessionHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(self, receiver));
        SessionHandle { commands }
    }

    async fn load_relative(&mut self, step: i64) -> Result<()> {
        self.require_active()?;

        let list = match self.chapter_list.clone() {
            Some(list) if !list.is_empty() => list,
            _ => return self.follow_page_link(step).await,
        };

        let index = match self.current_index.or_else(|| {
            self.current_url
                .as_deref()
                .and_then(|url| resolve(url, &list))
        }) {
            Some(index) => index,
            None => {
                debug!("Current chapter not in list, assuming the first");
                0
            }
        };

        let target = index as i64 + step;
        if target < 0 || target >= list.len() as i64 {
            let err = FolioError::OutOfBounds {
                target,
                len: list.len(),
            };
            return Err(self.fail(err));
        }

        let target = target as usize;
        let url = list.entries[target].url.clone();
        self.load_target(&url, Some(target), direction(step)).await
    }

    /// Paging without a chapter list: follow the page's own next/prev link
    async fn follow_page_link(&mut self, step: i64) -> Result<()> {
        let url = self.last_extraction.as_ref().and_then(|e| {
            if step > 0 {
                e.next_url.clone()
            } else {
                e.prev_url.clone()
            }
        });
        match url {
            Some(url) => self.load_target(&url, None, direction(step)).await,
            None => Err(self.fail(FolioError::NoChapterList)),
        }
    }

    /// Seamless load on a scratch document, with direct navigation as the
    /// fallback when the chapter comes back empty
    async fn load_target(
        &mut self,
        url: &str,
        index: Option<usize>,
        navigation: PendingNavigation,
    ) -> Result<()> {
        self.pending_navigation = Some(navigation);
        let result = self.load_pending(url, index).await;
        self.pending_navigation = None;
        result
    }

    async fn load_pending(&mut self, url: &str, index: Option<usize>) -> Result<()> {
        let snapshot = self.fetch_snapshot(url).await.map_err(|e| self.fail(e))?;
        let extraction = extract(&snapshot, &self.config.extract);

        if char_len(&extraction.body_text) >= self.config.classify.chapter_min_body {
            self.current_url = Some(url.to_string());
            self.retry_count = 0;
            self.retry_due = None;
            let previous = self.chapter_list.clone();
            if extraction.chapter_links.len() >= self.config.classify.catalog_min_links {
                let result = classify(&extraction, url, &self.config.classify);
                self.adopt_list(&extraction.chapter_links, result.confidence);
            }
            // `index` points into the list the load started from
            let same_list = match (&previous, &self.chapter_list) {
                (Some(before), Some(after)) => Arc::ptr_eq(before, after),
                (None, None) => true,
                _ => false,
            };
            let resolved = self.chapter_list.as_ref().and_then(|list| resolve(url, list));
            self.current_index = if same_list { index.or(resolved) } else { resolved };
            info!("Loaded chapter {:?} seamlessly from {}", extraction.title, url);
            self.show_chapter(&extraction);
            self.last_extraction = Some(extraction);
            return Ok(());
        }

        debug!("Seamless load of {} came back empty, navigating", url);
        let doc = self.document.ok_or(FolioError::NotActive)?;
        self.host.navigate(&doc, url).await.map_err(|e| self.fail(e))?;
        self.current_url = Some(url.to_string());
        self.current_index = index;
        self.retry_count = 0;
        self.retry_due = None;
        self.classify_current().await.map(|_| ())
    }

    /// Open, query once, release: the scratch document never outlives the call
    async fn fetch_snapshot(&self, url: &str) -> Result<DocumentSnapshot> {
        let scratch = self.host.open(url).await?;
        let result = self.host.run_query(&scratch, &QueryProgram::snapshot()).await;
        self.host.release(scratch).await;
        result
    }

    /// Query the visible document and apply the result
    async fn classify_current(&mut self) -> Result<Transition> {
        let doc = self.document.ok_or(FolioError::NotActive)?;
        let snapshot = self
            .host
            .run_query(&doc, &QueryProgram::snapshot())
            .await
            .map_err(|e| self.fail(e))?;
        Ok(self.apply_snapshot(&snapshot))
    }

    fn apply_snapshot(&mut self, snapshot: &DocumentSnapshot) -> Transition {
        if !snapshot.url.is_empty() {
            self.current_url = Some(snapshot.url.clone());
        }
        let url = self.current_url.clone().unwrap_or_default();
        let extraction = extract(snapshot, &self.config.extract);
        let result = classify(&extraction, &url, &self.config.classify);

        let transition = match result.page_kind {
            PageKind::Chapter => self.on_chapter(&extraction, &result, &url),
            PageKind::Catalog => self.on_catalog(&extraction, &result),
            PageKind::Indeterminate => self.on_indeterminate(snapshot, &extraction),
        };
        self.last_extraction = Some(extraction);
        transition
    }

    fn on_chapter(
        &mut self,
        extraction: &ExtractionResult,
        result: &ClassificationResult,
        url: &str,
    ) -> Transition {
        self.retry_count = 0;
        self.retry_due = None;

        // Chapter pages with a sidebar list enrich the cache
        if extraction.chapter_links.len() >= self.config.classify.catalog_min_links {
            self.adopt_list(&extraction.chapter_links, result.confidence);
        }
        self.current_index = self.chapter_list.as_ref().and_then(|list| resolve(url, list));

        info!(
            "Chapter {:?} at index {:?}",
            extraction.title, self.current_index
        );
        self.show_chapter(extraction);
        Transition::ChapterShown
    }

    fn on_catalog(&mut self, extraction: &ExtractionResult, result: &ClassificationResult) -> Transition {
        self.retry_count = 0;
        self.retry_due = None;
        self.current_index = None;

        let list = self.adopt_list(&extraction.chapter_links, result.confidence);
        info!("Catalog page with {} chapters", list.len());
        self.emit(SessionEvent::CatalogPageDetected(list));
        Transition::CatalogShown
    }

    fn on_indeterminate(&mut self, snapshot: &DocumentSnapshot, extraction: &ExtractionResult) -> Transition {
        self.retry_count += 1;
        let max = self.config.session.max_retries;

        if self.retry_count <= max {
            let delay = self.config.session.retry_delay(self.retry_count);
            self.retry_due = Some(Instant::now() + delay);
            debug!(
                "Page not ready, retry {} of {} in {:?}",
                self.retry_count, max, delay
            );
            return Transition::RetryScheduled {
                attempt: self.retry_count,
                delay,
            };
        }

        self.retry_due = None;
        warn!("No readable content after {} retries, showing raw text", max);
        let title = if snapshot.title.is_empty() {
            extraction.title.clone()
        } else {
            snapshot.title.clone()
        };
        self.emit(SessionEvent::FallbackDisplayed {
            title,
            text: snapshot.body_text.clone(),
        });
        Transition::Degraded
    }

    /// Offer links to the cache and make the resulting list current.
    ///
    /// When the cache keeps a more confident list of the same book, the
    /// session pages by that list, not by the page's partial one.
    fn adopt_list(&mut self, links: &[ChapterLink], confidence: f32) -> Arc<ChapterList> {
        let list = match self.cache.put(links, confidence) {
            Some(list) => list,
            None => {
                let offered = ChapterList::from_links(links, confidence);
                match self.cache.get().or_else(|| self.chapter_list.clone()) {
                    Some(kept) if !kept.is_empty() && kept.base_url == offered.base_url => {
                        debug!("Paging by the kept list of {} chapters", kept.len());
                        kept
                    }
                    _ => Arc::new(offered),
                }
            }
        };
        self.chapter_list = Some(list.clone());
        list
    }

    fn show_chapter(&self, extraction: &ExtractionResult) {
        let is_append = self.pending_navigation == Some(PendingNavigation::Next);
        let (has_next, has_prev) = match (&self.chapter_list, self.current_index) {
            (Some(list), Some(index)) => (index + 1 < list.len(), index > 0),
            _ => (extraction.next_url.is_some(), extraction.prev_url.is_some()),
        };
        self.emit(SessionEvent::ChapterLoaded {
            title: extraction.title.clone(),
            body: extraction.body_text.clone(),
            has_next,
            has_prev,
            is_append,
        });
    }

    fn require_active(&self) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Inactive => Err(FolioError::NotActive),
        }
    }

    /// Report a failed load to the UI and hand the error back
    fn fail(&self, err: FolioError) -> FolioError {
        warn!("Chapter load failed: {}", err);
        self.emit(SessionEvent::ChapterLoadFailed {
            reason: err.to_string(),
        });
        err
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine; the session keeps working
        let _ = self.events.send(event);
    }
}

fn direction(step: i64) -> PendingNavigation {
    if step > 0 {
        PendingNavigation::Next
    } else {
        PendingNavigation::Prev
    }
}

enum Command {
    Enter(String, oneshot::Sender<Result<Transition>>),
    Exit(oneshot::Sender<()>),
    LoadNext(oneshot::Sender<Result<()>>),
    LoadPrev(oneshot::Sender<Result<()>>),
    LoadChapter(String, oneshot::Sender<Result<()>>),
    LoadCatalog(oneshot::Sender<Result<Arc<ChapterList>>>),
    ChapterList(oneshot::Sender<Option<Arc<ChapterList>>>),
    CurrentIndex(oneshot::Sender<Option<usize>>),
}

/// Cloneable front end to a session running on its own task.
///
/// Commands run one at a time in the order sent. When the last handle is
/// dropped the session shuts down and releases its document.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    pub async fn enter(&self, url: &str) -> Result<Transition> {
        self.request(|reply| Command::Enter(url.to_string(), reply)).await?
    }

    pub async fn exit(&self) -> Result<()> {
        self.request(Command::Exit).await
    }

    pub async fn load_next(&self) -> Result<()> {
        self.request(Command::LoadNext).await?
    }

    pub async fn load_prev(&self) -> Result<()> {
        self.request(Command::LoadPrev).await?
    }

    pub async fn load_chapter(&self, url: &str) -> Result<()> {
        self.request(|reply| Command::LoadChapter(url.to_string(), reply)).await?
    }

    pub async fn load_catalog(&self) -> Result<Arc<ChapterList>> {
        self.request(Command::LoadCatalog).await?
    }

    pub async fn chapter_list(&self) -> Result<Option<Arc<ChapterList>>> {
        self.request(Command::ChapterList).await
    }

    pub async fn current_index(&self) -> Result<Option<usize>> {
        self.request(Command::CurrentIndex).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| FolioError::HostError("reading session has shut down".to_string()))?;
        response
            .await
            .map_err(|_| FolioError::HostError("reading session has shut down".to_string()))
    }
}

async fn run(mut session: ReadingSession, mut commands: mpsc::UnboundedReceiver<Command>) {
    loop {
        let due = session.retry_due();
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut session, command).await,
                None => break,
            },
            _ = wait_for(due) => {
                if let Err(e) = session.retry().await {
                    debug!("Retry failed: {}", e);
                }
            }
        }
    }
    session.shutdown().await;
}

async fn wait_for(due: Option<Instant>) {
    match due {
        Some(due) => sleep_until(due).await,
        None => std::future::pending().await,
    }
}

async fn dispatch(session: &mut ReadingSession, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::Enter(url, reply) => {
            let _ = reply.send(session.enter(&url).await);
        }
        Command::Exit(reply) => {
            session.exit().await;
            let _ = reply.send(());
        }
        Command::LoadNext(reply) => {
            let _ = reply.send(session.load_next().await);
        }
        Command::LoadPrev(reply) => {
            let _ = reply.send(session.load_prev().await);
        }
        Command::LoadChapter(url, reply) => {
            let _ = reply.send(session.load_chapter(&url).await);
        }
        Command::LoadCatalog(reply) => {
            let _ = reply.send(session.load_catalog().await);
        }
        Command::ChapterList(reply) => {
            let _ = reply.send(session.chapter_list());
        }
        Command::CurrentIndex(reply) => {
            let _ = reply.send(session.current_index());
        }
    }
}
