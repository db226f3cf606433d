//! Catalog cache: the best-known chapter list for the current book
//!
//! One list is kept per process. It is swapped whole behind an `RwLock`, so
//! readers always see a complete list, and mirrored to a [`CatalogStore`] so
//! it survives restarts.

use crate::{ChapterLink, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use url::Url;

/// Fewest links a list needs before it is cached
pub const MIN_CATALOG_LINKS: usize = 3;

/// One chapter in a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub title: String,
    pub url: String,
    /// 0-based position, contiguous within its list
    pub index: usize,
}

/// An ordered chapter list for one book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterList {
    pub entries: Vec<ChapterEntry>,
    /// Scheme, host and directory of the first entry
    pub base_url: String,
    /// Catalog confidence of the page the list came from
    pub source_confidence: f32,
}

impl ChapterList {
    /// Build a list from extracted links, dropping duplicate URLs and
    /// numbering what is left.
    pub fn from_links(links: &[ChapterLink], source_confidence: f32) -> Self {
        let mut seen = HashSet::new();
        let entries: Vec<ChapterEntry> = links
            .iter()
            .filter(|link| seen.insert(link.normalized_url()))
            .enumerate()
            .map(|(index, link)| ChapterEntry {
                title: link.title.clone(),
                url: link.url.clone(),
                index,
            })
            .collect();

        let base_url = entries
            .first()
            .map(|e| base_url_of(&e.url))
            .unwrap_or_default();

        Self {
            entries,
            base_url,
            source_confidence,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChapterEntry> {
        self.entries.get(index)
    }
}

/// `scheme://host/dir/` of a URL: the path with its last segment removed.
///
/// URLs that do not parse fall back to cutting at the last `/`.
pub fn base_url_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let path = parsed.path();
            let dir = match path.rfind('/') {
                Some(pos) => path[..=pos].to_string(),
                None => "/".to_string(),
            };
            parsed.set_path(&dir);
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => {
            let url = url.split(['?', '#']).next().unwrap_or(url);
            match url.rfind('/') {
                Some(pos) => url[..=pos].to_string(),
                None => String::new(),
            }
        }
    }
}

/// What goes to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCatalog {
    pub base_url: String,
    /// Unix seconds
    pub saved_at: u64,
    pub source_confidence: f32,
    pub entries: Vec<ChapterEntry>,
}

impl StoredCatalog {
    fn from_list(list: &ChapterList) -> Self {
        Self {
            base_url: list.base_url.clone(),
            saved_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            source_confidence: list.source_confidence,
            entries: list.entries.clone(),
        }
    }

    fn into_list(self) -> ChapterList {
        ChapterList {
            entries: self.entries,
            base_url: self.base_url,
            source_confidence: self.source_confidence,
        }
    }
}

/// Persistence backend for the catalog cache
pub trait CatalogStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredCatalog>>;
    fn save(&self, catalog: &StoredCatalog) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Catalog persisted as JSON in the platform data directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location, if the platform has a data directory
    pub fn default_location() -> Option<Self> {
        ProjectDirs::from("com", "folio", "folio")
            .map(|dirs| Self::new(dirs.data_dir().join("catalog.json")))
    }
}

impl CatalogStore for JsonFileStore {
    fn load(&self) -> Result<Option<StoredCatalog>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, catalog: &StoredCatalog) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(catalog)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-process store; nothing outlives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: Mutex<Option<StoredCatalog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<StoredCatalog>> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CatalogStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredCatalog>> {
        Ok(self.slot().clone())
    }

    fn save(&self, catalog: &StoredCatalog) -> Result<()> {
        *self.slot() = Some(catalog.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// Orders background writes to a store.
///
/// Every save or clear takes a new generation. A save runs under `lock` and
/// only if no later generation was issued in the meantime, so the store
/// always ends up holding the newest list.
#[derive(Debug, Default)]
struct WriteOrder {
    latest: AtomicU64,
    lock: Mutex<()>,
}

impl WriteOrder {
    fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == generation
    }

    fn hold(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide chapter list cache
pub struct CatalogCache {
    current: RwLock<Option<Arc<ChapterList>>>,
    store: Arc<dyn CatalogStore>,
    writes: Arc<WriteOrder>,
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("current", &self.get().map(|l| l.len()))
            .finish()
    }
}

impl CatalogCache {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            current: RwLock::new(None),
            store,
            writes: Arc::new(WriteOrder::default()),
        }
    }

    /// Cache backed by memory only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Cache backed by the default JSON file, or memory when the platform
    /// has no data directory
    pub fn persistent() -> Self {
        match JsonFileStore::default_location() {
            Some(store) => Self::new(Arc::new(store)),
            None => {
                warn!("No data directory available, catalog will not persist");
                Self::in_memory()
            }
        }
    }

    pub fn get(&self) -> Option<Arc<ChapterList>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Offer a freshly extracted list. Returns the list now cached, if the
    /// offer replaced the previous one.
    pub fn put(&self, links: &[ChapterLink], confidence: f32) -> Option<Arc<ChapterList>> {
        if links.len() < MIN_CATALOG_LINKS {
            debug!("Ignoring catalog with {} links", links.len());
            return None;
        }

        let list = ChapterList::from_links(links, confidence);
        if list.len() < MIN_CATALOG_LINKS {
            return None;
        }

        let replace = match self.get() {
            None => true,
            Some(cached) => {
                cached.is_empty()
                    || cached.base_url != list.base_url
                    || confidence >= cached.source_confidence
            }
        };
        if !replace {
            debug!(
                "Keeping cached catalog (confidence {:.2} > {:.2})",
                self.get().map(|c| c.source_confidence).unwrap_or_default(),
                confidence
            );
            return None;
        }

        let list = Arc::new(list);
        self.set(Some(list.clone()));
        info!(
            "Cached catalog of {} chapters from {}",
            list.len(),
            list.base_url
        );
        self.persist(&list);
        Some(list)
    }

    /// Cached list, loading the persisted one on first use
    pub fn get_or_load(&self) -> Option<Arc<ChapterList>> {
        if let Some(list) = self.get() {
            return Some(list);
        }

        match self.store.load() {
            Ok(Some(stored)) => {
                let list = Arc::new(stored.into_list());
                debug!("Loaded persisted catalog of {} chapters", list.len());
                self.set(Some(list.clone()));
                Some(list)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load persisted catalog: {}", e);
                None
            }
        }
    }

    /// Drop the cached list and its persisted copy
    pub fn clear(&self) -> Result<()> {
        self.set(None);
        // Saves still queued see a newer generation and skip
        self.writes.issue();
        let _guard = self.writes.hold();
        self.store.clear()
    }

    fn set(&self, list: Option<Arc<ChapterList>>) {
        match self.current.write() {
            Ok(mut guard) => *guard = list,
            Err(poisoned) => *poisoned.into_inner() = list,
        }
    }

    fn persist(&self, list: &ChapterList) {
        let stored = StoredCatalog::from_list(list);
        let store = self.store.clone();
        let writes = self.writes.clone();
        let generation = writes.issue();
        let write = move || {
            let _guard = writes.hold();
            if !writes.is_latest(generation) {
                debug!("Skipping stale catalog write {}", generation);
                return;
            }
            if let Err(e) = store.save(&stored) {
                warn!("Failed to persist catalog: {}", e);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(host: &str, count: usize) -> Vec<ChapterLink> {
        (1..=count)
            .map(|n| ChapterLink::new(format!("第{}章", n), format!("https://{}/book/42/{}.html", host, n)))
            .collect()
    }

    #[test]
    fn test_from_links_dedups_and_numbers() {
        let mut input = links("e.com", 4);
        input.insert(2, ChapterLink::new("again", "https://e.com/book/42/1.html#top"));
        let list = ChapterList::from_links(&input, 0.6);

        assert_eq!(list.len(), 4);
        let indices: Vec<usize> = list.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(list.base_url, "https://e.com/book/42/");
    }

    #[test]
    fn test_base_url_of() {
        assert_eq!(base_url_of("https://e.com/book/42/10.html?v=2"), "https://e.com/book/42/");
        assert_eq!(base_url_of("https://e.com/read.php?id=4"), "https://e.com/");
        assert_eq!(base_url_of("/book/42/10.html"), "/book/42/");
    }

    #[test]
    fn test_put_requires_three_links() {
        let cache = CatalogCache::in_memory();
        assert!(cache.put(&links("e.com", 2), 0.9).is_none());
        assert!(cache.get().is_none());
        assert!(cache.put(&links("e.com", 3), 0.9).is_some());
    }

    #[test]
    fn test_replacement_rules() {
        let cache = CatalogCache::in_memory();
        cache.put(&links("e.com", 10), 0.6);

        // Lower confidence, same book: kept
        assert!(cache.put(&links("e.com", 5), 0.4).is_none());
        assert_eq!(cache.get().map(|l| l.len()), Some(10));

        // Equal confidence: replaced
        assert!(cache.put(&links("e.com", 8), 0.6).is_some());
        assert_eq!(cache.get().map(|l| l.len()), Some(8));

        // Different book: replaced whatever the confidence
        assert!(cache.put(&links("other.com", 4), 0.1).is_some());
        assert_eq!(
            cache.get().map(|l| l.base_url.clone()),
            Some("https://other.com/book/42/".to_string())
        );
    }

    #[test]
    fn test_persist_and_reload_through_store() {
        let store: Arc<dyn CatalogStore> = Arc::new(MemoryStore::new());
        let cache = CatalogCache::new(store.clone());
        let cached = cache.put(&links("e.com", 5), 0.7).expect("cached");

        let fresh = CatalogCache::new(store);
        assert!(fresh.get().is_none());
        assert_eq!(fresh.get_or_load().as_deref(), Some(&*cached));
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("folio-catalog-{}", std::process::id()))
            .join("catalog.json");
        let store = JsonFileStore::new(&path);

        let list = ChapterList::from_links(&links("e.com", 6), 0.45);
        let stored = StoredCatalog::from_list(&list);
        store.save(&stored).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(loaded.into_list(), list);

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn test_clear_keeps_nothing() {
        let cache = CatalogCache::in_memory();
        cache.put(&links("e.com", 4), 0.5);
        cache.clear().unwrap();
        assert!(cache.get().is_none());
        assert!(cache.get_or_load().is_none());
    }

    #[tokio::test]
    async fn test_put_inside_runtime_persists_in_background() {
        let store = Arc::new(MemoryStore::new());
        let cache = CatalogCache::new(store.clone());
        cache.put(&links("e.com", 3), 0.5);

        for _ in 0..50 {
            if store.load().unwrap().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(store.load().unwrap().map(|c| c.entries.len()), Some(3));
    }

    /// Memory store whose first save is slow, so a later save can overtake it
    #[derive(Default)]
    struct SlowFirstStore {
        inner: MemoryStore,
        saves: AtomicU64,
    }

    impl CatalogStore for SlowFirstStore {
        fn load(&self) -> Result<Option<StoredCatalog>> {
            self.inner.load()
        }

        fn save(&self, catalog: &StoredCatalog) -> Result<()> {
            if self.saves.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            self.inner.save(catalog)
        }

        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
    }

    async fn settle_writes() {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_newest_list_wins_on_disk() {
        let store = Arc::new(SlowFirstStore::default());
        let cache = CatalogCache::new(store.clone());

        cache.put(&links("e.com", 5), 0.4);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cache.put(&links("e.com", 30), 0.8);
        settle_writes().await;

        assert_eq!(store.load().unwrap().map(|c| c.entries.len()), Some(30));
        let fresh = CatalogCache::new(store);
        assert_eq!(fresh.get_or_load().map(|l| l.len()), Some(30));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clear_is_not_undone_by_pending_save() {
        let store = Arc::new(SlowFirstStore::default());
        let cache = CatalogCache::new(store.clone());

        cache.put(&links("e.com", 5), 0.4);
        cache.put(&links("e.com", 6), 0.5);
        cache.clear().unwrap();
        settle_writes().await;

        assert!(store.load().unwrap().is_none());
        assert!(CatalogCache::new(store).get_or_load().is_none());
    }

    #[test]
    fn test_memory_store_survives_poisoned_lock() {
        let store = Arc::new(MemoryStore::new());
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.catalog.lock().unwrap();
            panic!("writer died");
        })
        .join();

        let list = ChapterList::from_links(&links("e.com", 3), 0.5);
        store.save(&StoredCatalog::from_list(&list)).unwrap();
        assert_eq!(store.load().unwrap().map(|c| c.entries.len()), Some(3));
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
