//! Browser location and history surfaces.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use url::Url;

/// Query parameter the wallet appends to the return URL.
pub const TRANSACTION_HASHES_PARAM: &str = "transactionHashes";

/// Query parameter carrying the reference on the canonical success URL.
pub const SUCCESS_REF_PARAM: &str = "ref";

/// Capacity of the navigation event channel.
const NAVIGATION_CHANNEL_CAPACITY: usize = 16;

/// The page's location and history, as seen by the reconciler.
pub trait BrowserHistory: Send + Sync {
    /// Current URL.
    fn location(&self) -> Url;

    /// Replace the current history entry without adding a new one.
    fn replace_state(&self, url: Url);

    /// Navigation events (the `popstate` analogue). Replacing state does not emit one.
    fn subscribe(&self) -> broadcast::Receiver<Url>;
}

/// In-process [`BrowserHistory`].
#[derive(Debug)]
pub struct MemoryHistory {
    location: Mutex<Url>,
    events: broadcast::Sender<Url>,
    replacements: AtomicUsize,
}

impl MemoryHistory {
    pub fn new(initial: Url) -> Self {
        let (events, _) = broadcast::channel(NAVIGATION_CHANNEL_CAPACITY);
        Self {
            location: Mutex::new(initial),
            events,
            replacements: AtomicUsize::new(0),
        }
    }

    /// Move to `url` as an external navigation would, notifying subscribers.
    pub fn navigate(&self, url: Url) {
        self.set_location(url.clone());
        // No subscribers is fine; polling still picks the change up.
        let _ = self.events.send(url);
    }

    /// Number of `replace_state` calls so far.
    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }

    fn set_location(&self, url: Url) {
        match self.location.lock() {
            Ok(mut location) => *location = url,
            Err(poisoned) => *poisoned.into_inner() = url,
        }
    }
}

impl BrowserHistory for MemoryHistory {
    fn location(&self) -> Url {
        match self.location.lock() {
            Ok(location) => location.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_state(&self, url: Url) {
        self.replacements.fetch_add(1, Ordering::SeqCst);
        self.set_location(url);
    }

    fn subscribe(&self) -> broadcast::Receiver<Url> {
        self.events.subscribe()
    }
}

/// First transaction reference appended by a wallet, if any.
pub fn transaction_reference(url: &Url) -> Option<String> {
    query_value(url, TRANSACTION_HASHES_PARAM).and_then(|hashes| first_reference(&hashes))
}

/// Reference carried by a success-view URL.
///
/// Accepts both the canonical `ref` parameter and a raw wallet parameter.
pub fn success_reference(url: &Url) -> Option<String> {
    query_value(url, SUCCESS_REF_PARAM)
        .and_then(|r| first_reference(&r))
        .or_else(|| transaction_reference(url))
}

/// Whether `url` already points at the success view.
///
/// Paths are compared segment by segment, and the success path may sit under
/// a base path. A root success path matches only the root.
pub fn is_success_view(url: &Url, success_path: &str) -> bool {
    let wanted = path_segments(success_path);
    let actual = path_segments(url.path());
    if wanted.is_empty() {
        return actual.is_empty();
    }
    actual.ends_with(&wanted)
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// The canonical success URL for `reference`, dropping every other query parameter.
pub fn canonical_success_url(current: &Url, success_path: &str, reference: &str) -> Url {
    let mut url = current.clone();
    url.set_path(success_path);
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut().append_pair(SUCCESS_REF_PARAM, reference);
    url
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn first_reference(raw: &str) -> Option<String> {
    raw.split(',')
        .map(str::trim)
        .find(|r| !r.is_empty())
        .map(String::from)
}
