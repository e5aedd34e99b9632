// Test fakes for the site job and scheduler.
//
// One fake per collaborator seam:
// - MockFetcher (PageFetcher): URL -> text, scripted sequences, in-flight tracking
// - MockClassifier (RelevanceClassifier): fixed verdict, failure or delay
// - RecordingNotifier (NotifyBackend): captures notices
// - MemoryBaselineStore (BaselineStore): HashMap with write counting

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;

use pagewatch_common::{Baseline, Goal, Notice, NoticeKind, SiteConfig};

use crate::notify::backend::NotifyBackend;
use crate::store::{BaselineStore, StoreError};
use crate::traits::{ClassifierVerdict, FetchError, FetchRequest, PageFetcher, RelevanceClassifier};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Returns scripted results per URL, then the URL's fixed text.
/// Unregistered URLs fail with `NavigationFailed`.
pub struct MockFetcher {
    pages: Mutex<HashMap<String, String>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    active_urls: Mutex<HashMap<String, usize>>,
    overlaps: AtomicUsize,
    log: Mutex<Vec<(String, Instant)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            active_urls: Mutex::new(HashMap::new()),
            overlaps: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn on_url(self, url: &str, text: &str) -> Self {
        self.set_page(url, text);
        self
    }

    pub fn script(self, url: &str, results: Vec<Result<String, FetchError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), results.into());
        self
    }

    /// Every fetch sleeps this long, so concurrent jobs overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Change what a URL returns from now on.
    pub fn set_page(&self, url: &str, text: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), text.to_string());
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Times a fetch started for a URL that already had one running.
    pub fn overlapping_fetches(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    /// Start time of the first fetch for each URL.
    pub fn first_fetch_at(&self, url: &str) -> Option<Instant> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, at)| *at)
    }

    fn next_result(&self, url: &str) -> Result<String, FetchError> {
        if let Some(queue) = self.scripts.lock().unwrap().get_mut(url) {
            if let Some(result) = queue.pop_front() {
                return result;
            }
        }
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NavigationFailed(format!("MockFetcher: nothing for {url}")))
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let now_running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now_running, Ordering::SeqCst);
        {
            let mut active = self.active_urls.lock().unwrap();
            let count = active.entry(request.url.clone()).or_insert(0);
            if *count > 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            *count += 1;
        }
        self.log
            .lock()
            .unwrap()
            .push((request.url.clone(), Instant::now()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.next_result(&request.url);

        if let Some(count) = self.active_urls.lock().unwrap().get_mut(&request.url) {
            *count -= 1;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// MockClassifier
// ---------------------------------------------------------------------------

enum Behaviour {
    Verdict(ClassifierVerdict),
    Fail(String),
}

/// Returns one fixed verdict (or failure) and records its inputs.
pub struct MockClassifier {
    behaviour: Behaviour,
    delay: Duration,
    calls: AtomicUsize,
    last_inputs: Mutex<Option<(String, String)>>,
}

impl MockClassifier {
    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_inputs: Mutex::new(None),
        }
    }

    pub fn relevant(reason: &str) -> Self {
        Self::with_behaviour(Behaviour::Verdict(ClassifierVerdict {
            relevant: true,
            reason: reason.to_string(),
            summary: String::new(),
        }))
    }

    pub fn irrelevant(reason: &str) -> Self {
        Self::with_behaviour(Behaviour::Verdict(ClassifierVerdict {
            relevant: false,
            reason: reason.to_string(),
            summary: String::new(),
        }))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_behaviour(Behaviour::Fail(message.to_string()))
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        if let Behaviour::Verdict(ref mut verdict) = self.behaviour {
            verdict.summary = summary.to_string();
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_inputs(&self) -> Option<(String, String)> {
        self.last_inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelevanceClassifier for MockClassifier {
    async fn classify(&self, old_text: &str, new_text: &str, _goal: &Goal) -> Result<ClassifierVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_inputs.lock().unwrap() = Some((old_text.to_string(), new_text.to_string()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behaviour {
            Behaviour::Verdict(ref verdict) => Ok(verdict.clone()),
            Behaviour::Fail(ref message) => bail!("{message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Captures every notice. `failing()` captures nothing and returns errors.
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            notices: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            notices: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }

    pub fn total(&self) -> usize {
        self.notices.lock().unwrap().len()
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotifier {
    async fn send(&self, notice: &Notice) -> Result<()> {
        if self.fail {
            bail!("RecordingNotifier: delivery failed");
        }
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryBaselineStore
// ---------------------------------------------------------------------------

/// In-memory baselines keyed by site id.
pub struct MemoryBaselineStore {
    records: Mutex<HashMap<String, Baseline>>,
    writes: AtomicUsize,
    fail_writes: bool,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            fail_writes: false,
        }
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn with_baseline(self, site_id: &str, baseline: Baseline) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(site_id.to_string(), baseline);
        self
    }

    pub fn get(&self, site_id: &str) -> Option<Baseline> {
        self.records.lock().unwrap().get(site_id).cloned()
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaselineStore for MemoryBaselineStore {
    async fn read(&self, site_id: &str) -> Result<Option<Baseline>, StoreError> {
        Ok(self.get(site_id))
    }

    async fn write(&self, site_id: &str, baseline: &Baseline) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Io(std::io::Error::other(
                "MemoryBaselineStore: write refused",
            )));
        }
        self.records
            .lock()
            .unwrap()
            .insert(site_id.to_string(), baseline.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strict site watching for "available" with fast test cadence.
pub fn test_site(id: &str, url: &str) -> SiteConfig {
    let mut site = SiteConfig::new(id, url);
    site.goal.description = "dinner for two on Friday".to_string();
    site.goal.keywords = vec!["available".to_string()];
    site.check_min = 0.001;
    site.check_max = 0.002;
    site
}
