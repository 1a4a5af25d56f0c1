//! Concurrency tests for the crawler
//!
//! These tests check that deduplication, politeness and stage-kind checks
//! hold regardless of how many workers run.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use trawl::config::{Config, PolitenessScope};
use trawl::crawler::{
    extractor_fn, ConcurrencyModel, CrawlContext, Extraction, Extractor, Fetch, Response,
    StageKind,
};
use trawl::output::ItemProcessor;
use trawl::{FetchError, Item, NormalizedUrl, TrawlError, VisitationLedger};

/// Fully connected in-memory site that records when each fetch starts
struct MeshSite {
    pages: usize,
    starts: Mutex<Vec<(String, Instant)>>,
}

impl MeshSite {
    fn new(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            starts: Mutex::new(Vec::new()),
        })
    }

    fn body(&self) -> String {
        // Every page links to every page, in varying spellings of the same URL
        (0..self.pages)
            .flat_map(|i| {
                [
                    format!(r#"<a href="/page/{}">{}</a>"#, i, i),
                    format!(r#"<a href="http://MESH.test:80/page/{}/">{}</a>"#, i, i),
                    format!(r##"<a href="/page/{}#top">{}</a>"##, i, i),
                ]
            })
            .collect()
    }

    fn starts(&self) -> Vec<(String, Instant)> {
        self.starts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for MeshSite {
    async fn fetch(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        self.starts
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        // Yield so workers interleave mid-fetch
        tokio::task::yield_now().await;

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        Ok(Response::new(
            url.clone(),
            url.as_url().clone(),
            200,
            headers,
            self.body().into_bytes(),
            Duration::ZERO,
        ))
    }
}

fn create_test_config(seeds: &[String], worker_count: usize) -> Config {
    let mut config = Config::with_seeds(seeds.iter().cloned());
    config.robots.enabled = false;
    config.crawler.worker_count = worker_count;
    config
}

fn follow_links() -> impl Extractor {
    extractor_fn(|_ctx, response| {
        let mut extraction = Extraction::new();
        for link in response.links() {
            extraction = extraction.follow(link);
        }
        Ok(extraction)
    })
}

async fn crawl_mesh(worker_count: usize, frontier_bound: usize) {
    let pages = 30;
    let site = MeshSite::new(pages);

    let mut config = create_test_config(&["http://mesh.test/page/0".to_string()], worker_count);
    config.crawler.frontier_bound = frontier_bound;

    let crawler = trawl::Crawler::builder(config)
        .fetcher(site.clone())
        .extractor(follow_links())
        .build()
        .unwrap();
    let stats = crawler.run().await.unwrap();

    let mut fetched: Vec<String> = site.starts().into_iter().map(|(url, _)| url).collect();
    let total = fetched.len();
    fetched.sort();
    fetched.dedup();

    assert_eq!(total, pages, "worker_count={}: duplicate fetches", worker_count);
    assert_eq!(fetched.len(), pages);
    assert_eq!(stats.requests_attempted, pages as u64);
    assert_eq!(crawler.ledger().followed().len(), pages);
    assert_eq!(crawler.ledger().reachable().len(), pages);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dedup_single_worker() {
    crawl_mesh(1, 1024).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dedup_four_workers() {
    crawl_mesh(4, 1024).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dedup_sixteen_workers() {
    crawl_mesh(16, 1024).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dedup_with_tiny_frontier() {
    // Backpressure on a full frontier must not deadlock or duplicate
    crawl_mesh(4, 1).await;
}

/// Randomly shaped site with per-page fetch latency
struct RandomSite {
    links: Vec<Vec<(usize, u8)>>,
    latency: Vec<Duration>,
    fetched: Mutex<Vec<String>>,
}

impl RandomSite {
    fn generate(rng: &mut StdRng) -> Arc<Self> {
        let pages: usize = rng.gen_range(5..40);
        let links: Vec<Vec<(usize, u8)>> = (0..pages)
            .map(|_| {
                let out: usize = rng.gen_range(0..8);
                (0..out)
                    .map(|_| (rng.gen_range(0..pages), rng.gen_range(0..4u8)))
                    .collect::<Vec<_>>()
            })
            .collect();
        let latency: Vec<Duration> = (0..pages)
            .map(|_| Duration::from_micros(rng.gen_range(0..3000)))
            .collect();
        Arc::new(Self {
            links,
            latency,
            fetched: Mutex::new(Vec::new()),
        })
    }

    /// Pages reachable from page 0
    fn reachable(&self) -> BTreeSet<usize> {
        let mut seen = BTreeSet::from([0]);
        let mut queue = VecDeque::from([0]);
        while let Some(page) = queue.pop_front() {
            for &(target, _) in &self.links[page] {
                if seen.insert(target) {
                    queue.push_back(target);
                }
            }
        }
        seen
    }

    fn body(&self, page: usize) -> String {
        self.links[page]
            .iter()
            .map(|&(target, spelling)| {
                let href = match spelling {
                    0 => format!("/page/{}", target),
                    1 => format!("http://RANDOM.test:80/page/{}/", target),
                    2 => format!("/page/{}#top", target),
                    _ => format!("../page/{}", target),
                };
                format!(r#"<a href="{}">{}</a>"#, href, target)
            })
            .collect()
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for RandomSite {
    async fn fetch(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());

        let page = url
            .path()
            .strip_prefix("/page/")
            .and_then(|index| index.parse::<usize>().ok())
            .filter(|index| *index < self.links.len());
        let (status, body) = match page {
            Some(page) => {
                tokio::time::sleep(self.latency[page]).await;
                (200, self.body(page))
            }
            None => (404, String::new()),
        };

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        Ok(Response::new(
            url.clone(),
            url.as_url().clone(),
            status,
            headers,
            body.into_bytes(),
            Duration::ZERO,
        ))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dedup_over_random_graphs_and_latencies() {
    for seed in 0..8u64 {
        for worker_count in [1, 4, 16] {
            let mut rng = StdRng::seed_from_u64(seed);
            let site = RandomSite::generate(&mut rng);
            let expected: Vec<String> = site
                .reachable()
                .into_iter()
                .map(|page| format!("http://random.test/page/{}", page))
                .collect();

            let mut config =
                create_test_config(&["http://random.test/page/0".to_string()], worker_count);
            config.crawler.frontier_bound = rng.gen_range(1..=8);

            let crawler = trawl::Crawler::builder(config)
                .fetcher(site.clone())
                .extractor(follow_links())
                .build()
                .unwrap();
            let stats = crawler.run().await.unwrap();

            let mut fetched = site.fetched();
            fetched.sort();
            let context = format!("seed={} worker_count={}", seed, worker_count);
            assert_eq!(
                fetched.iter().collect::<BTreeSet<_>>().len(),
                fetched.len(),
                "{}: duplicate fetches",
                context
            );
            let fetched: BTreeSet<String> = fetched.into_iter().collect();
            let expected: BTreeSet<String> = expected.into_iter().collect();
            assert_eq!(fetched, expected, "{}", context);
            assert_eq!(stats.requests_attempted, expected.len() as u64, "{}", context);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_try_mark_followed_exactly_once_per_url() {
    let ledger = Arc::new(VisitationLedger::new());
    let spellings = |i: usize| {
        [
            format!("http://race.test/{}", i),
            format!("HTTP://Race.Test:80/{}/", i),
            format!("http://race.test/{}#frag", i),
        ]
    };

    let mut handles = Vec::new();
    for worker in 0..16 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let mut won = Vec::new();
            for i in 0..50 {
                for raw in spellings((i + worker) % 50) {
                    let url = NormalizedUrl::normalize(&raw).unwrap();
                    if ledger.try_mark_followed(&url) {
                        won.push(url);
                    }
                    tokio::task::yield_now().await;
                }
            }
            won
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        winners.extend(handle.await.unwrap());
    }

    assert_eq!(winners.len(), 50);
    winners.sort();
    winners.dedup();
    assert_eq!(winners.len(), 50);
}

#[tokio::test(start_paused = true)]
async fn test_politeness_spacing_with_many_workers() {
    let delay = Duration::from_millis(200);
    let site = MeshSite::new(0);

    let seeds: Vec<String> = (0..50)
        .map(|i| format!("http://polite.test/target/{}", i))
        .collect();
    let mut config = create_test_config(&seeds, 8);
    config.crawler.min_request_delay = 200;
    config.crawler.max_request_delay = 200;
    config.crawler.politeness_scope = PolitenessScope::Host;

    let crawler = trawl::Crawler::builder(config)
        .fetcher(site.clone())
        .extractor(extractor_fn(|_, _| Ok(Extraction::new())))
        .build()
        .unwrap();
    let stats = crawler.run().await.unwrap();
    assert_eq!(stats.requests_attempted, 50);

    let mut starts: Vec<Instant> = site.starts().into_iter().map(|(_, at)| at).collect();
    starts.sort();
    assert_eq!(starts.len(), 50);
    for pair in starts.windows(2) {
        assert!(
            pair[1] - pair[0] >= delay,
            "requests started {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_politeness_hosts_do_not_wait_on_each_other() {
    let site = MeshSite::new(0);
    let seeds = vec![
        "http://one.test/".to_string(),
        "http://two.test/".to_string(),
        "http://three.test/".to_string(),
    ];
    let mut config = create_test_config(&seeds, 3);
    config.crawler.min_request_delay = 1000;
    config.crawler.max_request_delay = 1000;

    let crawler = trawl::Crawler::builder(config)
        .fetcher(site.clone())
        .extractor(extractor_fn(|_, _| Ok(Extraction::new())))
        .build()
        .unwrap();
    crawler.run().await.unwrap();

    // First requests to distinct hosts start together
    let starts: Vec<Instant> = site.starts().into_iter().map(|(_, at)| at).collect();
    let first = starts.iter().min().copied().unwrap();
    let last = starts.iter().max().copied().unwrap();
    assert!(last - first < Duration::from_millis(1000));
}

/// Single-host site whose robots.txt sets a crawl pace
struct PacedSite {
    robots: &'static str,
    starts: Mutex<Vec<(String, Instant)>>,
}

impl PacedSite {
    fn new(robots: &'static str) -> Arc<Self> {
        Arc::new(Self {
            robots,
            starts: Mutex::new(Vec::new()),
        })
    }

    /// Start times of page fetches, robots.txt excluded, in order
    fn page_starts(&self) -> Vec<Instant> {
        let mut starts: Vec<Instant> = self
            .starts
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| !url.ends_with("/robots.txt"))
            .map(|(_, at)| *at)
            .collect();
        starts.sort();
        starts
    }
}

#[async_trait]
impl Fetch for PacedSite {
    async fn fetch(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        self.starts
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let (content_type, body) = if url.path() == "/robots.txt" {
            ("text/plain", self.robots.to_string())
        } else {
            ("text/html", "<html></html>".to_string())
        };
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        Ok(Response::new(
            url.clone(),
            url.as_url().clone(),
            200,
            headers,
            body.into_bytes(),
            Duration::ZERO,
        ))
    }
}

async fn crawl_paced(robots: &'static str, pages: usize) -> Vec<Instant> {
    let site = PacedSite::new(robots);
    let seeds: Vec<String> = (0..pages)
        .map(|i| format!("http://paced.test/page/{}", i))
        .collect();

    let mut config = create_test_config(&seeds, 4);
    config.robots.enabled = true;
    config.crawler.min_request_delay = 0;
    config.crawler.max_request_delay = 0;
    config.crawler.politeness_scope = PolitenessScope::Host;

    let crawler = trawl::Crawler::builder(config)
        .fetcher(site.clone())
        .extractor(extractor_fn(|_, _| Ok(Extraction::new())))
        .build()
        .unwrap();
    let stats = crawler.run().await.unwrap();
    assert_eq!(stats.requests_attempted, pages as u64);
    assert_eq!(stats.robots_rejected, 0);

    site.page_starts()
}

#[tokio::test(start_paused = true)]
async fn test_robots_crawl_delay_paces_host() {
    let starts = crawl_paced("User-agent: *\nCrawl-delay: 1\n", 5).await;

    assert_eq!(starts.len(), 5);
    for pair in starts.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_secs(1),
            "requests started {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_robots_request_rate_paces_host() {
    // Two requests per second: one every 500ms
    let starts = crawl_paced("User-agent: *\nRequest-rate: 2/1s\n", 4).await;

    assert_eq!(starts.len(), 4);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }
}

struct SuspendingProcessor;

#[async_trait]
impl ItemProcessor for SuspendingProcessor {
    fn name(&self) -> &str {
        "slow-enricher"
    }

    fn kind(&self) -> StageKind {
        StageKind::Suspending
    }

    async fn process(&self, item: Item) -> Option<Item> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Some(item)
    }
}

struct SuspendingExtractor;

#[async_trait]
impl Extractor for SuspendingExtractor {
    fn name(&self) -> &str {
        "remote-extractor"
    }

    fn kind(&self) -> StageKind {
        StageKind::Suspending
    }

    async fn extract(&self, _ctx: &CrawlContext, _response: &Response) -> anyhow::Result<Extraction> {
        tokio::task::yield_now().await;
        Ok(Extraction::new())
    }
}

fn cooperative_config() -> Config {
    let mut config = create_test_config(&["http://stage.test/".to_string()], 2);
    config.crawler.concurrency_model = ConcurrencyModel::Cooperative;
    config
}

#[test]
fn test_cooperative_rejects_suspending_processor() {
    let result = trawl::Crawler::builder(cooperative_config())
        .fetcher(MeshSite::new(0))
        .processor(SuspendingProcessor)
        .build();

    match result {
        Err(e @ TrawlError::IncompatibleStageKind { .. }) => {
            assert_eq!(
                e.to_string(),
                "Stage 'slow-enricher' is suspending but the run uses the cooperative concurrency model"
            );
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("suspending processor accepted by a cooperative run"),
    }
}

#[test]
fn test_cooperative_rejects_suspending_extractor() {
    let result = trawl::Crawler::builder(cooperative_config())
        .fetcher(MeshSite::new(0))
        .extractor(SuspendingExtractor)
        .build();

    assert!(matches!(
        result,
        Err(TrawlError::IncompatibleStageKind { ref stage, .. }) if stage == "remote-extractor"
    ));
}

#[tokio::test]
async fn test_async_model_accepts_suspending_stages() {
    let mut config = cooperative_config();
    config.crawler.concurrency_model = ConcurrencyModel::Async;

    let crawler = trawl::Crawler::builder(config)
        .fetcher(MeshSite::new(0))
        .processor(SuspendingProcessor)
        .extractor(SuspendingExtractor)
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();
    assert_eq!(stats.requests_succeeded, 1);
}
