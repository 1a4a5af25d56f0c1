//! Integration tests for the crawler
//!
//! These tests run complete crawls, against wiremock servers for the HTTP
//! path and against an in-memory site where exact control is needed.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use trawl::config::Config;
use trawl::crawler::{extractor_fn, middleware_fn, Crawler, Extraction, Fetch, Response};
use trawl::output::{processor_fn, MemorySink, MessagePackSink, RecordReader};
use trawl::{FetchError, Item, NormalizedUrl, RunState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory site: fixed pages, everything else is a 404
struct StubSite {
    pages: HashMap<String, String>,
    delay: Duration,
    fetched: Mutex<Vec<String>>,
    serials: Mutex<Vec<u64>>,
    trace: Option<Arc<Mutex<Vec<String>>>>,
}

impl StubSite {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            delay: Duration::ZERO,
            fetched: Mutex::new(Vec::new()),
            serials: Mutex::new(Vec::new()),
            trace: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_trace(mut self, trace: Arc<Mutex<Vec<String>>>) -> Self {
        self.trace = Some(trace);
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for StubSite {
    async fn fetch(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(trace) = &self.trace {
            trace.lock().unwrap().push("base".to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let (status, body) = match self.pages.get(url.as_str()) {
            Some(body) => (200, body.clone()),
            None => (404, String::new()),
        };
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());

        let response = Response::new(
            url.clone(),
            url.as_url().clone(),
            status,
            headers,
            body.into_bytes(),
            Duration::ZERO,
        );
        self.serials.lock().unwrap().push(response.serial());
        Ok(response)
    }
}

/// Creates a test configuration with robots checking disabled
fn create_test_config(seeds: &[&str]) -> Config {
    let mut config = Config::with_seeds(seeds.iter().copied());
    config.robots.enabled = false;
    config
}

/// A 200 response with an HTML body
fn html_page(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html")
}

fn item(value: serde_json::Value) -> Item {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("item must be a JSON object"),
    }
}

#[tokio::test]
async fn test_end_to_end_two_pages() {
    let site = Arc::new(StubSite::new(&[
        ("http://example.test/p1", "<html>p1</html>"),
        ("http://example.test/p2", "<html>p2</html>"),
    ]));
    let sink = Arc::new(MemorySink::new());

    // Robots stays enabled: robots.txt is a 404 here, which allows everything
    let config = Config::with_seeds(["http://example.test/p1"]);

    let crawler = Crawler::builder(config)
        .fetcher(site.clone())
        .extractor(extractor_fn(|ctx, _response| {
            if ctx.url.path() == "/p1" {
                Ok(Extraction::new()
                    .item(item(json!({"a": 1})))
                    .follow("http://example.test/p2"))
            } else {
                Ok(Extraction::new())
            }
        }))
        .sink(sink.clone())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.state, RunState::Finished);
    assert_eq!(crawler.state(), RunState::Finished);
    assert_eq!(stats.requests_attempted, 2);
    assert_eq!(stats.requests_succeeded, 2);
    assert_eq!(stats.items_saved, 1);
    assert_eq!(sink.items(), vec![item(json!({"a": 1}))]);

    // robots.txt went through the base fetcher but is not a crawl request
    assert_eq!(
        site.fetched(),
        vec![
            "http://example.test/robots.txt",
            "http://example.test/p1",
            "http://example.test/p2"
        ]
    );
}

#[tokio::test]
async fn test_full_crawl_over_http() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><head><title>Home</title></head><body>
            <a href="/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="https://elsewhere.test/">Elsewhere</a>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    for page in ["/page1", "/page2"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(html_page(format!(
                r#"<html><head><title>{}</title></head><body><a href="/">Home</a></body></html>"#,
                page
            )))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let sink = Arc::new(MemorySink::new());
    let crawler = Crawler::builder(Config::with_seeds([format!("{}/", base_url)]))
        .sink(sink.clone())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.requests_attempted, 3);
    assert_eq!(stats.requests_succeeded, 3);
    assert_eq!(stats.items_saved, 3);
    assert_eq!(crawler.ledger().reachable().len(), 3);

    let titles: Vec<_> = sink
        .items()
        .iter()
        .map(|item| item["title"].clone())
        .collect();
    assert!(titles.contains(&json!("Home")));
    assert!(titles.contains(&json!("/page1")));
}

#[tokio::test]
async fn test_robots_txt_exclusion() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/public">public</a><a href="/private">private</a>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html_page(""))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Must never be requested
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder(Config::with_seeds([format!("{}/", base_url)]))
        .build()
        .unwrap();
    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.robots_rejected, 1);
    assert_eq!(stats.requests_attempted, 2);

    let private = NormalizedUrl::normalize(&format!("{}/private", base_url)).unwrap();
    let ledger = crawler.ledger();
    assert!(ledger.robot_excluded().contains(&private));
    assert!(!ledger.reachable().contains(&private));
    assert_eq!(ledger.attempts(&private), 0);
}

#[tokio::test]
async fn test_robots_disabled_never_fetches_robots() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/private">private</a>"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(html_page(""))
        .expect(1)
        .mount(&mock_server)
        .await;

    let seed = format!("{}/", base_url);
    let crawler = Crawler::builder(create_test_config(&[seed.as_str()]))
        .build()
        .unwrap();
    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.robots_rejected, 0);
    assert_eq!(stats.requests_succeeded, 2);
    assert!(crawler.ledger().robot_excluded().is_empty());
}

#[tokio::test]
async fn test_middleware_order_and_passthrough() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let site = Arc::new(
        StubSite::new(&[("http://example.test/", "<html></html>")]).with_trace(Arc::clone(&trace)),
    );

    let seen_by_middleware = Arc::new(Mutex::new(Vec::new()));
    let seen_by_extractor = Arc::new(Mutex::new(Vec::new()));

    let layer = |label: &'static str| {
        let trace = Arc::clone(&trace);
        let seen = Arc::clone(&seen_by_middleware);
        middleware_fn(label, move |url, next| {
            let trace = Arc::clone(&trace);
            let seen = Arc::clone(&seen);
            async move {
                trace.lock().unwrap().push(format!("{}-before", label));
                let result = next.run(&url).await;
                if let Ok(response) = &result {
                    seen.lock().unwrap().push(response.serial());
                }
                trace.lock().unwrap().push(format!("{}-after", label));
                result
            }
        })
    };

    let extractor_seen = Arc::clone(&seen_by_extractor);
    let crawler = Crawler::builder(create_test_config(&["http://example.test/"]))
        .fetcher(site.clone())
        .middleware(layer("A"))
        .middleware(layer("B"))
        .extractor(extractor_fn(move |_ctx, response| {
            extractor_seen.lock().unwrap().push(response.serial());
            Ok(Extraction::new())
        }))
        .build()
        .unwrap();

    crawler.run().await.unwrap();

    assert_eq!(
        *trace.lock().unwrap(),
        vec!["A-before", "B-before", "base", "B-after", "A-after"]
    );

    // Every layer and the extractor saw the response the base fetch produced
    let produced = site.serials.lock().unwrap().clone();
    assert_eq!(produced.len(), 1);
    assert_eq!(*seen_by_middleware.lock().unwrap(), vec![produced[0], produced[0]]);
    assert_eq!(*seen_by_extractor.lock().unwrap(), produced);
}

#[tokio::test]
async fn test_item_pipeline_drop_short_circuits() {
    let site = Arc::new(StubSite::new(&[("http://example.test/", "")]));
    let sink = Arc::new(MemorySink::new());
    let second_calls = Arc::new(Mutex::new(0));

    let counter = Arc::clone(&second_calls);
    let crawler = Crawler::builder(create_test_config(&["http://example.test/"]))
        .fetcher(site)
        .extractor(extractor_fn(|_, _| Ok(Extraction::new().item(item(json!({"a": 1}))))))
        .processor(processor_fn("drop", |_| None))
        .processor(processor_fn("count", move |item| {
            *counter.lock().unwrap() += 1;
            Some(item)
        }))
        .sink(sink.clone())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert!(sink.is_empty());
    assert_eq!(*second_calls.lock().unwrap(), 0);
    assert_eq!(stats.items_dropped, 1);
    assert_eq!(stats.items_saved, 0);
}

#[tokio::test]
async fn test_item_pipeline_mutations_apply_in_order() {
    let site = Arc::new(StubSite::new(&[("http://example.test/", "")]));
    let sink = Arc::new(MemorySink::new());

    let crawler = Crawler::builder(create_test_config(&["http://example.test/"]))
        .fetcher(site)
        .extractor(extractor_fn(|_, _| Ok(Extraction::new().item(item(json!({"log": []}))))))
        .processor(processor_fn("first", |mut item| {
            if let Some(log) = item.get_mut("log").and_then(|log| log.as_array_mut()) {
                log.push(json!("first"));
            }
            Some(item)
        }))
        .processor(processor_fn("second", |mut item| {
            if let Some(log) = item.get_mut("log").and_then(|log| log.as_array_mut()) {
                log.push(json!("second"));
            }
            Some(item)
        }))
        .sink(sink.clone())
        .build()
        .unwrap();

    crawler.run().await.unwrap();

    assert_eq!(sink.items(), vec![item(json!({"log": ["first", "second"]}))]);
}

#[tokio::test]
async fn test_records_replay_in_write_order() {
    let dir = TempDir::new().unwrap();
    let records = dir.path().join("items.mpk");

    let site = Arc::new(StubSite::new(&[
        ("http://example.test/0", r#"<a href="/1">next</a>"#),
        ("http://example.test/1", r#"<a href="/2">next</a>"#),
        ("http://example.test/2", ""),
    ]));

    let mut config = create_test_config(&["http://example.test/0"]);
    config.crawler.worker_count = 1;

    let crawler = Crawler::builder(config)
        .fetcher(site)
        .extractor(extractor_fn(|ctx, response| {
            let mut extraction =
                Extraction::new().item(item(json!({"url": ctx.url.as_str(), "depth": ctx.depth})));
            for link in response.links() {
                extraction = extraction.follow(link);
            }
            Ok(extraction)
        }))
        .sink(Arc::new(MessagePackSink::create(&records).await.unwrap()))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();
    assert_eq!(stats.items_saved, 3);

    let reader = RecordReader::open(&records).unwrap();
    let replayed: Vec<Item> = reader.records().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(
        replayed,
        vec![
            item(json!({"url": "http://example.test/0", "depth": 0})),
            item(json!({"url": "http://example.test/1", "depth": 1})),
            item(json!({"url": "http://example.test/2", "depth": 2})),
        ]
    );

    // A second pass replays the same records
    assert_eq!(reader.records().unwrap().count(), 3);
}

#[tokio::test]
async fn test_cancellation_drains_in_flight_work() {
    let site = Arc::new(
        StubSite::new(&[
            ("http://example.test/", r#"<a href="/a">a</a><a href="/b">b</a>"#),
            ("http://example.test/a", ""),
            ("http://example.test/b", ""),
        ])
        .with_delay(Duration::from_millis(300)),
    );
    let sink = Arc::new(MemorySink::new());

    let mut config = create_test_config(&["http://example.test/"]);
    config.crawler.worker_count = 1;

    let crawler = Crawler::builder(config)
        .fetcher(site.clone())
        .extractor(extractor_fn(|ctx, response| {
            let mut extraction = Extraction::new().item(item(json!({"url": ctx.url.as_str()})));
            for link in response.links() {
                extraction = extraction.follow(link);
            }
            Ok(extraction)
        }))
        .sink(sink.clone())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
    }

    let stats = crawler.run_with_cancellation(cancel).await.unwrap();

    // The seed was mid-fetch: it finishes and its item is delivered, but its
    // links are not followed
    assert_eq!(stats.state, RunState::Finished);
    assert_eq!(stats.requests_attempted, 1);
    assert_eq!(stats.items_saved, 1);
    assert_eq!(site.fetched(), vec!["http://example.test/"]);
    assert_eq!(sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_abandons_urls_waiting_for_politeness() {
    let site = Arc::new(StubSite::new(&[
        ("http://a.test/1", "<html>1</html>"),
        ("http://a.test/2", "<html>2</html>"),
    ]));

    let mut config = create_test_config(&["http://a.test/1", "http://a.test/2"]);
    config.crawler.worker_count = 2;
    config.crawler.min_request_delay = 2000;
    config.crawler.max_request_delay = 2000;

    let crawler = Crawler::builder(config)
        .fetcher(site.clone())
        .extractor(extractor_fn(|_, _| Ok(Extraction::new())))
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
    }

    let started = tokio::time::Instant::now();
    let stats = crawler.run_with_cancellation(cancel).await.unwrap();

    // The second URL was still waiting for its turn and is never fetched
    assert!(started.elapsed() < Duration::from_millis(2000));
    assert_eq!(stats.state, RunState::Finished);
    assert_eq!(stats.requests_attempted, 1);
    assert_eq!(site.fetched(), vec!["http://a.test/1"]);

    let second = NormalizedUrl::normalize("http://a.test/2").unwrap();
    assert_eq!(crawler.ledger().attempts(&second), 0);
    assert!(crawler.ledger().outcome(&second).is_none());
}

#[tokio::test]
async fn test_clearing_ledger_mid_run_is_tolerated() {
    let site = Arc::new(StubSite::new(&[
        ("http://example.test/a", r#"<a href="/b">b</a>"#),
        ("http://example.test/b", r#"<a href="/a">a</a>"#),
    ]));

    let crawler = Crawler::builder(create_test_config(&["http://example.test/a"]))
        .fetcher(site.clone())
        .extractor(extractor_fn(|ctx, response| {
            // Drop deduplication memory on every page
            ctx.ledger.clear_followed();
            let mut extraction = Extraction::new();
            for link in response.links() {
                extraction = extraction.follow(link);
            }
            Ok(extraction)
        }))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    // /a is re-enqueued after the clear but skipped because it already has an outcome
    assert_eq!(stats.state, RunState::Finished);
    assert_eq!(stats.requests_attempted, 2);
    assert_eq!(
        site.fetched(),
        vec!["http://example.test/a", "http://example.test/b"]
    );
}
