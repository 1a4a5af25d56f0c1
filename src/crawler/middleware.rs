//! Fetch middleware chain
//!
//! A middleware wraps the next-inner fetch capability and returns a
//! replacement. The pipeline is built once per run; the first registered
//! middleware ends up outermost, so its "before" logic runs first and its
//! "after" logic runs last.
//!
//! A middleware must call the inner fetch exactly once, with the URL it was
//! given, and hand back the response it received. Skipping the inner call or
//! substituting another response is a caller error the engine does not detect.

use crate::crawler::{Fetch, Response, SharedFetch, StageKind};
use crate::url::NormalizedUrl;
use crate::FetchError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// A transformation of the fetch capability
pub trait Middleware: Send + Sync {
    /// Name used in logs and stage-kind errors
    fn name(&self) -> &str;

    /// Whether the wrapper suspends on its own (beyond awaiting the inner fetch)
    fn kind(&self) -> StageKind;

    /// Wraps `inner` and returns the replacement fetch
    fn wrap(&self, inner: SharedFetch) -> SharedFetch;
}

/// Ordered list of middlewares
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware; it will wrap every middleware registered after it
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.stages.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Registered middlewares in registration order
    pub fn stages(&self) -> impl Iterator<Item = &Arc<dyn Middleware>> {
        self.stages.iter()
    }

    /// Composes the chain around `base`
    ///
    /// Applies the middlewares right to left, so the result is
    /// `first(second(...(last(base))))`.
    pub fn build(&self, base: SharedFetch) -> SharedFetch {
        self.stages
            .iter()
            .rev()
            .fold(base, |inner, middleware| {
                tracing::trace!("Wrapping fetch with middleware '{}'", middleware.name());
                middleware.wrap(inner)
            })
    }
}

/// Handle to the rest of the chain, passed to function middlewares
#[derive(Clone)]
pub struct Next {
    inner: SharedFetch,
}

impl Next {
    /// Calls the next-inner fetch
    pub async fn run(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        self.inner.fetch(url).await
    }
}

/// Middleware built from an async function of `(url, next)`
pub struct FnMiddleware<F> {
    name: String,
    f: Arc<F>,
}

/// Creates a suspending middleware from an async function
///
/// # Example
///
/// ```
/// use trawl::crawler::middleware_fn;
///
/// let logging = middleware_fn("logging", |url, next| async move {
///     tracing::info!("fetching {}", url);
///     let result = next.run(&url).await;
///     tracing::info!("done {}", url);
///     result
/// });
/// ```
pub fn middleware_fn<F, Fut>(name: impl Into<String>, f: F) -> FnMiddleware<F>
where
    F: Fn(NormalizedUrl, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, FetchError>> + Send + 'static,
{
    FnMiddleware {
        name: name.into(),
        f: Arc::new(f),
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(NormalizedUrl, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, FetchError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Suspending
    }

    fn wrap(&self, inner: SharedFetch) -> SharedFetch {
        Arc::new(FnFetch {
            f: Arc::clone(&self.f),
            next: Next { inner },
        })
    }
}

struct FnFetch<F> {
    f: Arc<F>,
    next: Next,
}

#[async_trait]
impl<F, Fut> Fetch for FnFetch<F>
where
    F: Fn(NormalizedUrl, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, FetchError>> + Send + 'static,
{
    async fn fetch(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        (self.f)(url.clone(), self.next.clone()).await
    }
}

/// Middleware built from synchronous before/after hooks
///
/// Hooks never suspend, so this kind is accepted by cooperative runs.
pub struct HookMiddleware<B, A> {
    name: String,
    hooks: Arc<Hooks<B, A>>,
}

struct Hooks<B, A> {
    before: B,
    after: A,
}

/// Creates a blocking middleware that observes each fetch
///
/// `before` runs before the inner fetch; `after` sees its result.
pub fn middleware_hooks<B, A>(name: impl Into<String>, before: B, after: A) -> HookMiddleware<B, A>
where
    B: Fn(&NormalizedUrl) + Send + Sync + 'static,
    A: Fn(&NormalizedUrl, &Result<Response, FetchError>) + Send + Sync + 'static,
{
    HookMiddleware {
        name: name.into(),
        hooks: Arc::new(Hooks { before, after }),
    }
}

impl<B, A> Middleware for HookMiddleware<B, A>
where
    B: Fn(&NormalizedUrl) + Send + Sync + 'static,
    A: Fn(&NormalizedUrl, &Result<Response, FetchError>) + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Blocking
    }

    fn wrap(&self, inner: SharedFetch) -> SharedFetch {
        Arc::new(HookFetch {
            hooks: Arc::clone(&self.hooks),
            inner,
        })
    }
}

struct HookFetch<B, A> {
    hooks: Arc<Hooks<B, A>>,
    inner: SharedFetch,
}

#[async_trait]
impl<B, A> Fetch for HookFetch<B, A>
where
    B: Fn(&NormalizedUrl) + Send + Sync + 'static,
    A: Fn(&NormalizedUrl, &Result<Response, FetchError>) + Send + Sync + 'static,
{
    async fn fetch(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        (self.hooks.before)(url);
        let result = self.inner.fetch(url).await;
        (self.hooks.after)(url, &result);
        result
    }
}
