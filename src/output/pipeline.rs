//! Item-processing pipeline
//!
//! Processors run in registration order over each scraped item. A processor
//! returning `None` drops the item: later processors do not run and nothing
//! reaches the sink.

use crate::crawler::StageKind;
use crate::Item;
use async_trait::async_trait;
use std::sync::Arc;

/// A transform or filter applied to an item before it is stored
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Name used in logs and stage-kind errors
    fn name(&self) -> &str;

    /// Whether `process` suspends
    fn kind(&self) -> StageKind;

    /// Returns the (possibly modified) item, or `None` to drop it
    async fn process(&self, item: Item) -> Option<Item>;
}

/// Processor built from a synchronous function
pub struct FnProcessor<F> {
    name: String,
    f: F,
}

/// Creates a blocking processor from a plain function
///
/// # Example
///
/// ```
/// use trawl::output::processor_fn;
///
/// let require_title = processor_fn("require-title", |item| {
///     if item.get("title").map_or(false, |title| !title.is_null()) {
///         Some(item)
///     } else {
///         None
///     }
/// });
/// ```
pub fn processor_fn<F>(name: impl Into<String>, f: F) -> FnProcessor<F>
where
    F: Fn(Item) -> Option<Item> + Send + Sync + 'static,
{
    FnProcessor {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> ItemProcessor for FnProcessor<F>
where
    F: Fn(Item) -> Option<Item> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Blocking
    }

    async fn process(&self, item: Item) -> Option<Item> {
        (self.f)(item)
    }
}

/// Ordered list of item processors
#[derive(Clone, Default)]
pub struct ItemPipeline {
    stages: Vec<Arc<dyn ItemProcessor>>,
}

impl ItemPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a processor; it runs after every processor registered before it
    pub fn push(&mut self, processor: Arc<dyn ItemProcessor>) {
        self.stages.push(processor);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Registered processors in registration order
    pub fn stages(&self) -> impl Iterator<Item = &Arc<dyn ItemProcessor>> {
        self.stages.iter()
    }

    /// Runs `item` through every processor
    ///
    /// # Returns
    ///
    /// * `Some(item)` - The item survived every stage
    /// * `None` - A stage dropped the item
    pub async fn process(&self, item: Item) -> Option<Item> {
        let mut current = item;
        for stage in &self.stages {
            match stage.process(current).await {
                Some(next) => current = next,
                None => {
                    tracing::debug!("Item dropped by processor '{}'", stage.name());
                    return None;
                }
            }
        }
        Some(current)
    }
}
