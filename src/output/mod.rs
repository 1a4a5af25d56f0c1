//! Output module for processed items and run reports
//!
//! This module handles:
//! - Running scraped items through the ordered item pipeline
//! - Writing surviving items to a durable record sink
//! - Replaying record files in write order
//! - Carrying timestamps inside items
//! - Recording run statistics and rendering summaries

mod pipeline;
mod reader;
mod sink;
pub mod stats;
pub mod summary;
mod timestamp;

pub use pipeline::{processor_fn, FnProcessor, ItemPipeline, ItemProcessor};
pub use reader::{RecordReader, Records};
pub use sink::{MemorySink, MessagePackSink, RecordSink};
pub use stats::{print_statistics, RunStatistics, StatisticsCollector};
pub use summary::{format_markdown_summary, write_markdown_summary};
pub use timestamp::{decode_datetime, encode_datetime};

use crate::config::{OutputConfig, RecordFormat};
use crate::storage::SqliteSink;
use crate::SinkError;
use std::sync::Arc;

/// Opens the record sink described by the output configuration
///
/// # Arguments
///
/// * `config` - The output section of the configuration
///
/// # Returns
///
/// * `Ok(Arc<dyn RecordSink>)` - A fresh, empty sink
/// * `Err(SinkError)` - The destination could not be created
pub async fn open_sink(config: &OutputConfig) -> Result<Arc<dyn RecordSink>, SinkError> {
    let sink: Arc<dyn RecordSink> = match config.format {
        RecordFormat::MessagePack => Arc::new(MessagePackSink::create(&config.records_path).await?),
        RecordFormat::Sqlite => Arc::new(SqliteSink::create(&config.records_path)?),
    };
    tracing::debug!(
        "Opened {:?} record sink at {}",
        config.format, config.records_path
    );
    Ok(sink)
}
