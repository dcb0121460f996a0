// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The span processor: admission control, the worker pool, and the save
//! path.
//!
//! Ingress handlers call [`SpanProcessor::process_batch`] with decoded model
//! spans. Each admitted span is stamped, enriched with collector tags, and
//! pushed through the bounded queue; workers sanitize, run the pre-save
//! hooks, and hand the span to the [`TraceWriter`]. The bounded queue with
//! drop-on-full is the only backpressure mechanism: producers never block,
//! and callers learn about drops through per-span results or a
//! [`ProcessorError::Busy`] error.

use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use collector_common::worker::Worker;
use collector_model::span::{KeyValue, Span, TagValue};
use collector_model::{InboundTransport, SpanFormat};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::metrics::{CollectorMetrics, UNKNOWN_SERVICE};
use crate::queue::BoundedQueue;
use crate::sampling::SamplingAggregator;

/// Tag stamped on every admitted span recording the wire format it arrived
/// in.
pub const INTERNAL_FORMAT_TAG: &str = "internal.span.format";

const DEFAULT_NUM_WORKERS: usize = 50;
const DEFAULT_QUEUE_SIZE: usize = 2000;
/// Upper bound the dynamic resizer will never grow the queue past.
const MAX_DYN_QUEUE_SIZE: u64 = 1_000_000;
/// Resize only when ideal and current capacity diverge by more than this.
const RESIZE_RATIO_THRESHOLD: f64 = 1.2;
const RESIZE_INTERVAL: Duration = Duration::from_secs(60);
const QUEUE_GAUGE_INTERVAL: Duration = Duration::from_secs(1);

/// Ingest dimensions of one batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpanOptions {
    pub format: SpanFormat,
    pub transport: InboundTransport,
}

/// Errors surfaced by [`SpanProcessor::process_batch`].
#[derive(Debug, PartialEq)]
pub enum ProcessorError {
    /// The queue is full and the processor is configured to report it.
    Busy,
    /// The processor has been closed.
    Stopped,
}

impl Display for ProcessorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorError::Busy => write!(f, "server busy"),
            ProcessorError::Stopped => write!(f, "processor is stopped"),
        }
    }
}

impl std::error::Error for ProcessorError {}

/// The storage contract the pipeline writes to. Implementations own their
/// durability and retries; the pipeline logs and counts errors but never
/// retries.
#[async_trait]
pub trait TraceWriter: Send + Sync {
    async fn write_traces(&self, span: &Span) -> anyhow::Result<()>;
}

/// Hook run on the whole batch before any accounting.
pub type PreProcessFn = Arc<dyn Fn(&[Span]) + Send + Sync>;
/// Per-span admission filter; false rejects the span.
pub type FilterFn = Arc<dyn Fn(&Span) -> bool + Send + Sync>;
/// Hook run on each span right before the write.
pub type PreSaveFn = Arc<dyn Fn(&mut Span) + Send + Sync>;

/// An item owned by the queue from enqueue until a worker consumes it.
struct QueueItem {
    enqueued_at: Instant,
    span: Span,
}

struct ProcessorInner {
    queue: BoundedQueue<QueueItem>,
    metrics: CollectorMetrics,
    writer: Arc<dyn TraceWriter>,
    sanitizers: Vec<fn(&mut Span)>,
    pre_process: Option<PreProcessFn>,
    filter: Option<FilterFn>,
    pre_save: Vec<PreSaveFn>,
    collector_tags: Vec<(String, String)>,
    report_busy: bool,
    spans_processed: AtomicU64,
    bytes_processed: AtomicU64,
}

/// Builder for [`SpanProcessor`], mirroring the configuration surface of
/// the collector options.
pub struct SpanProcessorBuilder {
    writer: Arc<dyn TraceWriter>,
    metrics: CollectorMetrics,
    num_workers: usize,
    queue_size: usize,
    dyn_queue_size_memory: Option<u64>,
    dyn_queue_size_warmup: Option<u64>,
    collector_tags: Vec<(String, String)>,
    report_busy: bool,
    sanitizers: Vec<fn(&mut Span)>,
    pre_process: Option<PreProcessFn>,
    filter: Option<FilterFn>,
    pre_save: Vec<PreSaveFn>,
    aggregator: Option<Arc<dyn SamplingAggregator>>,
}

impl SpanProcessorBuilder {
    pub fn new(writer: Arc<dyn TraceWriter>, metrics: CollectorMetrics) -> Self {
        Self {
            writer,
            metrics,
            num_workers: DEFAULT_NUM_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
            dyn_queue_size_memory: None,
            dyn_queue_size_warmup: None,
            collector_tags: Vec::new(),
            report_busy: false,
            sanitizers: collector_sanitize::model::CHAIN.to_vec(),
            pre_process: None,
            filter: None,
            pre_save: Vec::new(),
            aggregator: None,
        }
    }

    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    /// Memory budget in bytes enabling dynamic queue resizing.
    pub fn dyn_queue_size_memory(mut self, bytes: Option<u64>) -> Self {
        self.dyn_queue_size_memory = bytes;
        self
    }

    /// Spans to observe before the first resize; defaults to the queue size.
    pub fn dyn_queue_size_warmup(mut self, spans: Option<u64>) -> Self {
        self.dyn_queue_size_warmup = spans;
        self
    }

    /// Operator tags merged into every span's process tags.
    pub fn collector_tags(mut self, tags: impl IntoIterator<Item = (String, String)>) -> Self {
        self.collector_tags = tags.into_iter().collect();
        self.collector_tags.sort();
        self
    }

    /// Surface a [`ProcessorError::Busy`] instead of per-span results when
    /// any span fails to enqueue.
    pub fn report_busy(mut self, report_busy: bool) -> Self {
        self.report_busy = report_busy;
        self
    }

    /// Replace the model sanitizer chain run by the workers.
    pub fn sanitizers(mut self, sanitizers: Vec<fn(&mut Span)>) -> Self {
        self.sanitizers = sanitizers;
        self
    }

    pub fn pre_process(mut self, hook: PreProcessFn) -> Self {
        self.pre_process = Some(hook);
        self
    }

    pub fn filter(mut self, filter: FilterFn) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn pre_save(mut self, hook: PreSaveFn) -> Self {
        self.pre_save.push(hook);
        self
    }

    /// Observe root spans before save, e.g. for adaptive sampling.
    pub fn sampling_aggregator(mut self, aggregator: Arc<dyn SamplingAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Start the processor: spawns the worker pool and background tickers
    /// on the current tokio runtime.
    pub fn build(mut self) -> SpanProcessor {
        if let Some(aggregator) = self.aggregator.take() {
            let hook: PreSaveFn = Arc::new(move |span: &mut Span| {
                if span.is_root() {
                    aggregator.handle_root_span(span);
                }
            });
            self.pre_save.push(hook);
        }

        let metrics = self.metrics.clone();
        let dropped = metrics.spans_dropped().clone();
        let queue = BoundedQueue::new(
            self.queue_size,
            Some(Box::new(move |_item: QueueItem| {
                dropped.inc(1);
            })),
        );

        metrics.num_workers().set(self.num_workers as i64);
        metrics.queue_size().set(self.queue_size as i64);
        metrics.queue_capacity().set(self.queue_size as i64);

        let inner = Arc::new(ProcessorInner {
            queue,
            metrics,
            writer: self.writer,
            sanitizers: self.sanitizers,
            pre_process: self.pre_process,
            filter: self.filter,
            pre_save: self.pre_save,
            collector_tags: self.collector_tags,
            report_busy: self.report_busy,
            spans_processed: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
        });

        let worker_inner = Arc::clone(&inner);
        inner.queue.start_consumers(self.num_workers, move |item| {
            let inner = Arc::clone(&worker_inner);
            async move {
                let service = item.span.service_name().to_string();
                let debug = item.span.is_debug();
                let work = process_item(Arc::clone(&inner), item);
                if std::panic::AssertUnwindSafe(work)
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    // A hook or writer panicked; keep the worker alive and
                    // account the span as a failed save.
                    error!(service = %service, "recovered panic while processing span");
                    inner.metrics.report_saved_service(
                        if service.is_empty() {
                            UNKNOWN_SERVICE
                        } else {
                            &service
                        },
                        debug,
                        false,
                    );
                }
            }
        });

        let cancellation_token = CancellationToken::new();
        let mut background = vec![spawn_worker(
            Box::new(QueueGaugeWorker {
                inner: Arc::clone(&inner),
            }),
            cancellation_token.clone(),
        )];
        if let Some(memory) = self.dyn_queue_size_memory {
            let warmup = self.dyn_queue_size_warmup.unwrap_or(self.queue_size as u64);
            info!(
                memory_bytes = memory,
                warmup_spans = warmup,
                "dynamic queue resizing enabled"
            );
            background.push(spawn_worker(
                Box::new(QueueResizeWorker {
                    inner: Arc::clone(&inner),
                    memory_budget_bytes: memory,
                    warmup_spans: warmup,
                }),
                cancellation_token.clone(),
            ));
        }

        SpanProcessor {
            inner,
            background,
            cancellation_token,
            closed: AtomicBool::new(false),
        }
    }
}

/// The bounded-queue span processor.
///
/// State machine: built running, closed once; `process_batch` on a closed
/// processor returns [`ProcessorError::Stopped`].
pub struct SpanProcessor {
    inner: Arc<ProcessorInner>,
    background: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
    closed: AtomicBool,
}

impl SpanProcessor {
    pub fn builder(writer: Arc<dyn TraceWriter>, metrics: CollectorMetrics) -> SpanProcessorBuilder {
        SpanProcessorBuilder::new(writer, metrics)
    }

    /// Admit a batch of spans.
    ///
    /// The result vector mirrors the input order: `true` means the span was
    /// enqueued or actively rejected by the filter, `false` means it was
    /// dropped by a full queue. With `report_busy`, a drop surfaces as
    /// [`ProcessorError::Busy`] instead.
    pub fn process_batch(
        &self,
        spans: Vec<Span>,
        options: SpanOptions,
    ) -> Result<Vec<bool>, ProcessorError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProcessorError::Stopped);
        }
        let inner = &self.inner;
        if let Some(pre_process) = &inner.pre_process {
            pre_process(&spans);
        }
        inner.metrics.batch_size().set(spans.len() as i64);

        let counts = inner.metrics.counts_for(options.format, options.transport);
        let mut results = Vec::with_capacity(spans.len());
        let mut any_dropped = false;

        for mut span in spans {
            counts.report_received(&span);

            if let Some(filter) = &inner.filter {
                if !filter(&span) {
                    counts.report_rejected(&span);
                    // Not dropped: actively rejected.
                    results.push(true);
                    continue;
                }
            }

            span.tags.push(KeyValue::string(
                INTERNAL_FORMAT_TAG,
                options.format.as_str(),
            ));
            inner.add_collector_tags(&mut span);

            let bytes = span.wire_size_hint() as u64;
            inner.metrics.spans_bytes().inc(bytes);
            inner.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
            inner.spans_processed.fetch_add(1, Ordering::Relaxed);

            let enqueued = inner.queue.produce(QueueItem {
                enqueued_at: Instant::now(),
                span,
            });
            if !enqueued {
                any_dropped = true;
            }
            results.push(enqueued);
        }

        if inner.report_busy && any_dropped {
            return Err(ProcessorError::Busy);
        }
        Ok(results)
    }

    pub fn metrics(&self) -> &CollectorMetrics {
        &self.inner.metrics
    }

    pub fn queue_size(&self) -> usize {
        self.inner.queue.size()
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue.capacity()
    }

    /// Stop admission, drain the queue, and join the workers and tickers.
    /// Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancellation_token.cancel();
        self.inner.queue.stop().await;
        info!("span processor closed");
    }
}

impl Drop for SpanProcessor {
    fn drop(&mut self) {
        for handle in &self.background {
            handle.abort();
        }
    }
}

impl ProcessorInner {
    /// Merge the configured collector tags into the span's process tags,
    /// skipping exact key=value duplicates, then sort the tags.
    fn add_collector_tags(&self, span: &mut Span) {
        if self.collector_tags.is_empty() {
            return;
        }
        let Some(process) = &mut span.process else {
            return;
        };
        for (key, value) in &self.collector_tags {
            let duplicate = process.tags.iter().any(|tag| {
                tag.key == *key && matches!(&tag.value, TagValue::String(v) if v == value)
            });
            if !duplicate {
                process.tags.push(KeyValue::string(key.clone(), value.clone()));
            }
        }
        process.tags.sort_by(|a, b| a.key.cmp(&b.key));
    }
}

/// One dequeued span: sanitize, hook, write, account.
async fn process_item(inner: Arc<ProcessorInner>, item: QueueItem) {
    inner
        .metrics
        .in_queue_latency()
        .record(item.enqueued_at.elapsed());

    let mut span = item.span;
    for sanitize in &inner.sanitizers {
        sanitize(&mut span);
    }
    for hook in &inner.pre_save {
        hook(&mut span);
    }

    if span.process.is_none() {
        // Nothing downstream can use a span without a process; count it
        // under the synthetic service and skip the write.
        warn!("dropping span without process at save time");
        inner.metrics.report_saved(&span, false);
        return;
    }

    let started = Instant::now();
    let result = inner.writer.write_traces(&span).await;
    inner.metrics.save_latency().record(started.elapsed());
    match result {
        Ok(()) => inner.metrics.report_saved(&span, true),
        Err(err) => {
            error!(
                service = span.service_name(),
                error = %err,
                "failed to write span to storage"
            );
            inner.metrics.report_saved(&span, false);
        }
    }
}

/// Run a background worker until the processor shuts down.
fn spawn_worker(
    mut worker: Box<dyn Worker + Send + Sync>,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = worker.run() => {}
            _ = cancellation_token.cancelled() => {}
        }
    })
}

/// Publishes the queue-length/queue-capacity gauges every second.
struct QueueGaugeWorker {
    inner: Arc<ProcessorInner>,
}

#[async_trait]
impl Worker for QueueGaugeWorker {
    async fn run(&mut self) {
        let mut interval = tokio::time::interval(QUEUE_GAUGE_INTERVAL);
        loop {
            interval.tick().await;
            self.inner
                .metrics
                .queue_length()
                .set(self.inner.queue.size() as i64);
            self.inner
                .metrics
                .queue_capacity()
                .set(self.inner.queue.capacity() as i64);
        }
    }
}

/// Periodically recomputes the ideal queue capacity from the observed
/// average span size against the configured memory budget.
struct QueueResizeWorker {
    inner: Arc<ProcessorInner>,
    memory_budget_bytes: u64,
    warmup_spans: u64,
}

#[async_trait]
impl Worker for QueueResizeWorker {
    async fn run(&mut self) {
        let mut interval = tokio::time::interval(RESIZE_INTERVAL);
        // The first tick fires immediately; skip it so a resize never
        // happens before a full interval of traffic.
        interval.tick().await;
        loop {
            interval.tick().await;
            maybe_resize(&self.inner, self.memory_budget_bytes, self.warmup_spans);
        }
    }
}

fn maybe_resize(inner: &ProcessorInner, memory_budget_bytes: u64, warmup_spans: u64) {
    let spans = inner.spans_processed.load(Ordering::Relaxed);
    if spans < warmup_spans || spans == 0 {
        return;
    }
    let avg_bytes = inner.bytes_processed.load(Ordering::Relaxed) / spans;
    if avg_bytes == 0 {
        return;
    }
    let ideal = (memory_budget_bytes / avg_bytes).min(MAX_DYN_QUEUE_SIZE) as usize;
    if ideal == 0 {
        return;
    }
    let current = inner.queue.capacity();
    let ratio = ideal.max(current) as f64 / ideal.min(current).max(1) as f64;
    if ratio > RESIZE_RATIO_THRESHOLD {
        info!(current, ideal, avg_bytes, "resizing span queue");
        inner.queue.resize(ideal);
        inner.metrics.queue_capacity().set(ideal as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DEFAULT_MAX_SERVICE_NAMES;
    use collector_model::span::Process;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Test double for the storage contract.
    struct MockWriter {
        written: Mutex<Vec<Span>>,
        gate: Option<Arc<Semaphore>>,
        fail: bool,
        panic: bool,
    }

    impl MockWriter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                written: Mutex::new(Vec::new()),
                gate: None,
                fail: false,
                panic: false,
            })
        }

        fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
            Arc::new(Self {
                written: Mutex::new(Vec::new()),
                gate: Some(gate),
                fail: false,
                panic: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                written: Mutex::new(Vec::new()),
                gate: None,
                fail: true,
                panic: false,
            })
        }

        fn panicking() -> Arc<Self> {
            Arc::new(Self {
                written: Mutex::new(Vec::new()),
                gate: None,
                fail: false,
                panic: true,
            })
        }

        fn written(&self) -> Vec<Span> {
            self.written.lock().unwrap().clone()
        }

        async fn wait_for(&self, n: usize) {
            for _ in 0..200 {
                if self.written.lock().unwrap().len() >= n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("writer never received {n} spans");
        }
    }

    #[async_trait]
    impl TraceWriter for MockWriter {
        async fn write_traces(&self, span: &Span) -> anyhow::Result<()> {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await?;
            }
            if self.panic {
                panic!("writer exploded");
            }
            if self.fail {
                anyhow::bail!("storage unavailable");
            }
            self.written.lock().unwrap().push(span.clone());
            Ok(())
        }
    }

    fn metrics() -> CollectorMetrics {
        CollectorMetrics::new(DEFAULT_MAX_SERVICE_NAMES, None)
    }

    fn span(service: &str, op: &str) -> Span {
        Span {
            operation_name: op.to_string(),
            process: Some(Process::new(service)),
            ..Default::default()
        }
    }

    fn options() -> SpanOptions {
        SpanOptions {
            format: SpanFormat::Jaeger,
            transport: InboundTransport::Grpc,
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn test_spans_flow_to_writer() {
        let writer = MockWriter::new();
        let processor = SpanProcessor::builder(writer.clone(), metrics()).build();

        let results = processor
            .process_batch(vec![span("fry", "op-a"), span("fry", "op-b")], options())
            .unwrap();
        assert_eq!(vec![true, true], results);

        writer.wait_for(2).await;
        let written = writer.written();
        assert!(written.iter().any(|s| s.operation_name == "op-a"));
        // The format stamp is applied before the write
        assert!(written
            .iter()
            .all(|s| s.tag(INTERNAL_FORMAT_TAG)
                == Some(&TagValue::String("jaeger".to_string()))));

        let snap = processor.metrics().counters_snapshot();
        assert_eq!(
            2,
            snap["service.spans.received|debug=false|format=jaeger|svc=fry|transport=grpc"]
        );
        assert_eq!(
            2,
            snap["service.spans.saved-by-svc|debug=false|result=ok|svc=fry"]
        );
        processor.close().await;
    }

    #[tokio::test]
    async fn test_filter_rejection_is_not_a_drop() {
        let writer = MockWriter::new();
        let processor = SpanProcessor::builder(writer.clone(), metrics())
            .filter(Arc::new(|span: &Span| span.operation_name != "reject-me"))
            .build();

        let results = processor
            .process_batch(vec![span("fry", "reject-me"), span("fry", "keep")], options())
            .unwrap();
        // Rejected spans read true: accepted, actively rejected
        assert_eq!(vec![true, true], results);

        writer.wait_for(1).await;
        assert_eq!(1, writer.written().len());
        let snap = processor.metrics().counters_snapshot();
        assert_eq!(
            1,
            snap["service.spans.rejected|debug=false|format=jaeger|svc=fry|transport=grpc"]
        );
        processor.close().await;
    }

    #[tokio::test]
    async fn test_busy_when_queue_full() {
        let gate = Arc::new(Semaphore::new(0));
        let writer = MockWriter::gated(gate.clone());
        let processor = SpanProcessor::builder(writer.clone(), metrics())
            .queue_size(1)
            .num_workers(1)
            .report_busy(true)
            .build();

        // Park the single worker in the writer.
        processor
            .process_batch(vec![span("fry", "parked")], options())
            .unwrap();
        wait_until(|| gate.available_permits() == 0 && processor.queue_size() == 0).await;

        // One span fills the queue, the other two must drop.
        let err = processor
            .process_batch(
                vec![span("fry", "a"), span("fry", "b"), span("fry", "c")],
                options(),
            )
            .unwrap_err();
        assert_eq!(ProcessorError::Busy, err);
        assert_eq!(1, processor.queue_size());
        assert_eq!(2, processor.metrics().spans_dropped().value());

        gate.add_permits(100);
        processor.close().await;
    }

    #[tokio::test]
    async fn test_drop_results_without_report_busy() {
        let gate = Arc::new(Semaphore::new(0));
        let writer = MockWriter::gated(gate.clone());
        let processor = SpanProcessor::builder(writer.clone(), metrics())
            .queue_size(2)
            .num_workers(1)
            .build();

        processor
            .process_batch(vec![span("fry", "parked")], options())
            .unwrap();
        wait_until(|| processor.queue_size() == 0).await;

        let results = processor
            .process_batch(
                vec![
                    span("fry", "a"),
                    span("fry", "b"),
                    span("fry", "c"),
                    span("fry", "d"),
                ],
                options(),
            )
            .unwrap();
        assert_eq!(vec![true, true, false, false], results);
        assert_eq!(2, processor.metrics().spans_dropped().value());

        gate.add_permits(100);
        processor.close().await;
    }

    #[tokio::test]
    async fn test_nil_process_is_counted_not_written() {
        let writer = MockWriter::new();
        let processor = SpanProcessor::builder(writer.clone(), metrics())
            // Disable the sanitizer that would repair the missing process
            .sanitizers(vec![])
            .build();

        processor
            .process_batch(
                vec![Span {
                    operation_name: "orphan".to_string(),
                    ..Default::default()
                }],
                options(),
            )
            .unwrap();

        wait_until(|| {
            processor
                .metrics()
                .counters_snapshot()
                .contains_key("service.spans.saved-by-svc|debug=false|result=err|svc=__unknown")
        })
        .await;
        assert!(writer.written().is_empty());
        processor.close().await;
    }

    #[tokio::test]
    async fn test_collector_tags_merged_once() {
        let writer = MockWriter::new();
        let processor = SpanProcessor::builder(writer.clone(), metrics())
            .collector_tags([("extra".to_string(), "tag".to_string())])
            .build();

        // One span without the tag, one already carrying the exact pair
        let mut tagged = span("fry", "tagged");
        tagged
            .process
            .as_mut()
            .unwrap()
            .tags
            .push(KeyValue::string("extra", "tag"));
        processor
            .process_batch(vec![span("fry", "plain"), tagged], options())
            .unwrap();

        writer.wait_for(2).await;
        for written in writer.written() {
            let process = written.process.as_ref().unwrap();
            let occurrences = process
                .tags
                .iter()
                .filter(|t| t.key == "extra"
                    && t.value == TagValue::String("tag".to_string()))
                .count();
            assert_eq!(1, occurrences, "span {}", written.operation_name);
            // Tags are sorted after the merge
            let keys: Vec<&str> = process.tags.iter().map(|t| t.key.as_str()).collect();
            let sorted = {
                let mut s = keys.clone();
                s.sort();
                s
            };
            assert_eq!(sorted, keys);
        }
        processor.close().await;
    }

    #[tokio::test]
    async fn test_storage_errors_are_counted_not_retried() {
        let writer = MockWriter::failing();
        let processor = SpanProcessor::builder(writer.clone(), metrics()).build();
        processor
            .process_batch(vec![span("fry", "doomed")], options())
            .unwrap();

        wait_until(|| {
            processor
                .metrics()
                .counters_snapshot()
                .get("service.spans.saved-by-svc|debug=false|result=err|svc=fry")
                == Some(&1)
        })
        .await;
        processor.close().await;
    }

    #[tokio::test]
    async fn test_worker_survives_writer_panic() {
        let writer = MockWriter::panicking();
        let processor = SpanProcessor::builder(writer.clone(), metrics())
            .num_workers(1)
            .build();

        processor
            .process_batch(vec![span("fry", "boom")], options())
            .unwrap();
        wait_until(|| {
            processor
                .metrics()
                .counters_snapshot()
                .get("service.spans.saved-by-svc|debug=false|result=err|svc=fry")
                == Some(&1)
        })
        .await;

        // The single worker is still alive and keeps consuming
        let ok_writer_probe = processor
            .process_batch(vec![span("fry", "after")], options())
            .unwrap();
        assert_eq!(vec![true], ok_writer_probe);
        wait_until(|| {
            processor
                .metrics()
                .counters_snapshot()
                .get("service.spans.saved-by-svc|debug=false|result=err|svc=fry")
                == Some(&2)
        })
        .await;
        processor.close().await;
    }

    #[tokio::test]
    async fn test_sampling_aggregator_sees_only_root_spans() {
        struct RootCollector {
            roots: Mutex<Vec<String>>,
            closed: std::sync::atomic::AtomicBool,
        }
        impl SamplingAggregator for RootCollector {
            fn handle_root_span(&self, span: &Span) {
                self.roots
                    .lock()
                    .unwrap()
                    .push(span.operation_name.clone());
            }
            fn close(&self) {
                self.closed.store(true, Ordering::Relaxed);
            }
        }

        let aggregator = Arc::new(RootCollector {
            roots: Mutex::new(Vec::new()),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        let writer = MockWriter::new();
        let processor = SpanProcessor::builder(writer.clone(), metrics())
            .sampling_aggregator(aggregator.clone())
            .build();

        let mut child = span("fry", "child");
        child.parent_span_id = 42;
        processor
            .process_batch(vec![span("fry", "root"), child], options())
            .unwrap();

        writer.wait_for(2).await;
        assert_eq!(vec!["root".to_string()], *aggregator.roots.lock().unwrap());
        processor.close().await;
    }

    #[tokio::test]
    async fn test_close_drains_and_stops_admission() {
        let writer = MockWriter::new();
        let processor = SpanProcessor::builder(writer.clone(), metrics()).build();
        processor
            .process_batch(vec![span("fry", "final")], options())
            .unwrap();
        processor.close().await;

        assert_eq!(0, processor.queue_size());
        assert_eq!(1, writer.written().len());
        assert_eq!(
            Err(ProcessorError::Stopped),
            processor.process_batch(vec![span("fry", "late")], options())
        );
        // Idempotent
        processor.close().await;
    }

    #[tokio::test]
    async fn test_resizer_grows_queue_to_memory_budget() {
        let writer = MockWriter::new();
        let processor = SpanProcessor::builder(writer.clone(), metrics())
            .queue_size(10)
            .dyn_queue_size_memory(Some(1_000_000))
            .dyn_queue_size_warmup(Some(1))
            .build();

        processor
            .process_batch(vec![span("fry", "sizer")], options())
            .unwrap();
        writer.wait_for(1).await;

        // Drive the resize computation directly rather than waiting a minute
        maybe_resize(&processor.inner, 1_000_000, 1);
        let capacity = processor.queue_capacity();
        assert!(capacity > 10, "capacity {capacity} should have grown");
        assert!(capacity <= MAX_DYN_QUEUE_SIZE as usize);
        processor.close().await;
    }

    #[tokio::test]
    async fn test_received_counts_per_batch_service() {
        let writer = MockWriter::new();
        let processor = SpanProcessor::builder(writer.clone(), metrics()).build();
        let spans = vec![
            span("fry", "a"),
            span("fry", "b"),
            span("leela", "c"),
        ];
        processor.process_batch(spans, options()).unwrap();
        let snap = processor.metrics().counters_snapshot();
        assert_eq!(
            2,
            snap["service.spans.received|debug=false|format=jaeger|svc=fry|transport=grpc"]
        );
        assert_eq!(
            1,
            snap["service.spans.received|debug=false|format=jaeger|svc=leela|transport=grpc"]
        );
        processor.close().await;
    }
}
