// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Collector Health Metrics
//!
//! Every metric the pipeline emits keeps an in-process atomic value, so the
//! admission logic and the tests can read it back, and is mirrored to
//! statsd when a client is configured.
//!
//! ## Naming Convention
//!
//! - `service.*`: per-service counters, tagged with `svc` plus the ingest
//!   dimensions
//!   - `service.spans.received|debug|format|svc|transport`
//!   - `service.spans.rejected|debug|format|svc|transport`
//!   - `service.traces.received|debug|format|svc|transport|sampler_type`
//!   - `service.spans.saved-by-svc|debug|result|svc`
//! - everything else is a collector-wide counter, gauge, or latency
//!   histogram
//!
//! ## Cardinality
//!
//! Per-service span maps hold at most [`DEFAULT_MAX_SERVICE_NAMES`] entries
//! including the reserved `other-services` bucket; every further service
//! lands in that bucket. Trace maps admit the full cap and reserve one
//! overflow bucket per sampler type on top, so a service-name explosion
//! cannot crowd out the sampler-type breakdown. Debug and non-debug traffic
//! use separate maps, keeping debug traffic from evicting normal services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use collector_common::MutexExt;
use collector_model::span::{SamplerType, Span};
use collector_model::{InboundTransport, SpanFormat};
use collector_sanitize::normalize;

use crate::statsd::Statsd;

/// Default cap on distinct per-service counter map entries.
pub const DEFAULT_MAX_SERVICE_NAMES: usize = 4000;

/// The reserved service bucket used once a map is full.
pub const OTHER_SERVICES: &str = "other-services";

/// The synthetic service used when a span reaches the save path with no
/// process attached.
pub const UNKNOWN_SERVICE: &str = "__unknown";

pub const SPANS_RECEIVED: &str = "service.spans.received";
pub const SPANS_REJECTED: &str = "service.spans.rejected";
pub const SPANS_SAVED_BY_SVC: &str = "service.spans.saved-by-svc";
pub const TRACES_RECEIVED: &str = "service.traces.received";

pub const SPANS_DROPPED: &str = "spans.dropped";
pub const SPANS_BYTES: &str = "spans.bytes";
pub const SPANS_SERVICE_NAMES: &str = "spans.serviceNames";
pub const BATCH_SIZE: &str = "batch-size";
pub const QUEUE_LENGTH: &str = "queue-length";
pub const QUEUE_CAPACITY: &str = "queue-capacity";
pub const IN_QUEUE_LATENCY: &str = "in-queue-latency";
pub const SAVE_LATENCY: &str = "save-latency";
pub const NUM_WORKERS: &str = "collector.num-workers";
pub const QUEUE_SIZE: &str = "collector.queue-size";
pub const ZIPKIN_CONVERSION_WARNINGS: &str = "zipkin.conversion-warnings";

/// A shared counter handle. Increments are atomic and lock-free; the handle
/// is cheap to clone.
#[derive(Clone)]
pub struct Counter {
    cell: Arc<CounterCell>,
}

struct CounterCell {
    name: String,
    snapshot_key: String,
    tags: Vec<(String, String)>,
    value: AtomicU64,
    statsd: Option<Arc<Statsd>>,
}

impl Counter {
    fn new(name: &str, tags: &[(&str, &str)], statsd: Option<Arc<Statsd>>) -> Self {
        let (snapshot_key, statsd_tags) = render_tags(name, tags);
        Self {
            cell: Arc::new(CounterCell {
                name: name.to_string(),
                snapshot_key,
                tags: statsd_tags,
                value: AtomicU64::new(0),
                statsd,
            }),
        }
    }

    pub fn inc(&self, n: u64) {
        self.cell.value.fetch_add(n, Ordering::Relaxed);
        if let Some(statsd) = &self.cell.statsd {
            statsd.count(&self.cell.name, n as i64, &self.cell.tags);
        }
    }

    pub fn value(&self) -> u64 {
        self.cell.value.load(Ordering::Relaxed)
    }
}

/// A gauge with an atomic backing value.
#[derive(Clone)]
pub struct Gauge {
    cell: Arc<GaugeCell>,
}

struct GaugeCell {
    name: String,
    snapshot_key: String,
    value: AtomicI64,
    statsd: Option<Arc<Statsd>>,
}

impl Gauge {
    fn new(name: &str, statsd: Option<Arc<Statsd>>) -> Self {
        Self {
            cell: Arc::new(GaugeCell {
                name: name.to_string(),
                snapshot_key: name.to_string(),
                value: AtomicI64::new(0),
                statsd,
            }),
        }
    }

    pub fn set(&self, value: i64) {
        self.cell.value.store(value, Ordering::Relaxed);
        if let Some(statsd) = &self.cell.statsd {
            statsd.gauge(&self.cell.name, value as f64, &[]);
        }
    }

    pub fn value(&self) -> i64 {
        self.cell.value.load(Ordering::Relaxed)
    }
}

/// A latency/size histogram: full distributions go to statsd, while count,
/// sum, and max stay readable in-process.
#[derive(Clone)]
pub struct Histogram {
    cell: Arc<HistogramCell>,
}

struct HistogramCell {
    name: String,
    count: AtomicU64,
    sum_micros: AtomicU64,
    max_micros: AtomicU64,
    statsd: Option<Arc<Statsd>>,
}

impl Histogram {
    fn new(name: &str, statsd: Option<Arc<Statsd>>) -> Self {
        Self {
            cell: Arc::new(HistogramCell {
                name: name.to_string(),
                count: AtomicU64::new(0),
                sum_micros: AtomicU64::new(0),
                max_micros: AtomicU64::new(0),
                statsd,
            }),
        }
    }

    pub fn record(&self, value: Duration) {
        let micros = value.as_micros() as u64;
        self.cell.count.fetch_add(1, Ordering::Relaxed);
        self.cell.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.cell.max_micros.fetch_max(micros, Ordering::Relaxed);
        if let Some(statsd) = &self.cell.statsd {
            statsd.histogram(&self.cell.name, micros as f64, &[]);
        }
    }

    pub fn count(&self) -> u64 {
        self.cell.count.load(Ordering::Relaxed)
    }
}

/// A per-service counter map with a hard cap on distinct keys.
///
/// Lookup-or-create happens under the map lock; the increment itself is
/// atomic and performed by the caller after the lock is released.
struct ServiceCounters {
    name: &'static str,
    base_tags: Vec<(&'static str, String)>,
    max_entries: usize,
    counters: Mutex<HashMap<String, Counter>>,
    other: Counter,
    statsd: Option<Arc<Statsd>>,
}

impl ServiceCounters {
    fn new(
        name: &'static str,
        base_tags: Vec<(&'static str, String)>,
        max_entries: usize,
        statsd: Option<Arc<Statsd>>,
    ) -> Self {
        let other = Counter::new(
            name,
            &with_svc(&base_tags, OTHER_SERVICES),
            statsd.clone(),
        );
        Self {
            name,
            base_tags,
            max_entries,
            counters: Mutex::new(HashMap::new()),
            other,
            statsd,
        }
    }

    fn for_service(&self, service_name: &str) -> Counter {
        let key = normalize::service_name(service_name);
        let mut map = self.counters.lock_or_panic();
        if let Some(counter) = map.get(&key) {
            return counter.clone();
        }
        // The reserved other-services bucket occupies the last slot, so the
        // map admits max_entries - 1 distinct services.
        if map.len() + 1 < self.max_entries {
            let counter =
                Counter::new(self.name, &with_svc(&self.base_tags, &key), self.statsd.clone());
            map.insert(key, counter.clone());
            return counter;
        }
        self.other.clone()
    }

    fn len(&self) -> usize {
        self.counters.lock_or_panic().len()
    }

    fn snapshot_into(&self, out: &mut HashMap<String, u64>) {
        for counter in self.counters.lock_or_panic().values() {
            *out.entry(counter.cell.snapshot_key.clone()).or_default() += counter.value();
        }
        *out.entry(self.other.cell.snapshot_key.clone()).or_default() += self.other.value();
    }
}

/// Like [`ServiceCounters`], but keyed by service and sampler type, with a
/// reserved overflow bucket per sampler type.
struct TraceCounters {
    name: &'static str,
    base_tags: Vec<(&'static str, String)>,
    max_entries: usize,
    counters: Mutex<HashMap<String, Counter>>,
    others: HashMap<SamplerType, Counter>,
    statsd: Option<Arc<Statsd>>,
}

impl TraceCounters {
    fn new(
        name: &'static str,
        base_tags: Vec<(&'static str, String)>,
        max_entries: usize,
        statsd: Option<Arc<Statsd>>,
    ) -> Self {
        let others = SamplerType::ALL
            .iter()
            .map(|sampler| {
                let mut tags = with_svc(&base_tags, OTHER_SERVICES);
                tags.push(("sampler_type", sampler.as_str()));
                (*sampler, Counter::new(name, &tags, statsd.clone()))
            })
            .collect();
        Self {
            name,
            base_tags,
            max_entries,
            counters: Mutex::new(HashMap::new()),
            others,
            statsd,
        }
    }

    fn for_service(&self, service_name: &str, sampler: SamplerType) -> Counter {
        let svc = normalize::service_name(service_name);
        let key = format!("{svc}$_${sampler}");
        let mut map = self.counters.lock_or_panic();
        if let Some(counter) = map.get(&key) {
            return counter.clone();
        }
        if map.len() < self.max_entries {
            let mut tags = with_svc(&self.base_tags, &svc);
            tags.push(("sampler_type", sampler.as_str()));
            let counter = Counter::new(self.name, &tags, self.statsd.clone());
            map.insert(key, counter.clone());
            return counter;
        }
        // Reserved per-sampler-type bucket; ALL covers every variant.
        self.others[&sampler].clone()
    }

    fn snapshot_into(&self, out: &mut HashMap<String, u64>) {
        for counter in self.counters.lock_or_panic().values() {
            *out.entry(counter.cell.snapshot_key.clone()).or_default() += counter.value();
        }
        for counter in self.others.values() {
            *out.entry(counter.cell.snapshot_key.clone()).or_default() += counter.value();
        }
    }
}

/// The received/rejected counter handles for one (format, transport) pair.
pub struct SpanCounts {
    received: [ServiceCounters; 2],
    rejected: [ServiceCounters; 2],
    traces_received: [TraceCounters; 2],
}

impl SpanCounts {
    fn new(
        format: SpanFormat,
        transport: InboundTransport,
        max_entries: usize,
        statsd: Option<Arc<Statsd>>,
    ) -> Self {
        let tags = |debug: bool| {
            vec![
                ("debug", debug.to_string()),
                ("format", format.as_str().to_string()),
                ("transport", transport.as_str().to_string()),
            ]
        };
        let svc = |debug| {
            ServiceCounters::new(SPANS_RECEIVED, tags(debug), max_entries, statsd.clone())
        };
        let rej = |debug| {
            ServiceCounters::new(SPANS_REJECTED, tags(debug), max_entries, statsd.clone())
        };
        let traces = |debug| {
            TraceCounters::new(TRACES_RECEIVED, tags(debug), max_entries, statsd.clone())
        };
        Self {
            received: [svc(false), svc(true)],
            rejected: [rej(false), rej(true)],
            traces_received: [traces(false), traces(true)],
        }
    }

    /// Account one received span; a root span also counts a received trace.
    pub fn report_received(&self, span: &Span) {
        let debug = usize::from(span.is_debug());
        self.received[debug].for_service(span.service_name()).inc(1);
        if span.is_root() {
            self.traces_received[debug]
                .for_service(span.service_name(), span.sampler_type())
                .inc(1);
        }
    }

    /// Account one span rejected by the filter.
    pub fn report_rejected(&self, span: &Span) {
        let debug = usize::from(span.is_debug());
        self.rejected[debug].for_service(span.service_name()).inc(1);
    }
}

/// The collector-wide metrics registry.
///
/// Cloning shares the underlying counters.
#[derive(Clone)]
pub struct CollectorMetrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    span_counts: HashMap<(SpanFormat, InboundTransport), SpanCounts>,
    saved_ok: [ServiceCounters; 2],
    saved_err: [ServiceCounters; 2],
    spans_dropped: Counter,
    spans_bytes: Counter,
    zipkin_warnings: Counter,
    service_names: Gauge,
    batch_size: Gauge,
    queue_length: Gauge,
    queue_capacity: Gauge,
    num_workers: Gauge,
    queue_size: Gauge,
    in_queue_latency: Histogram,
    save_latency: Histogram,
}

impl CollectorMetrics {
    pub fn new(max_service_names: usize, statsd: Option<Arc<Statsd>>) -> Self {
        let mut span_counts = HashMap::new();
        for format in SpanFormat::ALL {
            for transport in InboundTransport::ALL {
                span_counts.insert(
                    (format, transport),
                    SpanCounts::new(format, transport, max_service_names, statsd.clone()),
                );
            }
        }
        let saved = |result: &str, debug: bool| {
            ServiceCounters::new(
                SPANS_SAVED_BY_SVC,
                vec![
                    ("debug", debug.to_string()),
                    ("result", result.to_string()),
                ],
                max_service_names,
                statsd.clone(),
            )
        };
        Self {
            inner: Arc::new(MetricsInner {
                span_counts,
                saved_ok: [saved("ok", false), saved("ok", true)],
                saved_err: [saved("err", false), saved("err", true)],
                spans_dropped: Counter::new(SPANS_DROPPED, &[], statsd.clone()),
                spans_bytes: Counter::new(SPANS_BYTES, &[], statsd.clone()),
                zipkin_warnings: Counter::new(ZIPKIN_CONVERSION_WARNINGS, &[], statsd.clone()),
                service_names: Gauge::new(SPANS_SERVICE_NAMES, statsd.clone()),
                batch_size: Gauge::new(BATCH_SIZE, statsd.clone()),
                queue_length: Gauge::new(QUEUE_LENGTH, statsd.clone()),
                queue_capacity: Gauge::new(QUEUE_CAPACITY, statsd.clone()),
                num_workers: Gauge::new(NUM_WORKERS, statsd.clone()),
                queue_size: Gauge::new(QUEUE_SIZE, statsd.clone()),
                in_queue_latency: Histogram::new(IN_QUEUE_LATENCY, statsd.clone()),
                save_latency: Histogram::new(SAVE_LATENCY, statsd),
            }),
        }
    }

    /// The counter handles for a (format, transport) pair. Every pair is
    /// pre-built, so unknown dimensions fold to `Unknown` at the enum level
    /// and this lookup cannot miss.
    pub fn counts_for(&self, format: SpanFormat, transport: InboundTransport) -> &SpanCounts {
        self.inner
            .span_counts
            .get(&(format, transport))
            .unwrap_or_else(|| &self.inner.span_counts[&(SpanFormat::Unknown, InboundTransport::Unknown)])
    }

    /// Account the save outcome for a span.
    pub fn report_saved(&self, span: &Span, ok: bool) {
        let service = match span.service_name() {
            "" => UNKNOWN_SERVICE,
            name => name,
        };
        self.report_saved_service(service, span.is_debug(), ok);
    }

    /// Account a save outcome when only the service is known, e.g. after a
    /// recovered worker panic.
    pub fn report_saved_service(&self, service: &str, debug: bool, ok: bool) {
        let debug = usize::from(debug);
        let counters = if ok {
            &self.inner.saved_ok[debug]
        } else {
            &self.inner.saved_err[debug]
        };
        counters.for_service(service).inc(1);
        self.update_service_names_gauge();
    }

    fn update_service_names_gauge(&self) {
        let distinct = self
            .inner
            .saved_ok
            .iter()
            .chain(self.inner.saved_err.iter())
            .map(ServiceCounters::len)
            .sum::<usize>();
        self.inner.service_names.set(distinct as i64);
    }

    pub fn spans_dropped(&self) -> &Counter {
        &self.inner.spans_dropped
    }

    pub fn spans_bytes(&self) -> &Counter {
        &self.inner.spans_bytes
    }

    pub fn zipkin_warnings(&self) -> &Counter {
        &self.inner.zipkin_warnings
    }

    pub fn batch_size(&self) -> &Gauge {
        &self.inner.batch_size
    }

    pub fn queue_length(&self) -> &Gauge {
        &self.inner.queue_length
    }

    pub fn queue_capacity(&self) -> &Gauge {
        &self.inner.queue_capacity
    }

    pub fn num_workers(&self) -> &Gauge {
        &self.inner.num_workers
    }

    pub fn queue_size(&self) -> &Gauge {
        &self.inner.queue_size
    }

    pub fn in_queue_latency(&self) -> &Histogram {
        &self.inner.in_queue_latency
    }

    pub fn save_latency(&self) -> &Histogram {
        &self.inner.save_latency
    }

    /// Non-zero counters by rendered key, for tests and debug endpoints.
    /// Keys look like `service.spans.received|debug=false|format=jaeger|svc=fry|transport=grpc`.
    pub fn counters_snapshot(&self) -> HashMap<String, u64> {
        let mut out = HashMap::new();
        for counts in self.inner.span_counts.values() {
            for sc in counts.received.iter().chain(counts.rejected.iter()) {
                sc.snapshot_into(&mut out);
            }
            for tc in counts.traces_received.iter() {
                tc.snapshot_into(&mut out);
            }
        }
        for sc in self.inner.saved_ok.iter().chain(self.inner.saved_err.iter()) {
            sc.snapshot_into(&mut out);
        }
        *out.entry(SPANS_DROPPED.to_string()).or_default() += self.inner.spans_dropped.value();
        *out.entry(SPANS_BYTES.to_string()).or_default() += self.inner.spans_bytes.value();
        *out.entry(ZIPKIN_CONVERSION_WARNINGS.to_string()).or_default() +=
            self.inner.zipkin_warnings.value();
        out.retain(|_, v| *v > 0);
        out
    }
}

fn with_svc<'a>(
    base: &'a [(&'static str, String)],
    svc: &'a str,
) -> Vec<(&'static str, &'a str)> {
    let mut tags: Vec<(&'static str, &str)> =
        base.iter().map(|(k, v)| (*k, v.as_str())).collect();
    tags.push(("svc", svc));
    tags
}

fn render_tags(name: &str, tags: &[(&str, &str)]) -> (String, Vec<(String, String)>) {
    let mut sorted: Vec<(&str, &str)> = tags.to_vec();
    sorted.sort_unstable();
    let mut snapshot_key = name.to_string();
    let mut statsd_tags = Vec::with_capacity(sorted.len());
    for (k, v) in sorted {
        snapshot_key.push_str(&format!("|{k}={v}"));
        statsd_tags.push((k.to_string(), v.to_string()));
    }
    (snapshot_key, statsd_tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_model::span::{KeyValue, Process, TagValue};

    fn span(service: &str, debug: bool, root: bool, sampler: Option<&str>) -> Span {
        let mut span = Span {
            parent_span_id: if root { 0 } else { 1 },
            flags: if debug { 2 } else { 0 },
            process: Some(Process::new(service)),
            ..Default::default()
        };
        if let Some(sampler) = sampler {
            span.tags.push(KeyValue {
                key: "sampler.type".to_string(),
                value: TagValue::String(sampler.to_string()),
            });
        }
        span
    }

    fn registry() -> CollectorMetrics {
        CollectorMetrics::new(DEFAULT_MAX_SERVICE_NAMES, None)
    }

    #[test]
    fn test_per_service_counts_with_debug_split() {
        let metrics = registry();
        let counts = metrics.counts_for(SpanFormat::Jaeger, InboundTransport::Grpc);
        counts.report_received(&span("fry", false, true, None));
        counts.report_received(&span("fry", true, true, None));
        counts.report_received(&span("fry", true, false, None));

        let snap = metrics.counters_snapshot();
        assert_eq!(
            1,
            snap["service.spans.received|debug=false|format=jaeger|svc=fry|transport=grpc"]
        );
        assert_eq!(
            2,
            snap["service.spans.received|debug=true|format=jaeger|svc=fry|transport=grpc"]
        );
        assert_eq!(
            1,
            snap["service.traces.received|debug=false|format=jaeger|sampler_type=unrecognized|svc=fry|transport=grpc"]
        );
        assert_eq!(
            1,
            snap["service.traces.received|debug=true|format=jaeger|sampler_type=unrecognized|svc=fry|transport=grpc"]
        );
    }

    #[test]
    fn test_cap_overflow_routes_to_other_services() {
        let metrics = CollectorMetrics::new(3, None);
        let counts = metrics.counts_for(SpanFormat::Jaeger, InboundTransport::Grpc);
        for service in ["fry", "leela", "bender", "zoidberg"] {
            counts.report_received(&span(service, false, false, None));
        }

        let snap = metrics.counters_snapshot();
        assert_eq!(
            1,
            snap["service.spans.received|debug=false|format=jaeger|svc=fry|transport=grpc"]
        );
        assert_eq!(
            1,
            snap["service.spans.received|debug=false|format=jaeger|svc=leela|transport=grpc"]
        );
        assert_eq!(
            2,
            snap["service.spans.received|debug=false|format=jaeger|svc=other-services|transport=grpc"]
        );
        // The sum of all counters equals the number of report calls
        let total: u64 = snap
            .iter()
            .filter(|(k, _)| k.starts_with(SPANS_RECEIVED))
            .map(|(_, v)| *v)
            .sum();
        assert_eq!(4, total);
    }

    #[test]
    fn test_trace_overflow_keeps_sampler_type_buckets() {
        let metrics = CollectorMetrics::new(1, None);
        let counts = metrics.counts_for(SpanFormat::Jaeger, InboundTransport::Grpc);
        counts.report_received(&span("fry", false, true, Some("const")));
        counts.report_received(&span("leela", false, true, Some("const")));
        counts.report_received(&span("bender", false, true, Some("probabilistic")));

        let snap = metrics.counters_snapshot();
        assert_eq!(
            1,
            snap["service.traces.received|debug=false|format=jaeger|sampler_type=const|svc=fry|transport=grpc"]
        );
        assert_eq!(
            1,
            snap["service.traces.received|debug=false|format=jaeger|sampler_type=const|svc=other-services|transport=grpc"]
        );
        assert_eq!(
            1,
            snap["service.traces.received|debug=false|format=jaeger|sampler_type=probabilistic|svc=other-services|transport=grpc"]
        );
    }

    #[test]
    fn test_service_names_are_normalized_for_tags() {
        let metrics = registry();
        let counts = metrics.counts_for(SpanFormat::Zipkin, InboundTransport::Http);
        counts.report_received(&span("Planet Express", false, false, None));
        let snap = metrics.counters_snapshot();
        assert_eq!(
            1,
            snap["service.spans.received|debug=false|format=zipkin|svc=planet_express|transport=http"]
        );
    }

    #[test]
    fn test_saved_by_svc() {
        let metrics = registry();
        metrics.report_saved(&span("fry", false, false, None), true);
        metrics.report_saved(&Span::default(), false);

        let snap = metrics.counters_snapshot();
        assert_eq!(
            1,
            snap["service.spans.saved-by-svc|debug=false|result=ok|svc=fry"]
        );
        assert_eq!(
            1,
            snap["service.spans.saved-by-svc|debug=false|result=err|svc=__unknown"]
        );
        assert_eq!(2, metrics.inner.service_names.value());
    }

    #[test]
    fn test_histogram_aggregates() {
        let metrics = registry();
        metrics.save_latency().record(Duration::from_micros(100));
        metrics.save_latency().record(Duration::from_micros(300));
        assert_eq!(2, metrics.save_latency().count());
        assert_eq!(
            300,
            metrics.inner.save_latency.cell.max_micros.load(Ordering::Relaxed)
        );
    }

    #[test]
    fn test_counter_increment_is_shared() {
        let metrics = registry();
        let dropped = metrics.spans_dropped().clone();
        dropped.inc(3);
        metrics.spans_dropped().inc(1);
        assert_eq!(4, metrics.spans_dropped().value());
    }
}
