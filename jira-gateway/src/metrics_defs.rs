use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status, route.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const UPSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "upstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a single Jira request attempt in seconds. Tagged with operation, outcome.",
};

pub const UPSTREAM_RETRIES: MetricDef = MetricDef {
    name: "upstream.retries",
    metric_type: MetricType::Counter,
    description: "Number of Jira request attempts that were retried after a transient failure",
};

pub const CACHE_HITS: MetricDef = MetricDef {
    name: "cache.hits",
    metric_type: MetricType::Counter,
    description: "Issue reads served from an entry stored before the read started",
};

pub const CACHE_COALESCED: MetricDef = MetricDef {
    name: "cache.coalesced",
    metric_type: MetricType::Counter,
    description: "Issue reads that waited on a fetch another read had already started",
};

pub const CACHE_MISSES: MetricDef = MetricDef {
    name: "cache.misses",
    metric_type: MetricType::Counter,
    description: "Issue reads that had to go to Jira",
};

pub const ATTACHMENT_STREAMS_ACTIVE: MetricDef = MetricDef {
    name: "attachments.streams.active",
    metric_type: MetricType::Gauge,
    description: "Number of attachment downloads currently being relayed",
};

pub const ATTACHMENT_BYTES: MetricDef = MetricDef {
    name: "attachments.bytes",
    metric_type: MetricType::Counter,
    description: "Attachment bytes relayed to callers",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    UPSTREAM_REQUEST_DURATION,
    UPSTREAM_RETRIES,
    CACHE_HITS,
    CACHE_COALESCED,
    CACHE_MISSES,
    ATTACHMENT_STREAMS_ACTIVE,
    ATTACHMENT_BYTES,
];
