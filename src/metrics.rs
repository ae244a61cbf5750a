//! Metrics descriptions for observability, following `spacepanda-core::metrics`'s
//! `describe_*` pattern. Call [`init_metrics`] once at process start; the DHT
//! components themselves call `metrics::counter!`/`gauge!`/`histogram!` inline at
//! their call sites rather than routing through a bespoke collector.

use metrics::{describe_counter, describe_gauge, describe_histogram};

pub fn init_metrics() {
    describe_counter!("dht.requests.total", "Total DHT RPC requests issued");
    describe_counter!("dht.requests.success", "Successful DHT RPC requests");
    describe_counter!("dht.requests.failed", "Failed DHT RPC requests");
    describe_histogram!("dht.request.duration_ms", "DHT RPC request duration in milliseconds");

    describe_gauge!("dht.peers.active", "Number of peers currently healthy");
    describe_gauge!("dht.peers.total", "Total number of known DHT peers");
    describe_gauge!("dht.bucket.entries", "Number of entries across all k-buckets");

    describe_counter!("dht.lookup.visited", "Peers visited across all lookups");
    describe_counter!("dht.redistribution.casts", "STORE casts issued by the redistribution engine");
    describe_counter!("dht.cache.hit", "Result cache hits");
    describe_counter!("dht.cache.miss", "Result cache misses");
    describe_gauge!("dht.session.backoff_seconds", "Current backoff window for a peer session");
}
