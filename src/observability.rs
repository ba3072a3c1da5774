use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("filechat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("filechat.client.request_errors");
pub(crate) static CLIENT_TTFB: Moments = Moments::new("filechat.client.ttfb_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("filechat.stream.chunks");
pub(crate) static STREAM_BYTES: Counter = Counter::new("filechat.stream.bytes");
pub(crate) static STREAM_MALFORMED_FRAMES: Counter =
    Counter::new("filechat.stream.malformed_frames");
pub(crate) static STREAM_DROPPED_DELTAS: Counter = Counter::new("filechat.stream.dropped_deltas");
pub(crate) static STREAM_CANCELLATIONS: Counter = Counter::new("filechat.stream.cancellations");
pub(crate) static STREAM_TIMEOUTS: Counter = Counter::new("filechat.stream.timeouts");
pub(crate) static STREAM_DURATION: Moments = Moments::new("filechat.stream.duration_seconds");

pub(crate) static DISCOVERY_TURNS: Counter = Counter::new("filechat.discovery.turns");
pub(crate) static DISCOVERY_SHORT_CIRCUITS: Counter =
    Counter::new("filechat.discovery.short_circuits");
pub(crate) static DISCOVERY_MALFORMED: Counter = Counter::new("filechat.discovery.malformed");
pub(crate) static DISCOVERY_FILE_FETCHES: Counter = Counter::new("filechat.discovery.file_fetches");

pub(crate) static SEMANTIC_SEARCHES: Counter = Counter::new("filechat.semantic.searches");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_TTFB);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_MALFORMED_FRAMES);
    collector.register_counter(&STREAM_DROPPED_DELTAS);
    collector.register_counter(&STREAM_CANCELLATIONS);
    collector.register_counter(&STREAM_TIMEOUTS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&DISCOVERY_TURNS);
    collector.register_counter(&DISCOVERY_SHORT_CIRCUITS);
    collector.register_counter(&DISCOVERY_MALFORMED);
    collector.register_counter(&DISCOVERY_FILE_FETCHES);

    collector.register_counter(&SEMANTIC_SEARCHES);
}
