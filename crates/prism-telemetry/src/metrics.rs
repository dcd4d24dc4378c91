//! Gateway instruments
//!
//! Instruments are created from the global meter, so they are no-ops
//! until [`crate::init`] installs an exporter.

use std::sync::OnceLock;
use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};

pub const LLM_REQUEST_COUNT: &str = "prism.llm.requests";
pub const LLM_TOOL_CALLS_RECOVERED: &str = "prism.llm.tool_calls.recovered";
pub const LLM_UPSTREAM_DURATION: &str = "prism.llm.upstream.duration";

struct Instruments {
    requests: Counter<u64>,
    tool_calls: Counter<u64>,
    upstream_duration: Histogram<f64>,
}

fn instruments() -> &'static Instruments {
    static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("prism");
        Instruments {
            requests: meter
                .u64_counter(LLM_REQUEST_COUNT)
                .with_description("Chat completion requests by provider and outcome")
                .build(),
            tool_calls: meter
                .u64_counter(LLM_TOOL_CALLS_RECOVERED)
                .with_description("Tool calls recovered from free-text model output")
                .build(),
            upstream_duration: meter
                .f64_histogram(LLM_UPSTREAM_DURATION)
                .with_unit("s")
                .with_description("Wall time of provider calls")
                .build(),
        }
    })
}

/// Count one finished chat completion request
pub fn record_request(provider: &'static str, model: &str, stream: bool, outcome: &'static str) {
    instruments().requests.add(
        1,
        &[
            KeyValue::new("provider", provider),
            KeyValue::new("model", model.to_owned()),
            KeyValue::new("stream", stream),
            KeyValue::new("outcome", outcome),
        ],
    );
}

/// Count tool calls recovered for one response
pub fn record_tool_calls(provider: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    instruments()
        .tool_calls
        .add(count as u64, &[KeyValue::new("provider", provider)]);
}

/// Record how long a provider call took
pub fn record_upstream_duration(provider: &'static str, start: Instant) {
    instruments()
        .upstream_duration
        .record(start.elapsed().as_secs_f64(), &[KeyValue::new("provider", provider)]);
}
