use async_nats::HeaderMap;
use opentelemetry::{global, propagation::Injector};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Writes propagator fields into NATS message headers
struct NatsHeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for NatsHeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

/// Attach the current span's W3C trace context (`traceparent`, `tracestate`) to `headers`.
///
/// A no-op unless a global propagator has been installed by telemetry init.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        let ctx = tracing::Span::current().context();
        propagator.inject_context(&ctx, &mut NatsHeaderInjector(headers));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_without_propagator_keeps_existing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/json");

        inject_trace_context(&mut headers);

        assert_eq!(
            headers.get("Content-Type").map(|v| v.as_str()),
            Some("application/json")
        );
    }

    #[test]
    fn test_injector_writes_header() {
        let mut headers = HeaderMap::new();
        NatsHeaderInjector(&mut headers).set(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
        );

        let value = headers.get("traceparent").map(|v| v.as_str().to_string());
        assert!(value.is_some_and(|v| v.starts_with("00-")));
    }
}
