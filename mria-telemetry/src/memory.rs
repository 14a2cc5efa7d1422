use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// A closed span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub duration_us: u128,
    pub fields: HashMap<String, serde_json::Value>,
}

impl SpanRecord {
    /// A field rendered as a string, if present.
    pub fn field_str(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Shared, cloneable storage for closed spans.
#[derive(Debug, Clone, Default)]
pub struct SpanStore {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl SpanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All closed spans, oldest first.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().map(|spans| spans.clone()).unwrap_or_default()
    }

    /// Closed spans with the given name.
    pub fn named(&self, name: &str) -> Vec<SpanRecord> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }

    fn push(&self, record: SpanRecord) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(record);
        }
    }
}

/// A layer that records every span into a [`SpanStore`] when it closes.
///
/// ```rust,ignore
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let store = SpanStore::new();
/// let subscriber = tracing_subscriber::registry().with(SpanRecorder::new(store.clone()));
/// let _guard = tracing::subscriber::set_default(subscriber);
/// ```
#[derive(Debug, Clone)]
pub struct SpanRecorder {
    store: SpanStore,
}

impl SpanRecorder {
    pub fn new(store: SpanStore) -> Self {
        Self { store }
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}").into());
    }
}

struct SpanState {
    opened: Instant,
    fields: HashMap<String, serde_json::Value>,
}

impl<S> Layer<S> for SpanRecorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanState { opened: Instant::now(), fields: visitor.0 });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(state) = extensions.get_mut::<SpanState>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            state.fields.extend(visitor.0);
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let extensions = span.extensions();
        let Some(state) = extensions.get::<SpanState>() else { return };
        self.store.push(SpanRecord {
            name: span.name().to_string(),
            parent: span.parent().map(|p| p.name().to_string()),
            duration_us: state.opened.elapsed().as_micros(),
            fields: state.fields.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn records_closed_spans_with_fields() {
        let store = SpanStore::new();
        let subscriber = tracing_subscriber::registry().with(SpanRecorder::new(store.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let outer = tracing::info_span!("ingest", document.id = "notes.md", chunk_count = 3u64);
            let _entered = outer.enter();
            let inner = tracing::info_span!("embed", batch_size = tracing::field::Empty);
            inner.record("batch_size", 2u64);
            drop(inner);
        });

        let spans = store.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "embed");
        assert_eq!(spans[0].parent.as_deref(), Some("ingest"));
        assert_eq!(spans[0].field_str("batch_size").as_deref(), Some("2"));

        let ingest = &store.named("ingest")[0];
        assert_eq!(ingest.field_str("document.id").as_deref(), Some("notes.md"));
        assert_eq!(ingest.fields["chunk_count"], 3);
    }
}
