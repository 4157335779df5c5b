//! Tracing layer that forwards events to an in-process observer.
//!
//! The diagnostic recorder mirrors every durable line to `tracing`; this
//! layer lets a UI or test collect those events without touching the log
//! file.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt as tracing_fmt};

/// Event data sent to observers
#[derive(Debug, Clone, serde::Serialize)]
pub struct DiagnosticEvent {
    /// Event target (e.g., "hearth::diagnostics")
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    /// Human-readable message
    pub message: String,
    /// Structured fields from the event
    pub fields: HashMap<String, Value>,
    /// Span context fields
    pub span: HashMap<String, Value>,
    pub timestamp: String,
}

/// Sends every event it sees to a channel
pub struct DiagnosticEventLayer {
    sender: mpsc::UnboundedSender<DiagnosticEvent>,
}

impl DiagnosticEventLayer {
    pub fn new(sender: mpsc::UnboundedSender<DiagnosticEvent>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for DiagnosticEventLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        let mut visitor = FieldVisitor(&mut fields);
        event.record(&mut visitor);

        let span_fields = ctx
            .event_span(event)
            .map(|span| {
                let mut stored = HashMap::new();
                stored.insert("name".to_string(), Value::from(span.name()));
                stored
            })
            .unwrap_or_default();

        let diagnostic_event = DiagnosticEvent {
            target: event.metadata().target().to_string(),
            level: event.metadata().level().to_string(),
            message: fields
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            fields,
            span: span_fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Receiver gone: nobody is watching, drop the event
        let _ = self.sender.send(diagnostic_event);
    }
}

/// Installs the global subscriber: env filter, stderr formatter, and an
/// optional forwarding layer.
///
/// `RUST_LOG` overrides `level`. Fails if a global subscriber is already set.
pub fn init_tracing(
    level: &str,
    event_tx: Option<mpsc::UnboundedSender<DiagnosticEvent>>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(false),
        )
        .with(event_tx.map(DiagnosticEventLayer::new))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}

/// Collects the field kinds recorder events carry: text, flags and
/// elapsed times. Other kinds fall through to `record_debug` and are kept
/// as text.
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl FieldVisitor<'_> {
    fn insert(&mut self, field: &Field, value: impl Into<Value>) {
        self.0.insert(field.name().to_string(), value.into());
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }
}
