//! Set up of the global tracing subscriber

use std::error::Error;
use std::fmt;
use std::fmt::Debug;

use tracing::Event;
use tracing::Level;
use tracing::Subscriber;
use tracing::field::Field;
use tracing::field::Visit;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::util::TryInitError;
use vitrine_core::re_exports::serde_json::Map;
use vitrine_core::re_exports::serde_json::Value;
use vitrine_core::re_exports::time::OffsetDateTime;
use vitrine_core::re_exports::time::format_description::well_known::Rfc3339;

use crate::config::LogFormat;

/// Installs the global subscriber
///
/// The filter is read from `RUST_LOG` and defaults to `info`.
pub fn init_tracing(format: LogFormat, service_name: &str) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().event_format(FlatJson {
                service_name: service_name.to_string(),
            }))
            .try_init(),
    }
}

/// Event format writing one json object per line
///
/// Every line carries `timestamp`, `level`, `target` and `service_name`.
/// If known, `filename`, `line_number`, `span_name` (the innermost span)
/// and `spans` (all spans from the root, joined by `:`) are added.
/// The event's own fields follow under their dotted names, e.g. `settings.key`.
#[derive(Debug, Clone)]
pub struct FlatJson {
    /// Value of the `service_name` key
    pub service_name: String,
}

impl<S, N> FormatEvent<S, N> for FlatJson
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "ERROR".to_string());

        let mut line = LogLine::default();
        line.set("timestamp", timestamp);
        line.set("level", meta.level().as_str());
        line.set("target", meta.target());
        line.set("service_name", self.service_name.as_str());
        line.set_opt("filename", meta.file());
        line.set_opt("line_number", meta.line());

        if let Some(scope) = ctx.event_scope() {
            let names: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            line.set_opt("span_name", names.last().copied());
            line.set("spans", names.join(":"));
        }

        event.record(&mut line);
        writeln!(writer, "{}", Value::Object(line.0))
    }
}

/// The fields of a single log line
#[derive(Default)]
struct LogLine(Map<String, Value>);

impl LogLine {
    fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    fn set_opt(&mut self, key: &str, value: Option<impl Into<Value>>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }
}

impl Visit for LogLine {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.set(field.name(), value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.set(field.name(), value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.set(field.name(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.set(field.name(), value);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field.name(), value);
    }

    /// Errors are written as their message plus the messages of their sources
    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.set(field.name(), value.to_string());
        let sources: Vec<Value> = std::iter::successors(value.source(), |&error| error.source())
            .map(|error| Value::String(error.to_string()))
            .collect();
        if !sources.is_empty() {
            self.set(&format!("{}.sources", field.name()), sources);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.set(field.name(), format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::Mutex;

    use tracing::info;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl MakeWriter<'_> for Captured {
        type Writer = Captured;

        fn make_writer(&self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn writes_one_flat_object_per_event() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(FlatJson {
                    service_name: "vitrine-test".to_string(),
                })
                .with_writer(captured.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request");
            let _entered = span.enter();
            let error = io::Error::other("disk full");
            info!(
                settings.key = "theme",
                revision = 3u64,
                error = &error as &(dyn std::error::Error + 'static),
                "Updated setting"
            );
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(line["service_name"], "vitrine-test");
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["message"], "Updated setting");
        assert_eq!(line["settings.key"], "theme");
        assert_eq!(line["revision"], 3);
        assert_eq!(line["error"], "disk full");
        assert_eq!(line["span_name"], "request");
        assert_eq!(line["spans"], "request");
    }
}
