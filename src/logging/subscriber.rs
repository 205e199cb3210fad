//! Tracing subscriber setup: console formatter, run log file, and initialisation.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use tracing::Level;

use super::STAGE_TARGET;
use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};

/// The fields of an event this crate renders.
///
/// Diagnostics carry `kind` and `source` alongside the message; plain log
/// calls only carry a message.
#[derive(Debug, Default, PartialEq, Eq)]
struct EventFields {
    message: String,
    kind: Option<String>,
    source: Option<String>,
}

impl EventFields {
    fn of(event: &tracing::Event<'_>) -> Self {
        let mut fields = Self::default();
        event.record(&mut fields);
        fields
    }

    /// `[kind] source: message`, or just the message.
    fn render(&self) -> String {
        match (&self.kind, &self.source) {
            (Some(kind), Some(source)) => format!("[{kind}] {source}: {}", self.message),
            (Some(kind), None) => format!("[{kind}] {}", self.message),
            (None, _) => self.message.clone(),
        }
    }
}

impl tracing::field::Visit for EventFields {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let value = format!("{value:?}");
        match field.name() {
            "message" => self.message = value,
            "kind" => self.kind = Some(value),
            "source" => self.source = Some(value),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record_debug(field, &format_args!("{value}"));
    }
}

/// One run-log line for an event.
fn file_line(level: Level, target: &str, fields: &EventFields, ts: &str) -> String {
    let text = strip_ansi(&fields.render());
    match level {
        Level::INFO if target == STAGE_TARGET => format!("[{ts}] ==> {text}"),
        Level::ERROR => format!("[{ts}]     [error] {text}"),
        Level::WARN => format!("[{ts}]     [warn] {text}"),
        Level::INFO => format!("[{ts}]     {text}"),
        _ => format!("[{ts}]     [debug] {text}"),
    }
}

/// A [`tracing_subscriber::Layer`] appending every event to the command's
/// run log, with timestamps and ANSI codes stripped.
///
/// Captures `DEBUG` and above whatever the console verbosity.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Truncate the log for `command`, write the run header, and open it for
    /// appending.
    ///
    /// Returns `None` if the cache directory or file is unavailable.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        let rule = "=".repeat(42);
        let header = format!(
            "{rule}\nconfig-resolver {} {command} {}\n{rule}\n",
            super::version(),
            format_utc_datetime(),
        );
        fs::write(&path, header).ok()?;
        let file = fs::OpenOptions::new().append(true).open(&path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let line = file_line(
            *metadata.level(),
            metadata.target(),
            &EventFields::of(event),
            &format_utc_time(),
        );
        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] for console output.
struct ConsoleFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let text = EventFields::of(event).render();
        match *metadata.level() {
            Level::ERROR => writeln!(writer, "\x1b[31mERROR\x1b[0m {text}"),
            Level::WARN => writeln!(writer, "\x1b[33mWARN\x1b[0m  {text}"),
            Level::INFO if metadata.target() == STAGE_TARGET => {
                writeln!(writer, "\x1b[1;34m==>\x1b[0m \x1b[1m{text}\x1b[0m")
            }
            Level::INFO => writeln!(writer, "  {text}"),
            _ => writeln!(writer, "  \x1b[2m{text}\x1b[0m"),
        }
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// Warnings and errors go to stderr, everything else to stdout; `verbose`
/// lowers the console level to `debug` and `RUST_LOG` overrides both. The
/// run log at `$XDG_CACHE_HOME/config-resolver/<command>.log` always gets
/// `debug` and above.
///
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        EnvFilter, Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let make_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .and(std::io::stdout.with_min_level(Level::INFO));

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(make_writer)
        .with_filter(console_filter);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(message: &str, kind: Option<&str>, source: Option<&str>) -> EventFields {
        EventFields {
            message: message.to_string(),
            kind: kind.map(String::from),
            source: source.map(String::from),
        }
    }

    #[test]
    fn render_prefixes_diagnostic_fields() {
        assert_eq!(
            fields("tie settled", Some("merge"), Some("registry:HKCU:\\Console")).render(),
            "[merge] registry:HKCU:\\Console: tie settled"
        );
        assert_eq!(fields("plain", None, None).render(), "plain");
    }

    #[test]
    fn file_line_tags_levels() {
        let warn = fields("\x1b[33mno match\x1b[0m", Some("selector"), Some("gaming"));
        assert_eq!(
            file_line(Level::WARN, "config_resolver", &warn, "12:00:00.000"),
            "[12:00:00.000]     [warn] [selector] gaming: no match"
        );
        let stage = fields("Resolving", None, None);
        assert_eq!(
            file_line(Level::INFO, STAGE_TARGET, &stage, "12:00:00.000"),
            "[12:00:00.000] ==> Resolving"
        );
        assert_eq!(
            file_line(Level::DEBUG, "config_resolver", &stage, "t"),
            "[t]     [debug] Resolving"
        );
    }

    #[test]
    fn diagnostics_reach_the_file_with_fields() {
        use crate::resolve::{DiagnosticKind, Diagnostics};

        let (log, _tmp, _guard) = super::super::isolated_logger();
        let mut diags = Diagnostics::new();
        diags.warn(DiagnosticKind::RuleApplication, "files:%APPDATA%", "unknown variable");
        let text = fs::read_to_string(log.log_path().unwrap()).unwrap();
        assert!(text.starts_with(&"=".repeat(42)));
        assert!(text.contains("[warn] [rule] files:%APPDATA%: unknown variable"));
    }
}
