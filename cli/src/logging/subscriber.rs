//! Tracing subscriber setup: console formatter, file layer, and initialisation.
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use tracing::span;
use tracing_subscriber::registry::LookupSpan;

use super::filter::strip_codes;
use super::logger::log_file_for;

/// Environment variable holding an `EnvFilter` directive for the console.
pub const LOG_ENV: &str = "DOTFILES_LOG";

/// UTC timestamp format of the file header.
const HEADER_TIME: &str = "%Y-%m-%d %H:%M:%S";

/// UTC timestamp format of each file line.
const LINE_TIME: &str = "%H:%M:%S";

/// `NO_COLOR` is honoured when set to anything non-empty.
fn color_disabled() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty())
}

/// Extracts the `message` field and every other field from an event or span.
#[derive(Default)]
struct MessageExtractor {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl MessageExtractor {
    /// Render the non-message fields as `key=value` pairs.
    fn render_fields(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{key}={value}");
        }
        out
    }
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }
}

/// Rendered fields of a span, stored in its extensions by [`FileLayer`].
struct SpanFields(String);

/// A [`tracing_subscriber::Layer`] that appends all events to the persistent
/// log file with timestamps and ANSI codes stripped.
///
/// Fields of enclosing spans (`tool=stow op=install`) are written between
/// the level tag and the message, so the file carries the key-value pairs
/// the console omits.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Open the log file for `command` under the cache directory.
    ///
    /// Returns `None` if the cache directory cannot be created or the file
    /// cannot be opened.
    pub(super) fn new(command: &str) -> Option<Self> {
        Self::create(&log_file_for(command)?)
    }

    /// Truncate `path`, write a run header, and return a layer appending to it.
    pub(super) fn create(path: &Path) -> Option<Self> {
        let version =
            option_env!("DOTFILES_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let header = format!(
            "==========================================\n\
             Dotfiles manager {version} {}\n\
             ==========================================\n",
            chrono::Utc::now().format(HEADER_TIME),
        );
        fs::write(path, header).ok()?;
        let file = fs::OpenOptions::new().append(true).open(path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S> tracing_subscriber::Layer<S> for FileLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &span::Attributes<'_>,
        id: &span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut extractor = MessageExtractor::default();
        attrs.record(&mut extractor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut()
                .insert(SpanFields(extractor.render_fields()));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();

        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        let msg = strip_codes(&extractor.message);
        let ts = chrono::Utc::now().format(LINE_TIME);

        let mut fields: Vec<String> = ctx
            .event_scope(event)
            .map(|scope| {
                scope
                    .from_root()
                    .filter_map(|s| s.extensions().get::<SpanFields>().map(|f| f.0.clone()))
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let own = extractor.render_fields();
        if !own.is_empty() {
            fields.push(own);
        }
        let kv = if fields.is_empty() {
            String::new()
        } else {
            format!("{{{}}} ", fields.join(" "))
        };

        let line = match (level, target) {
            (tracing::Level::INFO, "dotfiles::stage") => format!("[{ts}] ==> {kv}{msg}"),
            (tracing::Level::INFO, "dotfiles::dry_run") => {
                format!("[{ts}]     [dry run] {kv}{msg}")
            }
            (tracing::Level::ERROR, _) => format!("[{ts}]     [error] {kv}{msg}"),
            (tracing::Level::WARN, _) => format!("[{ts}]     [warn] {kv}{msg}"),
            (tracing::Level::DEBUG, _) => format!("[{ts}]     [debug] {kv}{msg}"),
            _ => format!("[{ts}]     {kv}{msg}"),
        };

        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] that emits dotfiles-style
/// console output.
struct DotfilesFormatter {
    color: bool,
    show_fields: bool,
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for DotfilesFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();

        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);

        let mut msg = extractor.message.clone();
        if self.show_fields {
            let scope: Vec<String> = ctx
                .event_scope()
                .map(|scope| {
                    scope
                        .from_root()
                        .filter_map(|s| {
                            s.extensions()
                                .get::<tracing_subscriber::fmt::FormattedFields<N>>()
                                .map(|f| f.fields.clone())
                        })
                        .filter(|f| !f.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            if !scope.is_empty() {
                msg = format!("\x1b[2m[{}]\x1b[0m {msg}", scope.join(" "));
            }
        }

        let line = match level {
            tracing::Level::ERROR => format!("\x1b[31mERROR\x1b[0m {msg}"),
            tracing::Level::WARN => format!("\x1b[33mWARN\x1b[0m  {msg}"),
            tracing::Level::INFO if target == "dotfiles::stage" => {
                format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m")
            }
            tracing::Level::INFO if target == "dotfiles::dry_run" => {
                format!("  \x1b[33m[DRY RUN]\x1b[0m {msg}")
            }
            tracing::Level::INFO => format!("  {msg}"),
            _ => format!("  \x1b[2m{msg}\x1b[0m"),
        };
        if self.color {
            writeln!(writer, "{line}")
        } else {
            writeln!(writer, "{}", strip_codes(&line))
        }
    }
}

/// Console settings for [`init_subscriber`].
#[derive(Debug, Clone)]
pub struct ConsoleOptions<'a> {
    /// `global.log_level` (`debug`, `info`, `warn`, `error`).
    pub level: &'a str,
    /// Force `debug` and show span fields.
    pub verbose: bool,
    /// Emit ANSI colours; also disabled by `NO_COLOR`.
    pub color: bool,
}

/// Console filter: `DOTFILES_LOG` when set, else `debug` under verbose,
/// else the configured level.
fn console_filter(options: &ConsoleOptions<'_>) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return filter;
    }
    let level = if options.verbose {
        "debug"
    } else {
        options.level
    };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise the global [`tracing`] subscriber.
///
/// Sets up a console layer that formats events in the dotfiles output style
/// and a file layer that writes all events (including `debug`) to
/// `$XDG_CACHE_HOME/dotfiles/<command>.log`.
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(options: &ConsoleOptions<'_>, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let make_writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .and(std::io::stdout.with_min_level(tracing::Level::INFO));

    let console_layer = fmt::layer()
        .event_format(DotfilesFormatter {
            color: options.color && !color_disabled(),
            show_fields: options.verbose,
        })
        .with_writer(make_writer)
        .with_filter(console_filter(options));

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();
}

/// Install a thread-local subscriber with only a [`FileLayer`] at `path`.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) fn file_only_subscriber(path: &Path) -> tracing::dispatcher::DefaultGuard {
    use tracing_subscriber::{Layer as _, filter::LevelFilter, layer::SubscriberExt as _};

    let layer = FileLayer::create(path).expect("failed to create file layer");
    let subscriber = tracing_subscriber::registry().with(layer.with_filter(LevelFilter::DEBUG));
    tracing::dispatcher::set_default(&tracing::Dispatch::new(subscriber))
}
