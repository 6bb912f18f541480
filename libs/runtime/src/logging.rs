use crate::config::{LoggingConfig, Section};
use crate::paths::resolve_under;
use std::{
    io::{IsTerminal, Write},
    path::Path,
    sync::Arc,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::Targets, fmt};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;

const DEFAULT_SECTION: &str = "default";

// -------- level helpers --------

/// `None` means "off"; unknown names fall back to INFO.
fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => None,
        _ => Some(LevelFilter::INFO),
    }
}

/// Returns true if target == prefix or target starts with "prefix::"
fn matches_target_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// -------- rotating file writer --------

#[derive(Clone)]
struct RotatingFile(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

/// A file handle that may be absent; writes to an absent file are dropped.
struct RoutedWrite(Option<RotatingFile>);

impl Write for RoutedWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Picks the log file by target: the longest matching section prefix, else the
/// default file.
#[derive(Default)]
struct FileRouter {
    default: Option<RotatingFile>,
    by_prefix: Vec<(String, RotatingFile)>,
}

impl FileRouter {
    fn resolve_for(&self, target: &str) -> Option<RotatingFile> {
        self.by_prefix
            .iter()
            .filter(|(prefix, _)| matches_target_prefix(target, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, w)| w.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = RoutedWrite;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWrite(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWrite(self.resolve_for(meta.target()))
    }
}

fn open_rotating_file(
    section: &Section,
    base_dir: &Path,
) -> Result<RotatingFile, std::io::Error> {
    let path = resolve_under(base_dir, &section.file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let max_bytes = section.max_size_mb.unwrap_or(100) * 1024 * 1024;
    let limit = match section.max_age_days {
        Some(days) => FileLimit::Age(chrono::Duration::days(i64::from(days))),
        None => FileLimit::MaxFiles(section.max_backups.unwrap_or(3)),
    };

    let rot = FileRotate::new(
        &path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(RotatingFile(Arc::new(Mutex::new(rot))))
}

// -------- plan --------

/// Filters and writers derived from a [`LoggingConfig`].
struct LogPlan {
    console: Targets,
    file: Targets,
    router: FileRouter,
}

fn build_plan(cfg: &LoggingConfig, base_dir: &Path) -> LogPlan {
    let default = cfg.get(DEFAULT_SECTION);

    let default_console = default
        .and_then(|s| parse_level(&s.console_level))
        .unwrap_or(LevelFilter::OFF);
    let default_file_level = default.map(|s| s.file_level.as_str()).unwrap_or("");

    let mut router = FileRouter::default();
    if let Some(section) = default.filter(|s| !s.file.trim().is_empty()) {
        router.default = open_or_report(DEFAULT_SECTION, section, base_dir);
    }

    let default_file = if router.default.is_some() {
        parse_level(default_file_level).unwrap_or(LevelFilter::OFF)
    } else {
        LevelFilter::OFF
    };

    let mut console = Targets::new().with_default(default_console);
    let mut file = Targets::new().with_default(default_file);

    for (target, section) in cfg.iter().filter(|(k, _)| k.as_str() != DEFAULT_SECTION) {
        let console_level = parse_level(&section.console_level).unwrap_or(LevelFilter::OFF);
        console = console.with_target(target.clone(), console_level);

        let own_file = if section.file.trim().is_empty() {
            None
        } else {
            open_or_report(target, section, base_dir)
        };
        let has_file = own_file.is_some() || router.default.is_some();
        if let Some(writer) = own_file {
            router.by_prefix.push((target.clone(), writer));
        }

        let level_name = if section.file_level.trim().is_empty() {
            default_file_level
        } else {
            section.file_level.as_str()
        };
        let file_level = match parse_level(level_name) {
            Some(level) if has_file => level,
            _ => LevelFilter::OFF,
        };
        file = file.with_target(target.clone(), file_level);
    }

    LogPlan {
        console,
        file,
        router,
    }
}

fn open_or_report(name: &str, section: &Section, base_dir: &Path) -> Option<RotatingFile> {
    match open_rotating_file(section, base_dir) {
        Ok(w) => Some(w),
        Err(e) => {
            // The subscriber is not installed yet.
            eprintln!(
                "Failed to open log file for '{}': {} ({})",
                name,
                resolve_under(base_dir, &section.file).display(),
                e
            );
            None
        }
    }
}

// -------- public init --------

/// Initialize logging from configuration.
/// - `cfg`: sections keyed by target (`default` is the catch-all)
/// - `base_dir`: directory that relative log file paths are resolved against (usually home_dir)
///
/// Calling it again after a subscriber is installed is a no-op.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

    // Bridge `log` → `tracing` before installing the subscriber
    let _ = tracing_log::LogTracer::init();

    if cfg.is_empty() {
        init_default_logging();
        return;
    }

    let plan = build_plan(cfg, base_dir);
    let ansi = std::io::stderr().is_terminal();

    // stdout belongs to command output.
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(plan.console);

    let file_layer = (!plan.router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(plan.router)
            .with_filter(plan.file)
    });

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

fn init_default_logging() {
    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .try_init();
}

// =================== tests ===================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_age_days: None,
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(parse_level("trace"), Some(LevelFilter::TRACE));
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level(" Info "), Some(LevelFilter::INFO));
        assert_eq!(parse_level("warn"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("ERROR"), Some(LevelFilter::ERROR));
        assert_eq!(parse_level("off"), None);
        assert_eq!(parse_level("none"), None);
        assert_eq!(parse_level("bogus"), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_target_prefix_matching() {
        assert!(matches_target_prefix("repokit_db", "repokit_db"));
        assert!(matches_target_prefix("repokit_db::paginator", "repokit_db"));
        assert!(!matches_target_prefix("repokit_dbx", "repokit_db"));
        assert!(!matches_target_prefix("sqlx::query", "repokit_db"));
    }

    #[test]
    fn test_console_levels_per_target() {
        let tmp = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("default".into(), section("warn", "", ""));
        cfg.insert("repokit_db".into(), section("trace", "", ""));
        cfg.insert("sqlx".into(), section("off", "", ""));

        let plan = build_plan(&cfg, tmp.path());
        assert!(plan
            .console
            .would_enable("repokit_db::paginator", &tracing::Level::TRACE));
        assert!(plan.console.would_enable("other", &tracing::Level::WARN));
        assert!(!plan.console.would_enable("other", &tracing::Level::INFO));
        assert!(!plan.console.would_enable("sqlx::query", &tracing::Level::ERROR));
        assert!(plan.router.is_empty());
        assert!(!plan.file.would_enable("repokit_db", &tracing::Level::ERROR));
    }

    #[test]
    fn test_files_are_routed_by_target() {
        let tmp = tempdir().unwrap();
        let mut cfg = default_logging_config();
        cfg.insert(
            "repokit_db".into(),
            section("info", "logs/db.log", "trace"),
        );
        cfg.insert("repokit_demo".into(), section("info", "", ""));

        let plan = build_plan(&cfg, tmp.path());
        assert!(tmp.path().join("logs").is_dir());
        assert!(plan.router.default.is_some());
        assert_eq!(plan.router.by_prefix.len(), 1);

        let db = plan.router.resolve_for("repokit_db::repository").unwrap();
        let own = &plan.router.by_prefix[0].1;
        assert!(Arc::ptr_eq(&db.0, &own.0));

        let other = plan.router.resolve_for("repokit_demo").unwrap();
        let default = plan.router.default.as_ref().unwrap();
        assert!(Arc::ptr_eq(&other.0, &default.0));

        // Empty file_level inherits the default section's level.
        assert!(plan.file.would_enable("repokit_demo", &tracing::Level::DEBUG));
        assert!(!plan.file.would_enable("repokit_demo", &tracing::Level::TRACE));
        assert!(plan.file.would_enable("repokit_db", &tracing::Level::TRACE));
    }

    #[test]
    fn test_writes_reach_the_file() {
        let tmp = tempdir().unwrap();
        let s = section("info", "out/app.log", "debug");
        let mut w = open_rotating_file(&s, tmp.path()).unwrap();
        w.write_all(b"{\"msg\":\"hello\"}\n").unwrap();
        w.flush().unwrap();

        let body = std::fs::read_to_string(tmp.path().join("out/app.log")).unwrap();
        assert!(body.contains("hello"));
    }

    #[test]
    fn test_routed_write_without_file_drops() {
        let mut w = RoutedWrite(None);
        assert_eq!(w.write(b"abc").unwrap(), 3);
        w.flush().unwrap();
    }
}
