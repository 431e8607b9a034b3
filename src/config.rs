use clap::Parser;
use std::path::PathBuf;

pub const LOG_ENV: &str = "RESULTSD_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

/// Student results sidecar. Reads one JSON request per line on stdin and
/// writes one JSON response per line on stdout. Logs go to stderr.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "resultsd", version, about)]
pub struct Cli {
    /// Workspace directory to open at startup
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// tracing filter directive, e.g. "resultsd=debug"
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
}

impl Cli {
    /// Flag wins over the environment; both fall back to `warn`.
    pub fn resolve_log_filter(&self, env_value: Option<String>) -> String {
        self.log_filter
            .clone()
            .or(env_value)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }
}

pub fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_workspace_and_filter_flags() {
        let cli = Cli::parse_from([
            "resultsd",
            "--workspace",
            "/tmp/ws",
            "--log-filter",
            "resultsd=debug",
        ]);
        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cli.resolve_log_filter(None), "resultsd=debug");
    }

    #[test]
    fn log_filter_precedence() {
        let cli = Cli::parse_from(["resultsd"]);
        assert_eq!(cli.resolve_log_filter(None), "warn");
        assert_eq!(cli.resolve_log_filter(Some("info".into())), "info");
        assert_eq!(cli.resolve_log_filter(Some("  ".into())), "warn");
    }
}
