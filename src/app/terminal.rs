//! What stderr can show, and the log subscriber that writes to it.

use std::ffi::OsString;
use std::io::{self, IsTerminal};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use crate::cli::PipelineArgs;

/// HTML parsing crates log every tokenizer step at debug level.
const QUIET_DEPENDENCIES: &[&str] = &["html5ever=warn", "selectors=warn"];

/// Output capabilities resolved once from flags, environment and stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TerminalSettings {
    pub(crate) color: bool,
    /// Stderr is a live terminal the user watches and `--quiet` is off.
    pub(crate) interactive: bool,
}

impl TerminalSettings {
    pub(crate) fn detect(args: &PipelineArgs) -> Self {
        Self::resolve(
            args,
            |name| std::env::var_os(name),
            io::stderr().is_terminal(),
        )
    }

    fn resolve(
        args: &PipelineArgs,
        env: impl Fn(&str) -> Option<OsString>,
        stderr_is_terminal: bool,
    ) -> Self {
        let no_color_env = env("NO_COLOR").is_some_and(|value| !value.is_empty());
        let dumb = env("TERM").is_some_and(|value| value.eq_ignore_ascii_case("dumb"));
        Self {
            color: !(args.no_color || no_color_env || dumb),
            interactive: stderr_is_terminal && !args.quiet && !dumb,
        }
    }

    /// A crawl spinner needs a watcher and at least one volume to count.
    pub(crate) fn show_crawl_progress(self, volumes: usize) -> bool {
        self.interactive && volumes > 0
    }

    /// Installs the stderr subscriber. `RUST_LOG` wins over `level` unless the
    /// level came from `-v`/`-q` on the command line.
    pub(crate) fn init_tracing(self, level: &str, force_cli_level: bool) {
        let from_env = if force_cli_level {
            None
        } else {
            EnvFilter::try_from_default_env().ok()
        };
        let filter = from_env.unwrap_or_else(|| cli_filter(level));
        let _ = tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_ansi(self.color)
            .with_env_filter(filter)
            .try_init();
    }
}

fn cli_filter(level: &str) -> EnvFilter {
    QUIET_DEPENDENCIES
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(EnvFilter::new(level), EnvFilter::add_directive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    fn args(flags: &[&str]) -> PipelineArgs {
        let mut argv = vec!["topicmap"];
        argv.extend_from_slice(flags);
        argv.push("crawl");
        Cli::try_parse_from(argv).expect("valid flags").pipeline
    }

    fn env_of(
        vars: &'static [(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Option<OsString> {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| OsString::from(value))
        }
    }

    #[test]
    fn test_color_disabled_by_flag_env_or_dumb_terminal() {
        let plain = args(&[]);
        assert!(TerminalSettings::resolve(&plain, env_of(&[]), true).color);
        assert!(!TerminalSettings::resolve(&args(&["--no-color"]), env_of(&[]), true).color);
        assert!(!TerminalSettings::resolve(&plain, env_of(&[("NO_COLOR", "1")]), true).color);
        assert!(TerminalSettings::resolve(&plain, env_of(&[("NO_COLOR", "")]), true).color);
        assert!(!TerminalSettings::resolve(&plain, env_of(&[("TERM", "DUMB")]), true).color);
    }

    #[test]
    fn test_crawl_progress_needs_watched_terminal_and_volumes() {
        let plain = args(&[]);
        let watched = TerminalSettings::resolve(&plain, env_of(&[]), true);
        assert!(watched.show_crawl_progress(3));
        assert!(!watched.show_crawl_progress(0));

        let piped = TerminalSettings::resolve(&plain, env_of(&[]), false);
        assert!(!piped.show_crawl_progress(3));

        let quiet = TerminalSettings::resolve(&args(&["-q"]), env_of(&[]), true);
        assert!(!quiet.show_crawl_progress(3));

        let dumb = TerminalSettings::resolve(&plain, env_of(&[("TERM", "dumb")]), true);
        assert!(!dumb.show_crawl_progress(3));
    }

    #[test]
    fn test_cli_filter_keeps_parser_crates_at_warn() {
        let rendered = cli_filter("debug").to_string();
        assert!(rendered.contains("html5ever=warn"));
        assert!(rendered.contains("selectors=warn"));
        assert!(rendered.contains("debug"));
    }
}
