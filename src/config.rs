use clap::Parser;
use std::path::PathBuf;

/// Exam-scoring sidecar: newline-delimited JSON requests on stdin, one JSON
/// response per line on stdout.
#[derive(Debug, Parser)]
#[command(name = "nursexamd", version, about)]
pub struct Config {
    /// Workspace directory to open at startup.
    #[arg(long, env = "NURSEXAMD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log filter directives, written to stderr.
    #[arg(long = "log", env = "NURSEXAMD_LOG", default_value = "nursexamd=info")]
    pub log_filter: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let cfg = Config::try_parse_from(["nursexamd"]).expect("parse");
        assert_eq!(cfg.log_filter, "nursexamd=info");
    }

    #[test]
    fn explicit_flags_win() {
        let cfg = Config::try_parse_from(["nursexamd", "--workspace", "/tmp/ws", "--log", "debug"])
            .expect("parse");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.log_filter, "debug");
    }
}
