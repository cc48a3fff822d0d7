// CLI module for eval-adapter
// Author: kelexine (https://github.com/kelexine)

use crate::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

/// eval-adapter - intercepting proxy between an evaluation harness and a model endpoint
#[derive(Parser, Debug, Default)]
#[command(name = "eval-adapter", version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML). Defaults to ~/.eval-adapter/config.toml when present
    #[arg(short, long, env = "EVAL_ADAPTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Model endpoint to forward to
    #[arg(long)]
    pub upstream_url: Option<String>,

    /// Directory for caches, stats and reports
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.upstream_url {
            config.upstream.url = url.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.adapter.output_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_take_precedence() {
        let args = Args::parse_from([
            "eval-adapter",
            "--port",
            "9000",
            "--upstream-url",
            "http://model:8000/v1/completions",
        ]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.upstream.url, "http://model:8000/v1/completions");
        assert_eq!(config.server.host, "127.0.0.1");
    }
}
