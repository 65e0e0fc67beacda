// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::Parser;

/// Agent session backend for the loke browser IDE.
///
/// Serves one workspace per process: either a local directory (`--dir`) or
/// a remote one over SSH (`--ssh user@host[:port]:/dir`).
#[derive(Debug, Parser)]
#[command(name = "loke", version, about)]
pub struct Cli {
    /// Local workspace directory
    #[arg(long, value_name = "PATH", conflicts_with = "ssh")]
    pub dir: Option<PathBuf>,

    /// Remote workspace: user@host[:port]:/dir
    #[arg(long, value_name = "TARGET")]
    pub ssh: Option<String>,

    /// SSH identity file for --ssh
    #[arg(long, value_name = "PATH", requires = "ssh")]
    pub key: Option<PathBuf>,

    /// TCP port for the HTTP/WebSocket listener (default from config)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Config file path (default: ~/.config/loke/config.yaml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log to stderr at debug level (or set LOKE_LOG)
    #[arg(long, short)]
    pub verbose: bool,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_dir() {
        let cli = Cli::parse_from(["loke", "--dir", "/srv/app", "--port", "9000"]);
        assert_eq!(cli.dir.unwrap(), PathBuf::from("/srv/app"));
        assert_eq!(cli.port, Some(9000));
        assert!(cli.ssh.is_none());
    }

    #[test]
    fn parses_ssh_target_with_key() {
        let cli = Cli::parse_from([
            "loke",
            "--ssh",
            "deploy@host:2222:/srv/app",
            "--key",
            "/home/me/.ssh/id_ed25519",
        ]);
        assert_eq!(cli.ssh.as_deref(), Some("deploy@host:2222:/srv/app"));
        assert!(cli.key.is_some());
    }

    #[test]
    fn dir_and_ssh_conflict() {
        let result = Cli::try_parse_from(["loke", "--dir", "/a", "--ssh", "u@h:/b"]);
        assert!(result.is_err());
    }

    #[test]
    fn key_requires_ssh() {
        let result = Cli::try_parse_from(["loke", "--dir", "/a", "--key", "/k"]);
        assert!(result.is_err());
    }
}
