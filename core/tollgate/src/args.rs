// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Command line argument parsing for the tollgate sidecar

use std::path::{Path, PathBuf};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "tollgate",
    about = "Envoy ext_authz sidecar for RFC 8693 token exchange and delegated authorization"
)]
pub struct Args {
    /// Path to the tollgate configuration file
    #[arg(
        short,
        long,
        default_value = "/run/tollgate/config/tollgate.yaml",
        help = "Path to the configuration file"
    )]
    config: PathBuf,

    /// Print version information and exit
    #[arg(long, help = "Print version information and exit")]
    version: bool,
}

impl Args {
    /// Get configuration file path
    pub fn config(&self) -> &Path {
        &self.config
    }

    /// Check if the version flag is set
    pub fn version(&self) -> bool {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        let args = Args::parse_from(["tollgate"]);
        assert_eq!(
            args.config(),
            Path::new("/run/tollgate/config/tollgate.yaml")
        );
        assert!(!args.version());
    }

    #[test]
    fn test_explicit_config_path() {
        let args = Args::parse_from(["tollgate", "--config", "/etc/tollgate.yaml"]);
        assert_eq!(args.config(), Path::new("/etc/tollgate.yaml"));
    }

    #[test]
    fn test_version_flag() {
        let args = Args::parse_from(["tollgate", "--version"]);
        assert!(args.version());
    }
}
