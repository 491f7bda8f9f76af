// Snowcap: Synthesizing Network-Wide Configuration Updates
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Configuration: every option the core and binary need, resolvable from, in increasing
//! priority, built-in defaults, a YAML file (`serde_yaml`), and CLI flags (`clap`). The outer
//! loop and the rest of the core only ever see the fully resolved [`Config`]; [`PartialConfig`]
//! and [`CliArgs`] exist purely to get there.

use crate::error::Error;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Every config field as an optional override, the shape both the YAML file and the CLI parse
/// into before being layered onto [`Config::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialConfig {
    /// PCS endpoint.
    pub scs_url: Option<String>,
    /// SSL/read timeout for every external RPC, in seconds.
    pub ssl_timeout_secs: Option<u64>,
    /// Read canned PCS responses from this directory; skip credentials and the slice check.
    pub fake_mode_dir: Option<PathBuf>,
    /// Emit the expanded request; do not contact any aggregate.
    pub no_reservation: Option<bool>,
    /// Hop URNs (or `urn=tags` entries) excluded from every path.
    pub exclude_hop: Option<Vec<String>>,
    /// Hop URNs included (required) on every path.
    pub include_hop: Option<Vec<String>>,
    /// Default capacity (bits/sec) for synthesised properties.
    pub default_capacity: Option<u64>,
    /// Never rewrite orca-family dual URLs to the ExoSM endpoint.
    pub no_exo_sm: Option<bool>,
    /// Always rewrite orca-family dual URLs to the ExoSM endpoint.
    pub use_exo_sm: Option<bool>,
    /// Maximum number of PCS invocations per run.
    pub max_scs_calls: Option<u32>,
    /// Insert a synthetic terminal node to satisfy single-endpoint stitched links.
    pub fixed_endpoint: Option<bool>,
}

impl PartialConfig {
    /// Layer `override_with` on top of `self`: any field `override_with` sets wins.
    pub fn merge(self, override_with: PartialConfig) -> PartialConfig {
        PartialConfig {
            scs_url: override_with.scs_url.or(self.scs_url),
            ssl_timeout_secs: override_with.ssl_timeout_secs.or(self.ssl_timeout_secs),
            fake_mode_dir: override_with.fake_mode_dir.or(self.fake_mode_dir),
            no_reservation: override_with.no_reservation.or(self.no_reservation),
            exclude_hop: override_with.exclude_hop.or(self.exclude_hop),
            include_hop: override_with.include_hop.or(self.include_hop),
            default_capacity: override_with.default_capacity.or(self.default_capacity),
            no_exo_sm: override_with.no_exo_sm.or(self.no_exo_sm),
            use_exo_sm: override_with.use_exo_sm.or(self.use_exo_sm),
            max_scs_calls: override_with.max_scs_calls.or(self.max_scs_calls),
            fixed_endpoint: override_with.fixed_endpoint.or(self.fixed_endpoint),
        }
    }

    /// Parse a YAML config file.
    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InputMalformed(format!("cannot read config file {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text)
            .map_err(|e| Error::InputMalformed(format!("malformed config file {}: {}", path.display(), e)))
    }
}

/// CLI flags, parsed with `clap`'s derive API. Lives in the ambient/binary layer; the library
/// never depends on this type directly, only on the [`PartialConfig`] it converts into.
#[derive(Parser, Debug, Clone)]
#[clap(name = "stitcher", about = "Reserve a multi-aggregate network slice")]
pub struct CliArgs {
    /// Path to the request document to stitch.
    #[clap(long)]
    pub request: PathBuf,
    /// URN of the slice being stitched.
    #[clap(long)]
    pub slice_urn: String,
    /// Path to a file holding the slice credential. Ignored (and may be omitted) under
    /// `fakeModeDir`, which skips credential validation entirely.
    #[clap(long)]
    pub slice_cred: Option<PathBuf>,
    /// Path to a YAML config file, layered under these flags.
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// PCS endpoint URL.
    #[clap(long)]
    pub scs_url: Option<String>,
    /// SSL/read timeout in seconds.
    #[clap(long)]
    pub ssl_timeout_secs: Option<u64>,
    /// Read canned PCS responses from this directory instead of a real PCS.
    #[clap(long)]
    pub fake_mode_dir: Option<PathBuf>,
    /// Emit the expanded request; do not contact any aggregate.
    #[clap(long)]
    pub no_reservation: bool,
    /// Exclude this hop URN (or `urn=tags`) from every path. Repeatable.
    #[clap(long)]
    pub exclude_hop: Vec<String>,
    /// Include (require) this hop URN on every path. Repeatable.
    #[clap(long)]
    pub include_hop: Vec<String>,
    /// Default capacity, in bits/sec, for synthesised properties.
    #[clap(long)]
    pub default_capacity: Option<u64>,
    /// Never rewrite orca-family dual URLs to the ExoSM endpoint.
    #[clap(long)]
    pub no_exo_sm: bool,
    /// Always rewrite orca-family dual URLs to the ExoSM endpoint.
    #[clap(long)]
    pub use_exo_sm: bool,
    /// Maximum number of PCS invocations per run.
    #[clap(long)]
    pub max_scs_calls: Option<u32>,
    /// Insert a synthetic terminal node to satisfy single-endpoint stitched links.
    #[clap(long)]
    pub fixed_endpoint: bool,
    /// Directory to write the combined manifest and aggregate list file into.
    #[clap(long, default_value = ".")]
    pub out_dir: PathBuf,
}

impl From<&CliArgs> for PartialConfig {
    fn from(args: &CliArgs) -> Self {
        PartialConfig {
            scs_url: args.scs_url.clone(),
            ssl_timeout_secs: args.ssl_timeout_secs,
            fake_mode_dir: args.fake_mode_dir.clone(),
            no_reservation: if args.no_reservation { Some(true) } else { None },
            exclude_hop: if args.exclude_hop.is_empty() { None } else { Some(args.exclude_hop.clone()) },
            include_hop: if args.include_hop.is_empty() { None } else { Some(args.include_hop.clone()) },
            default_capacity: args.default_capacity,
            no_exo_sm: if args.no_exo_sm { Some(true) } else { None },
            use_exo_sm: if args.use_exo_sm { Some(true) } else { None },
            max_scs_calls: args.max_scs_calls,
            fixed_endpoint: if args.fixed_endpoint { Some(true) } else { None },
        }
    }
}

/// Fully resolved configuration the core operates on.
#[derive(Debug, Clone)]
pub struct Config {
    /// PCS endpoint.
    pub scs_url: String,
    /// SSL/read timeout for every external RPC.
    pub ssl_timeout: Duration,
    /// Read canned PCS responses from this directory; skip credentials and the slice check.
    pub fake_mode_dir: Option<PathBuf>,
    /// Emit the expanded request; do not contact any aggregate.
    pub no_reservation: bool,
    /// Hop URNs (or `urn=tags` entries) excluded from every path.
    pub exclude_hop: Vec<String>,
    /// Hop URNs included (required) on every path.
    pub include_hop: Vec<String>,
    /// Default capacity (bits/sec) for synthesised properties.
    pub default_capacity: u64,
    /// Never rewrite orca-family dual URLs to the ExoSM endpoint.
    pub no_exo_sm: bool,
    /// Always rewrite orca-family dual URLs to the ExoSM endpoint.
    pub use_exo_sm: bool,
    /// Maximum number of PCS invocations per run.
    pub max_scs_calls: u32,
    /// Insert a synthetic terminal node to satisfy single-endpoint stitched links.
    pub fixed_endpoint: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scs_url: "https://scs.example.org/".to_string(),
            ssl_timeout: Duration::from_secs(30),
            fake_mode_dir: None,
            no_reservation: false,
            exclude_hop: Vec::new(),
            include_hop: Vec::new(),
            default_capacity: 20_000_000,
            no_exo_sm: false,
            use_exo_sm: false,
            max_scs_calls: 5,
            fixed_endpoint: false,
        }
    }
}

impl Config {
    /// Apply a [`PartialConfig`] on top of [`Config::default`].
    pub fn from_partial(p: PartialConfig) -> Self {
        let defaults = Self::default();
        Self {
            scs_url: p.scs_url.unwrap_or(defaults.scs_url),
            ssl_timeout: p.ssl_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.ssl_timeout),
            fake_mode_dir: p.fake_mode_dir.or(defaults.fake_mode_dir),
            no_reservation: p.no_reservation.unwrap_or(defaults.no_reservation),
            exclude_hop: p.exclude_hop.unwrap_or(defaults.exclude_hop),
            include_hop: p.include_hop.unwrap_or(defaults.include_hop),
            default_capacity: p.default_capacity.unwrap_or(defaults.default_capacity),
            no_exo_sm: p.no_exo_sm.unwrap_or(defaults.no_exo_sm),
            use_exo_sm: p.use_exo_sm.unwrap_or(defaults.use_exo_sm),
            max_scs_calls: p.max_scs_calls.unwrap_or(defaults.max_scs_calls),
            fixed_endpoint: p.fixed_endpoint.unwrap_or(defaults.fixed_endpoint),
        }
    }

    /// Resolve a [`Config`] from defaults, an optional YAML file, and CLI flags, in that
    /// increasing priority order.
    pub fn load(args: &CliArgs) -> Result<Self, Error> {
        let mut partial = PartialConfig::default();
        if let Some(path) = &args.config {
            partial = partial.merge(PartialConfig::from_yaml_file(path)?);
        }
        partial = partial.merge(PartialConfig::from(args));
        Ok(Self::from_partial(partial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_file_overrides_defaults() {
        let file = PartialConfig { max_scs_calls: Some(2), scs_url: Some("https://file/".to_string()), ..Default::default() };
        let cli = PartialConfig { max_scs_calls: Some(9), ..Default::default() };
        let merged = PartialConfig::default().merge(file).merge(cli);
        let cfg = Config::from_partial(merged);
        assert_eq!(cfg.max_scs_calls, 9);
        assert_eq!(cfg.scs_url, "https://file/");
    }

    #[test]
    fn unset_fields_fall_back_to_defaults() {
        let cfg = Config::from_partial(PartialConfig::default());
        assert_eq!(cfg.max_scs_calls, 5);
        assert_eq!(cfg.default_capacity, 20_000_000);
    }

    #[test]
    fn from_yaml_file_reads_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_scs_calls: 7\nscs_url: https://pcs.example/\n").unwrap();
        let partial = PartialConfig::from_yaml_file(&path).unwrap();
        assert_eq!(partial.max_scs_calls, Some(7));
        assert_eq!(partial.scs_url.as_deref(), Some("https://pcs.example/"));
    }

    #[test]
    fn from_yaml_file_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_scs_calls: [not, a, number]\n").unwrap();
        assert!(PartialConfig::from_yaml_file(&path).is_err());
    }
}
