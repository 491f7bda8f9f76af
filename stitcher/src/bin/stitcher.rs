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

//! CLI entry point. Reads a request document, resolves configuration, and drives
//! [`stitcher::outer_loop::stitch`] against a scripted `fakeModeDir` scenario (the real PCS/AM
//! wire transport is out of scope for this crate; see the crate-level docs).

use clap::Parser;
use log::{error, info};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;

use stitcher::config::{CliArgs, Config};
use stitcher::error::Error;
use stitcher::pcs::WorkflowMap;
use stitcher::testutil::{FakeAggregateClient, FakePcs};
use stitcher::xmldoc::XmlDoc;

/// The canned scenario a `fakeModeDir` describes: the PCS responses to hand back, in call order,
/// and the per-hop behaviour of the aggregate client double.
#[derive(Debug, Deserialize, Default)]
struct Scenario {
    #[serde(default)]
    pcs_responses: Vec<ScenarioPcsResponse>,
    #[serde(default)]
    assignments: BTreeMap<String, u16>,
    #[serde(default)]
    rejections: BTreeMap<String, Vec<u16>>,
    /// `geni_am_type` values `get_version` reports, keyed by aggregate URL.
    #[serde(default)]
    am_types: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ScenarioPcsResponse {
    rspec: String,
    #[serde(default)]
    workflow: WorkflowMap,
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let args = CliArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(args: &CliArgs) -> Result<(), Error> {
    let config = Config::load(args)?;
    let request_bytes = std::fs::read(&args.request)
        .map_err(|e| Error::InputMalformed(format!("cannot read request {}: {}", args.request.display(), e)))?;
    let request_doc = XmlDoc::parse(&request_bytes)
        .map_err(|e| Error::InputMalformed(format!("cannot parse request: {}", e)))?;

    let fake_dir = config.fake_mode_dir.as_ref().ok_or_else(|| {
        Error::InputMalformed(
            "no fakeModeDir configured; real PCS/aggregate RPC transport is out of scope for this \
             build, so a scripted scenario directory is required"
                .to_string(),
        )
    })?;
    let scenario_path = fake_dir.join("scenario.yaml");
    let scenario: Scenario = if scenario_path.exists() {
        let text = std::fs::read_to_string(&scenario_path).map_err(|e| {
            Error::InputMalformed(format!("cannot read {}: {}", scenario_path.display(), e))
        })?;
        serde_yaml::from_str(&text)
            .map_err(|e| Error::InputMalformed(format!("malformed {}: {}", scenario_path.display(), e)))?
    } else {
        Scenario::default()
    };

    let mut pcs = FakePcs::new();
    for resp in &scenario.pcs_responses {
        let rspec = XmlDoc::parse(resp.rspec.as_bytes())
            .map_err(|e| Error::InputMalformed(format!("malformed scripted PCS rspec: {}", e)))?;
        pcs = pcs.with_response(Ok(stitcher::pcs::PcsResponse { rspec, workflow: resp.workflow.clone() }));
    }

    let mut agg_client = FakeAggregateClient::new();
    for (hop_urn, tag) in &scenario.assignments {
        agg_client = agg_client.with_assignment(hop_urn, *tag);
    }
    for (hop_urn, tags) in &scenario.rejections {
        agg_client = agg_client.with_rejection(hop_urn, tags.clone());
    }
    for (url, am_types) in &scenario.am_types {
        agg_client = agg_client.with_am_types(url, am_types.clone());
    }
    let agg_client = Arc::new(agg_client);

    std::fs::create_dir_all(&args.out_dir)
        .map_err(|e| Error::InputMalformed(format!("cannot create {}: {}", args.out_dir.display(), e)))?;

    if config.no_reservation {
        info!("noReservation set; emitting expanded request without contacting any aggregate");
        let req = stitcher::normalize::parse(&request_doc)?;
        let mut expanded = request_doc.clone();
        stitcher::normalize::normalize(&mut expanded, &req, config.default_capacity)?;
        let out_path = args.out_dir.join("expanded-request.xml");
        std::fs::write(&out_path, expanded.to_string_pretty())
            .map_err(|e| Error::InputMalformed(format!("cannot write {}: {}", out_path.display(), e)))?;
        return Ok(());
    }

    let slice_cred = match &args.slice_cred {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| Error::InputMalformed(format!("cannot read slice credential {}: {}", path.display(), e)))?,
        None => String::new(),
    };

    let result = stitcher::stitch(&request_doc, &args.slice_urn, &slice_cred, &pcs, agg_client, &config)?;

    let manifest_path = args.out_dir.join(format!("{}-manifest.xml", slice_name(&args.slice_urn)));
    std::fs::write(&manifest_path, result.manifest.to_string_pretty())
        .map_err(|e| Error::InputMalformed(format!("cannot write {}: {}", manifest_path.display(), e)))?;

    let amlist_path = args.out_dir.join(format!("{}-amlist.txt", slice_name(&args.slice_urn)));
    let mut amlist = format!(
        "# slice: {}\n# allocated: {}\n",
        args.slice_urn,
        chrono::Utc::now().to_rfc3339()
    );
    for (url, urn) in &result.reserved {
        amlist.push_str(&format!("{},{}\n", url, urn));
    }
    std::fs::write(&amlist_path, amlist)
        .map_err(|e| Error::InputMalformed(format!("cannot write {}: {}", amlist_path.display(), e)))?;

    info!(
        "stitched {} aggregate(s) using {} PCS call(s)",
        result.reserved.len(),
        result.pcs_calls
    );
    Ok(())
}

/// Derive a filesystem-safe stem from a slice URN for the manifest/amlist filenames.
fn slice_name(slice_urn: &str) -> String {
    slice_urn
        .rsplit([':', '+'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("slice")
        .to_string()
}
