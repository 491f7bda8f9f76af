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

#![deny(missing_docs)]

//! # stitcher
//!
//! A client-side orchestrator that reserves a multi-aggregate network slice whose links cross
//! administrative boundaries. Given a request describing nodes and the links between them, this
//! crate negotiates VLAN tags across aggregates through an external path-computation service,
//! reserves resources in dependency order, recovers from VLAN conflicts, and emits a single
//! combined manifest.
//!
//! ## Usage
//!
//! ```no_run
//! use stitcher::config::Config;
//! use stitcher::outer_loop::stitch;
//! use stitcher::xmldoc::XmlDoc;
//! # use std::sync::Arc;
//! # struct MyPcs;
//! # impl stitcher::pcs::PathComputationService for MyPcs {
//! #     fn compute_path(&self, _: &str, rspec: &XmlDoc, _: &stitcher::pcs::RoutingProfileOptions)
//! #         -> Result<stitcher::pcs::PcsResponse, stitcher::error::PcsError> {
//! #         Ok(stitcher::pcs::PcsResponse { rspec: rspec.clone(), workflow: Default::default() })
//! #     }
//! #     fn list_aggregates(&self, _: bool, _: std::time::Duration)
//! #         -> Result<std::collections::BTreeMap<String, String>, stitcher::error::PcsError> {
//! #         Ok(Default::default())
//! #     }
//! # }
//! # struct MyAm;
//! # impl stitcher::amclient::AggregateClient for MyAm {
//! #     fn get_version(&self, _: &str) -> Result<stitcher::amclient::VersionInfo, stitcher::error::AggregateError> {
//! #         Ok(Default::default())
//! #     }
//! #     fn reserve(&self, _: &str, _: &str, rspec: &XmlDoc) -> Result<XmlDoc, stitcher::error::AggregateError> {
//! #         Ok(rspec.clone())
//! #     }
//! #     fn delete(&self, _: &str, _: &str) -> Result<(), stitcher::error::AggregateError> {
//! #         Ok(())
//! #     }
//! # }
//!
//! fn main() -> Result<(), stitcher::error::Error> {
//!     let request = XmlDoc::parse(br#"<rspec/>"#).unwrap();
//!     let config = Config::default();
//!     let result = stitch(&request, "urn:slice", "cred", &MyPcs, Arc::new(MyAm), &config)?;
//!     println!("{}", result.manifest.to_string_pretty());
//!     Ok(())
//! }
//! ```

pub mod amclient;
pub mod config;
pub mod error;
pub mod fsm;
pub mod launcher;
pub mod manifest;
pub mod model;
pub mod normalize;
pub mod outer_loop;
pub mod pcs;
pub mod vlan;
pub mod workflow;
pub mod xmldoc;

pub mod testutil;

pub use error::Error;
pub use outer_loop::{stitch, StitchResult};
