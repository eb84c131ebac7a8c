//! deskship - desktop release pipeline and self-update client
//!
//! deskship automates shipping a desktop application: building a binary per
//! platform, code-signing and notarizing the macOS bundle, zipping the build
//! output into a versioned release folder, generating a Windows installer,
//! publishing everything to a GitHub-style release host, and updating
//! installed copies from that host.
//!
//! # Architecture Overview
//!
//! Two independent halves share the release host client and archive service:
//!
//! - The **pipeline** ([`pipeline::Orchestrator`]) runs the stages of one
//!   release in a fixed order: assign version, build, sign, package,
//!   installer, publish. Cancellation is checked between every stage and
//!   between platforms; a failed stage stops the run and reports why.
//! - The **updater** ([`updater::UpdateResolver`]) runs inside a deployed
//!   application. It finds the newest eligible release, picks the asset for
//!   the running platform, downloads and verifies it, and swaps the
//!   installation once the application has exited.
//!
//! # Core Modules
//!
//! ## Release pipeline
//! - [`pipeline`] - stage orchestration, build thread, signing, installers, publishing
//! - [`config`] - `deskship.toml` loading, validation and version write-back
//! - [`version`] - version parsing, comparison and assignment
//! - [`platform`] - platform targets and their naming conventions
//!
//! ## Self-update
//! - [`updater`] - update checks, downloads and installation
//!
//! ## Shared services
//! - [`host`] - release host HTTP client
//! - [`archive`] - zip compression, verification and extraction
//! - [`process`] - external tool invocation and retries
//! - [`core`] - error types and user-facing error formatting
//! - [`utils`] - filesystem helpers, temporary directories, progress bars
//! - [`cli`] - command-line front-end
//!
//! # Configuration (deskship.toml)
//!
//! ```toml
//! platforms = ["windows", "macos", "linux"]
//!
//! [product]
//! name = "Widget"
//! version = "1.0.4"
//! bundle_id = "com.acme.widget"
//!
//! [build]
//! command = ["cargo", "build", "--release", "--target", "{target}"]
//! artifact = "target/{target}/release/{executable}"
//!
//! [publish]
//! enabled = true
//! repository = "https://github.com/acme/widget"
//! token = "env:GITHUB_TOKEN"
//!
//! [updater]
//! repository = "https://github.com/acme/widget"
//! product_name = "Widget"
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! deskship run                      # full pipeline, next patch version
//! deskship run --release-version 2.0.0
//! deskship build --platform linux   # build only
//! deskship package                  # zip existing build output
//! deskship trigger-dmg              # disk image for the newest release
//! deskship validate --format json
//! deskship check-update --current-version 1.0.4
//! ```
//!
//! # Output Layout
//!
//! ```text
//! {output_root}/
//! ├── Builds/
//! │   ├── Widget-Windows/Widget.exe
//! │   ├── Widget-MacOS/Widget.app
//! │   └── Widget-Linux/Widget
//! └── Releases/
//!     └── v1.0.5/
//!         ├── Widget-Windows.zip
//!         ├── Widget-MacOS.zip
//!         ├── Widget-Linux.zip
//!         └── Widget-Installer.exe
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod host;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod updater;
pub mod utils;
pub mod version;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
