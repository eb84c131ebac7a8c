//! The release pipeline.
//!
//! A run takes a [`ReleaseConfig`](crate::config::ReleaseConfig) snapshot
//! through a fixed sequence of [`Stage`]s:
//!
//! | stage | runs when | produces |
//! |---|---|---|
//! | assign version | always | the version string |
//! | build | always | `Builds/{Product}-{Platform}/` per platform |
//! | sign | signing enabled and macOS selected | signed (and maybe notarized) `.app` |
//! | package | always | `Releases/v{version}/{Product}-{Platform}.zip` |
//! | installer | installer enabled and Windows selected | `{Product}-Installer.exe` and `.iss` |
//! | publish | publish enabled | release record, uploaded assets, disk image workflow |
//!
//! # Concurrency
//!
//! Only one run is in flight per [`Orchestrator`] (and per output root, via
//! a file lock). Platform builds go through the [`BuildExecutor`], a single
//! dedicated thread, because the external compiler is not reentrant. Everything
//! else runs as ordinary async work, invoked sequentially.
//!
//! # Cancellation
//!
//! [`RunMonitor::request_cancel`] sets a flag the run polls between stages
//! and before each unit of work. A running compiler or an upload in flight is
//! never interrupted; artifacts already written stay where they are.

mod compiler;
mod executor;
mod hooks;
mod installer;
mod layout;
mod lock;
mod orchestrator;
mod publish;
mod run;
mod signing;
mod stage;

pub use compiler::{BuildRequest, CommandCompiler, Compiler};
pub use executor::BuildExecutor;
pub use hooks::{HostHooks, NoopHooks, SuspendGuard};
pub use installer::InstallerBuilder;
pub use layout::OutputLayout;
pub use lock::RunLock;
pub use orchestrator::{Orchestrator, RunMode};
pub use publish::{PublishReport, Publisher, signing_params};
pub use run::{PipelineRun, RunMonitor, RunOutcome, RunStatus};
pub use signing::{
    AD_HOC_IDENTITY, MacSigner, SignReport, SigningIdentity, SigningTools, parse_identity,
};
pub use stage::{Stage, StageOutcome};
