//! kompo-lib: package a Ruby application into one self-contained executable.
//!
//! The build is a graph of tasks ([`tasks`]) scheduled by [`task::TaskGraph`]:
//! - a static interpreter is built once and cached per version
//! - dependencies are installed standalone and their native extensions compiled
//! - every runtime-reachable source file is embedded by [`vfs`]
//! - [`link`] plans the final static/dynamic link
//!
//! [`Packager`] drives a whole build for one project.

pub mod cache;
pub mod consts;
pub mod context;
pub mod entrypoint;
pub mod error;
pub mod link;
pub mod metadata;
mod packager;
pub mod platform;
pub mod task;
pub mod tasks;
pub mod toolchain;
pub mod util;
pub mod vfs;

pub use context::{BuildContext, BuildMode, BuildOptions};
pub use error::BuildError;
pub use packager::{BuildSummary, Packager};
