//! Packaging bridge.
//!
//! Derives a minimal manifest for a built tree and hands it, with the tree,
//! to a [`PackagingBackend`]. Nothing here installs on its own.

mod backend;
mod manifest;

pub use backend::{DIST_DIR, PackagingBackend, WheelBackend, latest_wheel};
pub use manifest::{
    DEFAULT_VERSION, PYPROJECT_FILE, PackageManifest, discover_packages, is_package_dir,
    prepare_package,
};
