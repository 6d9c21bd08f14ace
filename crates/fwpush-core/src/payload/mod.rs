//! Payload handling module.
//!
//! Loads firmware images and assembles them into signed packages.

pub mod loader;
pub mod package;

pub use loader::{FirmwareImage, LoadError, load_file};
pub use package::{PackageError, SignedPackage, build_package, build_package_from_image};
