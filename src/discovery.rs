//! Controller discovery.
//!
//! Controllers announce themselves with [`export_controller!`](crate::export_controller)
//! anywhere in the crate graph; the submissions are collected at link time.
//! [`discover`] then filters them by the source file they were exported
//! from, using a `glob` pattern. Relative patterns are matched against the
//! file's path inside its package, absolute ones against its absolute path:
//!
//! ```rust,ignore
//! // src/routes/todos.rs
//! kura::export_controller!(Todos);
//!
//! // src/main.rs
//! let router = kura::load_controllers("src/routes/*.rs", Default::default(), Default::default())?;
//! ```

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::debug;

use crate::controller::{ControllerOptions, Registration};
use crate::error::Error;
use crate::router::Router;

/// One exported controller.
pub struct ControllerEntry {
    /// `CARGO_MANIFEST_DIR` of the exporting package.
    pub manifest_dir: &'static str,
    /// Source file of the `export_controller!` call, as `file!()` reports it.
    /// Inside a workspace this is relative to the workspace root.
    pub file: &'static str,
    pub module: &'static str,
    pub name: &'static str,
    pub register: Registration,
}

impl ControllerEntry {
    pub const fn new(
        manifest_dir: &'static str,
        file: &'static str,
        module: &'static str,
        name: &'static str,
        register: Registration,
    ) -> Self {
        Self { manifest_dir, file, module, name, register }
    }

    /// The source file relative to the exporting package's root.
    pub fn source_path(&self) -> PathBuf {
        package_relative(Path::new(self.manifest_dir), Path::new(self.file))
    }

    pub fn absolute_path(&self) -> PathBuf {
        Path::new(self.manifest_dir).join(self.source_path())
    }

    fn matches(&self, pattern: &Pattern, absolute: bool, options: MatchOptions) -> bool {
        let path = if absolute { self.absolute_path() } else { self.source_path() };
        pattern.matches_path_with(&path, options)
    }
}

/// Rewrites `file!()` output so it is relative to `manifest_dir`.
///
/// Absolute paths lose the manifest prefix. A relative path is taken as is
/// when it exists under `manifest_dir`; otherwise it is relative to an
/// enclosing workspace root, and the longest trailing run of
/// `manifest_dir` components it starts with is stripped.
fn package_relative(manifest_dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        return file.strip_prefix(manifest_dir).unwrap_or(file).to_path_buf();
    }
    if manifest_dir.join(file).exists() {
        return file.to_path_buf();
    }

    let dirs: Vec<Component<'_>> = manifest_dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    (1..=dirs.len())
        .rev()
        .map(|n| dirs[dirs.len() - n..].iter().collect::<PathBuf>())
        .find_map(|member| file.strip_prefix(&member).ok().map(Path::to_path_buf))
        .filter(|rest| !rest.as_os_str().is_empty())
        .unwrap_or_else(|| file.to_path_buf())
}

impl std::fmt::Debug for ControllerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerEntry")
            .field("file", &self.file)
            .field("module", &self.module)
            .field("name", &self.name)
            .finish()
    }
}

inventory::collect!(ControllerEntry);

/// Exports a controller for discovery.
///
/// `export_controller!(Type)` exports a class implementing
/// [`Construct`](crate::Construct) and [`Routable`](crate::Routable).
/// `export_controller!(factory path::to::definition)` exports the
/// [`ControllerDefinition`](crate::ControllerDefinition) returned by a
/// zero-argument function.
#[macro_export]
macro_rules! export_controller {
    (factory $definition:path) => {
        $crate::inventory::submit! {
            $crate::discovery::ControllerEntry::new(
                env!("CARGO_MANIFEST_DIR"),
                file!(),
                module_path!(),
                stringify!($definition),
                |router, options| router.controller($definition(), options),
            )
        }
    };
    ($controller:ty) => {
        $crate::inventory::submit! {
            $crate::discovery::ControllerEntry::new(
                env!("CARGO_MANIFEST_DIR"),
                file!(),
                module_path!(),
                stringify!($controller),
                |router, options| router.controller($crate::class::<$controller>(), options),
            )
        }
    };
}

/// Exported controllers whose source file matches `pattern`, ordered by
/// file then name.
pub fn discover(pattern: &str, options: MatchOptions) -> Result<Vec<&'static ControllerEntry>, Error> {
    let matcher = Pattern::new(pattern).map_err(|source| Error::Pattern {
        pattern: pattern.to_owned(),
        source,
    })?;

    let absolute = Path::new(pattern).is_absolute();

    let mut entries: Vec<&'static ControllerEntry> = inventory::iter::<ControllerEntry>
        .into_iter()
        .filter(|entry| entry.matches(&matcher, absolute, options))
        .collect();
    entries.sort_by_key(|entry| (entry.absolute_path(), entry.name));

    debug!(pattern, found = entries.len(), "controllers discovered");
    Ok(entries)
}

/// A router holding every exported controller matching `pattern`.
pub fn load_controllers(
    pattern: &str,
    glob_options: MatchOptions,
    options: ControllerOptions,
) -> Result<Router, Error> {
    Router::new().import_controllers(pattern, glob_options, options)
}
