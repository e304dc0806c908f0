//! Runtime directory and well-known-path info.
//!
//! One of these is built per invocation from the command-line args and
//! passed to whoever needs it; nothing in here is process-global.
use std::path::{Path, PathBuf};


/// Default locations.  These are the same well-known paths the reboot
/// half of the system (the initramfs upgrade service) looks at, so they
/// aren't really ours to get creative with.
pub(crate) const DEFAULT_DATADIR: &str = "/var/lib/system-upgrade";
pub(crate) const DEFAULT_CACHEDIR: &str = "/var/cache/system-upgrade";

/// The magic symlink the upgrade service follows to find the packages.
pub(crate) const UPGRADE_LINK: &str = "/system-upgrade";

/// Root dir the upgrade initramfs pivots into.
pub(crate) const UPGRADE_ROOT: &str = "/system-upgrade-root";

/// Where generated mount units go so they're pulled in by the upgrade
/// target.
pub(crate) const UPGRADE_WANTS: &str =
		"/usr/lib/systemd/system/system-upgrade.target.wants";

/// pidfile/lockfile guarding against concurrent invocations.
pub(crate) const LOCKFILE: &str = "/run/sysupgrade.pid";


/// Invocation dirs.  Knows where state, staged packages, and cached
/// downloads live, and makes sure the dirs exist.
#[derive(Debug, Clone)]
pub(crate) struct Dirs
{
	/// Staged packages + state file; survives cancel.
	datadir: PathBuf,

	/// Downloaded boot images and repo metadata cache.
	cachedir: PathBuf,
}


// Trivial getters
impl Dirs
{
	pub(crate) fn datadir(&self)  -> &Path { &self.datadir }
	pub(crate) fn cachedir(&self) -> &Path { &self.cachedir }

	/// The persistent state file.
	pub(crate) fn statefile(&self) -> PathBuf
	{ self.datadir.join("upgrade.toml") }

	/// The authoritative package manifest.
	pub(crate) fn packagelist(&self) -> PathBuf
	{ self.datadir.join("packages.list") }

	/// Where media-sourced packages appear after the media mount unit
	/// fires.
	pub(crate) fn mediadir(&self) -> PathBuf
	{ self.datadir.join("media") }
}


impl Dirs
{
	/// Set up our runtime dirs, creating them if needed.
	pub(crate) fn init(datadir: &Path, cachedir: &Path)
			-> Result<Self, std::io::Error>
	{
		use crate::util::fs::dodir;

		dodir(datadir, Some(0o755))?;
		dodir(cachedir, Some(0o755))?;

		let ret = Dirs {
			datadir: datadir.to_path_buf(),
			cachedir: cachedir.to_path_buf(),
		};
		Ok(ret)
	}

	/// Variant for tests and status-only paths: don't create anything.
	pub(crate) fn new_unchecked(datadir: &Path, cachedir: &Path) -> Self
	{
		Dirs {
			datadir: datadir.to_path_buf(),
			cachedir: cachedir.to_path_buf(),
		}
	}
}
