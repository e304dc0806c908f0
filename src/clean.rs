//! Cleanup and rollback.
//!
//! Four independent best-effort operations, each driven from durable
//! state and each happy to find its work already done.  Nothing in
//! here raises on a failed removal; a half-broken cleanup that stops
//! halfway would be worse than one that logs and keeps going.
use std::path::{Path, PathBuf};

use crate::boot::entry::BootEntryManager;
use crate::dirs::{self, Dirs};
use crate::state::BootSect;
use crate::util::fs as ufs;


/// What to clean.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[derive(clap::ValueEnum)]
#[derive(strum::Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum CleanOp
{
	/// Staged packages and the download cache.
	Packages,

	/// The boot entry and the images copied into /boot.
	Bootloader,

	/// Cached repo metadata.  Not part of `all`; the metadata is
	/// reusable and the system package manager shares it.
	Metadata,

	/// Upgrade-root placeholder, generated mount units, the magic
	/// symlink.
	Misc,

	/// Bootloader + packages + misc.
	All,
}


/// Remove the boot entry and the installed images.
pub(crate) fn bootloader(mgr: &mut dyn BootEntryManager, boot: &BootSect)
{
	let kernel = boot.kernel.clone()
			.unwrap_or_else(|| PathBuf::from(crate::boot::KERNEL_PATH));

	// Only poke the bootloader if state says we put an entry in it.
	if boot.kernel.is_some()
	{
		tracing::info!("removing boot entry for {}", kernel.display());
		if let Err(e) = mgr.remove(&kernel)
		{ tracing::warn!("couldn't remove boot entry: {e}"); }
	}

	ufs::rm_f(&kernel);
	let initrd = boot.initrd.clone()
			.unwrap_or_else(|| PathBuf::from(crate::boot::INITRD_PATH));
	ufs::rm_f(&initrd);
}


/// Remove staged packages, the manifest, and cached downloads.  The
/// statefile stays; it lives in the datadir but it isn't package data.
pub(crate) fn packages(dirs: &Dirs)
{
	tracing::info!("cleaning staged packages in {}",
			dirs.datadir().display());

	rm_rpms(dirs.datadir());
	ufs::rm_f(&dirs.packagelist());
	ufs::rm_rf(&dirs.mediadir());

	rm_rpms(&dirs.cachedir().join("packages"));
	ufs::rm_dir(&dirs.cachedir().join("packages"));

	// Cached boot images sit in the cachedir root.
	if let Ok(ents) = std::fs::read_dir(dirs.cachedir())
	{
		for ent in ents.flatten()
		{
			if ent.path().is_file() { ufs::rm_f(&ent.path()); }
		}
	}
}

// All the .rpm's in one dir, tolerantly.
fn rm_rpms(dir: &Path)
{
	let Ok(ents) = std::fs::read_dir(dir) else { return };
	for ent in ents.flatten()
	{
		if ent.file_name().to_string_lossy().ends_with(".rpm")
		{ ufs::rm_f(&ent.path()); }
	}
}


/// Remove cached repo metadata.
pub(crate) fn metadata(dirs: &Dirs)
{
	tracing::info!("cleaning repo metadata in {}",
			dirs.cachedir().display());
	ufs::rm_rf(&dirs.cachedir().join("dnf"));
	ufs::rm_rf(&dirs.cachedir().join("repos.d"));
}


/// Remove the miscellaneous boot-prep artifacts.
pub(crate) fn misc()
{
	misc_at(Path::new(dirs::UPGRADE_LINK), Path::new(dirs::UPGRADE_ROOT),
			Path::new(dirs::UPGRADE_WANTS));
}

// Split out so tests can aim it somewhere harmless.
fn misc_at(link: &Path, root: &Path, wants: &Path)
{
	tracing::info!("cleaning misc upgrade artifacts");
	ufs::rm_f(link);
	ufs::rm_rf(root);
	ufs::rm_rf(wants);
}


/// The default full cleanup: everything except metadata.
pub(crate) fn all(mgr: &mut dyn BootEntryManager, boot: &BootSect,
		dirs: &Dirs)
{
	bootloader(mgr, boot);
	packages(dirs);
	misc();
}



#[cfg(test)]
mod tests
{
	use super::*;
	use crate::boot::entry::BootEntry;

	#[derive(Default)]
	struct MockMgr
	{
		removed: Vec<PathBuf>,
	}

	impl BootEntryManager for MockMgr
	{
		fn add(&mut self, _e: &BootEntry) -> Result<(), anyhow::Error>
		{ Ok(()) }

		fn remove(&mut self, kernel: &Path) -> Result<(), anyhow::Error>
		{
			self.removed.push(kernel.to_path_buf());
			Ok(())
		}
	}

	fn setup() -> (tempfile::TempDir, Dirs)
	{
		let td = tempfile::tempdir().unwrap();
		let dirs = Dirs::init(&td.path().join("data"),
				&td.path().join("cache")).unwrap();
		(td, dirs)
	}

	#[test]
	fn packages_clean_is_idempotent_and_keeps_state()
	{
		let (_td, dirs) = setup();

		std::fs::write(dirs.datadir().join("a-1-1.x86_64.rpm"), "a").unwrap();
		std::fs::write(dirs.packagelist(), "a-1-1.x86_64.rpm\n").unwrap();
		std::fs::create_dir_all(dirs.mediadir().join("Packages")).unwrap();
		std::fs::write(dirs.statefile(), "[upgrade]\n").unwrap();
		std::fs::write(dirs.cachedir().join("vmlinuz"), "k").unwrap();

		packages(&dirs);
		assert!(!dirs.datadir().join("a-1-1.x86_64.rpm").exists());
		assert!(!dirs.packagelist().exists());
		assert!(!dirs.mediadir().exists());
		assert!(!dirs.cachedir().join("vmlinuz").exists());

		// State survives, and a second run is fine.
		assert!(dirs.statefile().exists());
		packages(&dirs);
		assert!(dirs.statefile().exists());
	}

	#[test]
	fn metadata_clean()
	{
		let (_td, dirs) = setup();
		std::fs::create_dir_all(dirs.cachedir().join("dnf/x")).unwrap();
		std::fs::create_dir_all(dirs.cachedir().join("repos.d")).unwrap();

		metadata(&dirs);
		assert!(!dirs.cachedir().join("dnf").exists());
		assert!(!dirs.cachedir().join("repos.d").exists());
		metadata(&dirs);
	}

	#[test]
	fn misc_clean_idempotent()
	{
		let td = tempfile::tempdir().unwrap();
		let link = td.path().join("system-upgrade");
		let root = td.path().join("system-upgrade-root");
		let wants = td.path().join("wants");

		std::os::unix::fs::symlink(td.path(), &link).unwrap();
		std::fs::create_dir_all(&root).unwrap();
		std::fs::create_dir_all(wants.join("sub")).unwrap();

		misc_at(&link, &root, &wants);
		assert!(!link.exists());
		assert!(!root.exists());
		assert!(!wants.exists());

		// Already-clean is success too.
		misc_at(&link, &root, &wants);
	}

	#[test]
	fn bootloader_only_pokes_recorded_entries()
	{
		let mut mgr = MockMgr::default();

		// Nothing recorded in state: no bootloader calls.
		bootloader(&mut mgr, &BootSect::default());
		assert!(mgr.removed.is_empty());

		let td = tempfile::tempdir().unwrap();
		let k = td.path().join("vmlinuz-sysupgrade");
		let i = td.path().join("initramfs-sysupgrade.img");
		std::fs::write(&k, "k").unwrap();
		std::fs::write(&i, "i").unwrap();

		let boot = BootSect {
			name: Some("sysupgrade".to_string()),
			kernel: Some(k.clone()),
			initrd: Some(i.clone()),
		};
		bootloader(&mut mgr, &boot);
		assert_eq!(mgr.removed, vec![k.clone()]);
		assert!(!k.exists());
		assert!(!i.exists());

		// And again, with everything already gone.
		bootloader(&mut mgr, &boot);
	}
}
