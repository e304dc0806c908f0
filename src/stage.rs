//! Staging downloaded packages into the canonical layout.
//!
//! The upgrade environment expects everything under the data dir with
//! a packages.list manifest saying exactly what's part of the
//! transaction.  We hard-link from the download cache when we can,
//! copy when the cache is on another filesystem, and leave
//! media-mounted files where they are (recorded under media/, since a
//! mount isn't ours to link out of).
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::dirs::Dirs;
use crate::engine::PkgItem;
use crate::util::fs as ufs;


/// Staging failures.  Unlike cleanup, staging failures matter; a
/// package that didn't make it in means an upgrade that can't run.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum StageErr
{
	#[error("staging {file}: {err}")]
	Place
	{
		file: String,
		err: std::io::Error,
	},

	#[error("writing package manifest: {0}")]
	Manifest(std::io::Error),

	#[error("scanning {dir}: {err}")]
	Scan
	{
		dir: String,
		err: std::io::Error,
	},
}


/// What staging did, for the summary line.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct StageSummary
{
	pub(crate) linked: u64,
	pub(crate) copied: u64,
	pub(crate) kept: u64,
	pub(crate) media: u64,
	pub(crate) removed: u64,
}


/// Stage the download set and write the manifest.  Safe to run
/// repeatedly; a second run with the same set is a no-op apart from
/// rewriting the manifest.
pub(crate) fn stage(dirs: &Dirs, pkgs: &[PkgItem])
		-> Result<StageSummary, StageErr>
{
	let datadir = dirs.datadir();
	let mut sum = StageSummary::default();
	let mut manifest: Vec<String> = Vec::with_capacity(pkgs.len());

	// Figure out what belongs, before deleting anything, so
	// reconciliation can never eat a file we're about to want.
	let mut want: HashSet<String> = HashSet::new();
	for pkg in pkgs
	{
		let rel = relpath_for(dirs, pkg);
		want.insert(rel.clone());
		manifest.push(rel);
	}

	// Stale-file reconciliation: anything in the package dir that
	// isn't part of this set goes.
	let entries = std::fs::read_dir(datadir).map_err(|err| StageErr::Scan {
		dir: datadir.display().to_string(), err,
	})?;
	for ent in entries
	{
		let ent = ent.map_err(|err| StageErr::Scan {
			dir: datadir.display().to_string(), err,
		})?;
		let name = ent.file_name().to_string_lossy().into_owned();
		if !name.ends_with(".rpm") { continue; }
		if want.contains(&name) { continue; }

		tracing::info!("removing stale {name}");
		ufs::rm_f(&ent.path());
		sum.removed += 1;
	}

	// Now place what's missing.
	for pkg in pkgs
	{
		if pkg.on_media
		{
			// Mounted, not owned; the manifest entry is enough.
			sum.media += 1;
			continue;
		}

		let dest = datadir.join(pkg.filename());
		match place(&pkg.local, &dest)
		{
			Ok(Placed::Kept) => sum.kept += 1,
			Ok(Placed::Linked) => sum.linked += 1,
			Ok(Placed::Copied) => sum.copied += 1,
			Err(err) => return Err(StageErr::Place {
				file: pkg.filename(), err,
			}),
		}
	}

	// Manifest goes last, all-or-nothing; a manifest that lists files
	// is a promise that they're there.
	let mut body = manifest.join("\n");
	body.push('\n');
	ufs::atomic_write(&dirs.packagelist(), body.as_bytes())
			.map_err(StageErr::Manifest)?;

	Ok(sum)
}


#[derive(Debug)]
enum Placed { Kept, Linked, Copied }

// Get one file into place.  Already-identical files stay put; a
// different file under the same name gets replaced.
fn place(src: &Path, dest: &Path) -> Result<Placed, std::io::Error>
{
	if dest.exists()
	{
		// Same inode, or the stat-alike leftovers of an earlier
		// cross-filesystem copy; either way it's already in place.
		if ufs::same_file(src, dest) || ufs::same_stat(src, dest)
		{ return Ok(Placed::Kept); }
		std::fs::remove_file(dest)?;
	}

	match ufs::link_or_copy(src, dest)?
	{
		ufs::Linked::Hard => Ok(Placed::Linked),
		ufs::Linked::Copy => Ok(Placed::Copied),
	}
}


// The manifest-relative path for a package: media files sit under the
// media mount subdir, everything else lands flat in the data dir.
fn relpath_for(dirs: &Dirs, pkg: &PkgItem) -> String
{
	if pkg.on_media
	{
		if let Ok(rel) = pkg.local.strip_prefix(dirs.mediadir())
		{ return PathBuf::from("media").join(rel)
				.to_string_lossy().into_owned(); }
	}
	pkg.filename()
}


/// Read a manifest back; used by reboot preflight and tests.
pub(crate) fn read_manifest(dirs: &Dirs)
		-> Result<Vec<String>, std::io::Error>
{
	let body = std::fs::read_to_string(dirs.packagelist())?;
	Ok(body.lines().filter(|l| !l.is_empty())
			.map(|l| l.to_string()).collect())
}



#[cfg(test)]
mod tests
{
	use super::*;

	fn setup() -> (tempfile::TempDir, Dirs, PathBuf)
	{
		let td = tempfile::tempdir().unwrap();
		let datadir = td.path().join("data");
		let cachedir = td.path().join("cache");
		let dirs = Dirs::init(&datadir, &cachedir).unwrap();
		let dl = td.path().join("dl");
		std::fs::create_dir(&dl).unwrap();
		(td, dirs, dl)
	}

	fn mkpkg(dl: &Path, nevra: &str) -> PkgItem
	{
		let local = dl.join(format!("{nevra}.rpm"));
		std::fs::write(&local, nevra).unwrap();
		PkgItem {
			nevra: nevra.to_string(),
			local,
			size: nevra.len() as u64,
			on_media: false,
		}
	}

	#[test]
	fn stages_and_lists()
	{
		let (_td, dirs, dl) = setup();
		let pkgs = vec![mkpkg(&dl, "a-1-1.x86_64"),
				mkpkg(&dl, "b-1-1.x86_64")];

		let sum = stage(&dirs, &pkgs).unwrap();
		assert_eq!(sum.linked, 2);
		assert_eq!(sum.removed, 0);

		assert!(dirs.datadir().join("a-1-1.x86_64.rpm").is_file());
		assert_eq!(read_manifest(&dirs).unwrap(),
				vec!["a-1-1.x86_64.rpm", "b-1-1.x86_64.rpm"]);
	}

	#[test]
	fn second_run_is_noop()
	{
		let (_td, dirs, dl) = setup();
		let pkgs = vec![mkpkg(&dl, "a-1-1.x86_64")];

		stage(&dirs, &pkgs).unwrap();
		let ino_before = std::fs::metadata(
				dirs.datadir().join("a-1-1.x86_64.rpm")).unwrap();

		let sum = stage(&dirs, &pkgs).unwrap();
		assert_eq!(sum.kept, 1);
		assert_eq!(sum.linked, 0);
		assert_eq!(sum.removed, 0);

		// Same inode; no churn.
		use std::os::unix::fs::MetadataExt;
		let ino_after = std::fs::metadata(
				dirs.datadir().join("a-1-1.x86_64.rpm")).unwrap();
		assert_eq!(ino_before.ino(), ino_after.ino());
	}

	#[test]
	fn rerun_keeps_copies_too()
	{
		// A download cache on another filesystem means place() copied,
		// and a copy can never share an inode with its source.  The
		// rerun has to recognize it anyway instead of churning.
		let (_td, dirs, dl) = setup();
		let pkg = mkpkg(&dl, "a-1-1.x86_64");
		let dest = dirs.datadir().join("a-1-1.x86_64.rpm");

		// What an earlier cross-device run leaves behind.
		ufs::copy_with_times(&pkg.local, &dest).unwrap();

		let sum = stage(&dirs, &[pkg]).unwrap();
		assert_eq!(sum.kept, 1);
		assert_eq!(sum.linked, 0);
		assert_eq!(sum.copied, 0);
	}

	#[test]
	fn stale_reconciliation()
	{
		let (_td, dirs, dl) = setup();

		// Start with {A, B, C}...
		let first = vec![mkpkg(&dl, "a-1-1.x86_64"),
				mkpkg(&dl, "b-1-1.x86_64"), mkpkg(&dl, "c-1-1.x86_64")];
		stage(&dirs, &first).unwrap();

		// ...then the set becomes {B, C, D}.
		let second = vec![first[1].clone(), first[2].clone(),
				mkpkg(&dl, "d-1-1.x86_64")];
		let sum = stage(&dirs, &second).unwrap();
		assert_eq!(sum.removed, 1);
		assert_eq!(sum.kept, 2);
		assert_eq!(sum.linked, 1);

		assert!(!dirs.datadir().join("a-1-1.x86_64.rpm").exists());
		assert!(dirs.datadir().join("b-1-1.x86_64.rpm").is_file());
		assert!(dirs.datadir().join("d-1-1.x86_64.rpm").is_file());
		assert_eq!(read_manifest(&dirs).unwrap(), vec![
			"b-1-1.x86_64.rpm", "c-1-1.x86_64.rpm", "d-1-1.x86_64.rpm"]);
	}

	#[test]
	fn media_recorded_not_linked()
	{
		let (_td, dirs, dl) = setup();

		let mediapkg_dir = dirs.mediadir().join("Packages");
		std::fs::create_dir_all(&mediapkg_dir).unwrap();
		let mlocal = mediapkg_dir.join("m-1-1.noarch.rpm");
		std::fs::write(&mlocal, "media bits").unwrap();

		let mut pkgs = vec![mkpkg(&dl, "a-1-1.x86_64")];
		pkgs.push(PkgItem {
			nevra: "m-1-1.noarch".to_string(),
			local: mlocal,
			size: 10,
			on_media: true,
		});

		let sum = stage(&dirs, &pkgs).unwrap();
		assert_eq!(sum.media, 1);
		assert_eq!(sum.linked, 1);

		// Not copied into the flat dir, but in the manifest.
		assert!(!dirs.datadir().join("m-1-1.noarch.rpm").exists());
		assert_eq!(read_manifest(&dirs).unwrap(), vec![
			"a-1-1.x86_64.rpm", "media/Packages/m-1-1.noarch.rpm"]);
	}
}
