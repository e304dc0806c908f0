//! Filesystem helpers: tolerant removal, atomic writes, link-or-copy.
use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;


/// Make sure a dir exists, with a mode if we're creating it fresh.  If
/// it pre-existed with another mode, we assume that was the admin's
/// intention and leave it be.
pub(crate) fn dodir(dir: &Path, mode: Option<u32>) -> Result<(), io::Error>
{
	if !dir.exists()
	{
		use std::os::unix::fs::DirBuilderExt;
		let mut db = fs::DirBuilder::new();
		db.recursive(true);
		if let Some(m) = mode { db.mode(m); }
		db.create(dir)?;
	}

	// In case it already existed as something else
	if !dir.is_dir()
	{
		let d_s = dir.to_string_lossy();
		let ioe = io::Error::new(io::ErrorKind::AlreadyExists, d_s);
		Err(ioe)?;
	}

	Ok(())
}


// Cleanup-flavored removal: the target already being gone is success,
// and any other failure is a warning, not an error.  Cleanup has to make
// a best effort and keep moving.
fn remove_with(path: &Path, what: &str, rmfunc: impl Fn(&Path) -> io::Result<()>)
{
	// symlink_metadata so a dangling symlink still counts as present
	if fs::symlink_metadata(path).is_err() { return; }

	match rmfunc(path)
	{
		Ok(_) => (),
		Err(e) if e.kind() == io::ErrorKind::NotFound => (),
		Err(e) => warn!("failed to remove {what} {}: {e}", path.display()),
	}
}

/// Remove a file (or symlink) if it exists.
pub(crate) fn rm_f(path: &Path)
{
	remove_with(path, "file", |p| fs::remove_file(p));
}

/// Remove an empty dir if it exists.
pub(crate) fn rm_dir(path: &Path)
{
	remove_with(path, "dir", |p| fs::remove_dir(p));
}

/// Remove a whole tree if it exists.
pub(crate) fn rm_rf(path: &Path)
{
	remove_with(path, "tree", |p| {
		if p.is_dir() { fs::remove_dir_all(p) } else { fs::remove_file(p) }
	});
}


/// Write a file with all-or-nothing visibility: write to a tempfile in
/// the same dir, then rename over the target.  A reader either sees the
/// old complete contents or the new complete contents, never a partial.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<(), io::Error>
{
	use io::Write as _;

	let dir = path.parent().ok_or_else(|| {
		io::Error::new(io::ErrorKind::InvalidInput,
			format!("no parent dir for {}", path.display()))
	})?;

	let mut tf = tempfile::NamedTempFile::new_in(dir)?;
	tf.write_all(data)?;
	tf.as_file().sync_all()?;
	tf.persist(path).map_err(|e| e.error)?;
	Ok(())
}


/// Are two paths the same file (same device and inode)?  Either not
/// existing means no.
pub(crate) fn same_file(a: &Path, b: &Path) -> bool
{
	use std::os::unix::fs::MetadataExt;

	let (ma, mb) = match (fs::metadata(a), fs::metadata(b)) {
		(Ok(x), Ok(y)) => (x, y),
		_ => return false,
	};
	ma.dev() == mb.dev() && ma.ino() == mb.ino()
}


/// Do two paths look like the same content by stat (size and mtime)?
/// This is the cross-filesystem stand-in for same_file, for files a
/// copy put there; copies can't share an inode with their source.
pub(crate) fn same_stat(a: &Path, b: &Path) -> bool
{
	let (ma, mb) = match (fs::metadata(a), fs::metadata(b)) {
		(Ok(x), Ok(y)) => (x, y),
		_ => return false,
	};
	if ma.len() != mb.len() { return false; }

	match (ma.modified(), mb.modified())
	{
		(Ok(x), Ok(y)) => x == y,
		_ => false,
	}
}


/// Copy a file, carrying the source's mtime along, so the copy can
/// later be recognized by same_stat().  The mtime part is best-effort;
/// the worst a miss costs is a redundant copy next time around.
pub(crate) fn copy_with_times(src: &Path, dst: &Path)
		-> Result<(), io::Error>
{
	fs::copy(src, dst)?;
	if let Ok(mtime) = fs::metadata(src).and_then(|md| md.modified())
	{
		let f = fs::File::options().write(true).open(dst)?;
		let _ = f.set_modified(mtime);
	}
	Ok(())
}


/// How link_or_copy got the file there.
#[derive(Debug, PartialEq)]
pub(crate) enum Linked
{
	Hard,
	Copy,
}

/// Hard-link src to dst, falling back to a copy if they're on different
/// filesystems.  dst must not already exist.
pub(crate) fn link_or_copy(src: &Path, dst: &Path)
		-> Result<Linked, io::Error>
{
	match fs::hard_link(src, dst)
	{
		Ok(_) => Ok(Linked::Hard),
		Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
			copy_with_times(src, dst)?;
			Ok(Linked::Copy)
		},
		Err(e) => Err(e),
	}
}


/// Device id of the filesystem a path lives on.
pub(crate) fn dev_of(path: &Path) -> Result<u64, io::Error>
{
	use std::os::unix::fs::MetadataExt;
	Ok(fs::metadata(path)?.dev())
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn rm_tolerant()
	{
		let td = tempfile::tempdir().unwrap();
		let gone = td.path().join("never-was");

		// Removing things that don't exist is fine, repeatedly.
		rm_f(&gone);
		rm_f(&gone);
		rm_dir(&gone);
		rm_rf(&gone);

		// And removing things that do exist works.
		let f = td.path().join("afile");
		fs::write(&f, b"x").unwrap();
		rm_f(&f);
		assert!(!f.exists());
		rm_f(&f);
	}

	#[test]
	fn atomic_write_replaces()
	{
		let td = tempfile::tempdir().unwrap();
		let f = td.path().join("out");

		atomic_write(&f, b"first").unwrap();
		assert_eq!(fs::read(&f).unwrap(), b"first");
		atomic_write(&f, b"second").unwrap();
		assert_eq!(fs::read(&f).unwrap(), b"second");
	}

	#[test]
	fn link_and_same()
	{
		let td = tempfile::tempdir().unwrap();
		let a = td.path().join("a");
		let b = td.path().join("b");
		fs::write(&a, b"data").unwrap();

		assert_eq!(link_or_copy(&a, &b).unwrap(), Linked::Hard);
		assert!(same_file(&a, &b));
		assert!(!same_file(&a, &td.path().join("c")));
	}

	#[test]
	fn copies_stat_alike()
	{
		let td = tempfile::tempdir().unwrap();
		let a = td.path().join("a");
		let b = td.path().join("b");
		fs::write(&a, b"data").unwrap();

		// Age the source so a fresh copy's natural mtime can't
		// accidentally match.
		let old = std::time::SystemTime::now()
				- std::time::Duration::from_secs(3600);
		fs::File::options().write(true).open(&a).unwrap()
				.set_modified(old).unwrap();

		copy_with_times(&a, &b).unwrap();
		assert!(!same_file(&a, &b));
		assert!(same_stat(&a, &b));

		// Different content under the same name stops matching.
		fs::write(&b, b"other data").unwrap();
		assert!(!same_stat(&a, &b));
	}
}
