//! Small util bits
pub(crate) mod fs;
pub(crate) mod hash;
pub(crate) mod quote;
pub(crate) mod retry;


/// Figure the name we were invoked as, for messages like "run `sysupgrade
/// resume`".  Falls back to the package name if argv[0] is somehow
/// unusable.
pub(crate) fn cmdname() -> String
{
	let argv0 = std::env::args().next();
	match argv0
	{
		Some(a) => {
			let p = std::path::PathBuf::from(a);
			match p.file_name()
			{
				Some(f) => f.to_string_lossy().to_string(),
				None => env!("CARGO_PKG_NAME").to_string(),
			}
		},
		None => env!("CARGO_PKG_NAME").to_string(),
	}
}


/// Are we root?  Mutating actions need to be; messing with /boot and
/// writing under /var/lib isn't going to go well otherwise.
pub(crate) fn am_root() -> bool
{
	let euid = unsafe { libc::geteuid() };
	euid == 0
}


/// Free space available on the filesystem holding a path, in bytes.
/// f_bavail rather than f_bfree; we care what an actual write could use.
pub(crate) fn df(path: &std::path::Path) -> Result<u64, std::io::Error>
{
	use std::os::unix::ffi::OsStrExt;

	let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
			.map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput,
				"NUL in path"))?;
	let mut sv: libc::statvfs = unsafe { std::mem::zeroed() };
	let rv = unsafe { libc::statvfs(cpath.as_ptr(), &mut sv) };
	if rv != 0 { return Err(std::io::Error::last_os_error()); }
	Ok(sv.f_frsize as u64 * sv.f_bavail as u64)
}


/// Human-readable size.  Under a gig we don't bother with sub-unit
/// precision; past that one decimal is plenty.
pub(crate) fn hrsize(size: u64) -> String
{
	let mut fsize = size as f64;
	for p in ['K', 'M', 'G', 'T', 'P', 'E']
	{
		fsize /= 1024.0;
		if fsize < 1024.0
		{
			return match p {
				'K' | 'M' => format!("{}{p}", fsize.ceil() as u64),
				_ => format!("{fsize:.1}{p}"),
			};
		}
	}
	format!("{:.1}Z", fsize / 1024.0)
}



#[cfg(test)]
mod tests
{
	use super::hrsize;

	#[test]
	fn hrsizes()
	{
		assert_eq!(hrsize(1), "1K");
		assert_eq!(hrsize(1024), "1K");
		assert_eq!(hrsize(1536), "2K");
		assert_eq!(hrsize(5 * 1024 * 1024), "5M");
		assert_eq!(hrsize(3 * 1024 * 1024 * 1024 + 512 * 1024 * 1024), "3.5G");
	}
}
