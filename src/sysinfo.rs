//! Info about the running system: distro, version, architecture.
use std::path::Path;

use thiserror::Error;


/// The distro/version we're running, per os-release(5).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SysInfo
{
	/// Distro name ("Fedora" etc.)
	pub(crate) distro: String,

	/// Release version.  A string, not a number; "41" is typical but
	/// "rawhide"-ish things exist.
	pub(crate) version: String,

	/// Machine architecture, a la uname -m.
	pub(crate) arch: String,
}

impl std::fmt::Display for SysInfo
{
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
	{ write!(f, "{} {} ({})", self.distro, self.version, self.arch) }
}


/// Problems figuring out the system info.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum SysInfoErr
{
	#[error("can't read os-release: {0}")]
	IO(#[from] std::io::Error),

	#[error("os-release is missing {0}")]
	Missing(&'static str),

	#[error("uname failed")]
	Uname,
}


/// Get running-system info from the usual places.
pub(crate) fn get() -> Result<SysInfo, SysInfoErr>
{
	// os-release(5) says to check /etc first, then /usr/lib.
	let paths = ["/etc/os-release", "/usr/lib/os-release"];
	let osrel = paths.iter().map(Path::new).find(|p| p.is_file());
	let osrel = match osrel {
		Some(p) => std::fs::read_to_string(p)?,
		None => return Err(SysInfoErr::Missing("the whole file")),
	};
	from_os_release(&osrel, arch()?)
}


/// Parse the bits we need out of os-release contents.
pub(crate) fn from_os_release(data: &str, arch: String)
		-> Result<SysInfo, SysInfoErr>
{
	let mut name = None;
	let mut version = None;

	for line in data.lines()
	{
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') { continue; }
		let (key, val) = match line.split_once('=') {
			Some(kv) => kv,
			None => continue,
		};

		// Values may be quoted; these files are sh-sourceable.
		let val = val.trim().trim_matches('"').trim_matches('\'');
		match key
		{
			"NAME" => name = Some(val.to_string()),
			"VERSION_ID" => version = Some(val.to_string()),
			_ => (),
		}
	}

	let distro = name.ok_or(SysInfoErr::Missing("NAME"))?;
	let version = version.ok_or(SysInfoErr::Missing("VERSION_ID"))?;
	Ok(SysInfo { distro, version, arch })
}


/// uname -m, the hard way.
fn arch() -> Result<String, SysInfoErr>
{
	let mut un: libc::utsname = unsafe { std::mem::zeroed() };
	let rv = unsafe { libc::uname(&mut un) };
	if rv != 0 { return Err(SysInfoErr::Uname); }

	let machine = unsafe { std::ffi::CStr::from_ptr(un.machine.as_ptr()) };
	Ok(machine.to_string_lossy().to_string())
}


/// Is SELinux currently enforcing?  Used to decide whether the upgrade
/// boot entry needs enforcing=0; the new policy may disallow things the
/// old system did differently.
pub(crate) fn selinux_enforcing() -> bool
{
	match std::fs::read_to_string("/sys/fs/selinux/enforce")
	{
		Ok(s) => s.trim() == "1",
		Err(_) => false,
	}
}



#[cfg(test)]
mod tests
{
	use super::*;

	const OSREL: &str = r#"
NAME="Fedora Linux"
VERSION="40 (Workstation Edition)"
ID=fedora
VERSION_ID=40
PRETTY_NAME="Fedora Linux 40 (Workstation Edition)"
"#;

	#[test]
	fn parse_os_release()
	{
		let si = from_os_release(OSREL, "x86_64".to_string()).unwrap();
		assert_eq!(si.distro, "Fedora Linux");
		assert_eq!(si.version, "40");
		assert_eq!(si.arch, "x86_64");
	}

	#[test]
	fn missing_fields()
	{
		let e = from_os_release("ID=mystery\n", "x".into()).unwrap_err();
		match e {
			SysInfoErr::Missing(_) => (),
			e => panic!("wrong error {e}"),
		}
	}
}
