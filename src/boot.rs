//! Boot-chain preparation: get the machine to come up in the upgrade
//! environment on next boot.
//!
//! The cached images get copied into /boot under our own fixed names,
//! a boot entry pointing at them gets installed and made default, and
//! the reboot-time environment (upgrade root dir, module dir, magic
//! symlink, mount units for package dirs on odd filesystems) gets laid
//! out.
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::dirs::{self, Dirs};
use crate::util::fs as ufs;

pub(crate) mod entry;
use entry::{BootEntry, BootEntryManager};


/// Fixed installed-image names; the boot entry and cleanup both key
/// off these, so they never vary with the target release.
pub(crate) const KERNEL_PATH: &str = "/boot/vmlinuz-sysupgrade";
pub(crate) const INITRD_PATH: &str = "/boot/initramfs-sysupgrade.img";

/// Name recorded in state for the installed entry.
pub(crate) const BOOT_NAME: &str = "sysupgrade";

static SYSTEMCTL: &str = "/usr/bin/systemctl";


/// Copy the verified cached images into /boot.  Returns the installed
/// paths; the caller records them in state only after this succeeds.
pub(crate) fn copy_boot_images(cached_kernel: &Path, cached_initrd: &Path)
		-> Result<(PathBuf, PathBuf), anyhow::Error>
{
	let kdest = PathBuf::from(KERNEL_PATH);
	let idest = PathBuf::from(INITRD_PATH);

	std::fs::copy(cached_kernel, &kdest)
			.with_context(|| format!("installing {}", kdest.display()))?;
	std::fs::copy(cached_initrd, &idest)
			.with_context(|| format!("installing {}", idest.display()))?;

	Ok((kdest, idest))
}


/// Read the kernel version string embedded in a bzImage.  This is a
/// fixed-offset binary poke (the same one file(1) does), not a package
/// query; the image came off a mirror, not out of rpm.
pub(crate) fn kernel_version(path: &Path)
		-> Result<Option<String>, std::io::Error>
{
	let mut f = std::fs::File::open(path)?;
	kernel_version_rdr(&mut f)
}

fn kernel_version_rdr<R: Read + Seek>(f: &mut R)
		-> Result<Option<String>, std::io::Error>
{
	// Setup-header magic at 514; not there, not a bzImage.
	let mut magic = [0u8; 4];
	f.seek(SeekFrom::Start(514))?;
	if f.read_exact(&mut magic).is_err() || &magic != b"HdrS"
	{ return Ok(None); }

	// Version string offset at 526, u16 LE, relative to 0x200.
	let mut off = [0u8; 2];
	f.seek(SeekFrom::Start(526))?;
	f.read_exact(&mut off)?;
	let off = u16::from_le_bytes(off) as u64;

	let mut buf = [0u8; 256];
	f.seek(SeekFrom::Start(off + 0x200))?;
	let n = f.read(&mut buf)?;

	// NUL-terminated, and the version proper is the first word.
	let s = &buf[..n];
	let s = &s[..s.iter().position(|&b| b == 0).unwrap_or(s.len())];
	let ver = String::from_utf8_lossy(s);
	Ok(ver.split_whitespace().next().map(|v| v.to_string()))
}


/// Prepare everything reboot-side: upgrade root, module dir, magic
/// symlink, mount units, and finally the boot entry itself.
pub(crate) fn prep_boot(dirs: &Dirs, mgr: &mut dyn BootEntryManager,
		kernel: &Path, initrd: &Path) -> Result<(), anyhow::Error>
{
	// Placeholder dir the upgrade initramfs pivots through.
	ufs::dodir(Path::new(dirs::UPGRADE_ROOT), Some(0o755))?;

	// The new kernel wants its module dir to exist, even if empty.
	if let Some(kver) = kernel_version(kernel)?
	{
		let moddir = PathBuf::from("/lib/modules").join(&kver);
		tracing::info!("ensuring module dir {}", moddir.display());
		ufs::dodir(&moddir, Some(0o755))?;
	}

	// The magic symlink the upgrade service follows to the packages.
	let link = Path::new(dirs::UPGRADE_LINK);
	ufs::rm_f(link);
	std::os::unix::fs::symlink(dirs.datadir(), link)
			.with_context(|| format!("symlinking {}", link.display()))?;

	write_mount_units(dirs)?;

	// Boot args: kick off the upgrade target, and if SELinux is
	// enforcing, relax it for the first boot; the new policy may not
	// agree with the old system's labeling.
	let mut args = vec![
		"upgrade".to_string(),
		"systemd.unit=system-upgrade.target".to_string(),
	];
	if crate::sysinfo::selinux_enforcing()
	{ args.push("enforcing=0".to_string()); }

	mgr.add(&BootEntry {
		kernel: kernel.to_path_buf(),
		initrd: initrd.to_path_buf(),
		banner: "System Upgrade".to_string(),
		args,
		make_default: true,
	})
}


/// The point of no return.
pub(crate) fn reboot() -> Result<(), anyhow::Error>
{
	let out = std::process::Command::new(SYSTEMCTL)
			.arg("reboot").output()?;
	if !out.status.success()
	{
		anyhow::bail!("systemctl reboot failed: {}",
				String::from_utf8_lossy(&out.stderr).trim());
	}
	Ok(())
}


// Package dirs on filesystems not implied by the standard early
// mounts won't be reachable when the upgrade target starts, so those
// get generated mount units.  Comparing device ids against /, /usr,
// and /boot is a rough test, but a dir that matches one of those is
// definitely covered.
fn write_mount_units(dirs: &Dirs) -> Result<(), anyhow::Error>
{
	let covered: Vec<u64> = ["/", "/usr", "/boot"].iter()
			.filter_map(|p| ufs::dev_of(Path::new(p)).ok())
			.collect();

	let mounts = std::fs::read_to_string("/proc/mounts")
			.unwrap_or_default();

	for dir in [dirs.datadir(), dirs.cachedir()]
	{
		let dev = match ufs::dev_of(dir) {
			Ok(d) => d,
			Err(_) => continue,
		};
		if covered.contains(&dev) { continue; }

		let Some((what, mntpoint)) =
				find_mount(&mounts, &dir.to_string_lossy()) else
		{ continue; };

		let wants = Path::new(dirs::UPGRADE_WANTS);
		ufs::dodir(wants, Some(0o755))?;
		let unit = wants.join(format!("{}.mount",
				systemd_escape_path(&mntpoint)));
		tracing::info!("writing mount unit {}", unit.display());
		ufs::atomic_write(&unit,
				mount_unit_body(&what, &mntpoint).as_bytes())?;
	}
	Ok(())
}


// Find the mount containing a path: the entry with the longest
// mountpoint that prefixes it.
fn find_mount(mounts: &str, path: &str) -> Option<(String, String)>
{
	let mut best: Option<(&str, &str)> = None;
	for line in mounts.lines()
	{
		let mut f = line.split_whitespace();
		let (Some(dev), Some(mnt)) = (f.next(), f.next()) else
		{ continue; };

		let covers = mnt == "/" || path == mnt
				|| path.starts_with(&format!("{mnt}/"));
		if !covers { continue; }

		match best
		{
			Some((_, b)) if b.len() >= mnt.len() => (),
			_ => best = Some((dev, mnt)),
		}
	}
	best.map(|(d, m)| (d.to_string(), m.to_string()))
}


// systemd-escape --path, the parts of it we need.
fn systemd_escape_path(path: &str) -> String
{
	let trimmed = path.trim_matches('/');
	if trimmed.is_empty() { return "-".to_string(); }

	let mut out = String::new();
	for (i, c) in trimmed.chars().enumerate()
	{
		match c
		{
			'/' => out.push('-'),
			c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
			'.' if i > 0 => out.push('.'),
			c => {
				let mut b = [0u8; 4];
				for byte in c.encode_utf8(&mut b).bytes()
				{ out.push_str(&format!("\\x{byte:02x}")); }
			},
		}
	}
	out
}


fn mount_unit_body(what: &str, mntpoint: &str) -> String
{
	format!("\
[Unit]
Description=Upgrade package mount for {mntpoint}
DefaultDependencies=no

[Mount]
What={what}
Where={mntpoint}
")
}



#[cfg(test)]
mod tests
{
	use super::*;
	use std::io::Cursor;

	// Build a fake bzImage with the version string where the header
	// says it is.
	fn fake_bzimage(ver: &str) -> Vec<u8>
	{
		let voff: u16 = 0x400;
		let mut img = vec![0u8; 0x200 + voff as usize + 128];
		img[514..518].copy_from_slice(b"HdrS");
		img[526..528].copy_from_slice(&voff.to_le_bytes());

		let vstr = format!("{ver} (builder@host) #1 SMP");
		let at = 0x200 + voff as usize;
		img[at..at + vstr.len()].copy_from_slice(vstr.as_bytes());
		// NUL already there from the zero fill
		img
	}

	#[test]
	fn bzimage_version()
	{
		let img = fake_bzimage("6.8.5-301.fc40.x86_64");
		let v = kernel_version_rdr(&mut Cursor::new(img)).unwrap();
		assert_eq!(v, Some("6.8.5-301.fc40.x86_64".to_string()));
	}

	#[test]
	fn not_a_bzimage()
	{
		let v = kernel_version_rdr(
				&mut Cursor::new(vec![0u8; 1024])).unwrap();
		assert_eq!(v, None);

		// Too short to even have a header
		let v = kernel_version_rdr(
				&mut Cursor::new(b"ELF".to_vec())).unwrap();
		assert_eq!(v, None);
	}

	#[test]
	fn mount_escaping()
	{
		assert_eq!(systemd_escape_path("/var/lib/system-upgrade"),
				"var-lib-system\\x2dupgrade");
		assert_eq!(systemd_escape_path("/"), "-");
		assert_eq!(systemd_escape_path("/srv"), "srv");
	}

	#[test]
	fn mount_lookup()
	{
		let mounts = "\
/dev/vda2 / ext4 rw 0 0
/dev/vda1 /boot ext4 rw 0 0
/dev/vdb1 /var xfs rw 0 0
/dev/vdb2 /var/lib btrfs rw 0 0
";
		assert_eq!(find_mount(mounts, "/var/lib/system-upgrade"),
				Some(("/dev/vdb2".to_string(), "/var/lib".to_string())));
		assert_eq!(find_mount(mounts, "/var/cache"),
				Some(("/dev/vdb1".to_string(), "/var".to_string())));
		assert_eq!(find_mount(mounts, "/home/me"),
				Some(("/dev/vda2".to_string(), "/".to_string())));
		assert_eq!(find_mount("", "/anything"), None);
	}

	#[test]
	fn unit_body()
	{
		let b = mount_unit_body("/dev/vdb2", "/var/lib");
		assert!(b.contains("What=/dev/vdb2\n"));
		assert!(b.contains("Where=/var/lib\n"));
	}
}
