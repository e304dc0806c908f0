//! Bootloader entry handling via new-kernel-pkg(8).

use std::path::{Path, PathBuf};

static NKP: &str = "/sbin/new-kernel-pkg";


/// The boot entry we want installed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BootEntry
{
	pub(crate) kernel: PathBuf,
	pub(crate) initrd: PathBuf,
	pub(crate) banner: String,
	pub(crate) args: Vec<String>,
	pub(crate) make_default: bool,
}


/// The bootloader seam.  The real one shells out; tests record calls.
pub(crate) trait BootEntryManager
{
	/// Install an entry.
	fn add(&mut self, entry: &BootEntry) -> Result<(), anyhow::Error>;

	/// Remove the entry for a kernel path.  Removing one that isn't
	/// there is fine.
	fn remove(&mut self, kernel: &Path) -> Result<(), anyhow::Error>;
}


/// new-kernel-pkg(8), the real thing.
#[derive(Debug, Default)]
pub(crate) struct NewKernelPkg;

impl BootEntryManager for NewKernelPkg
{
	fn add(&mut self, entry: &BootEntry) -> Result<(), anyhow::Error>
	{
		let mut cmd = std::process::Command::new(NKP);
		cmd.arg("--initrdfile").arg(&entry.initrd);
		cmd.arg("--banner").arg(&entry.banner);
		if !entry.args.is_empty()
		{ cmd.arg("--kernel-args").arg(entry.args.join(" ")); }
		if entry.make_default { cmd.arg("--make-default"); }
		cmd.arg("--install").arg(&entry.kernel);

		tracing::debug!("running {cmd:?}");
		let out = cmd.output()?;
		if !out.status.success()
		{
			anyhow::bail!("new-kernel-pkg --install failed: {}",
					String::from_utf8_lossy(&out.stderr).trim());
		}
		Ok(())
	}

	fn remove(&mut self, kernel: &Path) -> Result<(), anyhow::Error>
	{
		let mut cmd = std::process::Command::new(NKP);
		cmd.arg("--remove").arg(kernel);

		tracing::debug!("running {cmd:?}");
		let out = cmd.output()?;
		if !out.status.success()
		{
			// Entry already gone is the normal double-clean case.
			let err = String::from_utf8_lossy(&out.stderr);
			if err.contains("not found") || err.contains("No such")
			{ return Ok(()); }
			anyhow::bail!("new-kernel-pkg --remove failed: {}", err.trim());
		}
		Ok(())
	}
}
