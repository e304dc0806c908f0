//! The durable state of an in-progress upgrade.
//!
//! Preparing an upgrade takes multiple invocations (download, maybe a
//! resume, then reboot), so everything later invocations need to know
//! lives here, in a sectioned key/value file a human can read.  Don't
//! _write_ into it by hand though...
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;


/// Everything we persist, section by section.  This is the whole file;
/// the [persist] section is the one part that survives a cancel.
#[derive(Debug, Default, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
pub(crate) struct StateData
{
	#[serde(default)]
	pub(crate) upgrade: UpgradeSect,

	#[serde(default)]
	pub(crate) boot: BootSect,

	#[serde(default)]
	pub(crate) system: SystemSect,

	#[serde(default)]
	pub(crate) download: DownloadSect,

	#[serde(default)]
	pub(crate) persist: PersistSect,
}


/// [upgrade] - what we're upgrading to and how far we've gotten.
/// `target` being set is _the_ discriminator for "an upgrade is in
/// progress"; `ready` flips only once everything is staged and
/// verified.
#[derive(Debug, Default, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
pub(crate) struct UpgradeSect
{
	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) target: Option<String>,

	#[serde(default)]
	pub(crate) ready: bool,

	/// Verified, locally-cached boot images (in cachedir).  Not the
	/// same thing as the copies installed into /boot; see [boot].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) kernel: Option<PathBuf>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) initrd: Option<PathBuf>,
}


/// [boot] - the boot entry we installed, if any.  `kernel` being set
/// implies a matching entry exists in the bootloader.
#[derive(Debug, Default, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
pub(crate) struct BootSect
{
	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) name: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) kernel: Option<PathBuf>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) initrd: Option<PathBuf>,
}


/// [system] - what we were running when the download started.
#[derive(Debug, Default, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
pub(crate) struct SystemSect
{
	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) distro: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) version: Option<String>,
}


/// [download] - progress counters and the resumable command line.
#[derive(Debug, Default, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
pub(crate) struct DownloadSect
{
	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) pkgs_total: Option<u64>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) size_total: Option<u64>,

	/// The original invocation, shell-quoted into one line so `resume`
	/// can replay it.  Use the accessors, not this field.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) cmdline: Option<String>,
}


/// [persist] - survives a cancel, so a later re-download can reuse
/// already-downloaded bytes.
#[derive(Debug, Default, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
pub(crate) struct PersistSect
{
	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) datadir: Option<PathBuf>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) cachedir: Option<PathBuf>,
}


/// Where one upgrade lifecycle currently stands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Phase
{
	/// Nothing going on.
	None,

	/// Download started but not finished; resumable or cancellable.
	Downloading,

	/// Everything staged; reboot or clean are the valid next moves.
	Ready,
}


impl StateData
{
	/// Which phase are we in?  Derived, not stored; the stored bits are
	/// the source of truth.
	pub(crate) fn phase(&self) -> Phase
	{
		match (&self.upgrade.target, self.upgrade.ready)
		{
			(None, _) => Phase::None,
			(Some(_), false) => Phase::Downloading,
			(Some(_), true) => Phase::Ready,
		}
	}

	/// Store the resumable command line.
	pub(crate) fn set_cmdline(&mut self, argv: &[String])
	{
		self.download.cmdline = Some(crate::util::quote::join(argv));
	}

	/// Get the resumable command line back as an argv.
	pub(crate) fn cmdline(&self)
			-> Result<Option<Vec<String>>, crate::util::quote::QuoteErr>
	{
		match &self.download.cmdline
		{
			None => Ok(None),
			Some(line) => Ok(Some(crate::util::quote::split(line)?)),
		}
	}

	/// One-line human summary for `status`.
	pub(crate) fn summarize(&self) -> String
	{
		match self.phase()
		{
			Phase::None => "No upgrade in progress.".to_string(),
			Phase::Downloading => {
				let tgt = self.upgrade.target.as_deref().unwrap_or("?");
				match (self.download.pkgs_total, self.download.size_total)
				{
					(Some(np), Some(sz)) => format!(
						"Download of upgrade to {tgt} incomplete: \
							{np} packages, {} total.  Run `resume` to \
							continue or `cancel` to discard.",
						crate::util::hrsize(sz)),
					_ => format!("Download of upgrade to {tgt} incomplete.  \
							Run `resume` to continue or `cancel` to discard."),
				}
			},
			Phase::Ready => {
				let tgt = self.upgrade.target.as_deref().unwrap_or("?");
				format!("Ready to upgrade to {tgt}.  Run `reboot` to start \
						the upgrade.")
			},
		}
	}
}


/// Errors touching the statefile.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum StateErr
{
	#[error("statefile I/O error: {0}")]
	IO(#[from] std::io::Error),

	#[error("statefile parsing: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("statefile encoding: {0}")]
	Encode(#[from] toml::ser::Error),
}


/// The state store: in-memory data plus the path it syncs with.
#[derive(Debug)]
pub(crate) struct State
{
	path: PathBuf,
	data: StateData,
}


impl State
{
	/// Load state from a file.  No file just means nothing has happened
	/// yet; that's an empty state, not an error.
	pub(crate) fn load(path: &Path) -> Result<Self, StateErr>
	{
		let data = match std::fs::read_to_string(path)
		{
			Ok(s) => toml::from_str(&s)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound
				=> StateData::default(),
			Err(e) => Err(e)?,
		};
		Ok(State { path: path.to_path_buf(), data })
	}

	/// Read access to the current data.
	pub(crate) fn data(&self) -> &StateData { &self.data }


	/// Scoped read-modify-write transaction.  The mutation runs against
	/// a copy; only if it succeeds does the result get persisted (and
	/// become visible in memory).  On failure, neither the file nor our
	/// in-memory data changes, so a partial mutation can never be
	/// observed by a later reader.
	pub(crate) fn update<R>(&mut self,
			f: impl FnOnce(&mut StateData) -> Result<R, anyhow::Error>)
			-> Result<R, anyhow::Error>
	{
		let mut next = self.data.clone();
		let ret = f(&mut next)?;
		self.save(&next)?;
		self.data = next;
		Ok(ret)
	}

	/// Reset everything except the [persist] section.
	pub(crate) fn clear(&mut self) -> Result<(), anyhow::Error>
	{
		self.update(|st| {
			let persist = std::mem::take(&mut st.persist);
			*st = StateData::default();
			st.persist = persist;
			Ok(())
		})
	}


	// Atomic write-out; the statefile is never seen half-written.
	fn save(&self, data: &StateData) -> Result<(), StateErr>
	{
		let body = toml::to_string_pretty(data)?;
		crate::util::fs::atomic_write(&self.path, body.as_bytes())?;
		Ok(())
	}
}



#[cfg(test)]
mod tests
{
	use super::*;

	fn tstate(dir: &Path) -> State
	{
		State::load(&dir.join("upgrade.toml")).unwrap()
	}

	#[test]
	fn missing_file_is_empty()
	{
		let td = tempfile::tempdir().unwrap();
		let st = tstate(td.path());
		assert_eq!(st.data(), &StateData::default());
		assert_eq!(st.data().phase(), Phase::None);
	}

	#[test]
	fn roundtrip()
	{
		let td = tempfile::tempdir().unwrap();
		let mut st = tstate(td.path());

		st.update(|d| {
			d.upgrade.target = Some("30".to_string());
			d.upgrade.kernel = Some("/var/cache/su/vmlinuz".into());
			d.system.distro = Some("Fedora".to_string());
			d.download.pkgs_total = Some(1234);
			d.download.size_total = Some(987654321);
			d.persist.datadir = Some("/var/lib/system-upgrade".into());
			d.set_cmdline(&["download".into(), "30".into(),
					"--addrepo".into(), "x=http://a b/c".into()]);
			Ok(())
		}).unwrap();

		// Fresh load gets identical values back.
		let st2 = tstate(td.path());
		assert_eq!(st2.data(), st.data());
		assert_eq!(st2.data().phase(), Phase::Downloading);

		let argv = st2.data().cmdline().unwrap().unwrap();
		assert_eq!(argv, vec!["download", "30", "--addrepo", "x=http://a b/c"]);
	}

	#[test]
	fn failed_transaction_changes_nothing()
	{
		let td = tempfile::tempdir().unwrap();
		let mut st = tstate(td.path());
		st.update(|d| { d.upgrade.target = Some("30".into()); Ok(()) }).unwrap();
		let before = st.data().clone();

		let r: Result<(), _> = st.update(|d| {
			d.upgrade.target = Some("31".into());
			d.upgrade.ready = true;
			anyhow::bail!("something went sideways");
		});
		r.unwrap_err();

		// Neither memory nor disk moved.
		assert_eq!(st.data(), &before);
		let st2 = tstate(td.path());
		assert_eq!(st2.data(), &before);
	}

	#[test]
	fn clear_keeps_persist()
	{
		let td = tempfile::tempdir().unwrap();
		let mut st = tstate(td.path());
		st.update(|d| {
			d.upgrade.target = Some("30".into());
			d.upgrade.ready = true;
			d.boot.name = Some("sysupgrade".into());
			d.persist.datadir = Some("/var/lib/system-upgrade".into());
			d.persist.cachedir = Some("/var/cache/system-upgrade".into());
			Ok(())
		}).unwrap();

		st.clear().unwrap();

		assert_eq!(st.data().phase(), Phase::None);
		assert_eq!(st.data().boot.name, None);
		assert_eq!(st.data().persist.datadir,
				Some(PathBuf::from("/var/lib/system-upgrade")));
		assert_eq!(st.data().persist.cachedir,
				Some(PathBuf::from("/var/cache/system-upgrade")));
	}

	#[test]
	fn phases()
	{
		let mut d = StateData::default();
		assert_eq!(d.phase(), Phase::None);
		d.upgrade.target = Some("30".into());
		assert_eq!(d.phase(), Phase::Downloading);
		d.upgrade.ready = true;
		assert_eq!(d.phase(), Phase::Ready);
	}
}
