//! Command line handling
//!
//! General invocation:
//! $0 [options] <command> [command-opts]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main arg entry point
#[derive(Debug)]
#[derive(Parser)]
#[command(about = "Upgrade your system to a new release.  In place.")]
#[command(version)]
pub struct SuArgs
{
	#[command(subcommand)]
	pub(crate) command: SuCmds,

	/// Where staged packages and upgrade state live.
	///
	/// The reboot half of the upgrade finds this through a well-known
	/// symlink, so if you move it somewhere that isn't mounted early in
	/// boot, you get to keep both pieces.
	#[arg(long, default_value = crate::dirs::DEFAULT_DATADIR)]
	pub(crate) datadir: PathBuf,

	/// Where downloaded boot images and repo metadata get cached.
	///
	/// Everything in here can be regenerated by re-downloading, so
	/// it's fair game for cleanup, but keeping it around makes a
	/// re-run after a `cancel` much cheaper.
	#[arg(long, default_value = crate::dirs::DEFAULT_CACHEDIR)]
	pub(crate) cachedir: PathBuf,

	/// Detailed run log.
	///
	/// The console only shows you the headlines; the blow-by-blow of
	/// what actually got run and fetched lands here.
	#[arg(long, default_value = "/var/log/sysupgrade.log")]
	pub(crate) logfile: PathBuf,

	/// More verbose console output (repeatable).
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub(crate) verbose: u8,
}



/// Individual subcommands and their args
#[derive(Debug)]
#[derive(Subcommand)]
pub(crate) enum SuCmds
{
	/// Download everything needed to upgrade to a new release.
	///
	/// This resolves the upgrade transaction, fetches the upgrade-mode
	/// kernel and initramfs, downloads and signature-checks all the
	/// packages, and stages them where the reboot-time upgrade service
	/// expects them.  It doesn't change the running system; until you
	/// run `reboot`, nothing you're using has moved.
	///
	/// It's restartable: if it gets interrupted (^C, network dying,
	/// whatever), `resume` picks up where it left off, and anything
	/// already downloaded and verified doesn't get downloaded again.
	Download(SuCmdDownload),

	/// Resume an interrupted download.
	///
	/// This replays the original `download` invocation (args and all)
	/// from the saved state, skipping whatever already made it down
	/// intact.
	Resume,

	/// Cancel an in-progress download and discard the work.
	///
	/// Removes staged packages and any boot bits we set up, and forgets
	/// the in-progress state.  Cached repo metadata stays (it's cheap
	/// to keep and expensive to refetch); `clean metadata` drops that
	/// too if you want it all gone.
	Cancel,

	/// Reboot into the prepared upgrade.
	///
	/// Only valid once `download` has finished completely.  This copies
	/// the upgrade kernel and initramfs into /boot, points the
	/// bootloader at them for the next boot, and reboots.  The actual
	/// package installation happens on the other side.
	Reboot,

	/// Clean up stuff (what stuff is up to you).
	///
	/// Takes an argument for what to clean; `all` gets everything
	/// except cached repo metadata, which you can drop separately with
	/// `metadata`.  Every variant is happy to find its work already
	/// done, so cleaning twice is fine.
	Clean(SuCmdClean),

	/// Say where things stand.
	///
	/// Is an upgrade in progress?  Downloaded and ready to go?  This
	/// just reads the saved state and tells you; it doesn't need root
	/// and doesn't touch anything.
	Status,
}



/*
 * Individual [sub]command args
 */

/// Download args
#[derive(Debug, Clone)]
#[derive(Parser)]
pub(crate) struct SuCmdDownload
{
	/// Release version to upgrade to (e.g., 41)
	pub(crate) version: String,

	/// Enable a repo for the upgrade (repeatable).
	#[arg(long, value_name = "REPOID")]
	pub(crate) enablerepo: Vec<String>,

	/// Disable a repo for the upgrade (repeatable).
	#[arg(long, value_name = "REPOID")]
	pub(crate) disablerepo: Vec<String>,

	/// Add a repo (repeatable).
	///
	/// URL may be a tree baseurl, a metalink URL, or @URL for a
	/// plain-text mirror list.
	#[arg(long, value_name = "REPOID=URL")]
	pub(crate) addrepo: Vec<String>,

	/// Attach a GPG key to a repo (repeatable).
	///
	/// The key gets configured for metadata/package verification.  A
	/// file:// key additionally becomes a candidate for automatic
	/// import if packages turn out to be signed by a key rpm doesn't
	/// know yet; that only happens if the key file's provenance checks
	/// out all the way down.
	#[arg(long, value_name = "REPOID=KEYURL")]
	pub(crate) repogpgkey: Vec<String>,

	/// Which repo the upgrade boot images come from.
	///
	/// Either the REPOID of a repo you gave with --addrepo, or
	/// REPOID=URL to add one in the same breath.  If you don't say,
	/// we use the distro mirror list for the target release.
	#[arg(long, value_name = "REPOID[=URL]")]
	pub(crate) instrepo: Option<String>,

	/// Skip GPG signature checking.  Don't.
	#[arg(long)]
	pub(crate) nogpgcheck: bool,
}

/// Clean args
#[derive(Debug)]
#[derive(Parser)]
pub(crate) struct SuCmdClean
{
	/// What to clean up.
	#[arg(value_enum)]
	pub(crate) what: crate::clean::CleanOp,
}




/*
 * Misc impls and utils
 */

impl std::fmt::Display for SuCmds
{
	fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error>
	{
		match self
		{
			Self::Download{..} => f.write_str("download"),
			Self::Resume       => f.write_str("resume"),
			Self::Cancel       => f.write_str("cancel"),
			Self::Reboot       => f.write_str("reboot"),
			Self::Clean{..}    => f.write_str("clean"),
			Self::Status       => f.write_str("status"),
		}
	}
}



pub fn parse() -> SuArgs
{
	SuArgs::parse()
}


/// Re-parse a saved command line.  `resume` replays the original
/// `download` invocation out of the statefile through this.
pub(crate) fn parse_argv(argv: &[String]) -> Result<SuArgs, clap::Error>
{
	// try_parse_from wants an argv[0]
	let full = std::iter::once(crate::util::cmdname())
			.chain(argv.iter().cloned());
	SuArgs::try_parse_from(full)
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn replay_parses()
	{
		let argv: Vec<String> = ["--datadir", "/tmp/dd", "download", "41",
				"--addrepo", "x=http://h/f41", "--nogpgcheck"]
				.iter().map(|s| s.to_string()).collect();
		let args = parse_argv(&argv).unwrap();

		assert_eq!(args.datadir, PathBuf::from("/tmp/dd"));
		match args.command
		{
			SuCmds::Download(d) => {
				assert_eq!(d.version, "41");
				assert_eq!(d.addrepo, vec!["x=http://h/f41"]);
				assert!(d.nogpgcheck);
			},
			c => panic!("parsed to {c}"),
		}
	}

	#[test]
	fn replay_rejects_junk()
	{
		let argv = vec!["not-a-command".to_string()];
		assert!(parse_argv(&argv).is_err());

		// download needs its version
		let argv = vec!["download".to_string()];
		assert!(parse_argv(&argv).is_err());
	}
}
