//! The package-resolution engine interface.
//!
//! We don't do dependency resolution; an external engine does.  This
//! is the seam: what the pipeline needs from it, and the common types
//! that cross it.  The real implementation drives dnf(8) as a
//! subprocess; tests swap in mocks.
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::repo::RepoSpec;

pub(crate) mod dnf;


/// One package in the upgrade set.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PkgItem
{
	/// Full name-version-release.arch identifier.
	pub(crate) nevra: String,

	/// Where the downloaded file lives (or will live) locally.
	pub(crate) local: PathBuf,

	/// Download size in bytes, as the engine reports it.
	pub(crate) size: u64,

	/// True if this file is on mounted install media rather than in
	/// our own cache.  Media files get recorded, not linked; we don't
	/// own them.
	pub(crate) on_media: bool,
}

impl PkgItem
{
	/// Filename of the package file.
	pub(crate) fn filename(&self) -> String
	{
		self.local.file_name()
				.map(|f| f.to_string_lossy().into_owned())
				.unwrap_or_else(|| self.nevra.clone())
	}
}


/// What resolving against the target release produced.  An empty
/// transaction is a successful no-op, not an error, and the caller
/// needs to be able to tell without string-matching.
#[derive(Debug)]
pub(crate) enum Resolution
{
	/// Nothing needs doing; already at (or past) the target.
	UpToDate,

	/// Stuff to do.
	Upgrade(Upgrade),
}

/// A non-empty resolved transaction.
#[derive(Debug)]
pub(crate) struct Upgrade
{
	pub(crate) packages: Vec<PkgItem>,

	/// Non-fatal complaints from the transaction test.  These get
	/// summarized for the user but don't stop the download.
	pub(crate) problems: Vec<Problem>,
}

impl Upgrade
{
	/// Total download size of the set.
	pub(crate) fn size_total(&self) -> u64
	{
		self.packages.iter().map(|p| p.size).sum()
	}
}


/// A non-fatal transaction problem.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Problem
{
	pub(crate) kind: ProblemKind,
	pub(crate) msg: String,
}

/// Categories of transaction problem; each gets its own summary
/// formatting.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProblemKind
{
	/// Not enough room on a filesystem.  The most important category;
	/// the summary shows need-vs-free per mount point.
	DiskSpace
	{
		mount: PathBuf,
		need: u64,
	},

	/// Unresolvable or replaced dependencies.
	Dependency,

	/// File conflicts between packages.
	Conflict,

	/// Anything else the engine complained about.
	Other,
}


/// Group problems by category into human-readable paragraphs.
pub(crate) fn summarize_problems(probs: &[Problem]) -> Vec<String>
{
	let mut out = Vec::new();

	let space: Vec<&Problem> = probs.iter()
			.filter(|p| matches!(p.kind, ProblemKind::DiskSpace { .. }))
			.collect();
	if !space.is_empty()
	{
		let mut s = String::from("Not enough disk space:\n");
		for p in space
		{
			if let ProblemKind::DiskSpace { mount, need } = &p.kind
			{
				let free = crate::util::df(mount).unwrap_or(0);
				s.push_str(&format!("  {}: {} needed, {} free\n",
						mount.display(), crate::util::hrsize(*need),
						crate::util::hrsize(free)));
			}
		}
		out.push(s);
	}

	let grp = |kind: ProblemKind, head: &str, out: &mut Vec<String>| {
		let hits: Vec<&Problem> = probs.iter()
				.filter(|p| p.kind == kind).collect();
		if hits.is_empty() { return; }
		let mut s = format!("{head}\n");
		for p in hits { s.push_str(&format!("  {}\n", p.msg)); }
		out.push(s);
	};
	grp(ProblemKind::Dependency, "Dependency problems:", &mut out);
	grp(ProblemKind::Conflict, "File conflicts:", &mut out);
	grp(ProblemKind::Other, "Other problems:", &mut out);

	out
}


/// What came of checking a package signature.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SigStatus
{
	/// Signed by a trusted key.
	Ok,

	/// No signature at all.
	Unsigned,

	/// Signed, but by a key we don't have.  Carries the key id so the
	/// caller can go looking for the key file.
	UntrustedKey(String),

	/// Signature present but wrong.  Never recoverable.
	Bad(String),
}


/// Which repos got disabled along the way, and why.  Only fatal if one
/// of them was the install repo.
#[derive(Debug, Default)]
pub(crate) struct RepoReport
{
	pub(crate) disabled: Vec<(String, String)>,
}


/// Engine failures.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum EngineErr
{
	/// Repo configuration problems, per-repo.
	#[error("repo configuration failed: {}",
			.problems.iter().map(|(r, e)| format!("{r}: {e}"))
				.collect::<Vec<_>>().join("; "))]
	Repo
	{
		problems: Vec<(String, String)>,
	},

	/// The install repo is unusable.  Fatal; no boot images means no
	/// upgrade.
	#[error("installation repo isn't available: {0}")]
	InstRepo(String),

	#[error("resolving upgrade transaction: {0}")]
	Resolve(String),

	#[error("package download failed: {0}")]
	Download(String),

	/// Trust failures never downgrade to warnings.
	#[error("signature verification failed: {0}")]
	Signature(String),

	#[error("interrupted")]
	Interrupted,

	#[error("running {cmd}: {err}")]
	Spawn
	{
		cmd: String,
		err: std::io::Error,
	},

	#[error("{cmd} exited {status}: {stderr}")]
	Exited
	{
		cmd: String,
		status: String,
		stderr: String,
	},
}


/// The resolution-engine seam.
pub(crate) trait ResolutionEngine
{
	/// Apply repo overrides; structural changes have already been
	/// ordered ahead of trust changes by the caller.
	fn setup_repos(&mut self, specs: &[&RepoSpec]) -> Result<(), EngineErr>;

	/// Load installed-package state and metadata for enabled repos.
	/// Repos whose metadata can't be fetched come back in the report
	/// as disabled, unless one of them is `instrepo`, which is fatal.
	fn load_metadata(&mut self, instrepo: &str)
			-> Result<RepoReport, EngineErr>;

	/// Compute the upgrade transaction for the target release.
	fn resolve(&mut self, target: &str) -> Result<Resolution, EngineErr>;

	/// Fast local check: is this package already downloaded and
	/// plausibly intact?  This is the cheap pre-pass; the engine does
	/// its own full verification during download.
	fn verify_cached(&self, pkg: &PkgItem) -> bool;

	/// Download the package set, reporting (current, total, filename)
	/// as files complete.  Returns the set actually downloaded, which
	/// the caller compares against what it asked for.
	fn download(&mut self, pkgs: &[PkgItem],
			progress: &mut dyn FnMut(u64, u64, &str))
			-> Result<Vec<PkgItem>, EngineErr>;

	/// Check one package's signature.
	fn sigcheck(&self, pkg: &PkgItem) -> Result<SigStatus, EngineErr>;

	/// Can this key file be trusted without asking?  Only if its whole
	/// provenance chain checks out: installed by a known package, that
	/// package signed by an already-trusted key, and the file
	/// unmodified since install.
	fn key_auto_trustable(&self, keyfile: &Path) -> Result<bool, EngineErr>;

	/// Import a key into the system trust store.
	fn import_key(&mut self, keyfile: &Path) -> Result<(), EngineErr>;
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn problem_summaries_group()
	{
		let probs = vec![
			Problem { kind: ProblemKind::Dependency,
					msg: "nothing provides libfoo".to_string() },
			Problem { kind: ProblemKind::DiskSpace {
						mount: "/var".into(), need: 4 * 1024 * 1024 * 1024 },
					msg: "insufficient space".to_string() },
			Problem { kind: ProblemKind::Dependency,
					msg: "bar obsoleted by baz".to_string() },
		];

		let sums = summarize_problems(&probs);
		assert_eq!(sums.len(), 2);

		// Disk space always leads.
		assert!(sums[0].starts_with("Not enough disk space:"));
		assert!(sums[0].contains("/var"));
		assert!(sums[0].contains("4.0G needed"));

		assert!(sums[1].starts_with("Dependency problems:"));
		assert!(sums[1].contains("libfoo"));
		assert!(sums[1].contains("baz"));
	}

	#[test]
	fn no_problems_no_summaries()
	{
		assert!(summarize_problems(&[]).is_empty());
	}

	#[test]
	fn upgrade_size_total()
	{
		let up = Upgrade {
			packages: vec![
				PkgItem { nevra: "a-1-1.x86_64".to_string(),
						local: "/c/a.rpm".into(), size: 100, on_media: false },
				PkgItem { nevra: "b-2-1.x86_64".to_string(),
						local: "/c/b.rpm".into(), size: 250, on_media: true },
			],
			problems: Vec::new(),
		};
		assert_eq!(up.size_total(), 350);
	}
}
