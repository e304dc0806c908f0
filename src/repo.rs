//! Repository override specs.
//!
//! The user can enable, disable, and add repos, and attach GPG keys to
//! them, all from the command line.  We collect those in the order
//! given, then hand them to the engine in two passes: structural
//! changes first, trust changes second, since a key can't be attached
//! to a repo that doesn't exist yet.
use thiserror::Error;


/// The repo id we auto-add the install-image repo under when the user
/// doesn't name one.
pub(crate) const INSTREPO_ID: &str = "sysupgrade-instrepo";


/// Bad repo args.
#[derive(Debug, PartialEq)]
#[derive(Error)]
pub(crate) enum RepoErr
{
	#[error("'{0}' isn't REPOID=URL")]
	NotKeyVal(String),

	#[error("'{0}' isn't a usable repo id")]
	BadId(String),
}


/// One user-requested change to repo config.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RepoAction
{
	Enable,
	Disable,

	/// Add a repo at a baseurl (or @mirrorlist; the engine sorts that
	/// out).
	Add(String),

	/// Attach a GPG key URI to a repo.
	GpgKey(String),
}


/// One repo override, in user-supplied order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RepoSpec
{
	pub(crate) repoid: String,
	pub(crate) action: RepoAction,
}


// Repo ids wind up in filenames and config sections, so keep them
// tame.
fn ok_id(id: &str) -> bool
{
	!id.is_empty() && id.chars()
			.all(|c| c.is_ascii_alphanumeric() || "-_.:".contains(c))
}

// Split a REPOID=VALUE arg.
fn keyval(arg: &str) -> Result<(String, String), RepoErr>
{
	let (id, val) = arg.split_once('=')
			.ok_or_else(|| RepoErr::NotKeyVal(arg.to_string()))?;
	if !ok_id(id) { return Err(RepoErr::BadId(id.to_string())); }
	Ok((id.to_string(), val.to_string()))
}


impl RepoSpec
{
	pub(crate) fn enable(id: &str) -> Result<Self, RepoErr>
	{
		if !ok_id(id) { return Err(RepoErr::BadId(id.to_string())); }
		Ok(RepoSpec { repoid: id.to_string(), action: RepoAction::Enable })
	}

	pub(crate) fn disable(id: &str) -> Result<Self, RepoErr>
	{
		if !ok_id(id) { return Err(RepoErr::BadId(id.to_string())); }
		Ok(RepoSpec { repoid: id.to_string(), action: RepoAction::Disable })
	}

	/// From an `--addrepo REPOID=URL` arg.
	pub(crate) fn add(arg: &str) -> Result<Self, RepoErr>
	{
		let (repoid, url) = keyval(arg)?;
		Ok(RepoSpec { repoid, action: RepoAction::Add(url) })
	}

	/// From a `--repogpgkey REPOID=URL` arg.
	pub(crate) fn gpgkey(arg: &str) -> Result<Self, RepoErr>
	{
		let (repoid, url) = keyval(arg)?;
		Ok(RepoSpec { repoid, action: RepoAction::GpgKey(url) })
	}


	/// Structural changes get applied before trust changes.
	pub(crate) fn is_structural(&self) -> bool
	{
		!matches!(self.action, RepoAction::GpgKey(_))
	}
}


/// The default install repo for a target release: the distro mirror
/// list service, which hands back plain-text mirror URLs we can walk
/// ourselves.  The leading @ marks it as a list-of-mirrors rather than
/// a tree baseurl.
pub(crate) fn default_instrepo(version: &str, arch: &str) -> RepoSpec
{
	let url = format!(
		"@https://mirrors.fedoraproject.org/mirrorlist?repo=fedora-{version}\
			&arch={arch}");
	RepoSpec { repoid: INSTREPO_ID.to_string(), action: RepoAction::Add(url) }
}


/// Order specs for application: all structural changes (in given
/// order), then all trust changes (in given order).
pub(crate) fn two_pass(specs: &[RepoSpec]) -> Vec<&RepoSpec>
{
	let mut out: Vec<&RepoSpec> = Vec::with_capacity(specs.len());
	out.extend(specs.iter().filter(|s| s.is_structural()));
	out.extend(specs.iter().filter(|s| !s.is_structural()));
	out
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn parses()
	{
		let s = RepoSpec::add("myrepo=http://example.com/f40").unwrap();
		assert_eq!(s.repoid, "myrepo");
		assert_eq!(s.action,
				RepoAction::Add("http://example.com/f40".to_string()));

		let s = RepoSpec::gpgkey("myrepo=file:///etc/pki/key.gpg").unwrap();
		assert!(!s.is_structural());

		// URLs have ='s of their own; only the first one splits.
		let s = RepoSpec::add("r=http://x/?a=b").unwrap();
		assert_eq!(s.action, RepoAction::Add("http://x/?a=b".to_string()));
	}

	#[test]
	fn rejects_junk()
	{
		assert_eq!(RepoSpec::add("nourl").unwrap_err(),
				RepoErr::NotKeyVal("nourl".to_string()));
		assert_eq!(RepoSpec::enable("has space").unwrap_err(),
				RepoErr::BadId("has space".to_string()));
		assert_eq!(RepoSpec::add("=http://x/").unwrap_err(),
				RepoErr::BadId("".to_string()));
	}

	#[test]
	fn trust_goes_last()
	{
		let specs = vec![
			RepoSpec::gpgkey("b=file:///k1").unwrap(),
			RepoSpec::add("a=http://x/").unwrap(),
			RepoSpec::gpgkey("a=file:///k2").unwrap(),
			RepoSpec::enable("b").unwrap(),
		];
		let ordered = two_pass(&specs);
		let ids: Vec<(&str, bool)> = ordered.iter()
				.map(|s| (s.repoid.as_str(), s.is_structural())).collect();
		assert_eq!(ids, vec![
			("a", true), ("b", true),
			("b", false), ("a", false),
		]);
	}

	#[test]
	fn instrepo_default()
	{
		let s = default_instrepo("40", "x86_64");
		assert_eq!(s.repoid, INSTREPO_ID);
		match s.action {
			RepoAction::Add(url) => {
				assert!(url.starts_with('@'));
				assert!(url.contains("repo=fedora-40"));
				assert!(url.contains("arch=x86_64"));
			},
			a => panic!("wrong action {a:?}"),
		}
	}
}
