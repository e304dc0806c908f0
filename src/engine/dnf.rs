//! dnf(8)-backed resolution engine.
//!
//! We drive dnf as a subprocess: generated repo config in our own
//! reposdir, distro-sync with --assumeno to get the transaction,
//! distro-sync --downloadonly to pull the bits.  rpm(8) handles the
//! signature side.  All the output parsing lives in free functions so
//! it can be tested against captured output without a dnf anywhere
//! near.
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::repo::{RepoAction, RepoSpec};
use super::{EngineErr, PkgItem, Problem, ProblemKind, RepoReport,
		Resolution, ResolutionEngine, SigStatus, Upgrade};

use EngineErr as EE;

static DNF: &str = "/usr/bin/dnf";
static RPM: &str = "/usr/bin/rpm";


/// The engine state for one invocation.
#[derive(Debug)]
pub(crate) struct DnfEngine
{
	/// Target release, passed as --releasever.
	releasever: String,

	/// dnf's metadata cache, pointed into our cachedir so `clean
	/// metadata` knows what to remove.
	cachedir: PathBuf,

	/// Where our generated .repo files go.
	reposdir: PathBuf,

	/// Where downloaded packages land.
	downloaddir: PathBuf,

	/// --enablerepo / --disablerepo accumulations.
	enable: Vec<String>,
	disable: Vec<String>,

	/// Extra --setopt's (gpgkey attachments to repos we didn't write).
	setopts: Vec<String>,

	/// Skip signature checking entirely.  For people who know better.
	nogpgcheck: bool,

	/// Repos we wrote config for: id -> (url, gpgkey).
	written: HashMap<String, (String, Option<String>)>,
}


impl DnfEngine
{
	pub(crate) fn new(releasever: &str, cachedir: &Path, downloaddir: &Path,
			nogpgcheck: bool) -> Result<Self, std::io::Error>
	{
		let reposdir = cachedir.join("repos.d");
		crate::util::fs::dodir(&reposdir, None)?;
		crate::util::fs::dodir(downloaddir, None)?;

		Ok(DnfEngine {
			releasever: releasever.to_string(),
			cachedir: cachedir.join("dnf"),
			reposdir,
			downloaddir: downloaddir.to_path_buf(),
			enable: Vec::new(),
			disable: Vec::new(),
			setopts: Vec::new(),
			nogpgcheck,
			written: HashMap::new(),
		})
	}

	// A dnf command with all the common plumbing attached.
	fn dnf_cmd(&self) -> Command
	{
		let mut cmd = Command::new(DNF);
		cmd.arg(format!("--releasever={}", self.releasever));
		cmd.arg(format!("--setopt=cachedir={}", self.cachedir.display()));

		// Our reposdir comes after the system's, so generated repos
		// add to rather than replace the normal set.
		cmd.arg(format!("--setopt=reposdir=/etc/yum.repos.d,{}",
				self.reposdir.display()));

		// Broken repos shouldn't kill the run; we find out which ones
		// failed from the output and judge for ourselves.
		cmd.arg("--setopt=*.skip_if_unavailable=1");

		for r in &self.enable  { cmd.arg(format!("--enablerepo={r}")); }
		for r in &self.disable { cmd.arg(format!("--disablerepo={r}")); }
		for s in &self.setopts { cmd.arg(format!("--setopt={s}")); }
		if self.nogpgcheck { cmd.arg("--nogpgcheck"); }

		cmd
	}

	// Write one generated .repo file.
	fn write_repo(&self, repoid: &str, url: &str, gpgkey: Option<&str>)
			-> Result<(), std::io::Error>
	{
		let mut body = format!("[{repoid}]\nname={repoid}\n");

		// @foo is a mirrorlist, metalink URLs are metalinks, anything
		// else is a plain baseurl.
		if let Some(ml) = url.strip_prefix('@')
		{ body.push_str(&format!("mirrorlist={ml}\n")); }
		else if url.contains("metalink")
		{ body.push_str(&format!("metalink={url}\n")); }
		else
		{ body.push_str(&format!("baseurl={url}\n")); }

		body.push_str("enabled=1\n");
		match gpgkey
		{
			Some(k) => body.push_str(&format!("gpgcheck=1\ngpgkey={k}\n")),
			None => body.push_str("gpgcheck=1\n"),
		}

		let file = self.reposdir.join(format!("{repoid}.repo"));
		crate::util::fs::atomic_write(&file, body.as_bytes())
	}


	// Run a command to completion, capturing output.
	fn run(&self, mut cmd: Command, what: &str)
			-> Result<std::process::Output, EngineErr>
	{
		tracing::debug!("running {what}: {cmd:?}");
		cmd.output().map_err(|err| EE::Spawn {
			cmd: what.to_string(), err,
		})
	}
}


impl ResolutionEngine for DnfEngine
{
	fn setup_repos(&mut self, specs: &[&RepoSpec]) -> Result<(), EngineErr>
	{
		let mut problems = Vec::new();

		for spec in specs
		{
			let id = &spec.repoid;
			match &spec.action
			{
				RepoAction::Enable  => self.enable.push(id.clone()),
				RepoAction::Disable => self.disable.push(id.clone()),
				RepoAction::Add(url) => {
					self.written.insert(id.clone(), (url.clone(), None));
				},
				RepoAction::GpgKey(key) => {
					// Trust pass: our own repos get it in the file,
					// system repos get a setopt.
					match self.written.get_mut(id)
					{
						Some((_, gk)) => *gk = Some(key.clone()),
						None => {
							self.setopts.push(format!("{id}.gpgkey={key}"));
							self.setopts.push(format!("{id}.gpgcheck=1"));
						},
					}
				},
			}
		}

		for (id, (url, gpgkey)) in &self.written
		{
			if let Err(e) = self.write_repo(id, url, gpgkey.as_deref())
			{ problems.push((id.clone(), e.to_string())); }
		}

		match problems.is_empty()
		{
			true => Ok(()),
			false => Err(EE::Repo { problems }),
		}
	}


	fn load_metadata(&mut self, instrepo: &str)
			-> Result<RepoReport, EngineErr>
	{
		let mut cmd = self.dnf_cmd();
		cmd.args(["makecache", "--refresh", "-y"]);
		let out = self.run(cmd, "dnf makecache")?;

		let stderr = String::from_utf8_lossy(&out.stderr);
		let disabled = parse_sync_failures(&stderr);

		// A broken repo is a warning; a broken install repo means no
		// boot images, which means no upgrade.
		if let Some((_, why)) = disabled.iter().find(|(r, _)| r == instrepo)
		{ return Err(EE::InstRepo(why.clone())); }

		if !out.status.success()
		{
			return Err(EE::Exited {
				cmd: "dnf makecache".to_string(),
				status: out.status.to_string(),
				stderr: stderr.into_owned(),
			});
		}

		for (repo, why) in &disabled
		{ tracing::warn!("disabled repo {repo}: {why}"); }

		Ok(RepoReport { disabled })
	}


	fn resolve(&mut self, _target: &str) -> Result<Resolution, EngineErr>
	{
		// --assumeno gets us the whole resolved transaction printed,
		// then declines it.  Empty transactions exit 0 with "Nothing
		// to do"; nonempty ones exit nonzero at the prompt, which is
		// the answer we wanted, not a failure.
		let mut cmd = self.dnf_cmd();
		cmd.args(["distro-sync", "--assumeno"]);
		let out = self.run(cmd, "dnf distro-sync")?;

		let stdout = String::from_utf8_lossy(&out.stdout);
		let stderr = String::from_utf8_lossy(&out.stderr);

		if stdout.contains("Nothing to do")
		{ return Ok(Resolution::UpToDate); }

		let packages = parse_transaction(&stdout, &self.downloaddir);
		if packages.is_empty()
		{
			return Err(EE::Resolve(match stderr.trim().is_empty() {
				false => stderr.trim().to_string(),
				true => stdout.trim().to_string(),
			}));
		}

		let problems = parse_problems(&stdout, &stderr);
		Ok(Resolution::Upgrade(Upgrade { packages, problems }))
	}


	fn verify_cached(&self, pkg: &PkgItem) -> bool
	{
		// Cheap pre-pass only; dnf re-verifies checksums on download.
		match std::fs::metadata(&pkg.local)
		{
			Ok(md) => md.is_file() && md.len() == pkg.size,
			Err(_) => false,
		}
	}


	fn download(&mut self, pkgs: &[PkgItem],
			progress: &mut dyn FnMut(u64, u64, &str))
			-> Result<Vec<PkgItem>, EngineErr>
	{
		let total = pkgs.len() as u64;

		let mut cmd = self.dnf_cmd();
		cmd.args(["distro-sync", "-y", "--downloadonly"]);
		cmd.arg(format!("--downloaddir={}", self.downloaddir.display()));
		cmd.stdout(Stdio::piped());
		cmd.stderr(Stdio::piped());
		cmd.stdin(Stdio::null());

		tracing::debug!("running dnf download: {cmd:?}");
		let child = cmd.spawn().map_err(|err| EE::Spawn {
			cmd: "dnf distro-sync --downloadonly".to_string(), err,
		})?;

		// Walk its stdout as it comes so we can feed the progress
		// callback.  dnf owns the mirror retries in here, so a single
		// ^C lets the run it's on finish; a second one kills it.
		let mut cur = 0u64;
		let (stderr, status) = stream_child(child, |line| {
			if crate::interrupt::check() == crate::interrupt::Interrupt::Hard
			{ return false; }

			if let Some(file) = parse_download_line(line)
			{
				cur += 1;
				progress(cur, total, &file);
			}
			true
		}).map_err(|err| EE::Spawn {
			cmd: "dnf distro-sync --downloadonly".to_string(), err,
		})?;

		if crate::interrupt::check() != crate::interrupt::Interrupt::None
		{ return Err(EE::Interrupted); }

		if !status.success()
		{ return Err(EE::Download(stderr.trim().to_string())); }

		// What actually landed.
		let mut got = Vec::new();
		for pkg in pkgs
		{
			if let Ok(md) = std::fs::metadata(&pkg.local)
			{
				let mut p = pkg.clone();
				p.size = md.len();
				got.push(p);
			}
		}
		Ok(got)
	}


	fn sigcheck(&self, pkg: &PkgItem) -> Result<SigStatus, EngineErr>
	{
		if self.nogpgcheck { return Ok(SigStatus::Ok); }

		// -Kv prints one verdict line per signature and digest.  An
		// unsigned package with clean digests still exits 0, so the
		// exit status alone can't tell us anything we'd trust.
		let mut cmd = Command::new(RPM);
		cmd.arg("-Kv").arg(&pkg.local);
		let out = self.run(cmd, "rpm -Kv")?;
		let text = String::from_utf8_lossy(&out.stdout);

		match classify_sigcheck(&text)
		{
			SigVerdict::Signed if out.status.success() =>
				Ok(SigStatus::Ok),
			SigVerdict::Signed =>
				Ok(SigStatus::Bad(text.trim().to_string())),
			SigVerdict::Unsigned => Ok(SigStatus::Unsigned),
			SigVerdict::Bad => Ok(SigStatus::Bad(text.trim().to_string())),
			SigVerdict::MissingKey => {
				// Dig out which key it wanted.
				let mut qcmd = Command::new(RPM);
				qcmd.args(["-qp", "--qf", "%{SIGPGP:pgpsig}"])
						.arg(&pkg.local);
				let qout = self.run(qcmd, "rpm -qp pgpsig")?;
				let sig = String::from_utf8_lossy(&qout.stdout);
				match parse_keyid(&sig)
				{
					Some(kid) => Ok(SigStatus::UntrustedKey(kid)),
					None => Ok(SigStatus::Bad(text.trim().to_string())),
				}
			},
		}
	}


	fn key_auto_trustable(&self, keyfile: &Path) -> Result<bool, EngineErr>
	{
		// The whole chain has to hold; any break means no.

		// (a) The key file belongs to an installed package.
		let mut cmd = Command::new(RPM);
		cmd.arg("-qf").arg(keyfile);
		let out = self.run(cmd, "rpm -qf")?;
		if !out.status.success() { return Ok(false); }
		let owner = String::from_utf8_lossy(&out.stdout).trim().to_string();
		if owner.is_empty() { return Ok(false); }

		// (b) That package is signed...
		let mut cmd = Command::new(RPM);
		cmd.args(["-q", "--qf", "%{SIGPGP:pgpsig}", &owner]);
		let out = self.run(cmd, "rpm -q pgpsig")?;
		let sig = String::from_utf8_lossy(&out.stdout);
		let keyid = match parse_keyid(&sig)
		{
			Some(k) => k,
			None => return Ok(false),
		};

		// (c) ...by a key the system already trusts.
		let mut cmd = Command::new(RPM);
		cmd.args(["-q", "gpg-pubkey", "--qf", "%{VERSION}\n"]);
		let out = self.run(cmd, "rpm -q gpg-pubkey")?;
		let trusted = String::from_utf8_lossy(&out.stdout);
		let known = trusted.lines()
				.any(|l| keyid.to_lowercase().ends_with(l.trim()));
		if !known { return Ok(false); }

		// (d) And the file hasn't been touched since install.
		let mut cmd = Command::new(RPM);
		cmd.args(["-V", &owner]);
		let out = self.run(cmd, "rpm -V")?;
		let verify = String::from_utf8_lossy(&out.stdout);
		let kfs = keyfile.display().to_string();
		if verify.lines().any(|l| l.contains(&kfs))
		{ return Ok(false); }

		Ok(true)
	}


	fn import_key(&mut self, keyfile: &Path) -> Result<(), EngineErr>
	{
		let mut cmd = Command::new(RPM);
		cmd.arg("--import").arg(keyfile);
		let out = self.run(cmd, "rpm --import")?;
		if !out.status.success()
		{
			return Err(EE::Signature(format!("importing {}: {}",
					keyfile.display(),
					String::from_utf8_lossy(&out.stderr).trim())));
		}
		Ok(())
	}
}


/// Run a spawned child to completion, streaming its stdout lines
/// through the callback while a separate thread keeps stderr drained
/// into the log.  Without the drain, a child chatty enough to fill the
/// stderr pipe stalls on the write and stdout never reaches EOF.
/// The callback returning false kills the child.  Returns the
/// collected stderr and the exit status.
fn stream_child(mut child: std::process::Child,
		mut on_line: impl FnMut(&str) -> bool)
		-> std::io::Result<(String, std::process::ExitStatus)>
{
	let errpipe = child.stderr.take();
	let drain = std::thread::spawn(move || {
		let mut buf = String::new();
		if let Some(errpipe) = errpipe
		{
			for line in BufReader::new(errpipe).lines()
			{
				let Ok(line) = line else { break };
				tracing::debug!("child stderr: {line}");
				buf.push_str(&line);
				buf.push('\n');
			}
		}
		buf
	});

	if let Some(outpipe) = child.stdout.take()
	{
		for line in BufReader::new(outpipe).lines()
		{
			let Ok(line) = line else { break };
			if !on_line(&line)
			{
				let _ = child.kill();
				break;
			}
		}
	}

	let status = child.wait()?;
	let stderr = drain.join().unwrap_or_default();
	Ok((stderr, status))
}


/// Pull "couldn't sync repo X" failures out of dnf stderr.
fn parse_sync_failures(stderr: &str) -> Vec<(String, String)>
{
	let mut out = Vec::new();
	for line in stderr.lines()
	{
		// "Failed to synchronize cache for repo 'foo', ignoring this repo."
		let Some(rest) = line.split("for repo '").nth(1) else { continue };
		let Some(repo) = rest.split('\'').next() else { continue };
		if line.contains("Failed to synchronize")
		{ out.push((repo.to_string(), line.trim().to_string())); }
	}
	out
}


/// Parse the resolved-transaction table dnf prints.  We want the
/// to-be-downloaded sections; Removing: doesn't download anything.
fn parse_transaction(stdout: &str, downloaddir: &Path) -> Vec<PkgItem>
{
	let mut out = Vec::new();
	let mut capture = false;

	for line in stdout.lines()
	{
		let trimmed = line.trim();
		match trimmed
		{
			"Installing:" | "Upgrading:" | "Downgrading:"
				| "Reinstalling:" | "Installing dependencies:"
				| "Installing weak dependencies:"
				=> { capture = true; continue; },
			"Removing:" | "Transaction Summary" | ""
				=> { capture = false; continue; },
			_ if trimmed.starts_with('=') => continue,
			_ => (),
		}
		if !capture { continue; }

		// " name  arch  version  repo  1.8 M"
		let f: Vec<&str> = trimmed.split_whitespace().collect();
		if f.len() != 6 { continue; }
		let (name, arch, version, num, unit) = (f[0], f[1], f[2], f[4], f[5]);

		let Some(size) = parse_size(num, unit) else { continue };
		let nevra = format!("{name}-{version}.{arch}");
		let local = downloaddir.join(format!("{nevra}.rpm"));
		out.push(PkgItem { nevra, local, size, on_media: false });
	}

	out
}


/// dnf sizes: "90 k", "1.8 M", "2.9 G".
fn parse_size(num: &str, unit: &str) -> Option<u64>
{
	let n: f64 = num.parse().ok()?;
	let mult: f64 = match unit
	{
		"" | "B" => 1.0,
		"k" | "K" => 1024.0,
		"M" => 1024.0 * 1024.0,
		"G" => 1024.0 * 1024.0 * 1024.0,
		_ => return None,
	};
	Some((n * mult) as u64)
}


/// Collect non-fatal transaction complaints out of dnf output.
fn parse_problems(stdout: &str, stderr: &str) -> Vec<Problem>
{
	let mut out = Vec::new();

	for line in stdout.lines().chain(stderr.lines())
	{
		let line = line.trim();

		// "At least 150MB more space needed on the /var filesystem."
		if line.contains("more space needed on the")
		{
			if let Some((mount, need)) = parse_space_line(line)
			{
				out.push(Problem {
					kind: ProblemKind::DiskSpace { mount, need },
					msg: line.to_string(),
				});
				continue;
			}
		}

		if line.starts_with("Problem") || line.contains("nothing provides")
				|| line.contains("cannot install")
		{
			out.push(Problem {
				kind: ProblemKind::Dependency,
				msg: line.to_string(),
			});
			continue;
		}

		if line.contains("conflicts with file")
				|| line.contains("file conflicts")
		{
			out.push(Problem {
				kind: ProblemKind::Conflict,
				msg: line.to_string(),
			});
		}
	}

	out
}

// "At least 150MB more space needed on the /var filesystem."
fn parse_space_line(line: &str) -> Option<(PathBuf, u64)>
{
	let amount = line.strip_prefix("At least ")?
			.split_whitespace().next()?;
	let mount = line.split("on the ").nth(1)?
			.split_whitespace().next()?;

	// "150MB", "1GB", "900KB"
	let split = amount.find(|c: char| !c.is_ascii_digit() && c != '.')?;
	let (num, unit) = amount.split_at(split);
	let n: f64 = num.parse().ok()?;
	let mult: f64 = match unit
	{
		"B" => 1.0,
		"KB" | "kB" => 1024.0,
		"MB" => 1024.0 * 1024.0,
		"GB" => 1024.0 * 1024.0 * 1024.0,
		_ => return None,
	};
	Some((PathBuf::from(mount), (n * mult) as u64))
}


/// Does this dnf output line announce a completed package download?
/// "(12/345): bash-5.2.26-3.fc40.x86_64.rpm  1.2 MB/s | 1.8 MB  00:01"
fn parse_download_line(line: &str) -> Option<String>
{
	let line = line.trim();
	if !line.starts_with('(') { return None; }
	let rest = line.split("): ").nth(1)?;
	let file = rest.split_whitespace().next()?;
	match file.ends_with(".rpm")
	{
		true => Some(file.to_string()),
		false => None,
	}
}


/// What rpm -Kv's verdict lines add up to.
#[derive(Debug, PartialEq)]
enum SigVerdict
{
	/// At least one Signature line, all of them verified.
	Signed,

	/// No Signature line at all.  Digests checking out doesn't make a
	/// package signed.
	Unsigned,

	/// A signature by a key rpm doesn't have.
	MissingKey,

	Bad,
}

fn classify_sigcheck(text: &str) -> SigVerdict
{
	let mut saw_good = false;
	for line in text.lines()
	{
		let line = line.trim();
		if !line.contains("Signature") { continue; }

		if line.contains("NOKEY") || line.contains("MISSING KEY")
		{ return SigVerdict::MissingKey; }
		match line.ends_with("OK")
		{
			true => saw_good = true,
			false => return SigVerdict::Bad,
		}
	}

	match saw_good
	{
		true => SigVerdict::Signed,
		false => SigVerdict::Unsigned,
	}
}


/// Dig the signing key id out of an rpm pgpsig string.
/// "RSA/SHA256, Thu Jan 01 1970, Key ID 4f2a6fd2e55cba0a"
fn parse_keyid(sig: &str) -> Option<String>
{
	let kid = sig.split("Key ID ").nth(1)?
			.split_whitespace().next()?;
	match kid.chars().all(|c| c.is_ascii_hexdigit()) && !kid.is_empty()
	{
		true => Some(kid.to_string()),
		false => None,
	}
}



#[cfg(test)]
mod tests
{
	use super::*;

	const XACT: &str = "\
Last metadata expiration check: 0:00:10 ago.
Dependencies resolved.
================================================================================
 Package           Architecture  Version             Repository           Size
================================================================================
Upgrading:
 bash              x86_64        5.2.26-3.fc40       fedora              1.8 M
 coreutils         x86_64        9.4-6.fc40          fedora              1.1 M
Installing:
 kernel            x86_64        6.8.5-301.fc40      fedora               47 k
Removing:
 old-thing         x86_64        1-1.fc39            @System             1.2 M

Transaction Summary
================================================================================
Install   1 Package
Upgrade   2 Packages
Remove    1 Package

Total download size: 2.9 M
Operation aborted.
";

	#[test]
	fn transaction_table()
	{
		let pkgs = parse_transaction(XACT, Path::new("/dl"));
		let names: Vec<&str> =
				pkgs.iter().map(|p| p.nevra.as_str()).collect();
		// Removing: doesn't make the list.
		assert_eq!(names, vec![
			"bash-5.2.26-3.fc40.x86_64",
			"coreutils-9.4-6.fc40.x86_64",
			"kernel-6.8.5-301.fc40.x86_64",
		]);
		assert_eq!(pkgs[2].size, 47 * 1024);
		assert_eq!(pkgs[0].local,
				PathBuf::from("/dl/bash-5.2.26-3.fc40.x86_64.rpm"));
	}

	#[test]
	fn sizes()
	{
		assert_eq!(parse_size("90", "k"), Some(90 * 1024));
		assert_eq!(parse_size("1.8", "M"), Some(1887436));
		assert_eq!(parse_size("2", "G"), Some(2 * 1024 * 1024 * 1024));
		assert_eq!(parse_size("x", "M"), None);
		assert_eq!(parse_size("1", "Q"), None);
	}

	#[test]
	fn sync_failures()
	{
		let err = "\
Failed to synchronize cache for repo 'updates-testing', ignoring this repo.
Failed to synchronize cache for repo 'sysupgrade-instrepo', ignoring this repo.
Some other noise.
";
		let d = parse_sync_failures(err);
		assert_eq!(d.len(), 2);
		assert_eq!(d[0].0, "updates-testing");
		assert_eq!(d[1].0, "sysupgrade-instrepo");
	}

	#[test]
	fn space_problems()
	{
		let probs = parse_problems(
			"At least 150MB more space needed on the /var filesystem.\n", "");
		assert_eq!(probs.len(), 1);
		match &probs[0].kind
		{
			ProblemKind::DiskSpace { mount, need } => {
				assert_eq!(mount, &PathBuf::from("/var"));
				assert_eq!(*need, 150 * 1024 * 1024);
			},
			k => panic!("wrong kind {k:?}"),
		}
	}

	#[test]
	fn dep_problems()
	{
		let probs = parse_problems("",
			"Problem 1: nothing provides libfoo needed by bar-1-1\n");
		assert_eq!(probs.len(), 1);
		assert_eq!(probs[0].kind, ProblemKind::Dependency);
	}

	#[test]
	fn download_lines()
	{
		assert_eq!(parse_download_line(
			"(12/345): bash-5.2.26-3.fc40.x86_64.rpm  1.2 MB/s | 1.8 MB"),
			Some("bash-5.2.26-3.fc40.x86_64.rpm".to_string()));
		assert_eq!(parse_download_line("Last metadata expiration check"),
			None);
		assert_eq!(parse_download_line("(3/4): repodata.xml.gz 1 kB/s"),
			None);
	}

	#[test]
	fn keyids()
	{
		assert_eq!(parse_keyid(
			"RSA/SHA256, Thu Jan 01 1970, Key ID 4f2a6fd2e55cba0a"),
			Some("4f2a6fd2e55cba0a".to_string()));
		assert_eq!(parse_keyid("(none)"), None);
	}

	#[test]
	fn sig_verdicts()
	{
		let signed = "\
/dl/bash-5.2.26-3.fc40.x86_64.rpm:
    Header V4 RSA/SHA256 Signature, key ID 4f2a6fd2e55cba0a: OK
    Header SHA256 digest: OK
    Payload SHA256 digest: OK
";
		assert_eq!(classify_sigcheck(signed), SigVerdict::Signed);

		// rpm happily exits 0 on an unsigned package with good digests;
		// no Signature line means no signature, full stop.
		let unsigned = "\
/dl/homebuilt-1-1.x86_64.rpm:
    Header SHA256 digest: OK
    Payload SHA256 digest: OK
    MD5 digest: OK
";
		assert_eq!(classify_sigcheck(unsigned), SigVerdict::Unsigned);

		let nokey = "\
/dl/a-1-1.x86_64.rpm:
    Header V4 RSA/SHA256 Signature, key ID 4f2a6fd2e55cba0a: NOKEY
    Header SHA256 digest: OK
";
		assert_eq!(classify_sigcheck(nokey), SigVerdict::MissingKey);

		let bad = "\
/dl/a-1-1.x86_64.rpm:
    Header V4 RSA/SHA256 Signature, key ID 4f2a6fd2e55cba0a: BAD
";
		assert_eq!(classify_sigcheck(bad), SigVerdict::Bad);

		assert_eq!(classify_sigcheck(""), SigVerdict::Unsigned);
	}


	fn shell(script: &str) -> std::process::Child
	{
		let mut cmd = Command::new("/bin/sh");
		cmd.args(["-c", script]);
		cmd.stdin(Stdio::null());
		cmd.stdout(Stdio::piped());
		cmd.stderr(Stdio::piped());
		cmd.spawn().unwrap()
	}

	#[test]
	fn chatty_stderr_cant_wedge()
	{
		// Way more stderr than a pipe buffer holds, then a stdout line
		// at the end.  If nobody drains stderr, the child never gets
		// there and this test never returns.
		let child = shell(
			"i=0; while [ $i -lt 8000 ]; do \
				echo \"mirror retry noise line $i\" >&2; i=$((i+1)); done; \
			echo '(1/1): done-1-1.x86_64.rpm  1.0 MB/s | 1.0 MB'");

		let mut seen = Vec::new();
		let (stderr, status) = stream_child(child, |l| {
			seen.push(l.to_string());
			true
		}).unwrap();

		assert!(status.success());
		assert!(seen.iter().any(|l| l.contains("done-1-1")));
		assert!(stderr.contains("noise line 7999"));
	}

	#[test]
	fn callback_false_kills()
	{
		let child = shell("echo go; exec sleep 30");
		let start = std::time::Instant::now();
		let (_stderr, status) = stream_child(child, |_| false).unwrap();
		assert!(!status.success());
		assert!(start.elapsed() < std::time::Duration::from_secs(10));
	}
}
