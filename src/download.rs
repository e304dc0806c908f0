//! The resolution and download driver.
//!
//! This sequences the front half of an upgrade: repo setup, metadata
//! load, resolve, boot-image fetch, package fetch, signature checks.
//! Each step is a separate method so the caller can commit durable
//! state between them; no step here writes state itself.
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::dirs::Dirs;
use crate::engine::{EngineErr, PkgItem, Resolution, ResolutionEngine,
		SigStatus, Upgrade};
use crate::interrupt::{self, Interrupt};
use crate::repo::{self, RepoAction, RepoSpec};
use crate::treeinfo::Treeinfo;
use crate::util::retry::{self, Attempt, RetryErr};

/// Total fetch attempts across all mirrors before we call an image
/// unfetchable.
const MAX_TRIES: usize = 10;

/// Cap on how big a fetched file can be; a broken mirror shouldn't get
/// to fill the disk.  Boot images run a few hundred megs tops.
const FETCH_LIMIT: u64 = 2 * 1024 * 1024 * 1024;


/// Driver failures.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum DlErr
{
	#[error(transparent)]
	Engine(#[from] EngineErr),

	#[error("no usable mirrors for the installation repo")]
	NoMirrors,

	/// Every mirror failed us.  Distinct from "repo unreachable": we
	/// reached things, they just never gave us good images.
	#[error("couldn't fetch boot images after {attempts} attempts: {last}")]
	ImagesExhausted
	{
		attempts: usize,
		last: anyhow::Error,
	},

	#[error("package {nevra} failed signature check: {why}")]
	BadSignature
	{
		nevra: String,
		why: String,
	},

	#[error("interrupted")]
	Interrupted,

	#[error("fetching {url}: {err}")]
	Fetch
	{
		url: String,
		err: anyhow::Error,
	},
}


/// What a finished download pass hands back.
#[derive(Debug)]
pub(crate) struct FetchedImages
{
	pub(crate) kernel: PathBuf,
	pub(crate) initrd: PathBuf,
}


/// The driver.  Owns an HTTP agent for the image side; the package
/// side goes through the engine.
pub(crate) struct Downloader<'a, E: ResolutionEngine>
{
	engine: &'a mut E,
	dirs: &'a Dirs,
	agent: ureq::Agent,

	/// Key files the user attached to repos; candidates for the
	/// auto-import provenance check when a signature comes back
	/// untrusted.
	keyfiles: Vec<PathBuf>,
}


impl<'a, E: ResolutionEngine> Downloader<'a, E>
{
	pub(crate) fn new(engine: &'a mut E, dirs: &'a Dirs) -> Self
	{
		let agent = ureq::AgentBuilder::new()
				.timeout_connect(std::time::Duration::from_secs(30))
				.build();
		Downloader { engine, dirs, agent, keyfiles: Vec::new() }
	}


	/// Step 1: apply repo overrides (structural pass then trust pass)
	/// and load metadata.  Per-repo metadata failures come back in the
	/// report; only the install repo failing is fatal.
	pub(crate) fn setup_repos(&mut self, specs: &[RepoSpec],
			instrepo_id: &str)
			-> Result<crate::engine::RepoReport, DlErr>
	{
		// Remember file:// keys for the trust chain later.
		for s in specs
		{
			if let RepoAction::GpgKey(url) = &s.action
			{
				if let Some(path) = url.strip_prefix("file://")
				{ self.keyfiles.push(PathBuf::from(path)); }
			}
		}

		// A key file that's present but isn't a key is a trust problem
		// right now, not later when rpm chokes on it.
		for kf in &self.keyfiles
		{
			if !kf.is_file() { continue; }
			let body = std::fs::read_to_string(kf).unwrap_or_default();
			if !looks_like_pubkey(&body)
			{
				return Err(DlErr::Engine(EngineErr::Signature(format!(
					"{} doesn't look like a GPG public key",
					kf.display()))));
			}
		}

		let ordered = repo::two_pass(specs);
		self.engine.setup_repos(&ordered)?;
		let report = self.engine.load_metadata(instrepo_id)?;
		Ok(report)
	}


	/// Step 2: compute the transaction.
	pub(crate) fn resolve(&mut self, target: &str)
			-> Result<Resolution, DlErr>
	{
		Ok(self.engine.resolve(target)?)
	}


	/// Step 3: fetch kernel + upgrade initramfs from the install repo
	/// into the cache, verifying checksums, failing over across
	/// mirrors.
	pub(crate) fn fetch_boot_images(&mut self, instrepo_url: &str,
			target: &str, arch: &str) -> Result<FetchedImages, DlErr>
	{
		let sources = self.expand_sources(instrepo_url)?;
		if sources.is_empty() { return Err(DlErr::NoMirrors); }

		let got = retry::with_alternates(&sources, MAX_TRIES, |base| {
			if interrupt::check() == Interrupt::Hard
			{ return Err(Attempt::Fatal(anyhow::anyhow!("interrupted"))); }

			match self.try_tree(base, target, arch)
			{
				Ok(imgs) => Ok(imgs),
				Err(e) => {
					// A ^C mid-fetch surfaces as an I/O error; eat the
					// soft flag and move to the next mirror.  A second
					// ^C will have escalated to Hard by now.
					interrupt::take_soft();
					Err(Attempt::Retry(e))
				},
			}
		});

		match got
		{
			Ok(imgs) => Ok(imgs),
			Err(RetryErr::NoSources) => Err(DlErr::NoMirrors),
			Err(RetryErr::Exhausted { attempts, last }) =>
				Err(DlErr::ImagesExhausted { attempts, last }),
			Err(RetryErr::Fatal(_)) => Err(DlErr::Interrupted),
		}
	}


	/// Step 4: get the packages.  Fast-verifies what's already cached,
	/// downloads the rest through the engine, cross-checks the
	/// returned set, signature-checks everything, and marks which
	/// files live on mounted media.
	pub(crate) fn fetch_packages(&mut self, up: &Upgrade)
			-> Result<Vec<PkgItem>, DlErr>
	{
		let total = up.packages.len() as u64;

		// Cheap pre-pass over the local cache, so the progress the
		// user sees distinguishes "already had it" from "fetching".
		let vpb = crate::progress::count_bar(total, "verify");
		let mut cached = 0u64;
		for pkg in &up.packages
		{
			if self.engine.verify_cached(pkg) { cached += 1; }
			vpb.inc(1);
		}
		vpb.finish();
		if cached > 0
		{ tracing::info!("{cached}/{total} packages already cached"); }

		let dpb = crate::progress::count_bar(total, "download");
		let got = self.engine.download(&up.packages,
				&mut |cur, _tot, file| {
					dpb.set_position(cur);
					dpb.set_message(file.to_string());
				});
		dpb.finish();
		let got = match got
		{
			Err(EngineErr::Interrupted) => return Err(DlErr::Interrupted),
			other => other?,
		};

		// The engine's set can differ from what we asked for (shared
		// caches, obsoletes landing mid-flight).  Log it, don't die
		// over it.
		log_set_difference(&up.packages, &got);

		let mut out = Vec::with_capacity(got.len());
		for mut pkg in got
		{
			self.sigcheck_pkg(&pkg)?;
			pkg.on_media = pkg.local.starts_with(self.dirs.mediadir());
			out.push(pkg);
		}
		Ok(out)
	}


	// Signature-check one package, with the auto-import chain for
	// untrusted keys.  Trust problems are always fatal.
	fn sigcheck_pkg(&mut self, pkg: &PkgItem) -> Result<(), DlErr>
	{
		let first = self.engine.sigcheck(pkg)?;
		let keyid = match first
		{
			SigStatus::Ok => return Ok(()),
			SigStatus::Unsigned => return Err(DlErr::BadSignature {
				nevra: pkg.nevra.clone(),
				why: "package is not signed".to_string(),
			}),
			SigStatus::Bad(why) => return Err(DlErr::BadSignature {
				nevra: pkg.nevra.clone(), why,
			}),
			SigStatus::UntrustedKey(kid) => kid,
		};

		// Unknown key.  We'll import it ourselves only if some
		// candidate key file has airtight provenance; otherwise the
		// user has to make the trust decision, not us.
		for kf in self.keyfiles.clone()
		{
			if !kf.is_file() { continue; }
			if !self.engine.key_auto_trustable(&kf)? { continue; }

			tracing::info!("importing {} for key {keyid}", kf.display());
			self.engine.import_key(&kf)?;

			if self.engine.sigcheck(pkg)? == SigStatus::Ok
			{ return Ok(()); }
		}

		Err(DlErr::BadSignature {
			nevra: pkg.nevra.clone(),
			why: format!("signed by untrusted key {keyid}"),
		})
	}


	// Turn an instrepo URL into a list of candidate tree base URLs.
	// @url means "fetch this, it's a newline list of mirrors"; anything
	// else is itself the one source.
	fn expand_sources(&self, url: &str) -> Result<Vec<String>, DlErr>
	{
		let Some(listurl) = url.strip_prefix('@') else
		{ return Ok(vec![url.to_string()]); };

		let body = self.fetch_text(listurl)?;
		Ok(parse_mirrorlist(&body))
	}


	// One whole attempt against one mirror: treeinfo, sanity checks,
	// both images, checksums.
	fn try_tree(&self, base: &str, target: &str, arch: &str)
			-> Result<FetchedImages, anyhow::Error>
	{
		let ti = Treeinfo::parse(&self.fetch_text(&join_url(base,
				".treeinfo")?)?)?;

		// A mirror serving the wrong release or arch might just be
		// stale; let the next one have a go.
		let tver = ti.version()?;
		if tver != target
		{ anyhow::bail!("tree at {base} is version {tver}, not {target}"); }
		let tarch = ti.arch()?;
		if tarch != arch
		{ anyhow::bail!("tree at {base} is {tarch}, not {arch}"); }

		let kernel = self.fetch_image(&ti, base, arch, "kernel")?;
		let initrd = self.fetch_image(&ti, base, arch, "upgrade")?;
		Ok(FetchedImages { kernel, initrd })
	}

	// Fetch one image unless a verified copy is already cached.
	fn fetch_image(&self, ti: &Treeinfo, base: &str, arch: &str,
			img: &'static str) -> Result<PathBuf, anyhow::Error>
	{
		let relpath = ti.image(arch, img)?;
		let fname = relpath.rsplit('/').next().unwrap_or(relpath);
		let dest = self.dirs.cachedir().join(fname);

		if dest.is_file() && ti.checkfile(&dest, relpath)?
		{
			tracing::debug!("already have {}", dest.display());
			return Ok(dest);
		}

		let url = join_url(base, relpath)?;
		self.fetch_file(&url, &dest)?;

		if !ti.checkfile(&dest, relpath)?
		{
			crate::util::fs::rm_f(&dest);
			anyhow::bail!("checksum mismatch on {url}");
		}
		Ok(dest)
	}


	// Small-text GET.
	fn fetch_text(&self, url: &str) -> Result<String, DlErr>
	{
		let resp = self.agent.get(url).call()
				.map_err(|e| DlErr::Fetch {
					url: url.to_string(), err: e.into(),
				})?;
		resp.into_string().map_err(|e| DlErr::Fetch {
			url: url.to_string(), err: e.into(),
		})
	}

	// Big-file GET, streamed to disk.
	fn fetch_file(&self, url: &str, dest: &Path)
			-> Result<(), anyhow::Error>
	{
		use std::io::{BufWriter, Read, Write};

		let resp = self.agent.get(url).call()?;
		let len = resp.header("Content-Length")
				.and_then(|l| l.parse::<u64>().ok()).unwrap_or(0);

		let pb = crate::progress::bytes_bar(len,
				dest.file_name().map(|f| f.to_string_lossy().into_owned())
					.unwrap_or_default().as_str());

		let tmp = tempfile::NamedTempFile::new_in(
				dest.parent().unwrap_or(Path::new(".")))?;
		let mut wtr = BufWriter::new(tmp.as_file());

		let mut rdr = resp.into_reader().take(FETCH_LIMIT);
		let mut buf = [0u8; 64 * 1024];
		loop
		{
			let n = rdr.read(&mut buf)?;
			if n == 0 { break; }
			wtr.write_all(&buf[..n])?;
			pb.inc(n as u64);

			if interrupt::check() != Interrupt::None
			{
				pb.abandon();
				anyhow::bail!("interrupted");
			}
		}
		wtr.flush()?;
		drop(wtr);

		tmp.as_file().sync_all()?;
		tmp.persist(dest)?;
		pb.finish();
		Ok(())
	}
}


// Repo keys are armored ASCII; anything else is somebody's mistake.
fn looks_like_pubkey(data: &str) -> bool
{
	data.trim_start().starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----")
}


// Mirrorlist bodies are one URL per line, comments with #.
fn parse_mirrorlist(body: &str) -> Vec<String>
{
	body.lines()
			.map(|l| l.trim())
			.filter(|l| !l.is_empty() && !l.starts_with('#'))
			.filter(|l| l.starts_with("http://") || l.starts_with("https://")
					|| l.starts_with("file://"))
			.map(|l| l.to_string())
			.collect()
}


// Join a tree base URL and a relative path without eating the last
// path component of the base.
fn join_url(base: &str, relpath: &str) -> Result<String, url::ParseError>
{
	let mut base = base.to_string();
	if !base.ends_with('/') { base.push('/'); }
	let url = Url::parse(&base)?.join(relpath)?;
	Ok(url.to_string())
}


// Log the difference between what we asked the engine for and what we
// got back.
fn log_set_difference(want: &[PkgItem], got: &[PkgItem])
{
	use std::collections::HashSet;

	let w: HashSet<&str> = want.iter().map(|p| p.nevra.as_str()).collect();
	let g: HashSet<&str> = got.iter().map(|p| p.nevra.as_str()).collect();

	for missing in w.difference(&g)
	{ tracing::info!("requested but not downloaded: {missing}"); }
	for extra in g.difference(&w)
	{ tracing::info!("downloaded but not requested: {extra}"); }
}
