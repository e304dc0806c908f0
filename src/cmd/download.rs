//! `download`: the whole front half of an upgrade.
//!
//! Repo setup, transaction resolution, boot-image fetch, package
//! fetch + verification, staging.  Durable state gets committed
//! between the steps, so an interruption anywhere leaves something
//! `resume` can pick up and `status` can describe.

use crate::cmd::Preflight;
use crate::command::{CmdArg, SuArgs, SuCmds, SuCmdDownload};
use crate::dirs::Dirs;
use crate::download::{DlErr, Downloader};
use crate::engine::{self, EngineErr, Resolution};
use crate::engine::dnf::DnfEngine;
use crate::repo::{self, RepoAction, RepoErr, RepoSpec};
use crate::state::{Phase, State};
use crate::sysinfo::SysInfo;


pub(crate) fn run(carg: CmdArg) -> Result<u8, anyhow::Error>
{
	let args = match &carg.clargs.command {
		SuCmds::Download(a) => a.clone(),
		_ => unreachable!("It said download..."),
	};

	// The whole invocation, so an interrupted run can be replayed.
	let argv: Vec<String> = std::env::args().skip(1).collect();
	go(&carg.sysinfo, &carg.clargs, &args, argv, false)
}


/// Entry point for `resume`: same pipeline, driven by the replayed
/// original command line instead of ours.
pub(crate) fn rerun(carg: &CmdArg, saved: &SuArgs, argv: Vec<String>)
		-> Result<u8, anyhow::Error>
{
	let args = match &saved.command {
		SuCmds::Download(a) => a.clone(),
		c => anyhow::bail!("saved command line is a `{c}`, not a download"),
	};
	go(&carg.sysinfo, saved, &args, argv, true)
}


fn go(sysinfo: &SysInfo, clargs: &SuArgs, args: &SuCmdDownload,
		argv: Vec<String>, resuming: bool) -> Result<u8, anyhow::Error>
{
	let _lock = match crate::cmd::preflight()? {
		Preflight::Locked(l) => l,
		Preflight::Exit(c) => return Ok(c),
	};

	let dirs = Dirs::init(&clargs.datadir, &clargs.cachedir)?;
	let mut state = State::load(&dirs.statefile())?;

	// One upgrade at a time.  A fresh download needs a clean slate; a
	// resume needs something to resume.
	match (state.data().phase(), resuming)
	{
		(Phase::None, false) | (Phase::Downloading, true) => (),
		(Phase::None, true) => {
			eprintln!("Nothing to resume.");
			return Ok(1);
		},
		(Phase::Ready, true) => {
			println!("{}", state.data().summarize());
			return Ok(0);
		},
		(_, false) => {
			eprintln!("{}", state.data().summarize());
			return Ok(1);
		},
	}

	let target = args.version.clone();
	if let Some(code) = check_target(&sysinfo.version, &target)
	{ return Ok(code); }

	let mut specs = match build_specs(args) {
		Ok(s) => s,
		Err(e) => { eprintln!("{e}"); return Ok(2); },
	};
	let (instrepo_id, instrepo_url) = match instrepo_spec(&args.instrepo,
			&specs, &target, &sysinfo.arch)
	{
		Ok((id, url, extra)) => {
			if let Some(s) = extra { specs.push(s); }
			(id, url)
		},
		Err(msg) => { eprintln!("{msg}"); return Ok(2); },
	};

	let mut eng = DnfEngine::new(&target, dirs.cachedir(),
			&dirs.cachedir().join("packages"), args.nogpgcheck)?;

	// First durable commit: target, provenance, and the replayable
	// command line.  From here, `status` knows and `cancel` works.
	state.update(|st| {
		st.upgrade.target = Some(target.clone());
		st.system.distro = Some(sysinfo.distro.clone());
		st.system.version = Some(sysinfo.version.clone());
		st.persist.datadir = Some(dirs.datadir().to_path_buf());
		st.persist.cachedir = Some(dirs.cachedir().to_path_buf());
		st.set_cmdline(&argv);
		Ok(())
	})?;

	let mut dl = Downloader::new(&mut eng, &dirs);

	println!("Setting up repos...");
	let report = dl.setup_repos(&specs, &instrepo_id)?;
	for (repoid, why) in &report.disabled
	{ tracing::warn!("repo {repoid} unusable, continuing without: {why}"); }

	println!("Resolving upgrade to {target}...");
	let sp = crate::progress::spinner("talking to the package engine");
	let res = dl.resolve(&target);
	sp.finish_and_clear();
	let up = match res
	{
		Ok(Resolution::UpToDate) => {
			println!("No upgrade needed; you're already current.");
			state.clear()?;
			return Ok(0);
		},
		Ok(Resolution::Upgrade(up)) => up,
		Err(DlErr::Engine(EngineErr::Resolve(msg))) => {
			eprintln!("Upgrade transaction failed:\n{msg}");
			return Ok(3);
		},
		Err(e) => return Err(e.into()),
	};

	// Resolution problems are advisory; the user gets to read them and
	// decide whether the eventual upgrade is one they want.
	for line in engine::summarize_problems(&up.problems)
	{ eprintln!("{line}"); }

	let (npkgs, size) = (up.packages.len() as u64, up.size_total());
	println!("Upgrade to {target}: {npkgs} packages, {} to download.",
			crate::util::hrsize(size));
	state.update(|st| {
		st.download.pkgs_total = Some(npkgs);
		st.download.size_total = Some(size);
		Ok(())
	})?;

	println!("Fetching upgrade boot images...");
	let imgs = match dl.fetch_boot_images(&instrepo_url, &target,
			&sysinfo.arch)
	{
		Err(DlErr::Interrupted) => return interrupted(),
		other => other?,
	};
	state.update(|st| {
		st.upgrade.kernel = Some(imgs.kernel.clone());
		st.upgrade.initrd = Some(imgs.initrd.clone());
		Ok(())
	})?;

	println!("Fetching packages...");
	let pkgs = match dl.fetch_packages(&up)
	{
		Err(DlErr::Interrupted) => return interrupted(),
		other => other?,
	};

	let sum = crate::stage::stage(&dirs, &pkgs)?;
	tracing::info!("staged: {} linked, {} copied, {} kept, {} on media, \
			{} stale removed", sum.linked, sum.copied, sum.kept,
			sum.media, sum.removed);

	// The last commit flips the ready bit; everything it promises is
	// already on disk.
	state.update(|st| { st.upgrade.ready = true; Ok(()) })?;

	let me = crate::util::cmdname();
	println!("Download complete!  Run `{me} reboot` to start the upgrade, \
			or `{me} cancel` to back out.");
	Ok(0)
}


// An interrupted download isn't a failure; the state stays resumable.
fn interrupted() -> Result<u8, anyhow::Error>
{
	let me = crate::util::cmdname();
	eprintln!("Interrupted.  Run `{me} resume` to pick up where we left \
			off, or `{me} cancel` to discard.");
	Ok(1)
}


// The requested version has to actually be ahead of us.  Non-numeric
// versions (rawhide and friends) skip the comparison; they don't order.
fn check_target(current: &str, target: &str) -> Option<u8>
{
	let (Ok(cur), Ok(tgt)) = (current.parse::<u64>(), target.parse::<u64>())
		else { return None; };

	if tgt <= cur
	{
		eprintln!("Can't upgrade to {target}; this system is already \
				running {current}.");
		return Some(1);
	}
	None
}


// Collect the repo overrides.  Enables, disables, adds, keys, in that
// order; the structural-before-trust reordering happens downstream.
fn build_specs(args: &SuCmdDownload) -> Result<Vec<RepoSpec>, RepoErr>
{
	let mut specs = Vec::new();
	for r in &args.enablerepo  { specs.push(RepoSpec::enable(r)?); }
	for r in &args.disablerepo { specs.push(RepoSpec::disable(r)?); }
	for r in &args.addrepo     { specs.push(RepoSpec::add(r)?); }
	for r in &args.repogpgkey  { specs.push(RepoSpec::gpgkey(r)?); }
	Ok(specs)
}


// Work out where the boot images come from: the repo id for the
// engine, the URL for our own image fetching, and maybe a spec to add.
fn instrepo_spec(arg: &Option<String>, specs: &[RepoSpec], version: &str,
		arch: &str) -> Result<(String, String, Option<RepoSpec>), String>
{
	match arg
	{
		None => {
			let spec = repo::default_instrepo(version, arch);
			let RepoAction::Add(url) = spec.action.clone() else
			{ unreachable!("default instrepo is always an add"); };
			Ok((spec.repoid.clone(), url, Some(spec)))
		},

		Some(v) if v.contains('=') => {
			let spec = RepoSpec::add(v).map_err(|e| e.to_string())?;
			let RepoAction::Add(url) = spec.action.clone() else
			{ unreachable!("add always parses to an add"); };
			Ok((spec.repoid.clone(), url, Some(spec)))
		},

		// A bare id has to match an --addrepo; the images get fetched
		// by us, not the engine, so a repo we don't know the URL of
		// does us no good.
		Some(id) => {
			for s in specs
			{
				if &s.repoid != id { continue; }
				if let RepoAction::Add(url) = &s.action
				{ return Ok((id.clone(), url.clone(), None)); }
			}
			Err(format!("--instrepo {id} doesn't name an --addrepo'd \
					repo; use --instrepo REPOID=URL"))
		},
	}
}
