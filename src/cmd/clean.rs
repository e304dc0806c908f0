//! `clean`: remove some or all of an upgrade-in-waiting.
use crate::boot::entry::NewKernelPkg;
use crate::clean::{self, CleanOp};
use crate::cmd::Preflight;
use crate::command::{CmdArg, SuCmds};
use crate::dirs::Dirs;
use crate::state::{BootSect, Phase, State};


pub(crate) fn run(carg: CmdArg) -> Result<u8, anyhow::Error>
{
	let what = match &carg.clargs.command {
		SuCmds::Clean(a) => a.what,
		_ => unreachable!("It said clean..."),
	};

	let _lock = match crate::cmd::preflight()? {
		Preflight::Locked(l) => l,
		Preflight::Exit(c) => return Ok(c),
	};

	let dirs = Dirs::init(&carg.clargs.datadir, &carg.clargs.cachedir)?;
	let mut state = State::load(&dirs.statefile())?;

	tracing::info!("cleaning {what}");
	match what
	{
		CleanOp::Packages => {
			clean::packages(&dirs);

			// Staged packages are gone, so any ready promise is off.
			if state.data().phase() == Phase::Ready
			{ state.update(|st| { st.upgrade.ready = false; Ok(()) })?; }
		},

		CleanOp::Bootloader => {
			let boot = state.data().boot.clone();
			clean::bootloader(&mut NewKernelPkg, &boot);
			if boot != BootSect::default()
			{ state.update(|st| { st.boot = BootSect::default(); Ok(()) })?; }
		},

		CleanOp::Metadata => clean::metadata(&dirs),

		CleanOp::Misc => clean::misc(),

		CleanOp::All => {
			let boot = state.data().boot.clone();
			clean::all(&mut NewKernelPkg, &boot, &dirs);
			state.clear()?;
		},
	}

	Ok(0)
}
