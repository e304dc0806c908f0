//! `cancel`: discard an in-progress download.
use crate::boot::entry::NewKernelPkg;
use crate::cmd::Preflight;
use crate::command::CmdArg;
use crate::dirs::Dirs;
use crate::state::{Phase, State};


pub(crate) fn run(carg: CmdArg) -> Result<u8, anyhow::Error>
{
	let _lock = match crate::cmd::preflight()? {
		Preflight::Locked(l) => l,
		Preflight::Exit(c) => return Ok(c),
	};

	let dirs = Dirs::init(&carg.clargs.datadir, &carg.clargs.cachedir)?;
	let mut state = State::load(&dirs.statefile())?;

	let me = crate::util::cmdname();
	match state.data().phase()
	{
		Phase::None => {
			println!("No upgrade in progress.");
			return Ok(0);
		},
		// Once everything's staged, the next moves are reboot or an
		// explicit clean; make the user say which.
		Phase::Ready => {
			eprintln!("Download already finished; run `{me} reboot` to \
					proceed, or `{me} clean all` to discard everything.");
			return Ok(1);
		},
		Phase::Downloading => (),
	}

	let boot = state.data().boot.clone();
	crate::clean::all(&mut NewKernelPkg, &boot, &dirs);
	state.clear()?;

	println!("Upgrade cancelled.  Cached repo metadata was kept; \
			`{me} clean metadata` drops that too.");
	Ok(0)
}
