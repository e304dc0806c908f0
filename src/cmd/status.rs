//! `status`: say where things stand.  Read-only; no root, no lock.
use crate::command::CmdArg;
use crate::dirs::Dirs;
use crate::state::{Phase, State};


pub(crate) fn run(carg: CmdArg) -> Result<(), anyhow::Error>
{
	let dirs = Dirs::new_unchecked(&carg.clargs.datadir,
			&carg.clargs.cachedir);
	let state = State::load(&dirs.statefile())?;

	println!("Running: {}", carg.sysinfo);
	println!("{}", state.data().summarize());

	// Stale in-progress state usually means somebody ^C'd and wandered
	// off; saying how old it is helps them remember.
	if state.data().phase() != Phase::None
	{
		if let Ok(mtime) = std::fs::metadata(dirs.statefile())
				.and_then(|md| md.modified())
		{
			let when: chrono::DateTime<chrono::Local> = mtime.into();
			println!("  (state last changed {})",
					when.format("%Y-%m-%d %H:%M:%S"));
		}
	}
	Ok(())
}
