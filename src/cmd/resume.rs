//! `resume`: pick an interrupted download back up.
use crate::command::{self, CmdArg};
use crate::dirs::Dirs;
use crate::state::State;


pub(crate) fn run(carg: CmdArg) -> Result<u8, anyhow::Error>
{
	// Just peek at state for the command line to replay; the replayed
	// run re-does the root/lock/phase checking itself.
	let dirs = Dirs::new_unchecked(&carg.clargs.datadir,
			&carg.clargs.cachedir);
	let state = State::load(&dirs.statefile())?;

	let argv = match state.data().cmdline()?
	{
		Some(a) => a,
		None => {
			eprintln!("Nothing to resume.");
			return Ok(1);
		},
	};

	tracing::info!("resuming: {}", argv.join(" "));
	let saved = command::parse_argv(&argv).map_err(|e| {
		anyhow::anyhow!("saved command line won't parse (statefile \
				damage?): {e}")
	})?;

	crate::cmd::download::rerun(&carg, &saved, argv)
}
