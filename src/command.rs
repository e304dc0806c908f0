//! General command handling.  This is sorta the central dispatch for
//! everything that goes on.

/// Command-line parsing and handling
mod line;
pub(crate) use line::SuArgs;
pub(crate) use line::SuCmds;
pub(crate) use line::SuCmdDownload;
pub(crate) use line::parse_argv;
pub use line::parse;



use std::process::ExitCode;


/// Pass a bunch of info to the individual command runners as a block
#[derive(Debug)]
pub(crate) struct CmdArg
{
	/// The command-line args
	pub(crate) clargs: SuArgs,

	/// The system we're running on
	pub(crate) sysinfo: crate::sysinfo::SysInfo,
}


/// Dispatch a command
pub fn run(clargs: SuArgs) -> Result<ExitCode, anyhow::Error>
{
	use crate::*;

	// Any early initialization
	init(&clargs)?;

	// Every command cares what we're running on (or will soon enough).
	let sysinfo = crate::sysinfo::get()?;

	let carg = CmdArg { clargs, sysinfo };
	tracing::debug!("dispatching {} on {}", carg.clargs.command,
			carg.sysinfo);

	// The actions hand back a process exit code of their own; status
	// is just pass/fail.
	use line::SuCmds as SC;
	let code: u8 = match carg.clargs.command {
		// Action
		SC::Download(..) => cmd::download::run(carg)?,
		SC::Resume       => cmd::resume::run(carg)?,
		SC::Cancel       => cmd::cancel::run(carg)?,
		SC::Reboot       => cmd::reboot::run(carg)?,

		// Misc
		SC::Clean(..) => cmd::clean::run(carg)?,
		SC::Status    => { cmd::status::run(carg)?; 0 },
	};
	Ok(ExitCode::from(code))
}


/// Do any initialization we care about
pub fn init(clargs: &SuArgs) -> Result<(), anyhow::Error>
{
	crate::logging::init(&clargs.logfile, clargs.verbose)?;

	// ^C turns into bookkeeping, not death, from here on.
	crate::interrupt::install();

	Ok(())
}
