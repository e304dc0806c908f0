use std::process::ExitCode;

fn main() -> ExitCode
{
	let clargs = sysupgrade::command::parse();

	match sysupgrade::command::run(clargs)
	{
		Ok(code) => code,
		Err(e) => {
			// Anything landing here had no friendlier handling upstream.
			eprintln!("sysupgrade: {e:#}");
			ExitCode::FAILURE
		},
	}
}
