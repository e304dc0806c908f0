//! Log setup.
//!
//! Two sinks: a terse console feed on stderr gated by -v, and an
//! append-only file log, so "what did the upgrade tool actually do
//! last tuesday" has an answer.  The println! output the user steers
//! by is the UI, not logging; it doesn't come through here.
use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;


pub(crate) fn init(logfile: &Path, verbose: u8)
		-> Result<(), anyhow::Error>
{
	// -v sets the console level; SYSUPGRADE_LOG overrides it wholesale
	// for when you need per-module directives.
	let confilter = match EnvFilter::try_from_env("SYSUPGRADE_LOG")
	{
		Ok(f) => f,
		Err(_) => EnvFilter::new(match verbose {
			0 => "warn",
			1 => "info",
			2 => "debug",
			_ => "trace",
		}),
	};
	let console = fmt::layer()
			.with_target(false)
			.without_time()
			.with_writer(std::io::stderr)
			.with_filter(confilter);

	// The file log is best-effort.  An unprivileged `status` can't
	// open /var/log, and shouldn't die over it.
	let file = std::fs::OpenOptions::new()
			.create(true).append(true)
			.open(logfile).ok();
	let file = file.map(|f| {
		fmt::layer()
				.with_ansi(false)
				.with_writer(std::sync::Mutex::new(f))
				.with_filter(LevelFilter::DEBUG)
	});

	tracing_subscriber::registry()
			.with(file)
			.with(console)
			.init();
	Ok(())
}
