//! The individual commands.

use std::path::Path;

use crate::lock::{LockErr, PidLock};

pub(crate) mod download;
pub(crate) mod resume;
pub(crate) mod cancel;
pub(crate) mod reboot;
pub(crate) mod clean;
pub(crate) mod status;


/// Outcome of the shared mutating-command preflight: either we hold
/// the instance lock, or we already know the exit code.
pub(crate) enum Preflight
{
	Locked(PidLock),
	Exit(u8),
}

/// Root check plus the single-instance lock.  Everything that mutates
/// the system runs through this first.
pub(crate) fn preflight() -> Result<Preflight, anyhow::Error>
{
	use Preflight as P;

	if !crate::util::am_root()
	{
		eprintln!("{}: you need to be root to do that.",
				crate::util::cmdname());
		return Ok(P::Exit(1));
	}

	match PidLock::acquire(Path::new(crate::dirs::LOCKFILE))
	{
		Ok(l) => Ok(P::Locked(l)),
		Err(LockErr::Held(pid)) => {
			eprintln!("Another {} is already running (pid {pid}).",
					crate::util::cmdname());
			Ok(P::Exit(2))
		},
		Err(LockErr::HeldUnknown) => {
			eprintln!("Another {} is already running.",
					crate::util::cmdname());
			Ok(P::Exit(2))
		},
		Err(e) => Err(e.into()),
	}
}
