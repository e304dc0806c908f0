//! Single-instance locking.
//!
//! Exactly one invocation gets to mutate upgrade state at a time.  We
//! take an exclusive flock() on a pidfile; the lock dies with the
//! process, so a crashed run can never wedge the system, and the pid in
//! the file tells a human (and our error message) who's holding it.
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::os::fd::AsRawFd;
use std::path::Path;

use thiserror::Error;


/// Why we couldn't take the lock.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum LockErr
{
	#[error("another instance is already running (pid {0})")]
	Held(u32),

	#[error("another instance is already running")]
	HeldUnknown,

	#[error("lockfile error: {0}")]
	IO(#[from] std::io::Error),
}


/// A held instance lock.  Dropping it releases; the file itself is left
/// in place, which is fine since the flock is what matters.
#[derive(Debug)]
pub(crate) struct PidLock
{
	file: File,
}


impl PidLock
{
	/// Try to take the lock, non-blocking.  On conflict, report the
	/// holder's pid if we can read it.
	pub(crate) fn acquire(path: &Path) -> Result<Self, LockErr>
	{
		let mut file = File::options().read(true).write(true).create(true)
				.truncate(false).open(path)?;

		let rv = unsafe {
			libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB)
		};
		if rv != 0
		{
			let errno = std::io::Error::last_os_error();
			if errno.kind() == std::io::ErrorKind::WouldBlock
			{
				// Somebody else has it; see if they left a pid for us.
				let mut buf = String::new();
				let _ = file.read_to_string(&mut buf);
				return match buf.trim().parse::<u32>()
				{
					Ok(pid) => Err(LockErr::Held(pid)),
					Err(_) => Err(LockErr::HeldUnknown),
				};
			}
			return Err(errno.into());
		}

		// Ours now; stamp our pid over whatever was there.
		file.set_len(0)?;
		file.rewind()?;
		writeln!(file, "{}", std::process::id())?;
		file.sync_all()?;

		Ok(PidLock { file })
	}
}


impl Drop for PidLock
{
	fn drop(&mut self)
	{
		// Closing the fd would drop the flock anyway, but be explicit.
		unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN); }
	}
}
