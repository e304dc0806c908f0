//! SIGINT classification.
//!
//! ^C during a download shouldn't necessarily kill the whole run; the
//! first one just abandons the current mirror attempt and moves on.  A
//! second one close behind means the user really means it, and that
//! unwinds the whole action (leaving state resumable).  Everything in
//! here is async-signal-safe: atomics and the monotonic clock, nothing
//! else.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};


static SOFT: AtomicBool = AtomicBool::new(false);
static HARD: AtomicBool = AtomicBool::new(false);
static LAST_MS: AtomicU64 = AtomicU64::new(0);

/// How close together two ^C's have to land to count as "really quit".
const GRACE_MS: u64 = 2000;


/// The current interrupt situation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Interrupt
{
	None,

	/// One ^C: give up on the current attempt, try the next source.
	Soft,

	/// Two ^C's inside the grace window: unwind the whole action.
	Hard,
}


fn now_ms() -> u64
{
	let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
	unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts); }
	(ts.tv_sec as u64) * 1000 + (ts.tv_nsec as u64) / 1_000_000
}


// The classification itself, split out from the handler so it can be
// tested with fake timestamps.
fn hit(now: u64)
{
	let last = LAST_MS.swap(now, Ordering::SeqCst);
	if last != 0 && now.saturating_sub(last) <= GRACE_MS
	{ HARD.store(true, Ordering::SeqCst); }
	SOFT.store(true, Ordering::SeqCst);
}

extern "C" fn on_sigint(_sig: libc::c_int)
{
	hit(now_ms());
}


/// Install the SIGINT handler.  Call once, early.
pub(crate) fn install()
{
	unsafe
	{
		let mut sa: libc::sigaction = std::mem::zeroed();
		sa.sa_sigaction = on_sigint as usize;
		libc::sigemptyset(&mut sa.sa_mask);
		libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
	}
}


/// What's pending?  Doesn't consume anything; Hard stays hard.
pub(crate) fn check() -> Interrupt
{
	if HARD.load(Ordering::SeqCst) { return Interrupt::Hard; }
	if SOFT.load(Ordering::SeqCst) { return Interrupt::Soft; }
	Interrupt::None
}


/// Consume a pending soft interrupt.  Returns true if there was one.
/// Used after abandoning a mirror attempt so the next attempt starts
/// with a clean slate; a hard interrupt is never consumable.
pub(crate) fn take_soft() -> bool
{
	if HARD.load(Ordering::SeqCst) { return false; }
	SOFT.swap(false, Ordering::SeqCst)
}


#[cfg(test)]
fn reset()
{
	SOFT.store(false, Ordering::SeqCst);
	HARD.store(false, Ordering::SeqCst);
	LAST_MS.store(0, Ordering::SeqCst);
}



#[cfg(test)]
mod tests
{
	use super::*;

	// These all poke the same process-wide statics, so they can't run
	// in parallel with each other.
	static TESTLOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

	#[test]
	fn single_hit_is_soft()
	{
		let _g = TESTLOCK.lock().unwrap();
		reset();

		hit(10_000);
		assert_eq!(check(), Interrupt::Soft);
		assert!(take_soft());
		assert_eq!(check(), Interrupt::None);
	}

	#[test]
	fn quick_double_is_hard()
	{
		let _g = TESTLOCK.lock().unwrap();
		reset();

		hit(10_000);
		hit(10_000 + GRACE_MS);
		assert_eq!(check(), Interrupt::Hard);

		// Hard can't be consumed away.
		assert!(!take_soft());
		assert_eq!(check(), Interrupt::Hard);
	}

	#[test]
	fn slow_double_is_two_softs()
	{
		let _g = TESTLOCK.lock().unwrap();
		reset();

		hit(10_000);
		assert!(take_soft());
		hit(10_000 + GRACE_MS + 1);
		assert_eq!(check(), Interrupt::Soft);
	}
}
