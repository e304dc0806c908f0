//! Retry-with-alternate-sources policy.
//!
//! Both the boot-image fetch and the treeinfo fetch want the same
//! shape: a list of mirrors, try each in turn, a per-attempt validation
//! that can say "this one's no good, next please", and a bounded total
//! attempt count.  Rather than growing two slightly-different inline
//! loops, it's one policy here.
use thiserror::Error;


/// What an individual attempt can report back.
#[derive(Debug)]
pub(crate) enum Attempt
{
	/// Didn't work out (bad checksum, transport error, ...); worth
	/// trying the next source.
	Retry(anyhow::Error),

	/// Don't bother with further sources; unwind now.  Used for things
	/// like a hard user cancel, where hammering more mirrors would just
	/// be rude.
	Fatal(anyhow::Error),
}


/// How the whole policy can fail.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum RetryErr
{
	/// No sources at all were supplied.
	#[error("no sources to try")]
	NoSources,

	/// Every attempt failed; the last underlying error is kept for
	/// diagnostics.
	#[error("all {attempts} attempts failed; last error: {last}")]
	Exhausted
	{
		attempts: usize,
		last: anyhow::Error,
	},

	/// An attempt said to stop immediately.
	#[error(transparent)]
	Fatal(anyhow::Error),
}


/// Run an operation against a list of alternate sources, bounded to
/// max_attempts total tries.  First success wins.
pub(crate) fn with_alternates<S, R>(sources: &[S], max_attempts: usize,
		mut f: impl FnMut(&S) -> Result<R, Attempt>)
		-> Result<R, RetryErr>
{
	if sources.is_empty() { return Err(RetryErr::NoSources); }

	let mut last: Option<anyhow::Error> = None;
	let mut attempts = 0;

	for src in sources.iter().cycle().take(max_attempts)
	{
		attempts += 1;
		match f(src)
		{
			Ok(r) => return Ok(r),
			Err(Attempt::Retry(e)) => {
				tracing::info!("attempt {attempts} failed: {e}");
				last = Some(e);
			},
			Err(Attempt::Fatal(e)) => return Err(RetryErr::Fatal(e)),
		}
	}

	// last is always Some here; attempts >= 1 since sources is nonempty
	// and max_attempts of 0 would be a silly caller.
	let last = last.unwrap_or_else(|| anyhow::anyhow!("no attempts made"));
	Err(RetryErr::Exhausted { attempts, last })
}



#[cfg(test)]
mod tests
{
	use super::*;
	use anyhow::anyhow;

	#[test]
	fn first_success_wins()
	{
		let srcs = ["a", "b", "c"];
		let mut tried = Vec::new();
		let r = with_alternates(&srcs, 6, |s| {
			tried.push(*s);
			match *s {
				"b" => Ok(42),
				_ => Err(Attempt::Retry(anyhow!("nope"))),
			}
		}).unwrap();
		assert_eq!(r, 42);
		assert_eq!(tried, vec!["a", "b"]);
	}

	#[test]
	fn exhaustion_keeps_last_error()
	{
		let srcs = ["a", "b"];
		let mut n = 0;
		let e = with_alternates::<_, ()>(&srcs, 4, |_| {
			n += 1;
			Err(Attempt::Retry(anyhow!("fail {n}")))
		}).unwrap_err();

		match e
		{
			RetryErr::Exhausted { attempts, last } => {
				assert_eq!(attempts, 4);
				assert_eq!(last.to_string(), "fail 4");
			},
			e => panic!("wrong error {e:?}"),
		}
	}

	#[test]
	fn fatal_stops_early()
	{
		let srcs = ["a", "b", "c"];
		let mut n = 0;
		let e = with_alternates::<_, ()>(&srcs, 9, |_| {
			n += 1;
			Err(Attempt::Fatal(anyhow!("stop")))
		}).unwrap_err();
		assert_eq!(n, 1);
		match e {
			RetryErr::Fatal(_) => (),
			e => panic!("wrong error {e:?}"),
		}
	}

	#[test]
	fn no_sources()
	{
		let srcs: [&str; 0] = [];
		let e = with_alternates::<_, ()>(&srcs, 3, |_| Ok(())).unwrap_err();
		match e {
			RetryErr::NoSources => (),
			e => panic!("wrong error {e:?}"),
		}
	}
}
