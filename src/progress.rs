//! Progress reporting for the long-running bits.
//!
//! Downloads and staging both want a bar on the console; the engine's
//! own download output is line-based, so we translate its counters
//! into an indicatif bar rather than let two things fight over the
//! terminal.
use indicatif::{ProgressBar, ProgressStyle};


/// Bar for a byte-counted transfer (boot images and the like).
pub(crate) fn bytes_bar(total: u64, what: &str) -> ProgressBar
{
	let pb = ProgressBar::new(total);
	pb.set_style(ProgressStyle::with_template(
			"{msg}  {bytes}/{total_bytes} {wide_bar} {eta}")
			.unwrap().progress_chars("=> "));
	pb.set_message(what.to_string());
	pb
}


/// Bar for an item-counted pass (packages downloaded, files staged).
pub(crate) fn count_bar(total: u64, what: &str) -> ProgressBar
{
	let pb = ProgressBar::new(total);
	pb.set_style(ProgressStyle::with_template(
			"{msg}  {pos}/{len} {wide_bar} {eta}")
			.unwrap().progress_chars("=> "));
	pb.set_message(what.to_string());
	pb
}


/// Spinner for a step with no useful count (resolving deps, running a
/// transaction test).
pub(crate) fn spinner(what: &str) -> ProgressBar
{
	let pb = ProgressBar::new_spinner();
	pb.set_message(what.to_string());
	pb.enable_steady_tick(std::time::Duration::from_millis(120));
	pb
}
