//! Shell-style quoting and splitting.
//!
//! The resumable command line gets stored in the state file as a single
//! shell-safely-quoted string, so it's readable (and even pasteable) by
//! a human looking at the file.  That means we need both directions to
//! round-trip exactly.
use thiserror::Error;


/// Problems tokenizing a quoted string.
#[derive(Debug, PartialEq)]
#[derive(Error)]
pub(crate) enum QuoteErr
{
	#[error("unterminated quote in command line")]
	Unterminated,

	#[error("trailing backslash in command line")]
	TrailingBackslash,
}


// Chars that don't need any quoting.
fn is_safe(c: char) -> bool
{
	c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c)
}


/// Quote a single word for shell-safe storage.
pub(crate) fn quote(word: &str) -> String
{
	if !word.is_empty() && word.chars().all(is_safe)
	{ return word.to_string(); }

	// Single-quote it; the only thing that can't appear inside single
	// quotes is a single quote, which becomes '\''.
	let mut out = String::with_capacity(word.len() + 2);
	out.push('\'');
	for c in word.chars()
	{
		match c
		{
			'\'' => out.push_str("'\\''"),
			c => out.push(c),
		}
	}
	out.push('\'');
	out
}


/// Quote a whole argv into one line.
pub(crate) fn join(words: &[String]) -> String
{
	let qw: Vec<String> = words.iter().map(|w| quote(w)).collect();
	qw.join(" ")
}


/// Split a line back into words, shell-style: whitespace separates,
/// single quotes are literal, double quotes allow backslash escapes,
/// bare backslash escapes the next char.
pub(crate) fn split(line: &str) -> Result<Vec<String>, QuoteErr>
{
	let mut words = Vec::new();
	let mut cur = String::new();
	let mut have_word = false;
	let mut chars = line.chars();

	loop
	{
		let c = match chars.next() {
			Some(c) => c,
			None => break,
		};

		match c
		{
			c if c.is_whitespace() => {
				if have_word
				{
					words.push(std::mem::take(&mut cur));
					have_word = false;
				}
			},
			'\'' => {
				have_word = true;
				loop
				{
					match chars.next()
					{
						Some('\'') => break,
						Some(c) => cur.push(c),
						None => return Err(QuoteErr::Unterminated),
					}
				}
			},
			'"' => {
				have_word = true;
				loop
				{
					match chars.next()
					{
						Some('"') => break,
						Some('\\') => match chars.next() {
							// Inside double quotes a backslash only
							// escapes these; otherwise it's literal.
							Some(e) if "\"\\$`".contains(e) => cur.push(e),
							Some(e) => { cur.push('\\'); cur.push(e); },
							None => return Err(QuoteErr::Unterminated),
						},
						Some(c) => cur.push(c),
						None => return Err(QuoteErr::Unterminated),
					}
				}
			},
			'\\' => {
				have_word = true;
				match chars.next()
				{
					Some(e) => cur.push(e),
					None => return Err(QuoteErr::TrailingBackslash),
				}
			},
			c => {
				have_word = true;
				cur.push(c);
			},
		}
	}

	if have_word { words.push(cur); }
	Ok(words)
}



#[cfg(test)]
mod tests
{
	use super::*;

	fn rt(words: &[&str])
	{
		let v: Vec<String> = words.iter().map(|s| s.to_string()).collect();
		let line = join(&v);
		let back = split(&line).unwrap();
		assert_eq!(back, v, "round-trip of {line:?}");
	}

	#[test]
	fn roundtrips()
	{
		rt(&["download", "30"]);
		rt(&["download", "30", "--addrepo", "my repo=http://x/y?a=b&c=d"]);
		rt(&["weird", "it's", "a \"quoted\" thing", ""]);
		rt(&["tabs\tand\nnewlines", "back\\slash"]);
	}

	#[test]
	fn plain_words_stay_plain()
	{
		assert_eq!(quote("download"), "download");
		assert_eq!(quote("/var/lib/system-upgrade"), "/var/lib/system-upgrade");
		assert_eq!(quote("has space"), "'has space'");
		assert_eq!(quote(""), "''");
	}

	#[test]
	fn split_quotes()
	{
		let w = split("a 'b c' \"d \\\" e\" f\\ g").unwrap();
		assert_eq!(w, vec!["a", "b c", "d \" e", "f g"]);
	}

	#[test]
	fn split_errors()
	{
		assert_eq!(split("'oops").unwrap_err(), QuoteErr::Unterminated);
		assert_eq!(split("\"oops").unwrap_err(), QuoteErr::Unterminated);
		assert_eq!(split("oops\\").unwrap_err(), QuoteErr::TrailingBackslash);
	}
}
