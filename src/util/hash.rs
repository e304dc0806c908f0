//! Digest computation for checksum checking.
//!
//! Treeinfo checksum tables name their algorithm inline
//! (`sha256:<hex>`), so unlike a fixed-algorithm store we carry the
//! algo around with the digest.
use std::fmt;
use std::io;
use std::path::Path;

use thiserror::Error;


/// Digest algorithms we understand.  Anything else in a checksum table
/// is an error; "unverified = ok" is not a thing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum DigestAlgo
{
	Sha256,
	Sha512,
}

impl fmt::Display for DigestAlgo
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		let s = match self {
			Self::Sha256 => "sha256",
			Self::Sha512 => "sha512",
		};
		write!(f, "{s}")
	}
}

impl std::str::FromStr for DigestAlgo
{
	type Err = UnknownAlgo;

	fn from_str(s: &str) -> Result<Self, Self::Err>
	{
		match s
		{
			"sha256" => Ok(Self::Sha256),
			"sha512" => Ok(Self::Sha512),
			_ => Err(UnknownAlgo(s.to_string())),
		}
	}
}

/// Some algorithm we don't know how to compute.
#[derive(Debug)]
#[derive(Error)]
#[error("unknown digest algorithm '{0}'")]
pub(crate) struct UnknownAlgo(pub String);


impl DigestAlgo
{
	/// Expected hex digest length for this algo.
	pub(crate) fn hexlen(&self) -> usize
	{
		match self
		{
			Self::Sha256 => 64,
			Self::Sha512 => 128,
		}
	}
}


/// Hex digest of something we can read from.
pub(crate) fn hexdigest_reader<T: io::Read>(algo: DigestAlgo, rdr: &mut T)
		-> Result<String, io::Error>
{
	use sha2::{Digest, Sha256, Sha512};

	let raw: Vec<u8> = match algo {
		DigestAlgo::Sha256 => {
			let mut hasher = Sha256::new();
			io::copy(rdr, &mut hasher)?;
			hasher.finalize().to_vec()
		},
		DigestAlgo::Sha512 => {
			let mut hasher = Sha512::new();
			io::copy(rdr, &mut hasher)?;
			hasher.finalize().to_vec()
		},
	};

	let mut buf = vec![0u8; raw.len() * 2];
	let hex = base16ct::lower::encode_str(&raw, &mut buf)
			.expect("hex buffer sized exactly");
	Ok(hex.to_string())
}


/// Hex digest of a file.
pub(crate) fn hexdigest_file(algo: DigestAlgo, file: &Path)
		-> Result<String, io::Error>
{
	let mut fh = std::fs::File::open(file)?;
	hexdigest_reader(algo, &mut fh)
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn sha256_known()
	{
		let mut buf: &[u8] = b"Do, a deer, a female deer";
		let hex = hexdigest_reader(DigestAlgo::Sha256, &mut buf).unwrap();
		assert_eq!(hex,
			"762e31fc5d92b2c6d7e5a9485cab35714f5e27457e252d0126663554280099fe");
	}

	#[test]
	fn algo_parse()
	{
		let a: DigestAlgo = "sha256".parse().unwrap();
		assert_eq!(a, DigestAlgo::Sha256);
		assert_eq!(a.hexlen(), 64);

		"md5".parse::<DigestAlgo>().unwrap_err();
	}
}
