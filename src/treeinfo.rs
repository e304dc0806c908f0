//! Parsing of the install tree's .treeinfo metadata.
//!
//! A release tree publishes a little INI file describing itself: what
//! release and arch it is, where the boot images live relative to the
//! tree root, and checksums for the lot.  We need just enough of it to
//! find and verify a kernel and upgrade initramfs.
use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::util::hash::{self, DigestAlgo};


/// Problems with a treeinfo file.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum TreeinfoErr
{
	#[error("treeinfo line {0} is not a key=value or [section]")]
	Malformed(usize),

	#[error("treeinfo is missing [{sect}] {key}")]
	MissingKey
	{
		sect: String,
		key: &'static str,
	},

	#[error("treeinfo has no checksum for {0}")]
	NoChecksum(String),

	#[error("treeinfo checksum for {path} isn't algo:hexdigest: {val}")]
	BadChecksum
	{
		path: String,
		val: String,
	},

	#[error("treeinfo checksum for {0}: {1}")]
	BadAlgo(String, hash::UnknownAlgo),

	#[error("reading {0}: {1}")]
	IO(String, #[source] std::io::Error),
}

use TreeinfoErr as TIE;


/// A parsed treeinfo: sections of key/value pairs.  Section and key
/// lookups are case-sensitive; the files are machine-generated, so
/// that's what's in them.  Kept sorted so a save/reload cycle is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub(crate) struct Treeinfo
{
	sections: BTreeMap<String, BTreeMap<String, String>>,
}


impl Treeinfo
{
	/// Parse treeinfo contents.
	pub(crate) fn parse(data: &str) -> Result<Self, TreeinfoErr>
	{
		let mut sections: BTreeMap<String, BTreeMap<String, String>>
				= BTreeMap::new();
		let mut cur: Option<String> = None;

		for (ln, line) in data.lines().enumerate()
		{
			let line = line.trim();
			if line.is_empty() || line.starts_with('#')
					|| line.starts_with(';')
			{ continue; }

			if let Some(sect) = line.strip_prefix('[')
					.and_then(|l| l.strip_suffix(']'))
			{
				let sect = sect.trim().to_string();
				sections.entry(sect.clone()).or_default();
				cur = Some(sect);
				continue;
			}

			let (key, val) = line.split_once('=')
					.ok_or(TIE::Malformed(ln + 1))?;
			let sect = cur.as_ref().ok_or(TIE::Malformed(ln + 1))?;
			sections.get_mut(sect).unwrap()
					.insert(key.trim().to_string(), val.trim().to_string());
		}

		Ok(Treeinfo { sections })
	}

	/// Look up a key in a section.
	pub(crate) fn get(&self, sect: &str, key: &str) -> Option<&str>
	{
		self.sections.get(sect)?.get(key).map(|s| s.as_str())
	}

	// Like get(), but absence is an error.
	fn require(&self, sect: &str, key: &'static str)
			-> Result<&str, TreeinfoErr>
	{
		self.get(sect, key).ok_or_else(|| TIE::MissingKey {
			sect: sect.to_string(), key,
		})
	}


	/// The tree's release version, from [general].
	pub(crate) fn version(&self) -> Result<&str, TreeinfoErr>
	{ self.require("general", "version") }

	/// The tree's architecture, from [general].
	pub(crate) fn arch(&self) -> Result<&str, TreeinfoErr>
	{ self.require("general", "arch") }


	/// Tree-relative path of a boot image for an arch.  The image types
	/// we care about are "kernel" and "upgrade" (the upgrade initramfs).
	pub(crate) fn image(&self, arch: &str, img: &'static str)
			-> Result<&str, TreeinfoErr>
	{
		self.require(&format!("images-{arch}"), img)
	}


	/// The expected (algo, hexdigest) for a tree-relative path.  Having
	/// no checksum for an image we're about to boot is a hard error, not
	/// a shrug.
	pub(crate) fn checksum(&self, relpath: &str)
			-> Result<(DigestAlgo, &str), TreeinfoErr>
	{
		let val = self.get("checksums", relpath)
				.ok_or_else(|| TIE::NoChecksum(relpath.to_string()))?;
		let (algo, hex) = val.split_once(':')
				.ok_or_else(|| TIE::BadChecksum {
					path: relpath.to_string(), val: val.to_string(),
				})?;
		let algo: DigestAlgo = algo.parse()
				.map_err(|e| TIE::BadAlgo(relpath.to_string(), e))?;
		if hex.len() != algo.hexlen()
		{
			return Err(TIE::BadChecksum {
				path: relpath.to_string(), val: val.to_string(),
			});
		}
		Ok((algo, hex))
	}


	/// Verify a local file against the tree's checksum for relpath.
	/// Ok(false) is "downloaded bytes don't match", which the caller
	/// treats as retryable; errors are for structural problems like the
	/// checksum not being listed at all.
	pub(crate) fn checkfile(&self, file: &Path, relpath: &str)
			-> Result<bool, TreeinfoErr>
	{
		let (algo, want) = self.checksum(relpath)?;
		let got = hash::hexdigest_file(algo, file)
				.map_err(|e| TIE::IO(file.display().to_string(), e))?;
		Ok(got == want)
	}


	// Write side.  We only ever write treeinfo ourselves for tests and
	// local media layouts, but whatever we write has to read back the
	// same.

	/// Set a key in a section, creating the section if needed.
	#[allow(dead_code)]
	pub(crate) fn set(&mut self, sect: &str, key: &str, val: &str)
	{
		self.sections.entry(sect.to_string()).or_default()
				.insert(key.to_string(), val.to_string());
	}

	/// Record an image reference for an arch.
	#[allow(dead_code)]
	pub(crate) fn add_image(&mut self, arch: &str, img: &str, relpath: &str)
	{
		self.set(&format!("images-{arch}"), img, relpath);
	}

	/// Record a checksum for a tree-relative path.
	#[allow(dead_code)]
	pub(crate) fn add_checksum(&mut self, relpath: &str, algo: DigestAlgo,
			hex: &str)
	{
		self.set("checksums", relpath, &format!("{algo}:{hex}"));
	}

	/// Render back out in the same INI shape we parse.
	#[allow(dead_code)]
	pub(crate) fn render(&self) -> String
	{
		let mut out = String::new();
		for (sect, kvs) in &self.sections
		{
			out.push_str(&format!("[{sect}]\n"));
			for (k, v) in kvs
			{ out.push_str(&format!("{k} = {v}\n")); }
			out.push('\n');
		}
		out
	}
}



#[cfg(test)]
mod tests
{
	use super::*;
	use std::io::Write;

	const TI: &str = r#"
[general]
name = Fedora-40
version = 40
arch = x86_64

[images-x86_64]
kernel = images/pxeboot/vmlinuz
upgrade = images/pxeboot/upgrade.img

[checksums]
images/pxeboot/vmlinuz = sha256:762e31fc5d92b2c6d7e5a9485cab35714f5e27457e252d0126663554280099fe
images/pxeboot/upgrade.img = md5:abcdef
"#;

	#[test]
	fn parse_and_lookup()
	{
		let ti = Treeinfo::parse(TI).unwrap();
		assert_eq!(ti.version().unwrap(), "40");
		assert_eq!(ti.arch().unwrap(), "x86_64");
		assert_eq!(ti.image("x86_64", "kernel").unwrap(),
				"images/pxeboot/vmlinuz");
		assert_eq!(ti.image("x86_64", "upgrade").unwrap(),
				"images/pxeboot/upgrade.img");

		let (algo, hex) = ti.checksum("images/pxeboot/vmlinuz").unwrap();
		assert_eq!(algo, DigestAlgo::Sha256);
		assert!(hex.starts_with("762e31fc"));
	}

	#[test]
	fn missing_bits()
	{
		let ti = Treeinfo::parse("[general]\nname = x\n").unwrap();
		match ti.version().unwrap_err() {
			TIE::MissingKey { key: "version", .. } => (),
			e => panic!("wrong error {e}"),
		}
		match ti.image("x86_64", "kernel").unwrap_err() {
			TIE::MissingKey { key: "kernel", .. } => (),
			e => panic!("wrong error {e}"),
		}
		match ti.checksum("images/whatever").unwrap_err() {
			TIE::NoChecksum(_) => (),
			e => panic!("wrong error {e}"),
		}
	}

	#[test]
	fn bad_checksums()
	{
		let ti = Treeinfo::parse(TI).unwrap();
		// md5 isn't an algo we accept
		match ti.checksum("images/pxeboot/upgrade.img").unwrap_err() {
			TIE::BadAlgo(..) => (),
			e => panic!("wrong error {e}"),
		}
	}

	#[test]
	fn malformed()
	{
		match Treeinfo::parse("keyval without section\n").unwrap_err() {
			TIE::Malformed(1) => (),
			e => panic!("wrong error {e}"),
		}
	}

	#[test]
	fn write_reads_back()
	{
		let mut ti = Treeinfo::default();
		ti.set("general", "version", "41");
		ti.set("general", "arch", "aarch64");
		ti.add_image("aarch64", "kernel", "images/pxeboot/vmlinuz");
		ti.add_checksum("images/pxeboot/vmlinuz", DigestAlgo::Sha512,
				&"ab".repeat(64));

		let ti2 = Treeinfo::parse(&ti.render()).unwrap();
		assert_eq!(ti2.version().unwrap(), "41");
		assert_eq!(ti2.arch().unwrap(), "aarch64");
		assert_eq!(ti2.image("aarch64", "kernel").unwrap(),
				"images/pxeboot/vmlinuz");
		let (algo, hex) = ti2.checksum("images/pxeboot/vmlinuz").unwrap();
		assert_eq!(algo, DigestAlgo::Sha512);
		assert_eq!(hex, "ab".repeat(64));
	}

	#[test]
	fn checkfile_match_and_mismatch()
	{
		let ti = Treeinfo::parse(TI).unwrap();
		let td = tempfile::tempdir().unwrap();
		let f = td.path().join("vmlinuz");

		// Content whose sha256 matches the treeinfo above
		let mut fh = std::fs::File::create(&f).unwrap();
		fh.write_all(b"Do, a deer, a female deer").unwrap();
		drop(fh);
		assert!(ti.checkfile(&f, "images/pxeboot/vmlinuz").unwrap());

		std::fs::write(&f, b"Re, a drop of golden sun").unwrap();
		assert!(!ti.checkfile(&f, "images/pxeboot/vmlinuz").unwrap());
	}
}
