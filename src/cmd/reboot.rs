//! `reboot`: point the bootloader at the staged upgrade and go.
use crate::boot::entry::NewKernelPkg;
use crate::cmd::Preflight;
use crate::command::CmdArg;
use crate::dirs::Dirs;
use crate::state::{Phase, State};


pub(crate) fn run(carg: CmdArg) -> Result<u8, anyhow::Error>
{
	let _lock = match crate::cmd::preflight()? {
		Preflight::Locked(l) => l,
		Preflight::Exit(c) => return Ok(c),
	};

	let dirs = Dirs::init(&carg.clargs.datadir, &carg.clargs.cachedir)?;
	let mut state = State::load(&dirs.statefile())?;

	if state.data().phase() != Phase::Ready
	{
		eprintln!("{}", state.data().summarize());
		return Ok(1);
	}

	// Ready is a promise, but rebooting into a half-missing upgrade is
	// a bad enough day that we double-check the promise.
	let me = crate::util::cmdname();
	let up = &state.data().upgrade;
	let (Some(ckernel), Some(cinitrd)) =
			(up.kernel.clone(), up.initrd.clone()) else
	{
		eprintln!("State says ready but no boot images are recorded; \
				run `{me} download` again.");
		return Ok(1);
	};
	if !ckernel.is_file() || !cinitrd.is_file()
	{
		eprintln!("The cached boot images went missing; run `{me} \
				download` again.");
		return Ok(1);
	}
	let manifest = crate::stage::read_manifest(&dirs)?;
	if manifest.is_empty()
	{
		eprintln!("The package manifest is empty; refusing to reboot \
				into that.");
		return Ok(1);
	}

	// Images into /boot first, and into state the moment they land, so
	// a crash between here and the reboot leaves a cleanable record.
	let (kernel, initrd) = crate::boot::copy_boot_images(&ckernel,
			&cinitrd)?;
	state.update(|st| {
		st.boot.name = Some(crate::boot::BOOT_NAME.to_string());
		st.boot.kernel = Some(kernel.clone());
		st.boot.initrd = Some(initrd.clone());
		Ok(())
	})?;

	crate::boot::prep_boot(&dirs, &mut NewKernelPkg, &kernel, &initrd)?;

	println!("Rebooting to start the upgrade...");
	crate::boot::reboot()?;
	Ok(0)
}
