use vmscope::{
    VmiSession,
    arch::amd64::Amd64,
    driver::snapshot::VmiSnapshotDriver,
    os::linux::{LinuxConfig, LinuxOs, SystemMap},
};

pub type Session = VmiSession<VmiSnapshotDriver<Amd64>, LinuxOs<VmiSnapshotDriver<Amd64>>>;

/// Opens a snapshot and locates the kernel.
///
/// Usage: `<memory.raw> <System.map> [cr3]`. The remaining arguments are
/// returned to the caller.
pub fn create_vmi_session() -> Result<(Session, Vec<String>), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(image), Some(system_map)) = (args.next(), args.next()) else {
        return Err("usage: <memory.raw> <System.map> [cr3=<hex>] [args...]".into());
    };

    let mut rest = Vec::new();
    let mut cr3 = None;
    for arg in args {
        match arg.strip_prefix("cr3=") {
            Some(value) => cr3 = Some(u64::from_str_radix(value.trim_start_matches("0x"), 16)?),
            None => rest.push(arg),
        }
    }

    // Setup VMI.
    let mut driver = VmiSnapshotDriver::<Amd64>::new(&image)?;
    if let Some(cr3) = cr3 {
        driver = driver.with_root_register(cr3);
    }

    tracing::debug!(%image, size = driver.size(), ?cr3);

    let symbols = SystemMap::from_file(&system_map)?;
    let os = LinuxOs::with_config(symbols, LinuxConfig::default());

    tracing::info!("Creating VMI session");
    let session = VmiSession::init(driver, os)?;

    Ok((session, rest))
}
