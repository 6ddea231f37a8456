mod common;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (session, _) = common::create_vmi_session()?;

    let kernel = session.kernel();
    println!("Paging mode: {:?}", kernel.paging_mode());
    println!("Kernel root: {}", kernel.root());

    // The initial task is a good sanity check: its first field is a
    // small integer on every kernel version.
    if let Some(entry_point) = kernel.entry_point() {
        match session.read_u64_va(entry_point) {
            Ok(value) => println!("init_task @ {entry_point}: 0x{value:016x}"),
            Err(err) => println!("init_task @ {entry_point}: {err}"),
        }
    }

    session.teardown();
    Ok(())
}
