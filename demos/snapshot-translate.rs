use vmscope::{Va, arch::amd64::Amd64};

mod common;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (session, args) = common::create_vmi_session()?;
    let kernel = *session.kernel();

    for arg in args {
        let va = Va(u64::from_str_radix(arg.trim_start_matches("0x"), 16)?);

        // Walk the page tables, keeping every entry on the way.
        let translation = Amd64::translation(session.core(), kernel.paging_mode(), va, kernel.root());
        for entry in translation.entries() {
            println!(
                "  {:<4} @ {} = {:?}",
                entry.level.name(),
                entry.entry_address,
                entry.entry
            );
        }

        match translation.pa() {
            Some(pa) => println!("{va} -> {pa}"),
            None => println!("{va} -> not mapped"),
        }
    }

    session.teardown();
    Ok(())
}
