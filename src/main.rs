use ncc::driver;

fn main() -> anyhow::Result<()> {
    driver::run()?;

    Ok(())
}
