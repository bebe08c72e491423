use anyhow::Result;

fn main() -> Result<()> {
    curricula::cli::run()?;
    Ok(())
}
