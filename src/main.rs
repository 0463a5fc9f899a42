use anyhow::Result;

fn main() -> Result<()> {
    destination_search::cli::cli()
}
