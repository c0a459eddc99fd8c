fn main() -> anyhow::Result<()> {
    brisk::cli::run_cli()
}
