mod cli;
mod common;
mod compiler;
mod loader;

fn main() -> anyhow::Result<()> {
    cli::run()
}
