use clap::Parser;

/// Language server for grammar files.
#[derive(Parser)]
#[command(name = "gramarye", version, about)]
struct Cli {
    /// Communicate over stdio. This is the only transport; the flag is
    /// accepted for compatibility with editor launchers that pass it.
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();
    gramarye::backend::start_lsp().await
}
