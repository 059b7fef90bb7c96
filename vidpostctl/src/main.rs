use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = vidpostctl::Cli::parse();
    let default_filter = if cli.verbose {
        "info,vidpost_core=debug"
    } else {
        "info,vidpost_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = vidpostctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
