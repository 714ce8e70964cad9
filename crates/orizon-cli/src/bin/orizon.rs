use clap::Parser;
use orizon_cli::{Cli, Outcome};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let filter = if cli.verbose { "orizon_cli=debug,orizon_resolver=debug" } else { "orizon_cli=info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match orizon_cli::cli::run(cli).await {
        Outcome::Success => std::process::exit(0),
        Outcome::Runtime(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
        Outcome::Usage(message) => {
            eprintln!("{}", message);
            std::process::exit(2);
        }
    }
}
