use clap::Parser;
use mailfind_cli::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(err) = mailfind_cli::run(args).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
