use clap::Parser;
use keyrelay::config::{Cli, Command};
use keyrelay::{admin, server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut stdout = std::io::stdout();
    match &cli.command {
        Command::Serve(args) => server::serve(&cli, args).await,
        Command::Superusers => admin::superusers(&cli, &mut stdout).await,
        Command::Issue(args) => admin::issue(&cli, args, &mut stdout).await,
        Command::Revoke(args) => admin::revoke(&cli, args, &mut stdout).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,tower_http=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
