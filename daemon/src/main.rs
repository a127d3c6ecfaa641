use clap::Parser;
use mcsm_daemon::app::run_app;
use mcsm_daemon::cli::DaemonArgs;

fn init_logger(filters: &str) {
    pretty_env_logger::formatted_builder()
        .parse_filters(filters)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = DaemonArgs::parse();
    init_logger(&args.log);
    run_app(args.config, args.server_dir).await
}
