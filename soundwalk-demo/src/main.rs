mod cli;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::DemoArgs::parse(std::env::args().skip(1))?;
    if args.offline {
        cli::run_offline(args)
    } else {
        cli::run_device(args)
    }
}
