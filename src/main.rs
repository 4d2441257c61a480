use anyhow::Result;
use clap::Parser;
use luadrv::cli::{self, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("luadrv: error: {e:#}");
            std::process::exit(2);
        }
    };

    // CLI --log-level takes highest precedence, then RUST_LOG, then config.
    luadrv::debug::init_log_bridge(cli.log_level, config.log_level);
    log::info!(
        "Starting {} (class {})",
        config.device_name,
        config.class_name
    );

    let code = cli::run(&cli, &config)?;
    log::logger().flush();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
