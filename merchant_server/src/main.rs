use std::process::ExitCode;

use dotenvy::dotenv;
use log::*;
use merchant_server::{
    cli::{handle_command_line_args, load_config_file},
    config::ServerConfig,
    server::run_server,
};

#[actix_web::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();
    let options = handle_command_line_args();
    if options.show_help {
        return ExitCode::SUCCESS;
    }
    if let Some(path) = &options.config_file {
        if let Err(e) = load_config_file(path) {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }
    let config = ServerConfig::from_env_or_default();
    info!("🚀️ Starting merchant backend on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => {
            println!("Bye!");
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("💻️ Server stopped. {e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        },
    }
}
