use std::{
    env,
    env::VarError,
    path::{Path, PathBuf},
};

/// What the command line asked for. The only option is the configuration file; anything else shows the help.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub config_file: Option<PathBuf>,
    pub show_help: bool,
}

pub fn parse_args<I, S>(args: I) -> CliOptions
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut options = CliOptions::default();
    let mut args = args.into_iter().map(Into::into);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => options.config_file = Some(PathBuf::from(path)),
                None => options.show_help = true,
            },
            s if s.starts_with("--config=") => options.config_file = Some(PathBuf::from(&s["--config=".len()..])),
            _ => options.show_help = true,
        }
    }
    options
}

/// Reads the process arguments, falling back to `MERCHANT_CONFIG_FILE` for the configuration file. Prints the help
/// text if the arguments were not understood.
pub fn handle_command_line_args() -> CliOptions {
    let mut options = parse_args(env::args().skip(1));
    if options.config_file.is_none() {
        options.config_file = env::var("MERCHANT_CONFIG_FILE").ok().filter(|s| !s.is_empty()).map(PathBuf::from);
    }
    if options.show_help {
        display_readme();
        display_envs();
    }
    options
}

/// Loads a dotenv-format configuration file into the environment. Variables that are already set win.
pub fn load_config_file(path: &Path) -> Result<(), String> {
    dotenvy::from_path(path).map_err(|e| format!("Could not load configuration file {}. {e}", path.display()))
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "MERCHANT_CONFIG_FILE",
        "MERCHANT_HOST",
        "MERCHANT_PORT",
        "MERCHANT_DATABASE_URL",
        "MERCHANT_DB_MAX_CONNECTIONS",
        "MERCHANT_CURRENCY",
        "MERCHANT_TRUSTED_MINTS",
        "MERCHANT_TRUSTED_AUDITORS",
        "MERCHANT_PAY_FANOUT",
        "MERCHANT_MINT_TIMEOUT",
        "MERCHANT_MINT_RETRIES",
        "MERCHANT_LOCK_SWEEP_INTERVAL",
        "MERCHANT_LONG_POLL_MAX",
        "MERCHANT_HONOUR_FORWARDED_PREFIX",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_file_forms() {
        let opts = parse_args(["--config", "/etc/merchant.env"]);
        assert_eq!(opts.config_file, Some(PathBuf::from("/etc/merchant.env")));
        assert!(!opts.show_help);
        assert_eq!(parse_args(["--config=m.env"]).config_file, Some(PathBuf::from("m.env")));
        assert!(parse_args(["--config"]).show_help);
        assert!(parse_args(["--help"]).show_help);
        assert_eq!(parse_args(Vec::<String>::new()), CliOptions::default());
    }
}
