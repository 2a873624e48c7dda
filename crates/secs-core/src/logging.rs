//! Lightweight logging bootstrapper shared by the secs binaries.

use env_logger::Env;
use log::Level;
use serde_json::json;
use std::env;
use std::io::Write;
use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

const FORMAT_ENV: &str = "SECS_LOG_FORMAT";
const LEVEL_ENV: &str = "SECS_LOG_LEVEL";

/// Initialize the global logger.
///
/// The first caller wins; subsequent calls are no-ops. If `RUST_LOG` is
/// unset, the `default_level` argument is used, overridable via
/// `SECS_LOG_LEVEL`. `SECS_LOG_FORMAT` can be set to `json` for structured
/// output; the default plain format carries the console markers: `[*]` for
/// informational lines, `[!]` for warnings and errors, and bare text at
/// debug level (where executed commands are echoed).
pub fn init(default_level: &str) {
    let _ = INIT.get_or_init(|| configure(default_level));
}

fn configure(default_level: &str) {
    let default_level = env::var(LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", &default_level);
    }

    let format = env::var(FORMAT_ENV)
        .unwrap_or_else(|_| String::from("plain"))
        .to_lowercase();

    let mut builder = env_logger::Builder::from_env(Env::default());
    if format == "json" {
        builder.format(|buf, record| {
            let ts = buf.timestamp().to_string();
            let payload = json!({
                "timestamp": ts,
                "level": record.level().to_string().to_lowercase(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", payload)
        });
    } else {
        builder.format(|buf, record| {
            let marker = match record.level() {
                Level::Error | Level::Warn => "[!] ",
                Level::Info => "[*] ",
                Level::Debug | Level::Trace => "",
            };
            writeln!(buf, "{}{}", marker, record.args())
        });
    }

    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {}", err);
    }
}
