// Process-wide trace sink (spec section 6, DESIGN NOTES "global trace/log
// state"). Reads the same two environment variables the original C client
// reads in `Log.c`: a trace toggle and a trace-level name. Installed once
// via `std::sync::Once` so `AsyncClient::create` can call this unconditionally
// without double-initializing `env_logger`.

use std::sync::Once;

static INIT: Once = Once::new();

/// `MQTT_C_CLIENT_TRACE`: any value other than unset/empty enables tracing.
const TRACE_ENV: &str = "MQTT_C_CLIENT_TRACE";
/// `MQTT_C_CLIENT_TRACE_LEVEL`: one of MINIMUM|MEDIUM|MAXIMUM|PROTOCOL|ERROR.
const TRACE_LEVEL_ENV: &str = "MQTT_C_CLIENT_TRACE_LEVEL";

fn level_from_name(name: &str) -> log::LevelFilter {
    match name.to_ascii_uppercase().as_str() {
        "ERROR" => log::LevelFilter::Error,
        "MINIMUM" => log::LevelFilter::Warn,
        "MEDIUM" => log::LevelFilter::Info,
        "PROTOCOL" => log::LevelFilter::Debug,
        "MAXIMUM" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    }
}

/// Initialize the logging sink from the environment. Safe to call more than
/// once; only the first call has any effect.
pub fn init_from_env() {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        match std::env::var(TRACE_ENV) {
            Ok(ref v) if !v.is_empty() => {
                let level = std::env::var(TRACE_LEVEL_ENV)
                    .map(|name| level_from_name(&name))
                    .unwrap_or(log::LevelFilter::Info);
                builder.filter_level(level);
            }
            _ => {
                builder.filter_level(log::LevelFilter::Off);
            }
        }
        let _ = builder.try_init();
    });
}
