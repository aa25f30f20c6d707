//! Tracing setup
//!
//! Installs a `tracing-subscriber` formatter once per process. `RUST_LOG`
//! wins when set; otherwise debug builds log at `debug` and release builds at
//! `info`.

use std::panic;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Initialise the global subscriber and panic hook (idempotent)
pub fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                // reqwest/hyper connection chatter is not useful at debug.
                EnvFilter::new("debug,hyper=info,hyper_util=info,reqwest=info,rustls=info")
            } else {
                EnvFilter::new("info")
            }
        });
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
        install_panic_hook();
    });
}

fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Box<Any>"
        };
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        tracing::error!(%location, "panic: {message}");
        default_hook(info);
    }));
}
