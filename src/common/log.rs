//! Logging utilities
//!
//! Logger initialisation and the process-wide panic hook.

use std::backtrace::Backtrace;
use std::sync::Once;

/// Initialize the logging system
///
/// `RUST_LOG` wins over `level` when it is set. Calling this more than once is harmless.
///
/// # Parameters
///
/// * `level` - Log level
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    let _ = env_logger::Builder::from_env(env).try_init();
}

static PANIC_HOOK: Once = Once::new();

/// Route panics through the logger with a captured backtrace
///
/// The connection boundary catches the unwind itself; this hook only makes sure the
/// panic location and stack end up in the log instead of bare stderr.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let backtrace = Backtrace::force_capture();
            let thread = std::thread::current();
            log::error!(
                "##Recover Info:## thread '{}' {}\n##Recover Stack:##\n{}",
                thread.name().unwrap_or("<unnamed>"),
                info,
                backtrace
            );
        }));
    });
}

/// Extract a printable message from a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
