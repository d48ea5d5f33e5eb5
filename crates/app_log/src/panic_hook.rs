//! Panic hook for crash reporting

use backtrace::Backtrace;
use chrono::Local;
use std::panic::PanicHookInfo;
use std::path::PathBuf;

/// Initialize the panic hook; crash reports are written to `crash_dir`
/// (falling back to the temp directory).
pub fn init_panic_hook(crash_dir: PathBuf) {
    std::panic::set_hook(Box::new(move |info| panic_handler(info, &crash_dir)));
    tracing::debug!("Panic hook initialized");
}

fn panic_payload<'a>(info: &'a PanicHookInfo) -> &'a str {
    info.payload()
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<unknown>")
}

fn panic_handler(info: &PanicHookInfo, crash_dir: &std::path::Path) {
    let backtrace = Backtrace::new();
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");
    let now = Local::now();

    let report = format!(
        "=== CRITICAL PANIC ===\n\
         Timestamp: {}\n\
         Thread: {}\n\
         Location: {:?}\n\
         Payload: {}\n\n\
         Stack Trace:\n{:?}",
        now.to_rfc3339(),
        thread_name,
        info.location(),
        panic_payload(info),
        backtrace
    );

    eprintln!("{}", report);
    tracing::error!("{}", report);

    let dump_filename = format!("iris_crash_{}.txt", now.format("%Y%m%d_%H%M%S"));
    let dump_path = if std::fs::create_dir_all(crash_dir).is_ok() {
        crash_dir.join(&dump_filename)
    } else {
        std::env::temp_dir().join(&dump_filename)
    };

    if let Err(e) = std::fs::write(&dump_path, &report) {
        eprintln!("Failed to write crash dump: {}", e);
    }
}
