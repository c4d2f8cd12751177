//! Logging setup.
//!
//! Console output everywhere; the `run` command additionally mirrors every event
//! into the session's `workflow.log` so each run folder keeps a full record.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Writer handing out clones of one shared log file.
#[derive(Clone)]
struct SharedFile(Arc<File>);

impl io::Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Console-only subscriber, used by the `plot` command.
pub fn init_console() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(env_filter())
        .init();
}

/// Console plus file subscriber, used by the `run` command once the session log
/// folder exists. Returns an error only when the log file cannot be created.
pub fn init_with_file(path: &Path) -> io::Result<()> {
    let file = SharedFile(Arc::new(File::create(path)?));
    let make_writer = move || file.clone();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(make_writer),
        )
        .init();
    Ok(())
}
