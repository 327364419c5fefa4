//! File-logging bootstrap.
//!
//! Initialization is idempotent: the first successful call wins and later
//! calls are no-ops. The library itself only uses the `log` facade; hosts
//! that bring their own logger simply skip this.

use flexi_logger::{FileSpec, FlexiLoggerError, Logger, LoggerHandle, WriteMode};
use once_cell::sync::OnceCell;
use std::path::Path;

static LOGGER: OnceCell<LoggerHandle> = OnceCell::new();

/// Starts rolling file logging in `dir`. Level comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init_logging(dir: impl AsRef<Path>) -> Result<(), FlexiLoggerError> {
    let dir = dir.as_ref().to_path_buf();
    LOGGER
        .get_or_try_init(|| {
            Logger::try_with_env_or_str("info")?
                .log_to_file(FileSpec::default().directory(dir).basename("tipboard"))
                .write_mode(WriteMode::BufferAndFlush)
                .start()
        })
        .map(|_| ())
}

/// Whether logging has been initialized by this crate. Hosts that bring
/// their own logger check this before touching the handle.
pub fn logging_started() -> bool {
    LOGGER.get().is_some()
}
