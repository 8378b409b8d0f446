//! Maintainer diagnostics, off unless `UCW_LOG` holds an env_logger filter.
//! Records are appended to `UCW_LOG_FILE` (`/tmp/ucw.log` by default) and
//! never written to the build's stderr.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Once;

use env_logger::{Builder, Target};

use crate::config::Config;

/// Installs the logger the first time it is called.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // a broken log file only disables diagnostics
        let _ = try_init(Config::get());
    });
}

fn try_init(config: &Config) -> io::Result<bool> {
    let Some(filter) = config.log_filter.as_deref() else {
        return Ok(false);
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    builder(filter, file)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(true)
}

fn builder<W: Write + Send + 'static>(filter: &str, out: W) -> Builder {
    let mut builder = Builder::new();
    builder
        .parse_filters(filter)
        .target(Target::Pipe(Box::new(out)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} -- {} {}: {}",
                std::process::id(),
                record.level(),
                record.target(),
                record.args()
            )
        });
    builder
}
