//! Logging setup for the `stackvm` CLI. The library itself never
//! configures a logger — it only emits through the `log` facade — so
//! this module is used exclusively by `src/bin/stackvm.rs`.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Initialise a console logger at the given level. Safe to call more
/// than once; repeat calls after the first are no-ops.
pub fn init(level: LevelFilter) {
    let encoder = PatternEncoder::new("[{l}] {m}{n}");
    let stdout = ConsoleAppender::builder().encoder(Box::new(encoder)).build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .unwrap();
    let _ = log4rs::init_config(config);
}
