//! Browser console logging through the `log` facade.

use log::{Level, LevelFilter};

/// Installs the console logger once; later calls only adjust the level.
pub fn init(level: LevelFilter) {
    let _ = console_log::init_with_level(Level::Trace);
    log::set_max_level(level);
}

/// Parses a level name, falling back to `info` for unknown names.
pub fn parse_level(name: &str) -> LevelFilter {
    name.trim().parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("chatty"), LevelFilter::Info);
    }
}
