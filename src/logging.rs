// 📝 Logging - tracing subscriber bootstrap

use crate::config::Settings;
use anyhow::{anyhow, Result};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Target every rendered statement is logged under
pub const SQL_TARGET: &str = "banking_app::sql";

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over `Settings::log_level` when set, except for the SQL
/// echo target, which `Settings::db_echo` always decides. Calling this twice
/// returns an error instead of panicking.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let mut filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .map_err(|e| anyhow!("invalid log filter '{}': {}", settings.log_level, e))?;

    filter = filter.add_directive(sql_echo_directive(settings.db_echo)?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("logging already initialized: {}", e))
}

/// Level for the SQL echo target: debug lets rendered statements through
fn sql_echo_directive(db_echo: bool) -> Result<Directive> {
    let level = if db_echo { "debug" } else { "info" };
    Ok(format!("{}={}", SQL_TARGET, level).parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sql_echo_follows_db_echo() {
        let on: Directive = "banking_app::sql=debug".parse().unwrap();
        let off: Directive = "banking_app::sql=info".parse().unwrap();

        assert_eq!(sql_echo_directive(true).unwrap().to_string(), on.to_string());
        assert_eq!(sql_echo_directive(false).unwrap().to_string(), off.to_string());
    }

    #[test]
    fn test_echo_off_silences_sql_under_global_debug() {
        let off = sql_echo_directive(false).unwrap().to_string();
        let filter = EnvFilter::new("debug").add_directive(sql_echo_directive(false).unwrap());
        assert!(filter.to_string().contains(&off));
    }
}
