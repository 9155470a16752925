//! Statement rendering and logging configuration.

use crate::sql::ComposedSql;
use std::borrow::Cow;
use tracing::Level;

/// Configuration for rendering and logging statements.
///
/// Attach to a statement with `with_config`. Joined statements and subqueries render with the
/// configuration of the statement being composed.
#[derive(Debug, Clone)]
pub struct SqlConfig {
    /// Prefix of generated table aliases (`t0`, `t1`, ...).
    pub alias_prefix: Cow<'static, str>,
    /// Quote every table and column identifier.
    pub quote_identifiers: bool,
    /// Tracing level of the `pgfluent.sql` execution event.
    pub log_level: Level,
    /// Truncate logged SQL (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            alias_prefix: Cow::Borrowed("t"),
            quote_identifiers: false,
            log_level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl SqlConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prefix of generated table aliases.
    pub fn with_alias_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    /// Quote every identifier (`"person"."name"`).
    pub fn with_quoted_identifiers(mut self) -> Self {
        self.quote_identifiers = true;
        self
    }

    /// Override the tracing event level.
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// Set maximum SQL length to log.
    pub fn with_max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation in logs.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn truncate_sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match self.max_sql_length {
            Some(max) if sql.len() > max => {
                Cow::Owned(format!("{}...", truncate_sql_bytes(sql, max)))
            }
            _ => Cow::Borrowed(sql),
        }
    }

    /// Emit the `pgfluent.sql` event for a statement about to be executed.
    pub(crate) fn log_sql(&self, operation: &'static str, composed: &ComposedSql) {
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(composed.sql());
        emit_at_level!(
            self.log_level,
            target: "pgfluent.sql",
            operation,
            param_count = composed.binders().len(),
            sql = %sql,
        );
    }
}

fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
