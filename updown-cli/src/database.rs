//! Opening a history store from a database URL.

use updown::HistoryStore;

/// Which backend a database URL points at.
#[derive(Debug, PartialEq, Eq)]
pub enum Backend<'a> {
    /// A file path, or `:memory:`.
    Sqlite(&'a str),
    /// The full `mysql://` URL.
    Mysql(&'a str),
}

impl Backend<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite(_) => "sqlite",
            Backend::Mysql(_) => "mysql",
        }
    }
}

/// Accepts `sqlite://<path>`, `sqlite:<path>`, `mysql://...`, or a bare file path (SQLite).
pub fn parse_url(url: &str) -> Result<Backend<'_>, String> {
    let url = url.trim();
    if url.starts_with("mysql://") {
        return Ok(Backend::Mysql(url));
    }
    if let Some(rest) = url.strip_prefix("sqlite:") {
        let path = rest.strip_prefix("//").unwrap_or(rest);
        if path.is_empty() {
            return Err(format!("Database URL '{}' has no path", url));
        }
        return Ok(Backend::Sqlite(path));
    }
    if let Some((scheme, _)) = url.split_once("://") {
        return Err(format!(
            "Unsupported database scheme '{}'. Use sqlite:// or mysql://",
            scheme
        ));
    }
    if url.is_empty() {
        return Err("Database URL is empty".to_string());
    }
    Ok(Backend::Sqlite(url))
}

pub fn connect(
    url: &str,
    table: &str,
) -> Result<Box<dyn HistoryStore>, Box<dyn std::error::Error>> {
    match parse_url(url)? {
        #[cfg(feature = "sqlite")]
        Backend::Sqlite(path) => {
            let history = updown::sqlite::SqliteHistory::open(path)?.with_history_table(table);
            Ok(Box::new(history))
        }
        #[cfg(feature = "mysql")]
        Backend::Mysql(url) => {
            let history = updown::mysql::MysqlHistory::connect(url)?.with_history_table(table);
            Ok(Box::new(history))
        }
        #[allow(unreachable_patterns)]
        backend => Err(format!(
            "This build of updown has no {name} support. Rebuild with the `{name}` feature",
            name = backend.name()
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_urls() {
        assert_eq!(parse_url("sqlite://app.db"), Ok(Backend::Sqlite("app.db")));
        assert_eq!(
            parse_url("sqlite:///var/lib/app.db"),
            Ok(Backend::Sqlite("/var/lib/app.db"))
        );
        assert_eq!(parse_url("sqlite::memory:"), Ok(Backend::Sqlite(":memory:")));
        assert_eq!(parse_url("data/app.db"), Ok(Backend::Sqlite("data/app.db")));
    }

    #[test]
    fn parses_mysql_urls() {
        assert_eq!(
            parse_url("mysql://root:pw@localhost:3306/app"),
            Ok(Backend::Mysql("mysql://root:pw@localhost:3306/app"))
        );
    }

    #[test]
    fn rejects_unknown_schemes_and_empty_urls() {
        assert!(parse_url("postgres://localhost/app").is_err());
        assert!(parse_url("sqlite://").is_err());
        assert!(parse_url("  ").is_err());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn connect_opens_sqlite_with_custom_table() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("app.db").display());
        let mut db = connect(&url, "history").unwrap();
        assert_eq!(db.table(), "history");
        assert!(db.bootstrap().unwrap());
    }
}
