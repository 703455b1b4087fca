//! Translation of a declarative dialect configuration into concrete parser
//! and renderer settings.
//!
//! Every field left unset inherits from the named base dialect. Base
//! dialects are an explicit table, so an unknown name fails right here
//! instead of surfacing later as a confusing parse error.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, Statement};
use sqlparser::dialect::{
    AnsiDialect, BigQueryDialect, ClickHouseDialect, Dialect, DuckDbDialect, GenericDialect,
    HiveDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect, SnowflakeDialect,
};
use sqlparser::parser::{Parser, ParserError, ParserOptions};
use sqlparser::tokenizer::Token;

use crate::error::{SqlError, SqlResult};

const DEFAULT_RECURSION_LIMIT: usize = 50;

// ── Declarative config ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DialectConfig {
    #[serde(default = "default_base_dialect")]
    pub base_dialect: String,
    /// Parser grammar override, by name (`mysql`, `postgresql`, ...).
    #[serde(default)]
    pub grammar: Option<String>,
    /// `default` or `lenient` (accepts trailing commas).
    #[serde(default)]
    pub conformance: Option<String>,
    #[serde(default)]
    pub identifier_quote: Option<char>,
    #[serde(default)]
    pub literal_quote: Option<char>,
    #[serde(default)]
    pub unquoted_casing: Option<Casing>,
    #[serde(default)]
    pub trailing_commas: Option<bool>,
    #[serde(default)]
    pub unescape: Option<bool>,
    #[serde(default)]
    pub recursion_limit: Option<usize>,
}

fn default_base_dialect() -> String {
    "ansi".to_string()
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::base(default_base_dialect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Casing {
    Unchanged,
    ToUpper,
    ToLower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conformance {
    Default,
    Lenient,
}

impl Conformance {
    fn from_name(name: &str) -> SqlResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Ok(Conformance::Default),
            "lenient" => Ok(Conformance::Lenient),
            _ => Err(SqlError::UnknownConformance(name.to_string())),
        }
    }
}

// ── Grammars ─────────────────────────────────────────────────────────

/// Concrete parser grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Generic,
    Ansi,
    PostgreSql,
    MySql,
    BigQuery,
    MsSql,
    Snowflake,
    SQLite,
    Hive,
    DuckDb,
    ClickHouse,
}

impl Grammar {
    pub fn from_name(name: &str) -> SqlResult<Self> {
        let grammar = match name.to_ascii_lowercase().as_str() {
            "generic" => Grammar::Generic,
            "ansi" => Grammar::Ansi,
            "postgresql" | "postgres" => Grammar::PostgreSql,
            "mysql" => Grammar::MySql,
            "bigquery" => Grammar::BigQuery,
            "mssql" => Grammar::MsSql,
            "snowflake" => Grammar::Snowflake,
            "sqlite" => Grammar::SQLite,
            "hive" => Grammar::Hive,
            "duckdb" => Grammar::DuckDb,
            "clickhouse" => Grammar::ClickHouse,
            _ => return Err(SqlError::UnknownGrammar(name.to_string())),
        };
        Ok(grammar)
    }

    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            Grammar::Generic => Box::new(GenericDialect {}),
            Grammar::Ansi => Box::new(AnsiDialect {}),
            Grammar::PostgreSql => Box::new(PostgreSqlDialect {}),
            Grammar::MySql => Box::new(MySqlDialect {}),
            Grammar::BigQuery => Box::new(BigQueryDialect {}),
            Grammar::MsSql => Box::new(MsSqlDialect {}),
            Grammar::Snowflake => Box::new(SnowflakeDialect {}),
            Grammar::SQLite => Box::new(SQLiteDialect {}),
            Grammar::Hive => Box::new(HiveDialect {}),
            Grammar::DuckDb => Box::new(DuckDbDialect {}),
            Grammar::ClickHouse => Box::new(ClickHouseDialect {}),
        }
    }
}

// ── Base dialect table ───────────────────────────────────────────────

struct BaseDialect {
    grammar: Grammar,
    identifier_quote: char,
    literal_quote: char,
    unquoted_casing: Casing,
}

pub const KNOWN_BASE_DIALECTS: &[&str] = &[
    "ansi",
    "generic",
    "postgresql",
    "mysql",
    "bigquery",
    "mssql",
    "snowflake",
    "sqlite",
    "hive",
    "duckdb",
    "clickhouse",
    "pinot",
];

fn base_dialect(name: &str) -> Option<BaseDialect> {
    let base = |grammar, identifier_quote, unquoted_casing| BaseDialect {
        grammar,
        identifier_quote,
        literal_quote: '\'',
        unquoted_casing,
    };
    let found = match name.to_ascii_lowercase().as_str() {
        // The ANSI lexer rejects identifiers starting with `_`, which every
        // macro name does, so ANSI text goes through the generic grammar.
        "ansi" => base(Grammar::Generic, '"', Casing::Unchanged),
        "generic" => base(Grammar::Generic, '"', Casing::Unchanged),
        "postgresql" | "postgres" => base(Grammar::PostgreSql, '"', Casing::ToLower),
        "mysql" => base(Grammar::MySql, '`', Casing::Unchanged),
        "bigquery" => base(Grammar::BigQuery, '`', Casing::Unchanged),
        "mssql" => base(Grammar::MsSql, '[', Casing::Unchanged),
        "snowflake" => base(Grammar::Snowflake, '"', Casing::ToUpper),
        "sqlite" => base(Grammar::SQLite, '"', Casing::Unchanged),
        "hive" => base(Grammar::Hive, '`', Casing::Unchanged),
        "duckdb" => base(Grammar::DuckDb, '"', Casing::Unchanged),
        "clickhouse" => base(Grammar::ClickHouse, '"', Casing::Unchanged),
        "pinot" => base(Grammar::Generic, '"', Casing::Unchanged),
        _ => return None,
    };
    Some(found)
}

// ── Concrete settings ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserSettings {
    pub grammar: Grammar,
    pub trailing_commas: bool,
    pub unescape: bool,
    pub recursion_limit: usize,
}

impl ParserSettings {
    fn parser<'d>(&self, dialect: &'d dyn Dialect, sql: &str) -> Result<Parser<'d>, ParserError> {
        let options = ParserOptions::new()
            .with_trailing_commas(self.trailing_commas)
            .with_unescape(self.unescape);
        Parser::new(dialect)
            .with_recursion_limit(self.recursion_limit)
            .with_options(options)
            .try_with_sql(sql)
    }

    pub fn parse_statements(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        let dialect = self.grammar.dialect();
        let mut parser = self.parser(dialect.as_ref(), sql)?;
        Ok(parser.parse_statements()?)
    }

    /// Parse text that must hold exactly one statement.
    pub fn parse_statement(&self, sql: &str) -> SqlResult<Statement> {
        let mut statements = self.parse_statements(sql)?;
        if statements.len() != 1 {
            return Err(SqlError::UnsupportedQueryShape(format!(
                "expected exactly one statement, found {}",
                statements.len()
            )));
        }
        Ok(statements.remove(0))
    }

    /// Parse a standalone expression; trailing tokens are an error.
    pub fn parse_expr(&self, sql: &str) -> Result<Expr, ParserError> {
        let dialect = self.grammar.dialect();
        let mut parser = self.parser(dialect.as_ref(), sql)?;
        let expr = parser.parse_expr()?;
        let next = parser.peek_token();
        if next.token != Token::EOF {
            return Err(ParserError::ParserError(format!(
                "unexpected '{}' after expression",
                next.token
            )));
        }
        Ok(expr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub identifier_quote: char,
    pub literal_quote: char,
    pub unquoted_casing: Casing,
}

impl RenderSettings {
    fn closing_identifier_quote(&self) -> char {
        match self.identifier_quote {
            '[' => ']',
            q => q,
        }
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        let close = self.closing_identifier_quote();
        let escaped = name.replace(close, &format!("{close}{close}"));
        format!("{}{}{}", self.identifier_quote, escaped, close)
    }

    /// Strip the literal quotes from `text`, or return it unchanged when it
    /// is not a quoted literal.
    pub fn unquote_literal(&self, text: &str) -> String {
        let q = self.literal_quote;
        match text.strip_prefix(q).and_then(|rest| rest.strip_suffix(q)) {
            Some(inner) => inner.replace(&format!("{q}{q}"), &q.to_string()),
            None => text.to_string(),
        }
    }

    pub fn normalize_identifier(&self, name: &str) -> String {
        match self.unquoted_casing {
            Casing::Unchanged => name.to_string(),
            Casing::ToUpper => name.to_uppercase(),
            Casing::ToLower => name.to_lowercase(),
        }
    }
}

/// Parser and renderer settings for one target engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectSettings {
    pub parser: ParserSettings,
    pub render: RenderSettings,
}

impl Default for DialectSettings {
    fn default() -> Self {
        let ansi = BaseDialect {
            grammar: Grammar::Generic,
            identifier_quote: '"',
            literal_quote: '\'',
            unquoted_casing: Casing::Unchanged,
        };
        Self {
            parser: ParserSettings {
                grammar: ansi.grammar,
                trailing_commas: false,
                unescape: true,
                recursion_limit: DEFAULT_RECURSION_LIMIT,
            },
            render: RenderSettings {
                identifier_quote: ansi.identifier_quote,
                literal_quote: ansi.literal_quote,
                unquoted_casing: ansi.unquoted_casing,
            },
        }
    }
}

impl DialectConfig {
    pub fn base(name: impl Into<String>) -> Self {
        Self {
            base_dialect: name.into(),
            grammar: None,
            conformance: None,
            identifier_quote: None,
            literal_quote: None,
            unquoted_casing: None,
            trailing_commas: None,
            unescape: None,
            recursion_limit: None,
        }
    }

    /// Resolve this config against its base dialect.
    pub fn translate(&self) -> SqlResult<DialectSettings> {
        let base = base_dialect(&self.base_dialect).ok_or_else(|| SqlError::UnknownBaseDialect {
            name: self.base_dialect.clone(),
            known: KNOWN_BASE_DIALECTS.join(", "),
        })?;
        let grammar = match &self.grammar {
            Some(name) => Grammar::from_name(name)?,
            None => base.grammar,
        };
        let conformance = match &self.conformance {
            Some(name) => Conformance::from_name(name)?,
            None => Conformance::Default,
        };
        let trailing_commas = self
            .trailing_commas
            .unwrap_or(conformance == Conformance::Lenient);

        Ok(DialectSettings {
            parser: ParserSettings {
                grammar,
                trailing_commas,
                unescape: self.unescape.unwrap_or(true),
                recursion_limit: self.recursion_limit.unwrap_or(DEFAULT_RECURSION_LIMIT),
            },
            render: RenderSettings {
                identifier_quote: self.identifier_quote.unwrap_or(base.identifier_quote),
                literal_quote: self.literal_quote.unwrap_or(base.literal_quote),
                unquoted_casing: self.unquoted_casing.unwrap_or(base.unquoted_casing),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_inherit_from_base() {
        let settings = DialectConfig::base("mysql").translate().unwrap();
        assert_eq!(settings.parser.grammar, Grammar::MySql);
        assert_eq!(settings.render.identifier_quote, '`');
        assert_eq!(settings.render.literal_quote, '\'');
        assert!(!settings.parser.trailing_commas);
    }

    #[test]
    fn explicit_fields_override_base() {
        let config = DialectConfig {
            identifier_quote: Some('"'),
            grammar: Some("postgresql".into()),
            conformance: Some("lenient".into()),
            ..DialectConfig::base("mysql")
        };
        let settings = config.translate().unwrap();
        assert_eq!(settings.parser.grammar, Grammar::PostgreSql);
        assert_eq!(settings.render.identifier_quote, '"');
        assert!(settings.parser.trailing_commas);
    }

    #[test]
    fn unknown_names_fail_fast() {
        let err = DialectConfig::base("oracle9").translate().unwrap_err();
        assert!(err.to_string().contains("oracle9"));

        let config = DialectConfig {
            grammar: Some("cobol".into()),
            ..DialectConfig::default()
        };
        assert!(matches!(config.translate(), Err(SqlError::UnknownGrammar(g)) if g == "cobol"));

        let config = DialectConfig {
            conformance: Some("babel".into()),
            ..DialectConfig::default()
        };
        assert!(matches!(config.translate(), Err(SqlError::UnknownConformance(_))));
    }

    #[test]
    fn translation_is_repeatable() {
        let config = DialectConfig::base("snowflake");
        assert_eq!(config.translate().unwrap(), config.translate().unwrap());
    }

    #[test]
    fn default_matches_ansi_translation() {
        assert_eq!(DialectSettings::default(), DialectConfig::default().translate().unwrap());
    }

    #[test]
    fn deserializes_camel_case_config() {
        let config: DialectConfig = serde_json::from_str(
            r#"{"baseDialect": "postgresql", "identifierQuote": "`", "unquotedCasing": "TO_UPPER"}"#,
        )
        .unwrap();
        let settings = config.translate().unwrap();
        assert_eq!(settings.render.identifier_quote, '`');
        assert_eq!(settings.render.unquoted_casing, Casing::ToUpper);
    }

    #[test]
    fn quoting_helpers_follow_render_settings() {
        let render = DialectConfig::base("mssql").translate().unwrap().render;
        assert_eq!(render.quote_identifier("my col"), "[my col]");
        assert_eq!(render.unquote_literal("'it''s'"), "it's");
        assert_eq!(render.unquote_literal("plain"), "plain");
        assert_eq!(render.unquote_literal("'"), "'");
    }

    #[test]
    fn unquotes_multibyte_literal_quotes() {
        let config = DialectConfig {
            literal_quote: Some('§'),
            ..DialectConfig::base("ansi")
        };
        let render = config.translate().unwrap().render;
        assert_eq!(render.unquote_literal("§"), "§");
        assert_eq!(render.unquote_literal("§a§§b§"), "a§b");
    }

    #[test]
    fn parse_expr_rejects_trailing_tokens() {
        let parser = DialectSettings::default().parser;
        assert!(parser.parse_expr("a >= 1 AND a < 2").is_ok());
        assert!(parser.parse_expr("a >= 1 garbage garbage").is_err());
    }
}
