use std::sync::Arc;

use tripwire_core::{DatasetMetadata, DetectionInterval, Period, Properties};

use super::*;
use crate::dialect::DialectSettings;
use crate::error::SqlError;
use crate::expression::{AnsiExpressionBuilder, SqlExpressionBuilder};

const START: i64 = 11_111_111;
const END: i64 = 22_222_222;

/// Renders recognizable function calls so expansions are easy to assert on.
struct MarkerBuilder;

impl SqlExpressionBuilder for MarkerBuilder {
    fn time_filter_expression(&self, column: &str, min: i64, max: i64) -> SqlResult<String> {
        Ok(format!("TIME_FILTER_MACRO_EXPANDED({column}, {min}, {max})"))
    }

    fn time_group_expression(
        &self,
        column: &str,
        format: &str,
        granularity: &Period,
        timezone: Option<&str>,
    ) -> SqlResult<String> {
        Ok(match timezone {
            None => format!("TIMEGROUP_MACRO_EXPANDED({column}, '{format}', '{granularity}')"),
            Some(tz) => {
                format!("TIMEGROUP_MACRO_EXPANDED({column}, '{format}', '{granularity}', '{tz}')")
            }
        })
    }
}

fn interval() -> DetectionInterval {
    DetectionInterval::new(START, END).unwrap()
}

fn props(pairs: &[(&str, &str)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn prepare(query: &str) -> PreparedRequest {
    let dialect = DialectSettings::default();
    MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .prepare_request(query)
        .unwrap()
}

#[test]
fn time_filter_records_bounds() {
    let out = prepare("select * from tableName where __timeFilter(timeCol)");
    assert_eq!(
        out.sql,
        "SELECT * FROM tableName WHERE TIME_FILTER_MACRO_EXPANDED(timeCol, 11111111, 22222222)"
    );
    assert_eq!(out.table.as_deref(), Some("tableName"));
    assert_eq!(
        out.properties,
        props(&[
            ("timeColumn", "timeCol"),
            ("minTimeMillis", "11111111"),
            ("maxTimeMillis", "22222222"),
        ])
    );
}

#[test]
fn time_filter_accepts_function_call_argument() {
    let out = prepare("select * from tableName where __timeFilter(unixTimestamp(timeCol))");
    assert_eq!(
        out.properties.get("timeColumn").map(String::as_str),
        Some("unixTimestamp(timeCol)")
    );
}

#[test]
fn time_filter_applies_lookbacks() {
    let day = 86_400_000;
    let hour = 3_600_000;
    let out = prepare("select * from t where __timeFilter(ts, 'P1D', 'PT1H')");
    assert_eq!(
        out.properties.get("minTimeMillis"),
        Some(&(START - day).to_string())
    );
    assert_eq!(
        out.properties.get("maxTimeMillis"),
        Some(&(END - hour).to_string())
    );
}

#[test]
fn time_group_accepts_unquoted_and_quoted_literals() {
    let expected = "SELECT TIMEGROUP_MACRO_EXPANDED(timeCol, 'myTestFormat', 'P0D') FROM tableName";
    let unquoted = prepare("select __timeGroup(timeCol,myTestFormat,P0D) from tableName");
    let quoted = prepare("select __timeGroup(timeCol,'myTestFormat','P0D') FROM tableName");
    assert_eq!(unquoted.sql, expected);
    assert_eq!(quoted.sql, expected);
    assert_eq!(quoted.properties, props(&[("granularity", "P0D")]));
}

#[test]
fn time_group_records_granularity_whatever_the_format() {
    let out = prepare("select __timeGroup(ts, 'yyyyMMdd', 'P1D') from t");
    assert_eq!(out.properties.get("granularity").map(String::as_str), Some("P1D"));
}

#[test]
fn time_group_uses_dataset_timezone() {
    let dialect = DialectSettings::default();
    let dataset = DatasetMetadata {
        timezone: Some("Europe/Amsterdam".into()),
        ..DatasetMetadata::named("pageviews")
    };
    let out = MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .with_dataset(&dataset)
        .prepare_request("select __timeGroup(ts, 'EPOCH', 'PT1H') from raw_pageviews")
        .unwrap();
    assert!(out.sql.contains("'Europe/Amsterdam'"));
    assert_eq!(out.table.as_deref(), Some("pageviews"));
}

#[test]
fn time_filter_uses_dataset_time_format() {
    let dialect = DialectSettings::default();
    let dataset = DatasetMetadata {
        time_column: Some("ts".into()),
        time_format: Some("EPOCH".into()),
        ..DatasetMetadata::named("pageviews")
    };
    let builder = AnsiExpressionBuilder::default();
    let request = |query: &str| {
        MacroEngine::new(&dialect, &builder, interval())
            .with_dataset(&dataset)
            .prepare_request(query)
            .unwrap()
    };

    let out = request("select * from pageviews where __timeFilter(ts)");
    assert_eq!(out.sql, "SELECT * FROM pageviews WHERE (ts >= 11112 AND ts < 22223)");
    // bounds stay in millis
    assert_eq!(out.properties.get("minTimeMillis").map(String::as_str), Some("11111111"));

    let other = request("select * from pageviews where __timeFilter(created)");
    assert!(other.sql.contains("(created >= 11111111 AND created < 22222222)"));
}

#[test]
fn nested_macros_expand_inside_out() {
    let out = prepare("select * from tableName where __timeFilter(__timeGroup(timeCol,myTestFormat,P0D))");
    let inner = "TIMEGROUP_MACRO_EXPANDED(timeCol, 'myTestFormat', 'P0D')";
    assert_eq!(
        out.sql,
        format!("SELECT * FROM tableName WHERE TIME_FILTER_MACRO_EXPANDED({inner}, 11111111, 22222222)")
    );
    assert_eq!(
        out.properties,
        props(&[
            ("granularity", "P0D"),
            ("timeColumn", inner),
            ("minTimeMillis", "11111111"),
            ("maxTimeMillis", "22222222"),
        ])
    );
}

#[test]
fn identifier_quotes_are_kept() {
    let out = prepare(r#"select * from tableName where __timeFilter("date")"#);
    assert_eq!(
        out.sql,
        r#"SELECT * FROM tableName WHERE TIME_FILTER_MACRO_EXPANDED("date", 11111111, 22222222)"#
    );
    assert_eq!(
        out.properties.get("timeColumn").map(String::as_str),
        Some(r#""date""#)
    );
}

#[test]
fn macro_names_ignore_case() {
    let out = prepare("select * from t where __TIMEFILTER(ts)");
    assert!(out.sql.contains("TIME_FILTER_MACRO_EXPANDED(ts"));
}

#[test]
fn ansi_time_filter_renders_half_open_bounds() {
    let dialect = DialectSettings::default();
    let builder = AnsiExpressionBuilder::default();
    let interval = DetectionInterval::new(1_000_000, 2_000_000).unwrap();
    let out = MacroEngine::new(&dialect, &builder, interval)
        .prepare_request("SELECT * FROM t WHERE __timeFilter(ts)")
        .unwrap();
    assert_eq!(out.sql, "SELECT * FROM t WHERE (ts >= 1000000 AND ts < 2000000)");
    assert_eq!(out.properties.get("minTimeMillis").map(String::as_str), Some("1000000"));
    assert_eq!(out.properties.get("maxTimeMillis").map(String::as_str), Some("2000000"));
}

#[test]
fn compound_expansion_keeps_precedence() {
    let dialect = DialectSettings::default();
    let builder = AnsiExpressionBuilder::default();
    let interval = DetectionInterval::new(1_000, 2_000).unwrap();
    let out = MacroEngine::new(&dialect, &builder, interval)
        .prepare_request("SELECT * FROM t WHERE NOT __timeFilter(ts)")
        .unwrap();
    assert_eq!(out.sql, "SELECT * FROM t WHERE NOT (ts >= 1000 AND ts < 2000)");
}

#[test]
fn expansion_is_idempotent() {
    let dialect = DialectSettings::default();
    let builder = AnsiExpressionBuilder::default();
    let first = MacroEngine::new(&dialect, &builder, interval())
        .prepare_request(
            "SELECT __timeGroup(ts, 'EPOCH_MILLIS', 'P1D') AS bucket, SUM(v) FROM t \
             WHERE __timeFilter(ts) GROUP BY 1",
        )
        .unwrap();
    let second = MacroEngine::new(&dialect, &builder, interval())
        .prepare_request(&first.sql)
        .unwrap();
    assert_eq!(first.sql, second.sql);
    assert!(second.properties.is_empty());
}

struct BrokenMacro;

impl MacroFunction for BrokenMacro {
    fn name(&self) -> &str {
        "__broken"
    }

    fn expand(&self, _args: &[String], _ctx: &mut MacroExpansionContext<'_>) -> SqlResult<String> {
        Ok("this is ( not sql".to_string())
    }
}

#[test]
fn invalid_expansion_is_kept_by_default() {
    let dialect = DialectSettings::default();
    let out = MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .with_macro(Arc::new(BrokenMacro))
        .prepare_request("SELECT * FROM t WHERE __broken(x) AND __timeFilter(ts)")
        .unwrap();
    assert!(out.sql.contains("__broken(x)"));
    assert!(out.sql.contains("TIME_FILTER_MACRO_EXPANDED(ts"));
}

#[test]
fn invalid_expansion_fails_in_strict_mode() {
    let dialect = DialectSettings::default();
    let err = MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .with_macro(Arc::new(BrokenMacro))
        .strict(true)
        .prepare_request("SELECT * FROM t WHERE __broken(x)")
        .unwrap_err();
    assert!(matches!(err, SqlError::InvalidMacroExpansion { ref name, .. } if name == "__broken"));
}

struct UpperMacro;

impl MacroFunction for UpperMacro {
    fn name(&self) -> &str {
        "__upper"
    }

    fn expand(&self, args: &[String], ctx: &mut MacroExpansionContext<'_>) -> SqlResult<String> {
        Ok(format!("UPPER({})", ctx.quote_identifier(&args.join(""))))
    }
}

#[test]
fn registered_macros_expand_alongside_builtins() {
    let dialect = DialectSettings::default();
    let out = MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .with_macro(Arc::new(UpperMacro))
        .prepare_request("SELECT __upper('city') FROM t")
        .unwrap();
    assert_eq!(out.sql, r#"SELECT UPPER("city") FROM t"#);
}

#[test]
fn wrong_arity_is_an_error() {
    let dialect = DialectSettings::default();
    let err = MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .prepare_request("SELECT __timeGroup(ts) FROM t")
        .unwrap_err();
    assert!(matches!(err, SqlError::MacroArity { actual: 1, .. }));
}

#[test]
fn bad_lookback_names_the_macro() {
    let dialect = DialectSettings::default();
    let err = MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .prepare_request("SELECT * FROM t WHERE __timeFilter(ts, 'yesterday')")
        .unwrap_err();
    assert!(err.to_string().contains("__timeFilter"));
}

#[test]
fn oversized_lookback_is_an_error() {
    let dialect = DialectSettings::default();
    let result = MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .prepare_request("SELECT * FROM t WHERE __timeFilter(ts, 'P400000000Y')");
    assert!(result.is_err());
}

#[test]
fn unparseable_query_is_a_parse_error() {
    let dialect = DialectSettings::default();
    let err = MacroEngine::new(&dialect, &MarkerBuilder, interval())
        .prepare_request("SELEKT everything")
        .unwrap_err();
    assert!(matches!(err, SqlError::Parse { .. }));
}

#[test]
fn builtin_registry_lists_both_macros() {
    let registry = MacroRegistry::builtin();
    let names: Vec<&str> = registry.names().collect();
    assert_eq!(names, vec![TIME_FILTER_MACRO, TIME_GROUP_MACRO]);
    assert!(registry.get("__timegroup").is_some());
}
