use std::ops::ControlFlow;
use std::sync::Arc;

use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Value, VisitMut, VisitorMut,
};
use tracing::{debug, warn};
use tripwire_core::{DatasetMetadata, DetectionInterval, Properties};

use super::{MacroExpansionContext, MacroFunction, MacroRegistry};
use crate::dialect::{DialectSettings, ParserSettings};
use crate::error::{SqlError, SqlResult};
use crate::expression::SqlExpressionBuilder;
use crate::shape;

/// Output of one macro expansion pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub sql: String,
    /// Dataset name when known, otherwise the first table of the FROM clause.
    pub table: Option<String>,
    pub properties: Properties,
}

/// Expands macro calls in one query.
///
/// An engine is built for a single [`prepare_request`](Self::prepare_request)
/// call, which consumes it and hands back the properties its macros wrote.
pub struct MacroEngine<'a> {
    dialect: &'a DialectSettings,
    registry: MacroRegistry,
    strict: bool,
    context: MacroExpansionContext<'a>,
}

impl<'a> MacroEngine<'a> {
    pub fn new(
        dialect: &'a DialectSettings,
        expression_builder: &'a dyn SqlExpressionBuilder,
        interval: DetectionInterval,
    ) -> Self {
        Self {
            dialect,
            registry: MacroRegistry::builtin(),
            strict: false,
            context: MacroExpansionContext::new(expression_builder, interval, &dialect.render),
        }
    }

    pub fn with_dataset(mut self, dataset: &'a DatasetMetadata) -> Self {
        self.context.dataset = Some(dataset);
        self
    }

    /// Register a datasource-specific macro next to the builtins.
    pub fn with_macro(mut self, function: Arc<dyn MacroFunction>) -> Self {
        self.registry.register(function);
        self
    }

    /// Fail instead of keeping the call when an expansion does not parse.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn prepare_request(self, query: &str) -> SqlResult<PreparedRequest> {
        let MacroEngine {
            dialect,
            registry,
            strict,
            mut context,
        } = self;

        let mut statement = dialect.parser.parse_statement(query)?;

        let mut rewriter = MacroRewriter {
            registry: &registry,
            parser: &dialect.parser,
            context: &mut context,
            strict,
            expanded: 0,
        };
        if let ControlFlow::Break(err) = statement.visit(&mut rewriter) {
            return Err(err);
        }
        let expanded = rewriter.expanded;

        let table = match context.dataset {
            Some(dataset) => Some(dataset.name.clone()),
            None => shape::first_table_name(&mut statement),
        };
        let sql = statement.to_string();
        debug!(expanded, table = ?table, "macros expanded");

        Ok(PreparedRequest {
            sql,
            table,
            properties: context.into_properties(),
        })
    }
}

// ── AST rewrite ──────────────────────────────────────────────────────

struct MacroRewriter<'r, 'a> {
    registry: &'r MacroRegistry,
    parser: &'r ParserSettings,
    context: &'r mut MacroExpansionContext<'a>,
    strict: bool,
    expanded: usize,
}

impl MacroRewriter<'_, '_> {
    /// Expand `expr` if it is a call to a registered macro.
    ///
    /// Runs post-order, so macro calls among the arguments have already
    /// been replaced by their expansion.
    fn rewrite(&mut self, expr: &mut Expr) -> SqlResult<()> {
        let Expr::Function(function) = expr else {
            return Ok(());
        };
        let Some(name) = function.name.0.last().map(|ident| ident.value.clone()) else {
            return Ok(());
        };
        let Some(macro_fn) = self.registry.get(&name) else {
            return Ok(());
        };
        let macro_fn = Arc::clone(macro_fn);

        let args = self.render_args(&name, function)?;
        let expansion = macro_fn.expand(&args, self.context)?;

        match self.parser.parse_expr(&expansion) {
            Ok(parsed) => {
                *expr = parenthesize(parsed);
                self.expanded += 1;
                Ok(())
            }
            Err(source) if self.strict => Err(SqlError::InvalidMacroExpansion {
                name,
                expansion,
                source,
            }),
            Err(source) => {
                warn!(
                    macro_name = %name,
                    expansion = %expansion,
                    error = %source,
                    "macro expansion is not valid SQL, keeping the call unexpanded"
                );
                Ok(())
            }
        }
    }

    fn render_args(&self, name: &str, function: &Function) -> SqlResult<Vec<String>> {
        match &function.args {
            FunctionArguments::None => Ok(Vec::new()),
            FunctionArguments::List(list) => {
                Ok(list.args.iter().map(|arg| self.render_arg(arg)).collect())
            }
            FunctionArguments::Subquery(_) => Err(SqlError::MacroArgument {
                name: name.to_string(),
                reason: "a subquery cannot be a macro argument".into(),
            }),
        }
    }

    fn render_arg(&self, arg: &FunctionArg) -> String {
        match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => match expr {
                Expr::Value(Value::SingleQuotedString(s))
                | Expr::Value(Value::DoubleQuotedString(s)) => s.clone(),
                other => self.context.unquote_literal(&other.to_string()),
            },
            other => other.to_string(),
        }
    }
}

impl VisitorMut for MacroRewriter<'_, '_> {
    type Break = SqlError;

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        match self.rewrite(expr) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => ControlFlow::Break(err),
        }
    }
}

/// Wrap compound expansions so they keep their meaning wherever the call
/// sat (`NOT __timeFilter(ts)`, `x / __timeGroup(...)`).
fn parenthesize(expr: Expr) -> Expr {
    match expr {
        Expr::Identifier(_)
        | Expr::CompoundIdentifier(_)
        | Expr::Function(_)
        | Expr::Value(_)
        | Expr::Nested(_) => expr,
        other => Expr::Nested(Box::new(other)),
    }
}
