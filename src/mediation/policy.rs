//! Authorization Policy
//!
//! Decides, from the actor's role and the query's surface shape, whether a
//! candidate query runs as-is, runs rewritten, waits for human confirmation,
//! or is refused. Rules are evaluated in order:
//!
//! 1. Non-admins may only run statements whose leading verb is `SELECT`.
//! 2. Destructive statements (`DELETE`, `DROP`, `TRUNCATE`) need confirmation.
//! 3. Non-admin reads of per-actor tables are narrowed to the actor's own rows.
//!    Reads that could reach such a table without a plain table reference
//!    (dynamic SQL, escaped identifiers, the table named inside a literal,
//!    references the rewrite cannot find) are refused instead.
//! 4. Everything else is allowed unchanged.
//!
//! Batches of more than one statement are refused for every role before any
//! of the above.

use crate::auth::Actor;
use crate::config::ScopedTable;
use crate::mediation::classifier::{self, unqualified, QueryClass, StatementShape};
use serde::Serialize;
use sqlparser::ast::{ObjectName, Statement, TableAlias, TableFactor, VisitMut, VisitorMut};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::ops::ControlFlow;
use tracing::{debug, info};

pub const READ_ONLY_DENIAL: &str = "only read queries permitted for this role";

/// Functions that run SQL handed to them as text, or dump whole tables
const DYNAMIC_SQL_FUNCTIONS: [&str; 15] = [
    "query_to_xml",
    "query_to_xmlschema",
    "query_to_xml_and_xmlschema",
    "table_to_xml",
    "table_to_xmlschema",
    "table_to_xml_and_xmlschema",
    "schema_to_xml",
    "schema_to_xmlschema",
    "schema_to_xml_and_xmlschema",
    "database_to_xml",
    "database_to_xmlschema",
    "database_to_xml_and_xmlschema",
    "cursor_to_xml",
    "dblink",
    "dblink_exec",
];

/// Outcome of authorizing one candidate query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "detail", rename_all = "snake_case")]
pub enum AuthDecision {
    /// Execute this (possibly rewritten) text
    Allow(String),
    /// Hold this text until a human confirms it
    RequireConfirmation(String),
    /// Refuse, with a user-facing reason
    Deny(String),
}

pub struct AuthorizationPolicy {
    scoped_tables: Vec<ScopedTable>,
}

impl AuthorizationPolicy {
    pub fn new(scoped_tables: Vec<ScopedTable>) -> Self {
        Self { scoped_tables }
    }

    pub fn authorize(&self, sql: &str, actor: &Actor) -> AuthDecision {
        let shape = match classifier::inspect(sql) {
            Ok(shape) => shape,
            // Admins are not limited to what the tokenizer understands; the store will judge
            Err(e) if actor.is_admin() => {
                debug!("Falling back to prefix classification: {}", e);
                return match classifier::classify(sql) {
                    QueryClass::Destructive => AuthDecision::RequireConfirmation(sql.to_string()),
                    QueryClass::Safe => AuthDecision::Allow(sql.to_string()),
                };
            }
            Err(e) => return AuthDecision::Deny(e.to_string()),
        };

        if shape.statement_count == 0 {
            return AuthDecision::Deny("query is empty".to_string());
        }
        if shape.statement_count > 1 {
            return AuthDecision::Deny("multiple statements are not permitted".to_string());
        }

        if !actor.is_admin() && !shape.is_read() {
            return AuthDecision::Deny(READ_ONLY_DENIAL.to_string());
        }

        if shape.class() == QueryClass::Destructive {
            return AuthDecision::RequireConfirmation(sql.to_string());
        }

        if !actor.is_admin() {
            if let Some(reason) = self.indirect_access(&shape) {
                return AuthDecision::Deny(reason);
            }

            let mentioned: Vec<&ScopedTable> = self
                .scoped_tables
                .iter()
                .filter(|t| shape.mentions(&t.table))
                .collect();

            if !mentioned.is_empty() {
                return match scope_rows(sql, &mentioned, &actor.name) {
                    Ok(rewritten) => {
                        info!("Scoped query rows to actor {}", actor.id);
                        AuthDecision::Allow(rewritten)
                    }
                    Err(reason) => AuthDecision::Deny(reason),
                };
            }
        }

        AuthDecision::Allow(sql.to_string())
    }

    /// Ways a read can reach a scoped table that the row rewrite cannot see
    fn indirect_access(&self, shape: &StatementShape) -> Option<String> {
        if shape.escaped_identifier {
            return Some("escaped identifiers are not permitted for this role".to_string());
        }
        if let Some(function) = shape
            .words
            .iter()
            .find(|w| DYNAMIC_SQL_FUNCTIONS.contains(&w.as_str()))
        {
            return Some(format!("{} is not permitted for this role", function));
        }
        self.scoped_tables
            .iter()
            .find(|t| shape.mentions_in_literal(&t.table))
            .map(|t| format!("string literals may not name the protected table {}", t.table))
    }
}

/// Replace every table reference to a scoped table with a derived table
/// holding only the owner's rows. Fails when no reference could be replaced.
fn scope_rows(sql: &str, scoped: &[&ScopedTable], owner: &str) -> Result<String, String> {
    let mut statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| format!("query on a protected table could not be analysed: {}", e))?;

    let mut scoper = RowScoper {
        scoped,
        owner,
        replaced: 0,
    };
    if let ControlFlow::Break(reason) = statements.visit(&mut scoper) {
        return Err(reason);
    }

    // The text names the table but no reference was found: unscoped access
    if scoper.replaced == 0 {
        return Err("query on a protected table could not be limited to your rows".to_string());
    }

    Ok(statements
        .iter()
        .map(Statement::to_string)
        .collect::<Vec<_>>()
        .join("; "))
}

struct RowScoper<'a> {
    scoped: &'a [&'a ScopedTable],
    owner: &'a str,
    replaced: usize,
}

impl VisitorMut for RowScoper<'_> {
    type Break = String;

    // Post-order: the derived table swapped in here is never walked again
    fn post_visit_table_factor(&mut self, factor: &mut TableFactor) -> ControlFlow<Self::Break> {
        let TableFactor::Table { name, alias, .. } = factor else {
            return ControlFlow::Continue(());
        };

        let table_name = unqualified(&name.to_string());
        let Some(scope) = self
            .scoped
            .iter()
            .find(|t| unqualified(&t.table) == table_name)
        else {
            return ControlFlow::Continue(());
        };

        match owner_scoped_factor(name, alias.as_ref(), scope, self.owner) {
            Ok(replacement) => {
                *factor = replacement;
                self.replaced += 1;
                ControlFlow::Continue(())
            }
            Err(reason) => ControlFlow::Break(reason),
        }
    }
}

/// `(SELECT * FROM <table> WHERE <owner_column> = '<owner>') [alias]` as a table factor.
/// The original alias node is carried over whole, column list included.
fn owner_scoped_factor(
    table: &ObjectName,
    alias: Option<&TableAlias>,
    scope: &ScopedTable,
    owner: &str,
) -> Result<TableFactor, String> {
    let wrapper = format!(
        "SELECT * FROM (SELECT * FROM {} WHERE {} = '{}')",
        table,
        scope.owner_column,
        owner.replace('\'', "''"),
    );

    let statements = Parser::parse_sql(&PostgreSqlDialect {}, &wrapper)
        .map_err(|e| format!("row scope for {} could not be built: {}", table, e))?;

    statements
        .first()
        .and_then(|stmt| match stmt {
            Statement::Query(query) => query.body.as_select(),
            _ => None,
        })
        .and_then(|select| select.from.first())
        .map(|from| from.relation.clone())
        .and_then(|relation| match relation {
            TableFactor::Derived {
                lateral, subquery, ..
            } => Some(TableFactor::Derived {
                lateral,
                subquery,
                alias: alias.cloned(),
            }),
            _ => None,
        })
        .ok_or_else(|| format!("row scope for {} could not be built", table))
}
