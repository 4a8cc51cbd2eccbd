//! Query classification
//!
//! Lexical only: no statement is parsed here. The token pass skips
//! whitespace and comments, so `/* note */ DROP TABLE t` is still caught, and
//! it counts top-level statements so batches can be refused upstream.

use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use thiserror::Error;

/// Leading verbs that make a statement irreversible
pub const DESTRUCTIVE_VERBS: [&str; 3] = ["DELETE", "DROP", "TRUNCATE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryClass {
    Safe,
    Destructive,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("query could not be tokenized: {0}")]
pub struct LexError(String);

/// Surface shape of a query text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementShape {
    /// Uppercased first keyword of the first statement, if it starts with a bare word
    pub leading_verb: Option<String>,
    /// Non-empty statements separated by top-level semicolons
    pub statement_count: usize,
    /// Lowercased identifier and keyword tokens, in order of appearance
    pub words: Vec<String>,
    /// Decoded contents of string literal tokens
    pub literals: Vec<String>,
    /// A `U&"..."` identifier appears; its name is only known after unescaping
    pub escaped_identifier: bool,
}

impl StatementShape {
    pub fn class(&self) -> QueryClass {
        match self.leading_verb.as_deref() {
            Some(verb) if DESTRUCTIVE_VERBS.contains(&verb) => QueryClass::Destructive,
            _ => QueryClass::Safe,
        }
    }

    pub fn is_read(&self) -> bool {
        self.leading_verb.as_deref() == Some("SELECT")
    }

    /// Whether any word token names `table` (compared on its unqualified name)
    pub fn mentions(&self, table: &str) -> bool {
        let wanted = unqualified(table);
        self.words.iter().any(|w| *w == wanted)
    }

    /// Whether any string literal contains `table` as a whole word
    pub fn mentions_in_literal(&self, table: &str) -> bool {
        let wanted = unqualified(table);
        self.literals.iter().any(|literal| {
            literal
                .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                .any(|word| word.to_lowercase() == wanted)
        })
    }
}

/// Tokenize a query and describe its leading verb and statement layout
pub fn inspect(sql: &str) -> Result<StatementShape, LexError> {
    let tokens = Tokenizer::new(&PostgreSqlDialect {}, sql)
        .tokenize()
        .map_err(|e| LexError(e.to_string()))?;

    let significant: Vec<Token> = tokens
        .into_iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect();

    let escaped_identifier = significant.windows(3).any(|w| {
        matches!(w, [Token::Word(prefix), Token::Ampersand, Token::Word(ident)]
            if prefix.quote_style.is_none()
                && prefix.value.eq_ignore_ascii_case("u")
                && ident.quote_style == Some('"'))
    });

    let mut leading_verb = None;
    let mut statement_count = 0;
    let mut in_statement = false;
    let mut words = Vec::new();
    let mut literals = Vec::new();

    for token in significant {
        match token {
            Token::SemiColon => in_statement = false,
            other => {
                if !in_statement {
                    in_statement = true;
                    statement_count += 1;
                    if statement_count == 1 {
                        leading_verb = match &other {
                            Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_uppercase()),
                            _ => None,
                        };
                    }
                }
                if let Token::Word(w) = &other {
                    words.push(w.value.to_lowercase());
                } else if let Some(text) = literal_text(&other) {
                    literals.push(text.to_string());
                }
            }
        }
    }

    Ok(StatementShape {
        leading_verb,
        statement_count,
        words,
        literals,
        escaped_identifier,
    })
}

fn literal_text(token: &Token) -> Option<&str> {
    match token {
        Token::SingleQuotedString(s)
        | Token::DoubleQuotedString(s)
        | Token::TripleSingleQuotedString(s)
        | Token::TripleDoubleQuotedString(s)
        | Token::NationalStringLiteral(s)
        | Token::EscapedStringLiteral(s)
        | Token::UnicodeStringLiteral(s) => Some(s),
        Token::DollarQuotedString(d) => Some(&d.value),
        _ => None,
    }
}

/// Classify a query as safe or destructive
pub fn classify(sql: &str) -> QueryClass {
    match inspect(sql) {
        Ok(shape) => shape.class(),
        Err(_) => classify_prefix(sql),
    }
}

/// Plain uppercase-prefix test, used when the text cannot be tokenized
fn classify_prefix(sql: &str) -> QueryClass {
    let upper = sql.trim_start().to_uppercase();
    if DESTRUCTIVE_VERBS.iter().any(|verb| upper.starts_with(verb)) {
        QueryClass::Destructive
    } else {
        QueryClass::Safe
    }
}

/// Last dotted segment, without quotes, lowercased
pub(crate) fn unqualified(name: &str) -> String {
    name.rsplit('.')
        .next()
        .unwrap_or(name)
        .trim_matches('"')
        .to_lowercase()
}
