//! Query-dialect parsing.
//!
//! Turns one embedded SOQL fragment into a structured `SoqlStatement`:
//! target object, select-list fields, filter fields and literal values, and
//! nested sub-selects. A fragment without a resolvable target yields `None`
//! and is silently dropped by the extraction pass.

use crate::types::SoqlStatement;

/// Trait for query-dialect parsers that structure one embedded fragment.
pub trait QueryParser: Send + Sync {
    /// Parses a raw fragment, delimiters included. Returns `None` when the
    /// fragment cannot be resolved to a target object.
    fn parse_query(&self, fragment: &str) -> Option<SoqlStatement>;
}

/// Bundled SOQL reader covering SELECT / FROM / WHERE and sub-selects.
pub struct SoqlParser;

impl QueryParser for SoqlParser {
    fn parse_query(&self, fragment: &str) -> Option<SoqlStatement> {
        let text = fragment
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']');
        parse_statement(text)
    }
}

/// WHERE-clause keywords that never act as field names.
const WHERE_KEYWORDS: &[&str] = &["AND", "OR", "NOT", "LIKE", "IN", "INCLUDES", "EXCLUDES"];

/// Keywords that terminate the WHERE clause.
const CLAUSE_TERMINATORS: &[&str] = &["ORDER", "GROUP", "LIMIT", "OFFSET", "FOR", "WITH", "ALL"];

fn parse_statement(text: &str) -> Option<SoqlStatement> {
    let select_end = find_keyword(text, "SELECT")?;
    let rest = &text[select_end..];
    let from_start = find_keyword_start(rest, "FROM")?;
    let select_list = &rest[..from_start];
    let after_from = &rest[from_start + "FROM".len()..];

    let object_name = after_from
        .split_whitespace()
        .next()?
        .trim_end_matches(',')
        .to_string();
    if object_name.is_empty() {
        return None;
    }

    let mut statement = SoqlStatement {
        object_name,
        ..SoqlStatement::default()
    };

    for item in split_top_level(select_list) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if item.starts_with('(') {
            let inner = item.trim_start_matches('(').trim_end_matches(')');
            if let Some(sub) = parse_statement(inner) {
                statement.sub_queries.push(sub);
            }
            continue;
        }
        if let Some(field) = select_field(item) {
            statement.fields.push(field);
        }
    }

    if let Some(where_start) = find_keyword_start(after_from, "WHERE") {
        let clause = &after_from[where_start + "WHERE".len()..];
        let clause = truncate_at_terminator(clause);
        parse_where(clause, &mut statement);
    }

    Some(statement)
}

/// Extracts the field name from one select-list item. Aggregate and
/// formatting functions contribute their first argument; `COUNT()` with no
/// argument contributes nothing.
fn select_field(item: &str) -> Option<String> {
    if let Some(open) = item.find('(') {
        let inner = item[open + 1..].trim_end_matches(')');
        let arg = inner.split(',').next()?.trim();
        if arg.is_empty() {
            return None;
        }
        return Some(arg.to_string());
    }
    // Drop an alias if present; the field itself comes first.
    item.split_whitespace().next().map(|s| s.to_string())
}

/// Returns the byte offset just past the first top-level occurrence of `kw`.
fn find_keyword(text: &str, kw: &str) -> Option<usize> {
    find_keyword_start(text, kw).map(|start| start + kw.len())
}

/// Finds the start of the first occurrence of `kw` outside quotes and
/// parentheses, matched case-insensitively on word boundaries.
fn find_keyword_start(text: &str, kw: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let upper: Vec<u8> = bytes.iter().map(|b| b.to_ascii_uppercase()).collect();
    let kw_bytes = kw.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = 0;

    while i + kw_bytes.len() <= upper.len() {
        let c = bytes[i];
        if in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == b'\'' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' => in_string = true,
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && !in_string && upper[i..].starts_with(kw_bytes) {
            let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let after = i + kw_bytes.len();
            let after_ok = after >= bytes.len() || !is_word_byte(bytes[after]);
            if before_ok && after_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Cuts the WHERE clause at the first terminator keyword (ORDER BY, LIMIT,
/// and friends).
fn truncate_at_terminator(clause: &str) -> &str {
    let mut end = clause.len();
    for kw in CLAUSE_TERMINATORS {
        if let Some(pos) = find_keyword_start(clause, kw) {
            end = end.min(pos);
        }
    }
    &clause[..end]
}

/// Splits on commas that sit outside quotes and parentheses.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth -= 1,
            ',' if !in_string && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Tokens of a WHERE clause.
#[derive(Debug, PartialEq, Eq)]
enum WhereTok {
    Word(String),
    Str(String),
    Sym(char),
}

fn lex_where(clause: &str) -> Vec<WhereTok> {
    let chars: Vec<char> = clause.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '\'' {
            let mut s = String::new();
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    s.push(chars[i + 1]);
                    i += 2;
                } else if chars[i] == '\'' {
                    i += 1;
                    break;
                } else {
                    s.push(chars[i]);
                    i += 1;
                }
            }
            toks.push(WhereTok::Str(s));
        } else if c.is_alphanumeric() || c == '_' {
            let mut w = String::new();
            // Dots for relationship paths, colons for date literals like
            // LAST_N_DAYS:7.
            while i < chars.len()
                && (chars[i].is_alphanumeric()
                    || chars[i] == '_'
                    || chars[i] == '.'
                    || chars[i] == ':')
            {
                w.push(chars[i]);
                i += 1;
            }
            toks.push(WhereTok::Word(w));
        } else {
            toks.push(WhereTok::Sym(c));
            i += 1;
        }
    }
    toks
}

/// Length in tokens of a comparison operator starting at `pos`, or `None`.
fn operator_len(toks: &[WhereTok], pos: usize) -> Option<usize> {
    match toks.get(pos)? {
        WhereTok::Sym('=') => Some(1),
        WhereTok::Sym('!') | WhereTok::Sym('<') | WhereTok::Sym('>') => {
            match toks.get(pos + 1) {
                Some(WhereTok::Sym('=')) => Some(2),
                Some(WhereTok::Sym('>')) if matches!(toks[pos], WhereTok::Sym('<')) => Some(2),
                _ if matches!(toks[pos], WhereTok::Sym('!')) => None,
                _ => Some(1),
            }
        }
        WhereTok::Word(w) => {
            let upper = w.to_uppercase();
            match upper.as_str() {
                "LIKE" | "IN" | "INCLUDES" | "EXCLUDES" => Some(1),
                "NOT" => match toks.get(pos + 1) {
                    Some(WhereTok::Word(next)) if next.eq_ignore_ascii_case("IN") => Some(2),
                    _ => None,
                },
                _ => None,
            }
        }
        _ => None,
    }
}

/// Returns `true` for a bare word that is a literal value rather than a
/// field: numbers, booleans, NULL, and SOQL date literals.
fn is_bare_literal(word: &str) -> bool {
    if word.parse::<f64>().is_ok() {
        return true;
    }
    let upper = word.to_uppercase();
    if matches!(upper.as_str(), "TRUE" | "FALSE" | "NULL") {
        return true;
    }
    // Date literals are all-caps with underscores, optionally :n.
    upper == *word && word.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Collects filter fields and literal values from a WHERE clause, in source
/// order.
fn parse_where(clause: &str, statement: &mut SoqlStatement) {
    let toks = lex_where(clause);
    let mut i = 0;

    while i < toks.len() {
        let field = match &toks[i] {
            WhereTok::Word(w)
                if !WHERE_KEYWORDS.contains(&w.to_uppercase().as_str())
                    && w.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') =>
            {
                w.clone()
            }
            _ => {
                i += 1;
                continue;
            }
        };

        let Some(op_len) = operator_len(&toks, i + 1) else {
            i += 1;
            continue;
        };

        statement.where_fields.push(field);
        i += 1 + op_len;
        i = collect_literals(&toks, i, statement);
    }
}

/// Consumes the right-hand side of one predicate starting at `i`, pushing
/// literal values onto the statement. Returns the index to resume from.
fn collect_literals(toks: &[WhereTok], mut i: usize, statement: &mut SoqlStatement) -> usize {
    // Parenthesized value list, e.g. IN ('a', 'b'). A nested SELECT is a
    // semi-join, not a value list; skip it without collecting.
    if matches!(toks.get(i), Some(WhereTok::Sym('('))) {
        let mut j = i + 1;
        let mut depth = 1;
        let mut is_subselect = false;
        let mut values = Vec::new();
        while j < toks.len() && depth > 0 {
            match &toks[j] {
                WhereTok::Sym('(') => depth += 1,
                WhereTok::Sym(')') => depth -= 1,
                WhereTok::Word(w) if w.eq_ignore_ascii_case("select") => is_subselect = true,
                WhereTok::Str(s) if depth == 1 => values.push(s.clone()),
                WhereTok::Word(w) if depth == 1 && is_bare_literal(w) => values.push(w.clone()),
                _ => {}
            }
            j += 1;
        }
        if !is_subselect {
            statement.literals.extend(values);
        }
        return j;
    }

    // Bind variable, e.g. :accountIds. Not a literal.
    if matches!(toks.get(i), Some(WhereTok::Sym(':'))) {
        return i + 2;
    }

    match toks.get(i) {
        Some(WhereTok::Str(s)) => {
            statement.literals.push(s.clone());
            i + 1
        }
        Some(WhereTok::Word(w)) if is_bare_literal(w) => {
            statement.literals.push(w.clone());
            i + 1
        }
        _ => i,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(fragment: &str) -> SoqlStatement {
        SoqlParser.parse_query(fragment).expect("no statement")
    }

    #[test]
    fn simple_select() {
        let stmt = parse("[SELECT Id, Name FROM Account]");
        assert_eq!(stmt.object_name, "Account");
        assert_eq!(stmt.fields, vec!["Id", "Name"]);
        assert!(stmt.where_fields.is_empty());
    }

    #[test]
    fn where_fields_and_literals() {
        let stmt = parse("[SELECT Id FROM MyObj__c WHERE Status__c = 'Active' AND Amount__c > 100]");
        assert_eq!(stmt.object_name, "MyObj__c");
        assert_eq!(stmt.where_fields, vec!["Status__c", "Amount__c"]);
        assert_eq!(stmt.literals, vec!["Active", "100"]);
    }

    #[test]
    fn in_list_literals() {
        let stmt = parse("[SELECT Id FROM Case WHERE Status IN ('New', 'Open')]");
        assert_eq!(stmt.where_fields, vec!["Status"]);
        assert_eq!(stmt.literals, vec!["New", "Open"]);
    }

    #[test]
    fn bind_variable_is_not_a_literal() {
        let stmt = parse("[SELECT Id FROM Contact WHERE AccountId = :accountId]");
        assert_eq!(stmt.where_fields, vec!["AccountId"]);
        assert!(stmt.literals.is_empty());
    }

    #[test]
    fn sub_select_becomes_sub_query() {
        let stmt = parse("[SELECT Id, (SELECT LastName FROM Contacts__r) FROM Account]");
        assert_eq!(stmt.object_name, "Account");
        assert_eq!(stmt.fields, vec!["Id"]);
        assert_eq!(stmt.sub_queries.len(), 1);
        assert_eq!(stmt.sub_queries[0].object_name, "Contacts__r");
        assert_eq!(stmt.sub_queries[0].fields, vec!["LastName"]);
    }

    #[test]
    fn where_in_subselect_is_skipped() {
        let stmt =
            parse("[SELECT Id FROM Contact WHERE AccountId IN (SELECT Id FROM Account)]");
        assert_eq!(stmt.where_fields, vec!["AccountId"]);
        assert!(stmt.literals.is_empty());
        assert!(stmt.sub_queries.is_empty());
    }

    #[test]
    fn clause_terminators_end_the_where_clause() {
        let stmt = parse("[SELECT Id FROM Account WHERE Name = 'Acme' ORDER BY Name LIMIT 10]");
        assert_eq!(stmt.where_fields, vec!["Name"]);
        assert_eq!(stmt.literals, vec!["Acme"]);
    }

    #[test]
    fn aggregate_argument_is_a_field() {
        let stmt = parse("[SELECT COUNT(Id), MAX(Amount) FROM Opportunity]");
        assert_eq!(stmt.fields, vec!["Id", "Amount"]);
    }

    #[test]
    fn fragment_without_target_yields_none() {
        assert!(SoqlParser.parse_query("[SELECT Id]").is_none());
        assert!(SoqlParser.parse_query("[not a query]").is_none());
    }

    #[test]
    fn date_literal_is_collected() {
        let stmt = parse("[SELECT Id FROM Task WHERE ActivityDate = LAST_N_DAYS:7]");
        assert_eq!(stmt.where_fields, vec!["ActivityDate"]);
        assert_eq!(stmt.literals, vec!["LAST_N_DAYS:7"]);
    }
}
