use crate::command::{Command, DumpTarget, ParseError, SearchClauses, SortSpec};
use docstore::filter_evaluator::{FilterClause, OptionalFilterExpr};
use common::config::FilterOp;
use ngram::ast::{BooleanExpr, Term};

#[derive(Debug, Clone)]
struct Token {
    text: String,
    pos: usize,
    quoted: bool,
}

/// Splits a command line into whitespace-separated tokens, treating a
/// double-quoted run as a single token (the phrase grammar's `'"'
/// PhraseChars '"'`). Operator characters like `=`, `!=`, `<=` must be
/// surrounded by whitespace in the wire protocol, consistent with every
/// example in spec §8.
fn tokenize(line: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b' ' || bytes[i] == b'\t' {
            i += 1;
            continue;
        }
        if bytes[i] == b'"' {
            let start = i;
            i += 1;
            let content_start = i;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            if i >= bytes.len() {
                return Err(ParseError::new("unterminated phrase", start));
            }
            tokens.push(Token { text: line[content_start..i].to_string(), pos: start, quoted: true });
            i += 1; // skip closing quote
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != b' ' && bytes[i] != b'\t' {
                i += 1;
            }
            tokens.push(Token { text: line[start..i].to_string(), pos: start, quoted: false });
        }
    }
    Ok(tokens)
}

pub struct ParserConfig {
    pub default_limit: u64,
}

/// Parses one command line into a typed `Command` (spec §4.5).
pub fn parse_command(line: &str, cfg: &ParserConfig) -> Result<Command, ParseError> {
    let tokens = tokenize(line.trim_end_matches(['\r', '\n']))?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty command", 0));
    }

    let keyword = tokens[0].text.to_ascii_uppercase();
    let rest = &tokens[1..];

    match keyword.as_str() {
        "SEARCH" => parse_search_or_count(rest, cfg, false),
        "COUNT" => parse_search_or_count(rest, cfg, true),
        "GET" => parse_get(rest),
        "INFO" => Ok(Command::Info),
        "DEBUG" => parse_debug(rest),
        "OPTIMIZE" => Ok(Command::Optimize),
        "DUMP" => parse_dump(rest),
        "REPLICATION" => parse_replication(rest),
        "SYNC" => parse_sync(rest),
        "CACHE" => parse_cache(rest),
        "SET" => parse_set(rest),
        "SHOW" => parse_show(rest),
        other => Err(ParseError::new(format!("unknown command '{other}'"), tokens[0].pos)),
    }
}

fn expect_word(tokens: &[Token], idx: usize, what: &str) -> Result<&Token, ParseError> {
    tokens.get(idx).ok_or_else(|| ParseError::new(format!("expected {what}"), 0))
}

fn parse_search_or_count(tokens: &[Token], cfg: &ParserConfig, is_count: bool) -> Result<Command, ParseError> {
    let table_tok = expect_word(tokens, 0, "table name")?;
    let table = table_tok.text.clone();

    let mut i = 1;
    let (expr, next_i) = parse_expr(tokens, i)?;
    i = next_i;

    let mut filter = None;
    let mut sort = SortSpec::default();
    let mut limit = cfg.default_limit;
    let mut offset = 0u64;
    let mut limit_defaulted = true;
    let mut offset_defaulted = true;
    let mut sort_defaulted = true;
    let mut filter_defaulted = true;

    while i < tokens.len() {
        let clause = tokens[i].text.to_ascii_uppercase();
        match clause.as_str() {
            "FILTER" => {
                let (f, ni) = parse_filter_expr(tokens, i + 1)?;
                filter = Some(f);
                filter_defaulted = false;
                i = ni;
            }
            "SORT" => {
                let col = expect_word(tokens, i + 1, "sort column")?;
                let dir = expect_word(tokens, i + 2, "ASC or DESC")?;
                let descending = match dir.text.to_ascii_uppercase().as_str() {
                    "DESC" => true,
                    "ASC" => false,
                    _ => return Err(ParseError::new("expected ASC or DESC", dir.pos)),
                };
                sort = SortSpec { descending };
                sort_defaulted = false;
                let _ = col; // only docid ordering is supported; column name is not validated here
                i += 3;
            }
            "LIMIT" => {
                let n = expect_word(tokens, i + 1, "LIMIT value")?;
                limit = n.text.parse::<u64>().map_err(|_| ParseError::new("invalid LIMIT value", n.pos))?;
                limit_defaulted = false;
                i += 2;
            }
            "OFFSET" => {
                let n = expect_word(tokens, i + 1, "OFFSET value")?;
                offset = n.text.parse::<u64>().map_err(|_| ParseError::new("invalid OFFSET value", n.pos))?;
                offset_defaulted = false;
                i += 2;
            }
            other => return Err(ParseError::new(format!("unexpected clause '{other}'"), tokens[i].pos)),
        }
    }

    if is_count {
        Ok(Command::Count { table, expr, filter })
    } else {
        Ok(Command::Search {
            table,
            expr,
            clauses: SearchClauses {
                filter,
                sort,
                limit,
                offset,
                limit_defaulted,
                offset_defaulted,
                sort_defaulted,
                filter_defaulted,
            },
        })
    }
}

const CLAUSE_KEYWORDS: &[&str] = &["FILTER", "SORT", "LIMIT", "OFFSET"];

/// `Expr ::= Term (("AND" | "NOT") Term)*`, left-associative (spec §4.5).
fn parse_expr(tokens: &[Token], start: usize) -> Result<(BooleanExpr, usize), ParseError> {
    let mut i = start;
    let first = parse_term(tokens, i)?;
    let mut expr = BooleanExpr::leaf(first.0);
    i = first.1;

    loop {
        if i >= tokens.len() {
            break;
        }
        let upper = tokens[i].text.to_ascii_uppercase();
        if CLAUSE_KEYWORDS.contains(&upper.as_str()) {
            break;
        }
        match upper.as_str() {
            "AND" => {
                let (term, ni) = parse_term(tokens, i + 1)?;
                expr = expr.and(BooleanExpr::leaf(term));
                i = ni;
            }
            "NOT" => {
                let (term, ni) = parse_term(tokens, i + 1)?;
                expr = expr.and_not(BooleanExpr::leaf(term));
                i = ni;
            }
            other => return Err(ParseError::new(format!("expected AND, NOT, or a clause keyword, got '{other}'"), tokens[i].pos)),
        }
    }
    Ok((expr, i))
}

fn parse_term(tokens: &[Token], idx: usize) -> Result<(Term, usize), ParseError> {
    let tok = tokens.get(idx).ok_or_else(|| ParseError::new("expected a search term", 0))?;
    if tok.quoted {
        Ok((Term::Phrase(tok.text.clone()), idx + 1))
    } else {
        Ok((Term::Word(tok.text.clone()), idx + 1))
    }
}

/// `FilterExpr ::= Col Op Value ( "AND" Col Op Value )*`.
fn parse_filter_expr(tokens: &[Token], start: usize) -> Result<(OptionalFilterExpr, usize), ParseError> {
    let mut clauses = Vec::new();
    let mut i = start;
    loop {
        let col = expect_word(tokens, i, "filter column")?;
        let op_tok = expect_word(tokens, i + 1, "filter operator")?;
        let op = FilterOp::parse(&op_tok.text).ok_or_else(|| ParseError::new("unknown filter operator", op_tok.pos))?;
        let value = if matches!(op, FilterOp::IsNull | FilterOp::IsNotNull) {
            i += 2;
            String::new()
        } else {
            let val_tok = expect_word(tokens, i + 2, "filter value")?;
            i += 3;
            val_tok.text.clone()
        };
        clauses.push(FilterClause { column: col.text.clone(), op, value });

        if i < tokens.len() && tokens[i].text.eq_ignore_ascii_case("AND") {
            i += 1;
            continue;
        }
        break;
    }
    Ok((OptionalFilterExpr { clauses }, i))
}

fn parse_get(tokens: &[Token]) -> Result<Command, ParseError> {
    let table = expect_word(tokens, 0, "table name")?;
    let pk = expect_word(tokens, 1, "primary key")?;
    Ok(Command::Get { table: table.text.clone(), pk: pk.text.clone() })
}

fn parse_debug(tokens: &[Token]) -> Result<Command, ParseError> {
    let mode = expect_word(tokens, 0, "ON or OFF")?;
    match mode.text.to_ascii_uppercase().as_str() {
        "ON" => Ok(Command::Debug(true)),
        "OFF" => Ok(Command::Debug(false)),
        _ => Err(ParseError::new("expected ON or OFF", mode.pos)),
    }
}

fn parse_dump(tokens: &[Token]) -> Result<Command, ParseError> {
    let action = expect_word(tokens, 0, "SAVE, LOAD, VERIFY, or INFO")?;
    let path = tokens.get(1).map(|t| t.text.clone());
    let target = match action.text.to_ascii_uppercase().as_str() {
        "SAVE" => DumpTarget::Save,
        "LOAD" => DumpTarget::Load,
        "VERIFY" => DumpTarget::Verify,
        "INFO" => DumpTarget::Info,
        other => return Err(ParseError::new(format!("unknown DUMP action '{other}'"), action.pos)),
    };
    Ok(Command::Dump { target, path })
}

fn parse_replication(tokens: &[Token]) -> Result<Command, ParseError> {
    let action = expect_word(tokens, 0, "STATUS, START, or STOP")?;
    match action.text.to_ascii_uppercase().as_str() {
        "STATUS" => Ok(Command::ReplicationStatus),
        "START" => Ok(Command::ReplicationStart),
        "STOP" => Ok(Command::ReplicationStop),
        other => Err(ParseError::new(format!("unknown REPLICATION action '{other}'"), action.pos)),
    }
}

fn parse_sync(tokens: &[Token]) -> Result<Command, ParseError> {
    let first = expect_word(tokens, 0, "table name or STATUS")?;
    if first.text.eq_ignore_ascii_case("STATUS") {
        Ok(Command::SyncStatus)
    } else {
        Ok(Command::Sync { table: first.text.clone() })
    }
}

fn parse_cache(tokens: &[Token]) -> Result<Command, ParseError> {
    let action = expect_word(tokens, 0, "STATS, CLEAR, ENABLE, or DISABLE")?;
    match action.text.to_ascii_uppercase().as_str() {
        "STATS" => Ok(Command::CacheStats),
        "CLEAR" => Ok(Command::CacheClear),
        "ENABLE" => Ok(Command::CacheEnable),
        "DISABLE" => Ok(Command::CacheDisable),
        other => Err(ParseError::new(format!("unknown CACHE action '{other}'"), action.pos)),
    }
}

fn parse_set(tokens: &[Token]) -> Result<Command, ParseError> {
    // "SET varname=value (, varname=value)*" — the protocol allows the
    // `=` to be glued to its operands (unlike FILTER's operators) since
    // that is how the source's `SET` line is conventionally written.
    let joined = tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
    let mut assignments = Vec::new();
    for part in joined.split(',') {
        let part = part.trim();
        let mut kv = part.splitn(2, '=');
        let key = kv.next().unwrap_or("").trim();
        let value = kv.next().ok_or_else(|| ParseError::new("expected var=value", 0))?.trim();
        if key.is_empty() {
            return Err(ParseError::new("expected var=value", 0));
        }
        assignments.push((key.to_string(), value.to_string()));
    }
    if assignments.is_empty() {
        return Err(ParseError::new("SET requires at least one assignment", 0));
    }
    Ok(Command::Set(assignments))
}

fn parse_show(tokens: &[Token]) -> Result<Command, ParseError> {
    let what = expect_word(tokens, 0, "VARIABLES")?;
    if !what.text.eq_ignore_ascii_case("VARIABLES") {
        return Err(ParseError::new("expected VARIABLES", what.pos));
    }
    if tokens.len() >= 3 && tokens[1].text.eq_ignore_ascii_case("LIKE") {
        Ok(Command::ShowVariables(Some(tokens[2].text.clone())))
    } else {
        Ok(Command::ShowVariables(None))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cfg() -> ParserConfig {
        ParserConfig { default_limit: 20 }
    }

    #[test]
    fn parses_plain_search() {
        let cmd = parse_command("SEARCH posts hello", &cfg()).unwrap();
        match cmd {
            Command::Search { table, clauses, .. } => {
                assert_eq!(table, "posts");
                assert_eq!(clauses.limit, 20);
                assert!(clauses.limit_defaulted);
            }
            _ => panic!("expected Search"),
        }
    }

    #[test]
    fn parses_and_not() {
        let cmd = parse_command("SEARCH posts machine AND learning NOT advanced", &cfg()).unwrap();
        match cmd {
            Command::Search { expr, .. } => {
                let words: Vec<&str> = expr.leaves().into_iter().map(|t| t.text()).collect();
                assert_eq!(words, vec!["machine", "learning", "advanced"]);
            }
            _ => panic!("expected Search"),
        }
    }

    #[test]
    fn parses_quoted_phrase() {
        let cmd = parse_command(r#"SEARCH posts "machine learning""#, &cfg()).unwrap();
        match cmd {
            Command::Search { expr, .. } => {
                assert_eq!(expr, BooleanExpr::leaf(Term::Phrase("machine learning".to_string())));
            }
            _ => panic!("expected Search"),
        }
    }

    #[test]
    fn parses_filter_sort_limit_offset() {
        let cmd = parse_command("SEARCH posts hello FILTER status = 1 SORT pk ASC LIMIT 5 OFFSET 10", &cfg()).unwrap();
        match cmd {
            Command::Search { clauses, .. } => {
                assert!(clauses.filter.is_some());
                assert!(!clauses.sort.descending);
                assert_eq!(clauses.limit, 5);
                assert_eq!(clauses.offset, 10);
            }
            _ => panic!("expected Search"),
        }
    }

    #[test]
    fn parses_count() {
        let cmd = parse_command("COUNT posts hello", &cfg()).unwrap();
        assert!(matches!(cmd, Command::Count { .. }));
    }

    #[test]
    fn parses_get() {
        let cmd = parse_command("GET posts pk1", &cfg()).unwrap();
        match cmd {
            Command::Get { table, pk } => {
                assert_eq!(table, "posts");
                assert_eq!(pk, "pk1");
            }
            _ => panic!("expected Get"),
        }
    }

    #[test]
    fn parses_set_multi_assignment() {
        let cmd = parse_command("SET logging.level=debug, cache.enabled=true", &cfg()).unwrap();
        match cmd {
            Command::Set(pairs) => {
                assert_eq!(pairs, vec![
                    ("logging.level".to_string(), "debug".to_string()),
                    ("cache.enabled".to_string(), "true".to_string()),
                ]);
            }
            _ => panic!("expected Set"),
        }
    }

    #[test]
    fn parses_show_variables_like() {
        let cmd = parse_command("SHOW VARIABLES LIKE cache.%", &cfg()).unwrap();
        assert!(matches!(cmd, Command::ShowVariables(Some(_))));
    }

    #[test]
    fn unknown_command_is_parse_error() {
        let err = parse_command("FROBNICATE posts", &cfg()).unwrap_err();
        assert!(err.kind.contains("unknown command"));
    }

    #[test]
    fn unterminated_phrase_reports_position() {
        let err = parse_command(r#"SEARCH posts "oops"#, &cfg()).unwrap_err();
        assert_eq!(err.kind, "unterminated phrase");
    }
}
