//! nom parser for the action & expression language.
//!
//! Whitespace (including newlines) and `#` line comments are insignificant;
//! statements are juxtaposed with an optional `;` separator. Operator
//! precedence, loosest to tightest: `||`/`or`, `&&`/`and`, comparisons
//! (non-chaining), `+ -`, `* / %`, unary `- ! not`.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, satisfy},
    combinator::{all_consuming, cut, map, map_opt, not, opt, recognize, value},
    error::{context, convert_error, ContextError, ParseError as NomParseError, VerboseError},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::ast::*;
use crate::types::Value;

// ============================================================================
// Public API
// ============================================================================

/// Parse a complete task body.
pub fn parse_program(input: &str) -> Result<Program, String> {
    match all_consuming(program::<VerboseError<&str>>)(input) {
        Ok((_, prog)) => Ok(prog),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(convert_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err("Incomplete input".to_string()),
    }
}

/// Parse a single boolean/scalar expression (guards, triggers, termination).
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    match all_consuming(delimited(sc::<VerboseError<&str>>, expression, sc))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(convert_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err("Incomplete input".to_string()),
    }
}

// ============================================================================
// Lexical helpers
// ============================================================================

/// Space consumer: whitespace (newlines included) and `#` line comments.
fn sc<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, (), E> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(char('#'), take_while(|c| c != '\n'))),
        ))),
    )(input)
}

fn ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Match a keyword without eating the prefix of a longer identifier.
fn kw<'a, E: NomParseError<&'a str>>(
    word: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
    terminated(tag(word), not(satisfy(ident_char)))
}

fn identifier<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

const RESERVED: &[&str] = &[
    "inputs",
    "outputs",
    "state",
    "event",
    "current_time",
    "emit",
    "if",
    "else",
    "true",
    "false",
    "null",
    "and",
    "or",
    "not",
];

/// An identifier usable as a task-local variable name.
fn local_identifier<'a, E: NomParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, &'a str, E> {
    let (rest, name) = identifier(input)?;
    if RESERVED.contains(&name) {
        return Err(nom::Err::Error(E::from_error_kind(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    Ok((rest, name))
}

// ============================================================================
// Statements
// ============================================================================

fn program<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Program, E> {
    let (input, statements) = statements(input)?;
    Ok((input, Program { statements }))
}

fn statements<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Vec<Stmt>, E> {
    let (input, _) = sc(input)?;
    many0(terminated(statement, separator))(input)
}

/// Trailing whitespace and an optional `;` after a statement.
fn separator<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, (), E> {
    let (input, _) = sc(input)?;
    let (input, _) = opt(char(';'))(input)?;
    let (input, _) = sc(input)?;
    Ok((input, ()))
}

fn statement<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Stmt, E> {
    alt((if_stmt, emit_stmt, assign_stmt))(input)
}

fn assign_stmt<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Stmt, E> {
    let (input, target) = assign_target(input)?;
    let (input, _) = sc(input)?;
    // '=' but not '==' — the latter belongs to an expression, not a statement.
    let (input, _) = terminated(char('='), not(char('=')))(input)?;
    let (input, _) = sc(input)?;
    let (input, value) = cut(context("assignment value", expression))(input)?;
    Ok((input, Stmt::Assign { target, value }))
}

fn assign_target<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Target, E> {
    alt((
        map(
            preceded(pair(kw("state"), char('.')), cut(identifier)),
            |k: &str| Target::State(k.to_string()),
        ),
        map(
            preceded(pair(kw("outputs"), char('.')), cut(identifier)),
            |k: &str| Target::Output(k.to_string()),
        ),
        map(local_identifier, |k: &str| Target::Local(k.to_string())),
    ))(input)
}

fn emit_stmt<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Stmt, E> {
    let (input, _) = kw("emit")(input)?;
    let (input, _) = sc(input)?;
    let (input, _) = char('(')(input)?;
    let (input, _) = sc(input)?;
    let (input, name) = cut(context("event name", expression))(input)?;
    let (input, value_arg) = opt(preceded(comma, expression))(input)?;
    let (input, delay) = opt(preceded(comma, expression))(input)?;
    let (input, priority) = opt(preceded(comma, expression))(input)?;
    let (input, _) = sc(input)?;
    let (input, _) = cut(context("closing parenthesis", char(')')))(input)?;
    Ok((
        input,
        Stmt::Emit {
            name,
            value: value_arg,
            delay,
            priority,
        },
    ))
}

fn comma<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, char, E> {
    delimited(sc, char(','), sc)(input)
}

fn if_stmt<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Stmt, E> {
    let (input, _) = kw("if")(input)?;
    let (input, cond) = cut(context("if condition", preceded(sc, expression)))(input)?;
    let (input, then_body) = cut(block)(input)?;
    let (input, else_body) = opt(preceded(
        delimited(sc, kw("else"), sc),
        alt((block, map(if_stmt, |s| vec![s]))),
    ))(input)?;
    Ok((
        input,
        Stmt::If {
            cond,
            then_body,
            else_body: else_body.unwrap_or_default(),
        },
    ))
}

fn block<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Vec<Stmt>, E> {
    let (input, _) = sc(input)?;
    let (input, _) = char('{')(input)?;
    let (input, body) = statements(input)?;
    let (input, _) = cut(context("closing brace", char('}')))(input)?;
    Ok((input, body))
}

// ============================================================================
// Expressions
// ============================================================================

fn expression<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    or_expr(input)
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn or_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(pair(
        delimited(sc, alt((value(BinaryOp::Or, tag("||")), value(BinaryOp::Or, kw("or")))), sc),
        and_expr,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn and_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (input, first) = cmp_expr(input)?;
    let (input, rest) = many0(pair(
        delimited(
            sc,
            alt((value(BinaryOp::And, tag("&&")), value(BinaryOp::And, kw("and")))),
            sc,
        ),
        cmp_expr,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

/// Comparisons do not chain: `a < b < c` is a parse error at `< c`.
fn cmp_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (input, lhs) = add_expr(input)?;
    let (input, tail) = opt(pair(delimited(sc, cmp_op, sc), add_expr))(input)?;
    Ok(match tail {
        Some((op, rhs)) => (
            input,
            Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        ),
        None => (input, lhs),
    })
}

fn cmp_op<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, BinaryOp, E> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    ))(input)
}

fn add_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (input, first) = mul_expr(input)?;
    let (input, rest) = many0(pair(
        delimited(
            sc,
            alt((value(BinaryOp::Add, char('+')), value(BinaryOp::Sub, char('-')))),
            sc,
        ),
        mul_expr,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn mul_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (input, first) = unary_expr(input)?;
    let (input, rest) = many0(pair(
        delimited(
            sc,
            alt((
                value(BinaryOp::Mul, char('*')),
                value(BinaryOp::Div, char('/')),
                value(BinaryOp::Rem, char('%')),
            )),
            sc,
        ),
        unary_expr,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn unary_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    alt((
        map(preceded(pair(char('-'), sc), unary_expr), |e| Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(e),
        }),
        map(
            preceded(pair(terminated(char('!'), not(char('='))), sc), unary_expr),
            |e| Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(e),
            },
        ),
        map(preceded(pair(kw("not"), sc), unary_expr), |e| Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(e),
        }),
        atom,
    ))(input)
}

// ============================================================================
// Atoms
// ============================================================================

fn atom<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    alt((
        float_literal,
        int_literal,
        string_literal,
        value(Expr::Literal(Value::Bool(true)), kw("true")),
        value(Expr::Literal(Value::Bool(false)), kw("false")),
        value(Expr::Literal(Value::Null), kw("null")),
        value(Expr::CurrentTime, kw("current_time")),
        path,
        map(local_identifier, |k: &str| Expr::Local(k.to_string())),
        delimited(
            pair(char('('), sc),
            expression,
            pair(sc, cut(context("closing parenthesis", char(')')))),
        ),
    ))(input)
}

fn float_literal<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Expr, E> {
    map_opt(
        recognize(tuple((digit1, char('.'), digit1))),
        |s: &str| s.parse::<f64>().ok().map(|f| Expr::Literal(Value::Float(f))),
    )(input)
}

fn int_literal<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Expr, E> {
    map_opt(digit1, |s: &str| {
        s.parse::<i64>().ok().map(|n| Expr::Literal(Value::Int(n)))
    })(input)
}

fn string_literal<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Expr, E> {
    let (input, body) = delimited(
        char('"'),
        opt(escaped_transform(
            is_not("\\\""),
            '\\',
            alt((
                value("\\", char('\\')),
                value("\"", char('"')),
                value("\n", char('n')),
                value("\t", char('t')),
            )),
        )),
        char('"'),
    )(input)?;
    Ok((input, Expr::Literal(Value::Str(body.unwrap_or_default()))))
}

fn path<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (input, root) = alt((
        value(PathRoot::Inputs, kw("inputs")),
        value(PathRoot::Outputs, kw("outputs")),
        value(PathRoot::State, kw("state")),
        value(PathRoot::Event, kw("event")),
    ))(input)?;
    let (input, _) = char('.')(input)?;
    let (input, key) = cut(context("field name", identifier))(input)?;
    Ok((
        input,
        Expr::Path {
            root,
            key: key.to_string(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_chain() {
        let prog = parse_program(
            "count = state.count + inputs.inc\noutputs.count = count; state.count = count",
        )
        .unwrap();
        assert_eq!(prog.statements.len(), 3);
        assert!(matches!(
            &prog.statements[0],
            Stmt::Assign {
                target: Target::Local(name),
                ..
            } if name == "count"
        ));
        assert!(matches!(
            &prog.statements[1],
            Stmt::Assign {
                target: Target::Output(name),
                ..
            } if name == "count"
        ));
    }

    #[test]
    fn parses_emit_with_optional_args() {
        let prog = parse_program("emit(\"pong\", 42, 1.5, 0)").unwrap();
        match &prog.statements[0] {
            Stmt::Emit {
                name,
                value,
                delay,
                priority,
            } => {
                assert_eq!(*name, Expr::Literal(Value::Str("pong".into())));
                assert!(value.is_some() && delay.is_some() && priority.is_some());
            }
            other => panic!("expected emit, got {:?}", other),
        }

        let prog = parse_program("emit(\"tick\")").unwrap();
        assert!(matches!(
            &prog.statements[0],
            Stmt::Emit {
                value: None,
                delay: None,
                priority: None,
                ..
            }
        ));
    }

    #[test]
    fn parses_if_else_blocks() {
        let prog = parse_program(
            "if state.x > 10 { state.hit = true } else { state.hit = false; state.miss = true }",
        )
        .unwrap();
        match &prog.statements[0] {
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.len(), 2);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn precedence_binds_mul_over_add() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                rhs,
                ..
            } => assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. })),
            other => panic!("expected top-level add, got {:?}", other),
        }
    }

    #[test]
    fn word_operators_parse_like_symbols() {
        let a = parse_expression("state.x > 1 and not state.done").unwrap();
        let b = parse_expression("state.x > 1 && !state.done").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let prog = parse_program("# bump the counter\nstate.n = state.n + 1\n\n# done\n").unwrap();
        assert_eq!(prog.statements.len(), 1);
    }

    #[test]
    fn assignment_to_inputs_is_rejected() {
        assert!(parse_program("inputs.x = 1").is_err());
        assert!(parse_program("event.x = 1").is_err());
    }

    #[test]
    fn unknown_syntax_is_an_error() {
        assert!(parse_program("state.x += 1").is_err());
        assert!(parse_expression("state.").is_err());
        assert!(parse_expression("1 < 2 < 3").is_err());
    }
}
