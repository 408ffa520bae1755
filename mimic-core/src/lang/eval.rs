//! Tree-walking evaluator for task actions and condition expressions.
//!
//! Scalar semantics follow the record model: Int⊕Int stays Int except
//! division (always Float), mixed Int/Float widens, `+` concatenates
//! strings, division/modulo by zero is an error. Reading an absent key is
//! an error; callers decide whether that aborts (actions), is swallowed
//! (guards, condition triggers), or surfaces (state termination conditions).

use std::collections::BTreeMap;

use super::ast::{BinaryOp, Expr, PathRoot, Program, Stmt, Target, UnaryOp};
use crate::error::{Error, Result};
use crate::task::TaskContext;
use crate::types::{Record, Value};

// ─── Read environments ────────────────────────────────────────

/// Read-only view an expression evaluates against.
trait Env {
    fn read(&self, root: PathRoot, key: &str) -> Result<Value>;
    fn read_local(&self, name: &str) -> Result<Value>;
    fn current_time(&self) -> Result<Value>;
}

fn missing(root: &str, key: &str) -> Error {
    Error::Expr(format!("'{root}' has no field '{key}'"))
}

/// Full task scope: the three records plus locals and event extras.
struct TaskEnv<'a, 'b> {
    ctx: &'b TaskContext<'a>,
    locals: &'b BTreeMap<String, Value>,
}

impl Env for TaskEnv<'_, '_> {
    fn read(&self, root: PathRoot, key: &str) -> Result<Value> {
        let record = match root {
            PathRoot::Inputs => Some(self.ctx.inputs),
            PathRoot::Outputs => Some(&*self.ctx.outputs),
            PathRoot::State => Some(&*self.ctx.state),
            PathRoot::Event => self.ctx.event_data(),
        };
        let record = record
            .ok_or_else(|| Error::Expr("'event' data is not available here".to_string()))?;
        record
            .get(key)
            .cloned()
            .ok_or_else(|| missing(root.keyword(), key))
    }

    fn read_local(&self, name: &str) -> Result<Value> {
        self.locals
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Expr(format!("undefined variable '{name}'")))
    }

    fn current_time(&self) -> Result<Value> {
        self.ctx
            .current_time()
            .map(Value::Float)
            .ok_or_else(|| Error::Expr("'current_time' is not available here".to_string()))
    }
}

/// Restricted scope for guards, condition triggers, and state termination
/// conditions: state reads plus (optionally) the clock.
pub(crate) struct CondScope<'a> {
    pub state: &'a Record,
    pub current_time: Option<f64>,
}

impl Env for CondScope<'_> {
    fn read(&self, root: PathRoot, key: &str) -> Result<Value> {
        match root {
            PathRoot::State => self
                .state
                .get(key)
                .cloned()
                .ok_or_else(|| missing("state", key)),
            other => Err(Error::Expr(format!(
                "'{}' is not available in a condition",
                other.keyword()
            ))),
        }
    }

    fn read_local(&self, name: &str) -> Result<Value> {
        Err(Error::Expr(format!(
            "undefined variable '{name}' in a condition"
        )))
    }

    fn current_time(&self) -> Result<Value> {
        self.current_time
            .map(Value::Float)
            .ok_or_else(|| Error::Expr("'current_time' is not available here".to_string()))
    }
}

/// Evaluate a condition expression against state (+ optional clock).
pub(crate) fn eval_condition(expr: &Expr, scope: &CondScope<'_>) -> Result<Value> {
    eval_expr(expr, scope)
}

// ─── Program execution ────────────────────────────────────────

/// Run a compiled task body against the context.
pub(crate) fn run_program(program: &Program, ctx: &mut TaskContext<'_>) -> Result<()> {
    let mut locals = BTreeMap::new();
    exec_block(&program.statements, ctx, &mut locals)
}

fn exec_block(
    stmts: &[Stmt],
    ctx: &mut TaskContext<'_>,
    locals: &mut BTreeMap<String, Value>,
) -> Result<()> {
    for stmt in stmts {
        exec_stmt(stmt, ctx, locals)?;
    }
    Ok(())
}

fn exec_stmt(
    stmt: &Stmt,
    ctx: &mut TaskContext<'_>,
    locals: &mut BTreeMap<String, Value>,
) -> Result<()> {
    match stmt {
        Stmt::Assign { target, value } => {
            let value = eval_in_task(value, ctx, locals)?;
            match target {
                Target::State(key) => {
                    ctx.state.insert(key.clone(), value);
                    ctx.written_state.insert(key.clone());
                }
                Target::Output(key) => {
                    ctx.outputs.insert(key.clone(), value);
                    ctx.written_outputs.insert(key.clone());
                }
                Target::Local(name) => {
                    locals.insert(name.clone(), value);
                }
            }
            Ok(())
        }

        Stmt::Emit {
            name,
            value,
            delay,
            priority,
        } => {
            let name = match eval_in_task(name, ctx, locals)? {
                Value::Str(s) => s,
                other => {
                    return Err(Error::Expr(format!(
                        "emit: event name must be a string, got {}",
                        other.type_name()
                    )))
                }
            };
            let data = value
                .as_ref()
                .map(|e| eval_in_task(e, ctx, locals))
                .transpose()?;
            let delay = match delay {
                Some(e) => {
                    let v = eval_in_task(e, ctx, locals)?;
                    v.as_f64().ok_or_else(|| {
                        Error::Expr(format!(
                            "emit: delay must be numeric, got {}",
                            v.type_name()
                        ))
                    })?
                }
                None => 0.0,
            };
            let priority = match priority {
                Some(e) => match eval_in_task(e, ctx, locals)? {
                    Value::Int(n) => n,
                    other => {
                        return Err(Error::Expr(format!(
                            "emit: priority must be an integer, got {}",
                            other.type_name()
                        )))
                    }
                },
                None => 0,
            };
            let emitter = ctx.emitter_mut().ok_or_else(|| {
                Error::Expr("emit is only available in event-driven execution".to_string())
            })?;
            emitter.emit(name, data, delay, priority);
            Ok(())
        }

        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            let branch = if eval_in_task(cond, ctx, locals)?.is_truthy() {
                then_body
            } else {
                else_body
            };
            exec_block(branch, ctx, locals)
        }
    }
}

fn eval_in_task(
    expr: &Expr,
    ctx: &TaskContext<'_>,
    locals: &BTreeMap<String, Value>,
) -> Result<Value> {
    eval_expr(expr, &TaskEnv { ctx, locals })
}

// ─── Expression evaluation ────────────────────────────────────

fn eval_expr(expr: &Expr, env: &dyn Env) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path { root, key } => env.read(*root, key),
        Expr::Local(name) => env.read_local(name),
        Expr::CurrentTime => env.current_time(),

        Expr::Unary { op, operand } => {
            let v = eval_expr(operand, env)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Value::Int(n) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| Error::Expr("integer overflow".to_string())),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(Error::Expr(format!(
                        "cannot negate a {}",
                        other.type_name()
                    ))),
                },
            }
        }

        Expr::Binary { op, lhs, rhs } => match op {
            // Short-circuit forms evaluate the right side lazily.
            BinaryOp::And => {
                let l = eval_expr(lhs, env)?;
                if !l.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(eval_expr(rhs, env)?.is_truthy()))
            }
            BinaryOp::Or => {
                let l = eval_expr(lhs, env)?;
                if l.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(eval_expr(rhs, env)?.is_truthy()))
            }
            _ => {
                let l = eval_expr(lhs, env)?;
                let r = eval_expr(rhs, env)?;
                apply_binary(*op, l, r)
            }
        },
    }
}

fn apply_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arith(op, l, r)
        }
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&l, &r)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                BinaryOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            }))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled with short-circuit"),
    }
}

fn arith(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    let type_err = || {
        Error::Expr(format!(
            "unsupported operand types for '{}': {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))
    };
    match (&l, &r) {
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => {
            Ok(Value::Str(format!("{a}{b}")))
        }
        (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            // unwraps cannot fail: both sides are numeric here
            let a = l.as_f64().unwrap();
            let b = r.as_f64().unwrap();
            float_arith(op, a, b)
        }
        _ => Err(type_err()),
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    let overflow = || Error::Expr("integer overflow".to_string());
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        // Division always widens to float, as in the source model.
        BinaryOp::Div => {
            if b == 0 {
                Err(Error::Expr("division by zero".to_string()))
            } else {
                Ok(Value::Float(a as f64 / b as f64))
            }
        }
        BinaryOp::Rem => {
            if b == 0 {
                Err(Error::Expr("modulo by zero".to_string()))
            } else {
                Ok(Value::Int(a % b))
            }
        }
        _ => unreachable!(),
    }
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div => {
            if b == 0.0 {
                Err(Error::Expr("division by zero".to_string()))
            } else {
                Ok(Value::Float(a / b))
            }
        }
        BinaryOp::Rem => {
            if b == 0.0 {
                Err(Error::Expr("modulo by zero".to_string()))
            } else {
                Ok(Value::Float(a % b))
            }
        }
        _ => unreachable!(),
    }
}

/// Equality: numeric compares across Int/Float; otherwise same-variant only.
/// Never errors — mismatched types are simply not equal.
fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            l.as_f64() == r.as_f64()
        }
        _ => false,
    }
}

/// Ordering: numeric across Int/Float, lexicographic for Str/Str.
fn compare(l: &Value, r: &Value) -> Result<std::cmp::Ordering> {
    match (l, r) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            // unwraps cannot fail: both sides are numeric here
            Ok(l.as_f64().unwrap().total_cmp(&r.as_f64().unwrap()))
        }
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(Error::Expr(format!(
            "cannot order {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parse_expression;

    fn eval_with_state(source: &str, state: &[(&str, Value)]) -> Result<Value> {
        let state: Record = state
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let expr = parse_expression(source).unwrap();
        eval_condition(
            &expr,
            &CondScope {
                state: &state,
                current_time: Some(3.0),
            },
        )
    }

    #[test]
    fn int_arithmetic_stays_integral_except_division() {
        assert_eq!(
            eval_with_state("state.a + state.b * 2", &[("a", Value::Int(1)), ("b", Value::Int(3))])
                .unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            eval_with_state("state.a / state.b", &[("a", Value::Int(3)), ("b", Value::Int(2))])
                .unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn string_concatenation_with_plus() {
        assert_eq!(
            eval_with_state(
                "state.a + \"-suffix\"",
                &[("a", Value::Str("prefix".into()))]
            )
            .unwrap(),
            Value::Str("prefix-suffix".into())
        );
    }

    #[test]
    fn comparisons_cross_int_and_float() {
        assert_eq!(
            eval_with_state("state.x > 10", &[("x", Value::Float(10.5))]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval_with_state("state.x == 10", &[("x", Value::Float(10.0))]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn short_circuit_skips_missing_reads() {
        // state.missing would error, but the left side already decides.
        assert_eq!(
            eval_with_state("false && state.missing", &[]).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval_with_state("true || state.missing", &[]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn missing_key_is_an_error() {
        assert!(eval_with_state("state.absent", &[]).is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(eval_with_state("state.a / 0", &[("a", Value::Int(1))]).is_err());
    }

    #[test]
    fn current_time_reads_the_clock() {
        assert_eq!(
            eval_with_state("current_time >= 3.0", &[]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn mismatched_equality_is_false_not_an_error() {
        assert_eq!(
            eval_with_state("state.a == \"1\"", &[("a", Value::Int(1))]).unwrap(),
            Value::Bool(false)
        );
    }
}
