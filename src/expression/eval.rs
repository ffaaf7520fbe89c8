use std::cell::RefCell;
use std::mem::discriminant;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::{Map, Value};

use super::parser::{AssignOp, BinaryOp, Expr, LogicalOp, Statement, UnaryOp};
use crate::error::ExprError;
use crate::scope::Scope;
use crate::value::{self, deep_eq, is_truthy, to_display, to_number};

pub(crate) struct Env<'a> {
    pub(crate) scope: Scope,
    pub(crate) locals: &'a Map<String, Value>,
    /// Scopes written by assignments, in write order.
    pub(crate) written: RefCell<Vec<Scope>>,
}

impl<'a> Env<'a> {
    pub(crate) fn new(scope: Scope, locals: &'a Map<String, Value>) -> Self {
        Self {
            scope,
            locals,
            written: RefCell::new(Vec::new()),
        }
    }

    fn record_write(&self, scope: Scope) {
        let mut written = self.written.borrow_mut();
        if !written.contains(&scope) {
            written.push(scope);
        }
    }
}

enum Operand {
    Value(Value),
    Scope(Scope),
}

impl Operand {
    fn into_value(self) -> Value {
        match self {
            Operand::Value(v) => v,
            Operand::Scope(_) => Value::Null,
        }
    }
}

fn parent_operand(scope: Scope) -> Operand {
    scope
        .parent()
        .map_or(Operand::Value(Value::Null), Operand::Scope)
}

fn key_of(index: &Value) -> String {
    match index {
        Value::Number(_) => to_display(index),
        Value::String(s) => s.clone(),
        other => to_display(other),
    }
}

pub(crate) fn evaluate(expr: &Expr, env: &Env<'_>) -> Result<Value, ExprError> {
    Ok(operand(expr, env)?.into_value())
}

fn operand(expr: &Expr, env: &Env<'_>) -> Result<Operand, ExprError> {
    let value = match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Ident(name) => {
            if let Some(local) = env.locals.get(name) {
                local.clone()
            } else if name == "$parent" {
                return Ok(parent_operand(env.scope));
            } else {
                env.scope.get(name)
            }
        }
        Expr::Member(base, name) => match operand(base, env)? {
            Operand::Scope(scope) if name == "$parent" => return Ok(parent_operand(scope)),
            Operand::Scope(scope) => scope.get(name),
            Operand::Value(v) => value::member(&v, name),
        },
        Expr::Index(base, index) => {
            let key = key_of(&evaluate(index, env)?);
            match operand(base, env)? {
                Operand::Scope(scope) => scope.get(&key),
                Operand::Value(v) => value::member(&v, &key),
            }
        }
        Expr::Call(callee, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            call(callee, &args, env)?
        }
        Expr::Unary(op, inner) => {
            let inner = evaluate(inner, env)?;
            match op {
                UnaryOp::Not => Value::Bool(!is_truthy(&inner)),
                UnaryOp::Neg => value::number(-to_number(&inner)),
                UnaryOp::Plus => value::number(to_number(&inner)),
            }
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, env)?;
            let right = evaluate(right, env)?;
            binary(*op, &left, &right)
        }
        Expr::Logical(op, left, right) => {
            let left = evaluate(left, env)?;
            let short_circuit = match op {
                LogicalOp::And => !is_truthy(&left),
                LogicalOp::Or => is_truthy(&left),
                LogicalOp::Nullish => !left.is_null(),
            };
            if short_circuit {
                left
            } else {
                evaluate(right, env)?
            }
        }
        Expr::Conditional(condition, then, otherwise) => {
            if is_truthy(&evaluate(condition, env)?) {
                evaluate(then, env)?
            } else {
                evaluate(otherwise, env)?
            }
        }
        Expr::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| evaluate(item, env))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Object(entries) => {
            let mut map = Map::new();
            for (key, entry) in entries {
                map.insert(key.clone(), evaluate(entry, env)?);
            }
            Value::Object(map)
        }
    };
    Ok(Operand::Value(value))
}

fn invoke(scope: Scope, name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let Some(f) = scope.function(name) else {
        return Err(ExprError::NotCallable {
            name: name.to_owned(),
        });
    };
    catch_unwind(AssertUnwindSafe(|| f(scope, args))).map_err(|_| ExprError::CallPanicked {
        name: name.to_owned(),
    })
}

fn call(callee: &Expr, args: &[Value], env: &Env<'_>) -> Result<Value, ExprError> {
    match callee {
        Expr::Ident(name) => invoke(env.scope, name, args),
        Expr::Member(base, method) => match operand(base, env)? {
            Operand::Scope(scope) => invoke(scope, method, args),
            Operand::Value(target) => call_method(&target, method, args),
        },
        _ => Err(ExprError::NotCallable {
            name: "<expression>".to_owned(),
        }),
    }
}

fn call_method(target: &Value, method: &str, args: &[Value]) -> Result<Value, ExprError> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
    let result = match (target, method) {
        (Value::Array(items), "includes") => Value::Bool(items.iter().any(|v| deep_eq(v, &arg(0)))),
        (Value::Array(items), "indexOf") => Value::from(
            items
                .iter()
                .position(|v| deep_eq(v, &arg(0)))
                .map_or(-1, |i| i as i64),
        ),
        (Value::Array(items), "join") => {
            let separator = args.first().map_or_else(|| ",".to_owned(), to_display);
            items
                .iter()
                .map(to_display)
                .collect::<Vec<_>>()
                .join(&separator)
                .into()
        }
        (Value::String(s), "includes") => Value::Bool(s.contains(&to_display(&arg(0)))),
        (Value::String(s), "indexOf") => Value::from(
            s.find(&to_display(&arg(0)))
                .map_or(-1, |byte| s[..byte].chars().count() as i64),
        ),
        (Value::String(s), "startsWith") => Value::Bool(s.starts_with(&to_display(&arg(0)))),
        (Value::String(s), "endsWith") => Value::Bool(s.ends_with(&to_display(&arg(0)))),
        (Value::String(s), "toUpperCase") => s.to_uppercase().into(),
        (Value::String(s), "toLowerCase") => s.to_lowercase().into(),
        (Value::String(s), "trim") => s.trim().into(),
        (Value::Number(_), "toFixed") => {
            let digits = to_number(&arg(0)).clamp(0.0, 20.0) as usize;
            format!("{:.*}", digits, to_number(target)).into()
        }
        (_, "toString") => to_display(target).into(),
        _ => {
            return Err(ExprError::NotCallable {
                name: method.to_owned(),
            });
        }
    };
    Ok(result)
}

fn relational(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => to_number(left).partial_cmp(&to_number(right)),
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    discriminant(left) == discriminant(right) && deep_eq(left, right)
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match op {
        BinaryOp::Add => {
            let concatenate = |v: &Value| !matches!(v, Value::Null | Value::Bool(_) | Value::Number(_));
            if concatenate(left) || concatenate(right) {
                Value::String(to_display(left) + &to_display(right))
            } else {
                value::number(to_number(left) + to_number(right))
            }
        }
        BinaryOp::Sub => value::number(to_number(left) - to_number(right)),
        BinaryOp::Mul => value::number(to_number(left) * to_number(right)),
        BinaryOp::Div => value::number(to_number(left) / to_number(right)),
        BinaryOp::Rem => value::number(to_number(left) % to_number(right)),
        BinaryOp::Lt => Value::Bool(relational(left, right) == Some(Less)),
        BinaryOp::Le => Value::Bool(matches!(relational(left, right), Some(Less | Equal))),
        BinaryOp::Gt => Value::Bool(relational(left, right) == Some(Greater)),
        BinaryOp::Ge => Value::Bool(matches!(relational(left, right), Some(Greater | Equal))),
        BinaryOp::Eq => Value::Bool(value::loose_eq(left, right)),
        BinaryOp::Ne => Value::Bool(!value::loose_eq(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(left, right)),
        BinaryOp::StrictNe => Value::Bool(!strict_eq(left, right)),
    }
}

/// Where an assignment lands: an explicitly routed scope (via `$parent`) or
/// the evaluation scope, the root name, and the nested path below it.
struct Place {
    routed: Option<Scope>,
    root: String,
    path: Vec<String>,
}

fn routed_scope(expr: &Expr, env: &Env<'_>) -> Option<Scope> {
    match expr {
        Expr::Ident(name) if name == "$parent" && !env.locals.contains_key(name) => {
            env.scope.parent()
        }
        Expr::Member(base, name) if name == "$parent" => routed_scope(base, env)?.parent(),
        _ => None,
    }
}

fn place(expr: &Expr, env: &Env<'_>) -> Result<Place, ExprError> {
    let (base, key) = match expr {
        Expr::Ident(name) if name.starts_with('$') && env.locals.contains_key(name) => {
            return Err(ExprError::InvalidAssignmentTarget);
        }
        Expr::Ident(name) if name == "$parent" => return Err(ExprError::InvalidAssignmentTarget),
        Expr::Ident(name) => {
            return Ok(Place {
                routed: None,
                root: name.clone(),
                path: Vec::new(),
            });
        }
        Expr::Member(base, name) => (base, name.clone()),
        Expr::Index(base, index) => (base, key_of(&evaluate(index, env)?)),
        _ => return Err(ExprError::InvalidAssignmentTarget),
    };
    if let Some(scope) = routed_scope(base, env) {
        return Ok(Place {
            routed: Some(scope),
            root: key,
            path: Vec::new(),
        });
    }
    let mut parent = place(base, env)?;
    parent.path.push(key);
    Ok(parent)
}

fn assign(target: &Expr, new_value: Value, env: &Env<'_>) -> Result<(), ExprError> {
    let Place { routed, root, path } = place(target, env)?;
    let scope = routed.unwrap_or(env.scope);
    if path.is_empty() {
        scope.set(&root, new_value);
        env.record_write(scope);
    } else {
        env.record_write(scope.owner_of(&root).unwrap_or(scope));
        scope.assign_path(&root, &path, new_value);
    }
    Ok(())
}

pub(crate) fn execute(statement: &Statement, env: &Env<'_>) -> Result<(), ExprError> {
    match statement {
        Statement::Expr(expr) => evaluate(expr, env).map(drop),
        Statement::Assign { target, op, value } => {
            let right = evaluate(value, env)?;
            let new_value = match op {
                AssignOp::Set => right,
                AssignOp::Add => binary(BinaryOp::Add, &evaluate(target, env)?, &right),
                AssignOp::Sub => binary(BinaryOp::Sub, &evaluate(target, env)?, &right),
                AssignOp::Mul => binary(BinaryOp::Mul, &evaluate(target, env)?, &right),
                AssignOp::Div => binary(BinaryOp::Div, &evaluate(target, env)?, &right),
            };
            assign(target, new_value, env)
        }
        Statement::Update { target, delta } => {
            let current = to_number(&evaluate(target, env)?);
            let current = if current.is_nan() { 0.0 } else { current };
            assign(target, value::number(current + delta), env)
        }
    }
}
