//! Closed tree-walking evaluator for accepted capability source.
//!
//! This replaces native dynamic compilation: an accepted module is compiled
//! into a `Program` (one function definition plus its declared imports) and
//! every invocation walks the typed tree. The instruction set is exactly
//! what the evaluator implements; there is no escape hatch to the host.
//!
//! Runtime faults here are legitimate capability behavior (division by
//! zero, bad attribute, arity mismatch) and surface unchanged as
//! invocation failures. They are not sandbox rejections.

use crate::core::ast::{
    BinOpKind, BoolOpKind, CmpOpKind, Expr, FStringPart, FunctionDef, Module, Stmt, UnaryOpKind,
};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Hard ceiling on statements + expressions evaluated per invocation, so a
/// runaway `while` cannot wedge the host process.
const STEP_LIMIT: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    None,
    /// An imported module namespace, e.g. `math`.
    Module(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::None => "None",
            Value::Module(_) => "module",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::List(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
            Value::None => false,
            Value::Module(_) => true,
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Dict(
                map.iter()
                    .map(|(k, v)| (Value::Str(k.clone()), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => serde_json::json!(v),
            Value::Float(v) => serde_json::json!(v),
            Value::Str(s) => serde_json::json!(s),
            Value::Bool(b) => serde_json::json!(b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            Value::Dict(pairs) => {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    let key = match k {
                        Value::Str(s) => s.clone(),
                        other => other.to_string(),
                    };
                    map.insert(key, v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::None => serde_json::Value::Null,
            Value::Module(name) => serde_json::json!(format!("<module {name}>")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Dict(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::None => write!(f, "None"),
            Value::Module(name) => write!(f, "<module {name}>"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    NameError(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("division by zero")]
    ZeroDivision,
    #[error("'{name}' expects {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("attribute error: {0}")]
    AttributeError(String),
    #[error("index error: {0}")]
    IndexError(String),
    #[error("key error: {0}")]
    KeyError(String),
    #[error("evaluation exceeded {STEP_LIMIT} steps")]
    StepLimitExceeded,
    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("module contains no function definition")]
    NoDefinition,
    #[error("duplicate parameter name: {0}")]
    DuplicateParam(String),
}

/// A compiled capability: one function definition and its declared imports.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    func: FunctionDef,
    imports: Vec<String>,
}

impl Program {
    /// Compile a parsed module. The caller is expected to have run the
    /// sandbox first; this only enforces what execution itself requires.
    pub fn compile(module: &Module) -> Result<Program, CompileError> {
        let def = module
            .function_defs()
            .first()
            .cloned()
            .cloned()
            .ok_or(CompileError::NoDefinition)?;
        let mut seen = Vec::new();
        for param in &def.params {
            if seen.contains(&param.as_str()) {
                return Err(CompileError::DuplicateParam(param.clone()));
            }
            seen.push(param);
        }
        Ok(Program {
            func: def,
            imports: module.import_roots(),
        })
    }

    pub fn name(&self) -> &str {
        &self.func.name
    }

    /// Parameter names excluding the leading bound-context parameter.
    pub fn params(&self) -> &[String] {
        if self.func.params.is_empty() {
            &[]
        } else {
            &self.func.params[1..]
        }
    }

    /// Invoke with positional and keyword arguments. The leading context
    /// parameter is bound to `None`; no template reads it.
    pub fn invoke(&self, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, EvalError> {
        let params = self.params();
        if args.len() > params.len() {
            return Err(EvalError::ArityMismatch {
                name: self.func.name.clone(),
                expected: params.len(),
                got: args.len(),
            });
        }

        let mut env: FxHashMap<String, Value> = FxHashMap::default();
        if let Some(ctx) = self.func.params.first() {
            env.insert(ctx.clone(), Value::None);
        }
        for (param, value) in params.iter().zip(args.iter()) {
            env.insert(param.clone(), value.clone());
        }
        for (key, value) in kwargs {
            if !params.contains(key) {
                return Err(EvalError::TypeError(format!(
                    "unexpected keyword argument '{key}'"
                )));
            }
            if env.contains_key(key) {
                return Err(EvalError::TypeError(format!(
                    "got multiple values for argument '{key}'"
                )));
            }
            env.insert(key.clone(), value.clone());
        }
        for param in params {
            if !env.contains_key(param) {
                return Err(EvalError::TypeError(format!(
                    "missing argument '{param}'"
                )));
            }
        }
        for module in &self.imports {
            env.insert(module.clone(), Value::Module(module.clone()));
        }

        let mut interp = Interp { steps: 0 };
        match interp.exec_block(&self.func.body, &mut env)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Interp {
    steps: u64,
}

impl Interp {
    fn tick(&mut self) -> Result<(), EvalError> {
        self.steps += 1;
        if self.steps > STEP_LIMIT {
            Err(EvalError::StepLimitExceeded)
        } else {
            Ok(())
        }
    }

    fn exec_block(
        &mut self,
        stmts: &[Stmt],
        env: &mut FxHashMap<String, Value>,
    ) -> Result<Flow, EvalError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(
        &mut self,
        stmt: &Stmt,
        env: &mut FxHashMap<String, Value>,
    ) -> Result<Flow, EvalError> {
        self.tick()?;
        match stmt {
            Stmt::Return(value) => {
                let v = match value {
                    Some(e) => self.eval(e, env)?,
                    None => Value::None,
                };
                Ok(Flow::Return(v))
            }
            Stmt::Assign { target, value } => {
                let v = self.eval(value, env)?;
                env.insert(target.clone(), v);
                Ok(Flow::Normal)
            }
            Stmt::Expr(e) => {
                self.eval(e, env)?;
                Ok(Flow::Normal)
            }
            Stmt::If { branches, orelse } => {
                for (cond, block) in branches {
                    if self.eval(cond, env)?.truthy() {
                        return self.exec_block(block, env);
                    }
                }
                self.exec_block(orelse, env)
            }
            Stmt::For { target, iter, body } => {
                let iterable = self.eval(iter, env)?;
                let items = iterate(&iterable)?;
                for item in items {
                    env.insert(target.clone(), item);
                    match self.exec_block(body, env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, env)?.truthy() {
                    self.tick()?;
                    match self.exec_block(body, env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Pass => Ok(Flow::Normal),
            Stmt::Import(path) => {
                let root = path.split('.').next().unwrap_or(path).to_string();
                env.insert(root.clone(), Value::Module(root));
                Ok(Flow::Normal)
            }
            Stmt::Global(_) => Err(EvalError::Unsupported("global statement".to_string())),
            Stmt::FunctionDef(def) => Err(EvalError::Unsupported(format!(
                "nested function definition '{}'",
                def.name
            ))),
        }
    }

    fn eval(&mut self, expr: &Expr, env: &mut FxHashMap<String, Value>) -> Result<Value, EvalError> {
        self.tick()?;
        match expr {
            Expr::Name(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::NameError(name.clone())),
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Text(text) => out.push_str(text),
                        FStringPart::Expr(e) => {
                            let v = self.eval(e, env)?;
                            out.push_str(&v.to_string());
                        }
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, env)?);
                }
                Ok(Value::List(out))
            }
            Expr::Dict(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((self.eval(k, env)?, self.eval(v, env)?));
                }
                Ok(Value::Dict(out))
            }
            Expr::BinOp { op, left, right } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                binary_op(*op, &l, &r)
            }
            Expr::UnaryOp { op, operand } => {
                let v = self.eval(operand, env)?;
                match op {
                    UnaryOpKind::Neg => match v {
                        Value::Int(i) => Ok(Value::Int(-i)),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        Value::Bool(b) => Ok(Value::Int(-(b as i64))),
                        other => Err(EvalError::TypeError(format!(
                            "bad operand type for unary -: {}",
                            other.type_name()
                        ))),
                    },
                    UnaryOpKind::Not => Ok(Value::Bool(!v.truthy())),
                }
            }
            Expr::BoolOp { op, values } => {
                // Python semantics: return the deciding operand itself.
                let mut last = Value::None;
                for (i, value) in values.iter().enumerate() {
                    let v = self.eval(value, env)?;
                    let decided = match op {
                        BoolOpKind::And => !v.truthy(),
                        BoolOpKind::Or => v.truthy(),
                    };
                    if decided && i + 1 < values.len() {
                        return Ok(v);
                    }
                    last = v;
                }
                Ok(last)
            }
            Expr::Compare { left, rest } => {
                let mut prev = self.eval(left, env)?;
                for (op, next_expr) in rest {
                    let next = self.eval(next_expr, env)?;
                    if !compare(*op, &prev, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    prev = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { func, args } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg, env)?);
                }
                match func.as_ref() {
                    Expr::Name(name) => call_builtin(name, &arg_values),
                    Expr::Attribute { value, attr } => {
                        let receiver = self.eval(value, env)?;
                        call_method(&receiver, attr, &arg_values)
                    }
                    _ => Err(EvalError::TypeError(
                        "expression is not callable".to_string(),
                    )),
                }
            }
            Expr::Attribute { value, attr } => {
                let receiver = self.eval(value, env)?;
                module_constant(&receiver, attr)
            }
            Expr::Index { value, index } => {
                let receiver = self.eval(value, env)?;
                let idx = self.eval(index, env)?;
                index_value(&receiver, &idx)
            }
            Expr::Lambda { .. } => Err(EvalError::Unsupported("lambda expression".to_string())),
        }
    }
}

fn iterate(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(pairs) => Ok(pairs.iter().map(|(k, _)| k.clone()).collect()),
        other => Err(EvalError::TypeError(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(*b as i64 as f64),
        _ => None,
    }
}

fn binary_op(op: BinOpKind, l: &Value, r: &Value) -> Result<Value, EvalError> {
    use BinOpKind::*;
    match (op, l, r) {
        (Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Add, Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        (Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        (Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
        (Mod, Value::Int(_), Value::Int(0)) => Err(EvalError::ZeroDivision),
        (Mod, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.rem_euclid(*b))),
        (Div, _, _) => {
            // Python semantics: true division always yields a float.
            let (a, b) = numeric_pair(op, l, r)?;
            if b == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            Ok(Value::Float(a / b))
        }
        _ => {
            let (a, b) = numeric_pair(op, l, r)?;
            let out = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Mod => {
                    if b == 0.0 {
                        return Err(EvalError::ZeroDivision);
                    }
                    a.rem_euclid(b)
                }
                Div => unreachable!(),
            };
            Ok(Value::Float(out))
        }
    }
}

fn numeric_pair(op: BinOpKind, l: &Value, r: &Value) -> Result<(f64, f64), EvalError> {
    match (as_f64(l), as_f64(r)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EvalError::TypeError(format!(
            "unsupported operand types for {:?}: '{}' and '{}'",
            op,
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn value_cmp(l: &Value, r: &Value) -> Result<Ordering, EvalError> {
    if let (Some(a), Some(b)) = (as_f64(l), as_f64(r)) {
        return a.partial_cmp(&b).ok_or_else(|| {
            EvalError::TypeError("cannot order NaN".to_string())
        });
    }
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match value_cmp(x, y)? {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => Err(EvalError::TypeError(format!(
            "'<' not supported between '{}' and '{}'",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_f64(l), as_f64(r)) {
        return a == b;
    }
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Dict(a), Value::Dict(b)) => a == b,
        (Value::None, Value::None) => true,
        _ => false,
    }
}

fn compare(op: CmpOpKind, l: &Value, r: &Value) -> Result<bool, EvalError> {
    match op {
        CmpOpKind::Eq => Ok(values_equal(l, r)),
        CmpOpKind::NotEq => Ok(!values_equal(l, r)),
        CmpOpKind::Lt => Ok(value_cmp(l, r)? == Ordering::Less),
        CmpOpKind::LtE => Ok(value_cmp(l, r)? != Ordering::Greater),
        CmpOpKind::Gt => Ok(value_cmp(l, r)? == Ordering::Greater),
        CmpOpKind::GtE => Ok(value_cmp(l, r)? != Ordering::Less),
    }
}

fn index_value(receiver: &Value, index: &Value) -> Result<Value, EvalError> {
    match receiver {
        Value::List(items) => {
            let i = normalize_index(index, items.len())?;
            items
                .get(i)
                .cloned()
                .ok_or_else(|| EvalError::IndexError("list index out of range".to_string()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index, chars.len())?;
            chars
                .get(i)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| EvalError::IndexError("string index out of range".to_string()))
        }
        Value::Dict(pairs) => pairs
            .iter()
            .find(|(k, _)| values_equal(k, index))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EvalError::KeyError(index.to_string())),
        other => Err(EvalError::TypeError(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn normalize_index(index: &Value, len: usize) -> Result<usize, EvalError> {
    let raw = match index {
        Value::Int(i) => *i,
        other => {
            return Err(EvalError::TypeError(format!(
                "indices must be integers, not {}",
                other.type_name()
            )));
        }
    };
    let adjusted = if raw < 0 { raw + len as i64 } else { raw };
    if adjusted < 0 {
        return Err(EvalError::IndexError("index out of range".to_string()));
    }
    Ok(adjusted as usize)
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let arity = |expected: usize| -> Result<(), EvalError> {
        if args.len() != expected {
            Err(EvalError::ArityMismatch {
                name: name.to_string(),
                expected,
                got: args.len(),
            })
        } else {
            Ok(())
        }
    };

    match name {
        "len" => {
            arity(1)?;
            match &args[0] {
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Dict(pairs) => Ok(Value::Int(pairs.len() as i64)),
                other => Err(EvalError::TypeError(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            }
        }
        "sorted" => {
            arity(1)?;
            let mut items = match &args[0] {
                Value::List(items) => items.clone(),
                Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                other => {
                    return Err(EvalError::TypeError(format!(
                        "'{}' object is not iterable",
                        other.type_name()
                    )));
                }
            };
            let mut fault = None;
            items.sort_by(|a, b| match value_cmp(a, b) {
                Ok(ord) => ord,
                Err(e) => {
                    fault.get_or_insert(e);
                    Ordering::Equal
                }
            });
            match fault {
                Some(e) => Err(e),
                None => Ok(Value::List(items)),
            }
        }
        "reversed" => {
            arity(1)?;
            match &args[0] {
                Value::List(items) => {
                    Ok(Value::List(items.iter().rev().cloned().collect()))
                }
                Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
                other => Err(EvalError::TypeError(format!(
                    "'{}' object is not reversible",
                    other.type_name()
                ))),
            }
        }
        "min" | "max" => {
            let items: Vec<Value> = if args.len() == 1 {
                iterate(&args[0])?
            } else if args.len() >= 2 {
                args.to_vec()
            } else {
                return Err(EvalError::ArityMismatch {
                    name: name.to_string(),
                    expected: 1,
                    got: 0,
                });
            };
            let mut iter = items.into_iter();
            let mut best = iter.next().ok_or_else(|| {
                EvalError::TypeError(format!("{name}() arg is an empty sequence"))
            })?;
            for item in iter {
                let ord = value_cmp(&item, &best)?;
                let better = if name == "min" {
                    ord == Ordering::Less
                } else {
                    ord == Ordering::Greater
                };
                if better {
                    best = item;
                }
            }
            Ok(best)
        }
        "sum" => {
            arity(1)?;
            let items = iterate(&args[0])?;
            let mut acc = Value::Int(0);
            for item in items {
                acc = binary_op(BinOpKind::Add, &acc, &item)?;
            }
            Ok(acc)
        }
        "abs" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(i.abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(EvalError::TypeError(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        "str" => {
            arity(1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "int" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) => Ok(Value::Int(*f as i64)),
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| EvalError::TypeError(format!("invalid int literal: '{s}'"))),
                other => Err(EvalError::TypeError(format!(
                    "int() argument must not be '{}'",
                    other.type_name()
                ))),
            }
        }
        "float" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| EvalError::TypeError(format!("invalid float literal: '{s}'"))),
                other => Err(EvalError::TypeError(format!(
                    "float() argument must not be '{}'",
                    other.type_name()
                ))),
            }
        }
        "range" => {
            let (start, stop) = match args {
                [Value::Int(stop)] => (0, *stop),
                [Value::Int(start), Value::Int(stop)] => (*start, *stop),
                _ => {
                    return Err(EvalError::TypeError(
                        "range() expects one or two int arguments".to_string(),
                    ));
                }
            };
            Ok(Value::List((start..stop).map(Value::Int).collect()))
        }
        other => Err(EvalError::NameError(other.to_string())),
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Str(s) => match method {
            "upper" if args.is_empty() => Ok(Value::Str(s.to_uppercase())),
            "lower" if args.is_empty() => Ok(Value::Str(s.to_lowercase())),
            "strip" if args.is_empty() => Ok(Value::Str(s.trim().to_string())),
            other => Err(EvalError::AttributeError(format!(
                "'str' object has no method '{other}' with {} arguments",
                args.len()
            ))),
        },
        Value::Module(name) if name == "math" => {
            let one = || -> Result<f64, EvalError> {
                if args.len() != 1 {
                    return Err(EvalError::ArityMismatch {
                        name: format!("math.{method}"),
                        expected: 1,
                        got: args.len(),
                    });
                }
                as_f64(&args[0]).ok_or_else(|| {
                    EvalError::TypeError(format!(
                        "math.{method}() requires a number, got {}",
                        args[0].type_name()
                    ))
                })
            };
            match method {
                "sqrt" => {
                    let v = one()?;
                    if v < 0.0 {
                        return Err(EvalError::TypeError("math domain error".to_string()));
                    }
                    Ok(Value::Float(v.sqrt()))
                }
                "floor" => Ok(Value::Int(one()?.floor() as i64)),
                "ceil" => Ok(Value::Int(one()?.ceil() as i64)),
                other => Err(EvalError::AttributeError(format!(
                    "module 'math' has no callable '{other}'"
                ))),
            }
        }
        Value::Module(name) => Err(EvalError::AttributeError(format!(
            "module '{name}' has no callable attributes"
        ))),
        other => Err(EvalError::AttributeError(format!(
            "'{}' object has no method '{method}'",
            other.type_name()
        ))),
    }
}

fn module_constant(receiver: &Value, attr: &str) -> Result<Value, EvalError> {
    match receiver {
        Value::Module(name) if name == "math" => match attr {
            "pi" => Ok(Value::Float(std::f64::consts::PI)),
            "e" => Ok(Value::Float(std::f64::consts::E)),
            other => Err(EvalError::AttributeError(format!(
                "module 'math' has no attribute '{other}'"
            ))),
        },
        Value::Module(name) => Err(EvalError::AttributeError(format!(
            "module '{name}' has no readable attributes"
        ))),
        other => Err(EvalError::AttributeError(format!(
            "'{}' object has no attribute '{attr}'",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_module;

    fn program(src: &str) -> Program {
        let module = parse_module(src).expect("parse");
        Program::compile(&module).expect("compile")
    }

    #[test]
    fn addition_folds_left_to_right() {
        let p = program("def add(self, num1, num2):\n    return num1 + num2\n");
        let out = p.invoke(&[Value::Int(3), Value::Int(5)], &[]).expect("invoke");
        assert_eq!(out, Value::Int(8));
    }

    #[test]
    fn division_always_yields_float() {
        let p = program("def divide(self, a, b):\n    return a / b\n");
        let out = p.invoke(&[Value::Int(16), Value::Int(4)], &[]).expect("invoke");
        assert_eq!(out, Value::Float(4.0));
    }

    #[test]
    fn division_by_zero_is_a_runtime_fault() {
        let p = program("def divide(self, a, b):\n    return a / b\n");
        let err = p.invoke(&[Value::Int(1), Value::Int(0)], &[]).unwrap_err();
        assert_eq!(err, EvalError::ZeroDivision);
    }

    #[test]
    fn sorted_returns_a_new_list() {
        let p = program("def sort_list(self, input_list):\n    return sorted(input_list)\n");
        let out = p
            .invoke(
                &[Value::List(vec![Value::Int(4), Value::Int(2), Value::Int(1)])],
                &[],
            )
            .expect("invoke");
        assert_eq!(
            out,
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(4)])
        );
    }

    #[test]
    fn filter_loop_keeps_positives() {
        let src = "def filter_list(self, input_list):\n    kept = []\n    for item in input_list:\n        if item > 0:\n            kept = kept + [item]\n    return kept\n";
        let p = program(src);
        let out = p
            .invoke(
                &[Value::List(vec![
                    Value::Int(-2),
                    Value::Int(3),
                    Value::Int(0),
                    Value::Int(7),
                ])],
                &[],
            )
            .expect("invoke");
        assert_eq!(out, Value::List(vec![Value::Int(3), Value::Int(7)]));
    }

    #[test]
    fn fstring_renders_interpolations() {
        let p = program("def greet(self, name):\n    return f'Hello, {name}!'\n");
        let out = p.invoke(&[Value::Str("TAMA".to_string())], &[]).expect("invoke");
        assert_eq!(out, Value::Str("Hello, TAMA!".to_string()));
    }

    #[test]
    fn kwargs_bind_by_name() {
        let p = program("def subtract(self, a, b):\n    return a - b\n");
        let out = p
            .invoke(
                &[Value::Int(10)],
                &[("b".to_string(), Value::Int(4))],
            )
            .expect("invoke");
        assert_eq!(out, Value::Int(6));
    }

    #[test]
    fn unexpected_kwarg_is_rejected() {
        let p = program("def subtract(self, a, b):\n    return a - b\n");
        let err = p
            .invoke(&[Value::Int(1), Value::Int(2)], &[("c".to_string(), Value::Int(3))])
            .unwrap_err();
        assert!(matches!(err, EvalError::TypeError(_)));
    }

    #[test]
    fn runaway_while_hits_step_limit() {
        let p = program("def spin(self):\n    while True:\n        pass\n    return 1\n");
        let err = p.invoke(&[], &[]).unwrap_err();
        assert_eq!(err, EvalError::StepLimitExceeded);
    }

    #[test]
    fn math_import_exposes_constants_and_sqrt() {
        let src = "import math\ndef hyp(self, a, b):\n    return math.sqrt(a * a + b * b)\n";
        let p = program(src);
        let out = p.invoke(&[Value::Int(3), Value::Int(4)], &[]).expect("invoke");
        assert_eq!(out, Value::Float(5.0));
    }

    #[test]
    fn missing_binding_is_a_name_error() {
        let p = program("def f(self):\n    return missing\n");
        let err = p.invoke(&[], &[]).unwrap_err();
        assert_eq!(err, EvalError::NameError("missing".to_string()));
    }

    #[test]
    fn duplicate_params_fail_compile() {
        let module = parse_module("def f(self, a, a):\n    return a\n").expect("parse");
        let err = Program::compile(&module).unwrap_err();
        assert_eq!(err, CompileError::DuplicateParam("a".to_string()));
    }
}
