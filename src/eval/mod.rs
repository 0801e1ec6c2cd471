//! Expression evaluator: walks an [`Expression`](crate::config::expr::Expression)
//! tree against a [`Scope`] and the [`crate::functions`] registry to produce a
//! [`DynValue`].
//!
//! Grounded on the recursive-descent shape of
//! `so0k-oxid::dag::validation::check_expression`, generalized from a
//! validity check into a value-producing walk. Deliberately self-contained
//! rather than reaching for `hcl-rs`'s own `eval` module, since the chosen
//! third-party parser is only used here for its AST, never for evaluation.

use std::collections::BTreeMap;

use crate::config::expr::{BinOp, Expression, TemplatePart, UnaryOp};
use crate::error::{CoreError, CoreResult};
use crate::functions::FunctionRegistry;
use crate::value::DynValue;

/// The bound symbol roots available while evaluating one configuration
/// (spec §4.7 stage 5): `var`, `local`, `dependency`, `include`, `feature`,
/// plus a flat `path`/`module`-style map of miscellaneous bindings.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub roots: BTreeMap<String, DynValue>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, root: impl Into<String>, value: DynValue) -> &mut Self {
        self.roots.insert(root.into(), value);
        self
    }

    pub fn bind_map(&mut self, root: impl Into<String>, entries: BTreeMap<String, DynValue>) -> &mut Self {
        self.roots.insert(root.into(), DynValue::Object(entries));
        self
    }

    fn resolve(&self, path: &[String]) -> CoreResult<DynValue> {
        let Some((root, rest)) = path.split_first() else {
            return Ok(DynValue::Null);
        };
        let Some(value) = self.roots.get(root) else {
            return Ok(DynValue::Unknown("any".to_string()));
        };
        match value.get_path(rest) {
            Some(v) => Ok(v.clone()),
            None if rest.is_empty() => Ok(value.clone()),
            None => Ok(DynValue::Unknown("any".to_string())),
        }
    }
}

/// Evaluate an expression tree to a concrete [`DynValue`].
pub fn eval(expr: &Expression, scope: &Scope, functions: &FunctionRegistry) -> CoreResult<DynValue> {
    match expr {
        Expression::Literal(v) => Ok(v.clone()),
        Expression::Reference(path) => scope.resolve(path),
        Expression::Template(parts) => eval_template(parts, scope, functions),
        Expression::FunctionCall { name, args } => {
            let values = args
                .iter()
                .map(|a| eval(a, scope, functions))
                .collect::<CoreResult<Vec<_>>>()?;
            functions.call(name, &values)
        }
        Expression::Conditional {
            condition,
            true_val,
            false_val,
        } => {
            let cond = eval(condition, scope, functions)?;
            if truthy(&cond) {
                eval(true_val, scope, functions)
            } else {
                eval(false_val, scope, functions)
            }
        }
        Expression::BinaryOp { op, left, right } => {
            let l = eval(left, scope, functions)?;
            let r = eval(right, scope, functions)?;
            eval_binop(*op, &l, &r)
        }
        Expression::UnaryOp { op, operand } => {
            let v = eval(operand, scope, functions)?;
            eval_unaryop(*op, &v)
        }
        Expression::Index { collection, key } => {
            let c = eval(collection, scope, functions)?;
            let k = eval(key, scope, functions)?;
            eval_index(&c, &k)
        }
        Expression::GetAttr { object, name } => {
            let obj = eval(object, scope, functions)?;
            Ok(obj.get_path(std::slice::from_ref(name)).cloned().unwrap_or(DynValue::Null))
        }
        Expression::ForExpr {
            collection,
            key_var,
            val_var,
            key_expr,
            value_expr,
            condition,
            grouping,
        } => eval_for(
            collection, key_var, val_var, key_expr, value_expr, condition, *grouping, scope, functions,
        ),
        Expression::Splat { source, each } => {
            let src = eval(source, scope, functions)?;
            let items = src.as_list().unwrap_or(&[]).to_vec();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let mut inner = scope.clone();
                inner.bind("*", item);
                out.push(eval(each, &inner, functions)?);
            }
            Ok(DynValue::Tuple(out))
        }
    }
}

fn eval_template(parts: &[TemplatePart], scope: &Scope, functions: &FunctionRegistry) -> CoreResult<DynValue> {
    let mut out = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(s) => out.push_str(s),
            TemplatePart::Interpolation(expr) | TemplatePart::Directive(expr) => {
                out.push_str(&to_display_string(&eval(expr, scope, functions)?));
            }
        }
    }
    Ok(DynValue::String(out))
}

fn to_display_string(v: &DynValue) -> String {
    match v {
        DynValue::String(s) => s.clone(),
        DynValue::Number(n) => n.to_string(),
        DynValue::Bool(b) => b.to_string(),
        DynValue::Null => String::new(),
        other => format!("{other:?}"),
    }
}

fn truthy(v: &DynValue) -> bool {
    match v {
        DynValue::Bool(b) => *b,
        DynValue::Null => false,
        DynValue::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn as_number(v: &DynValue) -> CoreResult<f64> {
    match v {
        DynValue::Number(n) => Ok(*n),
        other => Err(CoreError::InvalidParameterType {
            expected: "number".to_string(),
            actual: format!("{other:?}"),
        }),
    }
}

fn eval_binop(op: BinOp, l: &DynValue, r: &DynValue) -> CoreResult<DynValue> {
    use BinOp::*;
    Ok(match op {
        Add => DynValue::Number(as_number(l)? + as_number(r)?),
        Sub => DynValue::Number(as_number(l)? - as_number(r)?),
        Mul => DynValue::Number(as_number(l)? * as_number(r)?),
        Div => DynValue::Number(as_number(l)? / as_number(r)?),
        Mod => DynValue::Number(as_number(l)? % as_number(r)?),
        Eq => DynValue::Bool(l == r),
        NotEq => DynValue::Bool(l != r),
        Lt => DynValue::Bool(as_number(l)? < as_number(r)?),
        Lte => DynValue::Bool(as_number(l)? <= as_number(r)?),
        Gt => DynValue::Bool(as_number(l)? > as_number(r)?),
        Gte => DynValue::Bool(as_number(l)? >= as_number(r)?),
        And => DynValue::Bool(truthy(l) && truthy(r)),
        Or => DynValue::Bool(truthy(l) || truthy(r)),
    })
}

fn eval_unaryop(op: UnaryOp, v: &DynValue) -> CoreResult<DynValue> {
    Ok(match op {
        UnaryOp::Neg => DynValue::Number(-as_number(v)?),
        UnaryOp::Not => DynValue::Bool(!truthy(v)),
    })
}

fn eval_index(collection: &DynValue, key: &DynValue) -> CoreResult<DynValue> {
    match (collection, key) {
        (DynValue::List(items) | DynValue::Set(items) | DynValue::Tuple(items), DynValue::Number(n)) => {
            Ok(items.get(*n as usize).cloned().unwrap_or(DynValue::Null))
        }
        (DynValue::Map(m) | DynValue::Object(m), DynValue::String(k)) => {
            Ok(m.get(k).cloned().unwrap_or(DynValue::Null))
        }
        _ => Ok(DynValue::Null),
    }
}

#[allow(clippy::too_many_arguments)]
fn eval_for(
    collection: &Expression,
    key_var: &Option<String>,
    val_var: &str,
    key_expr: &Option<Box<Expression>>,
    value_expr: &Expression,
    condition: &Option<Box<Expression>>,
    grouping: bool,
    scope: &Scope,
    functions: &FunctionRegistry,
) -> CoreResult<DynValue> {
    let source = eval(collection, scope, functions)?;
    let pairs: Vec<(DynValue, DynValue)> = match &source {
        DynValue::List(items) | DynValue::Set(items) | DynValue::Tuple(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (DynValue::Number(i as f64), v.clone()))
            .collect(),
        DynValue::Map(m) | DynValue::Object(m) => {
            m.iter().map(|(k, v)| (DynValue::String(k.clone()), v.clone())).collect()
        }
        _ => Vec::new(),
    };

    if key_expr.is_some() {
        let mut out = BTreeMap::new();
        for (k, v) in pairs {
            let mut inner = scope.clone();
            if let Some(kv) = key_var {
                inner.bind(kv.clone(), k.clone());
            }
            inner.bind(val_var.to_string(), v);
            if let Some(cond) = condition {
                if !truthy(&eval(cond, &inner, functions)?) {
                    continue;
                }
            }
            let key = eval(key_expr.as_ref().unwrap(), &inner, functions)?;
            let key_str = to_display_string(&key);
            let value = eval(value_expr, &inner, functions)?;
            if grouping {
                out.entry(key_str)
                    .and_modify(|existing: &mut DynValue| {
                        if let DynValue::List(list) = existing {
                            list.push(value.clone());
                        }
                    })
                    .or_insert_with(|| DynValue::List(vec![value.clone()]));
            } else {
                out.insert(key_str, value);
            }
        }
        Ok(DynValue::Object(out))
    } else {
        let mut out = Vec::new();
        for (k, v) in pairs {
            let mut inner = scope.clone();
            if let Some(kv) = key_var {
                inner.bind(kv.clone(), k);
            }
            inner.bind(val_var.to_string(), v);
            if let Some(cond) = condition {
                if !truthy(&eval(cond, &inner, functions)?) {
                    continue;
                }
            }
            out.push(eval(value_expr, &inner, functions)?);
        }
        Ok(DynValue::List(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;

    fn scope_with_var(name: &str, value: DynValue) -> Scope {
        let mut scope = Scope::new();
        let mut m = BTreeMap::new();
        m.insert(name.to_string(), value);
        scope.bind_map("local", m);
        scope
    }

    #[test]
    fn resolves_reference_from_scope() {
        let scope = scope_with_var("region", DynValue::String("us-east-1".to_string()));
        let functions = FunctionRegistry::with_no_session_hooks();
        let expr = Expression::Reference(vec!["local".to_string(), "region".to_string()]);
        assert_eq!(
            eval(&expr, &scope, &functions).unwrap(),
            DynValue::String("us-east-1".to_string())
        );
    }

    #[test]
    fn evaluates_arithmetic() {
        let scope = Scope::new();
        let functions = FunctionRegistry::with_no_session_hooks();
        let expr = Expression::BinaryOp {
            op: BinOp::Add,
            left: Box::new(Expression::Literal(DynValue::Number(1.0))),
            right: Box::new(Expression::Literal(DynValue::Number(2.0))),
        };
        assert_eq!(eval(&expr, &scope, &functions).unwrap(), DynValue::Number(3.0));
    }

    #[test]
    fn conditional_picks_branch() {
        let scope = Scope::new();
        let functions = FunctionRegistry::with_no_session_hooks();
        let expr = Expression::Conditional {
            condition: Box::new(Expression::Literal(DynValue::Bool(false))),
            true_val: Box::new(Expression::Literal(DynValue::Number(1.0))),
            false_val: Box::new(Expression::Literal(DynValue::Number(2.0))),
        };
        assert_eq!(eval(&expr, &scope, &functions).unwrap(), DynValue::Number(2.0));
    }

    #[test]
    fn for_expr_produces_object_with_key_expr() {
        let scope = Scope::new();
        let functions = FunctionRegistry::with_no_session_hooks();
        let expr = Expression::ForExpr {
            collection: Box::new(Expression::Literal(DynValue::List(vec![
                DynValue::String("a".to_string()),
                DynValue::String("b".to_string()),
            ]))),
            key_var: None,
            val_var: "v".to_string(),
            key_expr: Some(Box::new(Expression::Reference(vec!["v".to_string()]))),
            value_expr: Box::new(Expression::Reference(vec!["v".to_string()])),
            condition: None,
            grouping: false,
        };
        let result = eval(&expr, &scope, &functions).unwrap();
        let m = result.as_map().unwrap();
        assert_eq!(m.get("a"), Some(&DynValue::String("a".to_string())));
    }
}
