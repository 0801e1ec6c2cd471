//! Expression AST bridging `hcl::Expression` into a form the evaluator
//! (`crate::eval`) can walk.
//!
//! Grounded directly on `so0k-oxid::config::types::Expression` and
//! `so0k-oxid::hcl::parser::hcl_expr_to_expression` — reused near verbatim
//! since the teacher's AST already covers everything the HCL dialect in
//! spec §6.1 needs (traversals, templates, conditionals, for-expressions,
//! splats, binary/unary operators).

use crate::value::DynValue;

/// Any value or computation appearing in an HCL attribute.
#[derive(Debug, Clone)]
pub enum Expression {
    Literal(DynValue),
    /// A reference path like `var.region`, `dependency.vpc.outputs.id`.
    Reference(Vec<String>),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        true_val: Box<Expression>,
        false_val: Box<Expression>,
    },
    ForExpr {
        collection: Box<Expression>,
        key_var: Option<String>,
        val_var: String,
        key_expr: Option<Box<Expression>>,
        value_expr: Box<Expression>,
        condition: Option<Box<Expression>>,
        grouping: bool,
    },
    Template(Vec<TemplatePart>),
    Index {
        collection: Box<Expression>,
        key: Box<Expression>,
    },
    GetAttr {
        object: Box<Expression>,
        name: String,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Splat {
        source: Box<Expression>,
        each: Box<Expression>,
    },
}

impl Default for Expression {
    fn default() -> Self {
        Expression::Literal(DynValue::Null)
    }
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Box<Expression>),
    Directive(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Convert an `hcl::Expression` (the raw AST from the third-party parser)
/// into our [`Expression`]. Mirrors
/// `so0k-oxid::hcl::parser::hcl_expr_to_expression` block for block.
pub fn from_hcl(expr: &hcl::Expression) -> Expression {
    match expr {
        hcl::Expression::Null => Expression::Literal(DynValue::Null),
        hcl::Expression::Bool(b) => Expression::Literal(DynValue::Bool(*b)),
        hcl::Expression::Number(n) => Expression::Literal(DynValue::Number(
            n.as_f64().unwrap_or_default(),
        )),
        hcl::Expression::String(s) => {
            if s.contains("${") {
                parse_template_string(s)
            } else {
                Expression::Literal(DynValue::String(s.clone()))
            }
        }
        hcl::Expression::Array(arr) => {
            Expression::Literal(DynValue::List(arr.iter().filter_map(expr_to_dyn).collect()))
        }
        hcl::Expression::Object(obj) => {
            let entries = obj
                .iter()
                .filter_map(|(k, v)| expr_to_dyn(v).map(|val| (object_key_to_string(k), val)))
                .collect();
            Expression::Literal(DynValue::Object(entries))
        }
        hcl::Expression::TemplateExpr(template) => parse_template_string(&template.to_string()),
        hcl::Expression::Variable(var) => {
            Expression::Reference(var.to_string().split('.').map(str::to_string).collect())
        }
        hcl::Expression::Traversal(traversal) => Expression::Reference(traversal_to_parts(traversal)),
        hcl::Expression::FuncCall(call) => Expression::FunctionCall {
            name: call.name.to_string(),
            args: call.args.iter().map(from_hcl).collect(),
        },
        hcl::Expression::Conditional(cond) => Expression::Conditional {
            condition: Box::new(from_hcl(&cond.cond_expr)),
            true_val: Box::new(from_hcl(&cond.true_expr)),
            false_val: Box::new(from_hcl(&cond.false_expr)),
        },
        hcl::Expression::Operation(op) => match op.as_ref() {
            hcl::expr::Operation::Unary(unary) => Expression::UnaryOp {
                op: match unary.operator {
                    hcl::expr::UnaryOperator::Neg => UnaryOp::Neg,
                    hcl::expr::UnaryOperator::Not => UnaryOp::Not,
                },
                operand: Box::new(from_hcl(&unary.expr)),
            },
            hcl::expr::Operation::Binary(binary) => Expression::BinaryOp {
                op: match binary.operator {
                    hcl::expr::BinaryOperator::Eq => BinOp::Eq,
                    hcl::expr::BinaryOperator::NotEq => BinOp::NotEq,
                    hcl::expr::BinaryOperator::Less => BinOp::Lt,
                    hcl::expr::BinaryOperator::LessEq => BinOp::Lte,
                    hcl::expr::BinaryOperator::Greater => BinOp::Gt,
                    hcl::expr::BinaryOperator::GreaterEq => BinOp::Gte,
                    hcl::expr::BinaryOperator::Plus => BinOp::Add,
                    hcl::expr::BinaryOperator::Minus => BinOp::Sub,
                    hcl::expr::BinaryOperator::Mul => BinOp::Mul,
                    hcl::expr::BinaryOperator::Div => BinOp::Div,
                    hcl::expr::BinaryOperator::Mod => BinOp::Mod,
                    hcl::expr::BinaryOperator::And => BinOp::And,
                    hcl::expr::BinaryOperator::Or => BinOp::Or,
                },
                left: Box::new(from_hcl(&binary.lhs_expr)),
                right: Box::new(from_hcl(&binary.rhs_expr)),
            },
        },
        hcl::Expression::ForExpr(for_expr) => Expression::ForExpr {
            collection: Box::new(from_hcl(&for_expr.collection_expr)),
            key_var: for_expr.key_var.as_ref().map(|v| v.to_string()),
            val_var: for_expr.value_var.to_string(),
            key_expr: for_expr.key_expr.as_ref().map(|e| Box::new(from_hcl(e))),
            value_expr: Box::new(from_hcl(&for_expr.value_expr)),
            condition: for_expr.cond_expr.as_ref().map(|e| Box::new(from_hcl(e))),
            grouping: for_expr.grouping,
        },
        hcl::Expression::Parenthesis(inner) => from_hcl(inner),
        _ => Expression::Literal(DynValue::String(format!("{expr:?}"))),
    }
}

fn traversal_to_parts(traversal: &hcl::expr::Traversal) -> Vec<String> {
    let mut parts = Vec::new();
    if let hcl::Expression::Variable(var) = &traversal.expr {
        parts.push(var.to_string());
    }
    for operator in &traversal.operators {
        match operator {
            hcl::expr::TraversalOperator::GetAttr(ident) => parts.push(ident.to_string()),
            hcl::expr::TraversalOperator::Index(idx) => {
                parts.push(format!("[{}]", expr_to_index_string(idx)))
            }
            hcl::expr::TraversalOperator::LegacyIndex(n) => parts.push(format!("[{n}]")),
            hcl::expr::TraversalOperator::AttrSplat | hcl::expr::TraversalOperator::FullSplat => {
                parts.push("[*]".to_string())
            }
        }
    }
    parts
}

fn expr_to_index_string(expr: &hcl::Expression) -> String {
    match expr {
        hcl::Expression::Number(n) => n.to_string(),
        hcl::Expression::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

fn object_key_to_string(key: &hcl::expr::ObjectKey) -> String {
    match key {
        hcl::expr::ObjectKey::Identifier(id) => id.to_string(),
        hcl::expr::ObjectKey::Expression(expr) => match expr {
            hcl::Expression::String(s) => s.clone(),
            other => format!("{other:?}"),
        },
        _ => String::new(),
    }
}

/// Best-effort literal conversion, used for array/object element positions
/// where a reference should be preserved as an interpolation marker rather
/// than dropped.
fn expr_to_dyn(expr: &hcl::Expression) -> Option<DynValue> {
    match from_hcl(expr) {
        Expression::Literal(v) => Some(v),
        Expression::Reference(parts) => Some(DynValue::String(format!("${{{}}}", parts.join(".")))),
        other => Some(DynValue::String(format!("{other:?}"))),
    }
}

fn parse_template_string(s: &str) -> Expression {
    let mut parts = Vec::new();
    let mut remaining = s;

    while let Some(start) = remaining.find("${") {
        if start > 0 {
            parts.push(TemplatePart::Literal(remaining[..start].to_string()));
        }
        if let Some(end) = remaining[start + 2..].find('}') {
            let reference = &remaining[start + 2..start + 2 + end];
            let ref_parts = reference.split('.').map(|s| s.trim().to_string()).collect();
            parts.push(TemplatePart::Interpolation(Box::new(Expression::Reference(ref_parts))));
            remaining = &remaining[start + 2 + end + 1..];
        } else {
            parts.push(TemplatePart::Literal(remaining.to_string()));
            remaining = "";
        }
    }

    if !remaining.is_empty() {
        parts.push(TemplatePart::Literal(remaining.to_string()));
    }

    if parts.len() == 1 {
        if let TemplatePart::Interpolation(expr) = &parts[0] {
            return (**expr).clone();
        }
    }

    Expression::Template(parts)
}

/// Convert a string attribute value directly to `Expression`, used for
/// simple `type = "..."` style attributes where we just want the raw text.
pub fn expr_to_plain_string(expr: &hcl::Expression) -> String {
    match expr {
        hcl::Expression::String(s) => s.clone(),
        hcl::Expression::Variable(v) => v.to_string(),
        hcl::Expression::Number(n) => n.to_string(),
        hcl::Expression::Bool(b) => b.to_string(),
        hcl::Expression::Null => "null".to_string(),
        hcl::Expression::Traversal(t) => traversal_to_parts(t).join("."),
        other => format!("{other:?}"),
    }
}

pub fn expr_to_bool(expr: &hcl::Expression) -> bool {
    matches!(expr, hcl::Expression::Bool(true))
}

pub fn expr_to_string_list(expr: &hcl::Expression) -> Vec<String> {
    match expr {
        hcl::Expression::Array(arr) => arr.iter().map(expr_to_plain_string).collect(),
        _ => Vec::new(),
    }
}
