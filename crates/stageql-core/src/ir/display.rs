use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use super::{BinaryOp, Expr, SortKey};

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
        };
        f.write_str(op)
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} desc", self.expr)
        } else {
            write!(f, "{}", self.expr)
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(param) => write!(f, "${}", param.name()),
            Expr::Constant(value) => write!(f, "{value}"),
            Expr::Member { target, name, .. } => write!(f, "{target}.{name}"),
            Expr::Service(call) => write!(
                f,
                "{}::{}({})",
                call.capability(),
                call.method(),
                call.args().iter().join(", ")
            ),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Conditional { test, then, otherwise } => {
                write!(f, "if {test} then {then} else {otherwise}")
            }
            Expr::Convert { expr, to } => write!(f, "{expr} as {to}"),
            Expr::Object { name, fields } => write!(
                f,
                "{name} {{ {} }}",
                fields.iter().map(|(n, e)| format!("{n}: {e}")).join(", ")
            ),
            Expr::Scope { param, value, body } => {
                write!(f, "let ${} = {value} in {body}", param.name())
            }
            Expr::Project { source, param, body } => {
                write!(f, "{source}.map(|${}| {body})", param.name())
            }
            Expr::Filter {
                source,
                param,
                predicate,
            } => write!(f, "{source}.filter(|${}| {predicate})", param.name()),
            Expr::Find {
                source,
                param,
                predicate,
            } => write!(f, "{source}.find(|${}| {predicate})", param.name()),
            Expr::Sort { source, param, keys } => {
                write!(f, "{source}.sort_by(|${}| {})", param.name(), keys.iter().join(", "))
            }
            Expr::Slice { source, skip, take } => match take {
                Some(take) => write!(f, "{source}.slice({skip}, {take})"),
                None => write!(f, "{source}.slice({skip})"),
            },
        }
    }
}
