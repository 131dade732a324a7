//! Symbolic expression graph.
//!
//! An [`Expr`] describes a deferred computation over one or more placeholders
//! ([`Param`]). Selection fields build one expression each; the compiler turns
//! expressions into closures (see [`crate::compiler`]).
//!
//! ```text
//! selection tree ─► Expr per field ─► extract/substitute ─► Expr per stage ─► closure
//! ```

mod display;
mod extract;
mod service;
mod substitute;

use std::sync::atomic::{AtomicU32, Ordering};

use itertools::Itertools;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    Shared,
    capability::Capability,
    shape::{ScalarKind, Shape},
    value::Value,
};

pub use extract::{Extracted, extract};
pub use service::{ServiceCall, ServiceFn};
pub use substitute::substitute;

static NEXT_PARAM_ID: AtomicU32 = AtomicU32::new(0);

/// Process-unique placeholder identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(u32);

/// A placeholder standing for a value supplied at execution time.
///
/// Placeholders are shared by reference across a selection tree and compared
/// by identity, never by name.
#[derive(Debug)]
pub struct Param {
    id: ParamId,
    name: SmolStr,
    shape: Shape,
}

impl Param {
    pub fn new(name: impl Into<SmolStr>, shape: Shape) -> Shared<Param> {
        Shared::new(Self {
            id: ParamId(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            shape,
        })
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Param {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Param(Shared<Param>),
    Constant(Value),
    Member {
        target: Box<Expr>,
        name: SmolStr,
        shape: Shape,
    },
    Service(ServiceCall),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Convert {
        expr: Box<Expr>,
        to: ScalarKind,
    },
    /// Object materialization, fields in request order.
    Object {
        name: SmolStr,
        fields: Vec<(SmolStr, Expr)>,
    },
    /// Evaluates `value` once and binds it to `param` for `body`; null propagates.
    Scope {
        param: Shared<Param>,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// Element-wise projection of a list.
    Project {
        source: Box<Expr>,
        param: Shared<Param>,
        body: Box<Expr>,
    },
    Filter {
        source: Box<Expr>,
        param: Shared<Param>,
        predicate: Box<Expr>,
    },
    /// First element matching `predicate`, or null.
    Find {
        source: Box<Expr>,
        param: Shared<Param>,
        predicate: Box<Expr>,
    },
    Sort {
        source: Box<Expr>,
        param: Shared<Param>,
        keys: Vec<SortKey>,
    },
    Slice {
        source: Box<Expr>,
        skip: usize,
        take: Option<usize>,
    },
}

impl Expr {
    pub fn param(param: &Shared<Param>) -> Expr {
        Expr::Param(Shared::clone(param))
    }

    pub fn constant(value: impl Into<Value>) -> Expr {
        Expr::Constant(value.into())
    }

    pub fn service(call: ServiceCall) -> Expr {
        Expr::Service(call)
    }

    /// Member access; the member shape is taken from this expression's shape.
    pub fn member(self, name: impl Into<SmolStr>) -> Expr {
        let name = name.into();
        let shape = self.shape().member(&name).cloned().unwrap_or_default();
        self.member_as(name, shape)
    }

    pub fn member_as(self, name: impl Into<SmolStr>, shape: Shape) -> Expr {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
            shape,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, self, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::And, self, other)
    }

    pub fn conditional(test: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn convert(self, to: ScalarKind) -> Expr {
        Expr::Convert {
            expr: Box::new(self),
            to,
        }
    }

    pub fn scope(param: Shared<Param>, value: Expr, body: Expr) -> Expr {
        Expr::Scope {
            param,
            value: Box::new(value),
            body: Box::new(body),
        }
    }

    pub fn project_with(self, param: Shared<Param>, body: Expr) -> Expr {
        Expr::Project {
            source: Box::new(self),
            param,
            body: Box::new(body),
        }
    }

    /// `source.map(|name| body(name))`.
    pub fn project(self, name: &str, body: impl FnOnce(Expr) -> Expr) -> Expr {
        let param = self.element_param(name);
        let body = body(Expr::param(&param));
        self.project_with(param, body)
    }

    pub fn filter(self, name: &str, predicate: impl FnOnce(Expr) -> Expr) -> Expr {
        let param = self.element_param(name);
        let predicate = predicate(Expr::param(&param));
        Expr::Filter {
            source: Box::new(self),
            param,
            predicate: Box::new(predicate),
        }
    }

    pub fn find(self, name: &str, predicate: impl FnOnce(Expr) -> Expr) -> Expr {
        let param = self.element_param(name);
        let predicate = predicate(Expr::param(&param));
        Expr::Find {
            source: Box::new(self),
            param,
            predicate: Box::new(predicate),
        }
    }

    pub fn sort(self, name: &str, keys: impl FnOnce(Expr) -> Vec<SortKey>) -> Expr {
        let param = self.element_param(name);
        let keys = keys(Expr::param(&param));
        Expr::Sort {
            source: Box::new(self),
            param,
            keys,
        }
    }

    pub fn slice(self, skip: usize, take: Option<usize>) -> Expr {
        Expr::Slice {
            source: Box::new(self),
            skip,
            take,
        }
    }

    /// Fresh placeholder for one element of this (list) expression.
    pub fn element_param(&self, name: &str) -> Shared<Param> {
        Param::new(name, self.shape().element().cloned().unwrap_or_default())
    }

    /// Static shape of the value this expression produces.
    pub fn shape(&self) -> Shape {
        match self {
            Expr::Param(param) => param.shape().clone(),
            Expr::Constant(value) => value.shape(),
            Expr::Member { shape, .. } => shape.clone(),
            Expr::Service(call) => call.shape().clone(),
            Expr::Binary { op, left, .. } if op.is_arithmetic() => left.shape(),
            Expr::Binary { .. } => Shape::boolean(),
            Expr::Conditional { then, otherwise, .. } => match then.shape() {
                Shape::Any => otherwise.shape(),
                shape => shape,
            },
            Expr::Convert { to, .. } => Shape::Scalar(*to),
            Expr::Object { name, fields } => Shape::object(
                fields
                    .iter()
                    .fold(crate::shape::ObjectShape::new(name.clone()), |shape, (n, e)| {
                        shape.with_member(n.clone(), e.shape())
                    }),
            ),
            Expr::Scope { body, .. } => body.shape(),
            Expr::Project { body, .. } => Shape::list(body.shape()),
            Expr::Find { source, .. } => source.shape().element().cloned().unwrap_or_default(),
            Expr::Filter { source, .. } | Expr::Sort { source, .. } | Expr::Slice { source, .. } => source.shape(),
        }
    }

    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> SmallVec<[&Expr; 4]> {
        match self {
            Expr::Param(_) | Expr::Constant(_) => SmallVec::new(),
            Expr::Member { target, .. } => smallvec::smallvec![target.as_ref()],
            Expr::Service(call) => call.args().iter().collect(),
            Expr::Binary { left, right, .. } => smallvec::smallvec![left.as_ref(), right.as_ref()],
            Expr::Conditional { test, then, otherwise } => {
                smallvec::smallvec![test.as_ref(), then.as_ref(), otherwise.as_ref()]
            }
            Expr::Convert { expr, .. } => smallvec::smallvec![expr.as_ref()],
            Expr::Object { fields, .. } => fields.iter().map(|(_, e)| e).collect(),
            Expr::Scope { value, body, .. } => smallvec::smallvec![value.as_ref(), body.as_ref()],
            Expr::Project { source, body, .. } => smallvec::smallvec![source.as_ref(), body.as_ref()],
            Expr::Filter { source, predicate, .. } | Expr::Find { source, predicate, .. } => {
                smallvec::smallvec![source.as_ref(), predicate.as_ref()]
            }
            Expr::Sort { source, keys, .. } => std::iter::once(source.as_ref())
                .chain(keys.iter().map(|k| &k.expr))
                .collect(),
            Expr::Slice { source, .. } => smallvec::smallvec![source.as_ref()],
        }
    }

    /// Pre-order walk; `visit` returns `false` to skip a node's children.
    pub fn walk<'e>(&'e self, visit: &mut impl FnMut(&'e Expr) -> bool) {
        if visit(self) {
            for child in self.children() {
                child.walk(visit);
            }
        }
    }

    pub fn has_services(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr| {
            found |= matches!(expr, Expr::Service(_));
            !found
        });
        found
    }

    /// Capabilities required anywhere in this expression, first occurrence order.
    pub fn capabilities(&self) -> SmallVec<[Capability; 2]> {
        let mut capabilities = SmallVec::<[Capability; 2]>::new();
        self.walk(&mut |expr| {
            if let Expr::Service(call) = expr {
                capabilities.push(call.capability());
            }
            true
        });
        capabilities.into_iter().unique().collect()
    }

    pub fn references(&self, param: &Param) -> bool {
        let mut found = false;
        self.walk(&mut |expr| {
            found |= matches!(expr, Expr::Param(p) if p.id() == param.id());
            !found
        });
        found
    }

    /// Rewrites the tree top-down. Where `modifier` returns `Some`, that node is
    /// replaced and its children are not visited; elsewhere the node is rebuilt
    /// from rewritten children.
    pub fn modify(&self, modifier: &mut impl FnMut(&Expr) -> Option<Expr>) -> Expr {
        if let Some(expr) = modifier(self) {
            return expr;
        }

        let mut boxed = |expr: &Expr| Box::new(expr.modify(modifier));
        match self {
            Expr::Param(_) | Expr::Constant(_) => self.clone(),
            Expr::Member { target, name, shape } => Expr::Member {
                target: boxed(target),
                name: name.clone(),
                shape: shape.clone(),
            },
            Expr::Service(call) => Expr::Service(call.with_args(call.args().iter().map(|a| a.modify(modifier)).collect())),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: boxed(left),
                right: boxed(right),
            },
            Expr::Conditional { test, then, otherwise } => Expr::Conditional {
                test: boxed(test),
                then: boxed(then),
                otherwise: boxed(otherwise),
            },
            Expr::Convert { expr, to } => Expr::Convert {
                expr: boxed(expr),
                to: *to,
            },
            Expr::Object { name, fields } => Expr::Object {
                name: name.clone(),
                fields: fields.iter().map(|(n, e)| (n.clone(), e.modify(modifier))).collect(),
            },
            Expr::Scope { param, value, body } => Expr::Scope {
                param: Shared::clone(param),
                value: boxed(value),
                body: boxed(body),
            },
            Expr::Project { source, param, body } => Expr::Project {
                source: boxed(source),
                param: Shared::clone(param),
                body: boxed(body),
            },
            Expr::Filter { source, param, predicate } => Expr::Filter {
                source: boxed(source),
                param: Shared::clone(param),
                predicate: boxed(predicate),
            },
            Expr::Find { source, param, predicate } => Expr::Find {
                source: boxed(source),
                param: Shared::clone(param),
                predicate: boxed(predicate),
            },
            Expr::Sort { source, param, keys } => Expr::Sort {
                source: boxed(source),
                param: Shared::clone(param),
                keys: keys
                    .iter()
                    .map(|k| SortKey {
                        expr: k.expr.modify(modifier),
                        descending: k.descending,
                    })
                    .collect(),
            },
            Expr::Slice { source, skip, take } => Expr::Slice {
                source: boxed(source),
                skip: *skip,
                take: *take,
            },
        }
    }

    /// Member names from `root` to this node when it is a pure member chain
    /// over `root` (an empty path for `root` itself).
    pub(crate) fn member_path(&self, root: &Param) -> Option<SmallVec<[&SmolStr; 4]>> {
        let mut path = SmallVec::<[&SmolStr; 4]>::new();
        let mut current = self;
        loop {
            match current {
                Expr::Member { target, name, .. } => {
                    path.push(name);
                    current = target;
                }
                Expr::Param(param) if param.id() == root.id() => {
                    path.reverse();
                    return Some(path);
                }
                _ => return None,
            }
        }
    }
}

/// Name under which a member chain is carried between stages.
///
/// The encoding is injective: members are joined with `.`, and `.` or `\`
/// inside a member is escaped with `\`. An empty member is written `\0`
/// and the bare placeholder is `__`.
pub(crate) fn extracted_name(path: &[&SmolStr]) -> SmolStr {
    let mut name = String::from("__");
    for (i, member) in path.iter().enumerate() {
        if i > 0 {
            name.push('.');
        }
        if member.is_empty() {
            name.push_str("\\0");
        }
        for c in member.chars() {
            if matches!(c, '.' | '\\') {
                name.push('\\');
            }
            name.push(c);
        }
    }
    name.into()
}
