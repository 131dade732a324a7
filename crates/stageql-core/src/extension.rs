//! Field extension pipeline.
//!
//! Extensions rewrite a field's expression around core compilation:
//!
//! ```text
//! source ─ pre_selection ─► projection ─ post_selection ─► value      (object / list)
//! value  ─ scalar ─► value                                            (scalar)
//! ```
//!
//! Hooks run in registration order. They only run where a field is evaluated
//! from source data; a stage-2 read of a stage-1 member skips them.

use std::fmt;

use smol_str::SmolStr;

use crate::{
    argument::{ArgType, ArgumentBinding, ArgumentSet, InputShape},
    error::CompileError,
    ir::{Expr, SortKey},
    shape::{ScalarKind, Shape},
    value::Value,
};

/// What an extension hook can see of the field it is applied to.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionContext<'a> {
    pub field: &'a str,
    pub arguments: &'a ArgumentSet,
}

pub trait FieldExtension: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Arguments this extension adds to the field, given its element shape.
    fn arguments(&self, _element: &Shape) -> Vec<ArgumentBinding> {
        Vec::new()
    }

    /// Checks bound arguments when the field is added to a selection tree.
    fn validate(&self, _field: &str, _arguments: &ArgumentSet) -> Result<(), CompileError> {
        Ok(())
    }

    fn pre_selection(&self, source: Expr, _ctx: &ExtensionContext<'_>) -> Expr {
        source
    }

    fn post_selection(&self, selection: Expr, _ctx: &ExtensionContext<'_>) -> Expr {
        selection
    }

    fn scalar(&self, value: Expr, _ctx: &ExtensionContext<'_>) -> Expr {
        value
    }
}

/// Equality filter over the element's scalar members: `filter: { name: "Heat" }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterExtension;

impl FieldExtension for FilterExtension {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn arguments(&self, element: &Shape) -> Vec<ArgumentBinding> {
        let Some(object) = element.as_object() else {
            return Vec::new();
        };
        let input = object
            .scalar_members()
            .fold(InputShape::new(format!("{}Filter", object.name())), |input, (name, kind)| {
                input.with_field(name.clone(), ArgType::scalar(kind))
            });
        vec![ArgumentBinding::new("filter", ArgType::input(input))]
    }

    fn pre_selection(&self, source: Expr, ctx: &ExtensionContext<'_>) -> Expr {
        let Some(Value::Object(filter)) = ctx.arguments.get("filter") else {
            return source;
        };
        // Which members are filtered on is part of the query shape; the
        // compared values may come from variables.
        let conditions = filter
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, _)| (name.clone(), ctx.arguments.member_expr("filter", name)))
            .collect::<Vec<_>>();
        if conditions.is_empty() {
            return source;
        }

        source.filter("item", |item| {
            conditions
                .into_iter()
                .map(|(name, value)| item.clone().member(name).eq(value))
                .reduce(Expr::and)
                .unwrap_or(Expr::constant(true))
        })
    }
}

/// Multi-key sort: `sort: { year: DESC, name: ASC }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortExtension;

impl SortExtension {
    fn direction() -> ArgType {
        ArgType::enumeration("SortDirection", ["ASC", "DESC"])
    }
}

impl FieldExtension for SortExtension {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn arguments(&self, element: &Shape) -> Vec<ArgumentBinding> {
        let Some(object) = element.as_object() else {
            return Vec::new();
        };
        let input = object
            .scalar_members()
            .fold(InputShape::new(format!("{}Sort", object.name())), |input, (name, _)| {
                input.with_field(name.clone(), Self::direction())
            });
        vec![ArgumentBinding::new("sort", ArgType::input(input))]
    }

    fn pre_selection(&self, source: Expr, ctx: &ExtensionContext<'_>) -> Expr {
        let Some(Value::Object(sort)) = ctx.arguments.get("sort") else {
            return source;
        };
        let keys = sort
            .iter()
            .filter_map(|(name, direction)| Some((name.clone(), direction.as_str()? == "DESC")))
            .collect::<Vec<(SmolStr, bool)>>();
        if keys.is_empty() {
            return source;
        }

        source.sort("item", |item| {
            keys.into_iter()
                .map(|(name, descending)| SortKey {
                    expr: item.clone().member(name),
                    descending,
                })
                .collect()
        })
    }
}

/// Offset paging with `skip` and `take`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PagingExtension {
    default_take: Option<usize>,
    max_take: Option<usize>,
}

impl PagingExtension {
    pub fn new(default_take: Option<usize>, max_take: Option<usize>) -> Self {
        Self {
            default_take,
            max_take,
        }
    }

    fn take(&self, arguments: &ArgumentSet) -> Option<usize> {
        match arguments.get("take") {
            Some(Value::Int(take)) => usize::try_from(*take).ok(),
            _ => self.default_take,
        }
    }
}

impl FieldExtension for PagingExtension {
    fn name(&self) -> &'static str {
        "paging"
    }

    fn arguments(&self, _element: &Shape) -> Vec<ArgumentBinding> {
        vec![
            ArgumentBinding::new("skip", ArgType::int()),
            ArgumentBinding::new("take", ArgType::int()),
        ]
    }

    fn validate(&self, field: &str, arguments: &ArgumentSet) -> Result<(), CompileError> {
        for name in ["skip", "take"] {
            if let Some(Value::Int(n)) = arguments.get(name)
                && *n < 0
            {
                return Err(CompileError::InvalidArgument {
                    field: field.into(),
                    argument: name.into(),
                    expected: "a non-negative Int".into(),
                    found: n.to_string(),
                });
            }
        }

        match (arguments.get("take"), self.max_take) {
            (Some(Value::Int(requested)), Some(max)) if usize::try_from(*requested).is_ok_and(|r| r > max) => {
                Err(CompileError::PageSizeExceeded {
                    field: field.into(),
                    requested: *requested,
                    max,
                })
            }
            _ => Ok(()),
        }
    }

    fn post_selection(&self, selection: Expr, ctx: &ExtensionContext<'_>) -> Expr {
        let skip = match ctx.arguments.get("skip") {
            Some(Value::Int(skip)) => usize::try_from(*skip).unwrap_or_default(),
            _ => 0,
        };
        let take = self.take(ctx.arguments).or(self.max_take);
        if skip == 0 && take.is_none() {
            return selection;
        }
        selection.slice(skip, take)
    }
}

/// Converts a scalar field to another scalar kind.
#[derive(Debug, Clone, Copy)]
pub struct ConvertExtension {
    to: ScalarKind,
}

impl ConvertExtension {
    pub fn new(to: ScalarKind) -> Self {
        Self { to }
    }
}

impl FieldExtension for ConvertExtension {
    fn name(&self) -> &'static str {
        "convert"
    }

    fn scalar(&self, value: Expr, _ctx: &ExtensionContext<'_>) -> Expr {
        value.convert(self.to)
    }
}
