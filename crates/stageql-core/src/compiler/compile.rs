//! IR to closure compilation.

use std::cmp::Ordering;

use smol_str::SmolStr;

use super::compiled::{CompiledExpr, Env};
use crate::{
    capability::CapabilityProvider,
    error::ExecutionError,
    ir::{BinaryOp, Expr, Param},
    value::{Object, Value},
};

/// Compiles an expression into a closure.
///
/// Compilation itself cannot fail; every runtime problem (unbound placeholder,
/// missing capability, type mismatch) is reported when the closure runs.
pub fn compile(expr: &Expr) -> CompiledExpr {
    match expr {
        Expr::Constant(value) => {
            let value = value.clone();
            Box::new(move |_env, _provider| Ok(value.clone()))
        }

        Expr::Param(param) => {
            let id = param.id();
            let name: SmolStr = param.name().into();
            Box::new(move |env, _provider| {
                env.resolve(id)
                    .cloned()
                    .ok_or_else(|| ExecutionError::UnboundParam(name.clone()))
            })
        }

        Expr::Member { target, name, .. } => {
            let target = compile(target);
            let name = name.clone();
            Box::new(move |env, provider| Ok(target(env, provider)?.into_member(&name)))
        }

        Expr::Service(call) => {
            let args = call.args().iter().map(compile).collect::<Vec<_>>();
            let call = call.clone();
            Box::new(move |env, provider| {
                let capability = call.capability();
                let instance = provider
                    .resolve(&capability)
                    .ok_or(ExecutionError::MissingCapability(capability))?;
                let values = args
                    .iter()
                    .map(|arg| arg(env, provider))
                    .collect::<Result<Vec<_>, _>>()?;

                call.call(&instance, &values).map_err(|source| ExecutionError::Service {
                    capability,
                    method: call.method().into(),
                    source,
                })
            })
        }

        Expr::Binary {
            op: op @ (BinaryOp::And | BinaryOp::Or),
            left,
            right,
        } => {
            let short_circuit = *op == BinaryOp::Or;
            let left = compile(left);
            let right = compile(right);
            Box::new(move |env, provider| {
                if left(env, provider)?.is_truthy() == short_circuit {
                    return Ok(Value::Bool(short_circuit));
                }
                Ok(Value::Bool(right(env, provider)?.is_truthy()))
            })
        }

        Expr::Binary { op, left, right } => {
            let op = *op;
            let left = compile(left);
            let right = compile(right);
            Box::new(move |env, provider| binary(op, left(env, provider)?, right(env, provider)?))
        }

        Expr::Conditional { test, then, otherwise } => {
            let test = compile(test);
            let then = compile(then);
            let otherwise = compile(otherwise);
            Box::new(move |env, provider| {
                if test(env, provider)?.is_truthy() {
                    then(env, provider)
                } else {
                    otherwise(env, provider)
                }
            })
        }

        Expr::Convert { expr, to } => {
            let expr = compile(expr);
            let to = *to;
            Box::new(move |env, provider| {
                let value = expr(env, provider)?;
                value.convert(to).ok_or_else(|| ExecutionError::Conversion {
                    value: value.to_string(),
                    to,
                })
            })
        }

        Expr::Object { fields, .. } => {
            let fields = fields
                .iter()
                .map(|(name, expr)| (name.clone(), compile(expr)))
                .collect::<Vec<_>>();
            Box::new(move |env, provider| {
                let mut object = Object::with_capacity(fields.len());
                for (name, field) in &fields {
                    object.insert(name.clone(), field(env, provider)?);
                }
                Ok(Value::Object(object))
            })
        }

        Expr::Scope { param, value, body } => {
            let id = param.id();
            let value = compile(value);
            let body = compile(body);
            Box::new(move |env, provider| match value(env, provider)? {
                Value::Null => Ok(Value::Null),
                bound => body(&env.bind(id, &bound), provider),
            })
        }

        Expr::Project { source, param, body } => {
            let (source, body) = (compile(source), compile(body));
            let id = param.id();
            Box::new(move |env, provider| {
                let Some(items) = list(source(env, provider)?, "map")? else {
                    return Ok(Value::Null);
                };
                items
                    .iter()
                    .map(|item| body(&env.bind(id, item), provider))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            })
        }

        Expr::Filter {
            source,
            param,
            predicate,
        } => {
            let (source, predicate) = (compile(source), compile(predicate));
            let id = param.id();
            Box::new(move |env, provider| {
                let Some(items) = list(source(env, provider)?, "filter")? else {
                    return Ok(Value::Null);
                };
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if predicate(&env.bind(id, &item), provider)?.is_truthy() {
                        kept.push(item);
                    }
                }
                Ok(Value::List(kept))
            })
        }

        Expr::Find {
            source,
            param,
            predicate,
        } => {
            let (source, predicate) = (compile(source), compile(predicate));
            let id = param.id();
            Box::new(move |env, provider| {
                let Some(items) = list(source(env, provider)?, "find")? else {
                    return Ok(Value::Null);
                };
                for item in items {
                    if predicate(&env.bind(id, &item), provider)?.is_truthy() {
                        return Ok(item);
                    }
                }
                Ok(Value::Null)
            })
        }

        Expr::Sort { source, param, keys } => {
            let source = compile(source);
            let keys = keys
                .iter()
                .map(|key| (compile(&key.expr), key.descending))
                .collect::<Vec<_>>();
            let id = param.id();
            Box::new(move |env, provider| {
                let Some(items) = list(source(env, provider)?, "sort")? else {
                    return Ok(Value::Null);
                };
                let mut keyed = items
                    .into_iter()
                    .map(|item| -> Result<_, ExecutionError> {
                        let scope = env.bind(id, &item);
                        let sort_keys = keys
                            .iter()
                            .map(|(key, _)| key(&scope, provider))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok((sort_keys, item))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                keyed.sort_by(|(a, _), (b, _)| {
                    a.iter()
                        .zip(b)
                        .zip(&keys)
                        .map(|((a, b), (_, descending))| {
                            let ordering = a.compare(b).unwrap_or(Ordering::Equal);
                            if *descending { ordering.reverse() } else { ordering }
                        })
                        .find(|ordering| ordering.is_ne())
                        .unwrap_or(Ordering::Equal)
                });

                Ok(Value::List(keyed.into_iter().map(|(_, item)| item).collect()))
            })
        }

        Expr::Slice { source, skip, take } => {
            let source = compile(source);
            let (skip, take) = (*skip, *take);
            Box::new(move |env, provider| {
                let Some(items) = list(source(env, provider)?, "slice")? else {
                    return Ok(Value::Null);
                };
                let items = items.into_iter().skip(skip);
                Ok(Value::List(match take {
                    Some(take) => items.take(take).collect(),
                    None => items.collect(),
                }))
            })
        }
    }
}

/// Runs `expr` with `param` bound to `root` and no capabilities.
#[cfg(test)]
pub(crate) fn eval(expr: &Expr, param: &Param, root: &Value) -> Result<Value, ExecutionError> {
    compile(expr)(&Env::new(param.id(), root), &crate::capability::NoCapabilities)
}

#[inline(always)]
fn list(value: Value, operation: &'static str) -> Result<Option<Vec<Value>>, ExecutionError> {
    match value {
        Value::Null => Ok(None),
        Value::List(items) => Ok(Some(items)),
        other => Err(ExecutionError::TypeMismatch {
            operation,
            expected: "List",
            found: other.kind_name(),
        }),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExecutionError> {
    let mismatch = |found: &Value| ExecutionError::TypeMismatch {
        operation: op_name(op),
        expected: "Int or Float",
        found: found.kind_name(),
    };

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.loose_eq(&right))),
        BinaryOp::NotEq => Ok(Value::Bool(!left.loose_eq(&right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Bool(false));
            }
            let ordering = left.compare(&right).ok_or_else(|| ExecutionError::TypeMismatch {
                operation: op_name(op),
                expected: left.kind_name(),
                found: right.kind_name(),
            })?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => match (&left, &right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
                BinaryOp::Add => a.wrapping_add(*b),
                BinaryOp::Sub => a.wrapping_sub(*b),
                _ => a.wrapping_mul(*b),
            })),
            (Value::String(a), Value::String(b)) if op == BinaryOp::Add => Ok(Value::String(format!("{a}{b}").into())),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let (a, b) = (as_f64(&left), as_f64(&right));
                Ok(Value::Float(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    _ => a * b,
                }))
            }
            (Value::Int(_) | Value::Float(_), other) | (other, _) => Err(mismatch(other)),
        },
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Float(n) => *n,
        _ => f64::NAN,
    }
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BoxError,
        capability::Capabilities,
        ir::{ServiceCall, SortKey},
        shape::{ObjectShape, ScalarKind, Shape},
    };
    use rstest::{fixture, rstest};
    use serde_json::json;

    struct Doubler;

    fn movie_shape() -> Shape {
        Shape::object(
            ObjectShape::new("Movie")
                .with_member("id", Shape::int())
                .with_member("name", Shape::string())
                .with_member("year", Shape::int()),
        )
    }

    fn query_shape() -> Shape {
        Shape::object(ObjectShape::new("Query").with_member("movies", Shape::list(movie_shape())))
    }

    #[fixture]
    fn data() -> Value {
        Value::from(json!({
            "movies": [
                {"id": 1, "name": "Alien", "year": 1979},
                {"id": 2, "name": "Heat", "year": 1995},
                {"id": 3, "name": "Arrival", "year": 2016},
            ]
        }))
    }

    #[rstest]
    #[case::constant(|_ctx: &Expr| Expr::constant(42), json!(42))]
    #[case::member(|ctx: &Expr| ctx.clone().member("movies").slice(0, Some(1)).project("m", |m| m.member("name")), json!(["Alien"]))]
    #[case::missing_member(|ctx: &Expr| ctx.clone().member("nothing").member("deeper"), json!(null))]
    #[case::filter(|ctx: &Expr| ctx.clone().member("movies").filter("m", |m| Expr::binary(BinaryOp::Gt, m.member("year"), Expr::constant(1990))).project("m", |m| m.member("id")), json!([2, 3]))]
    #[case::find(|ctx: &Expr| ctx.clone().member("movies").find("m", |m| m.member("id").eq(Expr::constant(2))).member("name"), json!("Heat"))]
    #[case::find_none(|ctx: &Expr| ctx.clone().member("movies").find("m", |m| m.member("id").eq(Expr::constant(9))).member("name"), json!(null))]
    #[case::sort_desc(|ctx: &Expr| ctx.clone().member("movies").sort("m", |m| vec![SortKey::desc(m.member("year"))]).project("m", |m| m.member("id")), json!([3, 2, 1]))]
    #[case::sort_asc(|ctx: &Expr| ctx.clone().member("movies").sort("m", |m| vec![SortKey::asc(m.member("name"))]).project("m", |m| m.member("name")), json!(["Alien", "Arrival", "Heat"]))]
    #[case::slice(|ctx: &Expr| ctx.clone().member("movies").slice(1, None).project("m", |m| m.member("id")), json!([2, 3]))]
    #[case::conditional(|_ctx: &Expr| Expr::conditional(Expr::constant(false), Expr::constant(1), Expr::constant(2)), json!(2))]
    #[case::convert(|_ctx: &Expr| Expr::constant("7").convert(ScalarKind::Int), json!(7))]
    #[case::arithmetic(|_ctx: &Expr| Expr::binary(BinaryOp::Add, Expr::constant(1), Expr::constant(2.5)), json!(3.5))]
    fn test_eval(data: Value, #[case] build: fn(&Expr) -> Expr, #[case] expected: serde_json::Value) {
        let ctx = Param::new("ctx", query_shape());
        let expr = build(&Expr::param(&ctx));
        assert_eq!(eval(&expr, &ctx, &data).unwrap().to_json(), expected);
    }

    #[rstest]
    fn test_scope_binds_once_and_propagates_null(data: Value) {
        let ctx = Param::new("ctx", query_shape());
        let first = Expr::param(&ctx).member("movies").find("m", |m| m.member("id").eq(Expr::constant(1)));
        let element = Param::new("movie", movie_shape());
        let scoped = Expr::scope(
            element.clone(),
            first,
            Expr::Object {
                name: "Movie".into(),
                fields: vec![("name".into(), Expr::param(&element).member("name"))],
            },
        );
        assert_eq!(eval(&scoped, &ctx, &data).unwrap().to_json(), json!({"name": "Alien"}));

        let missing = Expr::scope(element.clone(), Expr::constant(Value::Null), Expr::param(&element).member("name"));
        assert_eq!(eval(&missing, &ctx, &data).unwrap(), Value::Null);
    }

    #[rstest]
    fn test_logical_short_circuit(data: Value) {
        let ctx = Param::new("ctx", query_shape());
        let failing = Expr::constant("not a number").convert(ScalarKind::Int);
        assert!(eval(&failing, &ctx, &data).is_err());
        let and = Expr::constant(false).and(Expr::constant(1).eq(failing.clone()));
        assert_eq!(eval(&and, &ctx, &data).unwrap(), Value::Bool(false));
        let or = Expr::binary(BinaryOp::Or, Expr::constant(true), failing);
        assert_eq!(eval(&or, &ctx, &data).unwrap(), Value::Bool(true));
    }

    #[rstest]
    fn test_convert_out_of_range_float_fails(data: Value) {
        let ctx = Param::new("ctx", query_shape());
        let expr = Expr::constant(1e300).convert(ScalarKind::Int);
        let err = eval(&expr, &ctx, &data).unwrap_err();
        assert!(matches!(err, ExecutionError::Conversion { to: ScalarKind::Int, .. }));
    }

    #[test]
    fn test_unbound_param() {
        let bound = Param::new("bound", Shape::Any);
        let unbound = Param::new("unbound", Shape::Any);
        let err = eval(&Expr::param(&unbound), &bound, &Value::Null).unwrap_err();
        assert!(matches!(err, ExecutionError::UnboundParam(name) if name == "unbound"));
    }

    #[rstest]
    fn test_map_over_scalar_is_type_mismatch(data: Value) {
        let ctx = Param::new("ctx", query_shape());
        let expr = Expr::constant(1).project("x", |x| x);
        let err = eval(&expr, &ctx, &data).unwrap_err();
        assert!(matches!(err, ExecutionError::TypeMismatch { operation: "map", .. }));
    }

    fn double(arg: Expr) -> Expr {
        Expr::service(ServiceCall::new::<Doubler, _>(
            "double",
            vec![arg],
            Shape::int(),
            |_, args| -> Result<Value, BoxError> {
                match args.first() {
                    Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
                    _ => Err("expected an Int".into()),
                }
            },
        ))
    }

    #[test]
    fn test_service_call_uses_provider() {
        let ctx = Param::new("ctx", Shape::int());
        let compiled = compile(&double(Expr::param(&ctx)));
        let root = Value::Int(21);
        let env = Env::new(ctx.id(), &root);

        let capabilities = Capabilities::new().with(Doubler);
        assert_eq!(compiled(&env, &capabilities).unwrap(), Value::Int(42));

        let missing = compiled(&env, &crate::capability::NoCapabilities).unwrap_err();
        assert!(matches!(missing, ExecutionError::MissingCapability(c) if c.short_name() == "Doubler"));
    }

    #[test]
    fn test_service_failure_keeps_source() {
        let ctx = Param::new("ctx", Shape::Any);
        let compiled = compile(&double(Expr::constant("x")));
        let root = Value::Null;
        let err = compiled(&Env::new(ctx.id(), &root), &Capabilities::new().with(Doubler)).unwrap_err();
        assert!(matches!(&err, ExecutionError::Service { method, .. } if method == "double"));
        assert_eq!(std::error::Error::source(&err).map(|s| s.to_string()), Some("expected an Int".to_string()));
    }
}
