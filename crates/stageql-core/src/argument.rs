//! Argument types, request arguments and binding.
//!
//! Request arguments are bound against a field's [`ArgumentBinding`] table:
//! variables are substituted, defaults are filled in and every value is
//! coerced to its declared [`ArgType`]. The result is an [`ArgumentSet`] keyed
//! by target member name.

use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use smol_str::SmolStr;

use crate::{
    Shared,
    error::CompileError,
    ir::{Expr, Param},
    shape::ScalarKind,
    value::{Object, Value},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ArgKind {
    Scalar(ScalarKind),
    Enum { name: SmolStr, values: Vec<SmolStr> },
    Input(Shared<InputShape>),
    List(Box<ArgType>),
}

/// Declared type of an argument or input member.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgType {
    kind: ArgKind,
    required: bool,
    default: Option<Value>,
}

impl ArgType {
    pub fn new(kind: ArgKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
        }
    }

    pub fn scalar(kind: ScalarKind) -> Self {
        Self::new(ArgKind::Scalar(kind))
    }

    pub fn int() -> Self {
        Self::scalar(ScalarKind::Int)
    }

    pub fn float() -> Self {
        Self::scalar(ScalarKind::Float)
    }

    pub fn string() -> Self {
        Self::scalar(ScalarKind::String)
    }

    pub fn boolean() -> Self {
        Self::scalar(ScalarKind::Boolean)
    }

    pub fn id() -> Self {
        Self::scalar(ScalarKind::Id)
    }

    pub fn enumeration(name: impl Into<SmolStr>, values: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        Self::new(ArgKind::Enum {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn input(shape: InputShape) -> Self {
        Self::new(ArgKind::Input(Shared::new(shape)))
    }

    pub fn list(item: ArgType) -> Self {
        Self::new(ArgKind::List(Box::new(item)))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn kind(&self) -> &ArgKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Coerces an input value to this type. `None` when the value does not fit.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if value.is_null() {
            return (!self.required).then_some(Value::Null);
        }

        match (&self.kind, value) {
            (ArgKind::Scalar(ScalarKind::Int), value @ Value::Int(_)) => Some(value),
            (ArgKind::Scalar(ScalarKind::Float), Value::Int(n)) => Some(Value::Float(n as f64)),
            (ArgKind::Scalar(ScalarKind::Float), value @ Value::Float(_)) => Some(value),
            (ArgKind::Scalar(ScalarKind::String), value @ Value::String(_)) => Some(value),
            (ArgKind::Scalar(ScalarKind::Boolean), value @ Value::Bool(_)) => Some(value),
            (ArgKind::Scalar(ScalarKind::Id), value @ Value::String(_)) => Some(value),
            (ArgKind::Scalar(ScalarKind::Id), Value::Int(n)) => Some(Value::String(n.to_string().into())),
            (ArgKind::Enum { values, .. }, Value::Enum(v) | Value::String(v)) => {
                values.contains(&v).then_some(Value::Enum(v))
            }
            (ArgKind::Input(shape), Value::Object(object)) => shape.coerce(object).map(Value::Object),
            (ArgKind::List(item), Value::List(items)) => items
                .into_iter()
                .map(|v| item.coerce(v))
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            (ArgKind::List(item), value) => item.coerce(value).map(|v| Value::List(vec![v])),
            _ => None,
        }
    }
}

impl Display for ArgType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ArgKind::Scalar(kind) => write!(f, "{kind}")?,
            ArgKind::Enum { name, .. } => write!(f, "{name}")?,
            ArgKind::Input(shape) => write!(f, "{}", shape.name())?,
            ArgKind::List(item) => write!(f, "[{item}]")?,
        }
        if self.required {
            f.write_str("!")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputField {
    /// Name used in requests.
    pub name: SmolStr,
    /// Name of the member the value is bound to.
    pub member: SmolStr,
    pub ty: ArgType,
}

/// Input object type.
#[derive(Debug, Clone, PartialEq)]
pub struct InputShape {
    name: SmolStr,
    fields: Vec<InputField>,
}

impl InputShape {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<SmolStr>, ty: ArgType) -> Self {
        let name = name.into();
        self.fields.push(InputField {
            member: name.clone(),
            name,
            ty,
        });
        self
    }

    pub fn with_mapped_field(mut self, name: impl Into<SmolStr>, member: impl Into<SmolStr>, ty: ArgType) -> Self {
        self.fields.push(InputField {
            name: name.into(),
            member: member.into(),
            ty,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[InputField] {
        &self.fields
    }

    fn coerce(&self, mut object: Object) -> Option<Object> {
        let mut coerced = Object::with_capacity(self.fields.len());
        for field in &self.fields {
            match object.remove(&field.name) {
                Some(value) => {
                    coerced.insert(field.member.clone(), field.ty.coerce(value)?);
                }
                None => match &field.ty.default {
                    Some(default) => {
                        coerced.insert(field.member.clone(), default.clone());
                    }
                    None if field.ty.required => return None,
                    None => {}
                },
            }
        }
        // Unknown input members.
        object.is_empty().then_some(coerced)
    }
}

/// One entry of a field's argument table.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentBinding {
    schema_name: SmolStr,
    member: SmolStr,
    ty: ArgType,
}

impl ArgumentBinding {
    pub fn new(name: impl Into<SmolStr>, ty: ArgType) -> Self {
        let schema_name = name.into();
        Self {
            member: schema_name.clone(),
            schema_name,
            ty,
        }
    }

    /// Binds the argument to a differently named member.
    pub fn with_member(mut self, member: impl Into<SmolStr>) -> Self {
        self.member = member.into();
        self
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn ty(&self) -> &ArgType {
        &self.ty
    }
}

/// An argument as written in the request.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Value(Value),
    Variable(SmolStr),
}

impl ArgValue {
    pub fn variable(name: impl Into<SmolStr>) -> Self {
        ArgValue::Variable(name.into())
    }
}

macro_rules! arg_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ArgValue {
                fn from(value: $ty) -> Self {
                    ArgValue::Value(value.into())
                }
            }
        )*
    };
}

arg_value_from!(Value, bool, i32, i64, f64, &str, String, SmolStr, Vec<Value>, Object);

/// Arguments of one selected field, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestArguments {
    entries: Vec<(SmolStr, ArgValue)>,
}

impl RequestArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<ArgValue>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.entries.iter().find_map(|(n, v)| (n == name).then_some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &ArgValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<SmolStr>, V: Into<ArgValue>> FromIterator<(K, V)> for RequestArguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Document variable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables(Object);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.0.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Adds every variable of `other`, replacing same-named ones.
    pub fn merge(&mut self, other: &Variables) {
        for (name, value) in other.0.iter() {
            self.0.insert(name.clone(), value.clone());
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Object> for Variables {
    fn from(object: Object) -> Self {
        Self(object)
    }
}

/// A bound argument whose value came from a document variable.
#[derive(Debug, Clone, PartialEq)]
struct VariableSource {
    variable: SmolStr,
    ty: ArgType,
}

/// Bound, coerced arguments keyed by member name.
///
/// Arguments bound from document variables remember the variable. Once the
/// set reads variables from a placeholder, [`ArgumentSet::expr`] turns them
/// into reads of that placeholder rather than constants, so compiled
/// expressions do not depend on variable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentSet {
    values: Object,
    sources: IndexMap<SmolStr, VariableSource>,
    placeholder: Option<Shared<Param>>,
}

impl ArgumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, member: &str) -> Option<&Value> {
        self.values.get(member)
    }

    /// Sets a member to a literal value.
    pub fn set(&mut self, member: impl Into<SmolStr>, value: Value) {
        let member = member.into();
        self.sources.shift_remove(&member);
        self.values.insert(member, value);
    }

    pub fn contains(&self, member: &str) -> bool {
        self.values.contains(member)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Value)> {
        self.values.iter()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Name of the variable `member` was bound from, if any.
    pub fn variable(&self, member: &str) -> Option<&str> {
        self.sources.get(member).map(|source| source.variable.as_str())
    }

    /// Reads variable-bound members from `placeholder`, which is bound to the
    /// document variables at run time.
    pub fn read_variables_from(&mut self, placeholder: &Shared<Param>) {
        self.placeholder = Some(Shared::clone(placeholder));
    }

    /// Expression for `member`: a read of its variable when it came from one
    /// and a placeholder is set, its literal value otherwise.
    pub fn expr(&self, member: &str) -> Expr {
        match self.variable_read(member) {
            Some((read, ty)) => match ty.kind() {
                ArgKind::Scalar(kind) => read.convert(*kind),
                _ => read,
            },
            None => Expr::constant(self.get(member).cloned().unwrap_or_default()),
        }
    }

    /// Expression for `name` inside the input-object argument `member`.
    pub fn member_expr(&self, member: &str, name: &str) -> Expr {
        match self.variable_read(member) {
            Some((read, ty)) => {
                let field = match ty.kind() {
                    ArgKind::Input(shape) => shape.fields().iter().find(|field| field.member == name),
                    _ => None,
                };
                match field {
                    Some(field) => {
                        let read = read.member(field.name.clone());
                        match field.ty.kind() {
                            ArgKind::Scalar(kind) => read.convert(*kind),
                            _ => read,
                        }
                    }
                    None => read.member(name),
                }
            }
            None => Expr::constant(self.get(member).map(|value| value.member(name)).unwrap_or_default()),
        }
    }

    fn variable_read(&self, member: &str) -> Option<(Expr, &ArgType)> {
        let placeholder = self.placeholder.as_ref()?;
        let source = self.sources.get(member)?;
        Some((Expr::param(placeholder).member(source.variable.clone()), &source.ty))
    }

    /// Deserializes the bound arguments into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_value().to_json())
    }

    /// Binds request arguments against `bindings`.
    ///
    /// Variables are resolved from `variables` before coercion. Absent
    /// arguments take their declared default; absent required arguments and
    /// arguments the table does not declare are errors.
    pub fn bind(
        field: &str,
        bindings: &[ArgumentBinding],
        request: &RequestArguments,
        variables: Option<&Variables>,
    ) -> Result<Self, CompileError> {
        if let Some((name, _)) = request
            .iter()
            .find(|(name, _)| bindings.iter().all(|b| b.schema_name != **name))
        {
            return Err(CompileError::UnknownArgument {
                field: field.into(),
                argument: name.clone(),
            });
        }

        let mut arguments = ArgumentSet::new();
        for binding in bindings {
            let value = match request.get(&binding.schema_name) {
                Some(ArgValue::Value(value)) => Some(value.clone()),
                Some(ArgValue::Variable(name)) => {
                    let value = variables
                        .and_then(|variables| variables.get(name))
                        .cloned()
                        .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                    arguments.sources.insert(
                        binding.member.clone(),
                        VariableSource {
                            variable: name.clone(),
                            ty: binding.ty.clone(),
                        },
                    );
                    Some(value)
                }
                None => None,
            };

            let value = match (value, binding.ty.default_value()) {
                (Some(value), _) => value,
                (None, Some(default)) => default.clone(),
                (None, None) if binding.ty.is_required() => {
                    return Err(CompileError::MissingArgument {
                        field: field.into(),
                        argument: binding.schema_name.clone(),
                    });
                }
                (None, None) => continue,
            };

            let found = value.kind_name();
            let coerced = binding.ty.coerce(value).ok_or_else(|| CompileError::InvalidArgument {
                field: field.into(),
                argument: binding.schema_name.clone(),
                expected: binding.ty.to_string(),
                found: found.to_string(),
            })?;
            arguments.values.insert(binding.member.clone(), coerced);
        }

        Ok(arguments)
    }
}

impl From<Object> for ArgumentSet {
    fn from(values: Object) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde::Deserialize;
    use serde_json::json;

    #[fixture]
    fn movie_input() -> ArgType {
        ArgType::input(
            InputShape::new("MovieInput")
                .with_mapped_field("title", "name", ArgType::string().required())
                .with_field("year", ArgType::int().with_default(2000)),
        )
    }

    #[rstest]
    #[case(ArgType::float(), json!(3), Some(json!(3.0)))]
    #[case(ArgType::id(), json!(7), Some(json!("7")))]
    #[case(ArgType::int(), json!("7"), None)]
    #[case(ArgType::int().required(), json!(null), None)]
    #[case(ArgType::int(), json!(null), Some(json!(null)))]
    #[case(ArgType::list(ArgType::int()), json!(4), Some(json!([4])))]
    #[case(ArgType::list(ArgType::int()), json!([1, "x"]), None)]
    #[case(ArgType::enumeration("Dir", ["ASC", "DESC"]), json!("ASC"), Some(json!("ASC")))]
    #[case(ArgType::enumeration("Dir", ["ASC", "DESC"]), json!("UP"), None)]
    fn test_coerce(#[case] ty: ArgType, #[case] value: serde_json::Value, #[case] expected: Option<serde_json::Value>) {
        assert_eq!(ty.coerce(value.into()).map(|v| v.to_json()), expected);
    }

    #[rstest]
    fn test_coerce_input_object(movie_input: ArgType) {
        let coerced = movie_input.coerce(json!({"title": "Heat"}).into()).unwrap();
        assert_eq!(coerced.to_json(), json!({"name": "Heat", "year": 2000}));

        assert!(movie_input.coerce(json!({"year": 1999}).into()).is_none());
        assert!(movie_input.coerce(json!({"title": "Heat", "rating": 5}).into()).is_none());
    }

    #[rstest]
    #[case(ArgType::list(ArgType::int().required()).required(), "[Int!]!")]
    #[case(ArgType::id(), "ID")]
    fn test_display(#[case] ty: ArgType, #[case] expected: &str) {
        assert_eq!(ty.to_string(), expected);
    }

    fn bindings() -> Vec<ArgumentBinding> {
        vec![
            ArgumentBinding::new("id", ArgType::id().required()),
            ArgumentBinding::new("first", ArgType::int().with_default(10)).with_member("take"),
            ArgumentBinding::new("search", ArgType::string()),
        ]
    }

    #[test]
    fn test_bind_applies_defaults_and_members() {
        let request = RequestArguments::new().with("id", 5);
        let set = ArgumentSet::bind("movies", &bindings(), &request, None).unwrap();
        assert_eq!(set.to_value().to_json(), json!({"id": "5", "take": 10}));
        assert!(!set.contains("search"));
    }

    #[test]
    fn test_bind_resolves_variables() {
        let request = RequestArguments::new().with("id", ArgValue::variable("movieId"));
        let variables = Variables::new().with("movieId", "m-1");
        let set = ArgumentSet::bind("movies", &bindings(), &request, Some(&variables)).unwrap();
        assert_eq!(set.get("id"), Some(&Value::String("m-1".into())));
    }

    #[test]
    fn test_expr_reads_variable_from_placeholder() {
        let request = RequestArguments::new()
            .with("id", ArgValue::variable("movieId"))
            .with("first", 3);
        let variables = Variables::new().with("movieId", 7);
        let mut set = ArgumentSet::bind("movies", &bindings(), &request, Some(&variables)).unwrap();
        assert_eq!(set.variable("id"), Some("movieId"));
        assert_eq!(set.expr("id"), Expr::constant("7"));

        let vars = Param::new("vars", crate::shape::Shape::Any);
        set.read_variables_from(&vars);
        assert_eq!(set.expr("id"), Expr::param(&vars).member("movieId").convert(ScalarKind::Id));
        assert_eq!(set.expr("take"), Expr::constant(3));
        assert_eq!(set.expr("search"), Expr::constant(Value::Null));
    }

    #[rstest]
    fn test_member_expr_maps_input_field_names(movie_input: ArgType) {
        let bindings = vec![ArgumentBinding::new("movie", movie_input)];
        let request = RequestArguments::new().with("movie", ArgValue::variable("m"));
        let variables = Variables::new().with("m", Value::from(json!({"title": "Heat"})));
        let mut set = ArgumentSet::bind("add", &bindings, &request, Some(&variables)).unwrap();
        assert_eq!(set.member_expr("movie", "name"), Expr::constant("Heat"));

        let vars = Param::new("vars", crate::shape::Shape::Any);
        set.read_variables_from(&vars);
        assert_eq!(
            set.member_expr("movie", "name"),
            Expr::param(&vars).member("m").member("title").convert(ScalarKind::String)
        );
        set.set("movie", Value::from(json!({"name": "Alien"})));
        assert_eq!(set.variable("movie"), None);
        assert_eq!(set.member_expr("movie", "name"), Expr::constant("Alien"));
    }

    #[rstest]
    #[case(RequestArguments::new(), CompileError::MissingArgument { field: "movies".into(), argument: "id".into() })]
    #[case(RequestArguments::new().with("id", 1).with("limit", 2), CompileError::UnknownArgument { field: "movies".into(), argument: "limit".into() })]
    #[case(RequestArguments::new().with("id", ArgValue::variable("x")), CompileError::UndefinedVariable("x".into()))]
    #[case(
        RequestArguments::new().with("id", true),
        CompileError::InvalidArgument { field: "movies".into(), argument: "id".into(), expected: "ID!".into(), found: "Boolean".into() }
    )]
    fn test_bind_errors(#[case] request: RequestArguments, #[case] expected: CompileError) {
        assert_eq!(ArgumentSet::bind("movies", &bindings(), &request, None), Err(expected));
    }

    #[test]
    fn test_deserialize() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Args {
            id: String,
            take: i64,
        }

        let set = ArgumentSet::bind("movies", &bindings(), &RequestArguments::new().with("id", "a"), None).unwrap();
        assert_eq!(
            set.deserialize::<Args>().unwrap(),
            Args {
                id: "a".into(),
                take: 10
            }
        );
    }
}
