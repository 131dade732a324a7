//! Static shapes of IR nodes.
//!
//! A [`Shape`] is what the compiler knows about a value before it exists: the
//! stage-2 fast path asks the stage-1 result shape whether it already carries a
//! member of a given name.

use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    Float,
    String,
    Boolean,
    Id,
}

impl Display for ScalarKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Int => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::String => "String",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::Id => "ID",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Shape {
    #[default]
    Any,
    Scalar(ScalarKind),
    Object(Shared<ObjectShape>),
    List(Box<Shape>),
}

impl Shape {
    pub const fn int() -> Self {
        Shape::Scalar(ScalarKind::Int)
    }

    pub const fn float() -> Self {
        Shape::Scalar(ScalarKind::Float)
    }

    pub const fn string() -> Self {
        Shape::Scalar(ScalarKind::String)
    }

    pub const fn boolean() -> Self {
        Shape::Scalar(ScalarKind::Boolean)
    }

    pub const fn id() -> Self {
        Shape::Scalar(ScalarKind::Id)
    }

    pub fn object(shape: ObjectShape) -> Self {
        Shape::Object(Shared::new(shape))
    }

    pub fn list(element: Shape) -> Self {
        Shape::List(Box::new(element))
    }

    /// Shape of the member `name` when this is an object shape declaring it.
    pub fn member(&self, name: &str) -> Option<&Shape> {
        match self {
            Shape::Object(object) => object.get(name),
            _ => None,
        }
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    pub fn element(&self) -> Option<&Shape> {
        match self {
            Shape::List(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectShape> {
        match self {
            Shape::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Shape::List(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Shape::Object(_))
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any => f.write_str("Any"),
            Shape::Scalar(kind) => write!(f, "{kind}"),
            Shape::Object(object) => f.write_str(&object.name),
            Shape::List(element) => write!(f, "[{element}]"),
        }
    }
}

/// Named object shape with ordered members.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectShape {
    name: SmolStr,
    members: Vec<(SmolStr, Shape)>,
}

impl ObjectShape {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Adds (or replaces) a member, builder style.
    pub fn with_member(mut self, name: impl Into<SmolStr>, shape: Shape) -> Self {
        let name = name.into();
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = shape,
            None => self.members.push((name, shape)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.members
            .iter()
            .find_map(|(n, shape)| (n == name).then_some(shape))
    }

    pub fn members(&self) -> impl Iterator<Item = (&SmolStr, &Shape)> {
        self.members.iter().map(|(n, s)| (n, s))
    }

    pub fn scalar_members(&self) -> impl Iterator<Item = (&SmolStr, ScalarKind)> {
        self.members.iter().filter_map(|(n, s)| match s {
            Shape::Scalar(kind) => Some((n, *kind)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn movie() -> Shape {
        Shape::object(
            ObjectShape::new("Movie")
                .with_member("id", Shape::id())
                .with_member("name", Shape::string())
                .with_member("actors", Shape::list(Shape::Any)),
        )
    }

    #[rstest]
    #[case("id", Some(Shape::id()))]
    #[case("actors", Some(Shape::list(Shape::Any)))]
    #[case("rating", None)]
    fn test_member(#[case] name: &str, #[case] expected: Option<Shape>) {
        assert_eq!(movie().member(name).cloned(), expected);
    }

    #[rstest]
    #[case(Shape::list(movie()), "[Movie]")]
    #[case(Shape::id(), "ID")]
    #[case(Shape::Any, "Any")]
    fn test_display(#[case] shape: Shape, #[case] expected: &str) {
        assert_eq!(shape.to_string(), expected);
    }

    #[test]
    fn test_with_member_replaces_existing() {
        let shape = ObjectShape::new("T")
            .with_member("a", Shape::int())
            .with_member("a", Shape::string());
        assert_eq!(shape.members().count(), 1);
        assert_eq!(shape.get("a"), Some(&Shape::string()));
    }
}
