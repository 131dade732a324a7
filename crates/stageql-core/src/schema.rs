//! Schema-side collaborators: field definitions, the input type registry and
//! field namers.

use std::fmt;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Shared,
    argument::{ArgumentBinding, ArgumentSet, InputShape},
    extension::FieldExtension,
    ir::Expr,
    shape::Shape,
};

/// Builds a field's expression from its parent context and bound arguments.
pub type FieldResolver = dyn Fn(&Expr, &ArgumentSet) -> Expr + Send + Sync;

/// Maps a member name to the name exposed in the schema.
pub type FieldNamer = fn(&str) -> SmolStr;

/// A schema field definition.
#[derive(Clone)]
pub struct FieldDef {
    name: SmolStr,
    description: Option<SmolStr>,
    shape: Shape,
    arguments: Vec<ArgumentBinding>,
    extensions: Vec<Shared<dyn FieldExtension>>,
    resolve: Shared<FieldResolver>,
}

impl FieldDef {
    pub fn new<F>(name: impl Into<SmolStr>, shape: Shape, resolve: F) -> Self
    where
        F: Fn(&Expr, &ArgumentSet) -> Expr + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            shape,
            arguments: Vec::new(),
            extensions: Vec::new(),
            resolve: Shared::new(resolve),
        }
    }

    /// A field reading the same-named member of its parent.
    pub fn member(name: impl Into<SmolStr>, shape: Shape) -> Self {
        let name = name.into();
        let member = name.clone();
        let member_shape = shape.clone();
        Self::new(name, shape, move |ctx, _| {
            ctx.clone().member_as(member.clone(), member_shape.clone())
        })
    }

    pub fn with_description(mut self, description: impl Into<SmolStr>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_argument(mut self, binding: ArgumentBinding) -> Self {
        self.arguments.push(binding);
        self
    }

    /// Attaches an extension and adds the arguments it contributes.
    pub fn with_extension(mut self, extension: impl FieldExtension + 'static) -> Self {
        let element = self.shape.element().unwrap_or(&self.shape).clone();
        self.arguments.extend(extension.arguments(&element));
        self.extensions.push(Shared::new(extension));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn arguments(&self) -> &[ArgumentBinding] {
        &self.arguments
    }

    pub fn extensions(&self) -> &[Shared<dyn FieldExtension>] {
        &self.extensions
    }

    pub fn resolve(&self, ctx: &Expr, arguments: &ArgumentSet) -> Expr {
        (self.resolve)(ctx, arguments)
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("arguments", &self.arguments)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Registry of input types, consulted when mutation argument shapes are
/// registered automatically.
pub trait TypeRegistry {
    fn has_type(&self, name: &str) -> bool;
    fn add_input_type(&mut self, shape: Shared<InputShape>);
}

#[derive(Debug, Clone, Default)]
pub struct InputTypes {
    types: FxHashMap<SmolStr, Shared<InputShape>>,
}

impl InputTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Shared<InputShape>> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeRegistry for InputTypes {
    fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    fn add_input_type(&mut self, shape: Shared<InputShape>) {
        self.types.insert(shape.name().into(), shape);
    }
}

/// `snake_case` / `PascalCase` to `camelCase`.
pub fn camel_case(name: &str) -> SmolStr {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for (i, c) in name.chars().enumerate() {
        match c {
            '_' if i > 0 => upper_next = true,
            c if upper_next => {
                out.extend(c.to_uppercase());
                upper_next = false;
            }
            c if out.is_empty() => out.extend(c.to_lowercase()),
            c => out.push(c),
        }
    }
    out.into()
}
