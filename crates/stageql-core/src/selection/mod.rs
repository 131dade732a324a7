//! Selection tree: the bound, requested-output tree a query compiles from.
//!
//! Fields live in an arena and refer to their parent by id. Every field's
//! expression is written over the placeholder of its owner: the operation
//! root, the element of an enclosing object/list field, or a fragment's
//! type-condition placeholder.

mod compile;
mod field;

use smol_str::SmolStr;
use tracing::trace;

use crate::{
    Shared,
    arena::Arena,
    argument::{ArgumentSet, RequestArguments, Variables},
    error::CompileError,
    ir::{Expr, Param},
    mutation::MutationDescriptor,
    schema::FieldDef,
    shape::Shape,
};

pub(crate) use compile::Members;
pub use field::{Field, FieldId, FieldKind, Fragment, FragmentId, MutationSelection};

/// Where a new field is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Operation,
    Field(FieldId),
    Fragment(FragmentId),
}

#[derive(Debug)]
pub struct SelectionTree {
    root: Shared<Param>,
    variables: Shared<Param>,
    bound: Variables,
    fields: Arena<Field>,
    roots: Vec<FieldId>,
    fragments: Arena<Fragment>,
}

impl SelectionTree {
    /// An empty operation over a root value of `shape`.
    pub fn new(shape: Shape) -> Self {
        Self {
            root: Param::new("ctx", shape),
            variables: Param::new("vars", Shape::Any),
            bound: Variables::new(),
            fields: Arena::new(32),
            roots: Vec::new(),
            fragments: Arena::default(),
        }
    }

    /// Placeholder of the operation's root value.
    pub fn root(&self) -> &Shared<Param> {
        &self.root
    }

    /// Placeholder of the document variables. Arguments bound from variables
    /// read it, so compiled stages take variables at run time.
    pub fn variables(&self) -> &Shared<Param> {
        &self.variables
    }

    /// Variables seen while building the tree; the default binding when a
    /// compiled query runs without its own.
    pub fn bound_variables(&self) -> &Variables {
        &self.bound
    }

    pub fn roots(&self) -> &[FieldId] {
        &self.roots
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id]
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &Field)> {
        self.fields.iter()
    }

    pub fn fragment(&self, id: FragmentId) -> &Fragment {
        &self.fragments[id]
    }

    pub fn fragment_by_name(&self, name: &str) -> Option<FragmentId> {
        self.fragments
            .iter()
            .find_map(|(id, fragment)| (fragment.name == name).then_some(id))
    }

    /// Binds `def` under `owner`.
    ///
    /// Arguments are bound and coerced here, and extensions validate them;
    /// any structural error aborts. The field kind follows the declared shape.
    pub fn add(
        &mut self,
        owner: Owner,
        def: &FieldDef,
        request: &RequestArguments,
        variables: Option<&Variables>,
    ) -> Result<FieldId, CompileError> {
        let context = self.owner_context(owner)?;
        let mut arguments = ArgumentSet::bind(def.name(), def.arguments(), request, variables)?;
        arguments.read_variables_from(&self.variables);
        for extension in def.extensions() {
            extension.validate(def.name(), &arguments)?;
        }

        let expr = def.resolve(&Expr::param(&context), &arguments);
        let kind = match def.shape() {
            Shape::List(element) => FieldKind::List {
                element: Param::new(def.name(), (**element).clone()),
            },
            shape @ Shape::Object(_) => FieldKind::Object {
                element: Param::new(def.name(), shape.clone()),
            },
            Shape::Scalar(_) | Shape::Any => FieldKind::Scalar,
        };

        let mut field = Field::new(def.name().into(), kind, expr, context);
        field.arguments = arguments;
        field.extensions = def.extensions().to_vec();
        let id = self.insert(owner, field)?;
        if let Some(variables) = variables {
            self.bound.merge(variables);
        }
        Ok(id)
    }

    /// Spreads the fragment `name` under `owner`.
    pub fn add_spread(&mut self, owner: Owner, name: &str) -> Result<FieldId, CompileError> {
        let fragment = self
            .fragment_by_name(name)
            .ok_or_else(|| CompileError::UnknownFragment(name.into()))?;
        if let Owner::Fragment(spreading) = owner
            && self.fragment_reaches(fragment, spreading)
        {
            return Err(CompileError::FragmentCycle(name.into()));
        }

        let context = self.owner_context(owner)?;
        let field = Field::new(
            format!("...{name}").into(),
            FieldKind::FragmentSpread { fragment },
            Expr::param(&context),
            context,
        );
        self.insert(owner, field)
    }

    /// Declares a fragment whose fields are written over a value of `shape`.
    pub fn add_fragment(&mut self, name: impl Into<SmolStr>, shape: Shape) -> FragmentId {
        let name = name.into();
        self.fragments.alloc(Fragment {
            param: Param::new(name.clone(), shape),
            name,
            fields: Vec::new(),
        })
    }

    /// Selects a mutation at the operation level. Its children are added with
    /// [`Owner::Field`] and are written over the procedure's result.
    pub fn add_mutation(
        &mut self,
        descriptor: Shared<MutationDescriptor>,
        request: RequestArguments,
        variables: Option<Variables>,
    ) -> Result<FieldId, CompileError> {
        let name: SmolStr = descriptor.name().into();
        let result = Param::new(name.clone(), descriptor.returns().clone());
        let element = match descriptor.returns() {
            Shape::List(element) => Some(Param::new(name.clone(), (**element).clone())),
            shape @ Shape::Object(_) => Some(Param::new(name.clone(), shape.clone())),
            Shape::Scalar(_) | Shape::Any => None,
        };

        let field = Field::new(
            name,
            FieldKind::Mutation(MutationSelection {
                descriptor,
                request,
                variables,
                result: Shared::clone(&result),
                element,
            }),
            Expr::param(&result),
            result,
        );
        self.insert(Owner::Operation, field)
    }

    /// Whether this field or anything reachable below it (through fragment
    /// spreads) requires a capability.
    pub fn has_services(&self, id: FieldId) -> bool {
        let field = &self.fields[id];
        match &field.kind {
            FieldKind::FragmentSpread { fragment } => {
                self.fragments[*fragment].fields.iter().any(|f| self.has_services(*f))
            }
            _ => !field.services.is_empty() || field.children.iter().any(|c| self.has_services(*c)),
        }
    }

    /// Whether any operation-level query field requires a capability.
    pub fn operation_has_services(&self) -> bool {
        self.query_roots().any(|id| self.has_services(id))
    }

    pub(crate) fn query_roots(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.roots
            .iter()
            .copied()
            .filter(|id| !matches!(self.fields[*id].kind, FieldKind::Mutation(_)))
    }

    pub(crate) fn operation_name(&self) -> SmolStr {
        self.root
            .shape()
            .as_object()
            .map_or_else(|| SmolStr::new_static("Query"), |shape| shape.name().into())
    }

    fn owner_context(&self, owner: Owner) -> Result<Shared<Param>, CompileError> {
        match owner {
            Owner::Operation => Ok(Shared::clone(&self.root)),
            Owner::Fragment(id) => Ok(Shared::clone(&self.fragments[id].param)),
            Owner::Field(id) => {
                let field = &self.fields[id];
                field
                    .element()
                    .cloned()
                    .ok_or_else(|| CompileError::NotSelectable {
                        field: field.name.clone(),
                        shape: field.expr.shape().to_string(),
                    })
            }
        }
    }

    fn insert(&mut self, owner: Owner, mut field: Field) -> Result<FieldId, CompileError> {
        let (parent, siblings) = match owner {
            Owner::Operation => (self.operation_name(), &self.roots),
            Owner::Field(id) => (self.fields[id].name.clone(), &self.fields[id].children),
            Owner::Fragment(id) => (self.fragments[id].name.clone(), &self.fragments[id].fields),
        };
        if siblings.iter().any(|s| self.fields[*s].name == field.name) {
            return Err(CompileError::DuplicateField {
                parent,
                field: field.name,
            });
        }

        trace!(field = %field.name, parent = %parent, expr = %field.expr, "adding field");
        if let Owner::Field(parent_id) = owner {
            field.parent = Some(parent_id);
        }
        let id = self.fields.alloc(field);
        match owner {
            Owner::Operation => self.roots.push(id),
            Owner::Field(parent_id) => self.fields[parent_id].children.push(id),
            Owner::Fragment(fragment) => self.fragments[fragment].fields.push(id),
        }
        Ok(id)
    }

    /// Whether spreading `from` would (transitively) spread `target`.
    fn fragment_reaches(&self, from: FragmentId, target: FragmentId) -> bool {
        from == target
            || self.fragments[from].fields.iter().any(|id| match self.fields[*id].kind {
                FieldKind::FragmentSpread { fragment } => self.fragment_reaches(fragment, target),
                _ => false,
            })
    }
}
