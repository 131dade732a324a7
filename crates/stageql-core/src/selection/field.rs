use std::sync::OnceLock;

use smallvec::SmallVec;
use smol_str::SmolStr;
use tracing::debug;

use crate::{
    Shared,
    arena::ArenaId,
    argument::{ArgumentSet, RequestArguments, Variables},
    capability::Capability,
    extension::FieldExtension,
    ir::{Expr, Extracted, Param, extract},
    mutation::MutationDescriptor,
};

pub type FieldId = ArenaId<Field>;
pub type FragmentId = ArenaId<Fragment>;

#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar,
    /// Children are expressed over `element`, bound to the field's value.
    Object {
        element: Shared<Param>,
    },
    /// Children are expressed over `element`, bound to each item.
    List {
        element: Shared<Param>,
    },
    FragmentSpread {
        fragment: FragmentId,
    },
    Mutation(MutationSelection),
}

/// A selected mutation: the procedure call and the selection over its result.
#[derive(Debug, Clone)]
pub struct MutationSelection {
    pub descriptor: Shared<MutationDescriptor>,
    pub request: RequestArguments,
    pub variables: Option<Variables>,
    /// Placeholder for the procedure's result.
    pub result: Shared<Param>,
    /// Element placeholder when the result has selectable members.
    pub element: Option<Shared<Param>>,
}

/// A node of the requested-output tree.
#[derive(Debug)]
pub struct Field {
    pub(crate) name: SmolStr,
    pub(crate) kind: FieldKind,
    pub(crate) expr: Expr,
    pub(crate) context: Shared<Param>,
    pub(crate) parent: Option<FieldId>,
    pub(crate) services: SmallVec<[Capability; 2]>,
    pub(crate) extensions: Vec<Shared<dyn FieldExtension>>,
    pub(crate) arguments: ArgumentSet,
    pub(crate) children: Vec<FieldId>,
    pub(crate) extracted: OnceLock<Option<Extracted>>,
}

impl Field {
    pub(crate) fn new(name: SmolStr, kind: FieldKind, expr: Expr, context: Shared<Param>) -> Self {
        Self {
            services: expr.capabilities(),
            name,
            kind,
            expr,
            context,
            parent: None,
            extensions: Vec::new(),
            arguments: ArgumentSet::new(),
            children: Vec::new(),
            extracted: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// How this field's value is derived from its context.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn context(&self) -> &Shared<Param> {
        &self.context
    }

    pub fn parent(&self) -> Option<FieldId> {
        self.parent
    }

    /// Capabilities this field's own expression requires.
    pub fn services(&self) -> &[Capability] {
        &self.services
    }

    pub fn arguments(&self) -> &ArgumentSet {
        &self.arguments
    }

    pub fn extensions(&self) -> &[Shared<dyn FieldExtension>] {
        &self.extensions
    }

    pub fn children(&self) -> &[FieldId] {
        &self.children
    }

    /// Placeholder the children of this field are expressed over.
    pub fn element(&self) -> Option<&Shared<Param>> {
        match &self.kind {
            FieldKind::Object { element } | FieldKind::List { element } => Some(element),
            FieldKind::Mutation(mutation) => mutation.element.as_ref(),
            FieldKind::Scalar | FieldKind::FragmentSpread { .. } => None,
        }
    }

    /// Pure sub-expressions of this field's own expression, extracted on
    /// first use and reused afterwards.
    pub fn extracted(&self) -> Option<&Extracted> {
        self.extracted
            .get_or_init(|| {
                let extracted = extract(&self.expr, &self.context);
                debug!(
                    field = %self.name,
                    extracted = extracted.as_ref().map_or(0, Vec::len),
                    "extracted pure dependencies"
                );
                extracted
            })
            .as_ref()
    }
}

/// A named fragment with its own type-condition placeholder.
#[derive(Debug)]
pub struct Fragment {
    pub(crate) name: SmolStr,
    pub(crate) param: Shared<Param>,
    pub(crate) fields: Vec<FieldId>,
}

impl Fragment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param(&self) -> &Shared<Param> {
        &self.param
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }
}
