//! Builds the IR of one compilation pass over a selection tree.

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::trace;

use super::{Field, FieldId, FieldKind, SelectionTree};
use crate::{
    Shared,
    compiler::PassOptions,
    extension::ExtensionContext,
    ir::{Expr, Param, substitute},
};

/// Members of an object under construction, in selection order.
pub(crate) type Members = IndexMap<SmolStr, Expr>;

impl SelectionTree {
    /// The operation's result object over [`SelectionTree::root`] (or over the
    /// replacement in `options`). Mutation fields are compiled separately.
    pub(crate) fn compile_operation(&self, options: &PassOptions) -> Expr {
        let mut fields = Members::new();
        for id in self.query_roots() {
            self.compile_field(id, None, options, &mut fields);
        }
        Expr::Object {
            name: self.operation_name(),
            fields: fields.into_iter().collect(),
        }
    }

    /// Appends what field `id` contributes to this pass to `out`.
    ///
    /// `rebase` is the placeholder standing in for the field's own context
    /// when the field comes from a fragment spread. A field may contribute
    /// nothing, itself, or (in a pure pass) the pure values its services need.
    pub(crate) fn compile_field(
        &self,
        id: FieldId,
        rebase: Option<&Shared<Param>>,
        options: &PassOptions,
        out: &mut Members,
    ) {
        let field = &self.fields[id];
        match &field.kind {
            FieldKind::Scalar => self.compile_scalar(field, rebase, options, out),
            FieldKind::Object { .. } | FieldKind::List { .. } => {
                self.compile_selection(id, field, rebase, options, out)
            }
            FieldKind::Mutation(_) if field.element().is_some() => {
                self.compile_selection(id, field, rebase, options, out)
            }
            FieldKind::Mutation(_) => self.compile_scalar(field, rebase, options, out),
            FieldKind::FragmentSpread { fragment } => {
                let target = match rebase {
                    Some(target) => Shared::clone(target),
                    None => Shared::clone(&field.context),
                };
                for id in &self.fragments[*fragment].fields {
                    self.compile_field(*id, Some(&target), options, out);
                }
            }
        }
    }

    fn compile_scalar(&self, field: &Field, rebase: Option<&Shared<Param>>, options: &PassOptions, out: &mut Members) {
        let own_services = !field.services.is_empty();
        if options.exclude_service_fields && own_services {
            self.expand_extracted(field, rebase, options, out);
            return;
        }

        if let Some(replacement) = &options.replacement {
            if options.use_replacement_directly {
                push(out, field.name.clone(), replacement.clone());
                return;
            }
            if !own_services && let Some(shape) = replacement.shape().member(&field.name) {
                let value = replacement.clone().member_as(field.name.clone(), shape.clone());
                push(out, field.name.clone(), value);
                return;
            }
        }

        let ctx = extension_context(field);
        let value = field
            .extensions
            .iter()
            .fold(relocate(&field.expr, field, rebase, options), |value, extension| {
                extension.scalar(value, &ctx)
            });
        push(out, field.name.clone(), value);
    }

    fn compile_selection(
        &self,
        id: FieldId,
        field: &Field,
        rebase: Option<&Shared<Param>>,
        options: &PassOptions,
        out: &mut Members,
    ) {
        let own_services = !field.services.is_empty();
        if options.exclude_service_fields && own_services {
            self.expand_extracted(field, rebase, options, out);
            return;
        }
        let Some(element) = field.element() else {
            return;
        };
        let is_list = match &field.kind {
            FieldKind::List { .. } => true,
            FieldKind::Mutation(mutation) => mutation.descriptor.returns().is_list(),
            _ => false,
        };
        let ctx = extension_context(field);

        // Either read the already computed value from the replacement, or
        // evaluate the field from source data and run its extensions.
        let (source, element, child_replacement, from_source) = match &options.replacement {
            Some(replacement) if options.use_replacement_directly => {
                let element = fresh_element(&field.name, replacement, is_list);
                (replacement.clone(), Shared::clone(&element), Some(element), false)
            }
            Some(replacement) if !own_services && replacement.shape().has_member(&field.name) => {
                let shape = replacement.shape().member(&field.name).cloned().unwrap_or_default();
                let source = replacement.clone().member_as(field.name.clone(), shape);
                let element = fresh_element(&field.name, &source, is_list);
                (source, Shared::clone(&element), Some(element), false)
            }
            _ => {
                let source = field
                    .extensions
                    .iter()
                    .fold(relocate(&field.expr, field, rebase, options), |source, extension| {
                        extension.pre_selection(source, &ctx)
                    });
                (source, Shared::clone(element), None, true)
            }
        };

        let child_options = PassOptions {
            exclude_service_fields: options.exclude_service_fields,
            replacement: child_replacement.as_ref().map(Expr::param),
            use_replacement_directly: false,
        };
        let mut fields = Members::new();
        for child in &field.children {
            self.compile_field(*child, None, &child_options, &mut fields);
        }

        // A pure pass keeps an empty shell for service-only selections so the
        // next pass has something to navigate to.
        if fields.is_empty() && !(options.exclude_service_fields && self.has_services(id)) {
            trace!(field = %field.name, "selection contributes nothing");
            return;
        }

        let body = Expr::Object {
            name: element
                .shape()
                .as_object()
                .map_or_else(|| field.name.clone(), |shape| shape.name().into()),
            fields: fields.into_iter().collect(),
        };
        let mut value = if is_list {
            source.project_with(element, body)
        } else {
            Expr::scope(element, source, body)
        };
        if from_source {
            value = field
                .extensions
                .iter()
                .fold(value, |value, extension| extension.post_selection(value, &ctx));
        }

        trace!(field = %field.name, expr = %value, "compiled selection");
        push(out, field.name.clone(), value);
    }

    /// Contributes the field's extracted pure dependencies instead of the
    /// field. A field with nothing to extract contributes nothing.
    fn expand_extracted(&self, field: &Field, rebase: Option<&Shared<Param>>, options: &PassOptions, out: &mut Members) {
        let Some(extracted) = field.extracted() else {
            trace!(field = %field.name, "service field omitted from pure pass");
            return;
        };
        for (name, expr) in extracted {
            push(out, name.clone(), relocate(expr, field, rebase, options));
        }
    }
}

/// Rewrites `expr`, written over the field's own context, onto the context
/// this pass evaluates it in.
fn relocate(expr: &Expr, field: &Field, rebase: Option<&Shared<Param>>, options: &PassOptions) -> Expr {
    match (&options.replacement, rebase) {
        (Some(replacement), _) => substitute(expr, &field.context, replacement),
        (None, Some(target)) if target.id() != field.context.id() => {
            substitute(expr, &field.context, &Expr::param(target))
        }
        _ => expr.clone(),
    }
}

fn fresh_element(name: &str, source: &Expr, is_list: bool) -> Shared<Param> {
    if is_list {
        source.element_param(name)
    } else {
        Param::new(name, source.shape())
    }
}

fn extension_context(field: &Field) -> ExtensionContext<'_> {
    ExtensionContext {
        field: &field.name,
        arguments: &field.arguments,
    }
}

/// First contribution of a name wins; fragments and extracted members may
/// repeat one.
fn push(out: &mut Members, name: SmolStr, expr: Expr) {
    out.entry(name).or_insert(expr);
}
