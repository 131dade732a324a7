//! Two-stage compilation of selection trees.
//!
//! Stage 1 is compiled with service fields excluded and runs over the root
//! value. Stage 2, present only when the tree needs a capability, runs over
//! the stage-1 value: it reads the members stage 1 already computed and calls
//! services for the rest.

mod compile;
mod compiled;

use tracing::{debug, trace};

use crate::{
    Shared,
    argument::Variables,
    capability::CapabilityProvider,
    error::{CompileError, ExecutionError},
    ir::{Expr, Param},
    selection::{FieldId, FieldKind, Members, SelectionTree},
    value::Value,
};

#[cfg(test)]
pub(crate) use compile::eval;
pub use compiled::{CompiledExpr, Env, Executable};

/// Options for one compilation pass.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Leave out fields that need a capability, contributing their pure
    /// dependencies instead.
    pub exclude_service_fields: bool,
    /// Expression for a previous pass's value at this level.
    pub replacement: Option<Expr>,
    /// The replacement is the value of the field being compiled rather than
    /// of its parent.
    pub use_replacement_directly: bool,
}

impl PassOptions {
    pub fn pure() -> Self {
        Self {
            exclude_service_fields: true,
            ..Default::default()
        }
    }

    pub fn full() -> Self {
        Self::default()
    }

    /// A full pass reading from `replacement` wherever it can.
    pub fn merge(replacement: Expr) -> Self {
        Self {
            replacement: Some(replacement),
            ..Default::default()
        }
    }
}

/// One compiled pass: its root placeholder, its IR and, unless compiled
/// without execution, the runnable closure.
#[derive(Debug)]
pub struct Stage {
    param: Shared<Param>,
    expr: Expr,
    executable: Option<Executable>,
}

impl Stage {
    fn new(param: Shared<Param>, expr: Expr, variables: &Shared<Param>, no_execution: bool) -> Self {
        trace!(param = %param.name(), expr = %expr, "stage");
        let executable = (!no_execution)
            .then(|| Executable::new(Shared::clone(&param), &expr).with_variables(Shared::clone(variables)));
        Self {
            param,
            expr,
            executable,
        }
    }

    pub fn param(&self) -> &Shared<Param> {
        &self.param
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn executable(&self) -> Option<&Executable> {
        self.executable.as_ref()
    }
}

/// Both stages of a compiled query. Neither stage depends on variable
/// values, so one compiled query serves every set of variables.
#[derive(Debug)]
pub struct CompiledQuery {
    stage1: Stage,
    stage2: Option<Stage>,
    variables: Value,
}

impl CompiledQuery {
    pub fn stage1(&self) -> &Stage {
        &self.stage1
    }

    pub fn stage2(&self) -> Option<&Stage> {
        self.stage2.as_ref()
    }

    /// Runs stage 1 over `root`, then stage 2 (if any) over the stage-1 value,
    /// with the variables the selection tree was built with.
    ///
    /// Returns `Ok(None)` when the query was compiled without execution.
    pub fn execute(&self, root: &Value, provider: &dyn CapabilityProvider) -> Result<Option<Value>, ExecutionError> {
        self.run(root, &self.variables, provider)
    }

    /// Like [`CompiledQuery::execute`], with another set of variables.
    pub fn execute_with(
        &self,
        root: &Value,
        variables: &Variables,
        provider: &dyn CapabilityProvider,
    ) -> Result<Option<Value>, ExecutionError> {
        self.run(root, &variables.to_value(), provider)
    }

    fn run(
        &self,
        root: &Value,
        variables: &Value,
        provider: &dyn CapabilityProvider,
    ) -> Result<Option<Value>, ExecutionError> {
        let Some(stage1) = self.stage1.executable() else {
            return Ok(None);
        };
        let value = stage1.run_with(root, variables, provider)?;

        match self.stage2.as_ref().and_then(Stage::executable) {
            Some(stage2) => stage2.run_with(&value, variables, provider).map(Some),
            None => Ok(Some(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler {
    no_execution: bool,
}

impl Compiler {
    pub fn new(no_execution: bool) -> Self {
        Self { no_execution }
    }

    /// Compiles a single pass of the operation's query fields.
    pub fn compile_pass(&self, tree: &SelectionTree, options: &PassOptions) -> Expr {
        tree.compile_operation(options)
    }

    pub fn compile(&self, tree: &SelectionTree) -> CompiledQuery {
        let root = Shared::clone(tree.root());
        if !tree.operation_has_services() {
            debug!("no service fields, compiling a single stage");
            let expr = self.compile_pass(tree, &PassOptions::full());
            return self.query(tree, Stage::new(root, expr, tree.variables(), self.no_execution), None);
        }

        let pure = self.compile_pass(tree, &PassOptions::pure());
        let merged = Param::new("stage1", pure.shape());
        let full = self.compile_pass(tree, &PassOptions::merge(Expr::param(&merged)));
        debug!("compiled two stages");

        self.query(
            tree,
            Stage::new(root, pure, tree.variables(), self.no_execution),
            Some(Stage::new(merged, full, tree.variables(), self.no_execution)),
        )
    }

    /// Compiles the selection of mutation field `id` over the procedure's
    /// result; the result value is the root of the returned query.
    pub fn compile_mutation(&self, tree: &SelectionTree, id: FieldId) -> Result<CompiledQuery, CompileError> {
        let field = tree.field(id);
        let FieldKind::Mutation(mutation) = field.kind() else {
            return Err(CompileError::NotAMutation(field.name().into()));
        };
        let result = Shared::clone(&mutation.result);

        let variables = tree.variables();

        if !tree.has_services(id) {
            let expr = single(tree, id, &PassOptions::full()).unwrap_or(Expr::param(&result));
            return Ok(self.query(tree, Stage::new(result, expr, variables, self.no_execution), None));
        }

        let Some(pure) = single(tree, id, &PassOptions::pure()) else {
            debug!(mutation = %field.name(), "nothing pure to select, compiling a single stage");
            let expr = single(tree, id, &PassOptions::full()).unwrap_or(Expr::param(&result));
            return Ok(self.query(tree, Stage::new(result, expr, variables, self.no_execution), None));
        };

        let merged = Param::new("stage1", pure.shape());
        let options = PassOptions {
            use_replacement_directly: true,
            ..PassOptions::merge(Expr::param(&merged))
        };
        let full = single(tree, id, &options).unwrap_or(Expr::param(&merged));
        debug!(mutation = %field.name(), "compiled two stages");

        Ok(self.query(
            tree,
            Stage::new(result, pure, variables, self.no_execution),
            Some(Stage::new(merged, full, variables, self.no_execution)),
        ))
    }

    fn query(&self, tree: &SelectionTree, stage1: Stage, stage2: Option<Stage>) -> CompiledQuery {
        CompiledQuery {
            stage1,
            stage2,
            variables: tree.bound_variables().to_value(),
        }
    }
}

/// The expression field `id` contributes under its own name, if any.
fn single(tree: &SelectionTree, id: FieldId, options: &PassOptions) -> Option<Expr> {
    let mut out = Members::new();
    tree.compile_field(id, None, options, &mut out);
    out.shift_remove(tree.field(id).name())
}
