//! `stageql-core` compiles GraphQL-style selection trees into staged, executable
//! closures and invokes mutation procedures.
//!
//! A query is compiled twice. Stage 1 contains only what can be read straight
//! from the data; fields that need an external capability ("service") are
//! either reduced to the pure values they depend on or left out. Stage 2 runs
//! on top of the stage-1 result, reusing its members and calling services for
//! the rest.
//!
//! ## Examples
//!
//! ```rust
//! use stageql_core::{
//!     Engine, FieldDef, NoCapabilities, ObjectShape, Owner, RequestArguments, SelectionTree, Shape, Value,
//! };
//!
//! let movie = Shape::object(
//!     ObjectShape::new("Movie")
//!         .with_member("id", Shape::int())
//!         .with_member("name", Shape::string()),
//! );
//! let query = Shape::object(ObjectShape::new("Query").with_member("movie", movie.clone()));
//!
//! let mut tree = SelectionTree::new(query);
//! let none = RequestArguments::default();
//! let movie_id = tree.add(Owner::Operation, &FieldDef::member("movie", movie), &none, None).unwrap();
//! tree.add(Owner::Field(movie_id), &FieldDef::member("name", Shape::string()), &none, None).unwrap();
//!
//! let root = Value::from(serde_json::json!({"movie": {"id": 1, "name": "Alien"}}));
//! let result = Engine::default().execute(&tree, &root, &NoCapabilities).unwrap();
//!
//! assert_eq!(result.map(|v| v.to_json()), Some(serde_json::json!({"movie": {"name": "Alien"}})));
//! ```
mod arena;
mod argument;
mod capability;
mod compiler;
mod engine;
mod error;
mod extension;
mod ir;
mod mutation;
mod schema;
mod selection;
mod shape;
mod value;

pub use arena::{Arena, ArenaId};
pub use argument::{
    ArgKind, ArgType, ArgValue, ArgumentBinding, ArgumentSet, InputField, InputShape, RequestArguments, Variables,
};
pub use capability::{Capabilities, Capability, CapabilityProvider, Instance, NoCapabilities};
pub use compiler::{CompiledExpr, CompiledQuery, Compiler, Env, Executable, PassOptions, Stage};
pub use engine::{Engine, Options};
pub use error::{CompileError, Error, ExecutionError, MutationError};
pub use extension::{
    ConvertExtension, ExtensionContext, FieldExtension, FilterExtension, PagingExtension, SortExtension,
};
pub use ir::{BinaryOp, Expr, Extracted, Param, ParamId, ServiceCall, ServiceFn, SortKey, extract, substitute};
pub use mutation::{
    ArgumentValidationContext, ArgumentValidator, CallArg, CallArgs, Invocation, InvocationResult, MutationBuilder,
    MutationDescriptor, Procedure, ProcedureParam, ValidationError, ValidationErrors, Validator,
};
pub use schema::{FieldDef, FieldNamer, InputTypes, TypeRegistry, camel_case};
pub use selection::{Field, FieldId, FieldKind, Fragment, FragmentId, MutationSelection, Owner, SelectionTree};
pub use shape::{ObjectShape, ScalarKind, Shape};
pub use value::{Object, Value};

pub type Shared<T> = std::sync::Arc<T>;

/// Boxed error returned by services and procedures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type StageqlResult<T> = Result<T, Error>;
