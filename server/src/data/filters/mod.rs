//! Filter expression compiler
//!
//! Turns JSON filter documents into parameterized SQL conditions over a set of
//! registered entities:
//! - `operators` - Field operators, value kinds and operand shapes
//! - `registry` - Entity metadata (fields, columns, relations)
//! - `ast` - Typed filter tree
//! - `parser` - JSON to filter tree, with entity auto-detection
//! - `planner` - Relation paths to SQL join aliases
//! - `resolver` - Filter tree to backend-neutral conditions
//! - `condition` - Condition tree and SQL rendering
//! - `engine` - Compile and search facade

pub mod ast;
pub mod condition;
pub mod engine;
pub mod error;
pub mod operators;
pub mod parser;
pub mod planner;
pub mod registry;
pub mod resolver;

pub use ast::{
    ALIAS_TOKEN, ArrayCondition, ArrayPredicate, EntityFilter, FieldCondition, FilterNode,
    NestedFilter, Quantifier, RawCondition, SizeOp,
};
pub use condition::{ColumnRef, CompareOp, Condition, JoinClause, SqlParams, SqlValue, Subquery};
pub use engine::{CompiledFilter, FilterEngine, SearchRequest};
pub use error::FilterError;
pub use operators::{FieldOperator, FilterValue, Operand, OperandShape, ValueKind};
pub use parser::{FilterLimits, FilterParser};
pub use planner::{JoinPlan, JoinPlanner, JoinScope, PlannedJoin};
pub use registry::{
    Cardinality, EntityMetadata, FieldMetadata, JoinDescriptor, JoinPredicate, MetadataRegistry,
};
pub use resolver::{ConditionResolver, ResolveContext};
