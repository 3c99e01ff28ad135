pub mod ast;
pub mod contract;
pub mod diagnostic;
pub mod effect;
pub mod error;
pub mod exceptions;
pub mod id;
pub mod span;
pub mod unit;

// Re-export commonly used types
pub use ast::{CallTarget, Decl, Expr, ModuleAst, Stmt};
pub use contract::{Contract, ContractKind, DeclaredKind, Marker, Payload};
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use effect::{EffectFact, FactSummary, IoChannel};
pub use error::CoreError;
pub use exceptions::{ExceptionHierarchy, ExceptionKind};
pub use id::{ClassId, UnitId};
pub use span::Span;
pub use unit::{ClassUnit, FunctionUnit, UnitBody, UnitKind, UnitOwner, UnitTable};
