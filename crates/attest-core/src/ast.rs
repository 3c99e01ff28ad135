//! Syntax tree handed over by the front-end adapter.
//!
//! The adapter parses a source module, resolves call targets where it can,
//! and serializes the result in this shape. The analyzer only ever borrows
//! these nodes; function units point into a [`ModuleAst`] for the duration of
//! one analysis run.
//!
//! Every enum is internally tagged so the JSON form stays readable:
//! `{"stmt": "raise", "exc": {...}, "span": {...}}`.
//!
//! The `impl` blocks at the bottom are builder helpers used by tests and by
//! adapters written in Rust.

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// One parsed source module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleAst {
    /// Module identity used in diagnostics (usually a dotted module path or file path).
    pub id: String,
    /// Module-level variable bindings.
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Function and class declarations in source order.
    #[serde(default)]
    pub declarations: Vec<Decl>,
}

/// A module-level variable binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    /// `true` if the adapter determined the binding can change at run time
    /// (rebound, or bound to a mutable container).
    #[serde(default)]
    pub mutable: bool,
    pub span: Span,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum Decl {
    Function(FunctionDecl),
    Class(ClassDecl),
}

/// A function or method declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub span: Span,
    #[serde(default)]
    pub params: Vec<String>,
    /// Decorator expressions, outermost first.
    #[serde(default)]
    pub decorators: Vec<Expr>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

/// A class declaration with its methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub span: Span,
    /// Base class names as written (last path segment is used for exception hierarchies).
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub decorators: Vec<Expr>,
    #[serde(default)]
    pub methods: Vec<FunctionDecl>,
}

/// Statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Stmt {
    Expr {
        value: Expr,
    },
    Assign {
        targets: Vec<Expr>,
        value: Expr,
        span: Span,
    },
    AugAssign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        span: Span,
    },
    /// `raise`, `raise exc`, or `raise exc from cause`.
    Raise {
        #[serde(default)]
        exc: Option<Expr>,
        #[serde(default)]
        cause: Option<Expr>,
        span: Span,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        #[serde(default)]
        handlers: Vec<Handler>,
        #[serde(default)]
        orelse: Vec<Stmt>,
        #[serde(default)]
        finalbody: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
    Assert {
        test: Expr,
        #[serde(default)]
        msg: Option<Expr>,
        span: Span,
    },
    Global {
        names: Vec<String>,
        span: Span,
    },
    Nonlocal {
        names: Vec<String>,
        span: Span,
    },
    /// `import a.b` / `from a import b as c`; `names` are the bound local names.
    Import {
        names: Vec<String>,
        span: Span,
    },
    Pass,
    Break,
    Continue,
}

/// One `except` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    /// Exception kinds this clause filters on. Empty means a bare `except:`.
    #[serde(default)]
    pub kinds: Vec<String>,
    /// Name bound by `except K as name`.
    #[serde(default)]
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// One `with` item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithItem {
    pub context: Expr,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    Name {
        id: String,
        /// Fully qualified path when the name refers to an imported object.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolved: Option<String>,
        span: Span,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolved: Option<String>,
        span: Span,
    },
    Call {
        func: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        keywords: Vec<Keyword>,
        target: CallTarget,
        span: Span,
    },
    Constant {
        value: Literal,
        span: Span,
    },
    Lambda {
        #[serde(default)]
        params: Vec<String>,
        body: Box<Expr>,
        span: Span,
    },
    BinOp {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    UnaryOp {
        operand: Box<Expr>,
        span: Span,
    },
    Compare {
        left: Box<Expr>,
        comparators: Vec<Expr>,
        span: Span,
    },
    BoolOp {
        values: Vec<Expr>,
        span: Span,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// List, tuple, set, or dict display.
    Collection {
        elts: Vec<Expr>,
        span: Span,
    },
    /// A comprehension; `targets` are bound inside it only.
    Comprehension {
        targets: Vec<String>,
        parts: Vec<Expr>,
        span: Span,
    },
    /// Anything else the adapter does not model (conditional expressions,
    /// f-strings, ...). Children are still analyzed.
    Other {
        #[serde(default)]
        children: Vec<Expr>,
        span: Span,
    },
}

/// A keyword argument at a call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
}

/// Literal constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Call target as resolved by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum CallTarget {
    /// A function, method (`Class.method`), or class declared in the same module.
    Local(String),
    /// A fully qualified object outside the module (`print`, `os.remove`).
    External(String),
    /// Not statically resolvable.
    Dynamic,
}

impl Expr {
    /// Source location of the expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Name { span, .. }
            | Expr::Attribute { span, .. }
            | Expr::Call { span, .. }
            | Expr::Constant { span, .. }
            | Expr::Lambda { span, .. }
            | Expr::BinOp { span, .. }
            | Expr::UnaryOp { span, .. }
            | Expr::Compare { span, .. }
            | Expr::BoolOp { span, .. }
            | Expr::Subscript { span, .. }
            | Expr::Collection { span, .. }
            | Expr::Comprehension { span, .. }
            | Expr::Other { span, .. } => *span,
        }
    }

    /// Dotted path of a name or attribute chain (`deal.pre`), preferring the
    /// adapter's resolution when present.
    pub fn dotted_path(&self) -> Option<String> {
        match self {
            Expr::Name { id, resolved, .. } => Some(resolved.clone().unwrap_or_else(|| id.clone())),
            Expr::Attribute {
                value,
                attr,
                resolved,
                ..
            } => match resolved {
                Some(path) => Some(path.clone()),
                None => value.dotted_path().map(|base| format!("{base}.{attr}")),
            },
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Builders
    // -----------------------------------------------------------------------

    pub fn name(id: impl Into<String>, span: Span) -> Expr {
        Expr::Name {
            id: id.into(),
            resolved: None,
            span,
        }
    }

    /// A name referring to an imported object.
    pub fn imported(id: impl Into<String>, path: impl Into<String>, span: Span) -> Expr {
        Expr::Name {
            id: id.into(),
            resolved: Some(path.into()),
            span,
        }
    }

    /// An attribute chain such as `deal.pre` or `os.environ`, resolved to itself.
    pub fn dotted(path: &str, span: Span) -> Expr {
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or_default();
        let mut expr = Expr::name(first, span);
        let mut so_far = first.to_string();
        for part in parts {
            so_far.push('.');
            so_far.push_str(part);
            expr = Expr::Attribute {
                value: Box::new(expr),
                attr: part.to_string(),
                resolved: Some(so_far.clone()),
                span,
            };
        }
        expr
    }

    pub fn call(func: Expr, target: CallTarget, args: Vec<Expr>, span: Span) -> Expr {
        Expr::Call {
            func: Box::new(func),
            args,
            keywords: Vec::new(),
            target,
            span,
        }
    }

    /// Call of a function declared in the same module.
    pub fn call_local(name: &str, args: Vec<Expr>, span: Span) -> Expr {
        Expr::call(
            Expr::name(name, span),
            CallTarget::Local(name.to_string()),
            args,
            span,
        )
    }

    /// Call of an external object by its qualified path.
    pub fn call_external(path: &str, args: Vec<Expr>, span: Span) -> Expr {
        Expr::call(
            Expr::dotted(path, span),
            CallTarget::External(path.to_string()),
            args,
            span,
        )
    }

    pub fn int(value: i64, span: Span) -> Expr {
        Expr::Constant {
            value: Literal::Int(value),
            span,
        }
    }

    pub fn str(value: impl Into<String>, span: Span) -> Expr {
        Expr::Constant {
            value: Literal::Str(value.into()),
            span,
        }
    }

    pub fn lambda(params: &[&str], body: Expr, span: Span) -> Expr {
        Expr::Lambda {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
            span,
        }
    }

    pub fn binop(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::BinOp {
            left: Box::new(left),
            right: Box::new(right),
            span,
        }
    }

    pub fn compare(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::Compare {
            left: Box::new(left),
            comparators: vec![right],
            span,
        }
    }
}

impl Stmt {
    pub fn expr(value: Expr) -> Stmt {
        Stmt::Expr { value }
    }

    pub fn ret(value: Option<Expr>, span: Span) -> Stmt {
        Stmt::Return { value, span }
    }

    /// `raise Kind()`, with `Kind` treated as an external (built-in) class.
    pub fn raise_new(kind: &str, span: Span) -> Stmt {
        Stmt::Raise {
            exc: Some(Expr::call_external(kind, Vec::new(), span)),
            cause: None,
            span,
        }
    }

    /// Bare `raise`.
    pub fn reraise(span: Span) -> Stmt {
        Stmt::Raise {
            exc: None,
            cause: None,
            span,
        }
    }

    pub fn assign(target: &str, value: Expr, span: Span) -> Stmt {
        Stmt::Assign {
            targets: vec![Expr::name(target, span)],
            value,
            span,
        }
    }

    pub fn if_(test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Stmt {
        Stmt::If { test, body, orelse }
    }

    pub fn try_(body: Vec<Stmt>, handlers: Vec<Handler>, finalbody: Vec<Stmt>) -> Stmt {
        Stmt::Try {
            body,
            handlers,
            orelse: Vec::new(),
            finalbody,
        }
    }
}

impl Handler {
    /// `except (K1, K2):` clause.
    pub fn catching(kinds: &[&str], body: Vec<Stmt>, span: Span) -> Handler {
        Handler {
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
            name: None,
            body,
            span,
        }
    }

    /// Bare `except:` clause.
    pub fn catch_all(body: Vec<Stmt>, span: Span) -> Handler {
        Handler {
            kinds: Vec::new(),
            name: None,
            body,
            span,
        }
    }

    pub fn is_catch_all(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, span: Span) -> FunctionDecl {
        FunctionDecl {
            name: name.into(),
            span,
            params: Vec::new(),
            decorators: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_decorator(mut self, decorator: Expr) -> Self {
        self.decorators.push(decorator);
        self
    }

    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }
}

impl ModuleAst {
    pub fn new(id: impl Into<String>) -> ModuleAst {
        ModuleAst {
            id: id.into(),
            bindings: Vec::new(),
            declarations: Vec::new(),
        }
    }

    pub fn with_function(mut self, func: FunctionDecl) -> Self {
        self.declarations.push(Decl::Function(func));
        self
    }

    pub fn with_class(mut self, class: ClassDecl) -> Self {
        self.declarations.push(Decl::Class(class));
        self
    }

    pub fn with_binding(mut self, name: &str, mutable: bool, span: Span) -> Self {
        self.bindings.push(Binding {
            name: name.to_string(),
            mutable,
            span,
        });
        self
    }
}
