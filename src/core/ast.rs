//! Syntax tree for the capability DSL.
//!
//! Accepted source is parsed exactly once into this tree; the sandbox
//! policy reasons over `NodeKind`, and the interpreter walks the tree
//! directly. There is no second compilation step and no dynamic evaluation
//! surface beyond what these nodes can express.

/// Structural kind of a syntax node, the unit the sandbox allow-list is
/// expressed in. `Lambda` and `Global` parse but are outside the baseline
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Module,
    FunctionDef,
    Param,
    Return,
    Assign,
    ExprStmt,
    If,
    For,
    While,
    Break,
    Continue,
    Pass,
    Import,
    Global,
    BoolOp,
    BinOp,
    UnaryOp,
    Compare,
    Call,
    Attribute,
    Index,
    Name,
    NumberLit,
    StringLit,
    FString,
    BoolLit,
    NoneLit,
    ListLit,
    DictLit,
    Lambda,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Module => "Module",
            NodeKind::FunctionDef => "FunctionDef",
            NodeKind::Param => "Param",
            NodeKind::Return => "Return",
            NodeKind::Assign => "Assign",
            NodeKind::ExprStmt => "ExprStmt",
            NodeKind::If => "If",
            NodeKind::For => "For",
            NodeKind::While => "While",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::Pass => "Pass",
            NodeKind::Import => "Import",
            NodeKind::Global => "Global",
            NodeKind::BoolOp => "BoolOp",
            NodeKind::BinOp => "BinOp",
            NodeKind::UnaryOp => "UnaryOp",
            NodeKind::Compare => "Compare",
            NodeKind::Call => "Call",
            NodeKind::Attribute => "Attribute",
            NodeKind::Index => "Index",
            NodeKind::Name => "Name",
            NodeKind::NumberLit => "NumberLit",
            NodeKind::StringLit => "StringLit",
            NodeKind::FString => "FString",
            NodeKind::BoolLit => "BoolLit",
            NodeKind::NoneLit => "NoneLit",
            NodeKind::ListLit => "ListLit",
            NodeKind::DictLit => "DictLit",
            NodeKind::Lambda => "Lambda",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOpKind {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    FString(Vec<FStringPart>),
    Bool(bool),
    None,
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    /// Chained comparison: `left op0 e0 op1 e1 ...`
    Compare {
        left: Box<Expr>,
        rest: Vec<(CmpOpKind, Expr)>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    FunctionDef(FunctionDef),
    Return(Option<Expr>),
    Assign { target: String, value: Expr },
    Expr(Expr),
    If {
        /// `(condition, block)` for the `if` and each `elif`, in order.
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
    /// Dotted module path, e.g. `collections.abc`.
    Import(String),
    Global(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

impl Module {
    /// Visit the kind of every node in the tree, preorder.
    pub fn walk_kinds(&self, f: &mut dyn FnMut(NodeKind)) {
        f(NodeKind::Module);
        walk_stmts(&self.body, f);
    }

    /// Root module name of every import statement, in source order.
    pub fn import_roots(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_imports(&self.body, &mut out);
        out
    }

    /// Every callee that is a bare name, at any nesting depth.
    pub fn bare_callees(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut visit = |expr: &Expr| {
            if let Expr::Call { func, .. } = expr {
                if let Expr::Name(name) = func.as_ref() {
                    out.push(name.clone());
                }
            }
        };
        for_each_expr(&self.body, &mut visit);
        out
    }

    /// Top-level function definitions, in source order.
    pub fn function_defs(&self) -> Vec<&FunctionDef> {
        self.body
            .iter()
            .filter_map(|s| match s {
                Stmt::FunctionDef(def) => Some(def),
                _ => None,
            })
            .collect()
    }
}

/// True if any statement in the block (or a nested block) is a `return`.
pub fn contains_return(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| match s {
        Stmt::Return(_) => true,
        Stmt::FunctionDef(def) => contains_return(&def.body),
        Stmt::If { branches, orelse } => {
            branches.iter().any(|(_, b)| contains_return(b)) || contains_return(orelse)
        }
        Stmt::For { body, .. } | Stmt::While { body, .. } => contains_return(body),
        _ => false,
    })
}

fn walk_stmts(stmts: &[Stmt], f: &mut dyn FnMut(NodeKind)) {
    for stmt in stmts {
        match stmt {
            Stmt::FunctionDef(def) => {
                f(NodeKind::FunctionDef);
                for _ in &def.params {
                    f(NodeKind::Param);
                }
                walk_stmts(&def.body, f);
            }
            Stmt::Return(value) => {
                f(NodeKind::Return);
                if let Some(v) = value {
                    walk_expr(v, f);
                }
            }
            Stmt::Assign { value, .. } => {
                f(NodeKind::Assign);
                f(NodeKind::Name);
                walk_expr(value, f);
            }
            Stmt::Expr(e) => {
                f(NodeKind::ExprStmt);
                walk_expr(e, f);
            }
            Stmt::If { branches, orelse } => {
                f(NodeKind::If);
                for (cond, block) in branches {
                    walk_expr(cond, f);
                    walk_stmts(block, f);
                }
                walk_stmts(orelse, f);
            }
            Stmt::For { iter, body, .. } => {
                f(NodeKind::For);
                f(NodeKind::Name);
                walk_expr(iter, f);
                walk_stmts(body, f);
            }
            Stmt::While { cond, body } => {
                f(NodeKind::While);
                walk_expr(cond, f);
                walk_stmts(body, f);
            }
            Stmt::Break => f(NodeKind::Break),
            Stmt::Continue => f(NodeKind::Continue),
            Stmt::Pass => f(NodeKind::Pass),
            Stmt::Import(_) => f(NodeKind::Import),
            Stmt::Global(_) => f(NodeKind::Global),
        }
    }
}

fn walk_expr(expr: &Expr, f: &mut dyn FnMut(NodeKind)) {
    match expr {
        Expr::Name(_) => f(NodeKind::Name),
        Expr::Int(_) | Expr::Float(_) => f(NodeKind::NumberLit),
        Expr::Str(_) => f(NodeKind::StringLit),
        Expr::Bool(_) => f(NodeKind::BoolLit),
        Expr::None => f(NodeKind::NoneLit),
        Expr::FString(parts) => {
            f(NodeKind::FString);
            for part in parts {
                if let FStringPart::Expr(e) = part {
                    walk_expr(e, f);
                }
            }
        }
        Expr::List(items) => {
            f(NodeKind::ListLit);
            for item in items {
                walk_expr(item, f);
            }
        }
        Expr::Dict(pairs) => {
            f(NodeKind::DictLit);
            for (k, v) in pairs {
                walk_expr(k, f);
                walk_expr(v, f);
            }
        }
        Expr::BinOp { left, right, .. } => {
            f(NodeKind::BinOp);
            walk_expr(left, f);
            walk_expr(right, f);
        }
        Expr::UnaryOp { operand, .. } => {
            f(NodeKind::UnaryOp);
            walk_expr(operand, f);
        }
        Expr::BoolOp { values, .. } => {
            f(NodeKind::BoolOp);
            for v in values {
                walk_expr(v, f);
            }
        }
        Expr::Compare { left, rest } => {
            f(NodeKind::Compare);
            walk_expr(left, f);
            for (_, e) in rest {
                walk_expr(e, f);
            }
        }
        Expr::Call { func, args } => {
            f(NodeKind::Call);
            walk_expr(func, f);
            for arg in args {
                walk_expr(arg, f);
            }
        }
        Expr::Attribute { value, .. } => {
            f(NodeKind::Attribute);
            walk_expr(value, f);
        }
        Expr::Index { value, index } => {
            f(NodeKind::Index);
            walk_expr(value, f);
            walk_expr(index, f);
        }
        Expr::Lambda { body, .. } => {
            f(NodeKind::Lambda);
            walk_expr(body, f);
        }
    }
}

fn collect_imports(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Import(path) => {
                let root = path.split('.').next().unwrap_or(path).to_string();
                out.push(root);
            }
            Stmt::FunctionDef(def) => collect_imports(&def.body, out),
            Stmt::If { branches, orelse } => {
                for (_, block) in branches {
                    collect_imports(block, out);
                }
                collect_imports(orelse, out);
            }
            Stmt::For { body, .. } | Stmt::While { body, .. } => collect_imports(body, out),
            _ => {}
        }
    }
}

fn for_each_expr(stmts: &[Stmt], f: &mut dyn FnMut(&Expr)) {
    fn visit_expr(expr: &Expr, f: &mut dyn FnMut(&Expr)) {
        f(expr);
        match expr {
            Expr::FString(parts) => {
                for part in parts {
                    if let FStringPart::Expr(e) = part {
                        visit_expr(e, f);
                    }
                }
            }
            Expr::List(items) => {
                for item in items {
                    visit_expr(item, f);
                }
            }
            Expr::Dict(pairs) => {
                for (k, v) in pairs {
                    visit_expr(k, f);
                    visit_expr(v, f);
                }
            }
            Expr::BinOp { left, right, .. } => {
                visit_expr(left, f);
                visit_expr(right, f);
            }
            Expr::UnaryOp { operand, .. } => visit_expr(operand, f),
            Expr::BoolOp { values, .. } => {
                for v in values {
                    visit_expr(v, f);
                }
            }
            Expr::Compare { left, rest } => {
                visit_expr(left, f);
                for (_, e) in rest {
                    visit_expr(e, f);
                }
            }
            Expr::Call { func, args } => {
                visit_expr(func, f);
                for arg in args {
                    visit_expr(arg, f);
                }
            }
            Expr::Attribute { value, .. } => visit_expr(value, f),
            Expr::Index { value, index } => {
                visit_expr(value, f);
                visit_expr(index, f);
            }
            Expr::Lambda { body, .. } => visit_expr(body, f),
            _ => {}
        }
    }

    fn visit_stmts(stmts: &[Stmt], f: &mut dyn FnMut(&Expr)) {
        for stmt in stmts {
            match stmt {
                Stmt::FunctionDef(def) => visit_stmts(&def.body, f),
                Stmt::Return(Some(e)) | Stmt::Assign { value: e, .. } | Stmt::Expr(e) => {
                    visit_expr(e, f)
                }
                Stmt::If { branches, orelse } => {
                    for (cond, block) in branches {
                        visit_expr(cond, f);
                        visit_stmts(block, f);
                    }
                    visit_stmts(orelse, f);
                }
                Stmt::For { iter, body, .. } => {
                    visit_expr(iter, f);
                    visit_stmts(body, f);
                }
                Stmt::While { cond, body } => {
                    visit_expr(cond, f);
                    visit_stmts(body, f);
                }
                _ => {}
            }
        }
    }

    visit_stmts(stmts, f)
}
