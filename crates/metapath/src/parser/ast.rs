//! Parse tree for Metapath expressions.
//!
//! Names stay lexical here; the compiler resolves them against a static
//! context. Every node records the byte span of its source text.
pub use crate::compiler::cst::{ArithmeticOp, Axis, ComparisonOp, PathSeparator, Quantifier, SetOp};
use crate::names::LexicalName;
use crate::types::{NodeTestKind, Occurrence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or(source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(String),
    Decimal(String),
    /// Exponent notation; evaluated as a decimal.
    Double(String),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Any,
    Name(LexicalName),
    /// `prefix:*`
    Prefix(String),
    /// `Q{uri}*`
    Namespace(String),
    /// `*:local`
    LocalName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindTest {
    pub kind: NodeTestKind,
    pub name: Option<NameTest>,
    pub type_name: Option<LexicalName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(NameTest),
    Kind(KindTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    AnyItem,
    Atomic(LexicalName),
    Kind(KindTest),
    Map(Option<(LexicalName, Box<SequenceType>)>),
    Array(Option<Box<SequenceType>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceType {
    Empty,
    Typed { item: ItemType, occurrence: Occurrence },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleType {
    pub name: LexicalName,
    /// Trailing `?`: an empty operand is allowed.
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Sequence(Vec<Expr>),
    ContextItem,
    Root,
    RootedPath { separator: PathSeparator, relative: Box<Expr> },
    Path { separator: PathSeparator, left: Box<Expr>, right: Box<Expr> },
    Step { axis: Axis, test: NodeTest, predicates: Vec<Expr> },
    Filter { base: Box<Expr>, predicates: Vec<Expr> },
    VariableRef(LexicalName),
    FunctionCall { name: LexicalName, args: Vec<Expr> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    If { condition: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr> },
    ValueComparison { op: ComparisonOp, left: Box<Expr>, right: Box<Expr> },
    GeneralComparison { op: ComparisonOp, left: Box<Expr>, right: Box<Expr> },
    Arithmetic { op: ArithmeticOp, left: Box<Expr>, right: Box<Expr> },
    Negate(Box<Expr>),
    UnaryPlus(Box<Expr>),
    Range { start: Box<Expr>, end: Box<Expr> },
    StringConcat(Vec<Expr>),
    SetOperation { op: SetOp, left: Box<Expr>, right: Box<Expr> },
    InstanceOf { operand: Box<Expr>, ty: SequenceType },
    Treat { operand: Box<Expr>, ty: SequenceType },
    Cast { operand: Box<Expr>, target: SingleType },
    Castable { operand: Box<Expr>, target: SingleType },
    Let { bindings: Vec<(LexicalName, Expr)>, body: Box<Expr> },
    For { bindings: Vec<(LexicalName, Expr)>, body: Box<Expr> },
    Quantified { quantifier: Quantifier, bindings: Vec<(LexicalName, Expr)>, satisfies: Box<Expr> },
    MapConstructor(Vec<(Expr, Expr)>),
    SquareArray(Vec<Expr>),
    CurlyArray(Option<Box<Expr>>),
}
