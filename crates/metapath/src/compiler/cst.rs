//! Compiled expression tree.
//!
//! Names are resolved, literals are typed and cast targets are checked
//! before a tree is built, so evaluation never consults the static context
//! for resolution. Trees are immutable and `Send + Sync`.
use std::sync::Arc;

use crate::names::QName;
use crate::types::{AtomicType, ItemType, KindTest, NameTest, NodeTestKind, SequenceType};
use crate::xdm::AtomicValue;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// Source text of this subexpression.
    pub text: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn value_symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Le => "le",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Ge => "ge",
        }
    }

    pub fn general_symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "div",
            ArithmeticOp::IntegerDivide => "idiv",
            ArithmeticOp::Modulo => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Flag,
    Parent,
    Ancestor,
    AncestorOrSelf,
}

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::SelfAxis => "self",
            Axis::Flag => "flag",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
        }
    }

    /// Reverse axes number their results nearest-first.
    pub fn is_reverse(self) -> bool {
        matches!(self, Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(NameTest),
    Kind(KindTest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathSeparator {
    /// `/`
    Child,
    /// `//`, shorthand for `/descendant-or-self::node()/`
    Descendant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(AtomicValue),
    /// `E, E, ...`; `()` has no members.
    Sequence(Vec<Expr>),
    ContextItem,
    /// `/` standing alone.
    Root,
    /// `/E` or `//E`
    RootedPath { separator: PathSeparator, relative: Box<Expr> },
    Path { separator: PathSeparator, left: Box<Expr>, right: Box<Expr> },
    Step { axis: Axis, test: NodeTest, predicates: Vec<Expr> },
    /// Postfix predicates on a primary expression.
    Filter { base: Box<Expr>, predicates: Vec<Expr> },
    VariableRef(QName),
    FunctionCall { name: QName, args: Vec<Expr> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    If { condition: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr> },
    ValueComparison { op: ComparisonOp, left: Box<Expr>, right: Box<Expr> },
    GeneralComparison { op: ComparisonOp, left: Box<Expr>, right: Box<Expr> },
    Arithmetic { op: ArithmeticOp, left: Box<Expr>, right: Box<Expr> },
    Negate(Box<Expr>),
    /// Unary `+`: checks the operand is numeric and passes it through.
    UnaryPlus(Box<Expr>),
    Range { start: Box<Expr>, end: Box<Expr> },
    StringConcat(Vec<Expr>),
    SetOperation { op: SetOp, left: Box<Expr>, right: Box<Expr> },
    InstanceOf { operand: Box<Expr>, ty: SequenceType },
    Treat { operand: Box<Expr>, ty: SequenceType },
    Cast { operand: Box<Expr>, target: AtomicType, allow_empty: bool },
    Castable { operand: Box<Expr>, target: AtomicType, allow_empty: bool },
    Let { variable: QName, value: Box<Expr>, body: Box<Expr> },
    For { variable: QName, domain: Box<Expr>, body: Box<Expr> },
    Quantified { quantifier: Quantifier, bindings: Vec<(QName, Expr)>, satisfies: Box<Expr> },
    MapConstructor(Vec<(Expr, Expr)>),
    /// `[a, b]`: one member per expression.
    SquareArray(Vec<Expr>),
    /// `array { E }`: one member per item of `E`.
    CurlyArray(Box<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, text: impl Into<Arc<str>>) -> Self {
        Self { kind, text: text.into() }
    }

    /// Direct subexpressions in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        use ExprKind as K;
        match &self.kind {
            K::Literal(_) | K::ContextItem | K::Root | K::VariableRef(_) => Vec::new(),
            K::Sequence(items) | K::And(items) | K::Or(items) | K::StringConcat(items) | K::SquareArray(items) => {
                items.iter().collect()
            }
            K::FunctionCall { args, .. } => args.iter().collect(),
            K::RootedPath { relative, .. } => vec![&**relative],
            K::Path { left, right, .. }
            | K::ValueComparison { left, right, .. }
            | K::GeneralComparison { left, right, .. }
            | K::Arithmetic { left, right, .. }
            | K::SetOperation { left, right, .. } => vec![&**left, &**right],
            K::Step { predicates, .. } => predicates.iter().collect(),
            K::Filter { base, predicates } => std::iter::once(&**base).chain(predicates).collect(),
            K::If { condition, then_branch, else_branch } => vec![&**condition, &**then_branch, &**else_branch],
            K::Negate(e) | K::UnaryPlus(e) | K::CurlyArray(e) => vec![&**e],
            K::Range { start, end } => vec![&**start, &**end],
            K::InstanceOf { operand, .. }
            | K::Treat { operand, .. }
            | K::Cast { operand, .. }
            | K::Castable { operand, .. } => vec![&**operand],
            K::Let { value, body, .. } => vec![&**value, &**body],
            K::For { domain, body, .. } => vec![&**domain, &**body],
            K::Quantified { bindings, satisfies, .. } => {
                bindings.iter().map(|(_, e)| e).chain(std::iter::once(&**satisfies)).collect()
            }
            K::MapConstructor(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
        }
    }

    /// Visit this node and every descendant, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Best-effort upper bound on the item type of the result.
    pub fn static_result_type(&self) -> ItemType {
        use ExprKind as K;
        match &self.kind {
            K::Literal(value) => ItemType::Atomic(value.atomic_type()),
            K::And(_)
            | K::Or(_)
            | K::ValueComparison { .. }
            | K::GeneralComparison { .. }
            | K::InstanceOf { .. }
            | K::Castable { .. }
            | K::Quantified { .. } => ItemType::Atomic(AtomicType::Boolean),
            K::StringConcat(_) => ItemType::Atomic(AtomicType::String),
            K::Range { .. } => ItemType::Atomic(AtomicType::Integer),
            K::Arithmetic { left, right, .. } => {
                if is_numeric_type(&left.static_result_type()) && is_numeric_type(&right.static_result_type()) {
                    ItemType::Atomic(AtomicType::Numeric)
                } else {
                    ItemType::AnyItem
                }
            }
            K::Negate(operand) => match operand.static_result_type() {
                ty if is_numeric_type(&ty) => ItemType::Atomic(AtomicType::Numeric),
                _ => ItemType::AnyItem,
            },
            K::UnaryPlus(_) => ItemType::Atomic(AtomicType::Numeric),
            K::Cast { target, .. } => ItemType::Atomic(*target),
            K::Treat { ty, .. } => ty.item.clone(),
            K::Root => ItemType::Kind(KindTest::any(NodeTestKind::Document)),
            K::Step { test: NodeTest::Kind(test), .. } => ItemType::Kind(test.clone()),
            K::Step { axis: Axis::Flag, .. } => ItemType::Kind(KindTest::any(NodeTestKind::Flag)),
            K::Step { .. } => ItemType::Kind(KindTest::any(NodeTestKind::AnyNode)),
            K::RootedPath { relative: last, .. } | K::Path { right: last, .. } => last.static_result_type(),
            K::Filter { base, .. } => base.static_result_type(),
            K::SetOperation { left, right, .. } => {
                match (left.static_result_type(), right.static_result_type()) {
                    (ItemType::Kind(_), ItemType::Kind(_)) => ItemType::Kind(KindTest::any(NodeTestKind::AnyNode)),
                    _ => ItemType::AnyItem,
                }
            }
            K::If { then_branch, else_branch, .. } => {
                let (a, b) = (then_branch.static_result_type(), else_branch.static_result_type());
                if a == b { a } else { ItemType::AnyItem }
            }
            K::Let { body, .. } | K::For { body, .. } => body.static_result_type(),
            K::MapConstructor(_) => ItemType::Map(None),
            K::SquareArray(_) | K::CurlyArray(_) => ItemType::Array(None),
            K::Sequence(items) => match items.as_slice() {
                [single] => single.static_result_type(),
                _ => ItemType::AnyItem,
            },
            K::ContextItem | K::VariableRef(_) | K::FunctionCall { .. } => ItemType::AnyItem,
        }
    }
}

fn is_numeric_type(ty: &ItemType) -> bool {
    matches!(ty, ItemType::Atomic(t) if t.derives_from(AtomicType::Numeric))
}
