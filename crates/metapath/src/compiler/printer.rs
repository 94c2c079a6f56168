//! Indented dump of a compiled tree, one node per line.
use std::fmt::Write as _;

use itertools::Itertools;

use super::cst::{Expr, ExprKind, NodeTest, PathSeparator, SetOp};

pub fn print_tree(expr: &Expr) -> String {
    let mut out = String::new();
    write_node(&mut out, expr, 0);
    out
}

fn write_node(out: &mut String, expr: &Expr, depth: usize) {
    let _ = writeln!(out, "{:indent$}{}", "", label(expr), indent = depth * 2);
    for child in expr.children() {
        write_node(out, child, depth + 1);
    }
}

fn separator(sep: PathSeparator) -> &'static str {
    match sep {
        PathSeparator::Child => "/",
        PathSeparator::Descendant => "//",
    }
}

fn label(expr: &Expr) -> String {
    use ExprKind as K;
    match &expr.kind {
        K::Literal(value) => format!("Literal({value} as {})", value.atomic_type()),
        K::Sequence(items) => format!("Sequence[{}]", items.len()),
        K::ContextItem => "ContextItem".to_string(),
        K::Root => "Root".to_string(),
        K::RootedPath { separator: sep, .. } => format!("RootedPath({})", separator(*sep)),
        K::Path { separator: sep, .. } => format!("Path({})", separator(*sep)),
        K::Step { axis, test, predicates } => {
            let test = match test {
                NodeTest::Name(name) => name.to_string(),
                NodeTest::Kind(kind) => kind.to_string(),
            };
            format!("Step({}::{test}, predicates={})", axis.name(), predicates.len())
        }
        K::Filter { predicates, .. } => format!("Filter(predicates={})", predicates.len()),
        K::VariableRef(name) => format!("VariableRef(${name})"),
        K::FunctionCall { name, args } => format!("FunctionCall({name}#{})", args.len()),
        K::And(_) => "And".to_string(),
        K::Or(_) => "Or".to_string(),
        K::If { .. } => "If".to_string(),
        K::ValueComparison { op, .. } => format!("ValueComparison({})", op.value_symbol()),
        K::GeneralComparison { op, .. } => format!("GeneralComparison({})", op.general_symbol()),
        K::Arithmetic { op, .. } => format!("Arithmetic({})", op.symbol()),
        K::Negate(_) => "Negate".to_string(),
        K::UnaryPlus(_) => "UnaryPlus".to_string(),
        K::Range { .. } => "Range".to_string(),
        K::StringConcat(_) => "StringConcat".to_string(),
        K::SetOperation { op, .. } => {
            let op = match op {
                SetOp::Union => "union",
                SetOp::Intersect => "intersect",
                SetOp::Except => "except",
            };
            format!("SetOperation({op})")
        }
        K::InstanceOf { ty, .. } => format!("InstanceOf({ty})"),
        K::Treat { ty, .. } => format!("Treat({ty})"),
        K::Cast { target, allow_empty, .. } => format!("Cast({target}{})", if *allow_empty { "?" } else { "" }),
        K::Castable { target, allow_empty, .. } => {
            format!("Castable({target}{})", if *allow_empty { "?" } else { "" })
        }
        K::Let { variable, .. } => format!("Let(${variable})"),
        K::For { variable, .. } => format!("For(${variable})"),
        K::Quantified { quantifier, bindings, .. } => {
            let vars = bindings.iter().map(|(name, _)| format!("${name}")).join(", ");
            format!("Quantified({quantifier:?} {vars})")
        }
        K::MapConstructor(entries) => format!("MapConstructor[{}]", entries.len()),
        K::SquareArray(members) => format!("SquareArray[{}]", members.len()),
        K::CurlyArray(_) => "CurlyArray".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_default;
    use rstest::rstest;

    #[rstest]
    fn prints_one_line_per_node() {
        let compiled = compile_default("1 + 2").unwrap();
        let printed = print_tree(compiled.expr());
        let lines = printed.lines().collect::<Vec<_>>();
        assert_eq!(lines, vec!["Arithmetic(+)", "  Literal(1 as meta:integer)", "  Literal(2 as meta:integer)"]);
    }

    #[rstest]
    fn prints_steps_with_axis() {
        let compiled = compile_default("a/@id").unwrap();
        let printed = print_tree(compiled.expr());
        assert!(printed.contains("Step(flag::id, predicates=0)"), "{printed}");
    }
}
