//! Metapath surface syntax.
//!
//! [`parse_metapath`] runs the pest grammar and folds the resulting pairs
//! into an [`ast::Expr`]. Operator chains are left-associative.
use pest::Parser;
use pest::iterators::Pair;

use crate::names::LexicalName;
use crate::types::{NodeTestKind, Occurrence};

pub mod ast;

use ast::{ArithmeticOp, Axis, ComparisonOp, ExprKind, PathSeparator, Quantifier, SetOp, Span};

#[derive(pest_derive::Parser)]
#[grammar = "parser/metapath.pest"]
pub struct MetapathParser;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(Box<pest::error::Error<Rule>>),
    #[error("unexpected {rule:?} at '{text}'")]
    Unexpected { rule: Rule, text: String },
    #[error("incomplete {rule:?} at '{text}'")]
    Incomplete { rule: Rule, text: String },
}

impl ParseError {
    /// Byte offset where the problem was detected, when known.
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Syntax(e) => match e.location {
                pest::error::InputLocation::Pos(p) => Some(p),
                pest::error::InputLocation::Span((start, _)) => Some(start),
            },
            _ => None,
        }
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Parse a complete Metapath expression.
pub fn parse_metapath(input: &str) -> ParseResult<ast::Expr> {
    let mut pairs = MetapathParser::parse(Rule::metapath, input).map_err(|e| ParseError::Syntax(Box::new(e)))?;
    let root = pairs.next().ok_or_else(|| ParseError::Incomplete { rule: Rule::metapath, text: input.to_string() })?;
    let expr = root
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| ParseError::Incomplete { rule: Rule::metapath, text: input.to_string() })?;
    build_expr(expr)
}

fn span_of(pair: &Pair<Rule>) -> Span {
    let span = pair.as_span();
    Span { start: span.start(), end: span.end() }
}

fn node(kind: ExprKind, span: Span) -> ast::Expr {
    ast::Expr { kind, span }
}

fn unexpected(pair: &Pair<Rule>) -> ParseError {
    ParseError::Unexpected { rule: pair.as_rule(), text: pair.as_str().to_string() }
}

fn incomplete(rule: Rule, text: &str) -> ParseError {
    ParseError::Incomplete { rule, text: text.to_string() }
}

/// Children of `pair` that carry structure, skipping commas.
fn operands<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| p.as_rule() != Rule::OP_COMMA)
}

fn next_of<'i>(inner: &mut impl Iterator<Item = Pair<'i, Rule>>, rule: Rule, text: &str) -> ParseResult<Pair<'i, Rule>> {
    inner.next().ok_or_else(|| incomplete(rule, text))
}

fn build_expr(pair: Pair<Rule>) -> ParseResult<ast::Expr> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::expr => {
            let mut items = operands(pair).map(build_expr).collect::<ParseResult<Vec<_>>>()?;
            if items.len() == 1 {
                return items.pop().ok_or_else(|| incomplete(Rule::expr, ""));
            }
            Ok(node(ExprKind::Sequence(items), span))
        }
        Rule::expr_single | Rule::primary_expr | Rule::numeric_literal | Rule::step_expr => {
            let text = pair.as_str().to_string();
            let rule = pair.as_rule();
            let inner = pair.into_inner().next().ok_or_else(|| incomplete(rule, &text))?;
            build_expr(inner)
        }
        Rule::for_expr | Rule::let_expr => build_binding_expr(pair, span),
        Rule::quantified_expr => build_quantified(pair, span),
        Rule::if_expr => {
            let text = pair.as_str().to_string();
            let mut parts = pair.into_inner().filter(|p| matches!(p.as_rule(), Rule::expr | Rule::expr_single));
            let condition = build_expr(next_of(&mut parts, Rule::if_expr, &text)?)?;
            let then_branch = build_expr(next_of(&mut parts, Rule::if_expr, &text)?)?;
            let else_branch = build_expr(next_of(&mut parts, Rule::if_expr, &text)?)?;
            Ok(node(
                ExprKind::If {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                span,
            ))
        }
        Rule::or_expr => build_nary(pair, span, Rule::K_OR, ExprKind::Or),
        Rule::and_expr => build_nary(pair, span, Rule::K_AND, ExprKind::And),
        Rule::string_concat_expr => build_nary(pair, span, Rule::OP_CONCAT, ExprKind::StringConcat),
        Rule::comparison_expr => build_comparison(pair, span),
        Rule::range_expr => {
            let text = pair.as_str().to_string();
            let mut parts = pair.into_inner().filter(|p| p.as_rule() != Rule::K_TO);
            let start = build_expr(next_of(&mut parts, Rule::range_expr, &text)?)?;
            match parts.next() {
                None => Ok(start),
                Some(end) => Ok(node(ExprKind::Range { start: Box::new(start), end: Box::new(build_expr(end)?) }, span)),
            }
        }
        Rule::additive_expr | Rule::multiplicative_expr | Rule::union_expr | Rule::intersect_except_expr => {
            build_left_fold(pair)
        }
        Rule::instanceof_expr | Rule::treat_expr => build_type_test(pair, span),
        Rule::castable_expr | Rule::cast_expr => build_cast(pair, span),
        Rule::unary_expr => build_unary(pair, span),
        Rule::path_expr => build_path(pair, span),
        Rule::relative_path_expr => build_relative_path(pair),
        Rule::axis_step => build_axis_step(pair, span),
        Rule::postfix_expr => {
            let text = pair.as_str().to_string();
            let mut inner = pair.into_inner();
            let base = build_expr(next_of(&mut inner, Rule::postfix_expr, &text)?)?;
            let predicates = inner.map(build_predicate).collect::<ParseResult<Vec<_>>>()?;
            if predicates.is_empty() {
                return Ok(base);
            }
            Ok(node(ExprKind::Filter { base: Box::new(base), predicates }, span))
        }
        Rule::integer_literal => Ok(node(ExprKind::Literal(ast::Literal::Integer(pair.as_str().to_string())), span)),
        Rule::decimal_literal => Ok(node(ExprKind::Literal(ast::Literal::Decimal(pair.as_str().to_string())), span)),
        Rule::double_literal => Ok(node(ExprKind::Literal(ast::Literal::Double(pair.as_str().to_string())), span)),
        Rule::string_literal => {
            let value = match pair.into_inner().next() {
                Some(content) if content.as_rule() == Rule::dbl_string_inner => content.as_str().replace("\"\"", "\""),
                Some(content) => content.as_str().replace("''", "'"),
                None => String::new(),
            };
            Ok(node(ExprKind::Literal(ast::Literal::String(value)), span))
        }
        Rule::var_ref => {
            let text = pair.as_str().to_string();
            let name = pair.into_inner().find(|p| p.as_rule() == Rule::eqname).ok_or_else(|| incomplete(Rule::var_ref, &text))?;
            Ok(node(ExprKind::VariableRef(build_eqname(name)?), span))
        }
        Rule::parenthesized_expr => match pair.into_inner().next() {
            Some(inner) => build_expr(inner),
            None => Ok(node(ExprKind::Sequence(Vec::new()), span)),
        },
        Rule::context_item_expr => Ok(node(ExprKind::ContextItem, span)),
        Rule::map_constructor => {
            let mut entries = Vec::new();
            for entry in pair.into_inner().filter(|p| p.as_rule() == Rule::map_entry) {
                let text = entry.as_str().to_string();
                let mut kv = entry.into_inner();
                let key = build_expr(next_of(&mut kv, Rule::map_entry, &text)?)?;
                let value = build_expr(next_of(&mut kv, Rule::map_entry, &text)?)?;
                entries.push((key, value));
            }
            Ok(node(ExprKind::MapConstructor(entries), span))
        }
        Rule::array_constructor => {
            let text = pair.as_str().to_string();
            let inner = pair.into_inner().next().ok_or_else(|| incomplete(Rule::array_constructor, &text))?;
            match inner.as_rule() {
                Rule::square_array => {
                    let members = operands(inner).map(build_expr).collect::<ParseResult<Vec<_>>>()?;
                    Ok(node(ExprKind::SquareArray(members), span))
                }
                _ => {
                    let body = inner.into_inner().find(|p| p.as_rule() == Rule::expr).map(build_expr).transpose()?;
                    Ok(node(ExprKind::CurlyArray(body.map(Box::new)), span))
                }
            }
        }
        Rule::function_call => {
            let text = pair.as_str().to_string();
            let mut inner = pair.into_inner();
            let name = build_eqname(next_of(&mut inner, Rule::function_call, &text)?)?;
            let args = match inner.next() {
                Some(list) => operands(list).map(build_expr).collect::<ParseResult<Vec<_>>>()?,
                None => Vec::new(),
            };
            Ok(node(ExprKind::FunctionCall { name, args }, span))
        }
        _ => Err(unexpected(&pair)),
    }
}

/// `a op b op c` where every operator is the same: one n-ary node.
fn build_nary(pair: Pair<Rule>, span: Span, op: Rule, make: fn(Vec<ast::Expr>) -> ExprKind) -> ParseResult<ast::Expr> {
    let mut items = pair.into_inner().filter(|p| p.as_rule() != op).map(build_expr).collect::<ParseResult<Vec<_>>>()?;
    if items.len() == 1 {
        return items.pop().ok_or_else(|| incomplete(op, ""));
    }
    Ok(node(make(items), span))
}

fn build_comparison(pair: Pair<Rule>, span: Span) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let left = build_expr(next_of(&mut inner, Rule::comparison_expr, &text)?)?;
    let Some(op_pair) = inner.next() else {
        return Ok(left);
    };
    let token = op_pair.clone().into_inner().next().ok_or_else(|| unexpected(&op_pair))?;
    let right = Box::new(build_expr(next_of(&mut inner, Rule::comparison_expr, &text)?)?);
    let left = Box::new(left);
    let value = |op| ExprKind::ValueComparison { op, left: left.clone(), right: right.clone() };
    let general = |op| ExprKind::GeneralComparison { op, left: left.clone(), right: right.clone() };
    let kind = match token.as_rule() {
        Rule::K_EQ => value(ComparisonOp::Eq),
        Rule::K_NE => value(ComparisonOp::Ne),
        Rule::K_LT => value(ComparisonOp::Lt),
        Rule::K_LE => value(ComparisonOp::Le),
        Rule::K_GT => value(ComparisonOp::Gt),
        Rule::K_GE => value(ComparisonOp::Ge),
        Rule::OP_EQ => general(ComparisonOp::Eq),
        Rule::OP_NE => general(ComparisonOp::Ne),
        Rule::OP_LT => general(ComparisonOp::Lt),
        Rule::OP_LE => general(ComparisonOp::Le),
        Rule::OP_GT => general(ComparisonOp::Gt),
        Rule::OP_GE => general(ComparisonOp::Ge),
        _ => return Err(unexpected(&token)),
    };
    Ok(node(kind, span))
}

enum BinaryOp {
    Arithmetic(ArithmeticOp),
    Set(SetOp),
}

fn binary_op(rule: Rule) -> Option<BinaryOp> {
    Some(match rule {
        Rule::OP_PLUS => BinaryOp::Arithmetic(ArithmeticOp::Add),
        Rule::OP_MINUS => BinaryOp::Arithmetic(ArithmeticOp::Subtract),
        Rule::OP_STAR => BinaryOp::Arithmetic(ArithmeticOp::Multiply),
        Rule::K_DIV => BinaryOp::Arithmetic(ArithmeticOp::Divide),
        Rule::K_IDIV => BinaryOp::Arithmetic(ArithmeticOp::IntegerDivide),
        Rule::K_MOD => BinaryOp::Arithmetic(ArithmeticOp::Modulo),
        Rule::K_UNION | Rule::OP_PIPE => BinaryOp::Set(SetOp::Union),
        Rule::K_INTERSECT => BinaryOp::Set(SetOp::Intersect),
        Rule::K_EXCEPT => BinaryOp::Set(SetOp::Except),
        _ => return None,
    })
}

fn build_left_fold(pair: Pair<Rule>) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();
    let mut expr = build_expr(next_of(&mut inner, rule, &text)?)?;
    while let Some(op_pair) = inner.next() {
        let op = binary_op(op_pair.as_rule()).ok_or_else(|| unexpected(&op_pair))?;
        let right = build_expr(next_of(&mut inner, rule, &text)?)?;
        let span = Span { start: expr.span.start, end: right.span.end };
        let (left, right) = (Box::new(expr), Box::new(right));
        let kind = match op {
            BinaryOp::Arithmetic(op) => ExprKind::Arithmetic { op, left, right },
            BinaryOp::Set(op) => ExprKind::SetOperation { op, left, right },
        };
        expr = node(kind, span);
    }
    Ok(expr)
}

fn build_type_test(pair: Pair<Rule>, span: Span) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();
    let operand = build_expr(next_of(&mut inner, rule, &text)?)?;
    let Some(ty) = inner.find(|p| p.as_rule() == Rule::sequence_type) else {
        return Ok(operand);
    };
    let ty = build_sequence_type(ty)?;
    let operand = Box::new(operand);
    let kind = if rule == Rule::instanceof_expr {
        ExprKind::InstanceOf { operand, ty }
    } else {
        ExprKind::Treat { operand, ty }
    };
    Ok(node(kind, span))
}

fn build_cast(pair: Pair<Rule>, span: Span) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();
    let operand = build_expr(next_of(&mut inner, rule, &text)?)?;
    let Some(single) = inner.find(|p| p.as_rule() == Rule::single_type) else {
        return Ok(operand);
    };
    let single_text = single.as_str().to_string();
    let mut parts = single.into_inner();
    let name = build_eqname(next_of(&mut parts, Rule::single_type, &single_text)?)?;
    let target = ast::SingleType { name, optional: parts.next().is_some() };
    let operand = Box::new(operand);
    let kind = if rule == Rule::castable_expr {
        ExprKind::Castable { operand, target }
    } else {
        ExprKind::Cast { operand, target }
    };
    Ok(node(kind, span))
}

fn build_unary(pair: Pair<Rule>, span: Span) -> ParseResult<ast::Expr> {
    let mut signs = Vec::new();
    let mut operand = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::OP_MINUS | Rule::OP_PLUS => signs.push(part.as_rule()),
            _ => operand = Some(build_expr(part)?),
        }
    }
    let mut expr = operand.ok_or_else(|| incomplete(Rule::unary_expr, ""))?;
    for sign in signs.into_iter().rev() {
        let kind = match sign {
            Rule::OP_MINUS => ExprKind::Negate(Box::new(expr)),
            _ => ExprKind::UnaryPlus(Box::new(expr)),
        };
        expr = node(kind, span);
    }
    Ok(expr)
}

fn build_path(pair: Pair<Rule>, span: Span) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let first = next_of(&mut inner, Rule::path_expr, &text)?;
    match first.as_rule() {
        Rule::OP_DSLASH => {
            let relative = build_relative_path(next_of(&mut inner, Rule::path_expr, &text)?)?;
            Ok(node(ExprKind::RootedPath { separator: PathSeparator::Descendant, relative: Box::new(relative) }, span))
        }
        Rule::OP_SLASH => match inner.next() {
            Some(rel) => {
                let relative = build_relative_path(rel)?;
                Ok(node(ExprKind::RootedPath { separator: PathSeparator::Child, relative: Box::new(relative) }, span))
            }
            None => Ok(node(ExprKind::Root, span)),
        },
        _ => build_relative_path(first),
    }
}

fn build_relative_path(pair: Pair<Rule>) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let mut expr = build_expr(next_of(&mut inner, Rule::relative_path_expr, &text)?)?;
    while let Some(sep) = inner.next() {
        let separator = match sep.as_rule() {
            Rule::OP_DSLASH => PathSeparator::Descendant,
            _ => PathSeparator::Child,
        };
        let right = build_expr(next_of(&mut inner, Rule::relative_path_expr, &text)?)?;
        let span = Span { start: expr.span.start, end: right.span.end };
        expr = node(ExprKind::Path { separator, left: Box::new(expr), right: Box::new(right) }, span);
    }
    Ok(expr)
}

fn build_predicate(pair: Pair<Rule>) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let expr = pair.into_inner().next().ok_or_else(|| incomplete(Rule::predicate, &text))?;
    build_expr(expr)
}

fn build_axis_step(pair: Pair<Rule>, span: Span) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let step = next_of(&mut inner, Rule::axis_step, &text)?;
    let (axis, test) = match step.as_rule() {
        Rule::forward_step => build_forward_step(step)?,
        Rule::reverse_step => build_reverse_step(step)?,
        _ => return Err(unexpected(&step)),
    };
    let predicates = inner.map(build_predicate).collect::<ParseResult<Vec<_>>>()?;
    Ok(node(ExprKind::Step { axis, test, predicates }, span))
}

fn build_forward_step(pair: Pair<Rule>) -> ParseResult<(Axis, ast::NodeTest)> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let first = next_of(&mut inner, Rule::forward_step, &text)?;
    match first.as_rule() {
        Rule::forward_axis => {
            let token = first.clone().into_inner().next().ok_or_else(|| unexpected(&first))?;
            let axis = match token.as_rule() {
                Rule::K_CHILD => Axis::Child,
                Rule::K_DESCENDANT => Axis::Descendant,
                Rule::K_DESCENDANT_OR_SELF => Axis::DescendantOrSelf,
                Rule::K_SELF => Axis::SelfAxis,
                Rule::K_FLAG => Axis::Flag,
                _ => return Err(unexpected(&token)),
            };
            let test = build_node_test(next_of(&mut inner, Rule::forward_step, &text)?)?;
            Ok((axis, test))
        }
        Rule::abbrev_forward_step => {
            let mut parts = first.into_inner();
            let head = next_of(&mut parts, Rule::abbrev_forward_step, &text)?;
            if head.as_rule() == Rule::OP_AT {
                let test = build_node_test(next_of(&mut parts, Rule::abbrev_forward_step, &text)?)?;
                return Ok((Axis::Flag, test));
            }
            let test = build_node_test(head)?;
            let axis = match &test {
                ast::NodeTest::Kind(kind) if kind.kind == NodeTestKind::Flag => Axis::Flag,
                _ => Axis::Child,
            };
            Ok((axis, test))
        }
        _ => Err(unexpected(&first)),
    }
}

fn build_reverse_step(pair: Pair<Rule>) -> ParseResult<(Axis, ast::NodeTest)> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let first = next_of(&mut inner, Rule::reverse_step, &text)?;
    if first.as_rule() == Rule::OP_DOTDOT {
        let any = ast::KindTest { kind: NodeTestKind::AnyNode, name: None, type_name: None };
        return Ok((Axis::Parent, ast::NodeTest::Kind(any)));
    }
    let token = first.clone().into_inner().next().ok_or_else(|| unexpected(&first))?;
    let axis = match token.as_rule() {
        Rule::K_PARENT => Axis::Parent,
        Rule::K_ANCESTOR => Axis::Ancestor,
        Rule::K_ANCESTOR_OR_SELF => Axis::AncestorOrSelf,
        _ => return Err(unexpected(&token)),
    };
    let test = build_node_test(next_of(&mut inner, Rule::reverse_step, &text)?)?;
    Ok((axis, test))
}

fn build_node_test(pair: Pair<Rule>) -> ParseResult<ast::NodeTest> {
    let text = pair.as_str().to_string();
    let inner = pair.into_inner().next().ok_or_else(|| incomplete(Rule::node_test, &text))?;
    match inner.as_rule() {
        Rule::kind_test => build_kind_test(inner).map(ast::NodeTest::Kind),
        Rule::name_test => build_name_test(inner).map(ast::NodeTest::Name),
        _ => Err(unexpected(&inner)),
    }
}

fn build_name_test(pair: Pair<Rule>) -> ParseResult<ast::NameTest> {
    let text = pair.as_str().to_string();
    let inner = pair.into_inner().next().ok_or_else(|| incomplete(Rule::name_test, &text))?;
    match inner.as_rule() {
        Rule::eqname => build_eqname(inner).map(ast::NameTest::Name),
        Rule::wildcard => {
            let form = inner.into_inner().next().ok_or_else(|| incomplete(Rule::wildcard, &text))?;
            match form.as_rule() {
                Rule::any_wildcard => Ok(ast::NameTest::Any),
                Rule::prefix_wildcard => Ok(ast::NameTest::Prefix(first_inner_str(form, Rule::ncname)?)),
                Rule::local_wildcard => Ok(ast::NameTest::LocalName(first_inner_str(form, Rule::ncname)?)),
                Rule::uri_wildcard => {
                    let uri = form.into_inner().next().ok_or_else(|| incomplete(Rule::uri_wildcard, &text))?;
                    Ok(ast::NameTest::Namespace(braced_uri_content(uri)))
                }
                _ => Err(unexpected(&form)),
            }
        }
        _ => Err(unexpected(&inner)),
    }
}

fn first_inner_str(pair: Pair<Rule>, rule: Rule) -> ParseResult<String> {
    let text = pair.as_str().to_string();
    pair.into_inner().find(|p| p.as_rule() == rule).map(|p| p.as_str().to_string()).ok_or_else(|| incomplete(rule, &text))
}

fn braced_uri_content(pair: Pair<Rule>) -> String {
    pair.into_inner().next().map(|c| c.as_str().trim().to_string()).unwrap_or_default()
}

fn build_eqname(pair: Pair<Rule>) -> ParseResult<LexicalName> {
    let text = pair.as_str().to_string();
    let form = pair.into_inner().next().ok_or_else(|| incomplete(Rule::eqname, &text))?;
    match form.as_rule() {
        Rule::unprefixed_name => Ok(LexicalName::Local(form.as_str().to_string())),
        Rule::prefixed_name => {
            let mut parts = form.into_inner();
            let prefix = next_of(&mut parts, Rule::prefixed_name, &text)?.as_str().to_string();
            let local = next_of(&mut parts, Rule::prefixed_name, &text)?.as_str().to_string();
            Ok(LexicalName::Prefixed { prefix, local })
        }
        Rule::uri_qualified_name => {
            let mut parts = form.into_inner();
            let namespace = braced_uri_content(next_of(&mut parts, Rule::uri_qualified_name, &text)?);
            let local = next_of(&mut parts, Rule::uri_qualified_name, &text)?.as_str().to_string();
            Ok(LexicalName::UriQualified { namespace, local })
        }
        _ => Err(unexpected(&form)),
    }
}

fn build_kind_test(pair: Pair<Rule>) -> ParseResult<ast::KindTest> {
    let text = pair.as_str().to_string();
    let test = pair.into_inner().next().ok_or_else(|| incomplete(Rule::kind_test, &text))?;
    let kind = match test.as_rule() {
        Rule::document_test => NodeTestKind::Document,
        Rule::assembly_test => NodeTestKind::Assembly,
        Rule::field_test => NodeTestKind::Field,
        Rule::flag_test => NodeTestKind::Flag,
        Rule::any_kind_test => NodeTestKind::AnyNode,
        _ => return Err(unexpected(&test)),
    };
    let mut name = None;
    let mut type_name = None;
    if let Some(args) = test.into_inner().find(|p| p.as_rule() == Rule::kind_name_args) {
        for arg in operands(args) {
            match arg.as_rule() {
                Rule::any_wildcard => name = Some(ast::NameTest::Any),
                Rule::eqname if name.is_none() => name = Some(ast::NameTest::Name(build_eqname(arg)?)),
                Rule::eqname => type_name = Some(build_eqname(arg)?),
                _ => return Err(unexpected(&arg)),
            }
        }
    }
    Ok(ast::KindTest { kind, name, type_name })
}

fn build_sequence_type(pair: Pair<Rule>) -> ParseResult<ast::SequenceType> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let first = next_of(&mut inner, Rule::sequence_type, &text)?;
    if first.as_rule() == Rule::empty_sequence_type {
        return Ok(ast::SequenceType::Empty);
    }
    let item = build_item_type(first)?;
    let occurrence = Occurrence::from_indicator(inner.next().and_then(|p| p.as_str().chars().next()));
    Ok(ast::SequenceType::Typed { item, occurrence })
}

fn build_item_type(pair: Pair<Rule>) -> ParseResult<ast::ItemType> {
    let text = pair.as_str().to_string();
    let inner = pair.into_inner().next().ok_or_else(|| incomplete(Rule::item_type, &text))?;
    match inner.as_rule() {
        Rule::kind_test => build_kind_test(inner).map(ast::ItemType::Kind),
        Rule::any_item_type => Ok(ast::ItemType::AnyItem),
        Rule::atomic_type_name => {
            let name = inner.into_inner().next().ok_or_else(|| incomplete(Rule::atomic_type_name, &text))?;
            build_eqname(name).map(ast::ItemType::Atomic)
        }
        Rule::map_test => {
            let mut parts = operands(inner).filter(|p| p.as_rule() != Rule::K_MAP);
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => {
                    Ok(ast::ItemType::Map(Some((build_eqname(key)?, Box::new(build_sequence_type(value)?)))))
                }
                _ => Ok(ast::ItemType::Map(None)),
            }
        }
        Rule::array_test => match inner.into_inner().find(|p| p.as_rule() == Rule::sequence_type) {
            Some(member) => Ok(ast::ItemType::Array(Some(Box::new(build_sequence_type(member)?)))),
            None => Ok(ast::ItemType::Array(None)),
        },
        _ => Err(unexpected(&inner)),
    }
}

fn build_binding_expr(pair: Pair<Rule>, span: Span) -> ParseResult<ast::Expr> {
    let rule = pair.as_rule();
    let text = pair.as_str().to_string();
    let mut bindings = Vec::new();
    let mut body = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::in_binding | Rule::let_binding => bindings.push(build_binding(part)?),
            Rule::expr_single => body = Some(build_expr(part)?),
            _ => {}
        }
    }
    let body = Box::new(body.ok_or_else(|| incomplete(rule, &text))?);
    let kind = if rule == Rule::for_expr { ExprKind::For { bindings, body } } else { ExprKind::Let { bindings, body } };
    Ok(node(kind, span))
}

fn build_quantified(pair: Pair<Rule>, span: Span) -> ParseResult<ast::Expr> {
    let text = pair.as_str().to_string();
    let mut quantifier = Quantifier::Some;
    let mut bindings = Vec::new();
    let mut satisfies = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::K_EVERY => quantifier = Quantifier::Every,
            Rule::in_binding => bindings.push(build_binding(part)?),
            Rule::expr_single => satisfies = Some(build_expr(part)?),
            _ => {}
        }
    }
    let satisfies = Box::new(satisfies.ok_or_else(|| incomplete(Rule::quantified_expr, &text))?);
    Ok(node(ExprKind::Quantified { quantifier, bindings, satisfies }, span))
}

fn build_binding(pair: Pair<Rule>) -> ParseResult<(LexicalName, ast::Expr)> {
    let text = pair.as_str().to_string();
    let mut name = None;
    let mut value = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::eqname => name = Some(build_eqname(part)?),
            Rule::expr_single => value = Some(build_expr(part)?),
            _ => {}
        }
    }
    match (name, value) {
        (Some(name), Some(value)) => Ok((name, value)),
        _ => Err(incomplete(Rule::in_binding, &text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kind(input: &str) -> ExprKind {
        parse_metapath(input).unwrap().kind
    }

    #[rstest]
    #[case("1", "Integer")]
    #[case("1.5", "Decimal")]
    #[case("1.5e3", "Double")]
    #[case("'it''s'", "String")]
    fn literals(#[case] input: &str, #[case] expected: &str) {
        let ExprKind::Literal(lit) = kind(input) else { panic!("not a literal: {input}") };
        assert!(format!("{lit:?}").starts_with(expected), "{lit:?}");
    }

    #[rstest]
    fn doubled_quotes_unescape() {
        assert_eq!(kind("'it''s'"), ExprKind::Literal(ast::Literal::String("it's".into())));
        assert_eq!(kind("\"a\"\"b\""), ExprKind::Literal(ast::Literal::String("a\"b".into())));
    }

    #[rstest]
    #[case("**")]
    #[case("1 +")]
    #[case("(1, 2")]
    #[case("a[")]
    #[case("if (1) then 2")]
    fn grammar_violations(#[case] input: &str) {
        assert!(matches!(parse_metapath(input), Err(ParseError::Syntax(_))), "{input}");
    }

    #[rstest]
    fn and_chains_are_flat() {
        let ExprKind::And(items) = kind("true() and false() and true()") else { panic!() };
        assert_eq!(items.len(), 3);
    }

    #[rstest]
    fn arithmetic_is_left_associative() {
        let ExprKind::Arithmetic { op, left, .. } = kind("10 - 3 - 2") else { panic!() };
        assert_eq!(op, ArithmeticOp::Subtract);
        assert!(matches!(left.kind, ExprKind::Arithmetic { op: ArithmeticOp::Subtract, .. }));
    }

    #[rstest]
    fn multiplication_binds_tighter_than_addition() {
        let ExprKind::Arithmetic { op, right, .. } = kind("1 + 2 * 3") else { panic!() };
        assert_eq!(op, ArithmeticOp::Add);
        assert!(matches!(right.kind, ExprKind::Arithmetic { op: ArithmeticOp::Multiply, .. }));
    }

    #[rstest]
    #[case("@id", Axis::Flag)]
    #[case("flag::id", Axis::Flag)]
    #[case("..", Axis::Parent)]
    #[case("ancestor-or-self::x", Axis::AncestorOrSelf)]
    #[case("descendant::x", Axis::Descendant)]
    #[case("descendant-or-self::node()", Axis::DescendantOrSelf)]
    #[case("self::x", Axis::SelfAxis)]
    #[case("x", Axis::Child)]
    fn axes(#[case] input: &str, #[case] expected: Axis) {
        let ExprKind::Step { axis, .. } = kind(input) else { panic!("{input}") };
        assert_eq!(axis, expected);
    }

    #[rstest]
    #[case("*", ast::NameTest::Any)]
    #[case("p:*", ast::NameTest::Prefix("p".into()))]
    #[case("*:title", ast::NameTest::LocalName("title".into()))]
    #[case("Q{urn:x}*", ast::NameTest::Namespace("urn:x".into()))]
    fn wildcards(#[case] input: &str, #[case] expected: ast::NameTest) {
        let ExprKind::Step { test: ast::NodeTest::Name(test), .. } = kind(input) else { panic!("{input}") };
        assert_eq!(test, expected);
    }

    #[rstest]
    fn kind_test_with_name_and_type() {
        let ExprKind::Step { test: ast::NodeTest::Kind(test), .. } = kind("field(title, meta:string)") else { panic!() };
        assert_eq!(test.kind, NodeTestKind::Field);
        assert_eq!(test.name, Some(ast::NameTest::Name(LexicalName::Local("title".into()))));
        assert_eq!(test.type_name, Some(LexicalName::Prefixed { prefix: "meta".into(), local: "string".into() }));
    }

    #[rstest]
    fn paths_fold_left() {
        let ExprKind::Path { separator, left, .. } = kind("a/b//c") else { panic!() };
        assert_eq!(separator, PathSeparator::Descendant);
        assert!(matches!(left.kind, ExprKind::Path { separator: PathSeparator::Child, .. }));
        assert!(matches!(kind("/"), ExprKind::Root));
        assert!(matches!(kind("//a"), ExprKind::RootedPath { separator: PathSeparator::Descendant, .. }));
    }

    #[rstest]
    fn comments_are_ignored() {
        assert_eq!(kind("1 (: one (: nested :) :) + 2"), kind("1 + 2"));
    }

    #[rstest]
    fn cast_with_optional_marker() {
        let ExprKind::Cast { target, .. } = kind("$x cast as meta:integer?") else { panic!() };
        assert!(target.optional);
        assert_eq!(target.name, LexicalName::Prefixed { prefix: "meta".into(), local: "integer".into() });
    }

    #[rstest]
    fn sequence_type_occurrence() {
        let ExprKind::InstanceOf { ty, .. } = kind("$x instance of meta:string+") else { panic!() };
        assert!(matches!(ty, ast::SequenceType::Typed { occurrence: Occurrence::OneOrMore, .. }));
        let ExprKind::InstanceOf { ty, .. } = kind("() instance of empty-sequence()") else { panic!() };
        assert_eq!(ty, ast::SequenceType::Empty);
    }

    #[rstest]
    fn function_calls_and_constructors() {
        let ExprKind::FunctionCall { name, args } = kind("fn:concat('a', 'b', 'c')") else { panic!() };
        assert_eq!(name.local_name(), "concat");
        assert_eq!(args.len(), 3);
        assert!(matches!(kind("map { 'a': 1, 'b': 2 }"), ExprKind::MapConstructor(e) if e.len() == 2));
        assert!(matches!(kind("[1, (2, 3)]"), ExprKind::SquareArray(m) if m.len() == 2));
        assert!(matches!(kind("array { 1, 2 }"), ExprKind::CurlyArray(Some(_))));
    }

    #[rstest]
    fn flwor_forms() {
        assert!(matches!(kind("for $x in (1, 2), $y in $x return $y"), ExprKind::For { bindings, .. } if bindings.len() == 2));
        assert!(matches!(kind("let $x := 1 return $x"), ExprKind::Let { .. }));
        assert!(matches!(
            kind("every $x in (1, 2) satisfies $x gt 0"),
            ExprKind::Quantified { quantifier: Quantifier::Every, .. }
        ));
    }

    #[rstest]
    fn spans_cover_subexpressions() {
        let source = "a/b[1]";
        let expr = parse_metapath(source).unwrap();
        let ExprKind::Path { right, .. } = &expr.kind else { panic!() };
        assert_eq!(right.span.slice(source), "b[1]");
    }
}
