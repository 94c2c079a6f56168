use fancy_regex::Regex;
use itertools::Itertools;

use super::common::{arg_or_context, boolean, integer, string, string_arg, string_value};
use crate::engine::error::{Error, ErrorCode, Result};
use crate::engine::runtime::CallCtx;
use crate::model::NodeItem;
use crate::xdm::Sequence;

pub(super) fn string_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    string(string_value(&arg_or_context(ctx, args)?)?)
}

pub(super) fn string_length_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let s = match args.first() {
        Some(arg) => string_arg(arg)?,
        None => string_value(&arg_or_context(ctx, args)?)?,
    };
    integer(s.chars().count())
}

pub(super) fn concat_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&string_arg(arg)?);
    }
    string(out)
}

pub(super) fn string_join_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let separator = match args.get(1) {
        Some(sep) => string_arg(sep)?,
        None => String::new(),
    };
    let joined = args[0].atomize()?.iter().join(&separator);
    string(joined)
}

pub(super) fn starts_with_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(string_arg(&args[0])?.starts_with(&string_arg(&args[1])?))
}

pub(super) fn ends_with_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(string_arg(&args[0])?.ends_with(&string_arg(&args[1])?))
}

pub(super) fn contains_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    boolean(string_arg(&args[0])?.contains(&string_arg(&args[1])?))
}

pub(super) fn upper_case_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    string(string_arg(&args[0])?.to_uppercase())
}

pub(super) fn lower_case_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    string(string_arg(&args[0])?.to_lowercase())
}

pub(super) fn normalize_space_fn<N: NodeItem>(ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let s = match args.first() {
        Some(arg) => string_arg(arg)?,
        None => string_value(&arg_or_context(ctx, args)?)?,
    };
    string(s.split_whitespace().join(" "))
}

fn escape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if r"\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Compile `pattern` with XPath-style flags (`s`, `m`, `i`, `x`, `q`).
fn build_regex(pattern: &str, flags: &str) -> Result<Regex> {
    let mut inline = String::new();
    let mut literal = false;
    for flag in flags.chars() {
        match flag {
            's' | 'm' | 'i' | 'x' => inline.push(flag),
            'q' => literal = true,
            other => {
                return Err(Error::from_code(ErrorCode::FORX0002, format!("invalid regular expression flag '{other}'")));
            }
        }
    }
    let body = if literal { escape(pattern) } else { pattern.to_string() };
    let full = if inline.is_empty() { body } else { format!("(?{inline}){body}") };
    Ok(Regex::new(&full)?)
}

pub(super) fn matches_fn<N: NodeItem>(_ctx: &CallCtx<N>, args: &[Sequence<N>]) -> Result<Sequence<N>> {
    let input = string_arg(&args[0])?;
    let pattern = string_arg(&args[1])?;
    let flags = match args.get(2) {
        Some(f) => string_arg(f)?,
        None => String::new(),
    };
    let regex = build_regex(&pattern, &flags)?;
    boolean(regex.is_match(&input)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a.c", "", "abc", true)]
    #[case("a.c", "q", "abc", false)]
    #[case("a.c", "q", "xa.cx", true)]
    #[case("^ABC$", "i", "abc", true)]
    #[case("a b", "x", "ab", true)]
    fn regex_flags(#[case] pattern: &str, #[case] flags: &str, #[case] input: &str, #[case] expected: bool) {
        assert_eq!(build_regex(pattern, flags).unwrap().is_match(input).unwrap(), expected);
    }

    #[rstest]
    fn unknown_flag_is_rejected() {
        assert_eq!(build_regex("a", "z").unwrap_err().code(), ErrorCode::FORX0002);
    }

    #[rstest]
    fn invalid_pattern_is_rejected() {
        assert_eq!(build_regex("(", "").unwrap_err().code(), ErrorCode::FORX0002);
    }
}
