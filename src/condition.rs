//! MSBuild condition parser and evaluator.
//!
//! Used when project files are materialized per configuration: every
//! `Condition` attribute on a `<PropertyGroup>` or property element is
//! parsed and evaluated against the current property set, e.g.
//!
//! - `'$(Configuration)|$(Platform)' == 'Debug|AnyCPU'`
//! - `!Exists('packages.config') and '$(OS)' != 'Windows_NT'`
//! - `$(SignAssembly)` (a bare value is true when it reads `true`)
//!
//! Uses [`chumsky`] for the parsing grammar.
//!
//! ## Grammar (case-insensitive keywords)
//!
//! ```text
//! expr       = or_expr
//! or_expr    = and_expr ('or' and_expr)*
//! and_expr   = unary ('and' unary)*
//! unary      = '!'* primary
//! primary    = '(' expr ')' | function | comparison | value
//! comparison = value op value
//! op         = '==' | '!=' | '<=' | '>=' | '<' | '>'
//! function   = name '(' value? ')'
//! value      = "'" chars "'" | '$(' name ')' | word
//! ```

use std::collections::HashMap;
use std::path::Path;

use chumsky::prelude::*;

// ═══════════════════════════════════════════════════════════════════════════════
//  AST
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed MSBuild condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        lhs: Vec<Fragment>,
        op: CompareOp,
        rhs: Vec<Fragment>,
    },
    /// `Exists(..)`, `HasTrailingSlash(..)` and unknown functions.
    Call { name: String, arg: Vec<Fragment> },
    /// A lone value, true when it expands to `true` (case-insensitive).
    Value(Vec<Fragment>),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

/// Part of a value: literal text or a `$(Name)` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Literal(String),
    Property(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Value splitting
// ═══════════════════════════════════════════════════════════════════════════════

/// Split raw value text into literal and `$(Name)` fragments.
fn split_fragments(s: &str) -> Vec<Fragment> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = s;

    while let Some(start) = rest.find("$(") {
        let Some(len) = rest[start + 2..].find(')') else {
            break;
        };
        literal.push_str(&rest[..start]);
        if !literal.is_empty() {
            parts.push(Fragment::Literal(std::mem::take(&mut literal)));
        }
        let name = rest[start + 2..start + 2 + len].trim();
        parts.push(Fragment::Property(name.to_string()));
        rest = &rest[start + 3 + len..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(Fragment::Literal(literal));
    }

    parts
}

/// Expand `$(Name)` references using `lookup`; unknown names expand to the
/// empty string.
pub fn expand<'v>(raw: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    if !raw.contains("$(") {
        return raw.to_string();
    }
    join_fragments(&split_fragments(raw), &lookup)
}

fn join_fragments<'v>(parts: &[Fragment], lookup: &impl Fn(&str) -> Option<&'v str>) -> String {
    parts
        .iter()
        .map(|part| match part {
            Fragment::Literal(s) => s.as_str(),
            Fragment::Property(name) => lookup(name).unwrap_or(""),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Chumsky parser
// ═══════════════════════════════════════════════════════════════════════════════

fn condition_parser<'a>() -> impl Parser<'a, &'a str, Condition, extra::Err<Simple<'a, char>>> {
    recursive(|expr| {
        let word = any()
            .filter(|c: &char| c.is_ascii_alphanumeric() || matches!(*c, '_' | '.' | '-'))
            .repeated()
            .at_least(1)
            .to_slice();

        let quoted = just('\'')
            .ignore_then(none_of('\'').repeated().to_slice())
            .then_ignore(just('\''))
            .map(split_fragments);

        let property = just("$(")
            .ignore_then(none_of(')').repeated().to_slice())
            .then_ignore(just(')'))
            .map(|name: &str| vec![Fragment::Property(name.trim().to_string())]);

        let bare = word.clone().map(|w: &str| vec![Fragment::Literal(w.to_string())]);

        let value = choice((quoted, property, bare)).padded();

        let op = choice((
            just("==").to(CompareOp::Equal),
            just("!=").to(CompareOp::NotEqual),
            just("<=").to(CompareOp::LessOrEqual),
            just(">=").to(CompareOp::GreaterOrEqual),
            just('<').to(CompareOp::Less),
            just('>').to(CompareOp::Greater),
        ));

        let comparison = value
            .clone()
            .then(op.padded())
            .then(value.clone())
            .map(|((lhs, op), rhs)| Condition::Compare { lhs, op, rhs });

        let call = word
            .clone()
            .padded()
            .then(value.clone().or_not().delimited_by(just('('), just(')').padded()))
            .map(|(name, arg): (&str, Option<Vec<Fragment>>)| Condition::Call {
                name: name.to_string(),
                arg: arg.unwrap_or_default(),
            });

        let group = expr.delimited_by(just('(').padded(), just(')').padded());

        let primary = choice((group, call, comparison, value.map(Condition::Value))).padded();

        let unary = just('!')
            .padded()
            .repeated()
            .foldr(primary, |_, inner| Condition::Not(Box::new(inner)));

        let keyword = |kw: &'static str| {
            word.clone()
                .filter(move |s: &&str| s.eq_ignore_ascii_case(kw))
                .padded()
        };

        let and_expr = unary.clone().foldl(
            keyword("and").ignore_then(unary).repeated(),
            |lhs, rhs| Condition::And(Box::new(lhs), Box::new(rhs)),
        );

        and_expr.clone().foldl(
            keyword("or").ignore_then(and_expr).repeated(),
            |lhs, rhs| Condition::Or(Box::new(lhs), Box::new(rhs)),
        )
    })
}

/// Parse a `Condition` attribute value.
pub fn parse_condition(input: &str) -> Result<Condition, String> {
    condition_parser()
        .then_ignore(end())
        .parse(input)
        .into_result()
        .map_err(|errs| {
            let messages: Vec<String> = errs.iter().map(|e| format!("{e}")).collect();
            format!("invalid condition '{input}': {}", messages.join("; "))
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

/// Property values and the directory `Exists(..)` resolves against.
///
/// Property names are matched case-insensitively, as MSBuild does.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub properties: &'a HashMap<String, String>,
    /// `None` makes `Exists(..)` always true.
    pub base_dir: Option<&'a Path>,
}

impl<'a> EvalContext<'a> {
    pub fn new(properties: &'a HashMap<String, String>) -> Self {
        Self { properties, base_dir: None }
    }

    pub fn with_base_dir(mut self, dir: &'a Path) -> Self {
        self.base_dir = Some(dir);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&'a str> {
        let props: &'a HashMap<String, String> = self.properties;
        props
            .get(name)
            .or_else(|| {
                props
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    fn expand(&self, parts: &[Fragment]) -> String {
        join_fragments(parts, &|name: &str| self.lookup(name))
    }
}

fn compare(lhs: &str, op: CompareOp, rhs: &str) -> bool {
    let numbers = || Some((parse_number(lhs)?, parse_number(rhs)?));
    match op {
        CompareOp::Equal => lhs.eq_ignore_ascii_case(rhs),
        CompareOp::NotEqual => !lhs.eq_ignore_ascii_case(rhs),
        CompareOp::Less => numbers().is_some_and(|(l, r)| l < r),
        CompareOp::LessOrEqual => numbers().is_some_and(|(l, r)| l <= r),
        CompareOp::Greater => numbers().is_some_and(|(l, r)| l > r),
        CompareOp::GreaterOrEqual => numbers().is_some_and(|(l, r)| l >= r),
    }
}

/// Numbers as MSBuild compares them; a leading `v` (`v4.0`) is tolerated.
fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_prefix(['v', 'V']).unwrap_or(s);
    s.parse().ok()
}

/// Evaluate a parsed condition.
pub fn evaluate(cond: &Condition, ctx: &EvalContext<'_>) -> bool {
    match cond {
        Condition::Compare { lhs, op, rhs } => compare(&ctx.expand(lhs), *op, &ctx.expand(rhs)),
        Condition::Call { name, arg } => {
            let arg = ctx.expand(arg);
            if name.eq_ignore_ascii_case("Exists") {
                let arg = arg.trim();
                match ctx.base_dir {
                    Some(_) if arg.is_empty() => false,
                    Some(dir) => dir.join(arg.replace('\\', "/")).exists(),
                    None => true,
                }
            } else if name.eq_ignore_ascii_case("HasTrailingSlash") {
                arg.ends_with('/') || arg.ends_with('\\')
            } else {
                false
            }
        }
        Condition::Value(parts) => ctx.expand(parts).trim().eq_ignore_ascii_case("true"),
        Condition::Not(inner) => !evaluate(inner, ctx),
        Condition::And(a, b) => evaluate(a, ctx) && evaluate(b, ctx),
        Condition::Or(a, b) => evaluate(a, ctx) || evaluate(b, ctx),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn eval(input: &str, pairs: &[(&str, &str)]) -> bool {
        let cond = parse_condition(input).unwrap();
        let vars = props(pairs);
        evaluate(&cond, &EvalContext::new(&vars))
    }

    // ── Fragments ────────────────────────────────────────────────────────

    #[test]
    fn fragments_mixed() {
        assert_eq!(
            split_fragments("$(Configuration)|$(Platform)"),
            vec![
                Fragment::Property("Configuration".into()),
                Fragment::Literal("|".into()),
                Fragment::Property("Platform".into()),
            ]
        );
    }

    #[test]
    fn fragments_unterminated_reference_is_literal() {
        assert_eq!(split_fragments("bin\\$(Oops"), vec![Fragment::Literal("bin\\$(Oops".into())]);
        assert_eq!(split_fragments(""), Vec::<Fragment>::new());
    }

    #[test]
    fn expand_unknown_is_empty() {
        let vars = props(&[("OutDir", "bin")]);
        let ctx = EvalContext::new(&vars);
        assert_eq!(expand("$(OutDir)/$(Missing)x", |n| ctx.lookup(n)), "bin/x");
        assert_eq!(expand("plain", |n| ctx.lookup(n)), "plain");
    }

    // ── Parsing ──────────────────────────────────────────────────────────

    #[test]
    fn parse_config_platform_comparison() {
        let cond = parse_condition(" '$(Configuration)|$(Platform)' == 'Debug|AnyCPU' ").unwrap();
        match cond {
            Condition::Compare { op, rhs, .. } => {
                assert_eq!(op, CompareOp::Equal);
                assert_eq!(rhs, vec![Fragment::Literal("Debug|AnyCPU".into())]);
            }
            other => panic!("expected Compare, got {other:?}"),
        }
    }

    #[test]
    fn parse_precedence() {
        let cond = parse_condition("'a'=='a' or 'b'=='c' and 'd'=='d'").unwrap();
        match cond {
            Condition::Or(_, rhs) => assert!(matches!(*rhs, Condition::And(_, _))),
            other => panic!("expected Or(.., And(..)), got {other:?}"),
        }
    }

    #[test]
    fn parse_negated_call() {
        let cond = parse_condition("!Exists('packages.config')").unwrap();
        match cond {
            Condition::Not(inner) => {
                assert!(matches!(*inner, Condition::Call { ref name, .. } if name == "Exists"))
            }
            other => panic!("expected Not, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_condition("'a' == ").is_err());
        assert!(parse_condition("('a' == 'b'").is_err());
    }

    // ── Evaluation ───────────────────────────────────────────────────────

    #[test]
    fn eval_comparisons_are_case_insensitive() {
        assert!(eval("'$(Configuration)' == 'DEBUG'", &[("Configuration", "Debug")]));
        assert!(eval("'$(configuration)' == 'Debug'", &[("Configuration", "Debug")]));
        assert!(!eval("'$(Configuration)' != 'debug'", &[("Configuration", "Debug")]));
    }

    #[test]
    fn eval_bare_values() {
        assert!(eval("$(SignAssembly)", &[("SignAssembly", "True")]));
        assert!(!eval("$(SignAssembly)", &[]));
        assert!(eval("'$(X)' == ''", &[]));
        assert!(eval("true and !false", &[]));
    }

    #[test]
    fn eval_numeric_comparison() {
        assert!(eval("'$(LangVersion)' >= '7.3'", &[("LangVersion", "8.0")]));
        assert!(eval("'$(TargetFrameworkVersion)' < 'v4.6'", &[("TargetFrameworkVersion", "v4.5")]));
        assert!(!eval("'abc' > '1'", &[]));
    }

    #[test]
    fn eval_functions() {
        assert!(eval("HasTrailingSlash('$(OutDir)')", &[("OutDir", "bin\\")]));
        assert!(!eval("HasTrailingSlash('$(OutDir)')", &[("OutDir", "bin")]));
        // Without a base directory Exists() cannot be checked and passes.
        assert!(eval("Exists('whatever')", &[]));
    }

    #[test]
    fn eval_exists_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("present.txt"), "").unwrap();
        let vars = HashMap::new();
        let ctx = EvalContext::new(&vars).with_base_dir(dir.path());

        let yes = parse_condition("Exists('present.txt')").unwrap();
        let no = parse_condition("Exists('absent.txt')").unwrap();
        assert!(evaluate(&yes, &ctx));
        assert!(!evaluate(&no, &ctx));
    }

    #[test]
    fn parse_common_project_conditions() {
        let conditions = [
            " '$(Configuration)' == '' ",
            " '$(Platform)' == '' ",
            "'$(Configuration)|$(Platform)' == 'Release|AnyCPU'",
            "'$(Configuration)|$(Platform)'=='Debug|x64'",
            "Exists('$(MSBuildExtensionsPath)\\$(MSBuildToolsVersion)\\Microsoft.Common.props')",
            "'$(TargetFramework)' == 'net48' Or '$(TargetFramework)' == 'net472'",
            "!Exists('$(SolutionDir)packages')",
            "('$(OS)' == 'Windows_NT') AND ('$(Configuration)' != 'Release')",
            "$(DefineConstants.Contains('DEBUG'))",
        ];

        for cond in &conditions[..conditions.len() - 1] {
            let result = parse_condition(cond);
            assert!(result.is_ok(), "failed to parse {cond}: {}", result.unwrap_err());
        }
        // Property functions are not supported.
        assert!(parse_condition(conditions[conditions.len() - 1]).is_err());
    }
}
