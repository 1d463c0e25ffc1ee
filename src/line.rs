//! Grammar for the individual line shapes of a `.sln` file.
//!
//! Only the structured lines get a real grammar:
//!
//! ```text
//! project  = 'Project(' quoted ')' '=' quoted ',' quoted ',' quoted
//! section  = ('GlobalSection' | 'ProjectSection') '(' name ')' ('=' stage)?
//! quoted   = '"' chars '"'
//! ```
//!
//! Section entries (`key = value`) are split with [`key_value`].
//!
//! Uses [`chumsky`] for the grammar, like the condition parser.

use chumsky::prelude::*;

type Extra<'a> = extra::Err<Simple<'a, char>>;

pub(crate) const PROJECT_PREFIX: &str = "Project(";
pub(crate) const END_PROJECT: &str = "EndProject";
pub(crate) const GLOBAL_SECTION: &str = "GlobalSection";
pub(crate) const PROJECT_SECTION: &str = "ProjectSection";
pub(crate) const END_GLOBAL_SECTION: &str = "EndGlobalSection";
pub(crate) const END_PROJECT_SECTION: &str = "EndProjectSection";

// ═══════════════════════════════════════════════════════════════════════════════
//  Line shapes
// ═══════════════════════════════════════════════════════════════════════════════

/// `Project("{type}") = "name", "path", "{id}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProjectLine<'a> {
    pub type_id: &'a str,
    pub name: &'a str,
    pub path: &'a str,
    pub id: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SectionKind {
    Global,
    Project,
}

impl SectionKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Global => GLOBAL_SECTION,
            Self::Project => PROJECT_SECTION,
        }
    }

    pub fn end_tag(self) -> &'static str {
        match self {
            Self::Global => END_GLOBAL_SECTION,
            Self::Project => END_PROJECT_SECTION,
        }
    }
}

/// `GlobalSection(Name) = preSolution` / `ProjectSection(Name) = postProject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SectionHeader<'a> {
    pub kind: SectionKind,
    pub name: &'a str,
    pub stage: Option<&'a str>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Chumsky parsers
// ═══════════════════════════════════════════════════════════════════════════════

fn quoted<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'))
}

fn project_line_parser<'a>() -> impl Parser<'a, &'a str, ProjectLine<'a>, Extra<'a>> {
    let type_id = just(PROJECT_PREFIX)
        .ignore_then(quoted().padded())
        .then_ignore(just(')'));

    type_id
        .then_ignore(just('=').padded())
        .then(quoted())
        .then_ignore(just(',').padded())
        .then(quoted())
        .then_ignore(just(',').padded())
        .then(quoted())
        .then_ignore(any().repeated())
        .map(|(((type_id, name), path), id)| ProjectLine {
            type_id: type_id.trim(),
            name,
            path,
            id: id.trim(),
        })
}

fn section_header_parser<'a>() -> impl Parser<'a, &'a str, SectionHeader<'a>, Extra<'a>> {
    let kind = choice((
        just(GLOBAL_SECTION).to(SectionKind::Global),
        just(PROJECT_SECTION).to(SectionKind::Project),
    ));

    let name = none_of(')')
        .repeated()
        .to_slice()
        .delimited_by(just('('), just(')'));

    let stage = just('=')
        .padded()
        .ignore_then(any().repeated().to_slice());

    kind.then(name)
        .then(stage.or_not())
        .then_ignore(end())
        .map(|((kind, name), stage): ((SectionKind, &'a str), Option<&'a str>)| SectionHeader {
            kind,
            name: name.trim(),
            stage: stage.map(str::trim).filter(|s| !s.is_empty()),
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Entry points
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a trimmed project declaration line.
pub(crate) fn project_line(line: &str) -> Option<ProjectLine<'_>> {
    if !line.starts_with(PROJECT_PREFIX) {
        return None;
    }
    project_line_parser().parse(line).into_result().ok()
}

/// Parse a trimmed section header line.
pub(crate) fn section_header(line: &str) -> Option<SectionHeader<'_>> {
    if !line.starts_with(GLOBAL_SECTION) && !line.starts_with(PROJECT_SECTION) {
        return None;
    }
    section_header_parser().parse(line).into_result().ok()
}

/// Split a section entry on its first `=`; both sides trimmed.
///
/// Returns `None` when there is no `=` or the key is empty.
pub(crate) fn key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

// ─── Section tracking ────────────────────────────────────────────────────────

/// How a line relates to one tracked section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SectionLine {
    /// The header that opens the section.
    Enter,
    /// A line inside the open section.
    Entry,
    /// The closing tag.
    Leave,
    /// Anything outside the section.
    Outside,
}

/// Follows one named section (`GlobalSection(ProjectDependencies)` etc.)
/// across a sequence of lines.
#[derive(Debug, Clone)]
pub(crate) struct SectionTracker {
    kind: SectionKind,
    name: &'static str,
    open: bool,
}

impl SectionTracker {
    pub fn global(name: &'static str) -> Self {
        Self { kind: SectionKind::Global, name, open: false }
    }

    pub fn project(name: &'static str) -> Self {
        Self { kind: SectionKind::Project, name, open: false }
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn reset(&mut self) {
        self.open = false;
    }

    pub fn track(&mut self, line: &str) -> SectionLine {
        if self.open {
            if line == self.kind.end_tag() {
                self.open = false;
                return SectionLine::Leave;
            }
            return SectionLine::Entry;
        }
        if !line.starts_with(self.kind.tag()) {
            return SectionLine::Outside;
        }
        match section_header(line) {
            Some(header) if header.kind == self.kind && header.name == self.name => {
                self.open = true;
                SectionLine::Enter
            }
            _ => SectionLine::Outside,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_project_line() {
        let line = r#"Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "App", "src\App\App.csproj", "{5A2B1C4D-0000-0000-0000-000000000001}""#;
        let p = project_line(line).unwrap();
        assert_eq!(p.type_id, "{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}");
        assert_eq!(p.name, "App");
        assert_eq!(p.path, r"src\App\App.csproj");
        assert_eq!(p.id, "{5A2B1C4D-0000-0000-0000-000000000001}");
    }

    #[test]
    fn parse_project_line_tight_spacing() {
        let p = project_line(r#"Project("{T}")="A","a.csproj","{G}""#).unwrap();
        assert_eq!(p.name, "A");
        assert_eq!(p.id, "{G}");
    }

    #[test]
    fn project_line_rejects_malformed() {
        assert!(project_line(r#"Project("{T}") = "A", "a.csproj""#).is_none());
        assert!(project_line("ProjectSection(SolutionItems) = preProject").is_none());
        assert!(project_line("EndProject").is_none());
    }

    #[test]
    fn parse_section_headers() {
        assert_eq!(
            section_header("GlobalSection(SolutionConfigurationPlatforms) = preSolution"),
            Some(SectionHeader {
                kind: SectionKind::Global,
                name: "SolutionConfigurationPlatforms",
                stage: Some("preSolution"),
            })
        );
        assert_eq!(
            section_header("ProjectSection(ProjectDependencies)"),
            Some(SectionHeader {
                kind: SectionKind::Project,
                name: "ProjectDependencies",
                stage: None,
            })
        );
        assert_eq!(section_header("EndGlobalSection"), None);
        assert_eq!(section_header("Global"), None);
    }

    #[test]
    fn split_key_value() {
        assert_eq!(key_value("Debug|x86 = Debug|x86"), Some(("Debug|x86", "Debug|x86")));
        assert_eq!(key_value("A=B=C"), Some(("A", "B=C")));
        assert_eq!(key_value("{G2} ="), Some(("{G2}", "")));
        assert_eq!(key_value(" = x"), None);
        assert_eq!(key_value("no separator"), None);
    }

    #[test]
    fn tracker_follows_one_section() {
        let mut t = SectionTracker::global("NestedProjects");
        assert_eq!(t.track("GlobalSection(SolutionProperties) = preSolution"), SectionLine::Outside);
        assert_eq!(t.track("HideSolutionNode = FALSE"), SectionLine::Outside);
        assert_eq!(t.track("EndGlobalSection"), SectionLine::Outside);
        assert_eq!(t.track("GlobalSection(NestedProjects) = preSolution"), SectionLine::Enter);
        assert!(t.is_open());
        assert_eq!(t.track("{A} = {B}"), SectionLine::Entry);
        assert_eq!(t.track(""), SectionLine::Entry);
        assert_eq!(t.track("EndGlobalSection"), SectionLine::Leave);
        assert_eq!(t.track("{A} = {B}"), SectionLine::Outside);
    }
}
