//! Section recognizers.
//!
//! Every handler sees every trimmed line of the file and picks out the lines
//! of its own section; handlers never look at each other's output, so the
//! order they are listed in does not matter.  The set is closed: [`Handler`]
//! enumerates all of them and [`Handlers::for_items`] selects the ones a
//! parse asked for.

use std::collections::HashMap;
use std::path::PathBuf;

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use crate::line::{self, SectionLine, SectionTracker};
use crate::model::{
    ConfigurationPlatform, ProjectConfigPlatform, ProjectDependencies, ProjectItem,
    SolutionHeader,
};
use crate::sln::SlnItems;

// ═══════════════════════════════════════════════════════════════════════════════
//  Raw facts
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the handlers collect during one scan, before aggregation.
///
/// Section-backed sequences are `None` until their section header is seen,
/// which lets the aggregator tell "no section" apart from "empty section".
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawFacts {
    pub solution_dir: PathBuf,
    pub header: SolutionHeader,
    pub projects: Vec<ProjectItem>,
    pub solution_configs: Option<IndexSet<ConfigurationPlatform>>,
    pub project_configs: Option<Vec<ProjectConfigPlatform>>,
    pub dependencies: ProjectDependencies,
    pub nested_projects: Option<IndexMap<String, String>>,
    pub solution_properties: IndexMap<String, String>,
}

impl RawFacts {
    pub fn new(solution_dir: PathBuf) -> Self {
        Self { solution_dir, ..Default::default() }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Handler interface
// ═══════════════════════════════════════════════════════════════════════════════

/// The three scan phases every recognizer takes part in.
pub(crate) trait SectionHandler {
    /// Called once before the first line.
    fn on_start(&mut self, _facts: &mut RawFacts) {}

    /// Called for every trimmed line, empty lines included.
    fn on_line(&mut self, line: &str, facts: &mut RawFacts);

    /// Called once after the last line; closes anything still open.
    fn on_end(&mut self, _facts: &mut RawFacts) {}
}

/// The closed set of recognizers.
#[derive(Debug, Clone)]
pub(crate) enum Handler {
    Header(HeaderHandler),
    Project(ProjectHandler),
    SolutionConfigs(SolutionConfigHandler),
    ProjectConfigs(ProjectConfigHandler),
    Dependencies(DependenciesHandler),
    NestedProjects(NestedProjectsHandler),
    SolutionProperties(SolutionPropertiesHandler),
}

impl Handler {
    fn as_handler(&mut self) -> &mut dyn SectionHandler {
        match self {
            Self::Header(h) => h,
            Self::Project(h) => h,
            Self::SolutionConfigs(h) => h,
            Self::ProjectConfigs(h) => h,
            Self::Dependencies(h) => h,
            Self::NestedProjects(h) => h,
            Self::SolutionProperties(h) => h,
        }
    }
}

impl SectionHandler for Handler {
    fn on_start(&mut self, facts: &mut RawFacts) {
        self.as_handler().on_start(facts);
    }

    fn on_line(&mut self, line: &str, facts: &mut RawFacts) {
        self.as_handler().on_line(line, facts);
    }

    fn on_end(&mut self, facts: &mut RawFacts) {
        self.as_handler().on_end(facts);
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Ordered list of active handlers; broadcasts each phase to all of them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Handlers {
    handlers: Vec<Handler>,
}

impl Handlers {
    /// Select the handlers needed for the requested items.
    pub fn for_items(items: SlnItems) -> Self {
        let mut handlers = Vec::new();
        if items.contains(SlnItems::HEADER) {
            handlers.push(Handler::Header(HeaderHandler::default()));
        }
        if items.contains(SlnItems::PROJECTS) {
            handlers.push(Handler::Project(ProjectHandler::default()));
        }
        if items.contains(SlnItems::SOLUTION_CONFS) {
            handlers.push(Handler::SolutionConfigs(SolutionConfigHandler::default()));
        }
        if items.contains(SlnItems::PROJECT_CONFS) {
            handlers.push(Handler::ProjectConfigs(ProjectConfigHandler::default()));
        }
        if items.contains(SlnItems::PROJECT_DEPENDENCIES) {
            handlers.push(Handler::Dependencies(DependenciesHandler::default()));
        }
        if items.contains(SlnItems::NESTED_PROJECTS) {
            handlers.push(Handler::NestedProjects(NestedProjectsHandler::default()));
        }
        if items.contains(SlnItems::SOLUTION_PROPERTIES) {
            handlers.push(Handler::SolutionProperties(SolutionPropertiesHandler::default()));
        }
        Self { handlers }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn start(&mut self, facts: &mut RawFacts) {
        for h in &mut self.handlers {
            h.on_start(facts);
        }
    }

    pub fn line(&mut self, line: &str, facts: &mut RawFacts) {
        for h in &mut self.handlers {
            h.on_line(line, facts);
        }
    }

    pub fn end(&mut self, facts: &mut RawFacts) {
        for h in &mut self.handlers {
            h.on_end(facts);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Header
// ═══════════════════════════════════════════════════════════════════════════════

const FORMAT_PREFIX: &str = "Microsoft Visual Studio Solution File, Format Version ";
const PROGRAM_PREFIX: &str = "# Visual Studio ";

/// Best-effort scan of the version lines preceding the first project.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderHandler {
    done: bool,
}

impl SectionHandler for HeaderHandler {
    fn on_start(&mut self, _facts: &mut RawFacts) {
        self.done = false;
    }

    fn on_line(&mut self, line: &str, facts: &mut RawFacts) {
        if self.done {
            return;
        }
        if line.starts_with(line::PROJECT_PREFIX) || line == "Global" {
            self.done = true;
            return;
        }

        let header = &mut facts.header;
        if let Some(version) = line.strip_prefix(FORMAT_PREFIX) {
            header.format_version = Some(version.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(PROGRAM_PREFIX) {
            let version = rest.strip_prefix("Version ").unwrap_or(rest).trim();
            if !version.is_empty() {
                header.program_version = Some(version.to_string());
            }
        } else if let Some((key, value)) = line::key_value(line) {
            match key {
                "VisualStudioVersion" => header.visual_studio_version = Some(value.to_string()),
                "MinimumVisualStudioVersion" => {
                    header.minimum_visual_studio_version = Some(value.to_string())
                }
                _ => {}
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Projects
// ═══════════════════════════════════════════════════════════════════════════════

/// `Project(...)` declarations and their blocks.
#[derive(Debug, Clone)]
pub(crate) struct ProjectHandler {
    /// Index into `facts.projects` of the open block.
    current: Option<usize>,
    body: Vec<String>,
    solution_items: SectionTracker,
}

impl Default for ProjectHandler {
    fn default() -> Self {
        Self {
            current: None,
            body: Vec::new(),
            solution_items: SectionTracker::project("SolutionItems"),
        }
    }
}

impl ProjectHandler {
    fn close_block(&mut self, facts: &mut RawFacts) {
        if let Some(index) = self.current.take() {
            if !self.body.is_empty() {
                facts.projects[index].raw = Some(self.body.join("\n"));
            }
        }
        self.body.clear();
        self.solution_items.reset();
    }

    fn open_block(&mut self, line: &str, facts: &mut RawFacts) {
        match line::project_line(line) {
            Some(p) => {
                facts.projects.push(ProjectItem::new(
                    p.type_id,
                    p.name,
                    p.path,
                    p.id,
                    &facts.solution_dir,
                ));
                self.current = Some(facts.projects.len() - 1);
            }
            None => trace!(line, "skipping malformed project declaration"),
        }
    }
}

impl SectionHandler for ProjectHandler {
    fn on_start(&mut self, _facts: &mut RawFacts) {
        self.current = None;
        self.body.clear();
        self.solution_items.reset();
    }

    fn on_line(&mut self, line: &str, facts: &mut RawFacts) {
        if line.starts_with(line::PROJECT_PREFIX) {
            // A missing EndProject closes the previous block implicitly.
            self.close_block(facts);
            self.open_block(line, facts);
            return;
        }

        let Some(index) = self.current else {
            return;
        };

        if line == line::END_PROJECT {
            self.close_block(facts);
            return;
        }

        if self.solution_items.track(line) == SectionLine::Entry {
            if let Some((file, _)) = line::key_value(line) {
                facts.projects[index].solution_items.push(file.to_string());
            }
        }

        if !line.is_empty() {
            self.body.push(line.to_string());
        }
    }

    fn on_end(&mut self, facts: &mut RawFacts) {
        self.close_block(facts);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Solution configurations
// ═══════════════════════════════════════════════════════════════════════════════

/// `GlobalSection(SolutionConfigurationPlatforms)`: `Debug|x86 = Debug|x86`.
#[derive(Debug, Clone)]
pub(crate) struct SolutionConfigHandler {
    section: SectionTracker,
}

impl Default for SolutionConfigHandler {
    fn default() -> Self {
        Self { section: SectionTracker::global("SolutionConfigurationPlatforms") }
    }
}

impl SectionHandler for SolutionConfigHandler {
    fn on_start(&mut self, _facts: &mut RawFacts) {
        self.section.reset();
    }

    fn on_line(&mut self, line: &str, facts: &mut RawFacts) {
        match self.section.track(line) {
            SectionLine::Enter => {
                facts.solution_configs.get_or_insert_with(IndexSet::new);
            }
            SectionLine::Entry if !line.is_empty() => {
                let Some(config) = line::key_value(line)
                    .and_then(|(key, _)| ConfigurationPlatform::parse(key))
                else {
                    trace!(line, "skipping malformed solution configuration");
                    return;
                };
                facts
                    .solution_configs
                    .get_or_insert_with(IndexSet::new)
                    .insert(config);
            }
            _ => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Project configurations
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigAction {
    Active,
    Build,
    Deploy,
}

/// Longest suffixes first so `.Build.0` is not mistaken for `.Build`.
const ACTION_SUFFIXES: [(&str, ConfigAction); 5] = [
    (".ActiveCfg", ConfigAction::Active),
    (".Build.0", ConfigAction::Build),
    (".Deploy.0", ConfigAction::Deploy),
    (".Build", ConfigAction::Build),
    (".Deploy", ConfigAction::Deploy),
];

/// One parsed `{id}.Debug|x86.Build.0 = Debug|AnyCPU` line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProjectConfigLine {
    project_id: String,
    solution: ConfigurationPlatform,
    action: ConfigAction,
    config: ConfigurationPlatform,
}

fn parse_project_config_line(line: &str) -> Option<ProjectConfigLine> {
    let (lhs, rhs) = line::key_value(line)?;

    // The id is either a braced GUID or runs to the first dot.
    let (project_id, rest) = match lhs.find("}.") {
        Some(pos) => (&lhs[..=pos], &lhs[pos + 2..]),
        None => lhs.split_once('.')?,
    };

    let (solution, action) = ACTION_SUFFIXES
        .iter()
        .find_map(|(suffix, action)| rest.strip_suffix(suffix).map(|s| (s, *action)))?;

    Some(ProjectConfigLine {
        project_id: project_id.to_string(),
        solution: ConfigurationPlatform::parse(solution)?,
        action,
        config: ConfigurationPlatform::parse(rhs)?,
    })
}

/// `GlobalSection(ProjectConfigurationPlatforms)`.
///
/// All lines for one (project, solution configuration) pair fold into a
/// single [`ProjectConfigPlatform`]; the `ActiveCfg` value decides the
/// project configuration when present.
#[derive(Debug, Clone)]
pub(crate) struct ProjectConfigHandler {
    section: SectionTracker,
    /// (project id, solution config) → index into `facts.project_configs`.
    index: HashMap<(String, ConfigurationPlatform), usize>,
}

impl Default for ProjectConfigHandler {
    fn default() -> Self {
        Self {
            section: SectionTracker::global("ProjectConfigurationPlatforms"),
            index: HashMap::new(),
        }
    }
}

impl ProjectConfigHandler {
    fn record(&mut self, entry: ProjectConfigLine, configs: &mut Vec<ProjectConfigPlatform>) {
        let key = (entry.project_id.clone(), entry.solution.clone());
        let index = *self.index.entry(key).or_insert_with(|| {
            configs.push(ProjectConfigPlatform {
                project_id: entry.project_id.clone(),
                solution: entry.solution.clone(),
                config: entry.config.clone(),
                build: false,
                deploy: false,
            });
            configs.len() - 1
        });

        let target = &mut configs[index];
        match entry.action {
            ConfigAction::Active => target.config = entry.config,
            ConfigAction::Build => target.build = true,
            ConfigAction::Deploy => target.deploy = true,
        }
    }
}

impl SectionHandler for ProjectConfigHandler {
    fn on_start(&mut self, _facts: &mut RawFacts) {
        self.section.reset();
        self.index.clear();
    }

    fn on_line(&mut self, line: &str, facts: &mut RawFacts) {
        match self.section.track(line) {
            SectionLine::Enter => {
                facts.project_configs.get_or_insert_with(Vec::new);
            }
            SectionLine::Entry if !line.is_empty() => {
                let Some(entry) = parse_project_config_line(line) else {
                    trace!(line, "skipping unrecognized project configuration line");
                    return;
                };
                let configs = facts.project_configs.get_or_insert_with(Vec::new);
                self.record(entry, configs);
            }
            _ => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Project dependencies
// ═══════════════════════════════════════════════════════════════════════════════

/// Build dependencies, from both places the format puts them:
///
/// - `ProjectSection(ProjectDependencies)` inside a project block:
///   `{dep} = {dep}`;
/// - the legacy `GlobalSection(ProjectDependencies)`: `{id}.0 = {dep}`.
#[derive(Debug, Clone)]
pub(crate) struct DependenciesHandler {
    current_project: Option<String>,
    project_section: SectionTracker,
    global_section: SectionTracker,
}

impl Default for DependenciesHandler {
    fn default() -> Self {
        Self {
            current_project: None,
            project_section: SectionTracker::project("ProjectDependencies"),
            global_section: SectionTracker::global("ProjectDependencies"),
        }
    }
}

impl DependenciesHandler {
    fn project_block_line(
        section: &mut SectionTracker,
        line: &str,
        project_id: &str,
        deps: &mut ProjectDependencies,
    ) {
        match section.track(line) {
            SectionLine::Enter => deps.touch(project_id),
            SectionLine::Entry if !line.is_empty() => match line::key_value(line) {
                Some((dependency, _)) => deps.add(project_id, dependency),
                None => trace!(line, "skipping malformed project dependency"),
            },
            _ => {}
        }
    }

    fn global_section_line(&mut self, line: &str, deps: &mut ProjectDependencies) {
        if self.global_section.track(line) != SectionLine::Entry || line.is_empty() {
            return;
        }
        let entry = line::key_value(line).and_then(|(key, dependency)| {
            let (project_id, _ordinal) = key.rsplit_once('.')?;
            (!project_id.is_empty() && !dependency.is_empty()).then_some((project_id, dependency))
        });
        match entry {
            Some((project_id, dependency)) => deps.add(project_id, dependency),
            None => trace!(line, "skipping malformed global project dependency"),
        }
    }
}

impl SectionHandler for DependenciesHandler {
    fn on_start(&mut self, _facts: &mut RawFacts) {
        self.current_project = None;
        self.project_section.reset();
        self.global_section.reset();
    }

    fn on_line(&mut self, line: &str, facts: &mut RawFacts) {
        if line.starts_with(line::PROJECT_PREFIX) {
            self.current_project = line::project_line(line).map(|p| p.id.to_string());
            self.project_section.reset();
            return;
        }
        if line == line::END_PROJECT {
            self.current_project = None;
            self.project_section.reset();
            return;
        }

        match &self.current_project {
            Some(project_id) => Self::project_block_line(
                &mut self.project_section,
                line,
                project_id,
                &mut facts.dependencies,
            ),
            None => self.global_section_line(line, &mut facts.dependencies),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Nested projects
// ═══════════════════════════════════════════════════════════════════════════════

/// `GlobalSection(NestedProjects)`: `{child} = {parent folder}`.
#[derive(Debug, Clone)]
pub(crate) struct NestedProjectsHandler {
    section: SectionTracker,
}

impl Default for NestedProjectsHandler {
    fn default() -> Self {
        Self { section: SectionTracker::global("NestedProjects") }
    }
}

impl SectionHandler for NestedProjectsHandler {
    fn on_start(&mut self, _facts: &mut RawFacts) {
        self.section.reset();
    }

    fn on_line(&mut self, line: &str, facts: &mut RawFacts) {
        match self.section.track(line) {
            SectionLine::Enter => {
                facts.nested_projects.get_or_insert_with(IndexMap::new);
            }
            SectionLine::Entry if !line.is_empty() => match line::key_value(line) {
                Some((child, parent)) if !parent.is_empty() => {
                    facts
                        .nested_projects
                        .get_or_insert_with(IndexMap::new)
                        .insert(child.to_string(), parent.to_string());
                }
                _ => trace!(line, "skipping malformed nested project entry"),
            },
            _ => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Solution properties
// ═══════════════════════════════════════════════════════════════════════════════

/// `GlobalSection(SolutionProperties)` and `GlobalSection(ExtensibilityGlobals)`
/// key/value pairs, merged into one map.
#[derive(Debug, Clone)]
pub(crate) struct SolutionPropertiesHandler {
    properties: SectionTracker,
    extensibility: SectionTracker,
}

impl Default for SolutionPropertiesHandler {
    fn default() -> Self {
        Self {
            properties: SectionTracker::global("SolutionProperties"),
            extensibility: SectionTracker::global("ExtensibilityGlobals"),
        }
    }
}

impl SectionHandler for SolutionPropertiesHandler {
    fn on_start(&mut self, _facts: &mut RawFacts) {
        self.properties.reset();
        self.extensibility.reset();
    }

    fn on_line(&mut self, line: &str, facts: &mut RawFacts) {
        let in_properties = self.properties.track(line) == SectionLine::Entry;
        let in_extensibility = self.extensibility.track(line) == SectionLine::Entry;
        if !(in_properties || in_extensibility) || line.is_empty() {
            return;
        }
        if let Some((key, value)) = line::key_value(line) {
            facts.solution_properties.insert(key.to_string(), value.to_string());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
