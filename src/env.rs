//! Project materialization.
//!
//! The parser never opens project files itself.  When a parse asks for
//! [`SlnItems::ENV`](crate::SlnItems::ENV) it hands an
//! [`EnvironmentContext`] snapshot to an [`Environment`] and, for the
//! `LOAD_*` items, asks it to load.  [`XmlEnvironment`] is the default
//! implementation: it reads MSBuild project files with `roxmltree` and
//! evaluates their property groups per configuration.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::condition::{self, EvalContext};
use crate::model::{ConfigurationPlatform, GlobalProperties, ProjectItem, ProjectItemConfig};
use crate::sln::SlnError;

// ═══════════════════════════════════════════════════════════════════════════════
//  Capability
// ═══════════════════════════════════════════════════════════════════════════════

/// Something that can turn the parsed project references into loaded
/// projects.
pub trait Environment: fmt::Debug {
    /// Load every project.  With `minimal` only the unconditional project
    /// properties are read; otherwise each project is also evaluated for
    /// every configuration the solution maps it to.
    fn load(&mut self, minimal: bool) -> Result<(), SlnError>;

    /// Projects produced by the last [`load`](Self::load).
    fn projects(&self) -> &[LoadedProject];
}

/// Builds the environment for a finished parse.
pub type EnvironmentFactory = Box<dyn Fn(EnvironmentContext) -> Box<dyn Environment>>;

/// Owned snapshot of the parse an environment works from.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentContext {
    pub solution_dir: PathBuf,
    pub projects: Vec<ProjectItem>,
    pub item_configs: Vec<ProjectItemConfig>,
    pub global_properties: GlobalProperties,
    /// Project id → project XML, used when the file on disk cannot be read.
    pub raw_projects: HashMap<String, String>,
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Where a project's XML came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSource {
    Disk,
    /// The caller-supplied raw project table.
    Override,
    /// Neither readable nor overridden; carries the read error.
    Unavailable(String),
}

/// One project, evaluated for a single solution configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredProject {
    pub solution: ConfigurationPlatform,
    pub config: ConfigurationPlatform,
    /// Properties whose conditions held, in document order, `$(Var)`
    /// references expanded.
    pub properties: IndexMap<String, String>,
}

/// A project reference after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedProject {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub source: ProjectSource,
    /// `Sdk` attribute of `<Project>`, for SDK-style projects.
    pub sdk: Option<String>,
    /// Properties from unconditional `<PropertyGroup>`s; later values win.
    pub properties: IndexMap<String, String>,
    /// `Include` of every `<ProjectReference>`.
    pub project_references: Vec<String>,
    /// Empty after a minimal load.
    pub configurations: Vec<ConfiguredProject>,
}

impl LoadedProject {
    fn new(item: &ProjectItem, source: ProjectSource) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            path: item.full_path.clone(),
            source,
            sdk: None,
            properties: IndexMap::new(),
            project_references: Vec::new(),
            configurations: Vec::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self.source, ProjectSource::Unavailable(_))
    }

    /// Evaluation for the given solution configuration, if mapped.
    pub fn configuration(&self, solution: &ConfigurationPlatform) -> Option<&ConfiguredProject> {
        self.configurations.iter().find(|c| &c.solution == solution)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  XmlEnvironment
// ═══════════════════════════════════════════════════════════════════════════════

/// MSBuild global properties a project cannot override.
const PROTECTED_PROPERTIES: [&str; 2] = ["Configuration", "Platform"];

/// Default [`Environment`]: reads `.csproj`/`.vbproj`/... files from disk,
/// falling back to the raw project table.
#[derive(Debug, Clone)]
pub struct XmlEnvironment {
    context: EnvironmentContext,
    loaded: Vec<LoadedProject>,
}

impl XmlEnvironment {
    pub fn new(context: EnvironmentContext) -> Self {
        Self { context, loaded: Vec::new() }
    }

    pub fn context(&self) -> &EnvironmentContext {
        &self.context
    }

    /// Read the project XML from disk, or from the raw table.
    fn read_source(&self, item: &ProjectItem) -> (Option<String>, ProjectSource) {
        match std::fs::read_to_string(&item.full_path) {
            Ok(text) => (Some(text), ProjectSource::Disk),
            Err(err) => match self.context.raw_projects.get(&item.id) {
                Some(raw) => {
                    debug!(id = %item.id, path = %item.full_path.display(), "using raw project content");
                    (Some(raw.clone()), ProjectSource::Override)
                }
                None => {
                    warn!(id = %item.id, path = %item.full_path.display(), %err, "project unavailable");
                    (None, ProjectSource::Unavailable(err.to_string()))
                }
            },
        }
    }

    fn load_project(&self, item: &ProjectItem, minimal: bool) -> Result<LoadedProject, SlnError> {
        let (text, source) = self.read_source(item);
        let mut project = LoadedProject::new(item, source);
        let Some(text) = text else {
            return Ok(project);
        };

        let doc = roxmltree::Document::parse(&text)?;
        let root = doc.root_element();

        project.sdk = root.attribute("Sdk").map(String::from);
        project.properties = unconditional_properties(root);
        project.project_references = root
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "ProjectReference")
            .filter_map(|n| n.attribute("Include"))
            .map(String::from)
            .collect();

        if !minimal {
            let dir = item.full_path.parent().unwrap_or(self.context.solution_dir.as_path());
            project.configurations = self
                .context
                .item_configs
                .iter()
                .filter(|ic| ic.project_config.project_id == item.id)
                .map(|ic| ConfiguredProject {
                    solution: ic.solution.clone(),
                    config: ic.project_config.config.clone(),
                    properties: self.evaluate(root, item, &ic.project_config.config, dir),
                })
                .collect();
        }

        Ok(project)
    }

    /// Evaluate every `<PropertyGroup>` in document order for one
    /// configuration.
    fn evaluate(
        &self,
        root: roxmltree::Node,
        item: &ProjectItem,
        config: &ConfigurationPlatform,
        dir: &Path,
    ) -> IndexMap<String, String> {
        let mut vars: HashMap<String, String> = self
            .context
            .global_properties
            .iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v.to_string())))
            .collect();
        vars.insert("Configuration".into(), config.configuration.clone());
        vars.insert("Platform".into(), msbuild_platform(&config.platform));
        vars.insert("MSBuildProjectDirectory".into(), dir.display().to_string());
        if let Some(stem) = item.full_path.file_stem() {
            vars.insert("MSBuildProjectName".into(), stem.to_string_lossy().into_owned());
        }

        let mut properties = IndexMap::new();
        for group in root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "PropertyGroup")
        {
            if !condition_holds(group.attribute("Condition"), &vars, dir) {
                continue;
            }
            for prop in group.children().filter(|n| n.is_element()) {
                let name = prop.tag_name().name();
                if PROTECTED_PROPERTIES.iter().any(|p| p.eq_ignore_ascii_case(name)) {
                    continue;
                }
                if !condition_holds(prop.attribute("Condition"), &vars, dir) {
                    continue;
                }
                let value = {
                    let ctx = EvalContext::new(&vars);
                    condition::expand(prop.text().unwrap_or("").trim(), |n| ctx.lookup(n))
                };
                vars.insert(name.to_string(), value.clone());
                properties.insert(name.to_string(), value);
            }
        }
        properties
    }
}

impl Environment for XmlEnvironment {
    fn load(&mut self, minimal: bool) -> Result<(), SlnError> {
        let loaded = self
            .context
            .projects
            .iter()
            .filter(|p| !p.is_solution_folder())
            .map(|p| self.load_project(p, minimal))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            projects = loaded.len(),
            unavailable = loaded.iter().filter(|p| !p.is_loaded()).count(),
            minimal,
            "environment loaded"
        );
        self.loaded = loaded;
        Ok(())
    }

    fn projects(&self) -> &[LoadedProject] {
        &self.loaded
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Properties of `<PropertyGroup>`s without a `Condition`.
fn unconditional_properties(root: roxmltree::Node) -> IndexMap<String, String> {
    let mut properties = IndexMap::new();
    for group in root.children().filter(|n| {
        n.is_element() && n.tag_name().name() == "PropertyGroup" && n.attribute("Condition").is_none()
    }) {
        for prop in group
            .children()
            .filter(|n| n.is_element() && n.attribute("Condition").is_none())
        {
            properties.insert(
                prop.tag_name().name().to_string(),
                prop.text().unwrap_or("").trim().to_string(),
            );
        }
    }
    properties
}

/// Unparseable conditions count as false.
fn condition_holds(cond: Option<&str>, vars: &HashMap<String, String>, dir: &Path) -> bool {
    let Some(text) = cond else {
        return true;
    };
    match condition::parse_condition(text) {
        Ok(parsed) => condition::evaluate(&parsed, &EvalContext::new(vars).with_base_dir(dir)),
        Err(err) => {
            warn!(%err, "treating unparseable condition as false");
            false
        }
    }
}

/// Solution files spell the platform `Any CPU`; MSBuild expects `AnyCPU`.
fn msbuild_platform(platform: &str) -> String {
    if platform.eq_ignore_ascii_case("Any CPU") {
        "AnyCPU".to_string()
    } else {
        platform.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
