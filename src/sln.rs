use std::collections::HashMap;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::aggregate;
use crate::env::{Environment, EnvironmentContext, EnvironmentFactory, XmlEnvironment};
use crate::handlers::{Handlers, RawFacts};
use crate::model::{
    ConfigurationPlatform, GlobalProperties, ProjectConfigPlatform, ProjectDependencies,
    ProjectItem, ProjectItemConfig, SolutionHeader,
};

/// File name used for solutions read from a stream with no backing file.
pub const MEMORY_SOURCE: &str = "$Memory.sln";

const SOLUTION_GUID: &str = "SolutionGuid";

// ═══════════════════════════════════════════════════════════════════════════════
//  Error
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum SlnError {
    /// Blank source path; raised before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Opening or reading the input failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A project file is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("environment error: {0}")]
    Environment(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  SlnItems
// ═══════════════════════════════════════════════════════════════════════════════

/// What a parse should produce.  Items combine with `|`; the broader
/// constants include the narrower ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SlnItems(u32);

impl SlnItems {
    pub const HEADER: Self = Self(1 << 0);
    pub const PROJECTS: Self = Self(1 << 1);
    pub const SOLUTION_CONFS: Self = Self(1 << 2);
    pub const PROJECT_CONFS: Self = Self(1 << 3);
    pub const PROJECT_DEPENDENCIES: Self = Self(1 << 4);
    pub const NESTED_PROJECTS: Self = Self(1 << 5);
    pub const SOLUTION_PROPERTIES: Self = Self(1 << 6);

    /// Solution and project configurations, enough for the cross-reference.
    pub const SOLUTION_CONF_PLATFORMS: Self = Self(Self::SOLUTION_CONFS.0 | Self::PROJECT_CONFS.0);

    /// Every section of the file.
    pub const SOLUTION: Self = Self(
        Self::HEADER.0
            | Self::PROJECTS.0
            | Self::SOLUTION_CONF_PLATFORMS.0
            | Self::PROJECT_DEPENDENCIES.0
            | Self::NESTED_PROJECTS.0
            | Self::SOLUTION_PROPERTIES.0,
    );

    /// The whole solution plus an unloaded [`Environment`].
    pub const ENV: Self = Self(Self::SOLUTION.0 | 1 << 7);
    /// Environment with a minimal project load.
    pub const LOAD_MINIMAL: Self = Self(Self::ENV.0 | 1 << 8);
    /// Environment with a full, per-configuration project load.
    pub const LOAD_FULL: Self = Self(Self::LOAD_MINIMAL.0 | 1 << 9);

    pub const ALL: Self = Self::LOAD_FULL;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SlnItems {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SlnItems {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Sln – parse result
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed `.sln` file.
///
/// Produced once by [`Sln::parse`], [`Sln::from_file`],
/// [`Sln::from_reader`] or an [`SlnBuilder`]; all accessors are read-only.
#[derive(Debug)]
pub struct Sln {
    source_path: PathBuf,
    solution_dir: PathBuf,
    items: SlnItems,
    header: SolutionHeader,
    projects: Vec<ProjectItem>,
    solution_configs: Option<Vec<ConfigurationPlatform>>,
    project_configs: Option<Vec<ProjectConfigPlatform>>,
    config_map: Option<IndexMap<ConfigurationPlatform, Vec<ProjectConfigPlatform>>>,
    project_item_configs: Option<Vec<ProjectItemConfig>>,
    default_config: Option<ConfigurationPlatform>,
    global_properties: GlobalProperties,
    dependencies: ProjectDependencies,
    nested_projects: IndexMap<String, String>,
    solution_properties: IndexMap<String, String>,
    env: Option<Box<dyn Environment>>,
}

impl Sln {
    /// Parse solution text held in memory (all sections, no environment).
    pub fn parse(source: &str) -> Result<Self, SlnError> {
        SlnBuilder::new().parse(source)
    }

    /// Parse a `.sln` file from disk (all sections, no environment).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SlnError> {
        SlnBuilder::new().from_file(path)
    }

    /// Parse solution text from an open reader (all sections, no environment).
    pub fn from_reader(reader: impl Read) -> Result<Self, SlnError> {
        SlnBuilder::new().from_reader(reader)
    }

    // ─── Source ──────────────────────────────────────────────────────────

    /// The path the solution was read from, or [`MEMORY_SOURCE`].
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn solution_dir(&self) -> &Path {
        &self.solution_dir
    }

    /// The items this parse was asked for.
    pub fn items(&self) -> SlnItems {
        self.items
    }

    pub fn header(&self) -> &SolutionHeader {
        &self.header
    }

    // ─── Projects ────────────────────────────────────────────────────────

    /// Declared projects, solution folders included, in file order.
    pub fn projects(&self) -> &[ProjectItem] {
        &self.projects
    }

    /// First project declared with `id`.
    pub fn project(&self, id: &str) -> Option<&ProjectItem> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn dependencies(&self) -> &ProjectDependencies {
        &self.dependencies
    }

    /// Child project id → containing solution folder id.
    pub fn nested_projects(&self) -> &IndexMap<String, String> {
        &self.nested_projects
    }

    // ─── Configurations ──────────────────────────────────────────────────

    /// Solution configurations, de-duplicated, in file order.
    pub fn solution_configs(&self) -> &[ConfigurationPlatform] {
        self.solution_configs.as_deref().unwrap_or_default()
    }

    pub fn project_configs(&self) -> &[ProjectConfigPlatform] {
        self.project_configs.as_deref().unwrap_or_default()
    }

    /// Solution configuration → project configurations it selects.
    ///
    /// `None` when either configuration section is missing from the file
    /// (or was not requested).
    pub fn config_map(&self) -> Option<&IndexMap<ConfigurationPlatform, Vec<ProjectConfigPlatform>>> {
        self.config_map.as_ref()
    }

    /// The configuration map flattened and joined with the declared
    /// projects.  `None` under the same conditions as [`config_map`](Self::config_map).
    pub fn project_item_configs(&self) -> Option<&[ProjectItemConfig]> {
        self.project_item_configs.as_deref()
    }

    /// The heuristically chosen default configuration and platform.
    pub fn default_config(&self) -> Option<&ConfigurationPlatform> {
        self.default_config.as_ref()
    }

    pub fn global_properties(&self) -> &GlobalProperties {
        &self.global_properties
    }

    // ─── Properties ──────────────────────────────────────────────────────

    /// `SolutionProperties` and `ExtensibilityGlobals` entries.
    pub fn solution_properties(&self) -> &IndexMap<String, String> {
        &self.solution_properties
    }

    pub fn solution_guid(&self) -> Option<&str> {
        self.solution_properties.get(SOLUTION_GUID).map(String::as_str)
    }

    // ─── Environment ─────────────────────────────────────────────────────

    /// Present when [`SlnItems::ENV`] was requested.
    pub fn env(&self) -> Option<&dyn Environment> {
        self.env.as_deref()
    }
}

/// Two results are equal when every parsed and derived field matches; the
/// environments are only compared for presence.
impl PartialEq for Sln {
    fn eq(&self, other: &Self) -> bool {
        self.source_path == other.source_path
            && self.solution_dir == other.solution_dir
            && self.items == other.items
            && self.header == other.header
            && self.projects == other.projects
            && self.solution_configs == other.solution_configs
            && self.project_configs == other.project_configs
            && self.config_map == other.config_map
            && self.project_item_configs == other.project_item_configs
            && self.default_config == other.default_config
            && self.global_properties == other.global_properties
            && self.dependencies == other.dependencies
            && self.nested_projects == other.nested_projects
            && self.solution_properties == other.solution_properties
            && self.env.is_some() == other.env.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  SlnBuilder – parse options
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse options for an [`Sln`].
///
/// # Example
/// ```no_run
/// use sln_rs::{SlnBuilder, SlnItems};
///
/// let sln = SlnBuilder::new()
///     .items(SlnItems::LOAD_MINIMAL)
///     .raw_project("{5A2B1C4D-0000-0000-0000-000000000001}", "<Project />")
///     .from_file("App.sln")
///     .unwrap();
/// let loaded = sln.env().unwrap().projects();
/// ```
pub struct SlnBuilder {
    items: SlnItems,
    raw_projects: HashMap<String, String>,
    environment: Option<EnvironmentFactory>,
    source_path: Option<PathBuf>,
}

impl Default for SlnBuilder {
    fn default() -> Self {
        Self {
            items: SlnItems::SOLUTION,
            raw_projects: HashMap::new(),
            environment: None,
            source_path: None,
        }
    }
}

impl fmt::Debug for SlnBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlnBuilder")
            .field("items", &self.items)
            .field("raw_projects", &self.raw_projects.keys().collect::<Vec<_>>())
            .field("environment", &self.environment.as_ref().map(|_| "custom"))
            .field("source_path", &self.source_path)
            .finish()
    }
}

impl SlnBuilder {
    /// Start with [`SlnItems::SOLUTION`] and no raw projects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the requested items.
    pub fn items(mut self, items: SlnItems) -> Self {
        self.items = items;
        self
    }

    /// Project XML to use when the project with `id` cannot be read from
    /// disk.  Later calls override earlier ones for the same id.
    pub fn raw_project(mut self, id: impl Into<String>, xml: impl Into<String>) -> Self {
        self.raw_projects.insert(id.into(), xml.into());
        self
    }

    /// Merge a whole raw project table.
    pub fn raw_projects(mut self, table: HashMap<String, String>) -> Self {
        self.raw_projects.extend(table);
        self
    }

    /// Use a custom [`Environment`] instead of [`XmlEnvironment`].
    pub fn environment(
        mut self,
        factory: impl Fn(EnvironmentContext) -> Box<dyn Environment> + 'static,
    ) -> Self {
        self.environment = Some(Box::new(factory));
        self
    }

    /// Name the file a reader or string was taken from; the solution
    /// directory and global properties are derived from it.
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Parse solution text held in memory.
    pub fn parse(self, source: &str) -> Result<Sln, SlnError> {
        self.from_reader(source.as_bytes())
    }

    /// Parse from an open reader.
    pub fn from_reader(mut self, reader: impl Read) -> Result<Sln, SlnError> {
        let source_path = self
            .source_path
            .take()
            .unwrap_or_else(|| PathBuf::from(MEMORY_SOURCE));
        self.run(BufReader::new(reader), source_path)
    }

    /// Parse a `.sln` file from disk.
    pub fn from_file(self, path: impl AsRef<Path>) -> Result<Sln, SlnError> {
        let path = path.as_ref();
        if path.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(SlnError::InvalidArgument("solution path is empty".into()));
        }
        let file = std::fs::File::open(path)?;
        self.run(BufReader::new(file), path.to_path_buf())
    }

    // ─── Driver ──────────────────────────────────────────────────────────

    fn run(self, mut reader: impl BufRead, source_path: PathBuf) -> Result<Sln, SlnError> {
        let items = self.items;
        let solution_dir = source_path.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!(path = %source_path.display(), ?items, "parsing solution");

        let mut facts = RawFacts::new(solution_dir.clone());
        let mut handlers = Handlers::for_items(items);

        handlers.start(&mut facts);
        let mut buf = Vec::new();
        let mut first = true;
        // Undecodable bytes (ANSI-saved files) are replaced, not rejected.
        while reader.read_until(b'\n', &mut buf)? > 0 {
            let line = String::from_utf8_lossy(&buf);
            let text = if first { line.trim_start_matches('\u{feff}') } else { &*line };
            handlers.line(text.trim(), &mut facts);
            first = false;
            buf.clear();
        }
        handlers.end(&mut facts);

        let mut sln = Self::aggregate(facts, items, source_path);
        debug!(
            projects = sln.projects.len(),
            solution_configs = sln.solution_configs().len(),
            project_configs = sln.project_configs().len(),
            "solution parsed"
        );

        if items.contains(SlnItems::ENV) {
            let context = EnvironmentContext {
                solution_dir,
                projects: sln.projects.clone(),
                item_configs: sln.project_item_configs.clone().unwrap_or_default(),
                global_properties: sln.global_properties.clone(),
                raw_projects: self.raw_projects,
            };
            let mut env = match &self.environment {
                Some(factory) => factory(context),
                None => Box::new(XmlEnvironment::new(context)),
            };
            if items.contains(SlnItems::LOAD_FULL) {
                env.load(false)?;
            } else if items.contains(SlnItems::LOAD_MINIMAL) {
                env.load(true)?;
            }
            sln.env = Some(env);
        }

        Ok(sln)
    }

    /// Derive the cross-referenced views from the raw facts.
    fn aggregate(mut facts: RawFacts, items: SlnItems, source_path: PathBuf) -> Sln {
        let solution_configs: Option<Vec<_>> =
            facts.solution_configs.take().map(|set| set.into_iter().collect());

        if let Some(nested) = &facts.nested_projects {
            aggregate::link_nested(&mut facts.projects, nested);
        }

        let (config_map, project_item_configs) =
            match (&solution_configs, &facts.project_configs) {
                (Some(solution), Some(project)) => {
                    let map = aggregate::cross_reference(solution, project);
                    let joined = aggregate::join_items(&map, &facts.projects);
                    (Some(map), Some(joined))
                }
                _ => (None, None),
            };

        let default_config = if items.contains(SlnItems::SOLUTION_CONFS) {
            solution_configs.as_deref().and_then(aggregate::default_config)
        } else {
            None
        };
        let global_properties = aggregate::global_properties(&source_path, default_config.as_ref());

        Sln {
            source_path,
            solution_dir: facts.solution_dir,
            items,
            header: facts.header,
            projects: facts.projects,
            solution_configs,
            project_configs: facts.project_configs,
            config_map,
            project_item_configs,
            default_config,
            global_properties,
            dependencies: facts.dependencies,
            nested_projects: facts.nested_projects.unwrap_or_default(),
            solution_properties: facts.solution_properties,
            env: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::LoadedProject;
    use crate::model::{keys, ProjectKind};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    const ROUND_TRIP: &str = r#"
Microsoft Visual Studio Solution File, Format Version 12.00
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "P", "P\P.csproj", "G1"
EndProject
Global
	GlobalSection(SolutionConfigurationPlatforms) = preSolution
		Debug|x86 = Debug|x86
	EndGlobalSection
	GlobalSection(ProjectConfigurationPlatforms) = postSolution
		G1.Debug|x86.Build = Debug|AnyCPU
	EndGlobalSection
EndGlobal
"#;

    /// Smoke-test: the fixture in the repo root must parse.
    #[test]
    fn parse_example_sln() {
        let result = Sln::from_file("example.sln");
        assert!(result.is_ok(), "Failed to parse example.sln: {}", result.unwrap_err());
    }

    #[test]
    fn example_sln_overview() {
        let sln = Sln::from_file("example.sln").unwrap();

        assert_eq!(sln.header().format_version.as_deref(), Some("12.00"));
        assert_eq!(sln.header().visual_studio_version.as_deref(), Some("17.8.34330.188"));

        let names: Vec<_> = sln.projects().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["App", "Core", "Core.Tests", "src", "Solution Items"]);

        assert_eq!(sln.solution_configs().len(), 4);
        assert_eq!(
            sln.default_config(),
            Some(&ConfigurationPlatform::new("Debug", "Any CPU"))
        );
        assert_eq!(sln.solution_guid(), Some("{3F1C0D4E-8A2B-4C6D-9E0F-1A2B3C4D5E6F}"));

        let app = sln.project("{5A2B1C4D-0000-4000-8000-000000000001}").unwrap();
        assert_eq!(app.kind, ProjectKind::CSharpSdk);
        assert_eq!(app.parent.as_deref(), Some("{5A2B1C4D-0000-4000-8000-0000000000F1}"));

        let items = sln.project("{5A2B1C4D-0000-4000-8000-0000000000F2}").unwrap();
        assert_eq!(items.solution_items, vec!["README.md", ".editorconfig"]);

        // App depends on Core through its ProjectDependencies section.
        assert!(sln.dependencies().depends_on(
            "{5A2B1C4D-0000-4000-8000-000000000001}",
            "{5A2B1C4D-0000-4000-8000-000000000002}",
        ));
    }

    #[test]
    fn example_sln_config_map() {
        let sln = Sln::from_file("example.sln").unwrap();
        let map = sln.config_map().unwrap();
        assert_eq!(map.len(), sln.solution_configs().len());

        let release_x64 = &map[&ConfigurationPlatform::new("Release", "x64")];
        assert_eq!(release_x64.len(), 3);
        assert!(release_x64.iter().all(|pc| pc.config.configuration == "Release"));

        // Core.Tests is not built in Release|Any CPU.
        let release_any = &map[&ConfigurationPlatform::new("Release", "Any CPU")];
        let tests = release_any
            .iter()
            .find(|pc| pc.project_id == "{5A2B1C4D-0000-4000-8000-000000000003}")
            .unwrap();
        assert!(!tests.build);

        let joined = sln.project_item_configs().unwrap();
        assert_eq!(joined.len(), map.values().map(Vec::len).sum::<usize>());
        assert!(joined.iter().all(|ic| ic.project.is_some()));
    }

    // ── Round trip ───────────────────────────────────────────────────────

    #[test]
    fn single_project_round_trip() {
        let sln = Sln::parse(ROUND_TRIP).unwrap();

        assert_eq!(sln.projects().len(), 1);
        assert_eq!(sln.projects()[0].id, "G1");

        assert_eq!(sln.solution_configs(), &[ConfigurationPlatform::new("Debug", "x86")]);

        assert_eq!(
            sln.project_configs(),
            &[ProjectConfigPlatform {
                project_id: "G1".into(),
                solution: ConfigurationPlatform::new("Debug", "x86"),
                config: ConfigurationPlatform::new("Debug", "AnyCPU"),
                build: true,
                deploy: false,
            }]
        );

        let joined = sln.project_item_configs().unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].project.as_ref().map(|p| p.id.as_str()), Some("G1"));
        assert_eq!(joined[0].solution, ConfigurationPlatform::new("Debug", "x86"));
        assert_eq!(joined[0].project_config.config, ConfigurationPlatform::new("Debug", "AnyCPU"));
    }

    #[test]
    fn reparse_is_structurally_equal() {
        let a = Sln::from_file("example.sln").unwrap();
        let b = Sln::from_file("example.sln").unwrap();
        assert_eq!(a, b);

        let c = Sln::parse(ROUND_TRIP).unwrap();
        let d = Sln::from_reader(ROUND_TRIP.as_bytes()).unwrap();
        assert_eq!(c, d);
    }

    // ── Degraded input ───────────────────────────────────────────────────

    #[test]
    fn missing_configuration_sections() {
        let text = r#"
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "A", "A.csproj", "{A}"
	ProjectSection(ProjectDependencies) = postProject
		{B} = {B}
	EndProjectSection
EndProject
Global
EndGlobal
"#;
        let sln = Sln::parse(text).unwrap();
        assert_eq!(sln.default_config(), None);
        assert_eq!(sln.config_map(), None);
        assert_eq!(sln.project_item_configs(), None);
        assert!(sln.solution_configs().is_empty());
        assert_eq!(sln.global_properties().get(keys::CONFIGURATION), None);

        // Other sections are unaffected; {B} is never declared.
        assert_eq!(sln.projects().len(), 1);
        assert!(sln.dependencies().depends_on("{A}", "{B}"));
    }

    #[test]
    fn only_solution_configs_skips_join() {
        let text = "\
Global
	GlobalSection(SolutionConfigurationPlatforms) = preSolution
		Release|x64 = Release|x64
	EndGlobalSection
EndGlobal";
        let sln = Sln::parse(text).unwrap();
        assert_eq!(sln.config_map(), None);
        assert_eq!(sln.default_config(), Some(&ConfigurationPlatform::new("Release", "x64")));
    }

    #[test]
    fn empty_input() {
        let sln = Sln::parse("").unwrap();
        assert!(sln.projects().is_empty());
        assert_eq!(sln.default_config(), None);
        assert_eq!(sln.source_path(), Path::new(MEMORY_SOURCE));
    }

    #[test]
    fn bom_is_ignored() {
        let text = "\u{feff}Microsoft Visual Studio Solution File, Format Version 12.00\n";
        let sln = Sln::parse(text).unwrap();
        assert_eq!(sln.header().format_version.as_deref(), Some("12.00"));
    }

    #[test]
    fn non_utf8_bytes_are_replaced() {
        let mut bytes = b"Project(\"{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}\") = \"Caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"\", \"Cafe.csproj\", \"{A}\"\r\nEndProject\r\n");

        let sln = Sln::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(sln.projects().len(), 1);
        assert_eq!(sln.projects()[0].id, "{A}");
        assert_eq!(sln.projects()[0].name, "Caf\u{fffd}");
        assert_eq!(sln.projects()[0].raw, None);
    }

    #[test]
    fn mapping_to_unknown_solution_config_is_dropped() {
        let text = "\
GlobalSection(SolutionConfigurationPlatforms) = preSolution
	Debug|x86 = Debug|x86
EndGlobalSection
GlobalSection(ProjectConfigurationPlatforms) = postSolution
	{A}.Debug|x86.ActiveCfg = Debug|x86
	{A}.Debug|ARM.ActiveCfg = Debug|ARM
EndGlobalSection";
        let sln = Sln::parse(text).unwrap();
        assert_eq!(sln.project_configs().len(), 2);
        let joined = sln.project_item_configs().unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].project, None);
    }

    // ── Arguments / I/O ──────────────────────────────────────────────────

    #[test]
    fn blank_path_is_invalid_argument() {
        assert!(matches!(Sln::from_file(""), Err(SlnError::InvalidArgument(_))));
        assert!(matches!(Sln::from_file("   "), Err(SlnError::InvalidArgument(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Sln::from_file("does-not-exist.sln").unwrap_err();
        match err {
            SlnError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn read_failure_is_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("boom"))
            }
        }
        assert!(matches!(Sln::from_reader(Broken), Err(SlnError::Io(_))));
    }

    #[test]
    fn source_path_and_global_properties() {
        let sln = Sln::from_file("example.sln").unwrap();
        assert_eq!(sln.solution_dir(), Path::new(""));
        let props = sln.global_properties();
        assert_eq!(props.get(keys::SOLUTION_FILE_NAME), Some("example.sln"));
        assert_eq!(props.get(keys::SOLUTION_NAME), Some("example"));
        assert_eq!(props.get(keys::SOLUTION_EXT), Some(".sln"));
        assert_eq!(props.get(keys::CONFIGURATION), Some("Debug"));
        assert_eq!(props.get(keys::PLATFORM), Some("Any CPU"));

        let named = SlnBuilder::new()
            .source_path(Path::new("work").join("Named.sln"))
            .parse(ROUND_TRIP)
            .unwrap();
        assert_eq!(named.solution_dir(), Path::new("work"));
        assert_eq!(named.global_properties().get(keys::SOLUTION_NAME), Some("Named"));
    }

    // ── Items ────────────────────────────────────────────────────────────

    #[test]
    fn items_compose() {
        assert!(SlnItems::SOLUTION.contains(SlnItems::PROJECTS));
        assert!(SlnItems::LOAD_FULL.contains(SlnItems::LOAD_MINIMAL));
        assert!(SlnItems::LOAD_MINIMAL.contains(SlnItems::ENV));
        assert!(!SlnItems::LOAD_MINIMAL.contains(SlnItems::LOAD_FULL));
        assert!(!SlnItems::SOLUTION.contains(SlnItems::ENV));

        let mut items = SlnItems::PROJECTS;
        items |= SlnItems::SOLUTION_CONFS;
        assert_eq!(items, SlnItems::PROJECTS | SlnItems::SOLUTION_CONFS);
        assert_eq!(SlnItems::empty().bits(), 0);
    }

    #[test]
    fn narrowed_items_leave_other_sections_empty() {
        let sln = SlnBuilder::new()
            .items(SlnItems::PROJECTS)
            .from_file("example.sln")
            .unwrap();
        assert_eq!(sln.projects().len(), 5);
        assert!(sln.solution_configs().is_empty());
        assert!(sln.dependencies().is_empty());
        assert_eq!(sln.default_config(), None);
        assert_eq!(sln.projects()[0].parent, None);
        assert!(sln.env().is_none());
    }

    // ── Environment ──────────────────────────────────────────────────────

    #[derive(Debug, Default)]
    struct Recording {
        calls: Rc<RefCell<Vec<bool>>>,
    }

    impl Environment for Recording {
        fn load(&mut self, minimal: bool) -> Result<(), SlnError> {
            self.calls.borrow_mut().push(minimal);
            Ok(())
        }

        fn projects(&self) -> &[LoadedProject] {
            &[]
        }
    }

    fn recording(items: SlnItems) -> (Sln, Vec<bool>, usize) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::new(RefCell::new(0));
        let (factory_calls, factory_seen) = (calls.clone(), seen.clone());
        let sln = SlnBuilder::new()
            .items(items)
            .environment(move |ctx| {
                *factory_seen.borrow_mut() = ctx.projects.len();
                Box::new(Recording { calls: factory_calls.clone() })
            })
            .from_file("example.sln")
            .unwrap();
        let calls = calls.borrow().clone();
        let seen = *seen.borrow();
        (sln, calls, seen)
    }

    #[test]
    fn environment_load_follows_items() {
        let (sln, calls, _) = recording(SlnItems::SOLUTION);
        assert!(sln.env().is_none());
        assert!(calls.is_empty());

        let (sln, calls, seen) = recording(SlnItems::ENV);
        assert!(sln.env().is_some());
        assert!(calls.is_empty());
        assert_eq!(seen, 5);

        let (_, calls, _) = recording(SlnItems::LOAD_MINIMAL);
        assert_eq!(calls, vec![true]);

        let (_, calls, _) = recording(SlnItems::LOAD_FULL);
        assert_eq!(calls, vec![false]);
    }

    #[test]
    fn environment_failure_is_forwarded() {
        #[derive(Debug)]
        struct Failing;
        impl Environment for Failing {
            fn load(&mut self, _: bool) -> Result<(), SlnError> {
                Err(SlnError::Environment("cannot load".into()))
            }
            fn projects(&self) -> &[LoadedProject] {
                &[]
            }
        }

        let result = SlnBuilder::new()
            .items(SlnItems::LOAD_MINIMAL)
            .environment(|_| Box::new(Failing))
            .parse(ROUND_TRIP);
        assert!(matches!(result, Err(SlnError::Environment(_))));
    }

    #[test]
    fn default_environment_uses_raw_projects() {
        let sln = SlnBuilder::new()
            .items(SlnItems::LOAD_FULL)
            .raw_project(
                "G1",
                r#"<Project><PropertyGroup Condition="'$(Configuration)' == 'Debug'"><DebugType>full</DebugType></PropertyGroup></Project>"#,
            )
            .parse(ROUND_TRIP)
            .unwrap();

        let projects = sln.env().unwrap().projects();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].source, crate::env::ProjectSource::Override);
        let debug = projects[0]
            .configuration(&ConfigurationPlatform::new("Debug", "x86"))
            .unwrap();
        assert_eq!(debug.properties["DebugType"], "full");
    }
}
