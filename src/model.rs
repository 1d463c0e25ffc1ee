//! Data records produced by a solution parse.
//!
//! Everything here is plain data: the section handlers fill these in while
//! the file is scanned and the aggregator derives the cross-referenced views
//! afterwards.  Nothing in this module performs I/O.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};

// ═══════════════════════════════════════════════════════════════════════════════
//  ConfigurationPlatform
// ═══════════════════════════════════════════════════════════════════════════════

/// A `Configuration|Platform` pair such as `Debug|Any CPU`.
///
/// Equality and hashing are field-wise and case-sensitive, exactly as the
/// strings are written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConfigurationPlatform {
    pub configuration: String,
    /// Empty when the token carries no `|` separator.
    pub platform: String,
}

impl ConfigurationPlatform {
    pub fn new(configuration: impl Into<String>, platform: impl Into<String>) -> Self {
        Self { configuration: configuration.into(), platform: platform.into() }
    }

    /// Split a `Debug|x86` token on the first `|`.
    ///
    /// Returns `None` for an empty configuration name.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (configuration, platform) = match token.split_once('|') {
            Some((c, p)) => (c.trim(), p.trim()),
            None => (token, ""),
        };
        if configuration.is_empty() {
            return None;
        }
        Some(Self::new(configuration, platform))
    }
}

impl fmt::Display for ConfigurationPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.platform.is_empty() {
            write!(f, "{}", self.configuration)
        } else {
            write!(f, "{}|{}", self.configuration, self.platform)
        }
    }
}

// ─── ProjectConfigPlatform ───────────────────────────────────────────────────

/// A project-scope configuration mapped from one solution configuration.
///
/// Built from the `{id}.Debug|x86.ActiveCfg = Debug|AnyCPU` family of lines;
/// every line for the same project and solution configuration lands in one
/// record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfigPlatform {
    pub project_id: String,
    /// The solution configuration this entry is selected by.
    pub solution: ConfigurationPlatform,
    /// The configuration the project itself builds with.
    pub config: ConfigurationPlatform,
    /// A `Build.0` line was present.
    pub build: bool,
    /// A `Deploy.0` line was present.
    pub deploy: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  ProjectItem
// ═══════════════════════════════════════════════════════════════════════════════

/// Well-known project type GUIDs.
pub mod project_types {
    pub const CS: &str = "{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}";
    pub const CS_SDK: &str = "{9A19103F-16F7-4668-BE54-9A1E7A4F7556}";
    pub const VB: &str = "{F184B08F-C81C-45F6-A57F-5ABD9991F28F}";
    pub const VB_SDK: &str = "{778DAE3C-4631-46EA-AA77-85C1314464D9}";
    pub const FS: &str = "{F2A71F9B-5D33-465A-A702-920D77279786}";
    pub const FS_SDK: &str = "{6EC3EE1D-3C4E-46DD-8F32-0CC8E7565705}";
    pub const VC: &str = "{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}";
    pub const SOLUTION_FOLDER: &str = "{2150E333-8FDC-42A3-9474-1A3956D46DE8}";
    pub const SHARED: &str = "{D954291E-2A0B-460D-934E-DC6B0785DB48}";
    pub const WEB_SITE: &str = "{E24C65DC-7377-472B-9ABA-BC803B73C61A}";
}

/// Project flavour, derived from the project type GUID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProjectKind {
    CSharp,
    CSharpSdk,
    VisualBasic,
    FSharp,
    Cpp,
    SolutionFolder,
    Shared,
    WebSite,
    #[default]
    Unknown,
}

impl ProjectKind {
    /// Classify a type GUID (braces optional, case-insensitive).
    pub fn from_type_id(type_id: &str) -> Self {
        let normalized = type_id.trim().trim_start_matches('{').trim_end_matches('}');
        let matches = |guid: &str| guid[1..guid.len() - 1].eq_ignore_ascii_case(normalized);

        if matches(project_types::CS) {
            Self::CSharp
        } else if matches(project_types::CS_SDK) {
            Self::CSharpSdk
        } else if matches(project_types::VB) || matches(project_types::VB_SDK) {
            Self::VisualBasic
        } else if matches(project_types::FS) || matches(project_types::FS_SDK) {
            Self::FSharp
        } else if matches(project_types::VC) {
            Self::Cpp
        } else if matches(project_types::SOLUTION_FOLDER) {
            Self::SolutionFolder
        } else if matches(project_types::SHARED) {
            Self::Shared
        } else if matches(project_types::WEB_SITE) {
            Self::WebSite
        } else {
            Self::Unknown
        }
    }
}

/// One `Project(...) = ...` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectItem {
    /// Project GUID token, as written (e.g. `{A0C3...}`).
    pub id: String,
    pub name: String,
    /// Relative path as written in the solution file.
    pub path: String,
    /// `path` resolved against the solution directory, with `\` separators
    /// normalised for the host platform.
    pub full_path: PathBuf,
    pub type_id: String,
    pub kind: ProjectKind,
    /// Id of the containing solution folder (from `NestedProjects`).
    pub parent: Option<String>,
    /// Files listed in a `ProjectSection(SolutionItems)` block.
    pub solution_items: Vec<String>,
    /// Verbatim (trimmed) lines between the declaration and `EndProject`.
    /// `None` when the block is empty.
    pub raw: Option<String>,
}

impl ProjectItem {
    pub fn new(
        type_id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        id: impl Into<String>,
        solution_dir: &Path,
    ) -> Self {
        let type_id = type_id.into();
        let path = path.into();
        Self {
            id: id.into(),
            name: name.into(),
            full_path: solution_dir.join(normalize_separators(&path)),
            kind: ProjectKind::from_type_id(&type_id),
            type_id,
            path,
            ..Default::default()
        }
    }

    pub fn is_solution_folder(&self) -> bool {
        self.kind == ProjectKind::SolutionFolder
    }
}

/// Replace Windows path separators with the host separator.
fn normalize_separators(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '\\' {
        path.to_string()
    } else {
        path.replace('\\', std::path::MAIN_SEPARATOR_STR)
    }
}

// ─── ProjectItemConfig ───────────────────────────────────────────────────────

/// A project item joined with one solution configuration and the project
/// configuration it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectItemConfig {
    /// `None` when no project was declared with the mapping's project id.
    pub project: Option<ProjectItem>,
    pub solution: ConfigurationPlatform,
    pub project_config: ProjectConfigPlatform,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  ProjectDependencies
// ═══════════════════════════════════════════════════════════════════════════════

/// Project id → ids of the projects it declares as build dependencies.
///
/// Targets are recorded as written; they need not name a declared project
/// and cycles are kept as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDependencies {
    map: IndexMap<String, IndexSet<String>>,
}

impl ProjectDependencies {
    /// Record that `project_id` depends on `dependency_id`.
    pub fn add(&mut self, project_id: &str, dependency_id: &str) {
        self.entry(project_id).insert(dependency_id.to_string());
    }

    /// Make sure `project_id` has an entry, even with no dependencies.
    pub(crate) fn touch(&mut self, project_id: &str) {
        self.entry(project_id);
    }

    fn entry(&mut self, project_id: &str) -> &mut IndexSet<String> {
        self.map.entry(project_id.to_string()).or_default()
    }

    pub fn get(&self, project_id: &str) -> Option<&IndexSet<String>> {
        self.map.get(project_id)
    }

    /// Whether `project_id` directly depends on `dependency_id`.
    pub fn depends_on(&self, project_id: &str, dependency_id: &str) -> bool {
        self.get(project_id).is_some_and(|deps| deps.contains(dependency_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexSet<String>)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  GlobalProperties
// ═══════════════════════════════════════════════════════════════════════════════

/// Keys of [`GlobalProperties`], named after their MSBuild counterparts.
pub mod keys {
    pub const SOLUTION_DIR: &str = "SolutionDir";
    pub const SOLUTION_EXT: &str = "SolutionExt";
    pub const SOLUTION_FILE_NAME: &str = "SolutionFileName";
    pub const SOLUTION_NAME: &str = "SolutionName";
    pub const SOLUTION_PATH: &str = "SolutionPath";
    pub const CONFIGURATION: &str = "Configuration";
    pub const PLATFORM: &str = "Platform";
}

/// Read-only solution-scoped properties derived from the source path and the
/// default configuration.  A key can be present with no value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalProperties {
    map: IndexMap<String, Option<String>>,
}

impl GlobalProperties {
    pub(crate) fn from_map(map: IndexMap<String, Option<String>>) -> Self {
        Self { map }
    }

    /// Value of `key`; `None` for both unknown keys and absent values.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(|v| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ─── SolutionHeader ──────────────────────────────────────────────────────────

/// Version information from the first lines of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionHeader {
    /// `Format Version 12.00`.
    pub format_version: Option<String>,
    /// `# Visual Studio Version 17` (or `# Visual Studio 2010`).
    pub program_version: Option<String>,
    pub visual_studio_version: Option<String>,
    pub minimum_visual_studio_version: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
