//! Post-scan derivations: configuration cross-reference, item/config join,
//! default configuration selection and solution global properties.

use std::path::Path;

use indexmap::IndexMap;

use crate::model::{
    keys, ConfigurationPlatform, GlobalProperties, ProjectConfigPlatform, ProjectItem,
    ProjectItemConfig,
};

const DEBUG_CONFIGURATION: &str = "Debug";
const MIXED_PLATFORMS: &str = "Mixed Platforms";
const ANY_CPU: &str = "Any CPU";

// ═══════════════════════════════════════════════════════════════════════════════
//  Cross-reference
// ═══════════════════════════════════════════════════════════════════════════════

/// Map every solution configuration to the project configurations selected
/// by it, in parse order.  Project configurations referring to an unknown
/// solution configuration are dropped.
pub(crate) fn cross_reference(
    solution: &[ConfigurationPlatform],
    projects: &[ProjectConfigPlatform],
) -> IndexMap<ConfigurationPlatform, Vec<ProjectConfigPlatform>> {
    let mut map: IndexMap<_, Vec<_>> =
        solution.iter().map(|cfg| (cfg.clone(), Vec::new())).collect();

    for pc in projects {
        if let Some(list) = map.get_mut(&pc.solution) {
            list.push(pc.clone());
        }
    }

    map
}

/// Flatten the cross-reference into (project, solution config, project
/// config) triples.  The project is the first declared item with a matching
/// id, if any.
pub(crate) fn join_items(
    map: &IndexMap<ConfigurationPlatform, Vec<ProjectConfigPlatform>>,
    projects: &[ProjectItem],
) -> Vec<ProjectItemConfig> {
    map.iter()
        .flat_map(|(solution, configs)| {
            configs.iter().map(move |pc| ProjectItemConfig {
                project: projects.iter().find(|p| p.id == pc.project_id).cloned(),
                solution: solution.clone(),
                project_config: pc.clone(),
            })
        })
        .collect()
}

/// Copy `NestedProjects` parents onto the items they name.
pub(crate) fn link_nested(projects: &mut [ProjectItem], nested: &IndexMap<String, String>) {
    for project in projects {
        if let Some(parent) = nested.get(&project.id) {
            project.parent = Some(parent.clone());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Defaults
// ═══════════════════════════════════════════════════════════════════════════════

/// `Debug` (case-insensitive) if present, otherwise the first configuration.
pub(crate) fn default_configuration(configs: &[ConfigurationPlatform]) -> Option<&str> {
    configs
        .iter()
        .find(|c| c.configuration.eq_ignore_ascii_case(DEBUG_CONFIGURATION))
        .or_else(|| configs.first())
        .map(|c| c.configuration.as_str())
}

/// `Mixed Platforms`, then `Any CPU` (both case-insensitive), otherwise the
/// first platform.
pub(crate) fn default_platform(configs: &[ConfigurationPlatform]) -> Option<&str> {
    let find = |name: &str| configs.iter().find(|c| c.platform.eq_ignore_ascii_case(name));

    find(MIXED_PLATFORMS)
        .or_else(|| find(ANY_CPU))
        .or_else(|| configs.first())
        .map(|c| c.platform.as_str())
}

/// The default configuration and platform, picked independently.
pub(crate) fn default_config(configs: &[ConfigurationPlatform]) -> Option<ConfigurationPlatform> {
    let configuration = default_configuration(configs)?;
    let platform = default_platform(configs)?;
    Some(ConfigurationPlatform::new(configuration, platform))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Global properties
// ═══════════════════════════════════════════════════════════════════════════════

/// Derive the `Solution*` properties from the source path alone and merge in
/// the default configuration.
pub(crate) fn global_properties(
    source: &Path,
    default: Option<&ConfigurationPlatform>,
) -> GlobalProperties {
    let to_string = |s: &std::ffi::OsStr| s.to_string_lossy().into_owned();

    let dir = source
        .parent()
        .map(|d| d.to_string_lossy().into_owned())
        .filter(|d| !d.is_empty())
        .map(|mut d| {
            if !d.ends_with(std::path::MAIN_SEPARATOR) {
                d.push(std::path::MAIN_SEPARATOR);
            }
            d
        });

    let mut map = IndexMap::new();
    map.insert(keys::SOLUTION_DIR.to_string(), dir);
    map.insert(
        keys::SOLUTION_EXT.to_string(),
        source.extension().map(|e| format!(".{}", e.to_string_lossy())),
    );
    map.insert(keys::SOLUTION_FILE_NAME.to_string(), source.file_name().map(to_string));
    map.insert(keys::SOLUTION_NAME.to_string(), source.file_stem().map(to_string));
    map.insert(
        keys::SOLUTION_PATH.to_string(),
        Some(source.to_string_lossy().into_owned()),
    );
    map.insert(
        keys::CONFIGURATION.to_string(),
        default.map(|c| c.configuration.clone()),
    );
    map.insert(keys::PLATFORM.to_string(), default.map(|c| c.platform.clone()));

    GlobalProperties::from_map(map)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
