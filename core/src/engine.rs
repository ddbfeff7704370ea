//! One convergence run, end to end.
//!
//! ```text
//! attributes ─▶ defaults ─▶ freeze ─▶ profile ─▶ declare ─▶ converge ─▶ Report
//! ```
//!
//! Everything up to and including declaration is pure: a `Config` or
//! `Template` error surfaces before the host is touched.

use log::info;

use crate::attributes::{defaults, AttributeTree};
use crate::convergence::executor;
use crate::convergence::graph::ResourceGraph;
use crate::error::Result;
use crate::host::Host;
use crate::profile::{self, Profile};
use crate::recipe;
use crate::template::Renderer;
use crate::types::config::RunSettings;
use crate::types::report::Report;
use crate::types::resource::Spec;

/// The declaration-time products of a run.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub attrs: AttributeTree,
    pub profile: Profile,
    pub graph: ResourceGraph,
}

/// Apply defaults, freeze, resolve the profile and declare the graph.
pub fn prepare(mut attrs: AttributeTree, renderer: &dyn Renderer) -> Result<Prepared> {
    defaults::apply(&mut attrs)?;
    attrs.freeze();
    let profile = profile::resolve(&attrs)?;
    let graph = recipe::declare(&attrs, &profile, renderer)?;
    info!(
        "{} {}: {} resources declared",
        profile.distribution,
        profile.version,
        graph.len()
    );
    Ok(Prepared { attrs, profile, graph })
}

/// Converge `host` to the state described by `attrs`.
///
/// `Err` means nothing was applied. A failure while applying is reported
/// in the returned `Report` instead.
pub fn run(attrs: AttributeTree, host: &mut dyn Host, renderer: &dyn Renderer, settings: &RunSettings) -> Result<Report> {
    let prepared = prepare(attrs, renderer)?;
    Ok(executor::converge(&prepared.graph, host, renderer, settings))
}

/// Render the files that land in the private configuration directory, as
/// `(file name, content)` pairs in declaration order.
pub fn render_conf(attrs: AttributeTree, renderer: &dyn Renderer) -> Result<Vec<(String, Vec<u8>)>> {
    let prepared = prepare(attrs, renderer)?;
    let conf_dir = &prepared.profile.conf_dir_chef;
    let mut files = Vec::new();
    for resource in prepared.graph.resources() {
        let Spec::Template { path, source, variables, .. } = &resource.spec else {
            continue;
        };
        if path.parent() != Some(conf_dir.as_path()) {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        files.push((
            name.to_string_lossy().into_owned(),
            renderer.render(source, variables)?,
        ));
    }
    Ok(files)
}
