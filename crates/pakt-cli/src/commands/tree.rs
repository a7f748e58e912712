//! `pakt tree`: print the resolved dependency tree.

use miette::Result;

use pakt_resolver::graph::DependencyGraph;

use super::{build_config, load_project, resolve_project};

pub async fn exec(depth: Option<usize>) -> Result<()> {
    let config = build_config(false, false)?;
    let project = load_project(&config.cwd)?;
    let (resolver, patterns) = resolve_project(&config, &project).await?;

    let name = if project.name.is_empty() {
        "project".to_string()
    } else {
        project.name.clone()
    };
    let version = if project.version.is_empty() {
        "0.0.0".to_string()
    } else {
        project.version.clone()
    };

    let graph = DependencyGraph::build(&resolver, &name, &version, &patterns);
    print!("{}", graph.print_tree(depth));
    Ok(())
}
