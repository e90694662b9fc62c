use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;

static RE_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"angular\s*\.\s*module\s*\(\s*['"]([^'"]+)['"]\s*(?:,\s*\[([^\]]*)\])?"#)
        .expect("invalid module regex")
});

static RE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("invalid quoted regex"));

/// Modules a single source file defines and uses.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Declarations {
    pub defines: HashSet<String>,
    pub uses: HashSet<String>,
}

impl Declarations {
    pub(crate) fn parse(source: &str) -> Self {
        let mut decl = Declarations::default();

        for captures in RE_MODULE.captures_iter(source) {
            let name = captures[1].to_string();

            match captures.get(2) {
                Some(deps) => {
                    for dep in RE_QUOTED.captures_iter(deps.as_str()) {
                        decl.uses.insert(dep[1].to_string());
                    }
                    decl.defines.insert(name);
                }
                None => {
                    decl.uses.insert(name);
                }
            }
        }

        // a file referencing its own module doesn't depend on itself
        let defines = &decl.defines;
        decl.uses.retain(|name| !defines.contains(name));
        decl
    }
}

/// Returns indices into `files` in dependency order. Ties are broken by the
/// original position, so unrelated files keep their relative order.
pub(crate) fn sort<F>(files: &[Utf8PathBuf], read: F) -> Vec<usize>
where
    F: Fn(&Utf8Path) -> Option<String>,
{
    let decls: Vec<Declarations> = files
        .iter()
        .map(|file| read(file.as_path()).map(|src| Declarations::parse(&src)).unwrap_or_default())
        .collect();

    let mut owners: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, decl) in decls.iter().enumerate() {
        for name in &decl.defines {
            owners.entry(name.as_str()).or_default().push(i);
        }
    }

    let mut graph = DiGraph::<usize, ()>::with_capacity(files.len(), 0);
    let nodes: Vec<NodeIndex> = (0..files.len()).map(|i| graph.add_node(i)).collect();

    for (user, decl) in decls.iter().enumerate() {
        for name in &decl.uses {
            for &owner in owners.get(name.as_str()).into_iter().flatten() {
                if owner != user {
                    graph.update_edge(nodes[owner], nodes[user], ());
                }
            }
        }
    }

    let mut indegree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(files.len());

    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);

        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[next];
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if order.len() < files.len() {
        let placed: HashSet<usize> = order.iter().copied().collect();
        let cyclic: Vec<usize> = (0..files.len()).filter(|i| !placed.contains(i)).collect();

        tracing::warn!(
            files = ?cyclic.iter().map(|&i| files[i].as_str()).collect::<Vec<_>>(),
            "module dependency cycle, keeping original order"
        );

        order.extend(cyclic);
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(sources: &[(&str, &str)]) -> Vec<String> {
        let files: Vec<Utf8PathBuf> = sources.iter().map(|(p, _)| Utf8PathBuf::from(*p)).collect();
        let lookup: HashMap<&str, &str> = sources.iter().copied().collect();

        sort(&files, |path| lookup.get(path.as_str()).map(|s| s.to_string()))
            .into_iter()
            .map(|i| files[i].to_string())
            .collect()
    }

    #[test]
    fn test_parse_declarations() {
        let decl = Declarations::parse(
            r#"
            angular.module("app", ['app.config', "ngRoute"]);
            angular.module('app').run(function () {});
            angular
                .module('other')
                .factory('x', function () {});
            "#,
        );

        assert_eq!(decl.defines, HashSet::from(["app".to_string()]));
        assert_eq!(
            decl.uses,
            HashSet::from([
                "app.config".to_string(),
                "ngRoute".to_string(),
                "other".to_string()
            ])
        );
    }

    #[test]
    fn test_definition_precedes_usage_regardless_of_order() {
        let order = sorted(&[
            ("moduleB.js", "angular.module('X').service('s', S);"),
            ("moduleA.js", "angular.module('X', []);"),
        ]);
        assert_eq!(order, ["moduleA.js", "moduleB.js"]);

        let order = sorted(&[
            ("moduleA.js", "angular.module('X', []);"),
            ("moduleB.js", "angular.module('X').service('s', S);"),
        ]);
        assert_eq!(order, ["moduleA.js", "moduleB.js"]);
    }

    #[test]
    fn test_dependency_list_counts_as_usage() {
        let order = sorted(&[
            ("app.js", "angular.module('app', ['app.config']);"),
            ("constant.config.js", "angular.module('app.config', []).constant('a', 1);"),
        ]);
        assert_eq!(order, ["constant.config.js", "app.js"]);
    }

    #[test]
    fn test_unrelated_files_are_stable() {
        let order = sorted(&[
            ("c.js", "var c;"),
            ("a.js", "var a;"),
            ("b.js", "angular.module('external');"),
        ]);
        assert_eq!(order, ["c.js", "a.js", "b.js"]);
    }

    #[test]
    fn test_chain_of_modules() {
        let order = sorted(&[
            ("3.js", "angular.module('c', ['b']);"),
            ("1.js", "angular.module('a', []);"),
            ("2.js", "angular.module('b', ['a']);"),
            ("0.js", "angular.module('c').run(f);"),
        ]);
        assert_eq!(order, ["1.js", "2.js", "3.js", "0.js"]);
    }

    #[test]
    fn test_cycle_keeps_everything() {
        let order = sorted(&[
            ("a.js", "angular.module('a', ['b']);"),
            ("b.js", "angular.module('b', ['a']);"),
            ("c.js", "var c;"),
        ]);
        assert_eq!(order, ["c.js", "a.js", "b.js"]);
    }

    #[test]
    fn test_unreadable_file_has_no_relations() {
        let files = vec![Utf8PathBuf::from("missing.js"), Utf8PathBuf::from("x.js")];
        assert_eq!(sort(&files, |_| None), vec![0, 1]);
    }
}
