//! Structural validation of pipeline graphs.
//!
//! The engine assumes a well-formed graph; these rules are checked once
//! after parsing. Errors make a graph unrunnable; warnings are advisory.

use crate::conditions::parse_condition;

use super::Graph;

/// How serious a violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One failed validation rule.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Short rule name, e.g. `single-start`.
    pub rule: &'static str,
    /// Node id or `from -> to` edge description.
    pub target: String,
    pub message: String,
    pub severity: Severity,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} [{}] {}: {}", tag, self.rule, self.target, self.message)
    }
}

/// Runs all rules and returns every violation found.
pub fn validate(graph: &Graph) -> Vec<Violation> {
    let mut violations = Vec::new();

    let starts: Vec<&str> = graph
        .nodes
        .values()
        .filter(|n| n.is_start())
        .map(|n| n.id.as_str())
        .collect();
    if starts.is_empty() {
        violations.push(Violation {
            rule: "single-start",
            target: graph.name.clone(),
            message: "graph has no start node".to_string(),
            severity: Severity::Error,
        });
    } else if starts.len() > 1 {
        violations.push(Violation {
            rule: "single-start",
            target: starts.join(", "),
            message: format!("graph has {} start nodes; exactly one required", starts.len()),
            severity: Severity::Error,
        });
    }

    if graph.exit_nodes().is_empty() {
        violations.push(Violation {
            rule: "has-exit",
            target: graph.name.clone(),
            message: "graph has no exit node".to_string(),
            severity: Severity::Error,
        });
    }

    for edge in &graph.edges {
        for endpoint in [&edge.from_node, &edge.to_node] {
            if !graph.nodes.contains_key(endpoint) {
                violations.push(Violation {
                    rule: "edge-endpoints",
                    target: format!("{} -> {}", edge.from_node, edge.to_node),
                    message: format!("endpoint `{}` does not exist", endpoint),
                    severity: Severity::Error,
                });
            }
        }
        if !edge.condition.is_empty() && parse_condition(&edge.condition).is_err() {
            violations.push(Violation {
                rule: "condition-syntax",
                target: format!("{} -> {}", edge.from_node, edge.to_node),
                message: format!("unparsable condition `{}`", edge.condition),
                severity: Severity::Error,
            });
        }
    }

    for node in graph.nodes.values() {
        if node.is_start() && !graph.incoming(&node.id).is_empty() {
            violations.push(Violation {
                rule: "start-no-inbound",
                target: node.id.clone(),
                message: "start node has inbound edges".to_string(),
                severity: Severity::Error,
            });
        }
        if node.is_exit() && !graph.outgoing(&node.id).is_empty() {
            violations.push(Violation {
                rule: "exit-no-outbound",
                target: node.id.clone(),
                message: "exit node has outbound edges".to_string(),
                severity: Severity::Error,
            });
        }
        for target in [&node.retry_target, &node.fallback_retry_target] {
            if let Some(target) = target {
                if !graph.nodes.contains_key(target) {
                    violations.push(Violation {
                        rule: "retry-target-exists",
                        target: node.id.clone(),
                        message: format!("retry target `{}` does not exist", target),
                        severity: Severity::Error,
                    });
                }
            }
        }
    }

    if let Some(start) = graph.start_node() {
        let reachable = graph.reachable_from(&start.id);
        for node in graph.nodes.values() {
            if !reachable.contains(&node.id) {
                violations.push(Violation {
                    rule: "reachable",
                    target: node.id.clone(),
                    message: "node is unreachable from start".to_string(),
                    severity: Severity::Error,
                });
            }
        }
    }

    for (key, target_key) in [
        ("retry_target", "retry-target-exists"),
        ("fallback_retry_target", "retry-target-exists"),
    ] {
        if let Some(target) = graph.attributes.get(key) {
            if !graph.nodes.contains_key(target) {
                violations.push(Violation {
                    rule: target_key,
                    target: format!("graph.{}", key),
                    message: format!("retry target `{}` does not exist", target),
                    severity: Severity::Warning,
                });
            }
        }
    }

    violations
}

/// Whether the graph passed validation with no error-severity violations.
pub fn is_valid(violations: &[Violation]) -> bool {
    violations.iter().all(|v| v.severity != Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::parse::parse_graph;

    const GOOD: &str = r#"
        digraph ok {
            start [shape=Mdiamond];
            work [shape=box];
            done [shape=Msquare];
            start -> work -> done;
        }
    "#;

    #[test]
    fn valid_graph_has_no_errors() {
        let g = parse_graph(GOOD).expect("parse");
        let v = validate(&g);
        assert!(is_valid(&v), "violations: {:?}", v);
    }

    #[test]
    fn missing_start_is_error() {
        let g = parse_graph("digraph g { a [shape=box]; b [shape=Msquare]; a -> b; }")
            .expect("parse");
        let v = validate(&g);
        assert!(v.iter().any(|x| x.rule == "single-start"));
        assert!(!is_valid(&v));
    }

    #[test]
    fn two_starts_is_error() {
        let g = parse_graph(
            "digraph g { a [shape=Mdiamond]; b [shape=Mdiamond]; c [shape=Msquare]; a -> c; b -> c; }",
        )
        .expect("parse");
        assert!(validate(&g).iter().any(|x| x.rule == "single-start"));
    }

    #[test]
    fn missing_exit_is_error() {
        let g = parse_graph("digraph g { a [shape=Mdiamond]; b [shape=box]; a -> b; }")
            .expect("parse");
        assert!(validate(&g).iter().any(|x| x.rule == "has-exit"));
    }

    #[test]
    fn start_with_inbound_is_error() {
        let g = parse_graph(
            "digraph g { s [shape=Mdiamond]; a [shape=box]; e [shape=Msquare]; s -> a; a -> s; a -> e; }",
        )
        .expect("parse");
        assert!(validate(&g).iter().any(|x| x.rule == "start-no-inbound"));
    }

    #[test]
    fn exit_with_outbound_is_error() {
        let g = parse_graph(
            "digraph g { s [shape=Mdiamond]; e [shape=Msquare]; a [shape=box]; s -> e; e -> a; s -> a; }",
        )
        .expect("parse");
        assert!(validate(&g).iter().any(|x| x.rule == "exit-no-outbound"));
    }

    #[test]
    fn unreachable_node_is_error() {
        let g = parse_graph(
            "digraph g { s [shape=Mdiamond]; e [shape=Msquare]; lone [shape=box]; s -> e; }",
        )
        .expect("parse");
        let v = validate(&g);
        assert!(v.iter().any(|x| x.rule == "reachable" && x.target == "lone"));
    }

    #[test]
    fn dangling_retry_target_is_error() {
        let g = parse_graph(
            "digraph g { s [shape=Mdiamond]; w [shape=box, goal_gate=true, retry_target=ghost]; e [shape=Msquare]; s -> w -> e; }",
        )
        .expect("parse");
        assert!(validate(&g).iter().any(|x| x.rule == "retry-target-exists"));
    }

    #[test]
    fn bad_condition_is_error() {
        let g = parse_graph(
            r#"digraph g { s [shape=Mdiamond]; e [shape=Msquare]; s -> e [condition="no operator"]; }"#,
        )
        .expect("parse");
        assert!(validate(&g).iter().any(|x| x.rule == "condition-syntax"));
    }
}
