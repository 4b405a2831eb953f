//! CLI-level tests over the parse/validate path used by `check`.

use heddle::graph::parse::parse_graph;
use heddle::graph::validate::{is_valid, validate};

const DEMO: &str = include_str!("../../demos/fix_bug.dot");

#[test]
fn shipped_demo_graph_is_valid() {
    let graph = parse_graph(DEMO).expect("demo graph parses");
    assert_eq!(graph.name, "fix_bug");
    let violations = validate(&graph);
    assert!(is_valid(&violations), "violations: {:?}", violations);
}

#[test]
fn demo_graph_routing_fields_survive_parsing() {
    let graph = parse_graph(DEMO).expect("parse");
    assert_eq!(graph.goal(), "Fix the reported bug and keep the test suite green");
    let signoff_edges = graph.outgoing("signoff");
    assert_eq!(signoff_edges.len(), 3);
    assert!(signoff_edges.iter().any(|e| e.label == "[S] Ship"));
    assert!(signoff_edges.iter().any(|e| e.loop_restart));
    let verify = graph.node("verify").expect("verify node");
    assert!(verify.allow_partial);
    assert_eq!(verify.timeout, Some(std::time::Duration::from_secs(900)));
}
