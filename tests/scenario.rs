//! Drives the public graph API the way a manifest loader and a
//! dependency-log reader would, end to end.

use std::rc::Rc;
use weft::env::{Pool, Rule, Scope};
use weft::graph::{Edge, EdgeIns, EdgeOuts, Graph};
use weft::hash::{hash_edge, murmur64};

fn rule(name: &str, command: &str) -> Rc<Rule> {
    let mut rule = Rule::new(name);
    rule.vars.insert("command".to_owned(), command.to_owned());
    Rc::new(rule)
}

#[test]
fn compile_edge_lifecycle() -> anyhow::Result<()> {
    let mut graph = Graph::new();

    let mut file_scope = Scope::root();
    file_scope.set("builddir", "out");
    let file_scope = Rc::new(file_scope);

    let cc = rule("cc", "cc -c main.c -o out.o");
    let main_c = graph.node_id("main.c");
    let out_o = graph.node_id("out.o");
    let compile = graph.add_edge(Edge::new(
        cc,
        Scope::child(&file_scope),
        EdgeIns {
            ids: vec![main_c],
            explicit: 1,
            implicit: 0,
        },
        EdgeOuts {
            ids: vec![out_o],
            explicit: 1,
        },
    ))?;

    // The recipe hash covers exactly the expanded command bytes.
    assert_eq!(
        hash_edge(graph.edge_mut(compile))?,
        murmur64(b"cc -c main.c -o out.o")
    );

    // A depfile discovers header.h: spliced in as an implicit input, with a
    // synthesized phony producer.
    let header = graph.node_id("header.h");
    graph.add_deps(compile, &[header])?;

    let edge = graph.edge(compile);
    assert_eq!(edge.explicit_ins(), &[main_c]);
    assert_eq!(edge.implicit_ins(), &[header]);
    assert!(edge.order_only_ins().is_empty());

    let phony = graph.edge(graph.node(header).producer.unwrap());
    assert!(phony.is_phony());
    assert!(phony.ins().is_empty());
    assert_eq!(phony.outs(), &[header]);

    // main.c stays a source file even though header.h got a producer.
    assert_eq!(graph.node(main_c).producer, None);

    // out.o feeds nothing, so a driver with no named targets builds it.
    assert_eq!(graph.root_outputs(), vec![out_o]);
    Ok(())
}

#[test]
fn regenerated_manifest_reload() -> anyhow::Result<()> {
    // Parse, decide the manifest is stale, reset, parse again.
    let mut graph = Graph::new();
    let link = rule("link", "ld -o app main.o");

    for _generation in 0..2 {
        let main_o = graph.node_id("main.o");
        let app = graph.node_id("app");
        let mut edge = Edge::new(
            link.clone(),
            Scope::root(),
            EdgeIns {
                ids: vec![main_o],
                explicit: 1,
                implicit: 0,
            },
            EdgeOuts {
                ids: vec![app],
                explicit: 1,
            },
        );
        edge.pool = Some(Rc::new(Pool::new("link_pool", 2)));
        let id = graph.add_edge(edge)?;

        let pool = graph.edge(id).pool.as_ref().unwrap();
        assert_eq!((pool.name.as_str(), pool.depth), ("link_pool", 2));
        assert_eq!(graph.node(app).producer, Some(id));

        graph.clear();
        assert_eq!(graph.get_node_id("app"), None);
        assert_eq!(graph.edge_ids().count(), 0);
    }
    Ok(())
}
