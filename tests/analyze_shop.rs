use callflow::analyzer::{AnalysisConfig, CallAnalyzer};
use callflow::index::MemoryIndex;
use callflow::model::{AnalysisDirection, CallGraph, CallNode, NodeType};
use std::path::PathBuf;

const K: &str = "com.example.kotlin";

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn shop() -> MemoryIndex {
    MemoryIndex::load(&fixture_path("shop.json")).unwrap()
}

fn analyze(index: &MemoryIndex, query: &str, direction: AnalysisDirection, depth: usize) -> CallGraph {
    let config = AnalysisConfig::builder().max_depth(depth).build();
    CallAnalyzer::new(index, config)
        .analyze_query(query, direction)
        .unwrap()
        .unwrap_or_else(|| panic!("no method matches {query}"))
}

fn child<'g>(node: &'g CallNode, id: &str) -> &'g CallNode {
    node.callees
        .iter()
        .chain(node.callers.iter())
        .find(|c| c.id == id)
        .unwrap_or_else(|| panic!("{id} is not a child of {}", node.id))
}

fn walk<'g>(node: &'g CallNode, out: &mut Vec<&'g CallNode>) {
    out.push(node);
    for c in node.callers.iter().chain(node.callees.iter()) {
        walk(c, out);
    }
}

#[test]
fn create_order_reaches_the_whole_order_flow() {
    let index = shop();
    let graph = analyze(&index, "OrderService.createOrder", AnalysisDirection::CalleesOnly, 3);
    assert_eq!(
        graph.root.id,
        format!("{K}.OrderService#createOrder({K}.OrderRequest)")
    );
    assert!(graph.root.callers.is_empty());
    assert!(!graph.truncated);

    let ids = graph.node_ids();
    for expected in [
        format!("{K}.InventoryService#checkAvailability(java.lang.String,int)"),
        format!("{K}.OrderRepositoryImpl#save({K}.Order)"),
        format!("{K}.PaymentProcessor#processPayment(java.lang.String,double)"),
        format!("{K}.KotlinNotificationService#sendOrderConfirmation({K}.Order)"),
    ] {
        assert!(ids.contains(&expected.as_str()), "missing {expected}");
    }
    assert!(
        ids.iter()
            .all(|id| !id.starts_with("java.") && !id.starts_with("kotlin.")),
        "library calls leaked: {ids:?}"
    );
    // the interface declaration itself is replaced by its implementation
    assert!(!ids.contains(&format!("{K}.OrderRepository#save({K}.Order)").as_str()));

    let save = child(&graph.root, &format!("{K}.OrderRepositoryImpl#save({K}.Order)"));
    assert_eq!(save.via.as_deref(), Some(format!("{K}.OrderRepository#save({K}.Order)").as_str()));
    let entry = graph.method(&save.id).unwrap();
    assert_eq!(entry.node_type, NodeType::Repository);
    assert_eq!(entry.class_name, "OrderRepositoryImpl");
}

#[test]
fn primary_gateway_wins_and_depth_bounds_the_tree() {
    let index = shop();
    let graph = analyze(&index, "OrderService.createOrder", AnalysisDirection::CalleesOnly, 3);
    let process = child(
        &graph.root,
        &format!("{K}.PaymentProcessor#processPayment(java.lang.String,double)"),
    );
    let ids: Vec<&str> = process.callees.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            format!("{K}.TransactionLogger#logStart(java.lang.String,double)"),
            format!("{K}.StripePaymentGateway#charge(java.lang.String,double)"),
            format!("{K}.TransactionLogger#logSuccess(java.lang.String,java.lang.String)"),
        ]
    );
    // depth 3 nodes are leaves
    let log_start = &process.callees[0];
    assert_eq!(log_start.callees.len(), 1);
    assert!(log_start.callees[0].callees.is_empty());
    assert!(!log_start.callees[0].is_cyclic_ref);
}

#[test]
fn events_and_library_calls_become_edges_and_external_leaves() {
    let index = shop();
    let graph = analyze(&index, "OrderService.createOrder", AnalysisDirection::CalleesOnly, 3);
    let publish = child(
        &graph.root,
        "org.springframework.context.ApplicationEventPublisher#publishEvent(java.lang.Object)",
    );
    assert!(publish.callees.is_empty());
    assert_eq!(graph.method(&publish.id).unwrap().node_type, NodeType::External);

    let listener = child(
        &graph.root,
        &format!("{K}.OrderEventListener#onOrderCreated({K}.OrderCreatedEvent)"),
    );
    assert_eq!(listener.via.as_deref(), Some(format!("{K}.OrderCreatedEvent").as_str()));
    let audit = child(listener, &format!("{K}.AuditService#record({K}.AuditEvent)"));
    let logger = child(audit, "org.slf4j.Logger#info(java.lang.String)");
    assert_eq!(graph.method(&logger.id).unwrap().node_type, NodeType::External);

    let root = graph.root_method().unwrap();
    assert!(root.metadata.is_transactional);
    assert_eq!(
        root.metadata.event_class.as_deref(),
        Some(format!("{K}.OrderCreatedEvent").as_str())
    );
}

#[test]
fn payment_flow_cycle_is_cut() {
    let index = shop();
    let graph = analyze(
        &index,
        "PaymentController.processPayment",
        AnalysisDirection::CalleesOnly,
        6,
    );
    let controller = graph.root_method().unwrap();
    assert_eq!(controller.node_type, NodeType::Controller);
    assert_eq!(controller.metadata.http_method.as_deref(), Some("POST"));
    assert_eq!(controller.metadata.http_path.as_deref(), Some("/api/payments/process"));

    let service_id = "com.example.PaymentService#processPayment(com.example.PaymentRequest)";
    let service = child(&graph.root, service_id);
    let validate = child(service, "com.example.PaymentValidator#validate(com.example.PaymentRequest)");
    let reconcile = child(validate, "com.example.PaymentService#reconcile(java.lang.String)");
    let back = child(reconcile, service_id);
    assert!(back.is_cyclic_ref);
    assert!(back.callees.is_empty());

    // no implementation: the abstract repository call stays a leaf
    let save = child(service, "com.example.PaymentRepository#save(com.example.Payment)");
    assert!(save.callees.is_empty());
    assert_eq!(graph.method(&save.id).unwrap().node_type, NodeType::Repository);

    let notify = child(
        service,
        "com.example.EmailNotificationService#notifyPaymentProcessed(com.example.Payment)",
    );
    assert!(graph.method(&notify.id).unwrap().metadata.is_async);

    let mut nodes = Vec::new();
    walk(&graph.root, &mut nodes);
    let expanded: Vec<&&CallNode> = nodes
        .iter()
        .filter(|n| n.id == service_id && !n.callees.is_empty())
        .collect();
    assert_eq!(expanded.len(), 1);
}

#[test]
fn callers_cross_interfaces_and_events() {
    let index = shop();
    let graph = analyze(
        &index,
        &format!("{K}.OrderRepositoryImpl#save({K}.Order)"),
        AnalysisDirection::CallersOnly,
        3,
    );
    let create = child(&graph.root, &format!("{K}.OrderService#createOrder({K}.OrderRequest)"));
    assert_eq!(create.via.as_deref(), Some(format!("{K}.OrderRepository#save({K}.Order)").as_str()));
    child(create, &format!("{K}.OrderController#create({K}.OrderRequest)"));

    let graph = analyze(
        &index,
        "OrderEventListener.onOrderCreated",
        AnalysisDirection::CallersOnly,
        2,
    );
    let publisher = child(&graph.root, &format!("{K}.OrderService#createOrder({K}.OrderRequest)"));
    assert_eq!(publisher.via.as_deref(), Some(format!("{K}.OrderCreatedEvent").as_str()));
}

#[test]
fn interface_method_root_still_has_callers() {
    let index = shop();
    let save = format!("{K}.OrderRepository#save({K}.Order)");
    let graph = analyze(&index, &save, AnalysisDirection::CallersOnly, 5);
    assert_eq!(graph.root.id, save);
    let create = child(&graph.root, &format!("{K}.OrderService#createOrder({K}.OrderRequest)"));
    assert!(create.via.is_none());
    child(create, &format!("{K}.OrderController#create({K}.OrderRequest)"));

    // the declaration has no body, so the callee side stays empty
    let graph = analyze(&index, &save, AnalysisDirection::Both, 5);
    assert!(!graph.root.callers.is_empty());
    assert!(graph.root.callees.is_empty());
}

#[test]
fn bidirectional_root_has_both_sides() {
    let index = shop();
    let graph = analyze(&index, "OrderService.createOrder", AnalysisDirection::Both, 2);
    assert_eq!(graph.root.callers.len(), 1);
    assert!(!graph.root.callees.is_empty());
    let mut nodes = Vec::new();
    walk(&graph.root, &mut nodes);
    assert!(
        nodes
            .iter()
            .skip(1)
            .all(|n| n.callers.is_empty() || n.callees.is_empty())
    );
}

#[test]
fn node_ceiling_truncates() {
    let index = shop();
    let config = AnalysisConfig::builder().max_depth(5).max_nodes(4).build();
    let graph = CallAnalyzer::new(&index, config)
        .analyze_query("OrderService.createOrder", AnalysisDirection::CalleesOnly)
        .unwrap()
        .unwrap();
    assert!(graph.truncated);
    assert_eq!(graph.node_ids().len(), 4);
    assert_eq!(graph.methods.len(), 4);
}

#[test]
fn unknown_method_yields_no_graph() {
    let index = shop();
    let result = CallAnalyzer::new(&index, AnalysisConfig::default())
        .analyze_query("NoSuchService.run", AnalysisDirection::Both)
        .unwrap();
    assert!(result.is_none());
}
