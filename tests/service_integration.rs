//! Cross-component integration tests
//!
//! These tests drive the template service end to end against the in-memory
//! metadata store, flow engine, event bus and flow cache, verifying the
//! registration lifecycle, downstream propagation and topology resolution
//! together rather than module by module.

use std::collections::HashSet;
use std::sync::Arc;

use pipeline_template_service::config::FlowEngineSettings;
use pipeline_template_service::domain::template::{
    RegisteredTemplate, ReusableTemplateConnectionInfo, TemplateState,
};
use pipeline_template_service::events::{BroadcastEventBus, ChangeType};
use pipeline_template_service::flow::{
    Connectable, ConnectableKind, Connection, FlowSnippet, FlowTemplate, InMemoryFlowCache,
    InMemoryFlowEngine, Port, PortKind, ProcessGroup, ProcessorDto,
};
use pipeline_template_service::metadata::InMemoryMetadataStore;
use pipeline_template_service::security::{
    AccessController, AllowAllAccessController, MembershipAction, Principal,
    RoleMembershipChange, TemplateAction,
};
use pipeline_template_service::TemplateService;

struct TestEnvironment {
    service: TemplateService,
    metadata: Arc<InMemoryMetadataStore>,
    access: Arc<AllowAllAccessController>,
    events: Arc<BroadcastEventBus>,
    flow_engine: Arc<InMemoryFlowEngine>,
    flow_cache: Arc<InMemoryFlowCache>,
}

/// Create a full test environment with all components
fn create_full_test_environment(access: Arc<AllowAllAccessController>) -> TestEnvironment {
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let events = Arc::new(BroadcastEventBus::new(32));
    let flow_engine = Arc::new(InMemoryFlowEngine::new());
    let flow_cache = Arc::new(InMemoryFlowCache::new());

    let service = TemplateService::new(
        metadata.clone(),
        access.clone() as Arc<dyn AccessController>,
        events.clone(),
        flow_engine.clone(),
        flow_cache.clone(),
        FlowEngineSettings::default(),
    );

    TestEnvironment {
        service,
        metadata,
        access,
        events,
        flow_engine,
        flow_cache,
    }
}

fn default_environment() -> TestEnvironment {
    create_full_test_environment(Arc::new(AllowAllAccessController::new()))
}

fn processor(id: &str, group_id: &str, name: &str) -> ProcessorDto {
    ProcessorDto {
        id: id.to_string(),
        group_id: group_id.to_string(),
        name: name.to_string(),
        processor_type: "processors.standard.GetFile".to_string(),
    }
}

fn processor_connection(source_id: &str, destination_id: &str) -> Connection {
    Connection {
        id: format!("{source_id}->{destination_id}"),
        source: Connectable {
            id: source_id.to_string(),
            group_id: "g1".to_string(),
            name: source_id.to_string(),
            kind: ConnectableKind::Processor,
        },
        destination: Connectable {
            id: destination_id.to_string(),
            group_id: "g1".to_string(),
            name: destination_id.to_string(),
            kind: ConnectableKind::Processor,
        },
    }
}

/// Flow template "ingest" whose entry point is the fetch processor.
fn seed_ingest_flow_template(env: &TestEnvironment) {
    env.flow_engine.add_template(FlowTemplate {
        id: "ft-ingest".to_string(),
        name: "ingest".to_string(),
        snippet: FlowSnippet {
            processors: vec![
                processor("p-fetch", "g1", "Fetch Files"),
                processor("p-clean", "g1", "Clean Records"),
            ],
            connections: vec![processor_connection("p-fetch", "p-clean")],
            ..Default::default()
        },
    });
}

/// Reusable-templates group with one input port feeding an indexing flow.
fn seed_reusable_group(env: &TestEnvironment) {
    let index_port = Port {
        id: "port-index".to_string(),
        group_id: "rg".to_string(),
        name: "to-index".to_string(),
        kind: PortKind::Input,
    };
    env.flow_engine.add_process_group(ProcessGroup {
        id: "rg".to_string(),
        parent_group_id: "root".to_string(),
        name: "reusable_templates".to_string(),
        contents: Some(FlowSnippet {
            input_ports: vec![index_port.clone()],
            connections: vec![Connection {
                id: "port->index".to_string(),
                source: Connectable::from_port(&index_port),
                destination: Connectable {
                    id: "g-index-in".to_string(),
                    group_id: "g-index".to_string(),
                    name: "in".to_string(),
                    kind: ConnectableKind::InputPort,
                },
            }],
            ..Default::default()
        }),
    });
    env.flow_engine.add_process_group(ProcessGroup {
        id: "g-index".to_string(),
        parent_group_id: "rg".to_string(),
        name: "index-flow".to_string(),
        contents: Some(FlowSnippet {
            processors: vec![processor("p-index", "g-index", "Index Records")],
            ..Default::default()
        }),
    });
}

#[tokio::test]
async fn test_registration_lifecycle() {
    let env = default_environment();
    seed_ingest_flow_template(&env);
    let principal = Principal::new("dana");
    let mut rx = env.events.subscribe();

    // create
    let created = env
        .service
        .register_template(&principal, RegisteredTemplate::named("ingest"))
        .await
        .unwrap()
        .expect("registration should save");
    let id = created.id.clone().unwrap();

    assert_eq!(created.flow_template_id.as_deref(), Some("ft-ingest"));
    assert_eq!(created.input_processors.len(), 1);
    assert_eq!(created.input_processors[0].id, "p-fetch");
    assert_eq!(created.state, TemplateState::Enabled);
    assert_eq!(env.metadata.template_count(), 1);
    assert!(env.flow_cache.get(&id).is_some());

    let event = rx.recv().await.unwrap();
    assert_eq!(event.change.change_type, ChangeType::Created);
    assert_eq!(event.change.template_id, id);
    assert_eq!(event.principal.as_ref().map(|p| p.name.as_str()), Some("dana"));

    // update
    let mut update = created.clone();
    update.description = Some("ingest pipeline".to_string());
    let updated = env
        .service
        .register_template(&principal, update)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.id.as_deref(), Some(id.as_str()));
    assert!(updated.updated);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.change.change_type, ChangeType::Updated);

    // disable, enable, delete
    let disabled = env
        .service
        .disable_template(&principal, &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(disabled.state, TemplateState::Disabled);

    let enabled = env
        .service
        .enable_template(&principal, &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enabled.state, TemplateState::Enabled);

    assert!(env
        .service
        .delete_registered_template(&principal, &id)
        .await
        .unwrap());
    assert_eq!(env.metadata.template_count(), 0);
}

#[tokio::test]
async fn test_duplicate_name_with_foreign_id_is_rejected() {
    let env = default_environment();
    let principal = Principal::new("dana");

    let existing = env
        .service
        .register_template(&principal, RegisteredTemplate::named("ingest"))
        .await
        .unwrap()
        .unwrap();

    let mut intruder = RegisteredTemplate::named("ingest");
    intruder.id = Some("forged-id".to_string());
    let rejected = env
        .service
        .register_template(&principal, intruder)
        .await
        .unwrap();
    assert!(rejected.is_none());

    let stored = env
        .service
        .get_registered_template_by_name(&principal, "ingest")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, existing.id);
    assert_eq!(env.metadata.template_count(), 1);
}

#[tokio::test]
async fn test_template_ordering_with_new_placeholder() {
    let env = default_environment();
    let principal = Principal::new("dana");

    let first = env
        .service
        .register_template(&principal, RegisteredTemplate::named("alpha"))
        .await
        .unwrap()
        .unwrap();
    let second = env
        .service
        .register_template(&principal, RegisteredTemplate::named("beta"))
        .await
        .unwrap()
        .unwrap();

    // the client submits a new template ordered between the two
    let mut incoming = RegisteredTemplate::named("gamma");
    incoming.order = Some(1);
    incoming.template_order = vec![
        second.id.clone().unwrap(),
        "NEW".to_string(),
        first.id.clone().unwrap(),
    ];
    env.service
        .register_template(&principal, incoming)
        .await
        .unwrap()
        .unwrap();

    let listed = env
        .service
        .get_registered_templates(&principal)
        .await
        .unwrap();
    let names: Vec<&str> = listed.iter().map(|t| t.template_name.as_str()).collect();
    assert_eq!(names, vec!["beta", "gamma", "alpha"]);
}

#[tokio::test]
async fn test_reorder_skips_placeholder_and_excluded() {
    let env = default_environment();
    let principal = Principal::new("dana");

    let a = env
        .service
        .register_template(&principal, RegisteredTemplate::named("alpha"))
        .await
        .unwrap()
        .unwrap();
    let b = env
        .service
        .register_template(&principal, RegisteredTemplate::named("beta"))
        .await
        .unwrap()
        .unwrap();

    let order = vec![
        "NEW".to_string(),
        a.id.clone().unwrap(),
        b.id.clone().unwrap(),
    ];
    let exclude = HashSet::from([b.id.clone().unwrap()]);
    env.service
        .order_templates(&principal, &order, &exclude)
        .await
        .unwrap();

    let alpha = env
        .service
        .get_registered_template(&principal, a.id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    let beta = env
        .service
        .get_registered_template(&principal, b.id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alpha.order, Some(1));
    assert_eq!(beta.order, None);
}

#[tokio::test]
async fn test_feed_propagation_on_stream_and_interval_changes() {
    let env = default_environment();
    let principal = Principal::new("dana");

    let mut template = RegisteredTemplate::named("ingest");
    template.feed_names.insert("orders".to_string());
    template.feed_names.insert("returns".to_string());
    template.batch_job_interval_seconds = Some(300);
    let saved = env
        .service
        .register_template(&principal, template)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(env.metadata.streaming_flag("orders"), Some(false));
    assert_eq!(env.metadata.batch_job_interval("returns"), Some(300));

    let mut streaming = saved.clone();
    streaming.is_stream = true;
    env.service
        .register_template(&principal, streaming)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(env.metadata.streaming_flag("orders"), Some(true));
    assert_eq!(env.metadata.streaming_flag("returns"), Some(true));
}

#[tokio::test]
async fn test_unchanged_stream_flag_causes_no_feed_writes() {
    let env = default_environment();
    let principal = Principal::new("dana");

    // alpha and beta share the "orders" feed
    let mut alpha = RegisteredTemplate::named("alpha");
    alpha.feed_names.insert("orders".to_string());
    let alpha = env
        .service
        .register_template(&principal, alpha)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(env.metadata.streaming_flag("orders"), Some(false));

    let mut beta = RegisteredTemplate::named("beta");
    beta.feed_names.insert("orders".to_string());
    beta.is_stream = true;
    env.service
        .register_template(&principal, beta)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(env.metadata.streaming_flag("orders"), Some(true));

    // a description-only update of alpha must not rewrite the shared flag
    // back to alpha's unchanged stream setting
    let mut relabeled = alpha.clone();
    relabeled.description = Some("alpha pipeline".to_string());
    let saved = env
        .service
        .register_template(&principal, relabeled)
        .await
        .unwrap()
        .unwrap();
    assert!(saved.updated);
    assert_eq!(env.metadata.streaming_flag("orders"), Some(true));
}

#[tokio::test]
async fn test_role_memberships_applied_only_under_entity_access_control() {
    let controlled = create_full_test_environment(Arc::new(
        AllowAllAccessController::with_entity_access_control(),
    ));
    let uncontrolled = default_environment();
    let principal = Principal::new("dana");

    let change = RoleMembershipChange {
        role: "editor".to_string(),
        action: MembershipAction::Add,
        users: vec!["sam".to_string()],
        groups: vec![],
    };

    for env in [&controlled, &uncontrolled] {
        let mut template = RegisteredTemplate::named("ingest");
        template.role_membership_changes.push(change.clone());
        template
            .allowed_actions
            .insert(TemplateAction::ChangePermissions);
        env.service
            .register_template(&principal, template)
            .await
            .unwrap()
            .unwrap();
    }

    let recorded = controlled.access.recorded_membership_changes();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].1.role, "editor");
    assert!(uncontrolled.access.recorded_membership_changes().is_empty());
}

#[tokio::test]
async fn test_listing_repairs_flow_template_ids() {
    let env = default_environment();
    let principal = Principal::new("dana");

    // the flow template shows up only after registration
    env.service
        .register_template(&principal, RegisteredTemplate::named("ingest"))
        .await
        .unwrap()
        .unwrap();
    seed_ingest_flow_template(&env);

    let listed = env
        .service
        .get_registered_templates(&principal)
        .await
        .unwrap();
    assert_eq!(listed[0].flow_template_id.as_deref(), Some("ft-ingest"));

    // the repaired id is durable: a service-level read sees it too
    let stored = env
        .service
        .get_registered_template_for_flow_properties(
            &Principal::service(),
            "ft-ingest",
            "ingest",
        )
        .await
        .unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn test_template_processors_with_reusable_flow() {
    let env = default_environment();
    seed_ingest_flow_template(&env);
    seed_reusable_group(&env);
    let principal = Principal::new("dana");

    let mut template = RegisteredTemplate::named("ingest");
    template
        .reusable_template_connections
        .push(ReusableTemplateConnectionInfo {
            feed_output_port_name: "out".to_string(),
            reusable_template_input_port_name: "to-index".to_string(),
            input_port_display_name: Some("To Index".to_string()),
        });
    let saved = env
        .service
        .register_template(&principal, template)
        .await
        .unwrap()
        .unwrap();
    let id = saved.id.as_deref().unwrap();

    let own_only = env
        .service
        .get_registered_template_processors(&principal, id, false)
        .await
        .unwrap();
    let own_ids: Vec<&str> = own_only.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(own_ids, vec!["p-fetch"]);

    let with_reusable = env
        .service
        .get_registered_template_processors(&principal, id, true)
        .await
        .unwrap();
    let mut all_ids: Vec<&str> = with_reusable.iter().map(|p| p.id.as_str()).collect();
    all_ids.sort_unstable();
    assert_eq!(all_ids, vec!["p-fetch", "p-index"]);
}

#[tokio::test]
async fn test_flow_template_processors_resolve_synthesized_graph() {
    let env = default_environment();
    seed_reusable_group(&env);
    env.flow_engine.add_template(FlowTemplate {
        id: "ft-feed".to_string(),
        name: "feed".to_string(),
        snippet: FlowSnippet {
            processors: vec![processor("p-out", "g1", "Emit")],
            output_ports: vec![Port {
                id: "out-1".to_string(),
                group_id: "g1".to_string(),
                name: "to-reusable".to_string(),
                kind: PortKind::Output,
            }],
            connections: vec![Connection {
                id: "c1".to_string(),
                source: Connectable {
                    id: "p-out".to_string(),
                    group_id: "g1".to_string(),
                    name: "Emit".to_string(),
                    kind: ConnectableKind::Processor,
                },
                destination: Connectable {
                    id: "out-1".to_string(),
                    group_id: "g1".to_string(),
                    name: "to-reusable".to_string(),
                    kind: ConnectableKind::OutputPort,
                },
            }],
            ..Default::default()
        },
    });

    let infos = vec![ReusableTemplateConnectionInfo {
        feed_output_port_name: "to-reusable".to_string(),
        reusable_template_input_port_name: "to-index".to_string(),
        input_port_display_name: None,
    }];
    let processors = env
        .service
        .flow_template_processors("ft-feed", &infos)
        .await
        .unwrap();

    assert_eq!(processors.len(), 1);
    assert_eq!(processors[0].flow_id, "ft-feed::p-out");
    assert!(!processors[0].is_leaf);
}
