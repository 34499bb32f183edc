mod mock;

use maplit::hashmap;
use mock::{fast_timings, MockCloud, RecordingSink};
use orchestrator::tags::ResourceKind;
use orchestrator::{
    CallErrorKind, ClusterKind, ClusterManager, ClusterStatus, CreateRequest, CreationState, Event,
    Leftovers, Orchestrator,
};

async fn connect(api: MockCloud) -> (Orchestrator<MockCloud>, RecordingSink) {
    let sink = RecordingSink::default();
    let orchestrator = Orchestrator::connect(api, Box::new(sink.clone()), fast_timings())
        .await
        .unwrap();
    (orchestrator, sink)
}

fn transitions(sink: &RecordingSink) -> Vec<CreationState> {
    sink.events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Transition { state, .. } => Some(state),
            _ => None,
        })
        .collect()
}

fn created(sink: &RecordingSink, kind: ResourceKind) -> usize {
    sink.events()
        .iter()
        .filter(|event| matches!(event, Event::Created { kind: k, .. } if *k == kind))
        .count()
}

#[tokio::test]
async fn single_node_ends_in_provisioning() {
    let (orchestrator, sink) = connect(MockCloud::new(&["us-west-2a", "us-west-2b"])).await;
    let descriptor = orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::SingleNode))
        .await
        .unwrap();

    assert_eq!(descriptor.status, ClusterStatus::Provisioning);
    assert!(descriptor.endpoint.starts_with("i-"));
    assert_eq!(descriptor.credential_path, "/etc/rancher/k3s/k3s.yaml");
    assert!(descriptor
        .instructions
        .iter()
        .any(|line| line.contains("ssm start-session")));
    assert_eq!(
        transitions(&sink),
        vec![
            CreationState::Start,
            CreationState::NetworkReady,
            CreationState::IdentityReady,
            CreationState::ComputeLaunched,
            CreationState::Provisioning,
        ]
    );

    // Two zones, a public and a private subnet in each, three endpoints.
    assert_eq!(created(&sink, ResourceKind::Subnet), 4);
    assert_eq!(created(&sink, ResourceKind::Endpoint), 3);
    assert_eq!(created(&sink, ResourceKind::Instance), 1);
    assert!(sink.warnings().is_empty());
}

#[tokio::test]
async fn managed_waits_until_active() {
    let api = MockCloud::new(&["us-west-2a", "us-west-2b", "us-west-2c"])
        .with_faults(|faults| faults.cluster_polls_until_active = 3);
    let (orchestrator, sink) = connect(api).await;
    let descriptor = orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::Managed))
        .await
        .unwrap();

    assert_eq!(descriptor.status, ClusterStatus::Active);
    assert_eq!(descriptor.endpoint, "https://demo.eks.example.com");
    assert_eq!(descriptor.credential_path, "~/.kube/config-demo");
    assert_eq!(
        transitions(&sink),
        vec![
            CreationState::Start,
            CreationState::NetworkReady,
            CreationState::IdentityReady,
            CreationState::ComputeLaunched,
            CreationState::WaitActive,
            CreationState::Active,
        ]
    );
    // Managed clusters use at most two zones and need no endpoints.
    assert_eq!(created(&sink, ResourceKind::Subnet), 4);
    assert_eq!(created(&sink, ResourceKind::Endpoint), 0);
}

#[tokio::test]
async fn managed_cluster_failure_is_fatal() {
    let api = MockCloud::new(&["us-west-2a", "us-west-2b"])
        .with_faults(|faults| faults.cluster_fails = true);
    let (orchestrator, _) = connect(api).await;
    let error = orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::Managed))
        .await
        .unwrap_err();
    assert_eq!(error.leftovers(), Leftovers::Remaining);
    assert!(error.to_string().contains("FAILED"));
}

#[tokio::test]
async fn throttled_status_reads_keep_the_wait_going() {
    let api = MockCloud::new(&["us-west-2a", "us-west-2b"]).with_faults(|faults| {
        faults.cluster_polls_until_active = 1;
        faults.throttled_cluster_reads = 3;
    });
    let (orchestrator, _) = connect(api).await;
    let descriptor = orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::Managed))
        .await
        .unwrap();
    assert_eq!(descriptor.status, ClusterStatus::Active);
    let state = orchestrator.api().state.lock().unwrap();
    assert_eq!(state.clusters["demo"].polls, 2);
}

#[tokio::test]
async fn single_zone_fails_before_creating_anything() {
    let (orchestrator, _) = connect(MockCloud::new(&["us-west-2a"])).await;
    let error = orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::Managed))
        .await
        .unwrap_err();

    assert_eq!(error.leftovers(), Leftovers::None);
    assert!(error.to_string().contains(
        "insufficient availability zones: region 'us-west-2' has 1 available, 2 required"
    ));
    assert!(orchestrator.api().position("create").is_none());
    assert!(orchestrator.api().owned_resources("demo").is_empty());
}

#[tokio::test]
async fn single_zone_is_enough_for_one_node() {
    let (orchestrator, sink) = connect(MockCloud::new(&["us-west-2a"])).await;
    orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::SingleNode))
        .await
        .unwrap();
    assert_eq!(created(&sink, ResourceKind::Subnet), 2);
}

#[tokio::test]
async fn invalid_name_is_rejected_up_front() {
    let (orchestrator, _) = connect(MockCloud::new(&["us-west-2a"])).await;
    let error = orchestrator
        .create_cluster(&CreateRequest::new("Not_Valid", ClusterKind::SingleNode))
        .await
        .unwrap_err();
    assert_eq!(error.leftovers(), Leftovers::None);
    assert_eq!(orchestrator.api().calls(), vec!["validate credentials"]);
}

#[tokio::test]
async fn launch_retries_while_profile_propagates() {
    let api = MockCloud::new(&["us-west-2a", "us-west-2b"])
        .with_faults(|faults| faults.launch_profile_failures = 2);
    let (orchestrator, sink) = connect(api).await;
    orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::SingleNode))
        .await
        .unwrap();

    assert_eq!(orchestrator.api().launch_calls(), 3);
    let retries = sink
        .events()
        .into_iter()
        .filter(|event| matches!(event, Event::Retrying { .. }))
        .count();
    assert_eq!(retries, 2);
    let state = orchestrator.api().state.lock().unwrap();
    assert_eq!(state.instances.len(), 1);
}

#[tokio::test]
async fn launch_gives_up_after_its_attempts() {
    let api = MockCloud::new(&["us-west-2a", "us-west-2b"])
        .with_faults(|faults| faults.launch_profile_failures = 100);
    let (orchestrator, _) = connect(api).await;
    let error = orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::SingleNode))
        .await
        .unwrap_err();

    assert_eq!(orchestrator.api().launch_calls(), 6);
    assert_eq!(error.leftovers(), Leftovers::Remaining);
    assert!(error.to_string().contains("after 6 attempt(s)"));
    assert!(orchestrator.api().state.lock().unwrap().instances.is_empty());
}

#[tokio::test]
async fn profile_becomes_visible_after_a_few_reads() {
    let api = MockCloud::new(&["us-west-2a"])
        .with_faults(|faults| faults.invisible_profile_reads = 3);
    let (orchestrator, _) = connect(api).await;
    orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::SingleNode))
        .await
        .unwrap();
}

#[tokio::test]
async fn warning_class_failures_do_not_stop_the_create() {
    let api = MockCloud::new(&["us-west-2a"]).with_faults(|faults| {
        faults.failing_calls = hashmap! {
            "create_interface_endpoint" => CallErrorKind::Other,
            "attach_role_policy" => CallErrorKind::Unauthorized,
            "enable_public_addressing" => CallErrorKind::Other,
        };
    });
    let (orchestrator, sink) = connect(api).await;
    let descriptor = orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::SingleNode))
        .await
        .unwrap();

    assert_eq!(descriptor.status, ClusterStatus::Provisioning);
    // Three endpoints, one policy and one public subnet.
    assert_eq!(sink.warnings().len(), 5);
}

#[tokio::test]
async fn dns_failure_is_fatal() {
    let api = MockCloud::new(&["us-west-2a"]).with_faults(|faults| {
        faults
            .failing_calls
            .insert("enable_dns", CallErrorKind::Other);
    });
    let (orchestrator, _) = connect(api).await;
    let error = orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::SingleNode))
        .await
        .unwrap_err();
    assert_eq!(error.leftovers(), Leftovers::Remaining);
    assert!(orchestrator.api().position("create subnet").is_none());
}

#[tokio::test]
async fn rerun_adopts_what_exists() {
    let (orchestrator, sink) = connect(MockCloud::new(&["us-west-2a", "us-west-2b"])).await;
    let request = CreateRequest::new("demo", ClusterKind::SingleNode);
    orchestrator.create_cluster(&request).await.unwrap();
    let first_calls = orchestrator.api().calls().len();
    orchestrator.create_cluster(&request).await.unwrap();

    let state = orchestrator.api().state.lock().unwrap();
    assert_eq!(state.networks.len(), 1);
    assert_eq!(state.roles.len(), 1);
    assert_eq!(state.profiles.len(), 1);
    assert_eq!(
        state.profiles.values().next().unwrap().roles,
        vec!["xstrapolate-demo-node-role".to_string()]
    );
    let subnets = state
        .resources
        .values()
        .filter(|resource| resource.kind == ResourceKind::Subnet)
        .count();
    assert_eq!(subnets, 4);

    let second_run: Vec<_> = state.calls[first_calls..]
        .iter()
        .filter(|call| call.starts_with("create "))
        .cloned()
        .collect();
    assert!(second_run.is_empty(), "second run created {:?}", second_run);
    drop(state);

    let adopted = sink
        .events()
        .into_iter()
        .filter(|event| matches!(event, Event::Adopted { .. }))
        .count();
    // Network, four subnets, gateway, route table, two security groups, three endpoints, role
    // and profile.
    assert_eq!(adopted, 14);
}

#[tokio::test]
async fn clusters_do_not_share_identity() {
    let (orchestrator, _) = connect(MockCloud::new(&["us-west-2a"])).await;
    orchestrator
        .create_cluster(&CreateRequest::new("one", ClusterKind::SingleNode))
        .await
        .unwrap();
    orchestrator
        .create_cluster(&CreateRequest::new("two", ClusterKind::SingleNode))
        .await
        .unwrap();
    let state = orchestrator.api().state.lock().unwrap();
    assert_eq!(state.roles.len(), 2);
    assert_eq!(state.networks.len(), 2);
}

#[tokio::test]
async fn get_finds_created_clusters() {
    let (orchestrator, _) = connect(MockCloud::new(&["us-west-2a", "us-west-2b"])).await;
    assert!(orchestrator.get_cluster("demo").await.unwrap().is_none());

    orchestrator
        .create_cluster(&CreateRequest::new("demo", ClusterKind::Managed))
        .await
        .unwrap();
    orchestrator
        .create_cluster(&CreateRequest::new("node", ClusterKind::SingleNode))
        .await
        .unwrap();

    let managed = orchestrator.get_cluster("demo").await.unwrap().unwrap();
    assert_eq!(managed.kind, ClusterKind::Managed);
    assert_eq!(managed.status, ClusterStatus::Active);

    let node = orchestrator.get_cluster("node").await.unwrap().unwrap();
    assert_eq!(node.kind, ClusterKind::SingleNode);
    assert_eq!(node.status, ClusterStatus::Active);
    assert!(node.endpoint.starts_with("i-"));
}
