//! Discovery server and client talking over a real loopback connection.

use std::time::Duration;

use federation_core::{decode_any, PushRequest, TypeUrl};
use federation_integration_tests::{exported, TestMesh, TestPeer, RECONNECT, WAIT};
use federation_proto::discovery::aggregated_discovery_service_client::AggregatedDiscoveryServiceClient;
use federation_proto::discovery::{DiscoveryRequest, DiscoveryResponse};
use federation_proto::fds::ExportedService;
use federation_server::PushOutcome;
use federation_store::Service;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Streaming;

fn request(type_url: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        type_url: type_url.to_string(),
        ..Default::default()
    }
}

async fn open_stream(mesh: &TestMesh) -> (mpsc::Sender<DiscoveryRequest>, Streaming<DiscoveryResponse>) {
    let mut client = AggregatedDiscoveryServiceClient::connect(format!("http://{}", mesh.addr))
        .await
        .unwrap();
    let (tx, rx) = mpsc::channel(8);
    let responses = client
        .stream_aggregated_resources(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();
    (tx, responses)
}

async fn next_response(responses: &mut Streaming<DiscoveryResponse>) -> DiscoveryResponse {
    tokio::time::timeout(WAIT, responses.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn peer_imports_exported_services() {
    let mesh = TestMesh::start("west").await;
    mesh.catalog.upsert(Service::new("a", "ns1").with_label("app", "a"));
    mesh.catalog.upsert(exported("b", "ns1"));

    let mut peer = TestPeer::connect("west", mesh.addr);
    peer.wait_for_imports("west", &["ns1/b"]).await;

    let imported = peer.imports.get("west");
    assert_eq!(imported[0].ports.len(), 1);
    assert_eq!(imported[0].ports[0].name, "http");
    assert_eq!(imported[0].ports[0].number, 80);
    assert_eq!(imported[0].ports[0].protocol, "HTTP");
    assert_eq!(imported[0].labels.get("export").map(String::as_str), Some("true"));

    let mut regenerated = Vec::new();
    for _ in 0..3 {
        let request = tokio::time::timeout(WAIT, peer.mesh.recv()).await.unwrap().unwrap();
        regenerated.push(request.type_url.into_inner());
    }
    assert_eq!(
        regenerated,
        vec![
            TypeUrl::SERVICE_ENTRY,
            TypeUrl::WORKLOAD_ENTRY,
            TypeUrl::DESTINATION_RULE,
        ]
    );

    peer.disconnect().await;
    mesh.stop().await.unwrap();
}

#[tokio::test]
async fn pushes_reach_every_peer() {
    let mesh = TestMesh::start("west").await;
    mesh.catalog.upsert(exported("b", "ns1"));

    let first = TestPeer::connect("west", mesh.addr);
    let second = TestPeer::connect("west", mesh.addr);
    first.wait_for_imports("west", &["ns1/b"]).await;
    second.wait_for_imports("west", &["ns1/b"]).await;
    mesh.wait_for_subscribers(2).await;

    mesh.catalog.upsert(exported("c", "ns2"));
    mesh.catalog.remove("ns1", "b");
    mesh.push_exported_services().await;

    first.wait_for_imports("west", &["ns2/c"]).await;
    second.wait_for_imports("west", &["ns2/c"]).await;

    first.disconnect().await;
    mesh.wait_for_subscribers(1).await;
    second.disconnect().await;
    mesh.wait_for_subscribers(0).await;
    mesh.stop().await.unwrap();
}

#[tokio::test]
async fn snapshot_response_shape() {
    let mesh = TestMesh::start("west").await;
    mesh.catalog.upsert(exported("b", "ns1"));
    let (requests, mut responses) = open_stream(&mesh).await;

    // No generator: the request is ignored and the next one is answered.
    requests.send(request(TypeUrl::GATEWAY)).await.unwrap();
    requests.send(request(TypeUrl::EXPORTED_SERVICE)).await.unwrap();

    let response = next_response(&mut responses).await;
    assert_eq!(response.type_url, TypeUrl::EXPORTED_SERVICE);
    assert!(!response.version_info.is_empty());
    assert!(response.version_info.parse::<u64>().is_ok());
    assert!(!response.nonce.is_empty());
    assert_eq!(
        response.control_plane.as_ref().map(|c| c.identifier.as_str()),
        Some("federation-controller-west")
    );
    assert_eq!(response.resources.len(), 1);
    assert_eq!(response.resources[0].type_url, TypeUrl::EXPORTED_SERVICE);
    let service: ExportedService = decode_any(&response.resources[0]).unwrap();
    assert_eq!((service.name.as_str(), service.namespace.as_str()), ("b", "ns1"));

    drop(requests);
    mesh.stop().await.unwrap();
}

#[tokio::test]
async fn acks_are_not_answered() {
    let mesh = TestMesh::start("west").await;
    let (requests, mut responses) = open_stream(&mesh).await;

    requests.send(request(TypeUrl::EXPORTED_SERVICE)).await.unwrap();
    let response = next_response(&mut responses).await;
    assert!(response.resources.is_empty());

    requests
        .send(DiscoveryRequest {
            version_info: response.version_info.clone(),
            type_url: response.type_url.clone(),
            response_nonce: response.nonce.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(200), responses.message())
            .await
            .is_err(),
        "an ACK must not be answered"
    );

    mesh.catalog.upsert(exported("b", "ns1"));
    mesh.push_exported_services().await;
    let pushed = next_response(&mut responses).await;
    assert_eq!(pushed.resources.len(), 1);
    assert_ne!(pushed.nonce, response.nonce);

    drop(requests);
    mesh.stop().await.unwrap();
}

#[tokio::test]
async fn burst_of_pushes_keeps_a_slow_peer() {
    let mesh = TestMesh::start("west").await;
    for i in 0..5 {
        mesh.catalog.upsert(exported(&format!("svc-{i}"), "ns1"));
    }
    let (requests, mut responses) = open_stream(&mesh).await;
    requests.send(request(TypeUrl::EXPORTED_SERVICE)).await.unwrap();
    next_response(&mut responses).await;
    mesh.wait_for_subscribers(1).await;

    // The peer reads nothing while far more pushes than its buffer arrive.
    for _ in 0..40 {
        let outcome = mesh
            .server
            .push(&PushRequest::regenerate(TypeUrl::EXPORTED_SERVICE));
        let PushOutcome::Broadcast(outcome) = outcome else {
            panic!("expected broadcast, got {outcome:?}");
        };
        assert_eq!(outcome.delivered, 1);
        assert!(outcome.evicted.is_empty());
    }
    assert_eq!(mesh.server.subscribers().len(), 1);

    let mut last = None;
    while let Ok(message) = tokio::time::timeout(Duration::from_millis(300), responses.message()).await {
        last = Some(message.unwrap().unwrap());
    }
    let last = last.expect("pushes after the burst");
    assert_eq!(last.type_url, TypeUrl::EXPORTED_SERVICE);
    assert_eq!(last.resources.len(), 5);
    assert_eq!(mesh.server.subscribers().len(), 1);

    drop(requests);
    mesh.stop().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_open_streams() {
    let mesh = TestMesh::start("west").await;
    let (requests, mut responses) = open_stream(&mesh).await;
    requests.send(request(TypeUrl::EXPORTED_SERVICE)).await.unwrap();
    next_response(&mut responses).await;
    mesh.wait_for_subscribers(1).await;

    let server = mesh.server.clone();
    mesh.stop().await.unwrap();
    assert!(server.subscribers().is_empty());

    let end = tokio::time::timeout(WAIT, responses.message()).await.unwrap();
    assert!(!matches!(end, Ok(Some(_))), "stream must end after shutdown");
    drop(requests);
}

#[tokio::test]
async fn peer_started_before_server_catches_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = TestPeer::connect("west", addr);

    tokio::time::sleep(RECONNECT * 4).await;
    assert!(peer.imported("west").is_empty());

    let mesh = TestMesh::start_on("west", listener).await;
    mesh.catalog.upsert(exported("b", "ns1"));
    mesh.wait_for_subscribers(1).await;
    mesh.push_exported_services().await;
    peer.wait_for_imports("west", &["ns1/b"]).await;

    peer.disconnect().await;
    mesh.stop().await.unwrap();
}
