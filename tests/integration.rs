//! End-to-end integration tests: real coordinator and storage nodes over
//! real TCP sockets, driven through the protocol client.

use minidfs::client::{self, CoordinatorClient, StorageClient};
use minidfs::common::{CoordinatorConfig, StorageConfig};
use minidfs::{Coordinator, StorageServer};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn start_coordinator(dir: &Path, replicas: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = CoordinatorConfig {
        bind_addr: addr,
        metadata_path: dir.join("metadata.json"),
        replication_factor: replicas,
        liveness_timeout_secs: 30,
    };
    tokio::spawn(Coordinator::new(config).run(listener));
    addr
}

/// `heartbeat_secs` 0 disables the node's own reporter so tests can
/// register nodes deterministically through the client.
async fn start_node(
    dir: &Path,
    coordinator: SocketAddr,
    idx: usize,
    heartbeat_secs: u64,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = StorageConfig {
        bind_addr: addr,
        advertise_host: "127.0.0.1".to_string(),
        advertise_port: addr.port(),
        storage_dir: dir.join(format!("node-{}", idx)),
        coordinator_addr: coordinator.to_string(),
        heartbeat_interval_secs: heartbeat_secs,
        max_chunk_size: 64 * 1024 * 1024,
    };
    tokio::spawn(StorageServer::new(config).run(listener));
    addr
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31) % 251) as u8).collect()
}

#[tokio::test]
async fn test_multi_chunk_round_trip_with_replication() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 2).await;
    let node_a = start_node(dir.path(), coord_addr, 0, 0).await;
    let node_b = start_node(dir.path(), coord_addr, 1, 0).await;

    let coordinator = CoordinatorClient::new(coord_addr.to_string());
    let storage = StorageClient::new();
    coordinator.heartbeat("127.0.0.1", node_a.port()).await.unwrap();
    coordinator.heartbeat("127.0.0.1", node_b.port()).await.unwrap();

    // 10_000 bytes at 1 KiB chunks: 10 chunks, the last one short.
    let data = pattern(10_000);
    let src = dir.path().join("src.bin");
    std::fs::write(&src, &data).unwrap();

    let uploaded =
        client::upload_file(&coordinator, &storage, "round-trip.bin", &src, 1024)
            .await
            .unwrap();
    assert_eq!(uploaded, 10_000);

    // Placements come back in byte-offset order.
    let chunks = coordinator.placements("round-trip.bin").await.unwrap();
    assert_eq!(chunks.len(), 10);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_id, format!("round-trip.bin_chunk_{}", i));
        assert_eq!(chunk.datanodes.len(), 2);
    }

    // Replication was enacted: every node listed for a chunk serves it.
    for (i, chunk) in chunks.iter().enumerate() {
        let expected = &data[i * 1024..(10_000).min((i + 1) * 1024)];
        for node in &chunk.datanodes {
            let got = storage.fetch_chunk(node, &chunk.chunk_id).await.unwrap();
            assert_eq!(got, expected, "chunk {} on {}", i, node);
        }
    }

    // Reassembly is byte-for-byte.
    let dest = dir.path().join("dest.bin");
    let downloaded =
        client::download_file(&coordinator, &storage, "round-trip.bin", &dest)
            .await
            .unwrap();
    assert_eq!(downloaded, 10_000);
    assert_eq!(std::fs::read(&dest).unwrap(), data);
}

#[tokio::test]
async fn test_concrete_abc_scenario() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 2).await;
    let node_a = start_node(dir.path(), coord_addr, 0, 0).await;
    let node_b = start_node(dir.path(), coord_addr, 1, 0).await;

    let coordinator = CoordinatorClient::new(coord_addr.to_string());
    let storage = StorageClient::new();
    coordinator.heartbeat("127.0.0.1", node_a.port()).await.unwrap();
    coordinator.heartbeat("127.0.0.1", node_b.port()).await.unwrap();

    // One placement for "abc_chunk_0" with nodes [A, B].
    let allocations = coordinator.allocate_upload("abc", 3, 1).await.unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].chunk_id, "abc_chunk_0");
    assert_eq!(allocations[0].datanodes.len(), 2);
    assert_eq!(allocations[0].datanodes[0].port, node_a.port());
    assert_eq!(allocations[0].datanodes[1].port, node_b.port());

    // Push "abc" to A, confirm, and the download placement matches.
    storage
        .store_chunk(&allocations[0].datanodes[0], "abc_chunk_0", b"abc")
        .await
        .unwrap();
    coordinator.confirm_upload("abc", 3).await.unwrap();

    let chunks = coordinator.placements("abc").await.unwrap();
    assert_eq!(chunks, allocations);

    let got = storage
        .fetch_chunk(&chunks[0].datanodes[0], "abc_chunk_0")
        .await
        .unwrap();
    assert_eq!(got, b"abc");
}

#[tokio::test]
async fn test_upload_with_too_few_nodes_leaves_no_record() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 2).await;
    let node_a = start_node(dir.path(), coord_addr, 0, 0).await;

    let coordinator = CoordinatorClient::new(coord_addr.to_string());
    coordinator.heartbeat("127.0.0.1", node_a.port()).await.unwrap();

    let err = coordinator.allocate_upload("lonely", 3, 1).await.unwrap_err();
    assert!(err.to_string().contains("Insufficient live nodes"));

    // No record was created: a later download reports "not found".
    let err = coordinator.placements("lonely").await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_duplicate_heartbeats_do_not_duplicate_the_pool() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 2).await;
    let node_a = start_node(dir.path(), coord_addr, 0, 0).await;
    let node_b = start_node(dir.path(), coord_addr, 1, 0).await;

    let coordinator = CoordinatorClient::new(coord_addr.to_string());
    coordinator.heartbeat("127.0.0.1", node_a.port()).await.unwrap();
    coordinator.heartbeat("127.0.0.1", node_a.port()).await.unwrap();
    coordinator.heartbeat("127.0.0.1", node_b.port()).await.unwrap();

    let allocations = coordinator.allocate_upload("dedup", 1, 1).await.unwrap();
    let nodes = &allocations[0].datanodes;
    assert_eq!(nodes.len(), 2);
    assert_ne!(nodes[0], nodes[1]);
}

#[tokio::test]
async fn test_retrieve_unknown_chunk_is_a_clean_miss() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 1).await;
    let node = start_node(dir.path(), coord_addr, 0, 0).await;

    let storage = StorageClient::new();
    let err = storage
        .fetch_chunk(
            &minidfs::common::NodeAddress::new("127.0.0.1", node.port()),
            "never_stored_chunk_0",
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_store_then_retrieve_edge_sizes() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 1).await;
    let node_addr = start_node(dir.path(), coord_addr, 0, 0).await;
    let node = minidfs::common::NodeAddress::new("127.0.0.1", node_addr.port());

    let storage = StorageClient::new();

    // 0-byte chunk.
    storage.store_chunk(&node, "edge_chunk_0", b"").await.unwrap();
    assert_eq!(
        storage.fetch_chunk(&node, "edge_chunk_0").await.unwrap(),
        b""
    );

    // Larger than the internal copy buffer.
    let big = pattern(200 * 1024);
    storage.store_chunk(&node, "edge_chunk_1", &big).await.unwrap();
    assert_eq!(
        storage.fetch_chunk(&node, "edge_chunk_1").await.unwrap(),
        big
    );
}

#[tokio::test]
async fn test_unconfirmed_upload_is_not_downloadable() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 1).await;
    let node = start_node(dir.path(), coord_addr, 0, 0).await;

    let coordinator = CoordinatorClient::new(coord_addr.to_string());
    coordinator.heartbeat("127.0.0.1", node.port()).await.unwrap();

    coordinator.allocate_upload("half-done", 5, 1).await.unwrap();

    let err = coordinator.placements("half-done").await.unwrap_err();
    assert!(err.to_string().contains("not complete"));

    coordinator.confirm_upload("half-done", 5).await.unwrap();
    assert_eq!(coordinator.placements("half-done").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_metadata_survives_coordinator_restart() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 1).await;
    let node = start_node(dir.path(), coord_addr, 0, 0).await;

    let coordinator = CoordinatorClient::new(coord_addr.to_string());
    let storage = StorageClient::new();
    coordinator.heartbeat("127.0.0.1", node.port()).await.unwrap();

    let data = pattern(500);
    let src = dir.path().join("persist.bin");
    std::fs::write(&src, &data).unwrap();
    client::upload_file(&coordinator, &storage, "persist.bin", &src, 256)
        .await
        .unwrap();

    // A second coordinator over the same snapshot serves the same
    // placements and the chunks are still fetchable.
    let coord2_addr = start_coordinator(dir.path(), 1).await;
    let coordinator2 = CoordinatorClient::new(coord2_addr.to_string());

    let chunks = coordinator2.placements("persist.bin").await.unwrap();
    assert_eq!(chunks, coordinator.placements("persist.bin").await.unwrap());

    let dest = dir.path().join("persist-out.bin");
    client::download_file(&coordinator2, &storage, "persist.bin", &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), data);
}

#[tokio::test]
async fn test_reporter_registers_nodes_organically() {
    let dir = TempDir::new().unwrap();
    let coord_addr = start_coordinator(dir.path(), 2).await;
    // Fast heartbeats; no manual registration in this test.
    start_node(dir.path(), coord_addr, 0, 1).await;
    start_node(dir.path(), coord_addr, 1, 1).await;

    let coordinator = CoordinatorClient::new(coord_addr.to_string());
    let data = pattern(64);
    let src = dir.path().join("organic.bin");
    std::fs::write(&src, &data).unwrap();

    // Both reporters fire on startup; poll until allocation succeeds.
    let storage = StorageClient::new();
    let mut uploaded = false;
    for _ in 0..50 {
        match client::upload_file(&coordinator, &storage, "organic.bin", &src, 64).await {
            Ok(_) => {
                uploaded = true;
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
    assert!(uploaded, "nodes never registered via their own reporters");

    let dest = dir.path().join("organic-out.bin");
    client::download_file(&coordinator, &storage, "organic.bin", &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), data);
}
