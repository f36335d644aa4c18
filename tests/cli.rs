use assert_cmd::Command;
use ckv::{OutputConfig, ReplicaAddr, ReplicaConfig, ReplicaIdentity, ReplicaServer, Scheme};
use predicates::str::{contains, is_empty};
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn start_replica(dir: &TempDir) -> ReplicaAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = ReplicaAddr::from(listener.local_addr().unwrap());
    let config = ReplicaConfig::new(
        ReplicaIdentity::new("replica_0", addr.clone()),
        Scheme::None,
        vec![addr.clone()],
    )
    .with_output(OutputConfig::new(dir.path(), "kvstore.txt"));
    let server = ReplicaServer::with_listener(config, listener).await.unwrap();
    tokio::spawn(server.run());
    addr
}

fn client(addr: &ReplicaAddr) -> Command {
    let mut cmd = Command::cargo_bin("ckv-client").unwrap();
    cmd.args(["--addr", &addr.to_string()]);
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn client_set_get_rm() {
    let dir = TempDir::new().unwrap();
    let addr = start_replica(&dir).await;

    tokio::task::spawn_blocking(move || {
        client(&addr)
            .args(["set", "key1", "value1"])
            .assert()
            .success()
            .stdout(contains("Key-value pair added"));
        client(&addr)
            .args(["get", "key1"])
            .assert()
            .success()
            .stdout("value1\n");
        client(&addr).args(["rm", "key1"]).assert().success();
        client(&addr)
            .args(["rm", "key1"])
            .assert()
            .failure()
            .stdout(is_empty())
            .stderr(contains("Key does not exist"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn client_plays_its_own_lines() {
    let dir = TempDir::new().unwrap();
    let addr = start_replica(&dir).await;
    let script = dir.path().join("commands.txt");
    std::fs::write(
        &script,
        "client_0 replica_0 set a 1\nclient_1 replica_0 set a 2\nclient_0 replica_0 get a\n",
    )
    .unwrap();

    tokio::task::spawn_blocking(move || {
        client(&addr)
            .args(["play", script.to_str().unwrap()])
            .args(["--client-id", "client_0", "--pause-ms", "0"])
            .args(["--base-port", &addr.port.to_string()])
            .assert()
            .success()
            .stdout("replica_0: Key-value pair added\nreplica_0: 1\n");
    })
    .await
    .unwrap();
}

#[test]
fn client_without_server_reports_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = ReplicaAddr::from(listener.local_addr().unwrap());
    drop(listener);

    client(&addr)
        .args(["get", "key1"])
        .assert()
        .failure()
        .stderr(contains("Error connecting to"));
}
