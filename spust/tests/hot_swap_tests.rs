//! Replacing real HTTP servers on a real port.

#![cfg(unix)]

mod common;

use common::{
    CRASHING_ARTIFACT, DEMO_SERVER, demo_artifact, eventually, files_in, free_port, get, manager,
    port_is_free, wrong_port_artifact,
};

use sp_process::{
    ManagerState, PortQuery, ProcessError, SpawnErrorKind, SystemPortQuery, is_process_running,
};

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use googletest::assert_that;
use googletest::prelude::{eq, len, none, not, some};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn given_demo_artifact_when_managed_then_it_serves_requests() {
    // Given
    let work = TempDir::new().unwrap();
    let port = free_port();
    let manager = manager(work.path(), port);

    // When
    manager
        .manage(demo_artifact("hello").as_bytes(), &work.path().join("bundle"))
        .await
        .unwrap();

    // Then
    assert_that!(manager.is_running(), eq(true));
    assert_that!(manager.state(), eq(&ManagerState::Listening { port }));
    assert_that!(get(port).await.unwrap(), eq("hello"));

    manager.close().await.unwrap();
}

#[tokio::test]
async fn given_running_server_when_new_version_managed_then_only_new_process_owns_port() {
    // Given
    let work = TempDir::new().unwrap();
    let bundle = work.path().join("bundle");
    let port = free_port();
    let manager = manager(work.path(), port);
    manager.manage(demo_artifact("v1").as_bytes(), &bundle).await.unwrap();
    let old_pid = manager.current_pid().unwrap();

    // When
    manager.manage(demo_artifact("v2").as_bytes(), &bundle).await.unwrap();

    // Then
    let new_pid = manager.current_pid().unwrap();
    assert_that!(new_pid, not(eq(old_pid)));
    assert_that!(is_process_running(old_pid), eq(false));
    assert_that!(get(port).await.unwrap(), eq("v2"));

    let owners = SystemPortQuery.query_port(port).await;
    assert_that!(owners.tcp, eq(&BTreeSet::from([new_pid])));

    manager.close().await.unwrap();
}

#[tokio::test]
async fn given_running_server_when_crashing_artifact_managed_then_previous_version_keeps_serving() {
    // Given
    let work = TempDir::new().unwrap();
    let bundle = work.path().join("bundle");
    let port = free_port();
    let manager = manager(work.path(), port);
    manager.manage(demo_artifact("good").as_bytes(), &bundle).await.unwrap();

    // When
    let result = manager.manage(CRASHING_ARTIFACT.as_bytes(), &bundle).await;

    // Then
    assert!(result.is_ok());
    assert_that!(manager.is_running(), eq(true));
    assert_that!(get(port).await.unwrap(), eq("good"));

    let errors = manager.last_spawn_errors();
    assert_that!(errors, len(eq(1)));
    assert_that!(errors[0].kind(), eq(SpawnErrorKind::CrashNonZero));
    assert_that!(errors[0].exit_code(), some(eq(2)));
    assert!(errors[0].stderr().contains("boom"));

    manager.close().await.unwrap();
}

#[tokio::test]
async fn given_artifact_binding_wrong_port_when_managed_then_protocol_violation() {
    // Given
    let work = TempDir::new().unwrap();
    let port = free_port();
    let wrong = free_port();
    let manager = manager(work.path(), port);

    // When
    let result = manager
        .manage(
            wrong_port_artifact(wrong).as_bytes(),
            &work.path().join("bundle"),
        )
        .await;

    // Then
    let Err(ProcessError::Spawn(error)) = result else {
        panic!("expected a spawn error");
    };
    assert_that!(error.kind(), eq(SpawnErrorKind::ProtocolViolation));
    assert!(error.to_string().contains(&format!("port {wrong} and not {port}")));
    assert_that!(manager.is_running(), eq(false));
    assert!(eventually(Duration::from_secs(5), || async move { port_is_free(wrong) }).await);
}

#[tokio::test]
async fn given_foreign_listener_on_port_when_managed_then_port_conflict_is_reported_quickly() {
    // Given
    let work = TempDir::new().unwrap();
    let squatter = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = squatter.local_addr().unwrap().port();
    let manager = manager(work.path(), port);

    // When
    let started = Instant::now();
    let result = manager
        .manage(demo_artifact("late").as_bytes(), &work.path().join("bundle"))
        .await;

    // Then
    let Err(ProcessError::Spawn(error)) = result else {
        panic!("expected a spawn error");
    };
    assert_that!(error.kind(), eq(SpawnErrorKind::PortConflict));
    assert_that!(error.conflicting_pid(), some(eq(std::process::id())));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_that!(manager.current_pid(), none());
}

#[tokio::test]
async fn given_several_cycles_when_closed_then_no_artifact_is_left_behind() {
    // Given
    let work = TempDir::new().unwrap();
    let bundle = work.path().join("bundle");
    let port = free_port();
    let manager = manager(work.path(), port);

    // When
    for version in ["one", "two", "three"] {
        manager.manage(demo_artifact(version).as_bytes(), &bundle).await.unwrap();
        assert_that!(files_in(&bundle), len(eq(1)));
    }
    manager.manage(CRASHING_ARTIFACT.as_bytes(), &bundle).await.unwrap();
    assert_that!(files_in(&bundle), len(eq(1)));

    manager.close().await.unwrap();

    // Then
    assert_that!(files_in(&bundle), len(eq(0)));
    assert_that!(port_is_free(port), eq(true));
}

#[tokio::test]
async fn given_open_connection_when_closed_then_connection_is_dropped() {
    // Given
    let work = TempDir::new().unwrap();
    let port = free_port();
    let manager = manager(work.path(), port);
    manager
        .manage(demo_artifact("idle").as_bytes(), &work.path().join("bundle"))
        .await
        .unwrap();

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    // Half a request keeps the connection busy
    stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

    // When
    manager.close().await.unwrap();

    // Then
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await;
    assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))));
    assert_that!(port_is_free(port), eq(true));
}

#[tokio::test]
async fn given_closed_manager_when_closed_again_then_ok() {
    // Given
    let work = TempDir::new().unwrap();
    let port = free_port();
    let manager = manager(work.path(), port);
    manager
        .manage(demo_artifact("bye").as_bytes(), &work.path().join("bundle"))
        .await
        .unwrap();
    manager.close().await.unwrap();

    // When
    let again = manager.close().await;

    // Then
    assert!(again.is_ok());
    assert_that!(manager.state(), eq(&ManagerState::Closed));
    assert_that!(manager.is_running(), eq(false));
}

#[tokio::test]
async fn given_serving_demo_server_when_terminated_then_exits_successfully() {
    // Given
    let port = free_port();
    let mut child = tokio::process::Command::new(DEMO_SERVER)
        .env("PORT", port.to_string())
        .env_remove("SPUST_HANDSHAKE_ADDR")
        .env_remove("SPUST_DEMO_BIND_PORT")
        .env_remove("HOST")
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap();
    assert!(eventually(Duration::from_secs(5), || async move { get(port).await.is_ok() }).await);

    // When
    let pid = child.id().unwrap().to_string();
    let killed = std::process::Command::new("kill")
        .args(["-TERM", &pid])
        .status()
        .unwrap();
    let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .unwrap()
        .unwrap();

    // Then
    assert!(killed.success());
    assert_that!(status.code(), some(eq(0)));
    assert!(port_is_free(port));
}
