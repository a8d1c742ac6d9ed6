//! Integration tests for the control channel.
//!
//! Validates the JSON-line protocol end to end over a real named socket:
//! command acknowledgement, in-order buffered delivery, inline status
//! replies, and client behavior against a dead channel.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use procwarden::ipc::channel::ControlChannel;
use procwarden::ipc::{client, CommandToken};
use procwarden::supervisor::{StatusHandle, StatusSnapshot};
use uuid::Uuid;

fn unique_name() -> String {
    format!("pw-chan-{}", Uuid::new_v4().simple())
}

fn status_handle() -> StatusHandle {
    Arc::new(RwLock::new(StatusSnapshot::default()))
}

#[tokio::test]
async fn command_round_trip() {
    let name = unique_name();
    let (channel, mut commands) =
        ControlChannel::create(&name, status_handle()).expect("create channel");

    let ack = client::send_command(&name, CommandToken::Reload)
        .await
        .expect("send reload");
    assert_eq!(ack["accepted"], "reload");

    let received = commands.recv().await.expect("queued command");
    assert_eq!(received, CommandToken::Reload);

    channel.close();
}

#[tokio::test]
async fn commands_buffer_until_read_and_keep_order() {
    let name = unique_name();
    let (channel, mut commands) =
        ControlChannel::create(&name, status_handle()).expect("create channel");

    // Nobody is blocked in recv() yet — both sends must still be delivered,
    // in send order.
    client::send_command(&name, CommandToken::Reload)
        .await
        .expect("send reload");
    client::send_command(&name, CommandToken::Stop)
        .await
        .expect("send stop");

    assert_eq!(commands.recv().await, Some(CommandToken::Reload));
    assert_eq!(commands.recv().await, Some(CommandToken::Stop));

    channel.close();
}

#[tokio::test]
async fn status_is_answered_inline() {
    let name = unique_name();
    let status = status_handle();
    {
        let mut snapshot = status.write().expect("write snapshot");
        snapshot.state = "running".into();
        snapshot.session_id = Some("abc".into());
        snapshot.worker_pid = Some(42);
    }

    let (channel, mut commands) = ControlChannel::create(&name, status).expect("create channel");

    let data = client::query_status(&name).await.expect("query status");
    assert_eq!(data["state"], "running");
    assert_eq!(data["session_id"], "abc");
    assert_eq!(data["worker_pid"], 42);

    // The query must not have entered the command queue.
    let queued = tokio::time::timeout(Duration::from_millis(100), commands.recv()).await;
    assert!(queued.is_err(), "status must not be queued as a command");

    channel.close();
}

#[tokio::test]
async fn dead_channel_reports_transport_error() {
    let name = unique_name();
    assert!(client::send_command(&name, CommandToken::Stop).await.is_err());
    assert!(client::send_token(&name, CommandToken::Stop).await.is_err());
}

#[tokio::test]
async fn closed_channel_releases_its_name() {
    let name = unique_name();
    let (channel, _commands) =
        ControlChannel::create(&name, status_handle()).expect("create channel");
    channel.close();

    // The accept task shuts down asynchronously; the name must become
    // bindable again shortly after.
    let mut rebound = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if let Ok((second, _rx)) = ControlChannel::create(&name, status_handle()) {
            second.close();
            rebound = true;
            break;
        }
    }
    assert!(rebound, "socket name was not released after close");
}
