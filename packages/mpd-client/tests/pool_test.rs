//! Integration tests for the MPD connection pool
//!
//! Every test runs the pool against a fake daemon listening on localhost.

use std::time::Duration;

use assert_matches::assert_matches;
use reveille_mpd_client::{
    Command, CommandError, ConnectionError, ConnectionState, MpdPool, PoolStatus,
};
use reveille_shared_config::MpdConfig;
use reveille_test_utils::MockMpdServer;

fn config(mpd: &MockMpdServer) -> MpdConfig {
    MpdConfig::with_address(mpd.host(), mpd.port())
}

#[tokio::test]
async fn test_acquire_opens_ready_connection() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd));

    let connection = pool.acquire().await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Ready);
    assert_eq!(connection.server_version(), reveille_test_utils::MOCK_MPD_VERSION);
    assert_eq!(
        pool.status(),
        PoolStatus {
            size: 1,
            idle: 0,
            in_use: 1,
            connecting: 0,
            max_size: 10,
        }
    );
}

#[tokio::test]
async fn test_released_connection_is_reused() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd));

    let first = pool.acquire().await.unwrap();
    let first_id = first.id();
    pool.release(first);
    assert_eq!(pool.status().idle, 1);

    let second = pool.acquire().await.unwrap();
    assert_eq!(second.id(), first_id);
    assert_eq!(mpd.connections_opened(), 1);
}

#[tokio::test]
async fn test_in_use_connection_is_never_shared() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd));

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(pool.status().in_use, 2);
    assert_eq!(mpd.connections_opened(), 2);
}

#[tokio::test]
async fn test_acquire_waits_when_pool_is_full() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd).with_max_size(1));

    let held = pool.acquire().await.unwrap();
    let held_id = held.id();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|c| c.id()) })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert_eq!(pool.status().size, 1);

    drop(held);
    let reused = waiter.await.unwrap().unwrap();
    assert_eq!(reused, held_id);
    assert_eq!(mpd.connections_opened(), 1);
}

#[tokio::test]
async fn test_dead_idle_connection_is_replaced() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd));

    let connection = pool.acquire().await.unwrap();
    let first_id = connection.id();
    let mut state = connection.subscribe_state();
    pool.release(connection);

    mpd.disconnect_all();
    state
        .wait_for(|s| *s == ConnectionState::Dead)
        .await
        .unwrap();

    let fresh = pool.acquire().await.unwrap();
    assert_ne!(fresh.id(), first_id);
    assert_eq!(fresh.state(), ConnectionState::Ready);
    assert_eq!(mpd.connections_opened(), 2);
    assert_eq!(pool.status().size, 1);
}

#[tokio::test]
async fn test_connection_dying_in_use_is_not_pooled() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd));

    let connection = pool.acquire().await.unwrap();
    let mut state = connection.subscribe_state();
    mpd.disconnect_all();
    state
        .wait_for(|s| *s == ConnectionState::Dead)
        .await
        .unwrap();

    assert!(connection.is_dead());
    pool.release(connection);
    assert_eq!(pool.status().size, 0);
    assert_eq!(pool.status().idle, 0);
}

#[tokio::test]
async fn test_handshake_rejection_fails_acquire() {
    let mpd = MockMpdServer::start().await;
    mpd.reject_handshakes(true);
    let pool = MpdPool::new(config(&mpd));

    let err = pool.acquire().await.unwrap_err();
    assert_matches!(err, ConnectionError::Handshake { .. });
    assert_eq!(pool.status().size, 0);
}

#[tokio::test]
async fn test_connect_failure_surfaces_without_retry() {
    let mpd = MockMpdServer::start().await;
    let config = config(&mpd);
    drop(mpd);
    // Give the listener time to shut down.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let pool = MpdPool::new(config);
    let err = pool.acquire().await.unwrap_err();
    assert_matches!(err, ConnectionError::Connect { .. });
    assert_eq!(pool.status().size, 0);
}

#[tokio::test]
async fn test_idle_connections_are_recycled() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(
        config(&mpd)
            .with_idle_recycle_interval(Duration::from_millis(30))
            .with_reap_interval(Duration::from_millis(10)),
    );

    let connection = pool.acquire().await.unwrap();
    pool.release(connection);
    assert_eq!(pool.status().idle, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(pool.status().size, 0);

    pool.acquire().await.unwrap();
    assert_eq!(mpd.connections_opened(), 2);
}

#[tokio::test]
async fn test_recycle_idle_keeps_fresh_connections() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd));

    let connection = pool.acquire().await.unwrap();
    pool.release(connection);

    assert_eq!(pool.recycle_idle(), 0);
    assert_eq!(pool.status().idle, 1);
}

#[tokio::test]
async fn test_command_list_runs_in_order() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd));

    let mut connection = pool.acquire().await.unwrap();
    connection
        .send_commands(&[
            Command::clear(),
            Command::setvol(100),
            Command::add("http://bbc.example/stream"),
            Command::play(),
        ])
        .await
        .unwrap();

    assert_eq!(
        mpd.commands(),
        vec![
            "clear",
            "setvol:100",
            "add:http://bbc.example/stream",
            "play"
        ]
    );
}

#[tokio::test]
async fn test_daemon_error_keeps_connection_reusable() {
    let mpd = MockMpdServer::start().await;
    mpd.fail_command("play", "No such song");
    let pool = MpdPool::new(config(&mpd));

    let mut connection = pool.acquire().await.unwrap();
    let err = connection
        .send_commands(&[Command::clear(), Command::play()])
        .await
        .unwrap_err();
    assert_matches!(err, CommandError::Ack { list_index: 1, .. });
    assert_eq!(err.to_string(), "No such song");
    assert!(connection.is_reusable());

    pool.release(connection);
    assert_eq!(pool.status().idle, 1);
}

#[tokio::test]
async fn test_status_reports_player_state() {
    let mpd = MockMpdServer::start().await;
    mpd.set_state("play");
    let pool = MpdPool::new(config(&mpd));

    let mut connection = pool.acquire().await.unwrap();
    let status = connection.status().await.unwrap();
    assert!(status.is_playing());
    assert_eq!(status.volume(), Some(100));
}

#[tokio::test]
async fn test_cancelled_acquire_frees_its_slot() {
    // A daemon that accepts but never greets.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _silent = tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            sockets.push(socket);
        }
    });

    let pool = MpdPool::new(MpdConfig::with_address("127.0.0.1", port).with_max_size(1));
    let attempt = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(attempt.is_err());

    assert_eq!(pool.status().size, 0);
    assert_eq!(pool.status().connecting, 0);
}

#[tokio::test]
async fn test_abandoned_command_is_not_pooled() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    // Greets every client, then never answers a command.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let _mute = {
        let accepted = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                socket.write_all(b"OK MPD 0.23.5\n").await.unwrap();
                accepted.fetch_add(1, Ordering::SeqCst);
                sockets.push(socket);
            }
        })
    };

    let pool = MpdPool::new(MpdConfig::with_address("127.0.0.1", port));
    let mut connection = pool.acquire().await.unwrap();
    let first = connection.id();

    let reply = tokio::time::timeout(
        Duration::from_millis(50),
        connection.send_command(&Command::status()),
    )
    .await;
    assert!(reply.is_err());
    assert!(!connection.is_reusable());

    drop(connection);
    assert_eq!(pool.status().idle, 0);
    assert_eq!(pool.status().size, 0);

    let next = pool.acquire().await.unwrap();
    assert_ne!(next.id(), first);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_argument_with_line_break_is_never_sent() {
    let mpd = MockMpdServer::start().await;
    let pool = MpdPool::new(config(&mpd));

    let mut connection = pool.acquire().await.unwrap();
    let err = connection
        .send_commands(&[Command::clear(), Command::add("http://a\nstop\nadd b")])
        .await
        .unwrap_err();
    assert_matches!(err, CommandError::InvalidArgument { ref command } if command == "add");
    assert!(connection.is_reusable());
    drop(connection);

    assert!(mpd.commands().is_empty());
    assert_eq!(pool.status().idle, 1);
}
