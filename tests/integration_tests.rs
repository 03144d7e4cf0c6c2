//! Integration tests for the PocketShell session core.
//!
//! Every test drives a [`SessionOrchestrator`] against the in-memory server
//! from `common`; no sockets are opened.
//!
//! # Test Organization
//!
//! - `connection_flow` - connect, authenticate, I/O, remote close
//! - `teardown` - disconnect and explicit reconnect
//! - `reconnect` - bounded automatic reconnect
//! - `geometry` - window-change debouncing
//! - `background` - keep-alive while suspended

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use pocketshell_lib::config::{AuthDescriptor, ConnectionProfile, KeyMaterial, MemorySecretStore, Settings};
use pocketshell_lib::session::{ConnectionState, ErrorCategory, SessionError, TerminalEvent, WriteError};
use pocketshell_lib::ssh::AuthStrategy;

// ============================================================================
// Connection Flow
// ============================================================================

mod connection_flow {
    use super::*;

    #[tokio::test]
    async fn test_happy_path() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        let mut states = orch.subscribe_state();

        orch.connect(alice_profile()).await.unwrap();

        assert_eq!(
            drain_states(&mut states),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Connected,
            ]
        );

        orch.send("ls\n").flushed().await.unwrap();

        let shell = server.last_shell();
        assert_eq!(shell.written_bytes(), vec![b"ls\n".to_vec()]);
        assert_eq!(shell.term, "xterm-256color");
        assert_eq!(shell.size, (80, 24));
        assert_eq!(
            server.auth_log.lock().as_slice(),
            &[("alice".to_string(), "password")]
        );
    }

    #[tokio::test]
    async fn test_key_fallback_to_password() {
        let server = FakeServer::new().with_account("bob", AuthStrategy::password("secret"));
        let secrets = MemorySecretStore::new().with_password("bob", "secret");
        let orch = orchestrator(&server, secrets, Settings::default());

        let profile = ConnectionProfile::ssh("10.0.0.5", 22, AuthDescriptor::ssh_key("K", "bob"));
        orch.connect(profile).await.unwrap();

        assert_eq!(orch.state(), ConnectionState::Connected);
        assert_eq!(
            server.auth_log.lock().as_slice(),
            &[("bob".to_string(), "password")]
        );
    }

    #[tokio::test]
    async fn test_stored_key_is_preferred() {
        let server =
            FakeServer::new().with_account("bob", AuthStrategy::public_key(TEST_KEY, None));
        let secrets = MemorySecretStore::new()
            .with_key("K", KeyMaterial::new(TEST_KEY, None))
            .with_password("bob", "secret");
        let orch = orchestrator(&server, secrets, Settings::default());

        let profile = ConnectionProfile::ssh("10.0.0.5", 22, AuthDescriptor::ssh_key("K", "bob"));
        orch.connect(profile).await.unwrap();

        assert_eq!(
            server.auth_log.lock().as_slice(),
            &[("bob".to_string(), "publickey")]
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_never_reach_the_server() {
        let server = alice_server();
        let orch = orchestrator(&server, MemorySecretStore::new(), Settings::default());
        let mut states = orch.subscribe_state();
        let mut reports = orch.subscribe_reports();

        let err = orch.connect(alice_profile()).await.unwrap_err();

        assert!(matches!(err, SessionError::Config(_)));
        assert_eq!(server.handshake_count(), 0);
        assert!(drain_states(&mut states).is_empty());
        assert_eq!(reports.try_recv().unwrap().category, ErrorCategory::Config);
    }

    #[tokio::test]
    async fn test_rejected_password_moves_to_error() {
        let server = FakeServer::new().with_account("alice", AuthStrategy::password("other"));
        let orch = orchestrator(&server, alice_secrets(), no_auto_reconnect());
        let mut states = orch.subscribe_state();

        let err = orch.connect(alice_profile()).await.unwrap_err();

        assert!(matches!(err, SessionError::Transport(_)));
        let seen = drain_states(&mut states);
        assert!(matches!(seen.last(), Some(ConnectionState::Error(_))));
        assert!(!seen.contains(&ConnectionState::Connected));
    }

    #[tokio::test]
    async fn test_inbound_data_and_reset_are_ordered() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        let mut events = orch.take_events().unwrap();
        orch.connect(alice_profile()).await.unwrap();
        let shell = server.last_shell();

        shell.emit(b"hello");
        assert_eq!(
            events.recv().await,
            Some(TerminalEvent::Data("hello".into()))
        );

        orch.clear_output();
        shell.emit(b"world");
        assert_eq!(events.recv().await, Some(TerminalEvent::Reset));
        assert_eq!(
            events.recv().await,
            Some(TerminalEvent::Data("world".into()))
        );
        assert_eq!(orch.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_remote_close_disconnects_without_retry() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        let mut states = orch.subscribe_state();

        let shell = server.last_shell();
        shell.hang_up();

        let seen = wait_for_state(&mut states, |s| *s == ConnectionState::Disconnected).await;
        assert_eq!(seen, vec![ConnectionState::Disconnected]);
        assert!(shell.is_closed());

        settle().await;
        assert_eq!(server.handshake_count(), 1);
        assert_eq!(
            orch.send("ls\n").flushed().await,
            Err(WriteError::NotConnected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_reconnects_automatically() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        let mut states = orch.subscribe_state();

        server.last_shell().drop_link();

        let seen = wait_for_state(&mut states, |s| *s == ConnectionState::Connected).await;
        assert!(matches!(seen[0], ConnectionState::Error(_)));
        assert_eq!(
            &seen[1..],
            &[
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Connected,
            ]
        );
        assert_eq!(server.handshake_count(), 2);
        assert_eq!(orch.reconnect_attempts(), 0);

        // Nothing queued for the dead session leaks into the new one
        assert!(server.last_shell().written_bytes().is_empty());
    }
}

// ============================================================================
// Teardown
// ============================================================================

mod teardown {
    use super::*;

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        let mut states = orch.subscribe_state();

        orch.disconnect().await;
        orch.disconnect().await;

        assert_eq!(drain_states(&mut states), vec![ConnectionState::Disconnected]);
        assert_eq!(orch.state(), ConnectionState::Disconnected);
        assert!(server.last_shell().is_closed());
    }

    #[tokio::test]
    async fn test_disconnect_without_session() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        let mut states = orch.subscribe_state();

        orch.disconnect().await;

        assert!(drain_states(&mut states).is_empty());
        assert_eq!(orch.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_writes_after_disconnect_are_rejected() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        orch.disconnect().await;

        assert_eq!(
            orch.send_control_sequence(b"\x03").flushed().await,
            Err(WriteError::NotConnected)
        );
        assert!(server.last_shell().written_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_reconnect_replaces_session() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        let mut states = orch.subscribe_state();

        orch.reconnect().await.unwrap();

        assert_eq!(
            drain_states(&mut states),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Connected,
            ]
        );
        let shells = server.shells();
        assert_eq!(shells.len(), 2);
        assert!(shells[0].is_closed());
        assert!(!shells[1].is_closed());

        orch.send_raw(&b"pwd\n"[..]).flushed().await.unwrap();
        assert_eq!(shells[1].written_bytes(), vec![b"pwd\n".to_vec()]);
        assert!(shells[0].written_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_connect_replaces_live_session() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        let mut states = orch.subscribe_state();

        orch.connect(alice_profile()).await.unwrap();

        assert_eq!(
            drain_states(&mut states),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Connected,
            ]
        );
        assert!(server.shells()[0].is_closed());
    }

    #[tokio::test]
    async fn test_reconnect_during_stalled_connect() {
        let server = alice_server();
        server.stall_handshakes(1);
        let orch = Arc::new(orchestrator(&server, alice_secrets(), no_auto_reconnect()));
        let mut states = orch.subscribe_state();

        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.connect(alice_profile()).await }
        });
        wait_for_state(&mut states, |s| *s == ConnectionState::Connecting).await;

        orch.reconnect().await.unwrap();

        assert!(matches!(first.await.unwrap(), Err(SessionError::Cancelled)));
        assert_eq!(orch.state(), ConnectionState::Connected);
        assert_eq!(
            drain_states(&mut states),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Connected,
            ]
        );
        assert_eq!(server.handshake_count(), 2);
        assert_eq!(server.shells().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_connect_leaves_no_pending_state() {
        let server = alice_server();
        server.stall_handshakes(1);
        let orch = Arc::new(orchestrator(&server, alice_secrets(), no_auto_reconnect()));
        let mut states = orch.subscribe_state();

        let attempt = tokio::spawn({
            let orch = orch.clone();
            async move { orch.connect(alice_profile()).await }
        });
        wait_for_state(&mut states, |s| *s == ConnectionState::Connecting).await;

        attempt.abort();
        assert!(attempt.await.unwrap_err().is_cancelled());
        assert_eq!(orch.state(), ConnectionState::Disconnected);

        orch.connect(alice_profile()).await.unwrap();
        assert_eq!(orch.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_disconnect_during_stalled_connect() {
        let server = alice_server();
        server.stall_handshakes(1);
        let orch = Arc::new(orchestrator(&server, alice_secrets(), no_auto_reconnect()));
        let mut states = orch.subscribe_state();

        let attempt = tokio::spawn({
            let orch = orch.clone();
            async move { orch.connect(alice_profile()).await }
        });
        wait_for_state(&mut states, |s| *s == ConnectionState::Connecting).await;

        orch.disconnect().await;

        assert!(matches!(attempt.await.unwrap(), Err(SessionError::Cancelled)));
        assert_eq!(orch.state(), ConnectionState::Disconnected);
        assert_eq!(drain_states(&mut states), vec![ConnectionState::Disconnected]);
    }
}

// ============================================================================
// Automatic Reconnect
// ============================================================================

mod reconnect {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_is_bounded() {
        let server = alice_server();
        server.refuse_connections(true);
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        let mut reports = orch.subscribe_reports();

        let err = orch.connect(alice_profile()).await.unwrap_err();
        assert!(err.is_retryable());

        tokio::time::sleep(Duration::from_secs(30)).await;

        // Initial attempt plus three retries
        assert_eq!(server.handshake_count(), 4);
        assert!(matches!(orch.state(), ConnectionState::Error(_)));

        let mut gave_up = false;
        while let Ok(report) = reports.try_recv() {
            if report.category == ErrorCategory::Lifecycle {
                gave_up = true;
            }
        }
        assert!(gave_up);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(server.handshake_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_and_resets_counter() {
        let server = alice_server();
        server.refuse_connections(true);
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        let mut states = orch.subscribe_state();

        assert!(orch.connect(alice_profile()).await.is_err());
        server.refuse_connections(false);

        wait_for_state(&mut states, |s| *s == ConnectionState::Connected).await;
        assert_eq!(server.handshake_count(), 2);
        assert_eq!(orch.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let server = alice_server();
        server.refuse_connections(true);
        let orch = orchestrator(&server, alice_secrets(), Settings::default());

        assert!(orch.connect(alice_profile()).await.is_err());
        orch.disconnect().await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(server.handshake_count(), 1);
        assert_eq!(orch.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_reconnect_disabled() {
        let server = alice_server();
        server.refuse_connections(true);
        let orch = orchestrator(&server, alice_secrets(), no_auto_reconnect());

        assert!(orch.connect(alice_profile()).await.is_err());
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(server.handshake_count(), 1);
        assert!(matches!(orch.state(), ConnectionState::Error(_)));
    }
}

// ============================================================================
// Geometry
// ============================================================================

mod geometry {
    use super::*;

    #[tokio::test]
    async fn test_resize_is_debounced() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        let shell = server.last_shell();

        orch.resize(80, 24).await;
        orch.resize(80, 24).await;
        assert_eq!(shell.window_changes.lock().as_slice(), &[(80, 24)]);

        orch.resize(100, 24).await;
        assert_eq!(shell.window_changes.lock().as_slice(), &[(80, 24), (100, 24)]);

        orch.resize(0, 24).await;
        assert_eq!(shell.window_changes.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_size_reported_before_connect_is_used_for_pty() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());

        orch.resize(132, 43).await;
        orch.connect(alice_profile()).await.unwrap();

        let shell = server.last_shell();
        assert_eq!(shell.size, (132, 43));
        assert!(shell.window_changes.lock().is_empty());
    }
}

// ============================================================================
// Background Keep-Alive
// ============================================================================

mod background {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_while_backgrounded() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        let shell = server.last_shell();

        orch.on_background();
        settle().await;
        assert!(shell.written_bytes().is_empty());

        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(shell.written_bytes(), vec![vec![0u8]]);

        orch.on_foreground();
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(shell.written_bytes(), vec![vec![0u8]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_interleaves_with_input_in_order() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());
        orch.connect(alice_profile()).await.unwrap();
        let shell = server.last_shell();

        orch.on_background();
        settle().await;
        orch.send("a").flushed().await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        orch.send("b").flushed().await.unwrap();
        orch.on_foreground();

        assert_eq!(
            shell.written_bytes(),
            vec![b"a".to_vec(), vec![0u8], b"b".to_vec()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_starts_once_connected_in_background() {
        let server = alice_server();
        let orch = orchestrator(&server, alice_secrets(), Settings::default());

        orch.on_background();
        orch.connect(alice_profile()).await.unwrap();
        let shell = server.last_shell();

        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(shell.written_bytes(), vec![vec![0u8]]);

        orch.on_foreground();
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(shell.written_bytes(), vec![vec![0u8]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_keepalive_interval_uses_default() {
        let server = alice_server();
        let settings = Settings {
            keepalive_interval_secs: 0,
            ..Settings::default()
        };
        let orch = orchestrator(&server, alice_secrets(), settings);
        orch.connect(alice_profile()).await.unwrap();
        let shell = server.last_shell();

        orch.on_background();
        settle().await;
        assert!(shell.written_bytes().is_empty());

        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(shell.written_bytes(), vec![vec![0u8]]);
        orch.on_foreground();
    }
}
