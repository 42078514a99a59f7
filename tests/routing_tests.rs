//! Routing-core functional tests.
//!
//! Exercises the registry, room table, router, and lifecycle coordinator
//! against a recording delivery fake, verifying the envelopes exactly as a
//! connected client would see them.

use std::sync::Arc;

use courier_core::{Delivery, RouterConfig, RoutingCore};
use courier_protocol::{DeliveryStatus, DisconnectCause, OutboundEnvelope, RoutingError};
use parking_lot::Mutex;

/// Records every delivered envelope instead of writing to a socket.
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, OutboundEnvelope)>>,
}

impl RecordingSink {
    fn drain(&self) -> Vec<(String, OutboundEnvelope)> {
        std::mem::take(&mut *self.sent.lock())
    }

    fn sent_to(&self, target: &str) -> Vec<OutboundEnvelope> {
        self.sent
            .lock()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, env)| env.clone())
            .collect()
    }
}

impl Delivery for RecordingSink {
    fn deliver(&self, target: &str, envelope: &OutboundEnvelope) -> Result<(), RoutingError> {
        self.sent
            .lock()
            .push((target.to_string(), envelope.clone()));
        Ok(())
    }
}

/// Fails delivery for one target, records everything else.
struct FlakySink {
    fail_for: String,
    inner: RecordingSink,
}

impl Delivery for FlakySink {
    fn deliver(&self, target: &str, envelope: &OutboundEnvelope) -> Result<(), RoutingError> {
        if target == self.fail_for {
            return Err(RoutingError::DeliveryFailed {
                target: target.to_string(),
            });
        }
        self.inner.deliver(target, envelope)
    }
}

fn core_with_sink() -> (RoutingCore, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let core = RoutingCore::new(sink.clone(), RouterConfig::default());
    (core, sink)
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry contracts
// ─────────────────────────────────────────────────────────────────────────────

mod registry {
    use super::*;
    use courier_core::ConnectionState;

    #[test]
    fn register_then_get() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();

        let snapshot = core.registry.get("a").unwrap();
        assert_eq!(snapshot.id, "a");
        assert_eq!(snapshot.state, ConnectionState::Active);
        assert!(snapshot.rooms.is_empty());
    }

    #[test]
    fn duplicate_register_fails() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();

        let err = core.registry.register("a").unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateConnection { ref id } if id == "a"));
    }

    #[test]
    fn unregister_unknown_fails() {
        let (core, _) = core_with_sink();
        let err = core.registry.unregister("ghost").unwrap_err();
        assert!(matches!(err, RoutingError::UnknownConnection { .. }));
        assert_eq!(err.reason(), "not-connected");
    }

    #[test]
    fn unregister_removes_the_record() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();
        core.registry.unregister("a").unwrap();

        assert!(!core.registry.contains("a"));
        assert!(core.registry.get("a").is_err());
        assert_eq!(core.registry.connection_count(), 0);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Room membership
// ─────────────────────────────────────────────────────────────────────────────

mod rooms {
    use super::*;

    #[test]
    fn join_is_bidirectional() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();

        core.rooms.join("lobby", "a").unwrap();
        assert_eq!(core.rooms.members_of("lobby"), vec!["a".to_string()]);
        assert_eq!(core.rooms.rooms_of("a").unwrap(), vec!["lobby".to_string()]);
    }

    #[test]
    fn leave_removes_both_sides() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();
        core.rooms.join("lobby", "a").unwrap();

        core.rooms.leave("lobby", "a").unwrap();
        assert!(core.rooms.members_of("lobby").is_empty());
        assert!(core.rooms.rooms_of("a").unwrap().is_empty());
    }

    #[test]
    fn join_is_idempotent() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();

        assert!(core.rooms.join("lobby", "a").unwrap());
        assert!(!core.rooms.join("lobby", "a").unwrap());
        assert_eq!(core.rooms.members_of("lobby"), vec!["a".to_string()]);
    }

    #[test]
    fn leave_is_idempotent() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();
        core.rooms.join("lobby", "a").unwrap();

        assert!(core.rooms.leave("lobby", "a").unwrap().is_some());
        // Second leave: success, no state change, nothing to announce.
        assert!(core.rooms.leave("lobby", "a").unwrap().is_none());
        assert!(core.rooms.members_of("lobby").is_empty());
        assert!(core.rooms.rooms_of("a").unwrap().is_empty());
    }

    #[test]
    fn leave_of_nonexistent_room_is_success() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();

        assert!(core.rooms.leave("nowhere", "a").unwrap().is_none());
    }

    #[test]
    fn join_requires_registration() {
        let (core, _) = core_with_sink();
        let err = core.rooms.join("lobby", "ghost").unwrap_err();
        assert!(matches!(err, RoutingError::UnknownConnection { .. }));
        // The failed join must not have created the room.
        assert_eq!(core.rooms.room_count(), 0);
    }

    #[test]
    fn empty_rooms_are_dropped() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();
        core.registry.register("b").unwrap();
        core.rooms.join("lobby", "a").unwrap();
        core.rooms.join("lobby", "b").unwrap();
        assert_eq!(core.rooms.room_count(), 1);

        core.rooms.leave("lobby", "a").unwrap();
        assert_eq!(core.rooms.room_count(), 1);

        core.rooms.leave("lobby", "b").unwrap();
        assert_eq!(core.rooms.room_count(), 0);
        assert!(core.rooms.members_of("lobby").is_empty());
    }

    #[test]
    fn leave_reports_remaining_members() {
        let (core, _) = core_with_sink();
        for id in ["a", "b", "c"] {
            core.registry.register(id).unwrap();
            core.rooms.join("lobby", id).unwrap();
        }

        let remaining = core.rooms.leave("lobby", "a").unwrap().unwrap();
        assert_eq!(sorted(remaining), vec!["b".to_string(), "c".to_string()]);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router dispatch
// ─────────────────────────────────────────────────────────────────────────────

mod router {
    use super::*;

    #[test]
    fn join_acks_the_sender_only() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();

        core.router
            .handle_text("a", r#"{"kind":"join","roomId":"lobby"}"#);

        let sent = sink.drain();
        assert_eq!(sent.len(), 1);
        let (target, env) = &sent[0];
        assert_eq!(target, "a");
        assert_eq!(env.status, DeliveryStatus::Success);
        assert_eq!(env.kind.as_deref(), Some("joined"));
        assert_eq!(env.payload.as_ref().unwrap()["roomId"], "lobby");
    }

    #[test]
    fn join_from_unregistered_sender_fails() {
        let (core, sink) = core_with_sink();

        core.router
            .handle_text("ghost", r#"{"kind":"join","roomId":"lobby"}"#);

        let envs = sink.sent_to("ghost");
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].status, DeliveryStatus::Fail);
        assert_eq!(envs[0].reason.as_deref(), Some("not-connected"));
        assert_eq!(core.rooms.room_count(), 0);
    }

    #[test]
    fn join_without_room_id_fails_and_creates_nothing() {
        let (core, sink) = core_with_sink();
        core.registry.register("x").unwrap();

        core.router.handle_text("x", r#"{"kind":"join"}"#);

        let envs = sink.sent_to("x");
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].status, DeliveryStatus::Fail);
        assert_eq!(envs[0].reason.as_deref(), Some("missing-room-id"));
        assert_eq!(core.rooms.room_count(), 0);
    }

    #[test]
    fn chat_reaches_every_member_including_sender() {
        let (core, sink) = core_with_sink();
        for id in ["a", "b"] {
            core.registry.register(id).unwrap();
            core.rooms.join("lobby", id).unwrap();
        }

        core.router
            .handle_text("a", r#"{"kind":"chat","roomId":"lobby","payload":"hi"}"#);

        for target in ["a", "b"] {
            let envs = sink.sent_to(target);
            assert_eq!(envs.len(), 1, "{target} should get exactly one envelope");
            let env = &envs[0];
            assert_eq!(env.status, DeliveryStatus::Success);
            assert_eq!(env.kind.as_deref(), Some("chat"));
            let payload = env.payload.as_ref().unwrap();
            assert_eq!(payload["sender"], "a");
            assert_eq!(payload["body"], "hi");
            assert_eq!(payload["roomId"], "lobby");
        }
    }

    #[test]
    fn chat_echo_can_be_disabled() {
        let sink = Arc::new(RecordingSink::default());
        let core = RoutingCore::new(
            sink.clone(),
            RouterConfig {
                echo_chat_to_sender: false,
            },
        );
        for id in ["a", "b"] {
            core.registry.register(id).unwrap();
            core.rooms.join("lobby", id).unwrap();
        }

        core.router
            .handle_text("a", r#"{"kind":"chat","roomId":"lobby","payload":"hi"}"#);

        assert!(sink.sent_to("a").is_empty());
        assert_eq!(sink.sent_to("b").len(), 1);
    }

    #[test]
    fn chat_from_non_member_is_rejected_without_broadcast() {
        let (core, sink) = core_with_sink();
        core.registry.register("member").unwrap();
        core.registry.register("outsider").unwrap();
        core.rooms.join("lobby", "member").unwrap();

        core.router
            .handle_text("outsider", r#"{"kind":"chat","roomId":"lobby","payload":"hi"}"#);

        let envs = sink.sent_to("outsider");
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].status, DeliveryStatus::Fail);
        assert_eq!(envs[0].reason.as_deref(), Some("not-a-member"));
        assert!(sink.sent_to("member").is_empty());
    }

    #[test]
    fn the_all_alias_routes_as_chat() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();
        core.rooms.join("lobby", "a").unwrap();

        core.router
            .handle_text("a", r#"{"kind":"all","roomId":"lobby","payload":"hi"}"#);

        let envs = sink.sent_to("a");
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].kind.as_deref(), Some("chat"));
    }

    #[test]
    fn leave_broadcasts_to_remaining_members_only() {
        let (core, sink) = core_with_sink();
        for id in ["a", "b", "c"] {
            core.registry.register(id).unwrap();
            core.rooms.join("lobby", id).unwrap();
        }

        core.router
            .handle_text("a", r#"{"kind":"leave","roomId":"lobby"}"#);

        // The departed connection gets nothing; the remainers each get one
        // room-left naming it.
        assert!(sink.sent_to("a").is_empty());
        for target in ["b", "c"] {
            let envs = sink.sent_to(target);
            assert_eq!(envs.len(), 1);
            let env = &envs[0];
            assert_eq!(env.status, DeliveryStatus::Success);
            assert_eq!(env.kind.as_deref(), Some("room-left"));
            let payload = env.payload.as_ref().unwrap();
            assert_eq!(payload["connectionId"], "a");
            assert_eq!(payload["roomId"], "lobby");
        }
    }

    #[test]
    fn leave_of_empty_room_completes_silently() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();
        core.rooms.join("solo", "a").unwrap();

        core.router
            .handle_text("a", r#"{"kind":"leave","roomId":"solo"}"#);

        // Sole member departing: no remaining members, no broadcast.
        assert!(sink.drain().is_empty());
        assert_eq!(core.rooms.room_count(), 0);
    }

    #[test]
    fn repeated_leave_is_tolerated() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();
        core.rooms.join("lobby", "a").unwrap();

        core.router
            .handle_text("a", r#"{"kind":"leave","roomId":"lobby"}"#);
        core.router
            .handle_text("a", r#"{"kind":"leave","roomId":"lobby"}"#);

        // Neither leave is an error; no envelope is produced for either.
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn direct_message_reaches_exactly_the_target() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();
        core.registry.register("b").unwrap();

        // No shared room needed: direct messages bypass room scoping.
        core.router
            .handle_text("a", r#"{"kind":"to","targetId":"b","payload":"psst"}"#);

        assert!(sink.sent_to("a").is_empty());
        let envs = sink.sent_to("b");
        assert_eq!(envs.len(), 1);
        let env = &envs[0];
        assert_eq!(env.kind.as_deref(), Some("to"));
        let payload = env.payload.as_ref().unwrap();
        assert_eq!(payload["sender"], "a");
        assert_eq!(payload["body"], "psst");
    }

    #[test]
    fn direct_message_to_unknown_target_fails() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();

        core.router
            .handle_text("a", r#"{"kind":"to","targetId":"ghost","payload":"psst"}"#);

        let envs = sink.sent_to("a");
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].status, DeliveryStatus::Fail);
        assert_eq!(envs[0].reason.as_deref(), Some("not-connected"));
    }

    #[test]
    fn unrecognized_kind_is_rejected_not_ignored() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();

        core.router
            .handle_text("a", r#"{"kind":"dance","roomId":"lobby"}"#);

        let envs = sink.sent_to("a");
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].status, DeliveryStatus::Fail);
        assert_eq!(envs[0].reason.as_deref(), Some("unrecognized-kind"));
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();

        core.router.handle_text("a", "not valid json at all {{{");

        let envs = sink.sent_to("a");
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].status, DeliveryStatus::Fail);
        assert_eq!(envs[0].reason.as_deref(), Some("malformed-envelope"));
    }

    #[test]
    fn one_failed_recipient_does_not_abort_fan_out() {
        let sink = Arc::new(FlakySink {
            fail_for: "b".into(),
            inner: RecordingSink::default(),
        });
        let core = RoutingCore::new(sink.clone(), RouterConfig::default());
        for id in ["a", "b", "c"] {
            core.registry.register(id).unwrap();
            core.rooms.join("lobby", id).unwrap();
        }

        core.router
            .handle_text("a", r#"{"kind":"chat","roomId":"lobby","payload":"hi"}"#);

        // b's delivery failed, a and c still got the message.
        assert_eq!(sink.inner.sent_to("a").len(), 1);
        assert_eq!(sink.inner.sent_to("c").len(), 1);
        assert!(sink.inner.sent_to("b").is_empty());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle cleanup
// ─────────────────────────────────────────────────────────────────────────────

mod lifecycle {
    use super::*;

    #[test]
    fn disconnect_evicts_from_every_room_and_notifies_each_once() {
        let (core, sink) = core_with_sink();
        for id in ["gone", "stay1", "stay2"] {
            core.registry.register(id).unwrap();
        }
        core.rooms.join("r1", "gone").unwrap();
        core.rooms.join("r1", "stay1").unwrap();
        core.rooms.join("r2", "gone").unwrap();
        core.rooms.join("r2", "stay2").unwrap();

        core.lifecycle
            .handle_disconnect("gone", DisconnectCause::TransportClose);

        assert_eq!(core.rooms.members_of("r1"), vec!["stay1".to_string()]);
        assert_eq!(core.rooms.members_of("r2"), vec!["stay2".to_string()]);
        assert!(!core.registry.contains("gone"));

        for (target, room) in [("stay1", "r1"), ("stay2", "r2")] {
            let envs = sink.sent_to(target);
            assert_eq!(envs.len(), 1, "{target} should get exactly one room-left");
            let env = &envs[0];
            assert_eq!(env.kind.as_deref(), Some("room-left"));
            let payload = env.payload.as_ref().unwrap();
            assert_eq!(payload["connectionId"], "gone");
            assert_eq!(payload["roomId"], room);
        }
    }

    #[test]
    fn disconnect_of_sole_member_drops_the_room() {
        let (core, sink) = core_with_sink();
        core.registry.register("a").unwrap();
        core.rooms.join("lobby", "a").unwrap();

        core.lifecycle
            .handle_disconnect("a", DisconnectCause::PingTimeout);

        assert_eq!(core.rooms.room_count(), 0);
        assert_eq!(core.registry.connection_count(), 0);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn disconnect_for_untracked_connection_is_harmless() {
        let (core, sink) = core_with_sink();

        core.lifecycle
            .handle_disconnect("ghost", DisconnectCause::TransportError);

        assert!(sink.drain().is_empty());
    }

    #[test]
    fn unrecognized_cause_still_cleans_up() {
        let (core, _) = core_with_sink();
        core.registry.register("a").unwrap();
        core.rooms.join("lobby", "a").unwrap();

        core.lifecycle
            .handle_disconnect("a", DisconnectCause::Unrecognized("gremlins".into()));

        assert!(!core.registry.contains("a"));
        assert_eq!(core.rooms.room_count(), 0);
    }

    #[test]
    fn every_cause_funnels_into_the_same_cleanup() {
        let causes = [
            DisconnectCause::ServerForcedDisconnect,
            DisconnectCause::ClientInitiatedDisconnect,
            DisconnectCause::ServerShutdown,
            DisconnectCause::PingTimeout,
            DisconnectCause::TransportClose,
            DisconnectCause::TransportError,
        ];
        for cause in causes {
            let (core, _) = core_with_sink();
            core.registry.register("a").unwrap();
            core.rooms.join("lobby", "a").unwrap();

            core.lifecycle.handle_disconnect("a", cause);

            assert!(!core.registry.contains("a"));
            assert_eq!(core.rooms.room_count(), 0);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// End-to-end scenarios
// ─────────────────────────────────────────────────────────────────────────────

mod scenarios {
    use super::*;

    #[test]
    fn lobby_chat_then_disconnect() {
        let (core, sink) = core_with_sink();
        core.registry.register("A").unwrap();
        core.registry.register("B").unwrap();

        core.router
            .handle_text("A", r#"{"kind":"join","roomId":"lobby"}"#);
        core.router
            .handle_text("B", r#"{"kind":"join","roomId":"lobby"}"#);
        sink.drain(); // join acks

        core.router
            .handle_text("A", r#"{"kind":"chat","roomId":"lobby","payload":"hi"}"#);

        for target in ["A", "B"] {
            let envs = sink.sent_to(target);
            assert_eq!(envs.len(), 1);
            let env = &envs[0];
            assert_eq!(env.status, DeliveryStatus::Success);
            let payload = env.payload.as_ref().unwrap();
            assert_eq!(payload["sender"], "A");
            assert_eq!(payload["body"], "hi");
        }
        sink.drain();

        core.lifecycle
            .handle_disconnect("B", DisconnectCause::classify("transport close"));

        let envs = sink.sent_to("A");
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].kind.as_deref(), Some("room-left"));
        assert_eq!(envs[0].payload.as_ref().unwrap()["connectionId"], "B");
        assert_eq!(core.rooms.members_of("lobby"), vec!["A".to_string()]);
    }

    #[test]
    fn concurrent_churn_keeps_membership_consistent() {
        let (core, _) = core_with_sink();
        let rooms = ["r0", "r1", "r2", "r3"];
        let conns: Vec<String> = (0..8).map(|i| format!("conn-{i}")).collect();
        for conn in &conns {
            core.registry.register(conn).unwrap();
        }

        let core = Arc::new(core);
        let handles: Vec<_> = conns
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, conn)| {
                let core = core.clone();
                std::thread::spawn(move || {
                    for round in 0..100 {
                        let room = rooms[(i + round) % rooms.len()];
                        core.rooms.join(room, &conn).unwrap();
                        if round % 3 == 0 {
                            core.rooms.leave(room, &conn).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Both sides of the membership relation must agree exactly.
        for conn in &conns {
            let joined = core.rooms.rooms_of(conn).unwrap();
            for room in rooms {
                let in_room = core.rooms.members_of(room).contains(conn);
                let has_room = joined.contains(&room.to_string());
                assert_eq!(in_room, has_room, "inconsistent membership for {conn} in {room}");
            }
        }
    }
}
