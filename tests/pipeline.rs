//! End-to-end interception chains through `Pipeline`.

mod common;

use common::{connect, extension, publish, start_extensions};
use gatehouse::extensions::{current, IsolationContext, IsolationError};
use gatehouse::interceptor::{interceptor_fn, AsyncHandle, AsyncStatus, TimeoutFallback};
use gatehouse::packets::{
    AckReasonCode, ConnectPacket, Direction, DisconnectReasonCode, Packet, PacketKind,
    ProtocolVersion, PubackPacket, PublishPacket, Qos, SubscribePacket, Subscription,
};
use gatehouse::pipeline::{Outcome, PipelineError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn delivered_publish(outcome: Outcome) -> PublishPacket {
    match outcome {
        Outcome::Delivered(Packet::Publish(packet)) => packet,
        other => panic!("expected a delivered PUBLISH, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_extensions_delivers_unchanged() {
    let (registry, report) = start_extensions(Vec::new());
    assert!(report.is_clean());
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let packet = publish("sensors/1");
    let outcome = conn
        .intercept(Direction::Inbound, packet.clone())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Delivered(Packet::Publish(packet)));
    assert_eq!(pipeline.metrics().chains, 1);
    assert_eq!(pipeline.metrics().delivered, 1);
}

#[tokio::test]
async fn test_inbound_publish_prevention_is_sticky() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&observed);
    let (registry, report) = start_extensions(vec![
        extension("deny", 100, |ctx| {
            ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
                output.prevent_delivery_with(AckReasonCode::NotAuthorized, None)?;
                Ok(())
            })?;
            Ok(())
        }),
        extension("observer", 10, move |ctx| {
            let seen = Arc::clone(&seen);
            ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, move |input, output| {
                seen.lock().push(input.delivery_prevented());
                // a later stage can not lift the prevention
                output.packet()?.set_topic("rewritten")?;
                Ok(())
            })?;
            Ok(())
        }),
    ]);
    assert!(report.is_clean());
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let outcome = conn
        .intercept(Direction::Inbound, publish("a/b"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Prevented {
            reason_code: Some(AckReasonCode::NotAuthorized),
            reason_string: None,
        }
    );
    assert_eq!(*observed.lock(), vec![true]);
    assert_eq!(pipeline.metrics().prevented, 1);
}

#[tokio::test]
async fn test_prevent_while_holding_packet_guard_completes() {
    let (registry, _) = start_extensions(vec![extension("editor", 0, |ctx| {
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
            let mut packet = output.packet()?;
            packet.set_topic("quarantine/a")?;
            output.prevent_delivery_with(AckReasonCode::QuotaExceeded, None)?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        conn.intercept(Direction::Inbound, publish("a/b")),
    )
    .await
    .expect("chain did not complete")
    .unwrap();
    assert_eq!(
        outcome,
        Outcome::Prevented {
            reason_code: Some(AckReasonCode::QuotaExceeded),
            reason_string: None,
        }
    );
    assert_eq!(pipeline.metrics().faults(), 0);

    // the worker is still serving the connection
    let next = conn
        .intercept(Direction::Outbound, publish("a/b"))
        .await
        .unwrap();
    assert!(matches!(next, Outcome::Delivered(_)));
}

#[tokio::test]
async fn test_outbound_publish_prevention_stops_chain() {
    let calls = Arc::new(Mutex::new(0_u32));
    let counter = Arc::clone(&calls);
    let (registry, _) = start_extensions(vec![
        extension("drop", 100, |ctx| {
            ctx.register_interceptor::<PublishPacket, _>(Direction::Outbound, |_input, output| {
                output.prevent_delivery()?;
                Ok(())
            })?;
            Ok(())
        }),
        extension("after", 0, move |ctx| {
            let counter = Arc::clone(&counter);
            ctx.register_interceptor::<PublishPacket, _>(Direction::Outbound, move |_, _| {
                *counter.lock() += 1;
                Ok(())
            })?;
            Ok(())
        }),
    ]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let outcome = conn
        .intercept(Direction::Outbound, publish("a/b"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Prevented {
            reason_code: None,
            reason_string: None,
        }
    );
    assert_eq!(*calls.lock(), 0);
}

#[tokio::test]
async fn test_chain_runs_in_priority_order_and_threads_modifications() {
    let mut extensions = Vec::new();
    for (id, priority) in [("low", 5), ("high", 50), ("mid", 20)] {
        extensions.push(extension(id, priority, move |ctx| {
            ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, move |input, output| {
                let topic = format!("{}/{id}", input.packet().topic);
                output.packet()?.set_topic(&topic)?;
                Ok(())
            })?;
            Ok(())
        }));
    }
    let (registry, report) = start_extensions(extensions);
    assert_eq!(report.started.len(), 3);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let outcome = conn
        .intercept(Direction::Inbound, publish("t"))
        .await
        .unwrap();
    assert_eq!(delivered_publish(outcome).topic, "t/high/mid/low");
}

#[tokio::test(start_paused = true)]
async fn test_failure_timeout_prevents_publish() {
    let (registry, _) = start_extensions(vec![extension("slow", 0, |ctx| {
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
            output.async_for(Duration::from_millis(50), TimeoutFallback::Failure)?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let started = tokio::time::Instant::now();
    let outcome = conn
        .intercept(Direction::Inbound, publish("a/b"))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(
        outcome,
        Outcome::Prevented {
            reason_code: Some(AckReasonCode::Success),
            reason_string: None,
        }
    );
    assert_eq!(pipeline.metrics().timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failure_timeout_uses_registered_reason() {
    let (registry, _) = start_extensions(vec![extension("slow", 0, |ctx| {
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
            output.async_with_reason(
                Duration::from_millis(50),
                TimeoutFallback::Failure,
                AckReasonCode::QuotaExceeded,
                Some("backend unavailable"),
            )?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let outcome = conn
        .intercept(Direction::Inbound, publish("a/b"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Prevented {
            reason_code: Some(AckReasonCode::QuotaExceeded),
            reason_string: Some("backend unavailable".into()),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_failure_timeout_disconnects_on_connect() {
    let (registry, _) = start_extensions(vec![extension("slow", 0, |ctx| {
        ctx.register_interceptor::<ConnectPacket, _>(Direction::Inbound, |_input, output| {
            output.packet()?.set_keep_alive(10)?;
            output.suspend(Duration::from_millis(50))?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let outcome = conn
        .intercept(
            Direction::Inbound,
            ConnectPacket::new("client-a", ProtocolVersion::V5),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Disconnect {
            reason_code: DisconnectReasonCode::UnspecifiedError,
            reason_string: Some("Extension interceptor timeout".into()),
        }
    );
    assert_eq!(pipeline.metrics().disconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failure_timeout_reverts_ack_stage() {
    let (registry, _) = start_extensions(vec![extension("slow", 0, |ctx| {
        ctx.register_interceptor::<PubackPacket, _>(Direction::Inbound, |_input, output| {
            output
                .packet()?
                .set_reason_code(AckReasonCode::NotAuthorized)?;
            output.suspend(Duration::from_millis(50))?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let ack = PubackPacket::new(7, AckReasonCode::UnspecifiedError);
    let outcome = conn
        .intercept(Direction::Inbound, ack.clone())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Delivered(Packet::Puback(ack)));
}

#[tokio::test(start_paused = true)]
async fn test_success_fallback_resumed_early_applies_changes() {
    let (registry, _) = start_extensions(vec![extension("enrich", 0, |ctx| {
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
            let handle = output.async_for(Duration::from_secs(5), TimeoutFallback::Success)?;
            let output = output.clone();
            current()?.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if let Ok(mut packet) = output.packet() {
                    let _ = packet.set_topic("enriched/topic");
                    let _ = packet.user_properties_mut().add("origin", "enrich");
                }
                handle.resume();
            })?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let started = tokio::time::Instant::now();
    let outcome = conn
        .intercept(Direction::Inbound, publish("raw/topic"))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    let packet = delivered_publish(outcome);
    assert_eq!(packet.topic, "enriched/topic");
    assert_eq!(packet.user_properties.first("origin"), Some("enrich"));
    assert_eq!(pipeline.metrics().timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_resume_after_timeout_is_ignored() {
    let slot: Arc<Mutex<Option<AsyncHandle>>> = Arc::new(Mutex::new(None));
    let stash = Arc::clone(&slot);
    let (registry, _) = start_extensions(vec![extension("slow", 0, move |ctx| {
        let stash = Arc::clone(&stash);
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, move |_input, output| {
            let handle = output.async_for(Duration::from_millis(20), TimeoutFallback::Success)?;
            output.packet()?.set_topic("never/applied")?;
            *stash.lock() = Some(handle);
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let outcome = conn
        .intercept(Direction::Inbound, publish("a/b"))
        .await
        .unwrap();
    assert_eq!(delivered_publish(outcome).topic, "a/b");

    let handle = slot.lock().take().unwrap();
    assert_eq!(handle.status(), AsyncStatus::Canceled);
    assert!(!handle.resume());
}

#[tokio::test]
async fn test_faulting_interceptors_equal_absent_extension() {
    let rewrite = |ctx: &Arc<IsolationContext>| -> anyhow::Result<()> {
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
            output.packet()?.set_topic("rewritten")?;
            Ok(())
        })?;
        Ok(())
    };

    let (faulty, _) = start_extensions(vec![
        extension("errors", 30, |ctx| {
            ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
                output.packet()?.set_topic("hijacked")?;
                anyhow::bail!("backend lookup failed")
            })?;
            Ok(())
        }),
        extension("panics", 20, |ctx| {
            ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
                output.packet()?.set_topic("hijacked")?;
                panic!("extension bug");
            })?;
            Ok(())
        }),
        extension("misuses", 15, |ctx| {
            ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
                output.packet()?.set_topic("hijacked")?;
                output.async_for(Duration::ZERO, TimeoutFallback::Success)?;
                Ok(())
            })?;
            Ok(())
        }),
        extension("rewrite", 10, rewrite),
    ]);
    let (clean, _) = start_extensions(vec![extension("rewrite", 10, rewrite)]);

    let faulty_pipeline = common::pipeline(&faulty);
    let clean_pipeline = common::pipeline(&clean);
    let faulty_outcome = connect(&faulty_pipeline, "client-a")
        .intercept(Direction::Inbound, publish("a/b"))
        .await
        .unwrap();
    let clean_outcome = connect(&clean_pipeline, "client-a")
        .intercept(Direction::Inbound, publish("a/b"))
        .await
        .unwrap();
    assert_eq!(faulty_outcome, clean_outcome);
    assert_eq!(delivered_publish(faulty_outcome).topic, "rewritten");

    let metrics = faulty_pipeline.metrics();
    assert_eq!(metrics.runtime_faults, 1);
    assert_eq!(metrics.panic_faults, 1);
    assert_eq!(metrics.validation_faults, 1);
    assert_eq!(metrics.faults(), 3);
}

#[tokio::test]
async fn test_disconnect_aborts_chain() {
    let calls = Arc::new(Mutex::new(0_u32));
    let counter = Arc::clone(&calls);
    let (registry, _) = start_extensions(vec![
        extension("kick", 10, |ctx| {
            ctx.register_interceptor::<ConnectPacket, _>(Direction::Inbound, |input, output| {
                if input.packet().client_id.starts_with("banned") {
                    output.disconnect_client(DisconnectReasonCode::NotAuthorized, Some("banned"))?;
                }
                Ok(())
            })?;
            Ok(())
        }),
        extension("after", 0, move |ctx| {
            let counter = Arc::clone(&counter);
            ctx.register_interceptor::<ConnectPacket, _>(Direction::Inbound, move |_, _| {
                *counter.lock() += 1;
                Ok(())
            })?;
            Ok(())
        }),
    ]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "banned-1");

    let outcome = conn
        .intercept(
            Direction::Inbound,
            ConnectPacket::new("banned-1", ProtocolVersion::V5),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Disconnect {
            reason_code: DisconnectReasonCode::NotAuthorized,
            reason_string: Some("banned".into()),
        }
    );
    assert_eq!(*calls.lock(), 0);
}

#[tokio::test]
async fn test_second_outcome_is_a_validation_fault() {
    let (registry, _) = start_extensions(vec![extension("greedy", 0, |ctx| {
        ctx.register_interceptor::<SubscribePacket, _>(Direction::Inbound, |_input, output| {
            output.prevent_delivery()?;
            output.disconnect_client(DisconnectReasonCode::NotAuthorized, None)?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let subscribe = SubscribePacket::new(3, vec![Subscription::new("a/#", Qos::AtLeastOnce)]);
    let outcome = conn
        .intercept(Direction::Inbound, subscribe.clone())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Delivered(Packet::Subscribe(subscribe)));
    assert_eq!(pipeline.metrics().validation_faults, 1);
}

#[tokio::test(start_paused = true)]
async fn test_chains_of_one_connection_run_sequentially() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    let (registry, _) = start_extensions(vec![extension("slow", 0, move |ctx| {
        let log = Arc::clone(&log);
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, move |input, output| {
            let id = input.packet().packet_id;
            log.lock().push(format!("start {id}"));
            let handle = output.async_for(Duration::from_secs(1), TimeoutFallback::Failure)?;
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().push(format!("end {id}"));
                handle.resume();
            });
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let handles: Vec<_> = (1..=3)
        .map(|id| {
            conn.begin_chain(Direction::Inbound, publish("a").with_packet_id(id))
                .unwrap()
        })
        .collect();
    for handle in handles {
        assert!(matches!(handle.outcome().await.unwrap(), Outcome::Delivered(_)));
    }
    assert_eq!(
        *events.lock(),
        vec!["start 1", "end 1", "start 2", "end 2", "start 3", "end 3"]
    );
}

#[tokio::test]
async fn test_connections_are_independent() {
    let (registry, _) = start_extensions(vec![extension("per-client", 0, |ctx| {
        ctx.register_provider::<PublishPacket, _>(Direction::Inbound, |input| {
            if !input.client().client_id.starts_with("restricted") {
                return None;
            }
            Some(interceptor_fn::<PublishPacket, _>(|_input, output| {
                output.prevent_delivery_with(AckReasonCode::NotAuthorized, None)?;
                Ok(())
            }))
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let open = connect(&pipeline, "open-1");
    let restricted = connect(&pipeline, "restricted-1");

    let (open_outcome, restricted_outcome) = tokio::join!(
        open.intercept(Direction::Inbound, publish("a")),
        restricted.intercept(Direction::Inbound, publish("a")),
    );
    assert!(matches!(open_outcome.unwrap(), Outcome::Delivered(_)));
    assert!(matches!(
        restricted_outcome.unwrap(),
        Outcome::Prevented {
            reason_code: Some(AckReasonCode::NotAuthorized),
            ..
        }
    ));
}

#[tokio::test]
async fn test_panicking_provider_yields_no_interceptor() {
    let (registry, report) = start_extensions(vec![
        extension("broken-provider", 10, |ctx| {
            ctx.register_provider::<PublishPacket, _>(Direction::Inbound, |_| {
                panic!("provider bug");
            })?;
            Ok(())
        }),
        extension("rewrite", 0, |ctx| {
            ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
                output.packet()?.set_topic("ok")?;
                Ok(())
            })?;
            Ok(())
        }),
    ]);
    assert!(report.is_clean());
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let outcome = conn
        .intercept(Direction::Inbound, publish("a"))
        .await
        .unwrap();
    assert_eq!(delivered_publish(outcome).topic, "ok");
}

#[tokio::test]
async fn test_stopped_extension_is_skipped_on_open_connections() {
    let (registry, _) = start_extensions(vec![extension("guard", 0, |ctx| {
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
            output.prevent_delivery()?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");

    let before = conn
        .intercept(Direction::Inbound, publish("a"))
        .await
        .unwrap();
    assert!(matches!(before, Outcome::Prevented { .. }));

    assert!(registry.stop("guard"));
    let after = conn
        .intercept(Direction::Inbound, publish("a"))
        .await
        .unwrap();
    assert!(matches!(after, Outcome::Delivered(_)));
}

#[tokio::test]
async fn test_direction_is_checked() {
    let registration = Arc::new(Mutex::new(None));
    let result = Arc::clone(&registration);
    let (registry, _) = start_extensions(vec![extension("wrong-way", 0, move |ctx| {
        let outcome = ctx.register_interceptor::<ConnectPacket, _>(Direction::Outbound, |_, _| Ok(()));
        *result.lock() = Some(outcome);
        Ok(())
    })]);
    assert!(matches!(
        registration.lock().take(),
        Some(Err(IsolationError::DirectionNotSupported {
            kind: PacketKind::Connect,
            direction: Direction::Outbound,
        }))
    ));

    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");
    let err = conn
        .begin_chain(
            Direction::Outbound,
            ConnectPacket::new("client-a", ProtocolVersion::V5),
        )
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::DirectionNotSupported {
            kind: PacketKind::Connect,
            direction: Direction::Outbound,
        }
    );
}

#[tokio::test]
async fn test_backlog_is_bounded() {
    let (registry, _) = start_extensions(Vec::new());
    let pipeline = common::pipeline(&registry).with_queue_capacity(1);
    let conn = connect(&pipeline, "client-a");

    let first = conn.begin_chain(Direction::Inbound, publish("a")).unwrap();
    let second = conn.begin_chain(Direction::Inbound, publish("b"));
    assert_eq!(
        second.unwrap_err(),
        PipelineError::Backlogged { capacity: 1 }
    );
    assert!(matches!(first.outcome().await.unwrap(), Outcome::Delivered(_)));
}

#[tokio::test]
async fn test_connection_directory_tracks_open_pipelines() {
    let (registry, _) = start_extensions(Vec::new());
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");
    assert!(pipeline.connections().is_connected("client-a"));
    assert_eq!(
        pipeline.connections().get("client-a").unwrap().connection.connection_id,
        conn.connection().connection_id
    );

    drop(conn);
    assert!(!pipeline.connections().is_connected("client-a"));
}

#[tokio::test]
async fn test_interceptor_runs_inside_its_extension_context() {
    let seen = Arc::new(Mutex::new(None));
    let record = Arc::clone(&seen);
    let (registry, _) = start_extensions(vec![extension("scoped", 0, move |ctx| {
        let record = Arc::clone(&record);
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, move |_, _| {
            *record.lock() = Some(current()?.id().to_owned());
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline(&registry);
    let conn = connect(&pipeline, "client-a");
    conn.intercept(Direction::Inbound, publish("a"))
        .await
        .unwrap();

    assert_eq!(seen.lock().as_deref(), Some("scoped"));
    assert!(matches!(current(), Err(IsolationError::NoContext)));
}

#[tokio::test]
async fn test_async_timeout_bound_is_configurable() {
    let (registry, _) = start_extensions(vec![extension("slow", 0, |ctx| {
        ctx.register_interceptor::<PublishPacket, _>(Direction::Inbound, |_input, output| {
            output.packet()?.set_topic("changed")?;
            output.async_for(Duration::from_secs(2), TimeoutFallback::Success)?;
            Ok(())
        })?;
        Ok(())
    })]);
    let pipeline = common::pipeline_with_timeout(&registry, Duration::from_secs(1));
    let conn = connect(&pipeline, "client-a");

    let outcome = conn
        .intercept(Direction::Inbound, publish("a"))
        .await
        .unwrap();
    assert_eq!(delivered_publish(outcome).topic, "a");
    assert_eq!(pipeline.metrics().validation_faults, 1);
}
