//! Sequential chain executor.
//!
//! Runs the interceptors of one packet strictly one after another. Stage
//! `k + 1` starts only after stage `k` returned and, if it suspended, was
//! resumed or timed out. Faults inside a stage are absorbed: the stage
//! becomes a no-op and the chain continues.

use super::async_output::{Resolution, TimeoutFallback};
use super::io::{default_prevention, Disconnection, Input, Output, OutputError, Prevention, Verdict};
use super::registry::Registered;
use crate::packets::{
    DisconnectReasonCode, Direction, Interceptable, ModifiablePacket, PacketError, PacketKind,
    PacketLimits,
};
use crate::pipeline::{FaultClass, PipelineMetrics};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Broker-wide knobs shared by every chain.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub limits: Arc<PacketLimits>,
    pub max_async_timeout: Duration,
    pub metrics: Arc<PipelineMetrics>,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            limits: Arc::new(PacketLimits::default()),
            max_async_timeout: Duration::from_secs(3600),
            metrics: Arc::new(PipelineMetrics::default()),
        }
    }
}

/// Final result of one chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome<P> {
    Delivered(P),
    Prevented(Prevention),
    Disconnect(Disconnection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureAction {
    Revert,
    Prevent,
    Disconnect,
}

/// Per-kind handling of timeouts and preventions.
#[derive(Debug, Clone, Copy)]
struct StagePolicy {
    on_failure: FailureAction,
    prevent_continues: bool,
    inbound_publish: bool,
}

impl StagePolicy {
    fn of(kind: PacketKind, direction: Direction) -> Self {
        let on_failure = match kind {
            PacketKind::Connect | PacketKind::Connack => FailureAction::Disconnect,
            PacketKind::Publish | PacketKind::Subscribe => FailureAction::Prevent,
            _ => FailureAction::Revert,
        };
        let inbound = direction == Direction::Inbound;
        Self {
            on_failure,
            prevent_continues: inbound
                && matches!(kind, PacketKind::Publish | PacketKind::Subscribe),
            inbound_publish: inbound && kind == PacketKind::Publish,
        }
    }
}

enum Fault {
    Validation(anyhow::Error),
    Runtime(anyhow::Error),
    Panic(String),
}

impl Fault {
    fn from_error(err: anyhow::Error) -> Self {
        if err.downcast_ref::<PacketError>().is_some() || err.downcast_ref::<OutputError>().is_some()
        {
            Self::Validation(err)
        } else {
            Self::Runtime(err)
        }
    }

    fn class(&self) -> FaultClass {
        match self {
            Self::Validation(_) => FaultClass::Validation,
            Self::Runtime(_) => FaultClass::Runtime,
            Self::Panic(_) => FaultClass::Panic,
        }
    }
}

pub(crate) fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "non-string panic payload".to_owned())
        },
        |message| (*message).to_owned(),
    )
}

fn report_fault(extension: &str, kind: PacketKind, direction: Direction, client_id: &str, fault: &Fault) {
    match fault {
        Fault::Validation(err) => warn!(
            extension,
            %kind,
            %direction,
            client_id,
            fault = "validation",
            error = %err,
            "extension misused the interceptor API; stage ignored"
        ),
        Fault::Runtime(err) => {
            warn!(
                extension,
                %kind,
                %direction,
                client_id,
                fault = "runtime",
                "uncaught error in interceptor; extensions are responsible for their own error handling"
            );
            debug!(extension, error = ?err, "interceptor error detail");
        }
        Fault::Panic(message) => warn!(
            extension,
            %kind,
            %direction,
            client_id,
            fault = "panic",
            panic = %message,
            "interceptor panicked; stage ignored"
        ),
    }
}

/// Threads `input` through `interceptors` and returns the aggregate outcome.
pub(crate) async fn run_chain<P: Interceptable>(
    interceptors: &[Registered<P>],
    input: Input<P>,
    settings: &ChainSettings,
) -> ChainOutcome<P> {
    let direction = input.direction();
    let policy = StagePolicy::of(P::KIND, direction);
    let mut input = input;
    let mut prevention: Option<Prevention> = None;

    for registered in interceptors {
        let extension = &registered.extension;
        if !extension.is_enabled() {
            trace!(extension = extension.id(), kind = %P::KIND, "skipping disabled extension");
            continue;
        }

        let output = Output::new(
            direction,
            input.packet().modifiable(Arc::clone(&settings.limits)),
            Arc::clone(&settings.limits),
            settings.max_async_timeout,
        );
        let call = extension.enter(|| {
            panic::catch_unwind(AssertUnwindSafe(|| {
                registered.interceptor.intercept(&input, &output)
            }))
        });
        let fault = match call {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(Fault::from_error(err)),
            Err(payload) => Some(Fault::Panic(panic_payload_to_string(payload.as_ref()))),
        };
        if let Some(fault) = fault {
            output.abandon();
            report_fault(
                extension.id(),
                P::KIND,
                direction,
                &input.client().client_id,
                &fault,
            );
            settings.metrics.record_fault(fault.class());
            continue;
        }

        let resolution = match output.seal() {
            Some(handle) => handle.wait().await,
            None => Resolution::Resumed,
        };
        let Some(stage) = output.close() else {
            continue;
        };

        let verdict = match resolution {
            Resolution::Resumed => stage.verdict,
            Resolution::TimedOut(fallback) => {
                settings.metrics.record_timeout();
                debug!(
                    extension = extension.id(),
                    kind = %P::KIND,
                    %direction,
                    client_id = %input.client().client_id,
                    ?fallback,
                    "async interceptor timed out"
                );
                match (fallback, policy.on_failure) {
                    (TimeoutFallback::Success, _) | (_, FailureAction::Revert) => continue,
                    (TimeoutFallback::Failure, FailureAction::Prevent) => Verdict::Prevent(
                        stage
                            .failure_prevention
                            .unwrap_or_else(|| default_prevention(policy.inbound_publish)),
                    ),
                    (TimeoutFallback::Failure, FailureAction::Disconnect) => {
                        Verdict::Disconnect(Disconnection {
                            reason_code: DisconnectReasonCode::UnspecifiedError,
                            reason_string: Some("Extension interceptor timeout".into()),
                        })
                    }
                }
            }
        };

        match verdict {
            Verdict::Continue => {}
            Verdict::Prevent(stage_prevention) => {
                if prevention.is_none() {
                    prevention = Some(stage_prevention);
                }
                if !policy.prevent_continues {
                    break;
                }
            }
            Verdict::Disconnect(disconnection) => {
                trace!(extension = extension.id(), kind = %P::KIND, "chain aborted by disconnect");
                return ChainOutcome::Disconnect(disconnection);
            }
        }

        if stage.packet.is_modified() {
            input = input.update(stage.packet.copy());
        }
        if prevention.is_some() && !input.delivery_prevented() {
            input = input.mark_prevented();
        }
    }

    match prevention {
        Some(prevention) => ChainOutcome::Prevented(prevention),
        None => ChainOutcome::Delivered(input.into_packet()),
    }
}
