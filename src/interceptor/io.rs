//! Input and Output of a single interceptor stage.

use super::async_output::{AsyncHandle, TimeoutFallback};
use super::{ClientInformation, ConnectionInformation};
use crate::packets::{
    AckReasonCode, DisconnectReasonCode, Direction, Interceptable, PacketLimits, PublishPacket,
    ReasonCode, SubscribePacket,
};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Misuse of an `Output` by an extension.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("async is already armed for this output")]
    AsyncAlreadyArmed,
    #[error("invalid async timeout: {0}")]
    InvalidTimeout(String),
    #[error("the interceptor stage has already completed")]
    StageClosed,
    #[error("outcome not allowed: {0}")]
    OutcomeNotAllowed(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Delivery was stopped by an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prevention {
    /// Acknowledgement code for an inbound PUBLISH; `None` otherwise.
    pub reason_code: Option<AckReasonCode>,
    pub reason_string: Option<String>,
}

impl Prevention {
    fn silent() -> Self {
        Self {
            reason_code: None,
            reason_string: None,
        }
    }
}

/// The connection must be closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnection {
    pub reason_code: DisconnectReasonCode,
    pub reason_string: Option<String>,
}

/// Result of one stage, decided by the extension through its `Output`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Verdict {
    #[default]
    Continue,
    Prevent(Prevention),
    Disconnect(Disconnection),
}

/// Immutable view handed to an interceptor.
#[derive(Debug, Clone)]
pub struct Input<P> {
    direction: Direction,
    client: Arc<ClientInformation>,
    connection: Arc<ConnectionInformation>,
    packet: Arc<P>,
    delivery_prevented: bool,
}

impl<P: Interceptable> Input<P> {
    pub(crate) fn new(
        direction: Direction,
        client: Arc<ClientInformation>,
        connection: Arc<ConnectionInformation>,
        packet: P,
    ) -> Self {
        Self {
            direction,
            client,
            connection,
            packet: Arc::new(packet),
            delivery_prevented: false,
        }
    }

    pub fn packet(&self) -> &P {
        &self.packet
    }

    pub fn client(&self) -> &ClientInformation {
        &self.client
    }

    pub fn connection(&self) -> &ConnectionInformation {
        &self.connection
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True once an earlier stage of the same chain prevented delivery.
    pub fn delivery_prevented(&self) -> bool {
        self.delivery_prevented
    }

    /// Input of the next stage, carrying the previous stage's packet copy.
    pub(crate) fn update(&self, packet: P) -> Self {
        Self {
            packet: Arc::new(packet),
            ..self.clone()
        }
    }

    pub(crate) fn mark_prevented(mut self) -> Self {
        self.delivery_prevented = true;
        self
    }

    pub(crate) fn into_packet(self) -> P {
        Arc::try_unwrap(self.packet).unwrap_or_else(|shared| (*shared).clone())
    }
}

/// Mutable state of a stage, taken by the executor when the stage ends.
pub(crate) struct StageState<P: Interceptable> {
    pub(crate) packet: P::Modifiable,
    pub(crate) verdict: Verdict,
    pub(crate) failure_prevention: Option<Prevention>,
}

/// Outcome side of a stage, locked separately from the packet so an
/// extension holding the packet guard can still decide.
struct Decision {
    verdict: Verdict,
    failure_prevention: Option<Prevention>,
}

enum AsyncSlot {
    Idle,
    Armed(AsyncHandle),
    Sealed,
}

struct OutputInner<P: Interceptable> {
    direction: Direction,
    limits: Arc<PacketLimits>,
    max_timeout: Duration,
    packet: Mutex<Option<P::Modifiable>>,
    decision: Mutex<Option<Decision>>,
    slot: Mutex<AsyncSlot>,
}

/// Mutable side of a stage. Cloneable so an extension can carry it into its
/// own async work; every method fails with [`OutputError::StageClosed`] once
/// the stage is over.
pub struct Output<P: Interceptable> {
    inner: Arc<OutputInner<P>>,
}

impl<P: Interceptable> Clone for Output<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Interceptable> std::fmt::Debug for Output<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("kind", &P::KIND)
            .field("direction", &self.inner.direction)
            .finish_non_exhaustive()
    }
}

impl<P: Interceptable> Output<P> {
    pub(crate) fn new(
        direction: Direction,
        packet: P::Modifiable,
        limits: Arc<PacketLimits>,
        max_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(OutputInner {
                direction,
                limits,
                max_timeout,
                packet: Mutex::new(Some(packet)),
                decision: Mutex::new(Some(Decision {
                    verdict: Verdict::Continue,
                    failure_prevention: None,
                })),
                slot: Mutex::new(AsyncSlot::Idle),
            }),
        }
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    /// Locks the modifiable packet of this stage. Outcomes may be decided
    /// while the guard is held; a second guard from the same output may not.
    pub fn packet(&self) -> Result<MappedMutexGuard<'_, P::Modifiable>, OutputError> {
        MutexGuard::try_map(self.inner.packet.lock(), Option::as_mut)
            .map_err(|_| OutputError::StageClosed)
    }

    /// Suspends the chain until the returned handle is resumed or `timeout`
    /// elapses. May be called once per output.
    pub fn async_for(
        &self,
        timeout: Duration,
        fallback: TimeoutFallback,
    ) -> Result<AsyncHandle, OutputError> {
        if timeout.is_zero() || timeout > self.inner.max_timeout {
            return Err(OutputError::InvalidTimeout(format!(
                "timeout must be between 1ms and {:?}, got {timeout:?}",
                self.inner.max_timeout
            )));
        }
        let mut slot = self.inner.slot.lock();
        match *slot {
            AsyncSlot::Idle => {
                let handle = AsyncHandle::arm(timeout, fallback);
                *slot = AsyncSlot::Armed(handle.clone());
                Ok(handle)
            }
            AsyncSlot::Armed(_) => Err(OutputError::AsyncAlreadyArmed),
            AsyncSlot::Sealed => Err(OutputError::StageClosed),
        }
    }

    /// `async_for` with the FAILURE fallback.
    pub fn suspend(&self, timeout: Duration) -> Result<AsyncHandle, OutputError> {
        self.async_for(timeout, TimeoutFallback::Failure)
    }

    /// Asks the broker to close the client connection. Aborts the chain.
    pub fn disconnect_client(
        &self,
        reason_code: DisconnectReasonCode,
        reason_string: Option<&str>,
    ) -> Result<(), OutputError> {
        if !reason_code.can_be_sent_by_server() {
            return Err(OutputError::InvalidArgument(format!(
                "{reason_code:?} can not be sent by the server"
            )));
        }
        self.inner
            .limits
            .check_optional_string("reason string", reason_string)
            .map_err(|err| OutputError::InvalidArgument(err.to_string()))?;
        self.decide(Verdict::Disconnect(Disconnection {
            reason_code,
            reason_string: reason_string.map(str::to_owned),
        }))
    }

    fn decide(&self, verdict: Verdict) -> Result<(), OutputError> {
        let mut decision = self.inner.decision.lock();
        let decision = decision.as_mut().ok_or(OutputError::StageClosed)?;
        if decision.verdict != Verdict::Continue {
            return Err(OutputError::OutcomeNotAllowed(
                "an outcome was already decided for this stage".into(),
            ));
        }
        decision.verdict = verdict;
        Ok(())
    }

    fn require_direction(&self, direction: Direction, what: &str) -> Result<(), OutputError> {
        if self.inner.direction != direction {
            return Err(OutputError::OutcomeNotAllowed(format!(
                "{what} is only available for {direction} {}",
                P::KIND
            )));
        }
        Ok(())
    }

    /// Stops further arming and returns the armed handle, if any.
    pub(crate) fn seal(&self) -> Option<AsyncHandle> {
        let mut slot = self.inner.slot.lock();
        match std::mem::replace(&mut *slot, AsyncSlot::Sealed) {
            AsyncSlot::Armed(handle) => Some(handle),
            AsyncSlot::Idle | AsyncSlot::Sealed => None,
        }
    }

    /// Ends the stage and hands its state to the executor. Decisions are
    /// closed first so nothing can be decided while waiting on a packet guard.
    pub(crate) fn close(&self) -> Option<StageState<P>> {
        let decision = self.inner.decision.lock().take();
        let packet = self.inner.packet.lock().take();
        let (decision, packet) = (decision?, packet?);
        Some(StageState {
            packet,
            verdict: decision.verdict,
            failure_prevention: decision.failure_prevention,
        })
    }

    /// Ends a faulted stage. A pending suspension is canceled so a late
    /// `resume()` has no effect.
    pub(crate) fn abandon(&self) {
        if let Some(handle) = self.seal() {
            handle.cancel();
        }
        self.close();
    }
}

impl Output<PublishPacket> {
    /// Drops the PUBLISH. Inbound publishes are acknowledged with SUCCESS.
    pub fn prevent_delivery(&self) -> Result<(), OutputError> {
        let prevention = match self.inner.direction {
            Direction::Inbound => Prevention {
                reason_code: Some(AckReasonCode::SUCCESS),
                reason_string: None,
            },
            Direction::Outbound => Prevention::silent(),
        };
        self.decide(Verdict::Prevent(prevention))
    }

    /// Drops an inbound PUBLISH and acknowledges it with `reason_code`.
    pub fn prevent_delivery_with(
        &self,
        reason_code: AckReasonCode,
        reason_string: Option<&str>,
    ) -> Result<(), OutputError> {
        self.require_direction(Direction::Inbound, "a prevention reason code")?;
        let prevention = self.inbound_prevention(reason_code, reason_string)?;
        self.decide(Verdict::Prevent(prevention))
    }

    /// `async_for` for an inbound PUBLISH, with the acknowledgement to use
    /// if the deadline elapses under the FAILURE fallback.
    pub fn async_with_reason(
        &self,
        timeout: Duration,
        fallback: TimeoutFallback,
        reason_code: AckReasonCode,
        reason_string: Option<&str>,
    ) -> Result<AsyncHandle, OutputError> {
        self.require_direction(Direction::Inbound, "a timeout reason code")?;
        let prevention = self.inbound_prevention(reason_code, reason_string)?;
        let handle = self.async_for(timeout, fallback)?;
        if let Some(decision) = self.inner.decision.lock().as_mut() {
            decision.failure_prevention = Some(prevention);
        }
        Ok(handle)
    }

    fn inbound_prevention(
        &self,
        reason_code: AckReasonCode,
        reason_string: Option<&str>,
    ) -> Result<Prevention, OutputError> {
        if reason_code == AckReasonCode::SUCCESS && reason_string.is_some() {
            return Err(OutputError::InvalidArgument(
                "reason string must not be set when reason code is SUCCESS".into(),
            ));
        }
        self.inner
            .limits
            .check_optional_string("reason string", reason_string)
            .map_err(|err| OutputError::InvalidArgument(err.to_string()))?;
        Ok(Prevention {
            reason_code: Some(reason_code),
            reason_string: reason_string.map(str::to_owned),
        })
    }
}

impl Output<SubscribePacket> {
    /// Rejects every subscription of the SUBSCRIBE.
    pub fn prevent_delivery(&self) -> Result<(), OutputError> {
        self.decide(Verdict::Prevent(Prevention::silent()))
    }
}

/// Prevention used when a PUBLISH or SUBSCRIBE stage times out under FAILURE
/// without an explicit reason.
pub(crate) fn default_prevention(inbound_publish: bool) -> Prevention {
    if inbound_publish {
        Prevention {
            reason_code: Some(AckReasonCode::SUCCESS),
            reason_string: None,
        }
    } else {
        Prevention::silent()
    }
}
