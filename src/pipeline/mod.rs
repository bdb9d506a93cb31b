//! Protocol-engine facing side of the interception pipeline.
//!
//! The protocol engine opens one [`ConnectionPipeline`] per client
//! connection and hands it every packet it wants intercepted. Chains of one
//! connection run strictly in submission order on a dedicated worker task;
//! chains of different connections run independently.

mod metrics;
mod response;

pub use metrics::{FaultClass, MetricsSnapshot, PipelineMetrics};
pub use response::{prevented_publish_response, PreventedPublishResponse};

use crate::extensions::{ConnectedClient, ConnectionDirectory, ExtensionRegistry};
use crate::interceptor::{
    panic_payload_to_string, run_chain, ChainOutcome, ChainSettings, ClientInformation,
    ClientInterceptors, ConnectionInformation, Input, ProviderInput,
};
use crate::packets::{
    AckReasonCode, DisconnectReasonCode, Direction, Interceptable, Packet, PacketKind,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub const DEFAULT_CHAIN_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("connection pipeline is closed")]
    ConnectionClosed,
    #[error("{kind} can not be intercepted in the {direction} direction")]
    DirectionNotSupported {
        kind: PacketKind,
        direction: Direction,
    },
    #[error("connection has {capacity} chains pending")]
    Backlogged { capacity: usize },
}

/// What the protocol engine must do with an intercepted packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Send or process this (possibly modified) packet.
    Delivered(Packet),
    /// Drop the packet. For an inbound PUBLISH the reason code selects the
    /// acknowledgement, see [`prevented_publish_response`].
    Prevented {
        reason_code: Option<AckReasonCode>,
        reason_string: Option<String>,
    },
    /// Close the connection.
    Disconnect {
        reason_code: DisconnectReasonCode,
        reason_string: Option<String>,
    },
}

impl<P: Interceptable> From<ChainOutcome<P>> for Outcome {
    fn from(outcome: ChainOutcome<P>) -> Self {
        match outcome {
            ChainOutcome::Delivered(packet) => Self::Delivered(packet.into_packet()),
            ChainOutcome::Prevented(prevention) => Self::Prevented {
                reason_code: prevention.reason_code,
                reason_string: prevention.reason_string,
            },
            ChainOutcome::Disconnect(disconnection) => Self::Disconnect {
                reason_code: disconnection.reason_code,
                reason_string: disconnection.reason_string,
            },
        }
    }
}

/// Shared entry point; cheap to clone.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<ExtensionRegistry>,
    settings: ChainSettings,
    queue_capacity: usize,
}

impl Pipeline {
    pub fn new(registry: Arc<ExtensionRegistry>, settings: ChainSettings) -> Self {
        Self {
            registry,
            settings,
            queue_capacity: DEFAULT_CHAIN_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.settings.metrics.snapshot()
    }

    pub fn connections(&self) -> &Arc<ConnectionDirectory> {
        self.registry.services().connections()
    }

    /// Collects the interceptors for a new connection and starts its worker.
    /// Must be called from within a tokio runtime.
    pub fn open_connection(
        &self,
        client: ClientInformation,
        connection: ConnectionInformation,
    ) -> ConnectionPipeline {
        let client = Arc::new(client);
        let connection = Arc::new(connection);
        let interceptors = self.collect_interceptors(&client, &connection);
        debug!(
            client_id = %client.client_id,
            connection_id = %connection.connection_id,
            interceptors = ?interceptors,
            "connection pipeline opened"
        );

        let directory = Arc::clone(self.connections());
        directory.insert(ConnectedClient {
            client: Arc::clone(&client),
            connection: Arc::clone(&connection),
        });

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let worker = tokio::spawn(run_worker(
            rx,
            interceptors,
            Arc::clone(&client),
            Arc::clone(&connection),
            self.settings.clone(),
        ));
        ConnectionPipeline {
            client,
            connection,
            tx,
            capacity: self.queue_capacity,
            directory,
            worker,
        }
    }

    fn collect_interceptors(
        &self,
        client: &Arc<ClientInformation>,
        connection: &Arc<ConnectionInformation>,
    ) -> ClientInterceptors {
        let mut interceptors = ClientInterceptors::default();
        for context in self.registry.active() {
            let input = ProviderInput::new(
                Arc::clone(client),
                Arc::clone(connection),
                Arc::clone(&context),
            );
            for provider in context.providers() {
                let result = context.enter(|| {
                    panic::catch_unwind(AssertUnwindSafe(|| {
                        provider.provide(&input, &mut interceptors);
                    }))
                });
                if let Err(payload) = result {
                    warn!(
                        extension = %context.id(),
                        kind = %provider.kind(),
                        direction = %provider.direction(),
                        client_id = %client.client_id,
                        panic = %panic_payload_to_string(payload.as_ref()),
                        "interceptor provider panicked; no interceptor for this client"
                    );
                }
            }
        }
        interceptors
    }
}

struct ChainJob {
    direction: Direction,
    packet: Packet,
    reply: oneshot::Sender<Outcome>,
}

async fn run_worker(
    mut rx: mpsc::Receiver<ChainJob>,
    interceptors: ClientInterceptors,
    client: Arc<ClientInformation>,
    connection: Arc<ConnectionInformation>,
    settings: ChainSettings,
) {
    while let Some(job) = rx.recv().await {
        let kind = job.packet.kind();
        let outcome = dispatch(
            &interceptors,
            job.direction,
            job.packet,
            &client,
            &connection,
            &settings,
        )
        .await;
        settings.metrics.record_outcome(&outcome);
        trace!(client_id = %client.client_id, %kind, direction = %job.direction, ?outcome, "chain finished");
        let _ = job.reply.send(outcome);
    }
    trace!(client_id = %client.client_id, "connection pipeline worker stopped");
}

async fn dispatch(
    interceptors: &ClientInterceptors,
    direction: Direction,
    packet: Packet,
    client: &Arc<ClientInformation>,
    connection: &Arc<ConnectionInformation>,
    settings: &ChainSettings,
) -> Outcome {
    macro_rules! run {
        ($($variant:ident),+ $(,)?) => {
            match packet {
                $(Packet::$variant(packet) => {
                    run_typed(interceptors, direction, packet, client, connection, settings).await
                })+
            }
        };
    }
    run!(
        Connect,
        Connack,
        Publish,
        Puback,
        Pubrec,
        Pubrel,
        Pubcomp,
        Subscribe,
        Suback,
        Unsubscribe,
        Unsuback,
        Disconnect,
        Auth,
    )
}

async fn run_typed<P: Interceptable>(
    interceptors: &ClientInterceptors,
    direction: Direction,
    packet: P,
    client: &Arc<ClientInformation>,
    connection: &Arc<ConnectionInformation>,
    settings: &ChainSettings,
) -> Outcome {
    let chain = interceptors.chain::<P>(direction);
    if chain.is_empty() {
        return Outcome::Delivered(packet.into_packet());
    }
    let input = Input::new(direction, Arc::clone(client), Arc::clone(connection), packet);
    run_chain(chain, input, settings).await.into()
}

/// Interception entry point for one client connection.
#[derive(Debug)]
pub struct ConnectionPipeline {
    client: Arc<ClientInformation>,
    connection: Arc<ConnectionInformation>,
    tx: mpsc::Sender<ChainJob>,
    capacity: usize,
    directory: Arc<ConnectionDirectory>,
    worker: JoinHandle<()>,
}

impl ConnectionPipeline {
    pub fn client(&self) -> &ClientInformation {
        &self.client
    }

    pub fn connection(&self) -> &ConnectionInformation {
        &self.connection
    }

    /// Queues a chain for `packet`. Chains of this connection run one at a
    /// time in the order they were begun.
    pub fn begin_chain(
        &self,
        direction: Direction,
        packet: impl Into<Packet>,
    ) -> Result<ChainHandle, PipelineError> {
        let packet = packet.into();
        let kind = packet.kind();
        if !kind.supports(direction) {
            return Err(PipelineError::DirectionNotSupported { kind, direction });
        }
        let (reply, outcome) = oneshot::channel();
        self.tx
            .try_send(ChainJob {
                direction,
                packet,
                reply,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => PipelineError::Backlogged {
                    capacity: self.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => PipelineError::ConnectionClosed,
            })?;
        Ok(ChainHandle { outcome })
    }

    /// Runs a chain and waits for its outcome.
    pub async fn intercept(
        &self,
        direction: Direction,
        packet: impl Into<Packet>,
    ) -> Result<Outcome, PipelineError> {
        self.begin_chain(direction, packet)?.outcome().await
    }

    /// Drops pending chains and stops the worker.
    pub fn abort(&self) {
        self.worker.abort();
    }
}

impl Drop for ConnectionPipeline {
    fn drop(&mut self) {
        self.directory
            .remove(&self.client.client_id, self.connection.connection_id);
    }
}

/// Pending outcome of one chain.
#[derive(Debug)]
pub struct ChainHandle {
    outcome: oneshot::Receiver<Outcome>,
}

impl ChainHandle {
    pub async fn outcome(self) -> Result<Outcome, PipelineError> {
        self.outcome
            .await
            .map_err(|_| PipelineError::ConnectionClosed)
    }
}
