//! Per-connection interceptors and the chain that runs them.
//!
//! Extensions register [`InterceptorProvider`]s per packet kind and
//! direction. When a client connects, every provider is asked once for an
//! [`Interceptor`]; the answers form that connection's
//! [`ClientInterceptors`]. Each packet is then threaded through its chain
//! as a sequence of `Input`/`Output` stages.

mod async_output;
mod chain;
mod io;
mod registry;

pub use async_output::{AsyncHandle, AsyncStatus, TimeoutFallback};
pub use chain::{ChainOutcome, ChainSettings};
pub use io::{Disconnection, Input, Output, OutputError, Prevention, Verdict};
pub use registry::ClientInterceptors;

pub(crate) use chain::{panic_payload_to_string, run_chain};
pub(crate) use registry::{ErasedProvider, TypedProvider};

use crate::extensions::IsolationContext;
use crate::packets::{Interceptable, ProtocolVersion};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInformation {
    pub client_id: String,
}

impl ClientInformation {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInformation {
    pub connection_id: Uuid,
    pub protocol_version: ProtocolVersion,
    pub remote_address: Option<SocketAddr>,
    pub listener: Option<String>,
}

impl ConnectionInformation {
    pub fn new(protocol_version: ProtocolVersion) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            protocol_version,
            remote_address: None,
            listener: None,
        }
    }
}

/// Handed to a provider when a client connects.
#[derive(Clone)]
pub struct ProviderInput {
    client: Arc<ClientInformation>,
    connection: Arc<ConnectionInformation>,
    context: Arc<IsolationContext>,
}

impl ProviderInput {
    pub(crate) fn new(
        client: Arc<ClientInformation>,
        connection: Arc<ConnectionInformation>,
        context: Arc<IsolationContext>,
    ) -> Self {
        Self {
            client,
            connection,
            context,
        }
    }

    pub fn client(&self) -> &ClientInformation {
        &self.client
    }

    pub fn connection(&self) -> &ConnectionInformation {
        &self.connection
    }

    /// The isolation context of the extension that owns the provider.
    pub fn context(&self) -> &Arc<IsolationContext> {
        &self.context
    }
}

/// One extension callback for one packet kind and direction.
pub trait Interceptor<P: Interceptable>: Send + Sync + 'static {
    fn intercept(&self, input: &Input<P>, output: &Output<P>) -> anyhow::Result<()>;
}

impl<P, F> Interceptor<P> for F
where
    P: Interceptable,
    F: Fn(&Input<P>, &Output<P>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn intercept(&self, input: &Input<P>, output: &Output<P>) -> anyhow::Result<()> {
        self(input, output)
    }
}

/// Wraps a closure as a shareable interceptor.
pub fn interceptor_fn<P, F>(f: F) -> Arc<dyn Interceptor<P>>
where
    P: Interceptable,
    F: Fn(&Input<P>, &Output<P>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Asked once per new connection. `None` means no interceptor for that client.
pub trait InterceptorProvider<P: Interceptable>: Send + Sync + 'static {
    fn interceptor(&self, input: &ProviderInput) -> Option<Arc<dyn Interceptor<P>>>;
}

impl<P, F> InterceptorProvider<P> for F
where
    P: Interceptable,
    F: Fn(&ProviderInput) -> Option<Arc<dyn Interceptor<P>>> + Send + Sync + 'static,
{
    fn interceptor(&self, input: &ProviderInput) -> Option<Arc<dyn Interceptor<P>>> {
        self(input)
    }
}
