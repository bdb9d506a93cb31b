use super::{Interceptor, InterceptorProvider, ProviderInput};
use crate::extensions::IsolationContext;
use crate::packets::{Direction, Interceptable, PacketKind};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// An interceptor bound to the extension that supplied it.
pub(crate) struct Registered<P: Interceptable> {
    pub(crate) extension: Arc<IsolationContext>,
    pub(crate) interceptor: Arc<dyn Interceptor<P>>,
}

/// Interceptors of one client connection, partitioned by packet kind and
/// direction. Within a partition the order is extension priority first,
/// then registration order.
#[derive(Default)]
pub struct ClientInterceptors {
    chains: HashMap<(PacketKind, Direction), Box<dyn Any + Send + Sync>>,
}

impl ClientInterceptors {
    pub(crate) fn push<P: Interceptable>(&mut self, direction: Direction, registered: Registered<P>) {
        let chain = self
            .chains
            .entry((P::KIND, direction))
            .or_insert_with(|| Box::new(Vec::<Registered<P>>::new()));
        if let Some(chain) = chain.downcast_mut::<Vec<Registered<P>>>() {
            chain.push(registered);
        }
    }

    pub(crate) fn chain<P: Interceptable>(&self, direction: Direction) -> &[Registered<P>] {
        self.chains
            .get(&(P::KIND, direction))
            .and_then(|chain| chain.downcast_ref::<Vec<Registered<P>>>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of interceptors in one partition.
    pub fn len(&self, kind: PacketKind, direction: Direction) -> usize {
        use crate::packets::*;
        let interceptors = self;
        macro_rules! count {
            ($($kind:ident => $packet:ty),+ $(,)?) => {
                match kind {
                    $(PacketKind::$kind => interceptors.chain::<$packet>(direction).len(),)+
                }
            };
        }
        count! {
            Connect => ConnectPacket,
            Connack => ConnackPacket,
            Publish => PublishPacket,
            Puback => PubackPacket,
            Pubrec => PubrecPacket,
            Pubrel => PubrelPacket,
            Pubcomp => PubcompPacket,
            Subscribe => SubscribePacket,
            Suback => SubackPacket,
            Unsubscribe => UnsubscribePacket,
            Unsuback => UnsubackPacket,
            Disconnect => DisconnectPacket,
            Auth => AuthPacket,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl fmt::Debug for ClientInterceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientInterceptors")
            .field("partitions", &self.chains.len())
            .finish()
    }
}

/// Type-erased provider registration held by an isolation context.
pub(crate) trait ErasedProvider: Send + Sync {
    fn kind(&self) -> PacketKind;

    fn direction(&self) -> Direction;

    /// Asks the provider for an interceptor and files it under its kind.
    fn provide(&self, input: &ProviderInput, target: &mut ClientInterceptors);
}

pub(crate) struct TypedProvider<P: Interceptable> {
    direction: Direction,
    provider: Arc<dyn InterceptorProvider<P>>,
    packet: PhantomData<fn() -> P>,
}

impl<P: Interceptable> TypedProvider<P> {
    pub(crate) fn new(direction: Direction, provider: Arc<dyn InterceptorProvider<P>>) -> Self {
        Self {
            direction,
            provider,
            packet: PhantomData,
        }
    }
}

impl<P: Interceptable> ErasedProvider for TypedProvider<P> {
    fn kind(&self) -> PacketKind {
        P::KIND
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn provide(&self, input: &ProviderInput, target: &mut ClientInterceptors) {
        if let Some(interceptor) = self.provider.interceptor(input) {
            target.push::<P>(
                self.direction,
                Registered {
                    extension: Arc::clone(input.context()),
                    interceptor,
                },
            );
        }
    }
}
