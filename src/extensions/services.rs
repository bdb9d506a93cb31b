//! Broker services visible to extensions.

use super::namespace::SharedNamespace;
use crate::interceptor::{ClientInformation, ConnectionInformation};
use crate::packets::{PacketLimits, PacketResult, PayloadFormat, PublishPacket, Qos, UserProperty};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Facade handed to every isolation context.
pub struct BrokerServices {
    limits: Arc<PacketLimits>,
    connections: Arc<ConnectionDirectory>,
    shared: Arc<SharedNamespace>,
}

impl Default for BrokerServices {
    fn default() -> Self {
        Self::new(Arc::new(PacketLimits::default()))
    }
}

impl BrokerServices {
    pub fn new(limits: Arc<PacketLimits>) -> Self {
        let shared = Arc::new(SharedNamespace::default());
        shared.publish("gatehouse.api.limits", PacketLimits::clone(&limits));
        Self {
            limits,
            connections: Arc::new(ConnectionDirectory::default()),
            shared,
        }
    }

    pub fn limits(&self) -> &Arc<PacketLimits> {
        &self.limits
    }

    pub fn connections(&self) -> &Arc<ConnectionDirectory> {
        &self.connections
    }

    pub fn shared_namespace(&self) -> Arc<SharedNamespace> {
        Arc::clone(&self.shared)
    }

    pub fn publish_builder(&self, topic: impl Into<String>) -> PublishBuilder {
        PublishBuilder::new(Arc::clone(&self.limits), topic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedClient {
    pub client: Arc<ClientInformation>,
    pub connection: Arc<ConnectionInformation>,
}

/// Read-only view of the clients with an open pipeline.
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    clients: RwLock<HashMap<String, ConnectedClient>>,
}

impl ConnectionDirectory {
    pub(crate) fn insert(&self, entry: ConnectedClient) {
        self.clients
            .write()
            .insert(entry.client.client_id.clone(), entry);
    }

    /// Removes the entry only if it still belongs to `connection_id`, so a
    /// takeover by a newer connection is not undone.
    pub(crate) fn remove(&self, client_id: &str, connection_id: Uuid) {
        let mut clients = self.clients.write();
        if clients
            .get(client_id)
            .is_some_and(|entry| entry.connection.connection_id == connection_id)
        {
            clients.remove(client_id);
        }
    }

    pub fn get(&self, client_id: &str) -> Option<ConnectedClient> {
        self.clients.read().get(client_id).cloned()
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.read().contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clients.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Builds a validated [`PublishPacket`].
#[derive(Debug)]
pub struct PublishBuilder {
    limits: Arc<PacketLimits>,
    packet: PublishPacket,
}

impl PublishBuilder {
    fn new(limits: Arc<PacketLimits>, topic: impl Into<String>) -> Self {
        Self {
            limits,
            packet: PublishPacket::new(topic, Qos::AtMostOnce, Bytes::new()),
        }
    }

    pub fn qos(mut self, qos: Qos) -> Self {
        self.packet.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.packet.retain = retain;
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.packet.payload = payload.into();
        self
    }

    pub fn message_expiry_interval(mut self, interval: u32) -> Self {
        self.packet.message_expiry_interval = Some(interval);
        self
    }

    pub fn payload_format(mut self, format: PayloadFormat) -> Self {
        self.packet.payload_format = Some(format);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.packet.content_type = Some(content_type.into());
        self
    }

    pub fn response_topic(mut self, topic: impl Into<String>) -> Self {
        self.packet.response_topic = Some(topic.into());
        self
    }

    pub fn correlation_data(mut self, data: impl Into<Bytes>) -> Self {
        self.packet.correlation_data = Some(data.into());
        self
    }

    pub fn user_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut properties = self.packet.user_properties.as_slice().to_vec();
        properties.push(UserProperty::new(name, value));
        self.packet.user_properties = properties.into_iter().collect();
        self
    }

    pub fn build(self) -> PacketResult<PublishPacket> {
        let limits = &self.limits;
        let packet = self.packet;
        limits.check_topic(&packet.topic)?;
        limits.check_qos(packet.qos)?;
        if packet.retain && !limits.retained_messages_enabled {
            return Err(crate::packets::PacketError::argument(
                "retained messages are disabled by the broker",
            ));
        }
        if let Some(interval) = packet.message_expiry_interval {
            limits.check_message_expiry(interval)?;
        }
        if let Some(topic) = &packet.response_topic {
            limits.check_topic(topic)?;
        }
        limits.check_optional_string("content type", packet.content_type.as_deref())?;
        for property in packet.user_properties.as_slice() {
            limits.check_user_property(&property.name, &property.value)?;
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::ProtocolVersion;

    #[test]
    fn test_builder_validates() {
        let services = BrokerServices::new(Arc::new(PacketLimits {
            maximum_qos: Qos::AtLeastOnce,
            ..Default::default()
        }));
        assert!(services
            .publish_builder("a/b")
            .qos(Qos::ExactlyOnce)
            .build()
            .is_err());
        assert!(services.publish_builder("a/#").build().is_err());
        let packet = services
            .publish_builder("a/b")
            .qos(Qos::AtLeastOnce)
            .payload("x")
            .user_property("k", "v")
            .build()
            .unwrap();
        assert_eq!(packet.user_properties.first("k"), Some("v"));
    }

    #[test]
    fn test_directory_remove_ignores_stale_connection() {
        let directory = ConnectionDirectory::default();
        let first = ConnectionInformation::new(ProtocolVersion::V5);
        let second = ConnectionInformation::new(ProtocolVersion::V5);
        let client = Arc::new(ClientInformation::new("c1"));
        directory.insert(ConnectedClient {
            client: client.clone(),
            connection: Arc::new(first.clone()),
        });
        directory.insert(ConnectedClient {
            client,
            connection: Arc::new(second.clone()),
        });
        directory.remove("c1", first.connection_id);
        assert!(directory.is_connected("c1"));
        directory.remove("c1", second.connection_id);
        assert!(directory.is_empty());
    }
}
