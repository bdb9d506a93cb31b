//! Extensions shipped with the broker binary.

use super::{ExtensionCatalog, ExtensionMain, ExtensionManifest, IsolationContext};
use crate::interceptor::{Input, Output};
use crate::packets::*;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

pub fn builtin_catalog() -> ExtensionCatalog {
    let mut catalog = ExtensionCatalog::default();
    catalog
        .register("publish-guard", |manifest: &ExtensionManifest| {
            Ok(Box::new(PublishGuard::from_manifest(manifest)?) as Box<dyn ExtensionMain>)
        })
        .register("packet-audit", |_: &ExtensionManifest| {
            Ok(Box::new(PacketAudit) as Box<dyn ExtensionMain>)
        });
    catalog
}

/// Rejects inbound publishes and subscriptions below denied topic prefixes.
///
/// ```toml
/// [settings]
/// denied-prefixes = ["$SYS/", "admin/"]
/// ```
#[derive(Debug, Clone)]
pub struct PublishGuard {
    denied_prefixes: Arc<Vec<String>>,
}

impl PublishGuard {
    fn from_manifest(manifest: &ExtensionManifest) -> Result<Self> {
        let Some(value) = manifest.settings.get("denied-prefixes") else {
            bail!("publish-guard requires settings.denied-prefixes");
        };
        let prefixes = value
            .as_array()
            .context("settings.denied-prefixes must be an array")?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .context("settings.denied-prefixes must contain strings")
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            denied_prefixes: Arc::new(prefixes),
        })
    }

    fn denies(prefixes: &[String], topic: &str) -> bool {
        prefixes.iter().any(|prefix| topic.starts_with(prefix.as_str()))
    }
}

impl ExtensionMain for PublishGuard {
    fn start(&self, context: &Arc<IsolationContext>) -> Result<()> {
        let prefixes = Arc::clone(&self.denied_prefixes);
        context.register_interceptor::<PublishPacket, _>(
            Direction::Inbound,
            move |input: &Input<PublishPacket>, output: &Output<PublishPacket>| {
                if Self::denies(&prefixes, &input.packet().topic) {
                    output.prevent_delivery_with(AckReasonCode::NotAuthorized, None)?;
                }
                Ok(())
            },
        )?;

        let prefixes = Arc::clone(&self.denied_prefixes);
        context.register_interceptor::<SubscribePacket, _>(
            Direction::Inbound,
            move |input: &Input<SubscribePacket>, output: &Output<SubscribePacket>| {
                let denied = input
                    .packet()
                    .subscriptions
                    .iter()
                    .any(|s| Self::denies(&prefixes, &s.topic_filter));
                if denied {
                    output.prevent_delivery()?;
                }
                Ok(())
            },
        )?;
        Ok(())
    }
}

/// Logs every intercepted packet.
#[derive(Debug, Clone, Copy)]
pub struct PacketAudit;

impl PacketAudit {
    fn audit<P: Interceptable>(context: &Arc<IsolationContext>) -> Result<()> {
        for &direction in P::KIND.directions() {
            context.register_interceptor::<P, _>(direction, |input: &Input<P>, _: &Output<P>| {
                tracing::info!(
                    client_id = %input.client().client_id,
                    kind = %P::KIND,
                    direction = %input.direction(),
                    prevented = input.delivery_prevented(),
                    "packet intercepted"
                );
                Ok(())
            })?;
        }
        Ok(())
    }
}

impl ExtensionMain for PacketAudit {
    fn start(&self, context: &Arc<IsolationContext>) -> Result<()> {
        Self::audit::<ConnectPacket>(context)?;
        Self::audit::<ConnackPacket>(context)?;
        Self::audit::<PublishPacket>(context)?;
        Self::audit::<PubackPacket>(context)?;
        Self::audit::<PubrecPacket>(context)?;
        Self::audit::<PubrelPacket>(context)?;
        Self::audit::<PubcompPacket>(context)?;
        Self::audit::<SubscribePacket>(context)?;
        Self::audit::<SubackPacket>(context)?;
        Self::audit::<UnsubscribePacket>(context)?;
        Self::audit::<UnsubackPacket>(context)?;
        Self::audit::<DisconnectPacket>(context)?;
        Self::audit::<AuthPacket>(context)?;
        Ok(())
    }
}
