//! MQTT command ingest
//!
//! One task owns the broker connection. Incoming publishes are routed
//! through [`router`] into typed commands and executed against the shared
//! [`AppContext`]; status/list queries are answered on `dmx/reply/...`
//! topics. Connection loss is retried with exponential backoff from 1 s to a
//! 30 s cap; with `require_broker` the task gives up once the cap is reached
//! so the process can exit with a distinct code.

pub mod router;

pub use router::MqttCommand;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::{error::ControlError, Result};

/// Reconnect backoff cap
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reply topic for `dmx/sender/status`
pub const STATUS_REPLY_TOPIC: &str = "dmx/reply/sender/status";

/// Reply topic for `dmx/sender/list`
pub const LIST_REPLY_TOPIC: &str = "dmx/reply/sender/list";

/// Wildcard subscriptions that are always active
const STATIC_SUBSCRIPTIONS: [&str; 4] = [
    "dmx/set/channel/#",
    "dmx/scene/#",
    "dmx/sender/#",
    "dmx/config/#",
];

/// The MQTT ingest task
pub struct MqttService {
    ctx: Arc<AppContext>,
    /// Fail instead of retrying forever once backoff reaches its cap
    require_broker: bool,
}

impl MqttService {
    /// Build the service
    pub fn new(ctx: Arc<AppContext>, require_broker: bool) -> Self {
        Self {
            ctx,
            require_broker,
        }
    }

    /// Spawn the connection loop
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Connection loop: poll the event loop, dispatch publishes, reconnect
    /// with backoff on failure.
    pub async fn run(self) -> Result<()> {
        let mqtt = self.ctx.settings.read().mqtt.clone();
        let (host, port) = mqtt.host_port();

        let mut options = MqttOptions::new(mqtt.client_id.clone(), host.clone(), port);
        options.set_keep_alive(Duration::from_secs(mqtt.keepalive_seconds.max(5)));
        if let Some(username) = &mqtt.username {
            options.set_credentials(username.clone(), mqtt.password.clone().unwrap_or_default());
        }

        info!(host, port, client_id = %mqtt.client_id, "Connecting to MQTT broker");
        let (client, mut event_loop) = AsyncClient::new(options, 64);

        let mut backoff = Duration::from_secs(1);
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    backoff = Duration::from_secs(1);
                    self.subscribe_all(&client).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload).to_string();
                    self.handle_message(&client, &publish.topic, &payload).await;
                }
                Ok(_) => {}
                Err(error) => {
                    if self.require_broker && backoff >= MAX_BACKOFF {
                        return Err(ControlError::Mqtt(format!(
                            "broker unreachable after maximum backoff: {error}"
                        )));
                    }
                    warn!(%error, retry_s = backoff.as_secs(), "Broker connection failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn subscribe_all(&self, client: &AsyncClient) {
        for topic in STATIC_SUBSCRIPTIONS {
            if let Err(error) = client.subscribe(topic, QoS::AtMostOnce).await {
                warn!(topic, %error, "Subscribe failed");
            }
        }
        for topic in self.sequence_topics() {
            debug!(topic = %topic, "Subscribing to sequence topic");
            if let Err(error) = client.subscribe(topic.clone(), QoS::AtMostOnce).await {
                warn!(topic = %topic, %error, "Subscribe failed");
            }
        }
    }

    fn sequence_topics(&self) -> HashSet<String> {
        self.ctx.show.read().sequences.keys().cloned().collect()
    }

    async fn handle_message(&self, client: &AsyncClient, topic: &str, payload: &str) {
        debug!(topic, payload, "MQTT message");
        match router::route(topic, payload, &self.sequence_topics()) {
            Ok(Some(command)) => {
                if let Err(error) = execute(&self.ctx, client, command).await {
                    warn!(topic, %error, "Command failed");
                }
            }
            Ok(None) => debug!(topic, "No handler for topic"),
            Err(error) => warn!(topic, %error, "Rejected malformed command"),
        }
    }
}

/// Execute one routed command against the shared context.
///
/// Every state-changing command stamps the activity tracker, which re-arms
/// the inactivity fallback.
pub async fn execute(
    ctx: &AppContext,
    client: &AsyncClient,
    command: MqttCommand,
) -> Result<()> {
    match command {
        MqttCommand::SetChannel { channel, value } => {
            ctx.engine.set_channel(channel, value).await?;
            ctx.activity.touch();
            ctx.record_channel_update(channel, value);
            info!(channel, value, "Channel set via MQTT");
        }
        MqttCommand::PlayScene {
            name,
            transition_seconds,
        } => {
            ctx.engine.play_scene(&name, transition_seconds).await?;
            ctx.activity.touch();
        }
        MqttCommand::PlaySequence { name } => {
            ctx.engine.play_sequence(&name).await?;
            ctx.activity.touch();
        }
        MqttCommand::SenderStatus => {
            let status = ctx.manager.status().await;
            let payload = serde_json::to_string(&status)?;
            client
                .publish(STATUS_REPLY_TOPIC, QoS::AtMostOnce, false, payload)
                .await
                .map_err(|e| ControlError::Mqtt(e.to_string()))?;
        }
        MqttCommand::SenderList => {
            let names = ctx.manager.names().await;
            let payload = serde_json::to_string(&names)?;
            client
                .publish(LIST_REPLY_TOPIC, QoS::AtMostOnce, false, payload)
                .await
                .map_err(|e| ControlError::Mqtt(e.to_string()))?;
        }
        MqttCommand::Blackout { sender } => {
            ctx.engine.blackout().await?;
            ctx.manager.force_frame(sender.as_deref()).await?;
            ctx.activity.touch();
            info!(sender = ?sender, "Blackout via MQTT");
        }
        MqttCommand::RemoveSender { name } => {
            ctx.manager.remove(&name).await?;
            ctx.sync_engine_tick().await;
        }
        MqttCommand::ConfigShow => {
            log_config_summary(ctx);
        }
        MqttCommand::ConfigReload => {
            reload_config(ctx, client).await?;
        }
        MqttCommand::ConfigSave => {
            let settings = ctx.settings.read().clone();
            let show = ctx.show.read().clone();
            ctx.store.save_settings(&settings)?;
            ctx.store.save_show(&show)?;
        }
    }
    Ok(())
}

/// Re-read both config files and push the changes into the running system
async fn reload_config(ctx: &AppContext, client: &AsyncClient) -> Result<()> {
    let settings = ctx.store.load_settings()?;
    let show = ctx.store.load_show()?;

    let old_topics: HashSet<String> = ctx
        .show
        .read()
        .sequences
        .keys()
        .cloned()
        .collect();
    let new_topics: HashSet<String> = show.sequences.keys().cloned().collect();

    ctx.universe.set_followers(settings.followers.clone());
    let _ = ctx.fallback_tx.send(show.fallback.clone());
    let _ = ctx.retransmit_tx.send(settings.retransmit.clone());
    *ctx.settings.write() = settings;
    *ctx.show.write() = show;

    // keep the data-defined topic registrations in sync
    for topic in old_topics.difference(&new_topics) {
        if let Err(error) = client.unsubscribe(topic.clone()).await {
            warn!(topic = %topic, %error, "Unsubscribe failed");
        }
    }
    for topic in new_topics.difference(&old_topics) {
        if let Err(error) = client.subscribe(topic.clone(), QoS::AtMostOnce).await {
            warn!(topic = %topic, %error, "Subscribe failed");
        }
    }

    info!("Configuration reloaded");
    Ok(())
}

fn log_config_summary(ctx: &AppContext) {
    let settings = ctx.settings.read();
    let show = ctx.show.read();
    info!(
        mqtt_url = %settings.mqtt.url,
        senders = settings.senders.len(),
        scenes = show.scenes.len(),
        sequences = show.sequences.len(),
        programmables = show.programmable_scenes.len(),
        retransmit = settings.retransmit.enabled,
        followers = settings.followers.enabled,
        "Current configuration"
    );
}
