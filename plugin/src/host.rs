/// Line-delimited JSON bridge to the host application.
///
/// Inbound, one object per line:
///   {"event":"keyDown","context":"<instance id>","payload":{"settings":{…}}}
/// with `event` one of keyDown, keyUp, willAppear, willDisappear and
/// didReceiveSettings.  Outbound lines are `setState` and `setImage` commands.
use serde::{Deserialize, Serialize};
use std::io::BufRead;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::controller::{KeyState, VisualStateSink};
use crate::error::Result;
use crate::event::PluginEvent;
use crate::settings::KeyConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostEvent {
    KeyDown,
    KeyUp,
    WillAppear,
    WillDisappear,
    DidReceiveSettings,
    /// Anything else the host sends; ignored.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub settings: KeyConfiguration,
}

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostMessage {
    pub event: HostEvent,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub payload: Payload,
}

pub fn parse_message(line: &str) -> Result<HostMessage> {
    Ok(serde_json::from_str(line)?)
}

/// Reads host messages from `input` until EOF, then asks the plugin to shut down.
///
/// Blocks; run it on a dedicated thread.
pub fn read_messages<R: BufRead>(input: R, tx: mpsc::Sender<PluginEvent>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to read from host");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_message(&line) {
            Ok(message) => {
                if tx.blocking_send(PluginEvent::Host(message)).is_err() {
                    return;
                }
            }
            Err(e) => warn!(error = %e, line = %line, "ignoring host message"),
        }
    }
    info!("host closed the connection");
    let _ = tx.blocking_send(PluginEvent::Shutdown);
}

/// Command sent back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Outbound {
    SetState { context: String, payload: StatePayload },
    SetImage { context: String, payload: ImagePayload },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatePayload {
    pub state: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImagePayload {
    pub image: String,
    pub state: u8,
}

/// [`VisualStateSink`] that queues commands for [`write_messages`].
#[derive(Clone)]
pub struct HostSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl HostSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, message: Outbound) {
        if self.tx.send(message).is_err() {
            debug!("host writer gone; visual update dropped");
        }
    }
}

impl VisualStateSink for HostSink {
    fn set_state(&self, instance_id: &str, state: KeyState) {
        self.send(Outbound::SetState {
            context: instance_id.to_string(),
            payload: StatePayload {
                state: state.index(),
            },
        });
    }

    fn set_images(&self, instance_id: &str, off: &str, on: &str) {
        for (state, image) in [(KeyState::Off, off), (KeyState::On, on)] {
            self.send(Outbound::SetImage {
                context: instance_id.to_string(),
                payload: ImagePayload {
                    image: image.to_string(),
                    state: state.index(),
                },
            });
        }
    }
}

/// Writes queued commands to `out`, one JSON object per line, until every
/// [`HostSink`] is dropped.
pub async fn write_messages<W>(mut rx: mpsc::UnboundedReceiver<Outbound>, mut out: W) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(out)
}
