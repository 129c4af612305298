//! Shared helpers: event signing and a scriptable mock relay.

#![allow(dead_code)]

use std::{future::Future, time::Duration};

use filtersync::{Event, Tag};
use futures_util::{SinkExt, StreamExt};
use secp256k1::{Keypair, Message, Secp256k1};
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_tungstenite::{accept_async, tungstenite::Message as TMsg};

pub const TOPIC: &str = "adablock-filters";
pub const KIND: u32 = 30078;

/// X-only public key (hex) for the test key derived from `seed`.
pub fn pubkey(seed: u8) -> String {
    let secp = Secp256k1::new();
    let kp = Keypair::from_seckey_slice(&secp, &[seed; 32]).unwrap();
    hex::encode(kp.x_only_public_key().0.serialize())
}

/// Fill in `id` and `sig` for `ev` using the key derived from `seed`.
pub fn sign(mut ev: Event, seed: u8) -> Event {
    let secp = Secp256k1::new();
    let kp = Keypair::from_seckey_slice(&secp, &[seed; 32]).unwrap();
    ev.pubkey = hex::encode(kp.x_only_public_key().0.serialize());
    let hash = ev.compute_hash().unwrap();
    ev.id = hex::encode(hash);
    let msg = Message::from_digest_slice(&hash).unwrap();
    ev.sig = hex::encode(secp.sign_schnorr_no_aux_rand(&msg, &kp).as_ref());
    ev
}

/// A signed filter update for the default topic carrying `version`.
pub fn filter_update(seed: u8, created_at: u64, version: &str) -> Event {
    let content = json!({
        "version": version,
        "timestamp": created_at,
        "source": "adablock-agent",
        "filters": {
            "cosmetic": {"rules": [{"selector": ".ytp-ad-module"}]},
            "network": {"rules": []},
            "scripts": {"rules": []}
        }
    });
    sign(
        Event {
            id: String::new(),
            pubkey: String::new(),
            kind: KIND,
            created_at,
            tags: vec![
                Tag(vec!["d".into(), TOPIC.into()]),
                Tag(vec!["version".into(), version.into()]),
                Tag(vec!["t".into(), "adablock".into()]),
            ],
            content: content.to_string(),
            sig: String::new(),
        },
        seed,
    )
}

enum Command {
    Event(Event),
    Raw(String),
    Close,
}

/// Relay stand-in. Serves one connection at a time and reports each REQ.
pub struct MockRelay {
    pub url: String,
    commands: mpsc::UnboundedSender<Command>,
    subscriptions: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl MockRelay {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (sub_tx, sub_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = accept_async(stream).await else {
                    continue;
                };
                let sub_id = match ws.next().await {
                    Some(Ok(TMsg::Text(txt))) => {
                        let req: Value = serde_json::from_str(&txt).unwrap();
                        assert_eq!(req[0], "REQ");
                        req[1].as_str().unwrap().to_string()
                    }
                    _ => continue,
                };
                let _ = sub_tx.send(sub_id.clone());
                loop {
                    tokio::select! {
                        cmd = cmd_rx.recv() => match cmd {
                            Some(Command::Event(ev)) => {
                                let frame = json!(["EVENT", sub_id, ev]).to_string();
                                if ws.send(TMsg::Text(frame)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Command::Raw(frame)) => {
                                if ws.send(TMsg::Text(frame)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Command::Close) => {
                                let _ = ws.close(None).await;
                                break;
                            }
                            None => return,
                        },
                        msg = ws.next() => match msg {
                            Some(Ok(TMsg::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                    }
                }
            }
        });
        Self {
            url,
            commands: cmd_tx,
            subscriptions: sub_rx,
            task,
        }
    }

    /// Wait for the next REQ and return its subscription id.
    pub async fn wait_subscribed(&mut self, within: Duration) -> Option<String> {
        timeout(within, self.subscriptions.recv()).await.ok().flatten()
    }

    pub fn send(&self, ev: &Event) {
        let _ = self.commands.send(Command::Event(ev.clone()));
    }

    pub fn send_raw(&self, frame: impl Into<String>) {
        let _ = self.commands.send(Command::Raw(frame.into()));
    }

    /// Close the current connection from the relay side.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll `cond` until it holds or `within` elapses.
pub async fn wait_until(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    timeout(within, async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Await `fut` with a generous test timeout.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    timeout(Duration::from_secs(10), fut)
        .await
        .expect("timed out")
}
