#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// A stand-in for the OSC bridge: accepts websocket clients and records
/// every text frame they send.
pub struct TestReceiver {
    pub endpoint: String,
    frames: flume::Receiver<String>,
    kick: broadcast::Sender<()>,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestReceiver {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, frames) = flume::unbounded();
        let (kick, _) = broadcast::channel(4);
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let task = {
            let kick = kick.clone();
            let accepted = Arc::clone(&accepted);
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        continue;
                    };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let frames_tx = frames_tx.clone();
                    let closed = Arc::clone(&closed);
                    let mut kicked = kick.subscribe();
                    tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                _ = kicked.recv() => {
                                    let _ = ws.close(None).await;
                                    break;
                                }
                                msg = ws.next() => match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        let _ = frames_tx.send(text.as_str().to_owned());
                                    }
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                },
                            }
                        }
                        closed.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };

        Self {
            endpoint: format!("ws://{addr}"),
            frames,
            kick,
            accepted,
            closed,
            task,
        }
    }

    pub async fn next_frame(&self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.frames.recv_async())
            .await
            .ok()
            .and_then(Result::ok)
    }

    pub async fn frames(&self, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match self.next_frame().await {
                Some(frame) => out.push(frame),
                None => break,
            }
        }
        out
    }

    /// Assert nothing arrives for `window`.
    pub async fn assert_quiet(&self, window: Duration) {
        if let Ok(Ok(frame)) = tokio::time::timeout(window, self.frames.recv_async()).await {
            panic!("unexpected frame: {frame}");
        }
    }

    /// Close every connected client from the server side.
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for TestReceiver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub fn envelope(frame: &str) -> serde_json::Value {
    serde_json::from_str(frame).unwrap()
}
