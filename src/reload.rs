//! Live reload: a websocket endpoint browsers connect to, and a broadcast of
//! `{"command":"reload","path":...}` whenever an output changes.
//!
//! The port is reserved when the [`Environment`](crate::Environment) is
//! created in watch mode, so pages can embed the client script right away.
//! Nothing is accepted or sent until [`LiveReload::listen`] runs.

use std::net::TcpListener;

#[cfg(feature = "live")]
use std::net::TcpStream;
#[cfg(feature = "live")]
use std::sync::mpsc::Sender;
#[cfg(feature = "live")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "live")]
use tungstenite::WebSocket;

/// Clients beyond this many are closed, oldest first.
const MAX_CLIENTS: usize = 10;

#[derive(Default)]
pub(crate) struct LiveReload {
    port: Option<u16>,
    #[cfg(feature = "live")]
    hub: Option<Hub>,
}

#[cfg(feature = "live")]
struct Hub {
    listener: Mutex<Option<TcpListener>>,
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
    tx: Mutex<Option<Sender<String>>>,
}

impl LiveReload {
    pub(crate) fn disabled() -> Self {
        Self::default()
    }

    /// Reserves `127.0.0.1:port`, or any free port when that one is taken.
    pub(crate) fn bind(port: u16) -> std::io::Result<Self> {
        let (listener, port) = reserve_port(port)?;

        #[cfg(feature = "live")]
        {
            Ok(Self {
                port: Some(port),
                hub: Some(Hub {
                    listener: Mutex::new(Some(listener)),
                    clients: Arc::new(Mutex::new(Vec::new())),
                    tx: Mutex::new(None),
                }),
            })
        }

        #[cfg(not(feature = "live"))]
        {
            drop(listener);
            tracing::debug!(port, "live reload is not compiled in");
            Ok(Self { port: None })
        }
    }

    pub(crate) fn port(&self) -> Option<u16> {
        self.port
    }

    /// Starts accepting browsers and broadcasting changes. Calling it again
    /// does nothing.
    #[cfg(feature = "live")]
    pub(crate) fn listen(&self) -> std::io::Result<()> {
        let Some(hub) = &self.hub else {
            return Ok(());
        };

        let Some(listener) = lock(&hub.listener).take() else {
            return Ok(());
        };

        tracing::info!(port = ?self.port, "live reload listening");

        new_thread_ws_incoming(listener, hub.clients.clone())?;
        let tx = new_thread_ws_reload(hub.clients.clone())?;
        *lock(&hub.tx) = Some(tx);

        Ok(())
    }

    /// Tells every connected browser that `path` changed. A no-op until
    /// [`listen`](Self::listen) has run.
    pub(crate) fn changed(&self, path: &str) {
        #[cfg(feature = "live")]
        if let Some(hub) = &self.hub
            && let Some(tx) = lock(&hub.tx).as_ref()
        {
            let message = serde_json::json!({ "command": "reload", "path": path }).to_string();
            if tx.send(message).is_err() {
                tracing::debug!("live reload thread is gone");
            }
        }

        #[cfg(not(feature = "live"))]
        let _ = path;
    }
}

fn reserve_port(port: u16) -> std::io::Result<(TcpListener, u16)> {
    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(sock) => sock,
        Err(e) => {
            tracing::warn!(port, "live reload port unavailable ({e}), using a random one");
            TcpListener::bind("127.0.0.1:0")?
        }
    };

    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

#[cfg(feature = "live")]
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(feature = "live")]
fn new_thread_ws_incoming(
    server: TcpListener,
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("reload-accept".into())
        .spawn(move || {
            for stream in server.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::debug!("live reload connection failed: {e}");
                        continue;
                    }
                };

                match tungstenite::accept(stream) {
                    Ok(socket) => lock(&clients).push(socket),
                    Err(e) => tracing::debug!("live reload handshake failed: {e}"),
                }
            }
        })?;

    Ok(())
}

#[cfg(feature = "live")]
fn new_thread_ws_reload(clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>) -> std::io::Result<Sender<String>> {
    let (tx, rx) = std::sync::mpsc::channel::<String>();

    std::thread::Builder::new()
        .name("reload-broadcast".into())
        .spawn(move || {
            while let Ok(message) = rx.recv() {
                let mut clients = lock(&clients);
                let mut broken = vec![];

                for (i, socket) in clients.iter_mut().enumerate() {
                    match socket.send(tungstenite::Message::text(message.clone())) {
                        Ok(_) => {}
                        Err(
                            tungstenite::Error::Io(_)
                            | tungstenite::Error::ConnectionClosed
                            | tungstenite::Error::AlreadyClosed,
                        ) => broken.push(i),
                        Err(e) => tracing::error!("live reload send failed: {e:?}"),
                    }
                }

                for i in broken.into_iter().rev() {
                    clients.remove(i);
                }

                let len = clients.len();
                if len > MAX_CLIENTS {
                    for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                        socket.close(None).ok();
                    }
                }

                tracing::debug!(clients = clients.len(), "sent reload");
            }
        })?;

    Ok(tx)
}
