//! Listener implementation for the HTTP endpoints.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::thread;

use axum::Router;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tracing::debug;

use super::{LISTENER_TARGET, ListenerError};

/// Bound TCP listener that has not started serving yet.
#[derive(Debug)]
pub(crate) struct SocketListener {
    name: String,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SocketListener {
    /// Binds `host:port`; port `0` selects an ephemeral port.
    pub(crate) fn bind(name: &str, host: &str, port: u16) -> Result<Self, ListenerError> {
        let listener = bind_tcp(host, port)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        Ok(Self {
            name: name.to_owned(),
            listener,
            local_addr,
        })
    }

    /// Address the listener is bound to.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `router` on a background thread.
    pub(crate) fn start(self, router: Router) -> Result<ListenerHandle, ListenerError> {
        let runtime = Builder::new_current_thread()
            .enable_io()
            .build()
            .map_err(|source| ListenerError::Runtime { source })?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let Self {
            name,
            listener,
            local_addr,
        } = self;
        let handle = thread::Builder::new()
            .name(format!("kilnd-{name}"))
            .spawn(move || serve(&runtime, &name, listener, router, shutdown_rx))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

/// Handle to a running HTTP server.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<Result<(), ListenerError>>>,
}

impl ListenerHandle {
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Asks the server to finish in-flight requests and exit; pair with
    /// [`Self::join`].
    pub(crate) fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The receiver is gone once the server has already exited.
            let _ = shutdown.send(());
        }
    }

    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic)?,
            None => Ok(()),
        }
    }

    /// Signals shutdown and waits for the server thread to exit.
    pub(crate) fn stop(mut self) -> Result<(), ListenerError> {
        self.shutdown();
        self.join()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(
    runtime: &Runtime,
    name: &str,
    listener: TcpListener,
    router: Router,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), ListenerError> {
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::from_std(listener)
            .map_err(|source| ListenerError::Register { source })?;
        debug!(
            target: LISTENER_TARGET,
            listener = name,
            "listener active"
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown.await;
            })
            .await
            .map_err(|source| ListenerError::Serve { source })?;
        debug!(
            target: LISTENER_TARGET,
            listener = name,
            "listener stopped"
        );
        Ok(())
    })
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}
