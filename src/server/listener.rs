//! HTTP listener.
//!
//! Accepts connections and serves each one on its own task.

use crate::server::handle_request;
use crate::state::AppState;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// HTTP server for the counter endpoints.
pub struct HttpServer {
    /// Bound listener.
    listener: TcpListener,
    /// State shared with every handler.
    state: AppState,
}

impl HttpServer {
    /// Bind the listener.
    pub async fn bind(address: SocketAddr, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, state })
    }

    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the server until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        match self.local_addr() {
            Ok(address) => info!(address = %address, "http server started"),
            Err(e) => error!(error = %e, "failed to read bound address"),
        }

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => self.serve_connection(stream, peer),
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("http server shutting down");
                    break;
                }
            }
        }
    }

    fn serve_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let state = self.state.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(req, state.clone()));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}
