use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use crate::error::Result;

/// Serves `router` on `bind_addr` until SIGINT/SIGTERM.
pub async fn serve(router: Router, bind_addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    serve_on(router, listener).await
}

/// Serves `router` on an already-bound listener until SIGINT/SIGTERM.
pub async fn serve_on(router: Router, listener: TcpListener) -> Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "omg-micro listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("omg-micro stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to install SIGTERM handler; only ctrl-c stops the server");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Arguments, HandlerError};
    use crate::registry::{Endpoint, Registry};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn work(arguments: Arguments) -> std::result::Result<String, HandlerError> {
        Ok(format!("{}-served", arguments.str("prefix").unwrap_or("")))
    }

    #[tokio::test]
    async fn serves_registered_endpoints_over_tcp() {
        let mut registry = Registry::new();
        registry
            .register(Endpoint::builder(work).optional("prefix"))
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_on(registry.router(), listener));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /work?prefix=ab HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("\"ab-served\""));

        server.abort();
    }
}
