use clap::Args;
use renvoi_server::{TcpServer, UdpServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod handler;

/// Starts the DNS server, the core of the machine
#[derive(Args, Debug)]
pub struct Command;

impl Command {
    pub async fn run(&self, config: crate::config::Config) {
        tracing::info!("preparing dns server");
        let metrics = Arc::new(crate::metrics::Metrics::default());
        // hosts records carry the cache lifetime so a resolver in front of
        // this one does not hold them longer than we would
        let record_ttl = if config.cache.is_enabled() {
            config.cache.ttl() as u32
        } else {
            0
        };
        let cache = config
            .cache
            .build(Arc::clone(&metrics))
            .await
            .expect("unable to build cache service");
        let hosts = config
            .hosts
            .build(record_ttl, Arc::clone(&metrics))
            .await
            .expect("unable to load hosts database");
        let upstreams = config
            .upstream
            .endpoints()
            .expect("invalid upstream nameserver");
        let lookup = config.upstream.build(Arc::clone(&metrics));
        let routing = config
            .routing
            .build(upstreams, config.upstream.no_rec)
            .expect("invalid routing configuration");
        let expander = config
            .search
            .build()
            .expect("invalid search domain configuration");
        let handler = Arc::new(handler::DnsHandler::new(
            hosts,
            Arc::new(cache),
            Arc::new(lookup),
            routing,
            expander,
            Arc::clone(&metrics),
        ));

        let address = config.dns.address();
        let udp = UdpServer::bind(address, Arc::clone(&handler))
            .await
            .expect("unable to bind udp listener");
        let tcp = TcpServer::bind(address, Arc::clone(&handler))
            .await
            .expect("unable to bind tcp listener");
        tracing::info!("listening on {address} over udp and tcp");

        let (trigger, shutdown) = watch::channel(false);
        let mut udp_task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { udp.run(shutdown).await })
        };
        let mut tcp_task = tokio::spawn(async move { tcp.run(shutdown).await });

        tokio::select! {
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received");
                let _ = trigger.send(true);
            }
            result = &mut udp_task => {
                result.expect("udp listener panicked").expect("udp listener failed");
                return;
            }
            result = &mut tcp_task => {
                result.expect("tcp listener panicked").expect("tcp listener failed");
                return;
            }
        }

        let grace = Duration::from_secs(config.dns.grace);
        let drained = tokio::time::timeout(grace, async {
            let _ = udp_task.await;
            let _ = tcp_task.await;
        })
        .await;
        if drained.is_err() {
            tracing::warn!("in-flight queries did not drain within the grace period");
        }
        tracing::info!(counters = ?metrics.snapshot(), "dns server stopped");
    }
}

/// Resolves on the first of SIGINT, SIGTERM or SIGQUIT.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).expect("unable to listen for the interrupt signal");
    let mut terminate =
        signal(SignalKind::terminate()).expect("unable to listen for the terminate signal");
    let mut quit = signal(SignalKind::quit()).expect("unable to listen for the quit signal");

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
}
