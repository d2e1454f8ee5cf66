use std::{fmt, sync::Arc};

use anyhow::Result;
use docker::{ContainerParams, ContainerRuntime, PortMapping, PullProcess};
use service::model::DockerConfig;
use tokio::sync::broadcast;
use url::Url;

use crate::bus::{EventBus, Fact};

const CHAIN_DATA_MOUNT: &str = "/chaindata";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusClient {
    Lighthouse,
    Prysm,
    Teku,
    Nimbus,
}

impl fmt::Display for ConsensusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsensusClient::Lighthouse => "lighthouse",
            ConsensusClient::Prysm => "prysm",
            ConsensusClient::Teku => "teku",
            ConsensusClient::Nimbus => "nimbus",
        };
        write!(f, "{name}")
    }
}

/// Everything needed to launch a local beacon node container.
#[derive(Debug, Clone)]
pub struct LocalBeaconParams {
    pub network: String,
    pub client: ConsensusClient,
    pub image: String,
    pub chain_data_dir: String,
    pub eth1_url: String,
    pub discovery_port: u16,
    pub libp2p_port: u16,
    pub rpc_port: u16,
    pub memory: Option<String>,
    pub weak_subjectivity_checkpoint: Option<String>,
}

/// Host/container port mappings for the node. The discovery port is only
/// mapped separately when it differs from the libp2p port.
pub fn port_mappings(params: &LocalBeaconParams) -> Vec<PortMapping> {
    let mut ports = vec![
        PortMapping {
            host: params.libp2p_port,
            container: params.libp2p_port,
        },
        PortMapping {
            host: params.rpc_port,
            container: params.rpc_port,
        },
    ];
    if params.discovery_port != params.libp2p_port {
        ports.push(PortMapping {
            host: params.discovery_port,
            container: params.discovery_port,
        });
    }
    ports
}

/// Command-line arguments for the chosen consensus client.
pub fn client_args(params: &LocalBeaconParams) -> Vec<String> {
    let LocalBeaconParams {
        network,
        eth1_url,
        discovery_port,
        libp2p_port,
        rpc_port,
        weak_subjectivity_checkpoint,
        ..
    } = params;
    match params.client {
        ConsensusClient::Lighthouse => {
            let mut args = vec![
                "lighthouse".to_string(),
                "bn".to_string(),
                "--network".to_string(),
                network.clone(),
                "--datadir".to_string(),
                CHAIN_DATA_MOUNT.to_string(),
                "--http".to_string(),
                "--http-address".to_string(),
                "0.0.0.0".to_string(),
                "--http-port".to_string(),
                rpc_port.to_string(),
                "--port".to_string(),
                libp2p_port.to_string(),
                "--discovery-port".to_string(),
                discovery_port.to_string(),
                "--eth1-endpoints".to_string(),
                eth1_url.clone(),
            ];
            if let Some(checkpoint) = weak_subjectivity_checkpoint {
                args.push("--wss-checkpoint".to_string());
                args.push(checkpoint.clone());
            }
            args
        }
        ConsensusClient::Prysm => {
            let mut args = vec![
                "--accept-terms-of-use".to_string(),
                format!("--datadir={CHAIN_DATA_MOUNT}"),
                "--rpc-host=0.0.0.0".to_string(),
                "--grpc-gateway-host=0.0.0.0".to_string(),
                format!("--grpc-gateway-port={rpc_port}"),
                format!("--p2p-tcp-port={libp2p_port}"),
                format!("--p2p-udp-port={discovery_port}"),
                format!("--http-web3provider={eth1_url}"),
            ];
            if let Some(checkpoint) = weak_subjectivity_checkpoint {
                args.push(format!("--weak-subjectivity-checkpoint={checkpoint}"));
            }
            args
        }
        ConsensusClient::Teku => {
            let mut args = vec![
                "--network".to_string(),
                network.clone(),
                "--data-path".to_string(),
                CHAIN_DATA_MOUNT.to_string(),
                "--rest-api-enabled".to_string(),
                "--rest-api-interface".to_string(),
                "0.0.0.0".to_string(),
                format!("--rest-api-port={rpc_port}"),
                format!("--p2p-port={libp2p_port}"),
                format!("--p2p-advertised-port={discovery_port}"),
                format!("--eth1-endpoint={eth1_url}"),
            ];
            if let Some(checkpoint) = weak_subjectivity_checkpoint {
                args.push(format!("--ws-checkpoint={checkpoint}"));
            }
            args
        }
        ConsensusClient::Nimbus => {
            let mut args = vec![
                format!("--network={network}"),
                format!("--data-dir={CHAIN_DATA_MOUNT}"),
                "--rest".to_string(),
                "--rest-address=0.0.0.0".to_string(),
                format!("--rest-port={rpc_port}"),
                format!("--tcp-port={libp2p_port}"),
                format!("--udp-port={discovery_port}"),
                format!("--web3-url={eth1_url}"),
            ];
            if let Some(checkpoint) = weak_subjectivity_checkpoint {
                args.push(format!("--weak-subjectivity-checkpoint={checkpoint}"));
            }
            args
        }
    }
}

/// Pulls images and launches local beacon node containers, announcing the
/// resulting beacon on the bus.
pub struct LocalNodeOrchestrator {
    bus: EventBus,
    runtime: Arc<dyn ContainerRuntime>,
}

impl LocalNodeOrchestrator {
    pub fn new(bus: EventBus, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { bus, runtime }
    }

    /// Returns the new node's API URL, or `None` when the image pull was
    /// cancelled.
    pub async fn start_local_beacon(&self, params: LocalBeaconParams) -> Result<Option<Url>> {
        if !self.pull_image(&params.image).await? {
            log::info!("Image pull cancelled, not starting {}", params.image);
            return Ok(None);
        }

        let name = format!("{}-beacon-{}", params.network, params.rpc_port);
        let container = ContainerParams {
            name: name.clone(),
            image: params.image.clone(),
            ports: port_mappings(&params),
            volumes: vec![(params.chain_data_dir.clone(), CHAIN_DATA_MOUNT.to_string())],
            memory: params.memory.clone(),
            args: client_args(&params),
        };
        let handle = self.runtime.start_container(&container).await?;
        let url = Url::parse(&format!("http://localhost:{}", params.rpc_port))?;
        log::info!("Started local beacon node {} on {url}", handle.name);

        self.bus.publish(Fact::BeaconAdded {
            url: url.clone(),
            network: params.network.clone(),
            docker: Some(DockerConfig {
                container_name: handle.name,
                image: params.image,
                network: params.network,
                chain_data_dir: params.chain_data_dir,
                eth1_url: params.eth1_url,
                discovery_port: params.discovery_port,
                libp2p_port: params.libp2p_port,
                rpc_port: params.rpc_port,
                memory: params.memory,
            }),
            slot: 0,
            status: common::status::BeaconStatus::Starting,
            version: None,
        });
        Ok(Some(url))
    }

    /// Pulls `image`, racing the pull against a `PullCancelled` fact. Returns
    /// `false` when the user cancelled; the pull process is then killed.
    async fn pull_image(&self, image: &str) -> Result<bool> {
        let mut rx = self.bus.subscribe();
        self.bus.publish(Fact::PullStarted);
        log::info!("Pulling image {image}");

        let result = match self.runtime.start_pull(image).await {
            Ok(mut pull) => {
                // None means a cancellation won the race; the losing wait
                // future is dropped before we touch the process again
                let outcome = tokio::select! {
                    status = pull.wait() => Some(status),
                    _ = cancel_requested(&mut rx) => None,
                };
                match outcome {
                    Some(status) => status.map(|_| true),
                    None => {
                        if let Err(err) = pull.kill().await {
                            log::warn!("Failed to kill image pull: {err:#}");
                        }
                        Ok(false)
                    }
                }
            }
            Err(err) => Err(err),
        };
        self.bus.publish(Fact::PullEnded);

        match result {
            Ok(done) => Ok(done),
            Err(err) => {
                self.notify_pull_failure().await;
                Err(err)
            }
        }
    }

    async fn notify_pull_failure(&self) {
        let title = if self.runtime.is_daemon_online().await {
            "Failed to pull Docker image."
        } else {
            "Failed to pull Docker image. The Docker daemon seems to be offline, \
             make sure it is installed and running."
        };
        self.bus.publish(Fact::NotificationCreated {
            title: title.to_string(),
            source: "image_pull".to_string(),
        });
    }
}

async fn cancel_requested(rx: &mut broadcast::Receiver<Fact>) {
    loop {
        match rx.recv().await {
            Ok(Fact::PullCancelled) => return,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("Image pull watcher lagged by {missed} facts");
            }
            // bus gone, let the pull run to completion
            Err(broadcast::error::RecvError::Closed) => {
                futures_util::future::pending::<()>().await;
            }
        }
    }
}
