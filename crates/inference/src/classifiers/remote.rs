//! RemoteClassifier - model server over TCP
//!
//! The server side ([`serve`]) wraps any [`Classifier`], so a model process
//! and the pipeline can live on different hosts.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use contracts::{Classifier, ClassifierError, ContractError, InferenceError, InferenceUnit};
use ndarray::Array4;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::wire::{from_wire, read_frame, to_wire, write_frame, WireRequest, WireResponse};

/// Idle connections kept for reuse
const MAX_IDLE_CONNECTIONS: usize = 16;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Client side of the model-server protocol
#[derive(Debug)]
pub struct RemoteClassifier {
    address: String,
    name: String,
    num_classes: usize,
    input_channels: usize,
    connect_timeout: Duration,
    idle: Mutex<Vec<TcpStream>>,
}

impl RemoteClassifier {
    /// Connect and fetch the backend's declared contract
    #[instrument(name = "remote_classifier_connect", skip(address), fields(address = %address.as_ref()))]
    pub async fn connect(
        address: impl AsRef<str>,
        connect_timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let address = address.as_ref().to_string();
        let mut stream = open(&address, connect_timeout).await?;

        let reply: WireResponse = exchange(&mut stream, &WireRequest::Describe)
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        match reply {
            WireResponse::Description {
                name,
                num_classes,
                input_channels,
            } => {
                info!(backend = %name, num_classes, input_channels, "remote classifier connected");
                Ok(Self {
                    address,
                    name: format!("remote:{name}"),
                    num_classes: num_classes as usize,
                    input_channels: input_channels as usize,
                    connect_timeout,
                    idle: Mutex::new(vec![stream]),
                })
            }
            WireResponse::Error { message } => Err(ClassifierError::Backend(message)),
            WireResponse::Scores { .. } => Err(ClassifierError::Transport(
                "unexpected scores in reply to describe".into(),
            )),
        }
    }

    /// Create from params (`address`, optional `connect_timeout_ms`)
    pub async fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let address = params.get("address").ok_or_else(|| {
            ContractError::config_validation(
                "classifier.params.address",
                "remote classifier requires an address",
            )
        })?;
        let timeout_ms = params
            .get("connect_timeout_ms")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);

        Self::connect(address, Duration::from_millis(timeout_ms))
            .await
            .map_err(|e| {
                ContractError::Inference(InferenceError::Unavailable {
                    classifier: format!("remote:{address}"),
                    message: e.to_string(),
                })
            })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn checkout(&self) -> Result<TcpStream, ClassifierError> {
        if let Some(stream) = self.idle.lock().await.pop() {
            return Ok(stream);
        }
        open(&self.address, self.connect_timeout).await
    }

    async fn checkin(&self, stream: TcpStream) {
        let mut idle = self.idle.lock().await;
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(stream);
        }
    }
}

async fn open(address: &str, connect_timeout: Duration) -> Result<TcpStream, ClassifierError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
        .await
        .map_err(|_| ClassifierError::Transport(format!("connect to {address} timed out")))?
        .map_err(|e| ClassifierError::Transport(format!("connect to {address}: {e}")))?;
    stream
        .set_nodelay(true)
        .map_err(|e| ClassifierError::Transport(e.to_string()))?;
    Ok(stream)
}

async fn exchange(stream: &mut TcpStream, request: &WireRequest) -> io::Result<WireResponse> {
    write_frame(stream, request).await?;
    read_frame(stream).await
}

impl Classifier for RemoteClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn input_channels(&self) -> usize {
        self.input_channels
    }

    async fn classify(&self, unit: &InferenceUnit) -> Result<Array4<f32>, ClassifierError> {
        let (shape, data) = to_wire(&unit.data);
        let request = WireRequest::Classify {
            index: unit.index as u64,
            origin: unit.origin.map(|v| v as u64),
            shape,
            data,
        };

        let mut stream = self.checkout().await?;
        // a stream that failed mid-exchange is dropped, never reused
        let reply = exchange(&mut stream, &request)
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        self.checkin(stream).await;

        match reply {
            WireResponse::Scores { shape, data } => {
                from_wire(shape, data).map_err(|e| ClassifierError::Backend(e.to_string()))
            }
            WireResponse::Error { message } => Err(ClassifierError::Backend(message)),
            WireResponse::Description { .. } => Err(ClassifierError::Transport(
                "unexpected description in reply to classify".into(),
            )),
        }
    }
}

/// Serve `classifier` on `listener` until the listener fails
pub async fn serve<C>(listener: TcpListener, classifier: Arc<C>) -> io::Result<()>
where
    C: Classifier + Send + Sync + 'static,
{
    info!(addr = ?listener.local_addr().ok(), backend = classifier.name(), "model server listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let classifier = Arc::clone(&classifier);
        tokio::spawn(async move {
            debug!(%peer, "model server connection opened");
            if let Err(e) = handle_connection(stream, classifier).await {
                warn!(%peer, error = %e, "model server connection failed");
            }
        });
    }
}

async fn handle_connection<C>(mut stream: TcpStream, classifier: Arc<C>) -> io::Result<()>
where
    C: Classifier + Send + Sync,
{
    loop {
        let request: WireRequest = match read_frame(&mut stream).await {
            Ok(request) => request,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let reply = match request {
            WireRequest::Describe => WireResponse::Description {
                name: classifier.name().to_string(),
                num_classes: classifier.num_classes() as u32,
                input_channels: classifier.input_channels() as u32,
            },
            WireRequest::Classify {
                index,
                origin,
                shape,
                data,
            } => match from_wire(shape, data) {
                Ok(data) => {
                    let unit = InferenceUnit {
                        index: index as usize,
                        origin: origin.map(|v| v as usize),
                        data,
                    };
                    match classifier.classify(&unit).await {
                        Ok(scores) => {
                            let (shape, data) = to_wire(&scores);
                            WireResponse::Scores { shape, data }
                        }
                        Err(e) => WireResponse::Error {
                            message: e.to_string(),
                        },
                    }
                }
                Err(e) => WireResponse::Error {
                    message: e.to_string(),
                },
            },
        };

        write_frame(&mut stream, &reply).await?;
    }
}
