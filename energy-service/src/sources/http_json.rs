use std::{net::SocketAddr, sync::Arc, time::SystemTime};

use axum::{extract::State, routing::post, Json, Router};
use energy_client::domain::{MeterReading, Provenance};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::pipeline::{Envelope, PipelineError, Source};

#[derive(Clone)]
struct SharedSender {
    tx: mpsc::Sender<Envelope<MeterReading>>,
}

/// HTTP intake for manually entered readings.
///
/// Accepts `POST /readings` with a JSON array of readings and feeds them
/// into the pipeline through a bounded channel. Everything arriving here is
/// tagged [`Provenance::Manual`]; bulk imports go through the CSV source.
#[derive(Clone)]
pub struct HttpJsonSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<MeterReading>>>>>,
}

#[derive(serde::Deserialize)]
struct IncomingReading {
    user_id: String,
    month: time::Date,
    kwh: f64,
    co2_kg: Option<f64>,
}

impl From<IncomingReading> for MeterReading {
    fn from(i: IncomingReading) -> Self {
        MeterReading {
            user_id: i.user_id,
            month: i.month,
            kwh: i.kwh,
            co2_kg: i.co2_kg,
            source: Provenance::Manual,
        }
    }
}

impl HttpJsonSource {
    pub async fn new(bind_addr: &str, channel_capacity: usize) -> Result<Self, PipelineError> {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let shared = SharedSender { tx };

        let app = Router::new()
            .route("/readings", post(submit_readings))
            .with_state(shared.clone());

        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;

        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        tracing::error!(error = %e, "HTTP JSON source server error");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind HTTP JSON source listener");
                }
            }
        });

        Ok(Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        })
    }
}

#[async_trait::async_trait]
impl Source<MeterReading> for HttpJsonSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<
        Box<dyn Stream<Item = Result<Envelope<MeterReading>, PipelineError>> + Send>,
    > {
        let mut guard = self.receiver.lock().await;
        let rx = guard
            .take()
            .expect("HttpJsonSource stream already taken; only one consumer supported");

        let stream = ReceiverStream::new(rx).map(Ok);
        Box::pin(stream)
    }
}

async fn submit_readings(
    State(sender): State<SharedSender>,
    Json(payload): Json<Vec<IncomingReading>>,
) -> Result<(), axum::http::StatusCode> {
    metrics::counter!("http_readings_requests_total").increment(1);

    for incoming in payload {
        let reading: MeterReading = incoming.into();
        let env = Envelope {
            payload: reading,
            received_at: SystemTime::now(),
        };

        if let Err(_e) = sender.tx.send(env).await {
            // Channel closed; treat as server error
            metrics::counter!("http_readings_failed_total").increment(1);
            return Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    Ok(())
}
