//! Inference engine thread.
//!
//! The ort sessions need `&mut self`, so a single dedicated OS thread owns
//! the pipeline and handlers talk to it through an mpsc/oneshot handle. This
//! also gives the one-inference-at-a-time request model: a request occupies
//! the engine for its full duration, there is no queue-jumping and no
//! cancellation.

use facecheck_core::{Descriptor, FacePipeline, PipelineError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// A decoded image: interleaved RGB8 pixels.
#[derive(Clone)]
pub struct DecodedImage {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Seam between the HTTP layer and the face engine, so tests can stub the
/// descriptor flows without ONNX models.
pub trait DescriptorExtractor: Send {
    /// Registration flow: exactly one face required.
    fn enroll(&mut self, image: &DecodedImage) -> Result<Descriptor, PipelineError>;
    /// Check-in flow: first detected face.
    fn probe(&mut self, image: &DecodedImage) -> Result<Descriptor, PipelineError>;
}

impl DescriptorExtractor for FacePipeline {
    fn enroll(&mut self, image: &DecodedImage) -> Result<Descriptor, PipelineError> {
        FacePipeline::enroll(self, &image.rgb, image.width, image.height)
    }

    fn probe(&mut self, image: &DecodedImage) -> Result<Descriptor, PipelineError> {
        FacePipeline::probe(self, &image.rgb, image.width, image.height)
    }
}

enum EngineRequest {
    Enroll {
        image: DecodedImage,
        reply: oneshot::Sender<Result<Descriptor, PipelineError>>,
    },
    Probe {
        image: DecodedImage,
        reply: oneshot::Sender<Result<Descriptor, PipelineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    pub async fn enroll(&self, image: DecodedImage) -> Result<Descriptor, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn probe(&self, image: DecodedImage) -> Result<Descriptor, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Probe { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine loop on a dedicated OS thread.
pub fn spawn_engine<E>(mut extractor: E) -> EngineHandle
where
    E: DescriptorExtractor + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facecheck-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll { image, reply } => {
                        let _ = reply.send(extractor.enroll(&image));
                    }
                    EngineRequest::Probe { image, reply } => {
                        let _ = reply.send(extractor.probe(&image));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}
