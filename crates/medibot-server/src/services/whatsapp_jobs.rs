//! Background processing for WhatsApp webhooks
//!
//! The webhook acknowledges immediately; the answer is produced here and
//! delivered as a separate outbound message.

use dashmap::DashSet;
use flume::{bounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::document::TextExtractor;
use crate::services::messaging::{safe_send, MessageHandle, MessagingTransport};
use crate::services::orchestrator::ResponseOrchestrator;
use crate::utils::text::preview;

pub const UNREADABLE_MESSAGE: &str = "⚠ I couldn't read any text from the message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub url: String,
    pub content_type: Option<String>,
}

/// One inbound WhatsApp message waiting to be answered
#[derive(Debug, Clone)]
pub struct WhatsAppJob {
    pub sender: String,
    pub body: String,
    pub media: Vec<MediaItem>,
}

/// Senders that have already received the welcome message
#[derive(Default)]
pub struct ConnectedSenders {
    senders: DashSet<String>,
}

impl ConnectedSenders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `sender` connected; `true` only the first time.
    pub fn connect(&self, sender: &str) -> bool {
        self.senders.insert(sender.to_string())
    }

    pub fn is_connected(&self, sender: &str) -> bool {
        self.senders.contains(sender)
    }
}

/// Media → text → answer → outbound reply
pub struct WhatsAppProcessor {
    orchestrator: Arc<ResponseOrchestrator>,
    transport: Arc<dyn MessagingTransport>,
    extractor: Arc<dyn TextExtractor>,
    from_number: String,
    upload_dir: PathBuf,
    send_max_retries: u32,
}

impl WhatsAppProcessor {
    pub fn new(
        orchestrator: Arc<ResponseOrchestrator>,
        transport: Arc<dyn MessagingTransport>,
        extractor: Arc<dyn TextExtractor>,
        from_number: String,
        upload_dir: PathBuf,
        send_max_retries: u32,
    ) -> Self {
        Self {
            orchestrator,
            transport,
            extractor,
            from_number,
            upload_dir,
            send_max_retries,
        }
    }

    pub async fn process(&self, job: WhatsAppJob) -> Option<MessageHandle> {
        // nothing can be delivered, so skip media, OCR and inference
        if !self.transport.is_configured() {
            warn!("Messaging transport not configured; dropping message from {}", job.sender);
            return None;
        }

        let body = self.resolve_body(&job).await;
        info!(
            "Processing WhatsApp message from {} ({} media): '{}'",
            job.sender,
            job.media.len(),
            preview(&body)
        );

        let reply = if body.is_empty() {
            UNREADABLE_MESSAGE.to_string()
        } else {
            self.orchestrator.answer(&body, &job.sender).await
        };

        safe_send(
            self.transport.as_ref(),
            &job.sender,
            &self.from_number,
            &reply,
            self.send_max_retries,
        )
        .await
    }

    /// OCR text of all media joined by a space, else the message text.
    async fn resolve_body(&self, job: &WhatsAppJob) -> String {
        let mut texts = Vec::new();

        for item in &job.media {
            let path = match self
                .transport
                .fetch_media(&item.url, item.content_type.clone(), &self.upload_dir)
                .await
            {
                Ok(path) => path,
                Err(e) => {
                    warn!("Media download failed for {}: {}", item.url, e);
                    continue;
                }
            };

            let text = self.extractor.extract_text(&path).await;
            if !text.is_empty() {
                texts.push(text);
            }
        }

        if texts.is_empty() {
            job.body.trim().to_string()
        } else {
            texts.join(" ")
        }
    }
}

/// Bounded queue drained by a fixed number of workers
#[derive(Clone)]
pub struct WhatsAppWorkerPool {
    sender: Sender<WhatsAppJob>,
    receiver: Receiver<WhatsAppJob>,
}

impl WhatsAppWorkerPool {
    pub fn start(processor: Arc<WhatsAppProcessor>, workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = bounded(queue_capacity.max(1));

        info!(
            "Starting WhatsApp worker pool: workers={}, queue={}",
            workers, queue_capacity
        );

        for worker_id in 0..workers {
            let processor = processor.clone();
            let receiver = receiver.clone();
            tokio::spawn(async move {
                Self::worker_loop(worker_id, processor, receiver).await;
            });
        }

        Self { sender, receiver }
    }

    /// Jobs waiting for a free worker
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Enqueue without waiting. A full queue hands the job back.
    pub fn submit(&self, job: WhatsAppJob) -> Result<(), WhatsAppJob> {
        self.sender.try_send(job).map_err(|e| {
            warn!("WhatsApp queue rejected job: {}", e);
            e.into_inner()
        })
    }

    async fn worker_loop(
        worker_id: usize,
        processor: Arc<WhatsAppProcessor>,
        receiver: Receiver<WhatsAppJob>,
    ) {
        debug!("WhatsApp worker {} started", worker_id);

        while let Ok(job) = receiver.recv_async().await {
            let sender = job.sender.clone();
            if processor.process(job).await.is_none() {
                warn!("Worker {} could not deliver reply to {}", worker_id, sender);
            }
        }

        debug!("WhatsApp worker {} shutting down (channel closed)", worker_id);
    }
}
