// Keyboard-wedge scanner: a handheld reader that types the decoded code followed by Enter.

use crate::domain::{CameraDecoder, DecoderStreams, FacingMode, PermissionState, ScannerError};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

const FEED_CAPACITY: usize = 32;

#[derive(Default)]
struct WedgeFeed {
    decoded: Option<mpsc::Sender<String>>,
    // Held so the errors stream stays open while the device is active.
    errors: Option<mpsc::Sender<String>>,
}

#[derive(Default)]
pub struct WedgeDecoder {
    feed: Mutex<WedgeFeed>,
}

impl WedgeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards one typed line as a decoded frame. False when no scan session is open.
    pub fn feed(&self, line: &str) -> bool {
        let text = line.trim();
        if text.is_empty() {
            return false;
        }
        self.with_feed(|feed| match &feed.decoded {
            Some(tx) => tx.try_send(text.to_string()).is_ok(),
            None => {
                debug!("wedge input while scanner closed; dropping");
                false
            }
        })
    }

    pub fn is_open(&self) -> bool {
        self.with_feed(|feed| feed.decoded.is_some())
    }

    fn with_feed<T>(&self, f: impl FnOnce(&mut WedgeFeed) -> T) -> T {
        let mut feed = match self.feed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut feed)
    }
}

#[async_trait]
impl CameraDecoder for WedgeDecoder {
    // A wedge reader needs no OS-level permission.
    async fn request_permission(&self) -> Result<PermissionState, ScannerError> {
        Ok(PermissionState::Granted)
    }

    async fn open(
        &self,
        container_id: &str,
        facing: FacingMode,
    ) -> Result<DecoderStreams, ScannerError> {
        let (decoded_tx, decoded) = mpsc::channel(FEED_CAPACITY);
        let (errors_tx, errors) = mpsc::channel(FEED_CAPACITY);
        self.with_feed(|feed| {
            feed.decoded = Some(decoded_tx);
            feed.errors = Some(errors_tx);
        });
        info!(container_id, facing = facing.as_str(), "wedge scanner opened");
        Ok(DecoderStreams { decoded, errors })
    }

    fn close(&self) {
        self.with_feed(|feed| {
            feed.decoded = None;
            feed.errors = None;
        });
        info!("wedge scanner closed");
    }
}
