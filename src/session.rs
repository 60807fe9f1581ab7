// src/session.rs

use crate::error::{GatewayError, ScanError};
use crate::llm_extract::{ImagePayload, OrderExtractor};
use crate::record::normalize;
use crate::store::OrderStore;
use std::path::Path;
use tracing::{Instrument, info, info_span, warn};

/// One operator session: an extractor and the orders read so far.
///
/// `scan` takes `&mut self`, so a session runs one extraction at a time;
/// callers with several images submit them in sequence.
pub struct Session<E> {
    extractor: E,
    store: OrderStore,
}

impl<E: OrderExtractor> Session<E> {
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            store: OrderStore::new(),
        }
    }

    /// Read one image, normalize every order found and put them at the front
    /// of the store. On failure the store is left exactly as it was.
    /// Returns how many records were added.
    pub async fn scan(&mut self, image: &ImagePayload) -> Result<usize, GatewayError> {
        let span = info_span!("scan", bytes = image.bytes.len(), mime = image.mime_type);

        let raw_orders = match self.extractor.extract(image).instrument(span.clone()).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(parent: &span, error = %e, "Extraction failed, store unchanged");
                return Err(e);
            }
        };

        let _guard = span.enter();

        let records = raw_orders.into_iter().map(normalize).collect();
        let inserted = self.store.ingest(records);
        info!(inserted, "Scan complete");
        Ok(inserted)
    }

    /// Read an image file and scan it. An unreadable file fails this image
    /// only; the store is left as it was.
    pub async fn scan_file(&mut self, path: &Path) -> Result<usize, ScanError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ScanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.scan(&ImagePayload::from_bytes(bytes)).await?)
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut OrderStore {
        &mut self.store
    }
}
