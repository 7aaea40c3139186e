//! Pool of OCR workers
//!
//! Each worker owns its own sessions. Requests pick a worker round-robin,
//! preferring an idle one, and run on the blocking thread pool. A semaphore
//! bounds how many requests may be in flight or queued at once.

use super::pipeline::{OcrPipeline, PackPaths};
use super::{OcrBackend, TextLine};
use crate::config::ServiceConfig;
use crate::error::{OcrError, OcrResult};
use image::RgbImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub struct EnginePool {
    workers: Vec<Mutex<Box<dyn OcrBackend>>>,
    next_idx: AtomicUsize,
    permits: Arc<Semaphore>,
}

impl EnginePool {
    /// Build a pool from ready backends
    ///
    /// # Panics
    /// Panics if `workers` is empty.
    pub fn new(workers: Vec<Box<dyn OcrBackend>>, max_pending: usize) -> Self {
        assert!(!workers.is_empty(), "engine pool needs at least one worker");
        Self {
            workers: workers.into_iter().map(Mutex::new).collect(),
            next_idx: AtomicUsize::new(0),
            permits: Arc::new(Semaphore::new(max_pending.max(1))),
        }
    }

    /// Load `config.workers` pipelines from installed models
    pub fn load(paths: &PackPaths, config: &ServiceConfig) -> OcrResult<Self> {
        let mut workers: Vec<Box<dyn OcrBackend>> = Vec::with_capacity(config.workers);
        for worker in 0..config.workers.max(1) {
            tracing::info!(worker, "Loading OCR worker");
            workers.push(Box::new(OcrPipeline::load(paths, config)?));
        }
        Ok(Self::new(workers, config.max_pending_requests))
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Requests that could still be admitted right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run OCR on an image, failing fast with [`OcrError::Busy`] when saturated
    pub async fn run(self: &Arc<Self>, image: RgbImage) -> OcrResult<Vec<TextLine>> {
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| OcrError::Busy)?;

        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pool.run_blocking(&image)
        })
        .await
        .map_err(OcrError::inference)?
    }

    fn run_blocking(&self, image: &RgbImage) -> OcrResult<Vec<TextLine>> {
        let count = self.workers.len();
        let start = self.next_idx.fetch_add(1, Ordering::Relaxed) % count;

        for offset in 0..count {
            if let Ok(mut worker) = self.workers[(start + offset) % count].try_lock() {
                return worker.recognize(image);
            }
        }

        let mut worker = self.workers[start]
            .lock()
            .map_err(|_| OcrError::inference(format!("worker {} lock poisoned", start)))?;
        worker.recognize(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Counting {
        id: usize,
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl OcrBackend for Counting {
        fn recognize(&mut self, _image: &RgbImage) -> OcrResult<Vec<TextLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(vec![TextLine {
                text: format!("worker-{}", self.id),
                confidence: 1.0,
                bbox: [[0.0, 0.0]; 4],
            }])
        }
    }

    fn pool(workers: usize, max_pending: usize, delay: Duration) -> (Arc<EnginePool>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backends: Vec<Box<dyn OcrBackend>> = (0..workers)
            .map(|id| {
                Box::new(Counting {
                    id,
                    calls: calls.clone(),
                    delay,
                }) as Box<dyn OcrBackend>
            })
            .collect();
        (Arc::new(EnginePool::new(backends, max_pending)), calls)
    }

    #[tokio::test]
    async fn test_round_robin() {
        let (pool, calls) = pool(2, 4, Duration::ZERO);
        let first = pool.run(RgbImage::new(4, 4)).await.unwrap();
        let second = pool.run(RgbImage::new(4, 4)).await.unwrap();

        assert_eq!(first[0].text, "worker-0");
        assert_eq!(second[0].text, "worker-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_busy_when_saturated() {
        let (pool, _calls) = pool(1, 1, Duration::from_millis(200));

        let slow = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.run(RgbImage::new(4, 4)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let rejected = pool.run(RgbImage::new(4, 4)).await;
        assert!(matches!(rejected, Err(OcrError::Busy)));

        assert!(slow.await.unwrap().is_ok());
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_all_served() {
        let (pool, calls) = pool(2, 8, Duration::from_millis(10));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.run(RgbImage::new(2, 2)).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    #[should_panic]
    fn test_empty_pool_panics() {
        let _ = EnginePool::new(Vec::new(), 1);
    }
}
